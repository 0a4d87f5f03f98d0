//! Articulated-body kinematics and dynamics oracle.
//!
//! Supplies everything the contact differentiator consumes under the
//! kinematics-oracle contract: body placements, world screw axes per DOF,
//! the joint-space mass matrix M(q) (CRBA), bias forces C(q, q̇) (RNEA),
//! and derivatives of those smooth terms.

pub mod crba;
pub mod kinematics;
pub mod rnea;

pub use crba::{crba, mass_matrix_gradient};
pub use kinematics::{forward_kinematics, Kinematics};
pub use rnea::{bias_gradient, rnea_bias};

use gradyn_math::DMat;

/// Dense inverse of a joint-space mass matrix.
///
/// CRBA output is symmetric positive definite for a well-formed skeleton,
/// but a zero-inertia body can make it singular; `None` lets the caller
/// decide how to degrade instead of aborting the dynamics path.
pub fn inverse_mass_matrix(m: &DMat) -> Option<DMat> {
    m.clone().try_inverse()
}
