//! Spatial algebra and math primitives for the gradyn simulator.
//!
//! Implements 6D spatial vectors, Plucker transforms, rigid poses and the
//! screw-calculus gradients (point velocities under a unit screw rate, the
//! skew-line contact point and its derivative, the ODE friction tangent
//! basis and its derivative) following Featherstone's conventions.

pub mod gradients;
pub mod spatial;

pub use gradients::{
    exp_map, gradient_wrt_theta, gradient_wrt_theta_pure_rotation, normalize_gradient,
    skew_line_contact, skew_line_contact_gradient, tangent_basis_ode, tangent_basis_ode_gradient,
};
pub use spatial::{Pose, SpatialInertia, SpatialVec};

/// 3D vector alias.
pub type Vec3 = nalgebra::Vector3<f64>;
/// 3x3 matrix alias.
pub type Mat3 = nalgebra::Matrix3<f64>;
/// 6D vector alias.
pub type Vec6 = nalgebra::Vector6<f64>;
/// 6x6 matrix alias.
pub type Mat6 = nalgebra::Matrix6<f64>;
/// 3x2 matrix alias (tangent bases).
pub type Mat32 = nalgebra::Matrix3x2<f64>;
/// Dynamic vector.
pub type DVec = nalgebra::DVector<f64>;
/// Dynamic matrix.
pub type DMat = nalgebra::DMatrix<f64>;

/// Cross-product matrix: [v]x such that [v]x w = v x w.
#[inline]
pub fn skew(v: &Vec3) -> Mat3 {
    Mat3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// Standard gravity (m/s^2).
pub const GRAVITY: f64 = 9.81;
