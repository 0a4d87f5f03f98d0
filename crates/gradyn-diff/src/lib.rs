//! Analytical gradients through frictional contact.
//!
//! The two core pieces are [`DifferentiableContactConstraint`] — how one
//! contact's position, normal, tangent basis and generalized force depend
//! on every generalized coordinate — and [`BackpropSnapshot`] — the bundle
//! of step Jacobians (pos→pos, pos→vel, vel→pos, vel→vel, force→vel)
//! obtained from the LCP active set by the implicit-function theorem.
//!
//! Finite-difference counterparts of every exposed Jacobian live in
//! [`fd`]; they re-run the forward pass under single-coordinate
//! perturbations and exist for validation only.

pub mod classify;
pub mod constraint;
pub mod fd;
pub mod snapshot;

pub use classify::{classify_dof_contact, DofContactType};
pub use constraint::DifferentiableContactConstraint;
pub use fd::FdError;
pub use snapshot::{forward_pass, BackpropSnapshot, LossGradient};
