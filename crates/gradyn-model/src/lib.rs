//! Skeleton and state types for the gradyn simulator.
//!
//! `Skeleton` is the static description of one articulated tree (topology,
//! inertias, joint types). `State` is the mutable simulation state of that
//! tree (generalized positions, velocities, forces). Worlds hold ordered
//! collections of both.

pub mod body;
pub mod joint;
pub mod skeleton;
pub mod state;

pub use body::Body;
pub use joint::{Joint, JointKind};
pub use skeleton::{Dof, Skeleton, SkeletonBuilder};
pub use state::State;
