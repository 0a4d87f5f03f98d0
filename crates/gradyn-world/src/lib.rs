//! World container and semi-implicit contact stepping.
//!
//! A `World` owns an ordered collection of skeletons plus their mutable
//! states, collision geometry, gravity and a time step. `World::step`
//! advances it by one discrete step through the sequence
//! forward integrate → collide → build LCP → solve → apply impulses →
//! integrate, and reports everything the backprop layer needs to
//! differentiate the step.

pub mod config;
pub mod snapshot;
pub mod world;

pub use config::StepConfig;
pub use snapshot::RestorableSnapshot;
pub use world::{ConstraintGroup, RowInfo, StepResult, World, WorldDof};
