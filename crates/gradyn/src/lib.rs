//! gradyn: a differentiable rigid-body simulator.
//!
//! Worlds of articulated skeletons with revolute, prismatic and free
//! joints advance through a semi-implicit contact step (boxed LCP with
//! Coulomb friction), and every step can be captured as a
//! [`BackpropSnapshot`] exposing the analytical Jacobians of the post-step
//! state with respect to the pre-step state and inputs.

pub use gradyn_contact::{
    self, BodyRef, BoxedLcpSolver, Collider, Contact, ContactConstraint, ContactEdges,
    ContactKind, PgsSolver, Shape,
};
pub use gradyn_diff::{
    self, classify_dof_contact, forward_pass, BackpropSnapshot,
    DifferentiableContactConstraint, DofContactType, LossGradient,
};
pub use gradyn_math::{self, Pose, SpatialInertia, SpatialVec, Vec3, GRAVITY};
pub use gradyn_model::{self, Body, Dof, Joint, JointKind, Skeleton, SkeletonBuilder, State};
pub use gradyn_rigid::{self, crba, forward_kinematics, rnea_bias, Kinematics};
pub use gradyn_world::{
    self, ConstraintGroup, RestorableSnapshot, StepConfig, World, WorldDof,
};
