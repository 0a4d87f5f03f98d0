//! Rigid body description.

use gradyn_math::SpatialInertia;

/// A rigid body in a skeleton tree.
///
/// Each body is connected to its parent by exactly one joint; `joint_idx`
/// indexes the skeleton's joint list. Bodies are stored parent-before-child.
#[derive(Debug, Clone)]
pub struct Body {
    /// Body name (unique within the skeleton).
    pub name: String,
    /// Parent body index, or -1 for a root attached to the world.
    pub parent: i32,
    /// Index of the joint connecting this body to its parent.
    pub joint_idx: usize,
    /// Spatial inertia in the body frame.
    pub inertia: SpatialInertia,
}
