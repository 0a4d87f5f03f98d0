//! Skeleton: a tree of bodies connected by joints, plus DOF addressing.

use crate::{Body, Joint, JointKind, State};
use gradyn_math::{Pose, SpatialInertia, Vec3};

/// One degree of freedom of a skeleton, addressed by its joint and its
/// index within that joint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dof {
    /// Joint owning this DOF.
    pub joint: usize,
    /// Index of this DOF within its joint.
    pub index_in_joint: usize,
    /// Flat index into the skeleton's coordinate vector.
    pub index: usize,
}

/// Static description of one articulated tree.
#[derive(Debug, Clone)]
pub struct Skeleton {
    /// Skeleton name (unique within a world).
    pub name: String,
    /// Bodies, parent-before-child.
    pub bodies: Vec<Body>,
    /// Joints; joint i connects body i to its parent.
    pub joints: Vec<Joint>,
    /// Flat coordinate offset of each joint.
    pub dof_offsets: Vec<usize>,
    /// Total DOF count.
    pub ndofs: usize,
}

impl Skeleton {
    /// Number of bodies in this skeleton.
    pub fn nbodies(&self) -> usize {
        self.bodies.len()
    }

    /// Number of degrees of freedom.
    pub fn ndofs(&self) -> usize {
        self.ndofs
    }

    /// The DOF at flat index `i`.
    ///
    /// Panics on an out-of-range index: a bad DOF index is a caller bug.
    pub fn dof(&self, i: usize) -> Dof {
        assert!(i < self.ndofs, "invalid DOF index {} (skeleton has {})", i, self.ndofs);
        for (joint, &offset) in self.dof_offsets.iter().enumerate() {
            let ndof = self.joints[joint].ndof();
            if i < offset + ndof {
                return Dof { joint, index_in_joint: i - offset, index: i };
            }
        }
        unreachable!("dof_offsets out of sync with ndofs");
    }

    /// Iterate over all DOFs in flat order.
    pub fn dofs(&self) -> impl Iterator<Item = Dof> + '_ {
        (0..self.ndofs).map(move |i| self.dof(i))
    }

    /// The body moved directly by `joint` (joints and bodies are 1:1).
    pub fn child_body(&self, joint: usize) -> usize {
        joint
    }

    /// Whether the DOF's joint lies on the path from `body` to the root.
    ///
    /// This is the ancestor walk of the contact classifier: walk parent
    /// joints from `body` towards the root and report whether the walk
    /// passes through the DOF's joint. A DOF is an ancestor of the body its
    /// own joint moves.
    pub fn is_ancestor_of_body(&self, dof: Dof, body: usize) -> bool {
        assert!(body < self.bodies.len(), "invalid body index {}", body);
        // Bodies are stored parent-before-child, so a joint later in the
        // tree can never be an ancestor.
        if dof.joint > body {
            return false;
        }
        let mut b = body as i32;
        while b >= 0 {
            let bu = b as usize;
            if self.bodies[bu].joint_idx == dof.joint {
                return true;
            }
            b = self.bodies[bu].parent;
        }
        false
    }

    /// Whether `parent` is an ancestor DOF of `child`.
    ///
    /// Within a single multi-DOF joint every DOF affects the others, so
    /// same-joint DOFs with different indices count as ancestors.
    pub fn is_ancestor_of_dof(&self, parent: Dof, child: Dof) -> bool {
        if parent.joint == child.joint {
            return parent.index_in_joint != child.index_in_joint;
        }
        self.is_ancestor_of_body(parent, self.child_body(child.joint))
    }

    /// Zero state sized for this skeleton.
    pub fn default_state(&self) -> State {
        State::zeros(self.ndofs)
    }
}

/// Builder for [`Skeleton`], in the style of adding one body (with its
/// parent joint) at a time, parents first.
pub struct SkeletonBuilder {
    name: String,
    bodies: Vec<Body>,
    joints: Vec<Joint>,
}

impl SkeletonBuilder {
    /// Start a new skeleton with the given name.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            bodies: Vec::new(),
            joints: Vec::new(),
        }
    }

    fn add_body(mut self, name: &str, parent: i32, joint: Joint, inertia: SpatialInertia) -> Self {
        assert!(
            parent < self.bodies.len() as i32,
            "parent {} must be added before its child",
            parent
        );
        let joint_idx = self.joints.len();
        self.joints.push(joint);
        self.bodies.push(Body {
            name: name.to_string(),
            parent,
            joint_idx,
            inertia,
        });
        self
    }

    /// Add a body attached by a revolute joint about `axis`.
    pub fn add_revolute_body(
        self,
        name: &str,
        parent: i32,
        parent_to_joint: Pose,
        axis: Vec3,
        inertia: SpatialInertia,
    ) -> Self {
        self.add_body(name, parent, Joint::revolute(parent_to_joint, axis), inertia)
    }

    /// Add a body attached by a prismatic joint along `axis`.
    pub fn add_prismatic_body(
        self,
        name: &str,
        parent: i32,
        parent_to_joint: Pose,
        axis: Vec3,
        inertia: SpatialInertia,
    ) -> Self {
        self.add_body(name, parent, Joint::prismatic(parent_to_joint, axis), inertia)
    }

    /// Add a free-floating root body (6 DOF).
    ///
    /// Free joints only attach a body to the world, never to another body.
    pub fn add_free_body(self, name: &str, inertia: SpatialInertia) -> Self {
        self.add_body(name, -1, Joint::free(Pose::identity()), inertia)
    }

    /// Set the damping coefficient of the most recently added joint.
    pub fn damping(mut self, damping: f64) -> Self {
        let joint = self
            .joints
            .last_mut()
            .expect("damping() requires at least one body");
        joint.damping = damping;
        self
    }

    /// Finalize the skeleton.
    pub fn build(self) -> Skeleton {
        for (i, body) in self.bodies.iter().enumerate() {
            if self.joints[body.joint_idx].kind == JointKind::Free {
                assert!(body.parent < 0, "free joint must attach body {} to the world", i);
            }
        }
        let mut dof_offsets = Vec::with_capacity(self.joints.len());
        let mut ndofs = 0;
        for joint in &self.joints {
            dof_offsets.push(ndofs);
            ndofs += joint.ndof();
        }
        Skeleton {
            name: self.name,
            bodies: self.bodies,
            joints: self.joints,
            dof_offsets,
            ndofs,
        }
    }
}
