//! Joint types and definitions.

use gradyn_math::{skew, Mat3, Pose, SpatialVec, Vec3};

/// Joint type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointKind {
    /// Single rotational DOF about an axis.
    Revolute,
    /// Single translational DOF along an axis.
    Prismatic,
    /// 6 DOF free joint (3 rotational exponential coordinates + 3 translation).
    Free,
}

/// A joint connecting a body to its parent.
///
/// Free-joint coordinates are ordered [w(3); p(3)]: rotational exponential
/// coordinates first, then the translation in the parent frame, so that q̇
/// lines up with the [angular; linear] twist order.
#[derive(Debug, Clone)]
pub struct Joint {
    /// Joint type.
    pub kind: JointKind,
    /// Placement of the joint frame in the parent body frame (constant).
    pub parent_to_joint: Pose,
    /// Joint axis in the joint frame (revolute/prismatic only).
    pub axis: Vec3,
    /// Viscous damping coefficient applied per DOF.
    pub damping: f64,
}

impl Joint {
    /// Create a revolute joint about `axis` at the given joint placement.
    pub fn revolute(parent_to_joint: Pose, axis: Vec3) -> Self {
        Self {
            kind: JointKind::Revolute,
            parent_to_joint,
            axis,
            damping: 0.0,
        }
    }

    /// Create a prismatic joint along `axis` at the given joint placement.
    pub fn prismatic(parent_to_joint: Pose, axis: Vec3) -> Self {
        Self {
            kind: JointKind::Prismatic,
            parent_to_joint,
            axis,
            damping: 0.0,
        }
    }

    /// Create a free joint at the given joint placement.
    pub fn free(parent_to_joint: Pose) -> Self {
        Self {
            kind: JointKind::Free,
            parent_to_joint,
            axis: Vec3::zeros(),
            damping: 0.0,
        }
    }

    /// Number of degrees of freedom for this joint type.
    pub fn ndof(&self) -> usize {
        match self.kind {
            JointKind::Revolute | JointKind::Prismatic => 1,
            JointKind::Free => 6,
        }
    }

    /// Placement of the successor body in the joint frame at configuration
    /// `q` (length >= ndof()).
    pub fn joint_pose(&self, q: &[f64]) -> Pose {
        match self.kind {
            JointKind::Revolute => Pose {
                rot: rotation_exp(&(self.axis * q[0])),
                pos: Vec3::zeros(),
            },
            JointKind::Prismatic => Pose::translation(self.axis * q[0]),
            JointKind::Free => Pose {
                rot: rotation_exp(&Vec3::new(q[0], q[1], q[2])),
                pos: Vec3::new(q[3], q[4], q[5]),
            },
        }
    }

    /// Motion subspace columns at configuration `q`, expressed in the
    /// successor body frame at the body origin.
    ///
    /// Revolute and prismatic subspaces are constant. The free joint's
    /// rotational columns carry the SO(3) right Jacobian of the exponential
    /// coordinates and its translational columns the transposed placement
    /// rotation, so that v = q̇ holds for every joint and positions
    /// integrate additively.
    pub fn motion_subspace(&self, q: &[f64]) -> Vec<SpatialVec> {
        match self.kind {
            JointKind::Revolute => vec![SpatialVec::new(self.axis, Vec3::zeros())],
            JointKind::Prismatic => vec![SpatialVec::new(Vec3::zeros(), self.axis)],
            JointKind::Free => {
                let w = Vec3::new(q[0], q[1], q[2]);
                let jr = so3_right_jacobian(&w);
                let rt = rotation_exp(&w).transpose();
                let mut cols = Vec::with_capacity(6);
                for i in 0..3 {
                    let e = Vec3::ith(i, 1.0);
                    cols.push(SpatialVec::new(jr * e, Vec3::zeros()));
                }
                for i in 0..3 {
                    let e = Vec3::ith(i, 1.0);
                    cols.push(SpatialVec::new(Vec3::zeros(), rt * e));
                }
                cols
            }
        }
    }

    /// The joint velocity contribution S(q)·q̇ in the successor body frame.
    pub fn joint_velocity(&self, q: &[f64], qd: &[f64]) -> SpatialVec {
        let cols = self.motion_subspace(q);
        let mut v = SpatialVec::zero();
        for (i, col) in cols.iter().enumerate() {
            v = v + *col * qd[i];
        }
        v
    }
}

/// Rodrigues rotation from exponential coordinates (body→parent placement).
pub fn rotation_exp(w: &Vec3) -> Mat3 {
    let theta2 = w.norm_squared();
    if theta2 < 1e-24 {
        return Mat3::identity() + skew(w);
    }
    let theta = theta2.sqrt();
    let wx = skew(w);
    Mat3::identity() + wx * (theta.sin() / theta) + wx * wx * ((1.0 - theta.cos()) / theta2)
}

/// SO(3) right Jacobian of the exponential map:
/// Jr(w) = I − (1−cosθ)/θ² [w]× + (θ−sinθ)/θ³ [w]×².
///
/// Maps exponential-coordinate rates ẇ to the body-frame angular velocity.
pub fn so3_right_jacobian(w: &Vec3) -> Mat3 {
    let theta2 = w.norm_squared();
    if theta2 < 1e-24 {
        return Mat3::identity() - skew(w) * 0.5;
    }
    let theta = theta2.sqrt();
    let wx = skew(w);
    Mat3::identity() - wx * ((1.0 - theta.cos()) / theta2)
        + wx * wx * ((theta - theta.sin()) / (theta2 * theta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn revolute_pose_rotates_points_forward() {
        let joint = Joint::revolute(Pose::identity(), Vec3::z());
        let angle = 0.3;
        let pose = joint.joint_pose(&[angle]);
        let placed = pose.rotate(&Vec3::x());
        assert_relative_eq!(placed.x, angle.cos(), epsilon = 1e-12);
        assert_relative_eq!(placed.y, angle.sin(), epsilon = 1e-12);
    }

    #[test]
    fn prismatic_pose_translates_along_axis() {
        let joint = Joint::prismatic(Pose::identity(), Vec3::y());
        let pose = joint.joint_pose(&[1.5]);
        assert_relative_eq!(pose.pos, Vec3::new(0.0, 1.5, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn right_jacobian_matches_angular_velocity_fd() {
        // [ω]× = Rᵀ Ṙ with ω = Jr(w) ẇ.
        let w = Vec3::new(0.4, -0.2, 0.7);
        let wd = Vec3::new(0.3, 0.5, -0.1);
        let eps = 1e-7;

        let r0 = rotation_exp(&w);
        let r1 = rotation_exp(&(w + wd * eps));
        let omega_x = r0.transpose() * ((r1 - r0) / eps);
        let omega = Vec3::new(omega_x[(2, 1)], omega_x[(0, 2)], omega_x[(1, 0)]);

        let expected = so3_right_jacobian(&w) * wd;
        assert_relative_eq!(omega, expected, epsilon = 1e-5);
    }

    #[test]
    fn free_joint_velocity_is_identity_at_origin() {
        let joint = Joint::free(Pose::identity());
        let q = [0.0; 6];
        let qd = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6];
        let v = joint.joint_velocity(&q, &qd);
        assert_relative_eq!(v.angular, Vec3::new(0.1, 0.2, 0.3), epsilon = 1e-12);
        assert_relative_eq!(v.linear, Vec3::new(0.4, 0.5, 0.6), epsilon = 1e-12);
    }

    #[test]
    fn free_joint_translation_columns_compensate_rotation() {
        // World-frame translation rates must map to body-frame velocities
        // through the transposed placement.
        let joint = Joint::free(Pose::identity());
        let q = [0.0, 0.0, std::f64::consts::FRAC_PI_2, 0.0, 0.0, 0.0];
        let cols = joint.motion_subspace(&q);
        // ẋ in the parent frame becomes -ŷ in a body yawed by +90°.
        assert_relative_eq!(cols[3].linear, Vec3::new(0.0, -1.0, 0.0), epsilon = 1e-12);
    }
}
