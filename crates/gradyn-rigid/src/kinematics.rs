//! Forward kinematics — body placements, velocities and world screw axes.

use gradyn_math::{Pose, SpatialVec};
use gradyn_model::{Dof, Skeleton, State};

/// Kinematic quantities of one skeleton at one configuration.
///
/// Computed once per query point and shared read-only by the mass-matrix,
/// bias and contact-differentiation paths.
#[derive(Debug, Clone)]
pub struct Kinematics {
    /// Per body: placement of the body frame in its parent's frame (the
    /// world frame for roots).
    pub rel_poses: Vec<Pose>,
    /// Per body: placement in the world frame.
    pub poses: Vec<Pose>,
    /// Per body: spatial velocity in the body frame.
    pub velocities: Vec<SpatialVec>,
    /// Per joint: motion subspace columns at the current configuration.
    pub subspaces: Vec<Vec<SpatialVec>>,
}

impl Kinematics {
    /// World screw axis of one DOF: the world twist produced by a unit rate
    /// of that coordinate, i.e. the child-body placement adjoint applied to
    /// the joint's motion-subspace column.
    pub fn world_screw(&self, skel: &Skeleton, dof: Dof) -> SpatialVec {
        let child = skel.child_body(dof.joint);
        self.poses[child].transform_twist(&self.subspaces[dof.joint][dof.index_in_joint])
    }
}

/// Compute forward kinematics for a skeleton at the given state.
pub fn forward_kinematics(skel: &Skeleton, state: &State) -> Kinematics {
    let nb = skel.nbodies();
    let mut rel_poses = vec![Pose::identity(); nb];
    let mut poses = vec![Pose::identity(); nb];
    let mut velocities = vec![SpatialVec::zero(); nb];
    let mut subspaces = vec![Vec::new(); nb];

    for i in 0..nb {
        let body = &skel.bodies[i];
        let joint = &skel.joints[body.joint_idx];
        let offset = skel.dof_offsets[body.joint_idx];
        let ndof = joint.ndof();

        let q_slice = &state.q.as_slice()[offset..offset + ndof];
        let qd_slice = &state.v.as_slice()[offset..offset + ndof];

        rel_poses[i] = joint.parent_to_joint.compose(&joint.joint_pose(q_slice));
        subspaces[body.joint_idx] = joint.motion_subspace(q_slice);

        let v_joint = joint.joint_velocity(q_slice, qd_slice);

        if body.parent < 0 {
            poses[i] = rel_poses[i];
            velocities[i] = v_joint;
        } else {
            let pi = body.parent as usize;
            poses[i] = poses[pi].compose(&rel_poses[i]);
            velocities[i] = rel_poses[i].untransform_twist(&velocities[pi]) + v_joint;
        }
    }

    Kinematics {
        rel_poses,
        poses,
        velocities,
        subspaces,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use gradyn_math::{Mat3, SpatialInertia, Vec3};
    use gradyn_model::SkeletonBuilder;

    fn pendulum() -> Skeleton {
        SkeletonBuilder::new("pendulum")
            .add_revolute_body(
                "link",
                -1,
                Pose::identity(),
                Vec3::z(),
                SpatialInertia::new(
                    1.0,
                    Vec3::new(0.0, -0.5, 0.0),
                    Mat3::from_diagonal(&Vec3::new(1.0 / 12.0, 0.0, 1.0 / 12.0)),
                ),
            )
            .build()
    }

    #[test]
    fn revolute_screw_axis_at_origin() {
        let skel = pendulum();
        let state = skel.default_state();
        let kin = forward_kinematics(&skel, &state);
        let screw = kin.world_screw(&skel, skel.dof(0));
        assert_relative_eq!(screw.angular, Vec3::z(), epsilon = 1e-12);
        assert_relative_eq!(screw.linear, Vec3::zeros(), epsilon = 1e-12);
    }

    #[test]
    fn screw_axis_invariant_under_own_rotation() {
        // A revolute axis through the origin about z stays put when the
        // joint itself rotates.
        let skel = pendulum();
        let mut state = skel.default_state();
        state.q[0] = 1.2;
        let kin = forward_kinematics(&skel, &state);
        let screw = kin.world_screw(&skel, skel.dof(0));
        assert_relative_eq!(screw.angular, Vec3::z(), epsilon = 1e-12);
        assert_relative_eq!(screw.linear, Vec3::zeros(), epsilon = 1e-12);
    }

    #[test]
    fn child_screw_axis_follows_parent_rotation() {
        let inertia = SpatialInertia::rod(1.0, 1.0);
        let skel = SkeletonBuilder::new("two")
            .add_revolute_body("l1", -1, Pose::identity(), Vec3::z(), inertia)
            .add_revolute_body(
                "l2",
                0,
                Pose::translation(Vec3::new(0.0, -1.0, 0.0)),
                Vec3::z(),
                inertia,
            )
            .build();
        let mut state = skel.default_state();
        state.q[0] = std::f64::consts::FRAC_PI_2;
        let kin = forward_kinematics(&skel, &state);

        // With the shoulder yawed +90°, the elbow anchor moves from
        // (0, -1, 0) to (1, 0, 0); its screw linear part is p × ω.
        let screw = kin.world_screw(&skel, skel.dof(1));
        assert_relative_eq!(screw.angular, Vec3::z(), epsilon = 1e-12);
        let expected = Vec3::new(1.0, 0.0, 0.0).cross(&Vec3::z());
        assert_relative_eq!(screw.linear, expected, epsilon = 1e-12);
    }

    #[test]
    fn hinge_rate_moves_the_tip_tangentially() {
        // One rad/s at the hinge drives the tip of a unit link at one unit
        // of speed, perpendicular to the link, in the body frame.
        let skel = pendulum();
        let mut state = skel.default_state();
        state.v[0] = 1.0;
        let kin = forward_kinematics(&skel, &state);
        let tip_vel = kin.velocities[0].linear
            + kin.velocities[0].angular.cross(&Vec3::new(0.0, -1.0, 0.0));
        assert_relative_eq!(tip_vel, Vec3::new(1.0, 0.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn free_body_pose_tracks_translation_coords() {
        let skel = SkeletonBuilder::new("ball")
            .add_free_body("ball", SpatialInertia::sphere(1.0, 0.1))
            .build();
        let mut state = skel.default_state();
        state.q[3] = 1.0;
        state.q[4] = 2.0;
        state.q[5] = 3.0;
        let kin = forward_kinematics(&skel, &state);
        assert_relative_eq!(kin.poses[0].pos, Vec3::new(1.0, 2.0, 3.0), epsilon = 1e-12);
    }
}
