//! Recursive Newton-Euler Algorithm (RNEA) — bias force computation.

use crate::forward_kinematics;
use gradyn_math::{DVec, SpatialVec, Vec3};
use gradyn_model::{Skeleton, State};

/// Bias forces C(q, q̇) such that M(q)·q̈ + C(q, q̇) = τ.
///
/// Includes Coriolis/centrifugal terms, gravity and per-DOF viscous joint
/// damping. Computed by RNEA with q̈ = 0 and the gravity offset folded into
/// the base acceleration.
pub fn rnea_bias(skel: &Skeleton, state: &State, gravity: &Vec3) -> DVec {
    let nb = skel.nbodies();
    let kin = forward_kinematics(skel, state);

    // a_0 = -g expressed in the world frame; transformed down the tree.
    let a_world = SpatialVec::new(Vec3::zeros(), -gravity);

    let mut accs = vec![SpatialVec::zero(); nb];
    let mut forces = vec![SpatialVec::zero(); nb];

    for i in 0..nb {
        let body = &skel.bodies[i];
        let joint_idx = body.joint_idx;
        let offset = skel.dof_offsets[joint_idx];
        let ndof = skel.joints[joint_idx].ndof();
        let qd = &state.v.as_slice()[offset..offset + ndof];
        let q = &state.q.as_slice()[offset..offset + ndof];

        let v_joint = skel.joints[joint_idx].joint_velocity(q, qd);

        let a_parent = if body.parent < 0 {
            kin.rel_poses[i].untransform_twist(&a_world)
        } else {
            kin.rel_poses[i].untransform_twist(&accs[body.parent as usize])
        };
        // Bias acceleration: v ×ₘ (S q̇). (The Ṡ q̇ term of the free joint's
        // exponential coordinates is dropped; see DESIGN.md.)
        accs[i] = a_parent + kin.velocities[i].ad(&v_joint);

        let inertia = skel.bodies[i].inertia.to_matrix();
        let momentum = SpatialVec::from_vec6(&(inertia * kin.velocities[i].to_vec6()));
        forces[i] = SpatialVec::from_vec6(&(inertia * accs[i].to_vec6()))
            + kin.velocities[i].cross_wrench(&momentum);
    }

    let mut bias = DVec::zeros(skel.ndofs);
    for i in (0..nb).rev() {
        let body = &skel.bodies[i];
        let joint_idx = body.joint_idx;
        let offset = skel.dof_offsets[joint_idx];
        let joint = &skel.joints[joint_idx];

        for (c, s_col) in kin.subspaces[joint_idx].iter().enumerate() {
            bias[offset + c] = s_col.dot(&forces[i]) + joint.damping * state.v[offset + c];
        }

        if body.parent >= 0 {
            let f_in_parent = kin.rel_poses[i].transform_wrench(&forces[i]);
            forces[body.parent as usize] = forces[body.parent as usize] + f_in_parent;
        }
    }

    bias
}

/// Derivative of the bias forces with respect to one coordinate,
/// ∂C/∂q_wrt, supplied under the kinematics-oracle contract.
///
/// C is smooth in q, so a central difference of the closed-form RNEA output
/// is accurate to ~1e-9; the contact path never goes through here.
pub fn bias_gradient(skel: &Skeleton, state: &State, gravity: &Vec3, wrt: usize) -> DVec {
    const EPS: f64 = 1e-6;
    let mut plus = state.clone();
    plus.q[wrt] += EPS;
    let mut minus = state.clone();
    minus.q[wrt] -= EPS;
    (rnea_bias(skel, &plus, gravity) - rnea_bias(skel, &minus, gravity)) / (2.0 * EPS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use gradyn_math::{Mat3, Pose, SpatialInertia, GRAVITY};
    use gradyn_model::SkeletonBuilder;

    fn pendulum(mass: f64, length: f64) -> Skeleton {
        SkeletonBuilder::new("pendulum")
            .add_revolute_body(
                "rod",
                -1,
                Pose::identity(),
                Vec3::z(),
                SpatialInertia::new(
                    mass,
                    Vec3::new(0.0, -length / 2.0, 0.0),
                    Mat3::from_diagonal(&Vec3::new(
                        mass * length * length / 12.0,
                        0.0,
                        mass * length * length / 12.0,
                    )),
                ),
            )
            .build()
    }

    #[test]
    fn hanging_pendulum_has_zero_bias() {
        // Hanging straight down along -y with gravity along -y: no torque.
        let skel = pendulum(1.0, 1.0);
        let state = skel.default_state();
        let bias = rnea_bias(&skel, &state, &Vec3::new(0.0, -GRAVITY, 0.0));
        assert_relative_eq!(bias[0], 0.0, epsilon = 1e-10);
    }

    #[test]
    fn horizontal_pendulum_gravity_torque() {
        // Rotated +90° the rod lies along +x; gravity torque about z is
        // -m g L/2 on the hinge, so the bias term is +m g L/2.
        let mass = 1.0;
        let length = 1.0;
        let skel = pendulum(mass, length);
        let mut state = skel.default_state();
        state.q[0] = std::f64::consts::FRAC_PI_2;
        let bias = rnea_bias(&skel, &state, &Vec3::new(0.0, -GRAVITY, 0.0));
        assert_relative_eq!(bias[0], mass * GRAVITY * length / 2.0, epsilon = 1e-10);
    }

    #[test]
    fn free_body_bias_is_pure_gravity() {
        let skel = SkeletonBuilder::new("ball")
            .add_free_body("ball", SpatialInertia::sphere(2.0, 0.1))
            .build();
        let state = skel.default_state();
        let bias = rnea_bias(&skel, &state, &Vec3::new(0.0, 0.0, -GRAVITY));
        // M q̈ = -C in free fall: C = [0; -m g] over [angular; linear].
        assert_relative_eq!(bias[5], 2.0 * GRAVITY, epsilon = 1e-10);
        for k in 0..5 {
            assert_relative_eq!(bias[k], 0.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn prismatic_slider_feels_axial_gravity() {
        // A vertical slider: M = m and C = m·g along the axis, so a free
        // release accelerates at -g.
        let mass = 3.0;
        let skel = SkeletonBuilder::new("slider")
            .add_prismatic_body(
                "cart",
                -1,
                Pose::identity(),
                Vec3::y(),
                SpatialInertia::new(mass, Vec3::zeros(), Mat3::identity() * 0.01),
            )
            .build();
        let state = skel.default_state();
        let bias = rnea_bias(&skel, &state, &Vec3::new(0.0, -GRAVITY, 0.0));
        assert_relative_eq!(bias[0], mass * GRAVITY, epsilon = 1e-12);

        let m = crate::crba(&skel, &state);
        assert_relative_eq!(m[(0, 0)], mass, epsilon = 1e-12);
    }

    #[test]
    fn damping_enters_bias_linearly() {
        let skel = SkeletonBuilder::new("damped")
            .add_revolute_body(
                "rod",
                -1,
                Pose::identity(),
                Vec3::z(),
                SpatialInertia::rod(1.0, 1.0),
            )
            .damping(0.3)
            .build();
        let mut state = skel.default_state();
        state.v[0] = 2.0;
        let no_gravity = Vec3::zeros();
        let bias = rnea_bias(&skel, &state, &no_gravity);
        assert_relative_eq!(bias[0], 0.3 * 2.0, epsilon = 1e-10);
    }
}
