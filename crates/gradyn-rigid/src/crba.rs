//! Composite Rigid Body Algorithm (CRBA) — mass matrix computation.

use crate::forward_kinematics;
use gradyn_math::{DMat, Mat6, SpatialVec};
use gradyn_model::{Skeleton, State};

/// Compute the joint-space mass matrix M(q) using CRBA.
///
/// Returns an ndofs x ndofs symmetric positive-definite matrix.
pub fn crba(skel: &Skeleton, state: &State) -> DMat {
    let nb = skel.nbodies();
    let mut mass_matrix = DMat::zeros(skel.ndofs, skel.ndofs);
    let kin = forward_kinematics(skel, state);

    // Composite inertias in each body's own coordinates, initialized from
    // the body inertias.
    let mut i_c: Vec<Mat6> = skel.bodies.iter().map(|b| b.inertia.to_matrix()).collect();

    // Backward pass: fold each composite into its parent through the
    // quadratic form of the parent→child motion map.
    for i in (0..nb).rev() {
        let body = &skel.bodies[i];
        if body.parent >= 0 {
            let into_child = kin.rel_poses[i].into_local_motion_matrix();
            let folded = into_child.transpose() * i_c[i] * into_child;
            i_c[body.parent as usize] += folded;
        }
    }

    // Mass matrix entries, column by column of each joint's subspace.
    for i in 0..nb {
        let joint_idx = skel.bodies[i].joint_idx;
        let v_i = skel.dof_offsets[joint_idx];
        let s_i = &kin.subspaces[joint_idx];

        for (ci, s_col) in s_i.iter().enumerate() {
            let f_i = SpatialVec::from_vec6(&(i_c[i] * s_col.to_vec6()));

            // Diagonal block.
            for (cj, s_other) in s_i.iter().enumerate() {
                mass_matrix[(v_i + ci, v_i + cj)] = s_other.dot(&f_i);
            }

            // Off-diagonal: carry the wrench up the tree one parent at a
            // time and project onto each ancestor subspace.
            let mut f = kin.rel_poses[i].transform_wrench(&f_i);
            let mut j = skel.bodies[i].parent;
            while j >= 0 {
                let ju = j as usize;
                let joint_j = skel.bodies[ju].joint_idx;
                let v_j = skel.dof_offsets[joint_j];
                for (cj, s_j) in kin.subspaces[joint_j].iter().enumerate() {
                    let val = s_j.dot(&f);
                    mass_matrix[(v_i + ci, v_j + cj)] = val;
                    mass_matrix[(v_j + cj, v_i + ci)] = val;
                }
                f = kin.rel_poses[ju].transform_wrench(&f);
                j = skel.bodies[ju].parent;
            }
        }
    }

    mass_matrix
}

/// Derivative of the mass matrix with respect to one coordinate,
/// ∂M/∂q_wrt, supplied under the kinematics-oracle contract.
///
/// M(q) is smooth, so a central difference of the closed-form CRBA output
/// is accurate to ~1e-9 and stays entirely outside the non-smooth contact
/// path.
pub fn mass_matrix_gradient(skel: &Skeleton, state: &State, wrt: usize) -> DMat {
    const EPS: f64 = 1e-6;
    let mut plus = state.clone();
    plus.q[wrt] += EPS;
    let mut minus = state.clone();
    minus.q[wrt] -= EPS;
    (crba(skel, &plus) - crba(skel, &minus)) / (2.0 * EPS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use gradyn_math::{Mat3, Pose, SpatialInertia, Vec3};
    use gradyn_model::SkeletonBuilder;

    #[test]
    fn pendulum_mass_matrix_is_pivot_inertia() {
        // Rod of mass m, length L hinged at one end about z:
        // M = I_com + m d² = mL²/12 + mL²/4 = mL²/3.
        let mass = 2.0;
        let length = 1.5;
        let skel = SkeletonBuilder::new("pendulum")
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
            .build();
        let m = crba(&skel, &skel.default_state());
        assert_relative_eq!(m[(0, 0)], mass * length * length / 3.0, epsilon = 1e-10);
    }

    #[test]
    fn free_body_mass_matrix_is_block_diagonal_inertia() {
        let skel = SkeletonBuilder::new("ball")
            .add_free_body("ball", SpatialInertia::sphere(3.0, 0.2))
            .build();
        let m = crba(&skel, &skel.default_state());
        let i = 2.0 / 5.0 * 3.0 * 0.04;
        for k in 0..3 {
            assert_relative_eq!(m[(k, k)], i, epsilon = 1e-12);
            assert_relative_eq!(m[(3 + k, 3 + k)], 3.0, epsilon = 1e-12);
        }
        for r in 0..3 {
            for c in 3..6 {
                assert_relative_eq!(m[(r, c)], 0.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn mass_matrix_is_symmetric_for_chain() {
        let inertia = SpatialInertia::new(
            1.0,
            Vec3::new(0.0, -0.5, 0.0),
            Mat3::from_diagonal(&Vec3::new(1.0 / 12.0, 0.0, 1.0 / 12.0)),
        );
        let skel = SkeletonBuilder::new("chain")
            .add_revolute_body("l1", -1, Pose::identity(), Vec3::z(), inertia)
            .add_revolute_body(
                "l2",
                0,
                Pose::translation(Vec3::new(0.0, -1.0, 0.0)),
                Vec3::z(),
                inertia,
            )
            .add_revolute_body(
                "l3",
                1,
                Pose::translation(Vec3::new(0.0, -1.0, 0.0)),
                Vec3::x(),
                inertia,
            )
            .build();
        let mut state = skel.default_state();
        state.q[0] = 0.4;
        state.q[1] = -0.8;
        state.q[2] = 0.3;
        let m = crba(&skel, &state);
        for r in 0..3 {
            for c in 0..3 {
                assert_relative_eq!(m[(r, c)], m[(c, r)], epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn mass_matrix_gradient_vanishes_for_single_revolute() {
        // A single hinge's inertia about its own axis is configuration
        // independent.
        let skel = SkeletonBuilder::new("pendulum")
            .add_revolute_body(
                "rod",
                -1,
                Pose::identity(),
                Vec3::z(),
                SpatialInertia::rod(1.0, 1.0),
            )
            .build();
        let mut state = skel.default_state();
        state.q[0] = 0.7;
        let dm = mass_matrix_gradient(&skel, &state, 0);
        assert_relative_eq!(dm[(0, 0)], 0.0, epsilon = 1e-6);
    }
}
