//! Finite-difference counterparts of the analytical Jacobians.
//!
//! Reference path only: perturb a single coordinate, re-run the forward
//! pass, divide. Per-constraint probes reconstruct the "peer" constraint
//! in the perturbed snapshot by (is_upper_bound, offset); a perturbation
//! that changes active-set membership invalidates the peer and the row is
//! rejected.

use crate::{forward_pass, BackpropSnapshot, DifferentiableContactConstraint};
use gradyn_math::{DMat, SpatialVec};
use gradyn_world::{RestorableSnapshot, World};
use thiserror::Error;

/// Position perturbation size.
pub const POSITION_EPS: f64 = 1e-6;
/// Constraint-force perturbation size.
pub const FORCE_EPS: f64 = 1e-7;

/// Failures of the finite-difference reference path.
#[derive(Debug, Error)]
pub enum FdError {
    /// The perturbed snapshot has no constraint at the probed offset: the
    /// perturbation changed active-set membership.
    #[error(
        "no peer constraint at offset {offset} (upper bound: {is_upper_bound}) \
         after perturbing coordinate {coordinate}"
    )]
    PeerMismatch {
        /// Offset into the active-set list.
        offset: usize,
        /// Which list was probed.
        is_upper_bound: bool,
        /// The perturbed world coordinate.
        coordinate: usize,
    },
}

/// Result alias for the finite-difference validators.
pub type Result<T> = std::result::Result<T, FdError>;

fn restore_pre_step(world: &mut World, snapshot: &BackpropSnapshot) {
    world.set_positions(snapshot.pre_step_position());
    world.set_velocities(snapshot.pre_step_velocity());
    world.set_forces(snapshot.pre_step_torques());
}

/// Run the snapshot's step with the timestep split into `subdivisions`
/// sub-steps, returning the final (positions, velocities).
fn rollout(
    world: &mut World,
    snapshot: &BackpropSnapshot,
    subdivisions: usize,
) -> (gradyn_math::DVec, gradyn_math::DVec) {
    let dt = snapshot.dt();
    let original_dt = world.config().dt;
    world.config_mut().dt = dt / subdivisions as f64;
    for _ in 0..subdivisions {
        world.step();
    }
    world.config_mut().dt = original_dt;
    (world.positions(), world.velocities())
}

/// Brute-force ∂q̇_{k+1}/∂q̇_k.
pub fn finite_difference_vel_vel_jacobian(world: &mut World, snapshot: &BackpropSnapshot) -> DMat {
    let saved = RestorableSnapshot::capture(world);
    let n = snapshot.pre_step_velocity().len();
    let mut jac = DMat::zeros(n, n);
    for i in 0..n {
        restore_pre_step(world, snapshot);
        let mut v = snapshot.pre_step_velocity().clone();
        v[i] += POSITION_EPS;
        world.set_velocities(&v);
        world.step();
        let col = (world.velocities() - snapshot.post_step_velocity()) / POSITION_EPS;
        jac.column_mut(i).copy_from(&col);
    }
    saved.restore(world);
    jac
}

/// Brute-force ∂q̇_{k+1}/∂τ_k.
pub fn finite_difference_force_vel_jacobian(
    world: &mut World,
    snapshot: &BackpropSnapshot,
) -> DMat {
    let saved = RestorableSnapshot::capture(world);
    let n = snapshot.pre_step_torques().len();
    let mut jac = DMat::zeros(n, n);
    for i in 0..n {
        restore_pre_step(world, snapshot);
        let mut tau = snapshot.pre_step_torques().clone();
        tau[i] += POSITION_EPS;
        world.set_forces(&tau);
        world.step();
        let col = (world.velocities() - snapshot.post_step_velocity()) / POSITION_EPS;
        jac.column_mut(i).copy_from(&col);
    }
    saved.restore(world);
    jac
}

/// Brute-force ∂q̇_{k+1}/∂q_k.
pub fn finite_difference_pos_vel_jacobian(world: &mut World, snapshot: &BackpropSnapshot) -> DMat {
    let saved = RestorableSnapshot::capture(world);
    let n = snapshot.pre_step_position().len();
    let mut jac = DMat::zeros(n, n);
    for i in 0..n {
        restore_pre_step(world, snapshot);
        let mut q = snapshot.pre_step_position().clone();
        q[i] += POSITION_EPS;
        world.set_positions(&q);
        world.step();
        let col = (world.velocities() - snapshot.post_step_velocity()) / POSITION_EPS;
        jac.column_mut(i).copy_from(&col);
    }
    saved.restore(world);
    jac
}

/// Brute-force ∂q_{k+1}/∂q_k, optionally subdividing the step.
pub fn finite_difference_pos_pos_jacobian(
    world: &mut World,
    snapshot: &BackpropSnapshot,
    subdivisions: usize,
) -> DMat {
    let saved = RestorableSnapshot::capture(world);
    let n = snapshot.pre_step_position().len();

    restore_pre_step(world, snapshot);
    let (base_q, _) = rollout(world, snapshot, subdivisions);

    let mut jac = DMat::zeros(n, n);
    for i in 0..n {
        restore_pre_step(world, snapshot);
        let mut q = snapshot.pre_step_position().clone();
        q[i] += POSITION_EPS;
        world.set_positions(&q);
        let (q_next, _) = rollout(world, snapshot, subdivisions);
        let col = (q_next - &base_q) / POSITION_EPS;
        jac.column_mut(i).copy_from(&col);
    }
    saved.restore(world);
    jac
}

/// Brute-force ∂q_{k+1}/∂q̇_k, optionally subdividing the step.
pub fn finite_difference_vel_pos_jacobian(
    world: &mut World,
    snapshot: &BackpropSnapshot,
    subdivisions: usize,
) -> DMat {
    let saved = RestorableSnapshot::capture(world);
    let n = snapshot.pre_step_velocity().len();

    restore_pre_step(world, snapshot);
    let (base_q, _) = rollout(world, snapshot, subdivisions);

    let mut jac = DMat::zeros(n, n);
    for i in 0..n {
        restore_pre_step(world, snapshot);
        let mut v = snapshot.pre_step_velocity().clone();
        v[i] += POSITION_EPS;
        world.set_velocities(&v);
        let (q_next, _) = rollout(world, snapshot, subdivisions);
        let col = (q_next - &base_q) / POSITION_EPS;
        jac.column_mut(i).copy_from(&col);
    }
    saved.restore(world);
    jac
}

/// Re-run the forward pass with coordinate `i` perturbed and hand the peer
/// of `constraint` to `read`.
fn probe_peer<T>(
    world: &mut World,
    snapshot: &BackpropSnapshot,
    constraint: &DifferentiableContactConstraint,
    coordinate: usize,
    eps: f64,
    read: impl FnOnce(&mut World, &DifferentiableContactConstraint) -> T,
) -> Result<T> {
    restore_pre_step(world, snapshot);
    let mut q = snapshot.pre_step_position().clone();
    q[coordinate] += eps;
    world.set_positions(&q);
    let perturbed = forward_pass(world);
    let peer = perturbed.peer(constraint).ok_or(FdError::PeerMismatch {
        offset: constraint.offset_into_world(),
        is_upper_bound: constraint.is_upper_bound(),
        coordinate,
    })?;
    // Evaluate at the perturbed pre-step configuration.
    world.set_positions(&q);
    let mut peer = peer.clone();
    peer.set_offset_into_world(constraint.offset_into_world(), constraint.is_upper_bound());
    Ok(read(world, &peer))
}

/// Brute-force 3×n Jacobian of the contact world position.
pub fn brute_force_position_jacobian(
    world: &mut World,
    snapshot: &BackpropSnapshot,
    constraint: &DifferentiableContactConstraint,
) -> Result<DMat> {
    let saved = RestorableSnapshot::capture(world);
    let n = snapshot.pre_step_position().len();
    let base = constraint.world_position();
    let mut jac = DMat::zeros(3, n);
    for i in 0..n {
        let pos = probe_peer(world, snapshot, constraint, i, POSITION_EPS, |_, peer| {
            peer.world_position()
        });
        let pos = match pos {
            Ok(p) => p,
            Err(e) => {
                saved.restore(world);
                return Err(e);
            }
        };
        let col = (pos - base) / POSITION_EPS;
        jac.view_mut((0, i), (3, 1)).copy_from(&col);
    }
    saved.restore(world);
    Ok(jac)
}

/// Brute-force 3×n Jacobian of this row's force direction.
pub fn brute_force_force_direction_jacobian(
    world: &mut World,
    snapshot: &BackpropSnapshot,
    constraint: &DifferentiableContactConstraint,
) -> Result<DMat> {
    let saved = RestorableSnapshot::capture(world);
    let n = snapshot.pre_step_position().len();
    let base = constraint.world_force_direction();
    let mut jac = DMat::zeros(3, n);
    for i in 0..n {
        let dir = probe_peer(world, snapshot, constraint, i, POSITION_EPS, |_, peer| {
            peer.world_force_direction()
        });
        let dir = match dir {
            Ok(d) => d,
            Err(e) => {
                saved.restore(world);
                return Err(e);
            }
        };
        let col = (dir - base) / POSITION_EPS;
        jac.view_mut((0, i), (3, 1)).copy_from(&col);
    }
    saved.restore(world);
    Ok(jac)
}

/// Brute-force 6×n Jacobian of the world 6-force.
pub fn brute_force_contact_force_jacobian(
    world: &mut World,
    snapshot: &BackpropSnapshot,
    constraint: &DifferentiableContactConstraint,
) -> Result<DMat> {
    let saved = RestorableSnapshot::capture(world);
    let n = snapshot.pre_step_position().len();
    let base = constraint.world_force();
    let mut jac = DMat::zeros(6, n);
    for i in 0..n {
        let wrench = probe_peer(world, snapshot, constraint, i, POSITION_EPS, |_, peer| {
            peer.world_force()
        });
        let wrench = match wrench {
            Ok(w) => w,
            Err(e) => {
                saved.restore(world);
                return Err(e);
            }
        };
        let col = (wrench - base) * (1.0 / POSITION_EPS);
        jac.view_mut((0, i), (6, 1)).copy_from(&col.to_vec6());
    }
    saved.restore(world);
    Ok(jac)
}

/// Brute-force n×n Jacobian of the generalized constraint forces.
pub fn brute_force_constraint_forces_jacobian(
    world: &mut World,
    snapshot: &BackpropSnapshot,
    constraint: &DifferentiableContactConstraint,
) -> Result<DMat> {
    let saved = RestorableSnapshot::capture(world);
    let n = snapshot.pre_step_position().len();

    restore_pre_step(world, snapshot);
    let base = {
        let kins = world.kinematics();
        constraint.constraint_forces(world, &kins)
    };

    let mut jac = DMat::zeros(n, n);
    for i in 0..n {
        let out = probe_peer(world, snapshot, constraint, i, FORCE_EPS, |world, peer| {
            let kins = world.kinematics();
            peer.constraint_forces(world, &kins)
        });
        let out = match out {
            Ok(o) => o,
            Err(e) => {
                saved.restore(world);
                return Err(e);
            }
        };
        let col = (out - &base) / FORCE_EPS;
        jac.column_mut(i).copy_from(&col);
    }
    saved.restore(world);
    Ok(jac)
}

/// Brute-force world screw axis of `axis` after perturbing `rotate`'s
/// position by `eps`, at the world's current state.
pub fn brute_force_screw_axis(
    world: &mut World,
    axis: usize,
    rotate: usize,
    eps: f64,
) -> SpatialVec {
    let saved = RestorableSnapshot::capture(world);
    let mut q = world.positions();
    q[rotate] += eps;
    world.set_positions(&q);
    let kins = world.kinematics();
    let screw = world.world_screw(&kins, world.dof(axis));
    saved.restore(world);
    screw
}
