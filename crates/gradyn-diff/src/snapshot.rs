//! The backprop snapshot: everything captured at one step boundary that is
//! needed to reconstruct the step's Jacobians.
//!
//! With A_c the matrix of clamping generalized-force directions, A_ub the
//! upper-bound columns, E the mapping of saturated friction impulses onto
//! their normal impulses, Ã = A_c + A_ub·E and Q = A_cᵀ M⁻¹ Ã, the
//! semi-implicit step
//!
//!   q̇' = q̇* + M⁻¹ Ã f,   Q f = −A_cᵀ q̇*,   q' = q + Δt q̇'
//!
//! differentiates implicitly into the five canonical Jacobians exposed
//! here.

use crate::DifferentiableContactConstraint;
use gradyn_math::{DMat, DVec};
use gradyn_rigid::{bias_gradient, mass_matrix_gradient, Kinematics};
use gradyn_world::{ConstraintGroup, RestorableSnapshot, World};
use tracing::warn;

/// A loss gradient with respect to one step boundary's state and inputs.
#[derive(Debug, Clone)]
pub struct LossGradient {
    /// ∂L/∂q.
    pub wrt_position: DVec,
    /// ∂L/∂q̇.
    pub wrt_velocity: DVec,
    /// ∂L/∂τ.
    pub wrt_torque: DVec,
}

impl LossGradient {
    /// Zero gradient of the given dimension.
    pub fn zeros(n: usize) -> Self {
        Self {
            wrt_position: DVec::zeros(n),
            wrt_velocity: DVec::zeros(n),
            wrt_torque: DVec::zeros(n),
        }
    }
}

/// Snapshot of one step boundary k→k+1 with analytical step Jacobians.
///
/// Cheap to keep around and immutable after construction. Jacobian queries
/// take the world, restore it to the pre-step configuration for the
/// evaluation, and put it back.
pub struct BackpropSnapshot {
    pre_step_position: DVec,
    pre_step_velocity: DVec,
    pre_step_torques: DVec,
    pre_constraint_velocity: DVec,
    post_step_position: DVec,
    post_step_velocity: DVec,
    post_step_torques: DVec,
    mass_matrix: DMat,
    inv_mass_matrix: DMat,
    bias: DVec,
    dt: f64,
    constraints: Vec<DifferentiableContactConstraint>,
    groups: Vec<ConstraintGroup>,
    impulses: DVec,
    clamping: Vec<usize>,
    upper_bound: Vec<usize>,
    /// Per upper-bound row: (column in the clamping list, signed friction
    /// coefficient), i.e. the nonzero entry of its E row.
    ub_mapping: Vec<(usize, f64)>,
    unsupported_rows: Vec<usize>,
    degraded: bool,
}

/// Step the world once and capture a backprop snapshot of the boundary.
pub fn forward_pass(world: &mut World) -> BackpropSnapshot {
    let pre_step_position = world.positions();
    let pre_step_velocity = world.velocities();
    let pre_step_torques = world.forces();
    let dt = world.config().dt;

    let result = world.step();

    let mut constraints = Vec::with_capacity(result.rows.len());
    let mut groups = Vec::with_capacity(result.rows.len());
    let mut clamping = Vec::new();
    let mut upper_bound = Vec::new();
    let mut unsupported_rows = Vec::new();

    for (row_idx, row) in result.rows.iter().enumerate() {
        let mut constraint =
            DifferentiableContactConstraint::new(&result.constraints[row.constraint], row.index);
        match row.group {
            ConstraintGroup::Clamping => {
                constraint.set_offset_into_world(clamping.len(), false);
                clamping.push(row_idx);
            }
            ConstraintGroup::UpperBound => {
                constraint.set_offset_into_world(upper_bound.len(), true);
                upper_bound.push(row_idx);
            }
            ConstraintGroup::NotClamping => {}
        }
        if !constraint.constraint().is_supported() {
            unsupported_rows.push(row_idx);
        }
        constraints.push(constraint);
        groups.push(row.group);
    }

    // E maps clamping impulses to the saturated friction impulses riding on
    // them: f_ub = sign(f_ub)·μ·f_normal.
    let mut ub_mapping = Vec::with_capacity(upper_bound.len());
    for &row_idx in &upper_bound {
        let row = &result.rows[row_idx];
        let normal_row = row
            .findex
            .expect("upper-bound row without a friction dependency");
        let clamp_col = clamping
            .iter()
            .position(|&r| r == normal_row)
            .expect("upper-bound row whose normal row is not clamping");
        let mu = result.constraints[row.constraint].contact.friction;
        ub_mapping.push((clamp_col, mu * row.impulse.signum()));
    }

    if !unsupported_rows.is_empty() {
        warn!(
            rows = ?unsupported_rows,
            "snapshot contains unsupported contact rows; their sensitivities are zero"
        );
    }

    BackpropSnapshot {
        pre_step_position,
        pre_step_velocity,
        pre_step_torques,
        pre_constraint_velocity: result.pre_constraint_velocity,
        post_step_position: world.positions(),
        post_step_velocity: world.velocities(),
        post_step_torques: world.forces(),
        mass_matrix: result.mass_matrix,
        inv_mass_matrix: result.inv_mass_matrix,
        bias: result.bias,
        dt,
        constraints,
        groups,
        impulses: result.impulses,
        clamping,
        upper_bound,
        ub_mapping,
        unsupported_rows,
        degraded: result.degraded,
    }
}

/// The active-set matrices of a snapshot at some evaluation configuration.
struct ActiveSet {
    /// Clamping generalized-force directions (n × n_c).
    a_c: DMat,
    /// Upper-bound generalized-force directions (n × n_ub).
    a_ub: DMat,
    /// Friction saturation mapping (n_ub × n_c).
    e: DMat,
    /// Ã = A_c + A_ub·E (n × n_c).
    a_tilde: DMat,
    /// Clamping impulses.
    f_c: DVec,
}

impl BackpropSnapshot {
    /// Pre-step positions q_k.
    pub fn pre_step_position(&self) -> &DVec {
        &self.pre_step_position
    }

    /// Pre-step velocities q̇_k.
    pub fn pre_step_velocity(&self) -> &DVec {
        &self.pre_step_velocity
    }

    /// Pre-step control torques τ_k.
    pub fn pre_step_torques(&self) -> &DVec {
        &self.pre_step_torques
    }

    /// The unconstrained post-force velocity q̇*.
    pub fn pre_constraint_velocity(&self) -> &DVec {
        &self.pre_constraint_velocity
    }

    /// Post-step positions q_{k+1}.
    pub fn post_step_position(&self) -> &DVec {
        &self.post_step_position
    }

    /// Post-step velocities q̇_{k+1}.
    pub fn post_step_velocity(&self) -> &DVec {
        &self.post_step_velocity
    }

    /// Post-step control torques (unchanged by the step).
    pub fn post_step_torques(&self) -> &DVec {
        &self.post_step_torques
    }

    /// The pre-step mass matrix.
    pub fn mass_matrix(&self) -> &DMat {
        &self.mass_matrix
    }

    /// The pre-step inverse mass matrix.
    pub fn inv_mass_matrix(&self) -> &DMat {
        &self.inv_mass_matrix
    }

    /// All differentiable constraints of the step, in world row order.
    pub fn constraints(&self) -> &[DifferentiableContactConstraint] {
        &self.constraints
    }

    /// Per-row LCP classification.
    pub fn groups(&self) -> &[ConstraintGroup] {
        &self.groups
    }

    /// Solved impulses, in world row order.
    pub fn impulses(&self) -> &DVec {
        &self.impulses
    }

    /// The clamping constraints, in active-set order.
    pub fn clamping_constraints(&self) -> Vec<&DifferentiableContactConstraint> {
        self.clamping.iter().map(|&i| &self.constraints[i]).collect()
    }

    /// The upper-bound constraints, in active-set order.
    pub fn upper_bound_constraints(&self) -> Vec<&DifferentiableContactConstraint> {
        self.upper_bound.iter().map(|&i| &self.constraints[i]).collect()
    }

    /// The peer of a constraint from another snapshot of the same physical
    /// configuration: same active-set list, same offset.
    pub fn peer(
        &self,
        constraint: &DifferentiableContactConstraint,
    ) -> Option<&DifferentiableContactConstraint> {
        let list = if constraint.is_upper_bound() {
            &self.upper_bound
        } else {
            &self.clamping
        };
        list.get(constraint.offset_into_world())
            .map(|&i| &self.constraints[i])
    }

    /// World row offsets whose contacts have unsupported geometry; their
    /// contribution to ∂J/∂q is silently zero.
    pub fn unsupported_rows(&self) -> &[usize] {
        &self.unsupported_rows
    }

    /// True when the step's LCP fell back past every solver; Jacobians are
    /// still defined but built from reused impulses.
    pub fn degraded(&self) -> bool {
        self.degraded
    }

    /// The step size this snapshot was taken at.
    pub fn dt(&self) -> f64 {
        self.dt
    }

    fn ndofs(&self) -> usize {
        self.pre_step_position.len()
    }

    /// Evaluate `f` with the world restored to the pre-step configuration.
    fn at_pre_step<R>(&self, world: &mut World, f: impl FnOnce(&mut World) -> R) -> R {
        let saved = RestorableSnapshot::capture(world);
        world.set_positions(&self.pre_step_position);
        world.set_velocities(&self.pre_step_velocity);
        world.set_forces(&self.pre_step_torques);
        let out = f(world);
        saved.restore(world);
        out
    }

    fn active_set(&self, world: &World, kins: &[Kinematics]) -> ActiveSet {
        let n = self.ndofs();
        let nc = self.clamping.len();
        let nub = self.upper_bound.len();

        let mut a_c = DMat::zeros(n, nc);
        for (col, &row) in self.clamping.iter().enumerate() {
            let dir = self.constraints[row].constraint_forces(world, kins);
            a_c.column_mut(col).copy_from(&dir);
        }
        let mut a_ub = DMat::zeros(n, nub);
        for (col, &row) in self.upper_bound.iter().enumerate() {
            let dir = self.constraints[row].constraint_forces(world, kins);
            a_ub.column_mut(col).copy_from(&dir);
        }
        let mut e = DMat::zeros(nub, nc);
        for (row, &(clamp_col, signed_mu)) in self.ub_mapping.iter().enumerate() {
            e[(row, clamp_col)] = signed_mu;
        }
        let a_tilde = &a_c + &a_ub * &e;

        let mut f_c = DVec::zeros(nc);
        for (col, &row) in self.clamping.iter().enumerate() {
            f_c[col] = self.impulses[row];
        }

        ActiveSet { a_c, a_ub, e, a_tilde, f_c }
    }

    /// Solve Q X = rhs with a Tikhonov retry on a singular active set.
    fn solve_active(&self, q: &DMat, rhs: &DMat) -> Option<DMat> {
        if let Some(x) = q.clone().lu().solve(rhs) {
            return Some(x);
        }
        let nc = q.nrows();
        let regularized = q + DMat::identity(nc, nc) * 1e-12;
        let solved = regularized.lu().solve(rhs);
        if solved.is_none() {
            warn!("active-set matrix is singular; treating constraints as absent");
        }
        solved
    }

    /// ∂q̇_{k+1}/∂q̇_k: the contact projection on the clamping subspace,
    /// identity on its complement.
    pub fn vel_vel_jacobian(&self, world: &mut World) -> DMat {
        self.at_pre_step(world, |world| {
            let kins = world.kinematics();
            self.vel_vel_inner(world, &kins)
        })
    }

    fn vel_vel_inner(&self, world: &World, kins: &[Kinematics]) -> DMat {
        let n = self.ndofs();
        if self.clamping.is_empty() {
            return DMat::identity(n, n);
        }
        let active = self.active_set(world, kins);
        let q = active.a_c.transpose() * &self.inv_mass_matrix * &active.a_tilde;
        match self.solve_active(&q, &active.a_c.transpose()) {
            Some(x) => DMat::identity(n, n) - &self.inv_mass_matrix * &active.a_tilde * x,
            None => DMat::identity(n, n),
        }
    }

    /// ∂q̇_{k+1}/∂τ_k = Δt · (vel→vel) · M⁻¹.
    pub fn force_vel_jacobian(&self, world: &mut World) -> DMat {
        let vel_vel = self.vel_vel_jacobian(world);
        vel_vel * &self.inv_mass_matrix * self.dt
    }

    /// ∂q_{k+1}/∂q̇_k = Δt · (vel→vel).
    pub fn vel_pos_jacobian(&self, world: &mut World) -> DMat {
        self.vel_vel_jacobian(world) * self.dt
    }

    /// ∂q_{k+1}/∂q_k = I + Δt · (pos→vel).
    pub fn pos_pos_jacobian(&self, world: &mut World) -> DMat {
        let n = self.ndofs();
        DMat::identity(n, n) + self.pos_vel_jacobian(world) * self.dt
    }

    /// ∂q̇_{k+1}/∂q_k.
    ///
    /// Assembled from the smooth-term derivatives ∂M/∂q and ∂C/∂q (the
    /// kinematics oracle), the per-row constraint-direction derivatives
    /// (the contact differentiator) and the implicit-function theorem on
    /// the clamping system Q f = −A_cᵀ q̇*.
    pub fn pos_vel_jacobian(&self, world: &mut World) -> DMat {
        self.at_pre_step(world, |world| {
            let kins = world.kinematics();
            self.pos_vel_inner(world, &kins)
        })
    }

    fn pos_vel_inner(&self, world: &World, kins: &[Kinematics]) -> DMat {
        let n = self.ndofs();
        let dt = self.dt;
        let minv = &self.inv_mass_matrix;
        let f_ext = &self.pre_step_torques - &self.bias;

        let nc = self.clamping.len();
        let active = if nc > 0 {
            Some(self.active_set(world, kins))
        } else {
            None
        };
        let q_lu = active.as_ref().map(|a| {
            (a.a_c.transpose() * minv * &a.a_tilde).lu()
        });

        // Per active constraint, the full n×n derivative of its direction.
        let clamp_jacs: Vec<DMat> = self
            .clamping
            .iter()
            .map(|&row| self.constraints[row].constraint_forces_jacobian(world, kins))
            .collect();
        let ub_jacs: Vec<DMat> = self
            .upper_bound
            .iter()
            .map(|&row| self.constraints[row].constraint_forces_jacobian(world, kins))
            .collect();

        let mut pos_vel = DMat::zeros(n, n);
        for k in 0..n {
            let wdof = world.dof(k);
            let s = wdof.skeleton;
            let offset = world.skeleton_offset(s);
            let nd = world.skeleton(s).ndofs();

            // Smooth-term derivatives, block-embedded at the owning
            // skeleton.
            let dm_block =
                mass_matrix_gradient(world.skeleton(s), world.state(s), wdof.dof.index);
            let dc_block =
                bias_gradient(world.skeleton(s), world.state(s), &world.gravity(), wdof.dof.index);
            let mut dm = DMat::zeros(n, n);
            dm.view_mut((offset, offset), (nd, nd)).copy_from(&dm_block);
            let mut dc = DVec::zeros(n);
            dc.rows_mut(offset, nd).copy_from(&dc_block);

            let dminv = -(minv * &dm * minv);
            let d_qdot_star = (&dminv * &f_ext - minv * &dc) * dt;

            let col = match (&active, &q_lu) {
                (Some(active), Some(q_lu)) => {
                    let nub = self.upper_bound.len();
                    let mut d_ac = DMat::zeros(n, nc);
                    for (c, jac) in clamp_jacs.iter().enumerate() {
                        d_ac.column_mut(c).copy_from(&jac.column(k));
                    }
                    let mut d_aub = DMat::zeros(n, nub);
                    for (c, jac) in ub_jacs.iter().enumerate() {
                        d_aub.column_mut(c).copy_from(&jac.column(k));
                    }
                    let d_atilde = &d_ac + &d_aub * &active.e;

                    let d_q = d_ac.transpose() * minv * &active.a_tilde
                        + active.a_c.transpose() * &dminv * &active.a_tilde
                        + active.a_c.transpose() * minv * &d_atilde;
                    let rhs = &d_q * &active.f_c
                        + d_ac.transpose() * &self.pre_constraint_velocity
                        + active.a_c.transpose() * &d_qdot_star;
                    let d_f = match q_lu.solve(&rhs) {
                        Some(sol) => -sol,
                        None => DVec::zeros(nc),
                    };

                    &d_qdot_star
                        + &dminv * (&active.a_tilde * &active.f_c)
                        + minv * (&d_atilde * &active.f_c + &active.a_tilde * &d_f)
                }
                _ => d_qdot_star,
            };
            pos_vel.column_mut(k).copy_from(&col);
        }
        pos_vel
    }

    /// Pull a loss gradient at step k+1 back to step k through the five
    /// Jacobians.
    pub fn backprop(&self, world: &mut World, next: &LossGradient) -> LossGradient {
        let pos_pos = self.pos_pos_jacobian(world);
        let pos_vel = self.pos_vel_jacobian(world);
        let vel_pos = self.vel_pos_jacobian(world);
        let vel_vel = self.vel_vel_jacobian(world);
        let force_vel = self.force_vel_jacobian(world);

        LossGradient {
            wrt_position: pos_pos.transpose() * &next.wrt_position
                + pos_vel.transpose() * &next.wrt_velocity,
            wrt_velocity: vel_pos.transpose() * &next.wrt_position
                + vel_vel.transpose() * &next.wrt_velocity,
            // τ reaches q_{k+1} through q̇_{k+1}: ∂q'/∂τ = Δt·(force→vel).
            wrt_torque: force_vel.transpose()
                * (&next.wrt_velocity + &next.wrt_position * self.dt),
        }
    }
}
