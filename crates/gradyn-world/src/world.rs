//! The world: ordered skeletons, collision geometry and the contact step.

use crate::StepConfig;
use gradyn_contact::{
    detect_contacts, BodyRef, BoxedLcpSolver, Collider, Contact, ContactConstraint, PgsSolver,
    FRICTION_BASIS_DIMS,
};
use gradyn_math::{DMat, DVec, Pose, SpatialVec, Vec3};
use gradyn_model::{Dof, Skeleton, State};
use gradyn_rigid::{crba, forward_kinematics, inverse_mass_matrix, rnea_bias, Kinematics};
use tracing::{debug, warn};

/// One degree of freedom addressed at world level.
#[derive(Debug, Clone, Copy)]
pub struct WorldDof {
    /// Skeleton index in registration order.
    pub skeleton: usize,
    /// Skeleton-local DOF.
    pub dof: Dof,
    /// Flat index into the world coordinate vector.
    pub index: usize,
}

/// LCP classification of one constraint row after the solve.
///
/// Exactly one of these holds for every row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintGroup {
    /// Active and strictly inside its bounds; contributes a Jacobian row.
    Clamping,
    /// Saturated at a friction-cone bound; contributes a bound-coupled force.
    UpperBound,
    /// Inactive (zero impulse, strict inequality).
    NotClamping,
}

/// Post-solve record of one constraint row.
#[derive(Debug, Clone, Copy)]
pub struct RowInfo {
    /// Index of the owning contact constraint.
    pub constraint: usize,
    /// Row index within the constraint (0 = normal, else tangent).
    pub index: usize,
    /// LCP classification.
    pub group: ConstraintGroup,
    /// Solved impulse.
    pub impulse: f64,
    /// Row whose impulse bounds this one (friction rows only), as a global
    /// row index.
    pub findex: Option<usize>,
}

/// Everything one step produces beyond the mutated world state: the raw
/// ingredients the backprop layer snapshots.
pub struct StepResult {
    /// Contact constraints generated this step, in detection order.
    pub constraints: Vec<ContactConstraint>,
    /// Per-row classification and impulses.
    pub rows: Vec<RowInfo>,
    /// Constraint Jacobian (rows × world DOFs): generalized force
    /// directions.
    pub jacobian: DMat,
    /// Solved impulse vector.
    pub impulses: DVec,
    /// Unconstrained post-force velocity q̇*.
    pub pre_constraint_velocity: DVec,
    /// Pre-step world mass matrix (block diagonal across skeletons).
    pub mass_matrix: DMat,
    /// Its inverse.
    pub inv_mass_matrix: DMat,
    /// Pre-step bias forces C(q, q̇).
    pub bias: DVec,
    /// True when the LCP fell back past every solver.
    pub degraded: bool,
    /// Name of the solver that produced the accepted impulses.
    pub solver_name: &'static str,
}

/// An ordered collection of skeletons plus gravity, a time step and a
/// collision oracle.
pub struct World {
    skeletons: Vec<Skeleton>,
    states: Vec<State>,
    colliders: Vec<Collider>,
    gravity: Vec3,
    config: StepConfig,
    solver: Box<dyn BoxedLcpSolver>,
    fallback: PgsSolver,
    last_impulses: DVec,
}

impl World {
    /// Create an empty world with the given step configuration.
    pub fn new(config: StepConfig) -> Self {
        let fallback = PgsSolver {
            iterations: config.lcp_iterations,
            tolerance: config.lcp_tolerance,
        };
        Self {
            skeletons: Vec::new(),
            states: Vec::new(),
            colliders: Vec::new(),
            gravity: Vec3::zeros(),
            config,
            solver: Box::new(fallback.clone()),
            fallback,
            last_impulses: DVec::zeros(0),
        }
    }

    /// Set the gravity vector.
    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = gravity;
    }

    /// The gravity vector.
    pub fn gravity(&self) -> Vec3 {
        self.gravity
    }

    /// The step configuration.
    pub fn config(&self) -> &StepConfig {
        &self.config
    }

    /// Mutable access to the step configuration.
    pub fn config_mut(&mut self) -> &mut StepConfig {
        &mut self.config
    }

    /// Replace the primary boxed-LCP solver.
    pub fn set_lcp_solver(&mut self, solver: Box<dyn BoxedLcpSolver>) {
        self.solver = solver;
    }

    /// Register a skeleton; returns its index.
    pub fn add_skeleton(&mut self, skeleton: Skeleton) -> usize {
        let state = skeleton.default_state();
        self.skeletons.push(skeleton);
        self.states.push(state);
        self.skeletons.len() - 1
    }

    /// Register a collider. Body references must name existing bodies.
    pub fn add_collider(&mut self, collider: Collider) {
        if let Some(body) = collider.body {
            assert!(
                body.skeleton < self.skeletons.len()
                    && body.body < self.skeletons[body.skeleton].nbodies(),
                "collider references unknown body {:?}",
                body
            );
        }
        self.colliders.push(collider);
    }

    /// Number of registered skeletons.
    pub fn num_skeletons(&self) -> usize {
        self.skeletons.len()
    }

    /// A skeleton by index.
    pub fn skeleton(&self, i: usize) -> &Skeleton {
        &self.skeletons[i]
    }

    /// A skeleton's state by index.
    pub fn state(&self, i: usize) -> &State {
        &self.states[i]
    }

    /// Mutable access to a skeleton's state.
    pub fn state_mut(&mut self, i: usize) -> &mut State {
        &mut self.states[i]
    }

    /// Total DOF count across all skeletons.
    pub fn num_dofs(&self) -> usize {
        self.skeletons.iter().map(|s| s.ndofs()).sum()
    }

    /// Flat coordinate offset of skeleton `i`.
    pub fn skeleton_offset(&self, i: usize) -> usize {
        self.skeletons[..i].iter().map(|s| s.ndofs()).sum()
    }

    fn gather(&self, pick: impl Fn(&State) -> &DVec) -> DVec {
        let mut out = DVec::zeros(self.num_dofs());
        let mut cursor = 0;
        for state in &self.states {
            let v = pick(state);
            out.rows_mut(cursor, v.len()).copy_from(v);
            cursor += v.len();
        }
        out
    }

    fn scatter(&mut self, data: &DVec, pick: impl Fn(&mut State) -> &mut DVec) {
        assert_eq!(data.len(), self.num_dofs(), "world vector length mismatch");
        let mut cursor = 0;
        for state in &mut self.states {
            let len = pick(state).len();
            pick(state).copy_from(&data.rows(cursor, len));
            cursor += len;
        }
    }

    /// The flat world position vector.
    pub fn positions(&self) -> DVec {
        self.gather(|s| &s.q)
    }

    /// Set the flat world position vector.
    pub fn set_positions(&mut self, q: &DVec) {
        self.scatter(q, |s| &mut s.q);
    }

    /// The flat world velocity vector.
    pub fn velocities(&self) -> DVec {
        self.gather(|s| &s.v)
    }

    /// Set the flat world velocity vector.
    pub fn set_velocities(&mut self, v: &DVec) {
        self.scatter(v, |s| &mut s.v);
    }

    /// The flat world control-force vector.
    pub fn forces(&self) -> DVec {
        self.gather(|s| &s.tau)
    }

    /// Set the flat world control-force vector.
    pub fn set_forces(&mut self, tau: &DVec) {
        self.scatter(tau, |s| &mut s.tau);
    }

    /// The world DOF at flat index `i`.
    pub fn dof(&self, i: usize) -> WorldDof {
        let mut cursor = 0;
        for (skeleton, skel) in self.skeletons.iter().enumerate() {
            if i < cursor + skel.ndofs() {
                return WorldDof {
                    skeleton,
                    dof: skel.dof(i - cursor),
                    index: i,
                };
            }
            cursor += skel.ndofs();
        }
        panic!("invalid world DOF index {} (world has {})", i, self.num_dofs());
    }

    /// All world DOFs in flat order.
    pub fn dofs(&self) -> Vec<WorldDof> {
        (0..self.num_dofs()).map(|i| self.dof(i)).collect()
    }

    /// Forward kinematics of every skeleton at the current state.
    pub fn kinematics(&self) -> Vec<Kinematics> {
        self.skeletons
            .iter()
            .zip(&self.states)
            .map(|(skel, state)| forward_kinematics(skel, state))
            .collect()
    }

    /// Placement of a body (identity for static world geometry).
    pub fn pose_of(kins: &[Kinematics], body: Option<BodyRef>) -> Pose {
        match body {
            Some(b) => kins[b.skeleton].poses[b.body],
            None => Pose::identity(),
        }
    }

    /// World screw axis of a DOF at the given kinematics.
    pub fn world_screw(&self, kins: &[Kinematics], dof: WorldDof) -> SpatialVec {
        kins[dof.skeleton].world_screw(&self.skeletons[dof.skeleton], dof.dof)
    }

    /// Whether `dof` is an ancestor of `body` (false for static geometry).
    pub fn is_ancestor_of_body(&self, dof: WorldDof, body: Option<BodyRef>) -> bool {
        match body {
            Some(b) if b.skeleton == dof.skeleton => {
                self.skeletons[dof.skeleton].is_ancestor_of_body(dof.dof, b.body)
            }
            _ => false,
        }
    }

    /// Whether `parent` is an ancestor DOF of `child`. DOFs of different
    /// skeletons are never related; within one multi-DOF joint every DOF
    /// affects the others.
    pub fn is_ancestor_of_dof(&self, parent: WorldDof, child: WorldDof) -> bool {
        parent.skeleton == child.skeleton
            && self.skeletons[parent.skeleton].is_ancestor_of_dof(parent.dof, child.dof)
    }

    /// +1 when the DOF rigidly carries side A of the contact, −1 for side B,
    /// 0 for self-collisions (forces cancel through the internal tree) and
    /// unrelated DOFs.
    pub fn force_multiple(&self, dof: WorldDof, contact: &Contact) -> f64 {
        let parent_a = self.is_ancestor_of_body(dof, contact.body_a);
        let parent_b = self.is_ancestor_of_body(dof, contact.body_b);
        match (parent_a, parent_b) {
            (true, true) => 0.0,
            (true, false) => 1.0,
            (false, true) => -1.0,
            (false, false) => 0.0,
        }
    }

    /// Generalized force direction of one constraint row over all world
    /// DOFs: τ_d = multiple(d) · (screw(d) ⋅ world_force).
    pub fn constraint_force_direction(
        &self,
        kins: &[Kinematics],
        constraint: &ContactConstraint,
        row_index: usize,
    ) -> DVec {
        let n = self.num_dofs();
        let mut direction = DVec::zeros(n);
        let wrench = constraint.world_force(row_index);
        for dof in self.dofs() {
            let multiple = self.force_multiple(dof, &constraint.contact);
            if multiple != 0.0 {
                let screw = self.world_screw(kins, dof);
                direction[dof.index] = screw.dot(&wrench) * multiple;
            }
        }
        direction
    }

    /// Run collision detection at the current state.
    pub fn collide(&self, kins: &[Kinematics]) -> Vec<Contact> {
        detect_contacts(
            &self.colliders,
            |body| Self::pose_of(kins, body),
            self.config.collision_margin,
        )
    }

    /// World mass matrix (block diagonal) and its inverse at the current
    /// positions.
    ///
    /// A skeleton whose mass matrix fails to invert (degenerate inertia)
    /// gets a zero inverse block: it is treated as unresponsive for the
    /// step rather than aborting the world.
    pub fn mass_matrices(&self) -> (DMat, DMat) {
        let n = self.num_dofs();
        let mut m = DMat::zeros(n, n);
        let mut minv = DMat::zeros(n, n);
        let mut cursor = 0;
        for (skel, state) in self.skeletons.iter().zip(&self.states) {
            let nd = skel.ndofs();
            let block = crba(skel, state);
            m.view_mut((cursor, cursor), (nd, nd)).copy_from(&block);
            match inverse_mass_matrix(&block) {
                Some(block_inv) => {
                    minv.view_mut((cursor, cursor), (nd, nd)).copy_from(&block_inv);
                }
                None => {
                    warn!(
                        skeleton = skel.name.as_str(),
                        "singular mass matrix; skeleton is unresponsive this step"
                    );
                }
            }
            cursor += nd;
        }
        (m, minv)
    }

    /// World bias force vector C(q, q̇) at the current state.
    pub fn bias_forces(&self) -> DVec {
        let n = self.num_dofs();
        let mut c = DVec::zeros(n);
        let mut cursor = 0;
        for (skel, state) in self.skeletons.iter().zip(&self.states) {
            let nd = skel.ndofs();
            c.rows_mut(cursor, nd)
                .copy_from(&rnea_bias(skel, state, &self.gravity));
            cursor += nd;
        }
        c
    }

    /// Advance the world one time step and report the step's raw
    /// ingredients.
    pub fn step(&mut self) -> StepResult {
        let n = self.num_dofs();
        let dt = self.config.dt;
        let kins = self.kinematics();

        let (mass_matrix, inv_mass_matrix) = self.mass_matrices();
        let bias = self.bias_forces();
        let tau = self.forces();
        let velocity = self.velocities();

        // Unconstrained post-force velocity.
        let pre_constraint_velocity = &velocity + &inv_mass_matrix * (&tau - &bias) * dt;

        let contacts = self.collide(&kins);
        let constraints: Vec<ContactConstraint> =
            contacts.into_iter().map(ContactConstraint::new).collect();

        let rows_per_contact = 1 + FRICTION_BASIS_DIMS;
        let n_rows = constraints.len() * rows_per_contact;

        let mut jacobian = DMat::zeros(n_rows, n);
        let mut lo = DVec::zeros(n_rows);
        let mut hi = DVec::zeros(n_rows);
        let mut findex: Vec<Option<usize>> = vec![None; n_rows];

        for (ci, constraint) in constraints.iter().enumerate() {
            let base = ci * rows_per_contact;
            for index in 0..rows_per_contact {
                let row = base + index;
                let direction = self.constraint_force_direction(&kins, constraint, index);
                jacobian.row_mut(row).copy_from(&direction.transpose());
                if index == 0 {
                    lo[row] = 0.0;
                    hi[row] = f64::INFINITY;
                } else {
                    lo[row] = -constraint.contact.friction;
                    hi[row] = constraint.contact.friction;
                    findex[row] = Some(base);
                }
            }
        }

        // LCP in impulse space: A f + b = post-step constraint velocity.
        let mut a = &jacobian * &inv_mass_matrix * jacobian.transpose();
        for i in 0..n_rows {
            a[(i, i)] += self.config.cfm;
        }
        let mut b = &jacobian * &pre_constraint_velocity;
        for (ci, constraint) in constraints.iter().enumerate() {
            let restitution = constraint.contact.restitution;
            if restitution > 0.0 {
                let row = ci * rows_per_contact;
                let approach = jacobian.row(row).transpose().dot(&velocity);
                if approach < 0.0 {
                    b[row] += restitution * approach;
                }
            }
        }

        let mut impulses = DVec::zeros(n_rows);
        let mut degraded = false;
        let mut solver_name = self.solver.name();
        let solved = self
            .solver
            .solve(&a, &mut impulses, &b, &lo, &hi, &findex);
        if !solved {
            warn!(solver = self.solver.name(), "primary LCP solver failed; retrying with PGS");
            impulses.fill(0.0);
            solver_name = self.fallback.name();
            if !self.fallback.solve(&a, &mut impulses, &b, &lo, &hi, &findex) {
                warn!("fallback LCP solver failed; reusing previous impulses (degraded step)");
                degraded = true;
                solver_name = "previous-solution";
                if self.last_impulses.len() == n_rows {
                    impulses = self.last_impulses.clone();
                } else {
                    impulses.fill(0.0);
                }
            }
        }

        // Apply impulses and integrate.
        let next_velocity = &pre_constraint_velocity
            + &inv_mass_matrix * jacobian.transpose() * &impulses;
        let next_positions = self.positions() + &next_velocity * dt;
        self.set_velocities(&next_velocity);
        self.set_positions(&next_positions);

        // Classify rows. A row whose generalized direction vanishes cannot
        // clamp anything, whatever its impulse bounds say.
        const TOL: f64 = 1e-9;
        let mut rows = Vec::with_capacity(n_rows);
        for (ci, _constraint) in constraints.iter().enumerate() {
            let base = ci * rows_per_contact;
            for index in 0..rows_per_contact {
                let row = base + index;
                let f = impulses[row];
                let group = if jacobian.row(row).norm() < TOL {
                    ConstraintGroup::NotClamping
                } else if index == 0 {
                    if f > TOL {
                        ConstraintGroup::Clamping
                    } else {
                        ConstraintGroup::NotClamping
                    }
                } else {
                    let bound = hi[row] * impulses[base].max(0.0);
                    if impulses[base] <= TOL || bound <= TOL {
                        ConstraintGroup::NotClamping
                    } else if f.abs() >= bound - TOL {
                        ConstraintGroup::UpperBound
                    } else {
                        ConstraintGroup::Clamping
                    }
                };
                rows.push(RowInfo {
                    constraint: ci,
                    index,
                    group,
                    impulse: f,
                    findex: findex[row],
                });
            }
        }

        self.last_impulses = impulses.clone();
        debug!(
            contacts = constraints.len(),
            rows = n_rows,
            solver = solver_name,
            degraded,
            "step complete"
        );

        StepResult {
            constraints,
            rows,
            jacobian,
            impulses,
            pre_constraint_velocity,
            mass_matrix,
            inv_mass_matrix,
            bias,
            degraded,
            solver_name,
        }
    }
}
