//! One differentiable contact constraint: a (contact, basis-index) pair and
//! the analytical derivatives of its geometry and generalized force with
//! respect to every generalized coordinate in the world.

use crate::{classify_dof_contact, DofContactType};
use gradyn_contact::{ContactConstraint, ContactEdges};
use gradyn_math::{
    exp_map, gradient_wrt_theta, gradient_wrt_theta_pure_rotation, skew_line_contact,
    tangent_basis_ode, tangent_basis_ode_gradient, skew_line_contact_gradient, DMat, DVec,
    SpatialVec, Vec3,
};
use gradyn_rigid::Kinematics;
use gradyn_world::{World, WorldDof};

/// One (contact, basis-index) pair with analytical gradients.
///
/// Holds a value copy of the contact record, so later world mutation cannot
/// alias it. All queries expect the world to sit at the configuration the
/// constraint was generated at (the owning snapshot restores it before
/// evaluating).
#[derive(Debug, Clone)]
pub struct DifferentiableContactConstraint {
    constraint: ContactConstraint,
    index: usize,
    offset_into_world: usize,
    is_upper_bound: bool,
}

impl DifferentiableContactConstraint {
    /// Wrap one row of a contact constraint. The contact record is copied.
    pub fn new(constraint: &ContactConstraint, index: usize) -> Self {
        assert!(index < constraint.num_rows(), "invalid basis index {}", index);
        Self {
            constraint: constraint.clone(),
            index,
            offset_into_world: 0,
            is_upper_bound: false,
        }
    }

    /// The basis index within the contact (0 = normal, else tangent).
    pub fn index_in_constraint(&self) -> usize {
        self.index
    }

    /// The wrapped forward-side constraint.
    pub fn constraint(&self) -> &ContactConstraint {
        &self.constraint
    }

    /// Record where this constraint landed in the snapshot's world-level
    /// ordering (per active-set list), for peer lookup after perturbations.
    pub fn set_offset_into_world(&mut self, offset: usize, is_upper_bound: bool) {
        self.offset_into_world = offset;
        self.is_upper_bound = is_upper_bound;
    }

    /// Offset into the owning snapshot's active-set list.
    pub fn offset_into_world(&self) -> usize {
        self.offset_into_world
    }

    /// Whether this row saturated a friction bound.
    pub fn is_upper_bound(&self) -> bool {
        self.is_upper_bound
    }

    /// The contact point in world coordinates.
    pub fn world_position(&self) -> Vec3 {
        self.constraint.contact.point
    }

    /// The contact normal in world coordinates.
    pub fn world_normal(&self) -> Vec3 {
        self.constraint.contact.normal
    }

    /// The force direction of this row: the normal for index 0, else the
    /// (index−1)'th ODE tangent-basis column of the current normal.
    pub fn world_force_direction(&self) -> Vec3 {
        self.constraint.force_direction(self.index)
    }

    /// The world 6-force of this row: [point × dir; dir].
    pub fn world_force(&self) -> SpatialVec {
        self.constraint.world_force(self.index)
    }

    /// How one DOF relates to this contact.
    pub fn dof_contact_type(&self, world: &World, dof: WorldDof) -> DofContactType {
        classify_dof_contact(world, dof, &self.constraint.contact)
    }

    /// +1, −1 or 0 depending on which side of the contact the DOF carries.
    pub fn force_multiple(&self, world: &World, dof: WorldDof) -> f64 {
        world.force_multiple(dof, &self.constraint.contact)
    }

    /// The generalized force this row applies to one skeleton, per unit
    /// impulse.
    pub fn constraint_forces_for_skeleton(
        &self,
        world: &World,
        kins: &[Kinematics],
        skeleton: usize,
    ) -> DVec {
        let skel = world.skeleton(skeleton);
        let offset = world.skeleton_offset(skeleton);
        let wrench = self.world_force();
        let mut taus = DVec::zeros(skel.ndofs());
        for i in 0..skel.ndofs() {
            let dof = world.dof(offset + i);
            let multiple = self.force_multiple(world, dof);
            if multiple != 0.0 {
                taus[i] = world.world_screw(kins, dof).dot(&wrench) * multiple;
            }
        }
        taus
    }

    /// The generalized force this row applies across the whole world, per
    /// unit impulse.
    pub fn constraint_forces(&self, world: &World, kins: &[Kinematics]) -> DVec {
        let mut taus = DVec::zeros(world.num_dofs());
        let mut cursor = 0;
        for s in 0..world.num_skeletons() {
            let block = self.constraint_forces_for_skeleton(world, kins, s);
            taus.rows_mut(cursor, block.len()).copy_from(&block);
            cursor += block.len();
        }
        taus
    }

    /// The generalized force on one DOF, per unit impulse.
    pub fn constraint_force(&self, world: &World, kins: &[Kinematics], dof: WorldDof) -> f64 {
        let multiple = self.force_multiple(world, dof);
        if multiple == 0.0 {
            return 0.0;
        }
        world.world_screw(kins, dof).dot(&self.world_force()) * multiple
    }

    /// Gradient of the contact world position with respect to one DOF.
    pub fn position_gradient(&self, world: &World, kins: &[Kinematics], dof: WorldDof) -> Vec3 {
        let contact = &self.constraint.contact;
        match self.dof_contact_type(world, dof) {
            // The face plane moves tangentially under its own DOFs; the
            // contact point rides the vertex.
            DofContactType::Face => Vec3::zeros(),
            DofContactType::Vertex
            | DofContactType::VertexFaceSelfCollision
            | DofContactType::EdgeEdgeSelfCollision => {
                let screw = world.world_screw(kins, dof);
                gradient_wrt_theta(&screw, &contact.point)
            }
            DofContactType::EdgeA => {
                let screw = world.world_screw(kins, dof);
                let edges = self.edges();
                let a_pos_g = gradient_wrt_theta(&screw, &edges.a_fixed_point);
                let a_dir_g =
                    gradient_wrt_theta_pure_rotation(&screw.angular, &edges.a_dir);
                skew_line_contact_gradient(
                    &edges.a_fixed_point,
                    &a_pos_g,
                    &edges.a_dir,
                    &a_dir_g,
                    &edges.b_fixed_point,
                    &Vec3::zeros(),
                    &edges.b_dir,
                    &Vec3::zeros(),
                )
            }
            DofContactType::EdgeB => {
                let screw = world.world_screw(kins, dof);
                let edges = self.edges();
                let b_pos_g = gradient_wrt_theta(&screw, &edges.b_fixed_point);
                let b_dir_g =
                    gradient_wrt_theta_pure_rotation(&screw.angular, &edges.b_dir);
                skew_line_contact_gradient(
                    &edges.a_fixed_point,
                    &Vec3::zeros(),
                    &edges.a_dir,
                    &Vec3::zeros(),
                    &edges.b_fixed_point,
                    &b_pos_g,
                    &edges.b_dir,
                    &b_dir_g,
                )
            }
            DofContactType::None | DofContactType::Unsupported => Vec3::zeros(),
        }
    }

    /// Gradient of the contact world normal with respect to one DOF.
    pub fn normal_gradient(&self, world: &World, kins: &[Kinematics], dof: WorldDof) -> Vec3 {
        let contact = &self.constraint.contact;
        match self.dof_contact_type(world, dof) {
            // The normal lives on the face side.
            DofContactType::Vertex => Vec3::zeros(),
            DofContactType::Face
            | DofContactType::VertexFaceSelfCollision
            | DofContactType::EdgeEdgeSelfCollision => {
                let screw = world.world_screw(kins, dof);
                gradient_wrt_theta_pure_rotation(&screw.angular, &contact.normal)
            }
            DofContactType::EdgeA => {
                let screw = world.world_screw(kins, dof);
                let edges = self.edges();
                let a_dir_g =
                    gradient_wrt_theta_pure_rotation(&screw.angular, &edges.a_dir);
                a_dir_g.cross(&edges.b_dir)
            }
            DofContactType::EdgeB => {
                let screw = world.world_screw(kins, dof);
                let edges = self.edges();
                let b_dir_g =
                    gradient_wrt_theta_pure_rotation(&screw.angular, &edges.b_dir);
                edges.a_dir.cross(&b_dir_g)
            }
            DofContactType::None | DofContactType::Unsupported => Vec3::zeros(),
        }
    }

    /// Gradient of this row's force direction with respect to one DOF.
    ///
    /// For the normal row this is the normal gradient; tangent rows chain
    /// through the ODE basis. Near-zero normal gradients short-circuit to
    /// avoid spurious tangent rotations.
    pub fn force_direction_gradient(
        &self,
        world: &World,
        kins: &[Kinematics],
        dof: WorldDof,
    ) -> Vec3 {
        match self.dof_contact_type(world, dof) {
            DofContactType::Vertex | DofContactType::None | DofContactType::Unsupported => {
                Vec3::zeros()
            }
            _ => {
                let normal_grad = self.normal_gradient(world, kins, dof);
                if self.index == 0 || normal_grad.norm_squared() <= 1e-12 {
                    normal_grad
                } else {
                    tangent_basis_ode_gradient(&self.constraint.contact.normal, &normal_grad)
                        .column(self.index - 1)
                        .into_owned()
                }
            }
        }
    }

    /// Gradient of the world 6-force [point × dir; dir] with respect to one
    /// DOF, by the product rule.
    pub fn world_force_gradient(
        &self,
        world: &World,
        kins: &[Kinematics],
        dof: WorldDof,
    ) -> SpatialVec {
        let position = self.world_position();
        let direction = self.world_force_direction();
        let direction_grad = self.force_direction_gradient(world, kins, dof);
        let position_grad = self.position_gradient(world, kins, dof);
        SpatialVec::new(
            position.cross(&direction_grad) + position_grad.cross(&direction),
            direction_grad,
        )
    }

    /// Gradient of `screw_dof`'s world screw axis as `rotate_dof` moves:
    /// zero unless `rotate_dof` is an ancestor, else the Lie bracket
    /// ad(screw(rotate), screw(axis)).
    pub fn screw_axis_gradient(
        &self,
        world: &World,
        kins: &[Kinematics],
        screw_dof: WorldDof,
        rotate_dof: WorldDof,
    ) -> SpatialVec {
        if !world.is_ancestor_of_dof(rotate_dof, screw_dof) {
            return SpatialVec::zero();
        }
        let axis = world.world_screw(kins, screw_dof);
        let rotate = world.world_screw(kins, rotate_dof);
        rotate.ad(&axis)
    }

    /// Second derivative of the generalized constraint force:
    /// ∂²(screw(dof)·F)/∂q_wrt, the full product rule on screw⋅F.
    pub fn constraint_force_derivative(
        &self,
        world: &World,
        kins: &[Kinematics],
        dof: WorldDof,
        wrt: WorldDof,
    ) -> f64 {
        let multiple = self.force_multiple(world, dof);
        if multiple == 0.0 {
            return 0.0;
        }
        let wrench = self.world_force();
        let wrench_grad = self.world_force_gradient(world, kins, wrt);
        let screw = world.world_screw(kins, dof);
        let screw_grad = self.screw_axis_gradient(world, kins, dof, wrt);
        (screw.dot(&wrench_grad) + screw_grad.dot(&wrench)) * multiple
    }

    /// Analytical Jacobian of the contact position over all world DOFs
    /// (3 × n).
    pub fn position_jacobian(&self, world: &World, kins: &[Kinematics]) -> DMat {
        let n = world.num_dofs();
        let mut jac = DMat::zeros(3, n);
        for dof in world.dofs() {
            let g = self.position_gradient(world, kins, dof);
            jac.view_mut((0, dof.index), (3, 1)).copy_from(&g);
        }
        jac
    }

    /// Analytical Jacobian of this row's force direction over all world
    /// DOFs (3 × n).
    pub fn force_direction_jacobian(&self, world: &World, kins: &[Kinematics]) -> DMat {
        let n = world.num_dofs();
        let mut jac = DMat::zeros(3, n);
        for dof in world.dofs() {
            let g = self.force_direction_gradient(world, kins, dof);
            jac.view_mut((0, dof.index), (3, 1)).copy_from(&g);
        }
        jac
    }

    /// Analytical Jacobian of the world 6-force over all world DOFs (6 × n).
    pub fn contact_force_jacobian(&self, world: &World, kins: &[Kinematics]) -> DMat {
        let n = world.num_dofs();
        let mut jac = DMat::zeros(6, n);
        for dof in world.dofs() {
            let g = self.world_force_gradient(world, kins, dof);
            jac.view_mut((0, dof.index), (6, 1)).copy_from(&g.to_vec6());
        }
        jac
    }

    /// Analytical Jacobian of the generalized constraint forces:
    /// entry (row, wrt) is ∂τ_row/∂q_wrt per unit impulse (n × n).
    pub fn constraint_forces_jacobian(&self, world: &World, kins: &[Kinematics]) -> DMat {
        let n = world.num_dofs();
        let force_jac = self.contact_force_jacobian(world, kins);
        let wrench = self.world_force();
        let dofs = world.dofs();
        let mut result = DMat::zeros(n, n);
        for row_dof in &dofs {
            let multiple = self.force_multiple(world, *row_dof);
            if multiple == 0.0 {
                continue;
            }
            let axis = world.world_screw(kins, *row_dof);
            for wrt_dof in &dofs {
                let screw_grad = self.screw_axis_gradient(world, kins, *row_dof, *wrt_dof);
                let col = force_jac.column(wrt_dof.index);
                let wrench_grad = SpatialVec::new(
                    Vec3::new(col[0], col[1], col[2]),
                    Vec3::new(col[3], col[4], col[5]),
                );
                result[(row_dof.index, wrt_dof.index)] =
                    multiple * (screw_grad.dot(&wrench) + axis.dot(&wrench_grad));
            }
        }
        result
    }

    /// Analytical Jacobian of the contact position over one skeleton's
    /// DOFs (3 × ndofs).
    pub fn position_jacobian_for_skeleton(
        &self,
        world: &World,
        kins: &[Kinematics],
        skeleton: usize,
    ) -> DMat {
        let offset = world.skeleton_offset(skeleton);
        let nd = world.skeleton(skeleton).ndofs();
        let mut jac = DMat::zeros(3, nd);
        for i in 0..nd {
            let g = self.position_gradient(world, kins, world.dof(offset + i));
            jac.view_mut((0, i), (3, 1)).copy_from(&g);
        }
        jac
    }

    /// Analytical Jacobian of this row's force direction over one
    /// skeleton's DOFs (3 × ndofs).
    pub fn force_direction_jacobian_for_skeleton(
        &self,
        world: &World,
        kins: &[Kinematics],
        skeleton: usize,
    ) -> DMat {
        let offset = world.skeleton_offset(skeleton);
        let nd = world.skeleton(skeleton).ndofs();
        let mut jac = DMat::zeros(3, nd);
        for i in 0..nd {
            let g = self.force_direction_gradient(world, kins, world.dof(offset + i));
            jac.view_mut((0, i), (3, 1)).copy_from(&g);
        }
        jac
    }

    /// Analytical Jacobian of the generalized constraint forces on every
    /// world DOF with respect to one skeleton's coordinates (n × n_wrt).
    pub fn constraint_forces_jacobian_wrt(
        &self,
        world: &World,
        kins: &[Kinematics],
        wrt_skeleton: usize,
    ) -> DMat {
        let n = world.num_dofs();
        let offset = world.skeleton_offset(wrt_skeleton);
        let nd = world.skeleton(wrt_skeleton).ndofs();
        let wrench = self.world_force();
        let mut result = DMat::zeros(n, nd);
        for row_dof in world.dofs() {
            let multiple = self.force_multiple(world, row_dof);
            if multiple == 0.0 {
                continue;
            }
            let axis = world.world_screw(kins, row_dof);
            for col in 0..nd {
                let wrt_dof = world.dof(offset + col);
                let screw_grad = self.screw_axis_gradient(world, kins, row_dof, wrt_dof);
                let wrench_grad = self.world_force_gradient(world, kins, wrt_dof);
                result[(row_dof.index, col)] =
                    multiple * (screw_grad.dot(&wrench) + axis.dot(&wrench_grad));
            }
        }
        result
    }

    /// The edge witness data of an edge-edge contact.
    ///
    /// Asking for edges of a non-edge contact is a caller bug.
    pub fn edges(&self) -> ContactEdges {
        self.constraint
            .contact
            .edges
            .expect("contact has no edge witness data")
    }

    /// Analytical estimate of the edge witness gradients under a unit rate
    /// of one DOF.
    pub fn edge_gradient(&self, world: &World, kins: &[Kinematics], dof: WorldDof) -> ContactEdges {
        let mut grad = ContactEdges {
            a_fixed_point: Vec3::zeros(),
            a_dir: Vec3::zeros(),
            b_fixed_point: Vec3::zeros(),
            b_dir: Vec3::zeros(),
        };
        let kind = self.dof_contact_type(world, dof);
        if !matches!(
            kind,
            DofContactType::EdgeA | DofContactType::EdgeB | DofContactType::EdgeEdgeSelfCollision
        ) {
            return grad;
        }
        let screw = world.world_screw(kins, dof);
        let edges = self.edges();
        if kind == DofContactType::EdgeA || kind == DofContactType::EdgeEdgeSelfCollision {
            grad.a_fixed_point = gradient_wrt_theta(&screw, &edges.a_fixed_point);
            grad.a_dir = gradient_wrt_theta_pure_rotation(&screw.angular, &edges.a_dir);
        }
        if kind == DofContactType::EdgeB || kind == DofContactType::EdgeEdgeSelfCollision {
            grad.b_fixed_point = gradient_wrt_theta(&screw, &edges.b_fixed_point);
            grad.b_dir = gradient_wrt_theta_pure_rotation(&screw.angular, &edges.b_dir);
        }
        grad
    }

    /// Analytical estimate of the contact position after perturbing one DOF
    /// by `eps`: apply the exponential of the scaled screw to the owned
    /// feature and re-evaluate the closed form.
    pub fn estimate_perturbed_position(
        &self,
        world: &World,
        kins: &[Kinematics],
        dof: WorldDof,
        eps: f64,
    ) -> Vec3 {
        let contact = &self.constraint.contact;
        match self.dof_contact_type(world, dof) {
            DofContactType::Vertex
            | DofContactType::VertexFaceSelfCollision
            | DofContactType::EdgeEdgeSelfCollision => {
                let screw = world.world_screw(kins, dof);
                exp_map(&(screw * eps)).transform_point(&contact.point)
            }
            DofContactType::EdgeA => {
                let screw = world.world_screw(kins, dof);
                let pose = exp_map(&(screw * eps));
                let edges = self.edges();
                skew_line_contact(
                    &pose.transform_point(&edges.a_fixed_point),
                    &pose.rotate(&edges.a_dir),
                    &edges.b_fixed_point,
                    &edges.b_dir,
                )
            }
            DofContactType::EdgeB => {
                let screw = world.world_screw(kins, dof);
                let pose = exp_map(&(screw * eps));
                let edges = self.edges();
                skew_line_contact(
                    &edges.a_fixed_point,
                    &edges.a_dir,
                    &pose.transform_point(&edges.b_fixed_point),
                    &pose.rotate(&edges.b_dir),
                )
            }
            _ => contact.point,
        }
    }

    /// Analytical estimate of the contact normal after perturbing one DOF.
    pub fn estimate_perturbed_normal(
        &self,
        world: &World,
        kins: &[Kinematics],
        dof: WorldDof,
        eps: f64,
    ) -> Vec3 {
        let contact = &self.constraint.contact;
        match self.dof_contact_type(world, dof) {
            DofContactType::Face
            | DofContactType::VertexFaceSelfCollision
            | DofContactType::EdgeEdgeSelfCollision => {
                let screw = world.world_screw(kins, dof);
                exp_map(&(screw * eps)).rotate(&contact.normal)
            }
            DofContactType::EdgeA => {
                let screw = world.world_screw(kins, dof);
                let rot = exp_map(&(screw * eps));
                let edges = self.edges();
                rot.rotate(&edges.a_dir).cross(&edges.b_dir)
            }
            DofContactType::EdgeB => {
                let screw = world.world_screw(kins, dof);
                let rot = exp_map(&(screw * eps));
                let edges = self.edges();
                edges.a_dir.cross(&rot.rotate(&edges.b_dir))
            }
            _ => contact.normal,
        }
    }

    /// Analytical estimate of this row's force direction after perturbing
    /// one DOF.
    pub fn estimate_perturbed_force_direction(
        &self,
        world: &World,
        kins: &[Kinematics],
        dof: WorldDof,
        eps: f64,
    ) -> Vec3 {
        match self.dof_contact_type(world, dof) {
            DofContactType::Vertex | DofContactType::None | DofContactType::Unsupported => {
                self.world_force_direction()
            }
            _ => {
                let normal = self.estimate_perturbed_normal(world, kins, dof, eps);
                if self.index == 0 {
                    normal
                } else {
                    tangent_basis_ode(&normal).column(self.index - 1).into_owned()
                }
            }
        }
    }

    /// Analytical estimate of `axis_dof`'s world screw after perturbing
    /// `rotate_dof`: transport by the exponential of the scaled rotate
    /// screw.
    pub fn estimate_perturbed_screw_axis(
        &self,
        world: &World,
        kins: &[Kinematics],
        axis_dof: WorldDof,
        rotate_dof: WorldDof,
        eps: f64,
    ) -> SpatialVec {
        let axis = world.world_screw(kins, axis_dof);
        if !world.is_ancestor_of_dof(rotate_dof, axis_dof) {
            return axis;
        }
        let rotate = world.world_screw(kins, rotate_dof);
        exp_map(&(rotate * eps)).transform_twist(&axis)
    }
}
