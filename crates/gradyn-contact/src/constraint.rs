//! Forward-side contact constraint rows.
//!
//! One contact expands into 1 + FRICTION_BASIS_DIMS LCP rows: row 0 along
//! the contact normal, the rest along the fixed ODE tangent basis of that
//! normal. The same `Contact` record underlies all rows of a contact.

use crate::{Contact, ContactKind};
use gradyn_math::{tangent_basis_ode, SpatialVec, Vec3};

/// Number of tangent rows per contact (the ODE basis has two columns).
pub const FRICTION_BASIS_DIMS: usize = 2;

/// One contact with its friction-cone geometry, owning a value copy of the
/// contact record.
#[derive(Debug, Clone)]
pub struct ContactConstraint {
    /// Value-copied contact record.
    pub contact: Contact,
}

impl ContactConstraint {
    /// Wrap a contact record.
    pub fn new(contact: Contact) -> Self {
        Self { contact }
    }

    /// Total LCP rows this contact contributes.
    pub fn num_rows(&self) -> usize {
        1 + FRICTION_BASIS_DIMS
    }

    /// World force direction of one row: the normal for row 0, else the
    /// (index−1)'th ODE tangent basis column of the current normal.
    pub fn force_direction(&self, index: usize) -> Vec3 {
        if index == 0 {
            self.contact.normal
        } else {
            tangent_basis_ode(&self.contact.normal)
                .column(index - 1)
                .into_owned()
        }
    }

    /// World 6-force of one row: a pure force `dir` applied at the contact
    /// point, as the wrench [point × dir; dir].
    pub fn world_force(&self, index: usize) -> SpatialVec {
        let dir = self.force_direction(index);
        SpatialVec::new(self.contact.point.cross(&dir), dir)
    }

    /// Whether the differentiator can attribute this contact to geometric
    /// features.
    pub fn is_supported(&self) -> bool {
        self.contact.kind != ContactKind::Unsupported
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn vertex_contact(normal: Vec3, point: Vec3) -> Contact {
        Contact {
            kind: ContactKind::VertexFace,
            point,
            normal,
            depth: 0.0,
            body_a: None,
            body_b: None,
            edges: None,
            friction: 0.5,
            restitution: 0.0,
        }
    }

    #[test]
    fn row_zero_direction_is_the_normal() {
        let c = ContactConstraint::new(vertex_contact(Vec3::y(), Vec3::zeros()));
        assert_relative_eq!(c.force_direction(0), Vec3::y(), epsilon = 1e-12);
    }

    #[test]
    fn tangent_rows_are_orthogonal_to_the_normal() {
        let normal = Vec3::new(0.6, 0.8, 0.0);
        let c = ContactConstraint::new(vertex_contact(normal, Vec3::zeros()));
        for index in 1..c.num_rows() {
            let dir = c.force_direction(index);
            assert_relative_eq!(dir.dot(&normal), 0.0, epsilon = 1e-12);
            assert_relative_eq!(dir.norm(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn world_force_head_is_point_cross_direction() {
        let point = Vec3::new(1.0, 2.0, 3.0);
        let c = ContactConstraint::new(vertex_contact(Vec3::y(), point));
        let wrench = c.world_force(0);
        assert_relative_eq!(wrench.angular, point.cross(&Vec3::y()), epsilon = 1e-12);
        assert_relative_eq!(wrench.linear, Vec3::y(), epsilon = 1e-12);
    }
}
