//! Screw-calculus gradients.
//!
//! The contact differentiator needs first derivatives of geometric
//! quantities under a unit rate of a single screw axis: world points,
//! rotated directions, the closest point between two skew lines, and the
//! ODE friction tangent basis. All formulas here are closed-form and exact
//! to first order; the matching `exp_map` perturbation path is what the
//! finite-difference probes use.

use crate::{skew, Mat3, Mat32, Pose, SpatialVec, Vec3};

/// Instantaneous velocity of the world point `point` under a unit rate of
/// the world screw `screw` = [ω; v]:  ω × p + v.
#[inline]
pub fn gradient_wrt_theta(screw: &SpatialVec, point: &Vec3) -> Vec3 {
    screw.angular.cross(point) + screw.linear
}

/// Instantaneous change of a world direction under a unit rotation rate:
/// ω × d. Directions are unaffected by the translational part of a screw.
#[inline]
pub fn gradient_wrt_theta_pure_rotation(omega: &Vec3, dir: &Vec3) -> Vec3 {
    omega.cross(dir)
}

/// Derivative of normalize(v) given dv: (dv − v̂ (v̂ · dv)) / |v|.
pub fn normalize_gradient(v: &Vec3, dv: &Vec3) -> Vec3 {
    let norm = v.norm();
    let unit = v / norm;
    (dv - unit * unit.dot(dv)) / norm
}

/// Exponential map of a twist [ω; v] to a rigid placement.
///
/// R = exp([ω]×) by Rodrigues; the translation uses the SE(3) left Jacobian
/// V(ω) = I + (1−cosθ)/θ² [ω]× + (θ−sinθ)/θ³ [ω]×².
pub fn exp_map(twist: &SpatialVec) -> Pose {
    let w = twist.angular;
    let v = twist.linear;
    let theta2 = w.norm_squared();

    if theta2 < 1e-24 {
        return Pose { rot: Mat3::identity(), pos: v };
    }

    let theta = theta2.sqrt();
    let wx = skew(&w);
    let wx2 = wx * wx;
    let a = theta.sin() / theta;
    let b = (1.0 - theta.cos()) / theta2;
    let c = (theta - theta.sin()) / (theta2 * theta);

    let rot = Mat3::identity() + wx * a + wx2 * b;
    let vmat = Mat3::identity() + wx * b + wx2 * c;
    Pose { rot, pos: vmat * v }
}

/// Closest-approach point of two skew lines, reported as the midpoint of
/// the two per-line closest points.
///
/// Line A passes through `pa` along `da`, line B through `pb` along `db`.
/// When the contact actually touches, both per-line points coincide and the
/// midpoint is the contact point. Parallel lines fall back to the midpoint
/// of the two anchors.
pub fn skew_line_contact(pa: &Vec3, da: &Vec3, pb: &Vec3, db: &Vec3) -> Vec3 {
    let w = pb - pa;
    let n = da.cross(db);
    let n2 = n.norm_squared();
    if n2 < 1e-18 {
        return (pa + pb) * 0.5;
    }

    let ta = w.cross(db).dot(&n) / n2;
    let tb = w.cross(da).dot(&n) / n2;
    let ca = pa + da * ta;
    let cb = pb + db * tb;
    (ca + cb) * 0.5
}

/// Full product-rule derivative of [`skew_line_contact`] given the
/// derivatives of both anchors and both directions.
#[allow(clippy::too_many_arguments)]
pub fn skew_line_contact_gradient(
    pa: &Vec3,
    d_pa: &Vec3,
    da: &Vec3,
    d_da: &Vec3,
    pb: &Vec3,
    d_pb: &Vec3,
    db: &Vec3,
    d_db: &Vec3,
) -> Vec3 {
    let w = pb - pa;
    let dw = d_pb - d_pa;
    let n = da.cross(db);
    let n2 = n.norm_squared();
    if n2 < 1e-18 {
        return (d_pa + d_pb) * 0.5;
    }
    let dn = d_da.cross(db) + da.cross(d_db);
    let dn2 = 2.0 * n.dot(&dn);

    let num_a = w.cross(db).dot(&n);
    let d_num_a = (dw.cross(db) + w.cross(d_db)).dot(&n) + w.cross(db).dot(&dn);
    let ta = num_a / n2;
    let d_ta = (d_num_a - ta * dn2) / n2;

    let num_b = w.cross(da).dot(&n);
    let d_num_b = (dw.cross(da) + w.cross(d_da)).dot(&n) + w.cross(da).dot(&dn);
    let tb = num_b / n2;
    let d_tb = (d_num_b - tb * dn2) / n2;

    let d_ca = d_pa + da * d_ta + d_da * ta;
    let d_cb = d_pb + db * d_tb + d_db * tb;
    (d_ca + d_cb) * 0.5
}

const TANGENT_EPSILON: f64 = 1e-6;

/// The fixed two-column ODE friction tangent basis of a unit normal.
///
/// First column: normalize(z × n), falling back to normalize(x × n) when the
/// normal is (anti)parallel to z. Second column: the first rotated a quarter
/// turn about the normal, which for a unit normal is n × t.
pub fn tangent_basis_ode(normal: &Vec3) -> Mat32 {
    let mut tangent = Vec3::z().cross(normal);
    if tangent.norm() < TANGENT_EPSILON {
        tangent = Vec3::x().cross(normal);
    }
    tangent.normalize_mut();
    let second = normal.cross(&tangent);
    Mat32::from_columns(&[tangent, second])
}

/// Derivative of [`tangent_basis_ode`] given the derivative of the normal.
///
/// The branch (z-cross vs x-cross) must match the one taken for the value;
/// both columns then follow by the chain rule:
/// dt̂ = d(normalize)(z × n)[z × dn],  d(n × t̂) = dn × t̂ + n × dt̂.
pub fn tangent_basis_ode_gradient(normal: &Vec3, normal_grad: &Vec3) -> Mat32 {
    let mut tangent = Vec3::z().cross(normal);
    let mut tangent_grad = Vec3::z().cross(normal_grad);
    if tangent.norm() < TANGENT_EPSILON {
        tangent = Vec3::x().cross(normal);
        tangent_grad = Vec3::x().cross(normal_grad);
    }
    let unit_grad = normalize_gradient(&tangent, &tangent_grad);
    tangent.normalize_mut();
    let second_grad = normal_grad.cross(&tangent) + normal.cross(&unit_grad);
    Mat32::from_columns(&[unit_grad, second_grad])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn point_gradient_of_revolute_screw() {
        // Rotation about z through the origin: a point on the x axis moves
        // along +y at unit rate.
        let screw = SpatialVec::new(Vec3::z(), Vec3::zeros());
        let g = gradient_wrt_theta(&screw, &Vec3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(g, Vec3::new(0.0, 1.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn exp_map_matches_gradient_to_first_order() {
        let screw = SpatialVec::new(Vec3::new(0.3, -0.2, 0.9), Vec3::new(0.1, 0.4, -0.5));
        let p = Vec3::new(0.7, -1.1, 0.2);
        let eps = 1e-7;

        let perturbed = exp_map(&(screw * eps)).transform_point(&p);
        let fd = (perturbed - p) / eps;
        let analytical = gradient_wrt_theta(&screw, &p);
        assert_relative_eq!(fd, analytical, epsilon = 1e-6);
    }

    #[test]
    fn skew_line_contact_of_crossing_axes() {
        // Edges along x and y, both through the origin: contact at the origin.
        let c = skew_line_contact(
            &Vec3::new(-1.0, 0.0, 0.0),
            &Vec3::x(),
            &Vec3::new(0.0, -1.0, 0.0),
            &Vec3::y(),
        );
        assert_relative_eq!(c, Vec3::zeros(), epsilon = 1e-12);
    }

    #[test]
    fn skew_line_contact_midpoint_of_offset_lines() {
        // Same axes separated by 1 along z: midpoint sits at z = 0.5.
        let c = skew_line_contact(
            &Vec3::new(-1.0, 0.0, 0.0),
            &Vec3::x(),
            &Vec3::new(0.0, -1.0, 1.0),
            &Vec3::y(),
        );
        assert_relative_eq!(c, Vec3::new(0.0, 0.0, 0.5), epsilon = 1e-12);
    }

    #[test]
    fn skew_line_gradient_matches_finite_difference() {
        let pa = Vec3::new(-1.0, 0.1, 0.0);
        let da = Vec3::new(1.0, 0.05, 0.02).normalize();
        let pb = Vec3::new(0.2, -1.0, 0.3);
        let db = Vec3::new(0.03, 1.0, -0.04).normalize();

        // Perturb everything at once along arbitrary rates.
        let d_pa = Vec3::new(0.3, -0.1, 0.2);
        let d_da = Vec3::new(-0.05, 0.2, 0.1);
        let d_pb = Vec3::new(0.0, 0.4, -0.3);
        let d_db = Vec3::new(0.2, 0.0, 0.15);

        let eps = 1e-7;
        let fd = (skew_line_contact(
            &(pa + d_pa * eps),
            &(da + d_da * eps),
            &(pb + d_pb * eps),
            &(db + d_db * eps),
        ) - skew_line_contact(&pa, &da, &pb, &db))
            / eps;

        let analytical =
            skew_line_contact_gradient(&pa, &d_pa, &da, &d_da, &pb, &d_pb, &db, &d_db);
        assert_relative_eq!(fd, analytical, epsilon = 1e-5);
    }

    #[test]
    fn tangent_basis_is_orthonormal_to_normal() {
        for normal in [
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(0.6, 0.0, 0.8),
        ] {
            let basis = tangent_basis_ode(&normal);
            let t0 = basis.column(0).into_owned();
            let t1 = basis.column(1).into_owned();
            assert_relative_eq!(t0.dot(&normal), 0.0, epsilon = 1e-12);
            assert_relative_eq!(t1.dot(&normal), 0.0, epsilon = 1e-12);
            assert_relative_eq!(t0.dot(&t1), 0.0, epsilon = 1e-12);
            assert_relative_eq!(t0.norm(), 1.0, epsilon = 1e-12);
            assert_relative_eq!(t1.norm(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn tangent_basis_gradient_matches_finite_difference() {
        let normal = Vec3::new(0.1, 0.9, 0.2).normalize();
        let normal_grad = normalize_gradient(
            &Vec3::new(0.1, 0.9, 0.2),
            &Vec3::new(0.4, -0.3, 0.2),
        );

        let eps = 1e-7;
        let perturbed = (Vec3::new(0.1, 0.9, 0.2) + Vec3::new(0.4, -0.3, 0.2) * eps).normalize();
        let fd = (tangent_basis_ode(&perturbed) - tangent_basis_ode(&normal)) / eps;
        let analytical = tangent_basis_ode_gradient(&normal, &normal_grad);

        for i in 0..3 {
            for j in 0..2 {
                assert_relative_eq!(fd[(i, j)], analytical[(i, j)], epsilon = 1e-5);
            }
        }
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_vec3(range: f64) -> impl Strategy<Value = Vec3> {
        (-range..range, -range..range, -range..range).prop_map(|(x, y, z)| Vec3::new(x, y, z))
    }

    proptest! {
        #[test]
        fn exp_map_is_rigid(w in arb_vec3(2.0), v in arb_vec3(2.0)) {
            let pose = exp_map(&SpatialVec::new(w, v));
            let det = pose.rot.determinant();
            prop_assert!((det - 1.0).abs() < 1e-9, "det = {}", det);
            let rrt = pose.rot * pose.rot.transpose();
            for i in 0..3 {
                for j in 0..3 {
                    let id = if i == j { 1.0 } else { 0.0 };
                    prop_assert!((rrt[(i, j)] - id).abs() < 1e-9);
                }
            }
        }

        #[test]
        fn tangent_gradient_is_orthogonal_to_tangent(
            n in arb_vec3(1.0).prop_filter("nonzero", |v| v.norm() > 0.1),
            dn_raw in arb_vec3(1.0),
        ) {
            // A unit vector's derivative is orthogonal to it; both tangent
            // columns keep unit norm to first order.
            let normal = n.normalize();
            let dn = normalize_gradient(&n, &dn_raw);
            let basis = tangent_basis_ode(&normal);
            let grad = tangent_basis_ode_gradient(&normal, &dn);
            for col in 0..2 {
                let t = basis.column(col).into_owned();
                let dt = grad.column(col).into_owned();
                prop_assert!(t.dot(&dt).abs() < 1e-9, "col {} drift {}", col, t.dot(&dt));
            }
        }

        #[test]
        fn point_gradient_linear_in_screw(
            w in arb_vec3(1.0),
            v in arb_vec3(1.0),
            p in arb_vec3(5.0),
            s in 0.1..5.0f64,
        ) {
            let screw = SpatialVec::new(w, v);
            let scaled = screw * s;
            let g1 = gradient_wrt_theta(&screw, &p) * s;
            let g2 = gradient_wrt_theta(&scaled, &p);
            prop_assert!((g1 - g2).norm() < 1e-9);
        }
    }
}
