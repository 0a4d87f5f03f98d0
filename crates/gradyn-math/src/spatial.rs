//! Screws, wrenches and rigid placements.
//!
//! Everything 6-dimensional here lives in [angular; linear] block order: a
//! twist is (ω, v), a wrench is (τ, f). Frames are related by [`Pose`]s
//! (rotation plus origin of one frame expressed in an enclosing frame);
//! twists move between frames through the pose adjoint and wrenches
//! through its dual, so that the power t ⋅ w is frame invariant.

use crate::{skew, Mat3, Mat6, Vec3, Vec6};
use nalgebra as na;

/// A 6D screw quantity: a twist or a wrench, depending on context.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialVec {
    /// Angular block: rotation rate for a twist, torque for a wrench.
    pub angular: Vec3,
    /// Linear block: translation rate for a twist, force for a wrench.
    pub linear: Vec3,
}

impl SpatialVec {
    /// Assemble from the two blocks.
    #[inline]
    pub fn new(angular: Vec3, linear: Vec3) -> Self {
        Self { angular, linear }
    }

    /// The zero screw.
    #[inline]
    pub fn zero() -> Self {
        Self {
            angular: Vec3::zeros(),
            linear: Vec3::zeros(),
        }
    }

    /// Pack into a flat 6-vector, angular block first.
    #[inline]
    pub fn to_vec6(&self) -> Vec6 {
        Vec6::new(
            self.angular.x,
            self.angular.y,
            self.angular.z,
            self.linear.x,
            self.linear.y,
            self.linear.z,
        )
    }

    /// Unpack from a flat 6-vector in [angular; linear] order.
    #[inline]
    pub fn from_vec6(v: &Vec6) -> Self {
        Self {
            angular: Vec3::new(v[0], v[1], v[2]),
            linear: Vec3::new(v[3], v[4], v[5]),
        }
    }

    /// Screw dot product. For a twist against a wrench this is the
    /// instantaneous power, which is what maps world contact wrenches to
    /// generalized forces.
    #[inline]
    pub fn dot(&self, other: &SpatialVec) -> f64 {
        self.angular.dot(&other.angular) + self.linear.dot(&other.linear)
    }

    /// Lie bracket ad(self, other) of two twists.
    ///
    /// Transports a descendant screw axis under a unit rate of an ancestor
    /// joint, and supplies the velocity-product terms of the recursive
    /// dynamics passes.
    pub fn ad(&self, other: &SpatialVec) -> SpatialVec {
        SpatialVec {
            angular: self.angular.cross(&other.angular),
            linear: self.angular.cross(&other.linear) + self.linear.cross(&other.angular),
        }
    }

    /// Dual bracket of a twist acting on a wrench, −adᵀ(self) · wrench.
    ///
    /// This is the v ×* (I v) product of the Newton-Euler recursion: for a
    /// body spinning with momentum I v it yields the gyroscopic wrench.
    pub fn cross_wrench(&self, wrench: &SpatialVec) -> SpatialVec {
        SpatialVec {
            angular: self.angular.cross(&wrench.angular) + self.linear.cross(&wrench.linear),
            linear: self.angular.cross(&wrench.linear),
        }
    }
}

impl std::ops::Add for SpatialVec {
    type Output = SpatialVec;
    #[inline]
    fn add(self, rhs: SpatialVec) -> SpatialVec {
        SpatialVec {
            angular: self.angular + rhs.angular,
            linear: self.linear + rhs.linear,
        }
    }
}

impl std::ops::Sub for SpatialVec {
    type Output = SpatialVec;
    #[inline]
    fn sub(self, rhs: SpatialVec) -> SpatialVec {
        SpatialVec {
            angular: self.angular - rhs.angular,
            linear: self.linear - rhs.linear,
        }
    }
}

impl std::ops::Mul<f64> for SpatialVec {
    type Output = SpatialVec;
    #[inline]
    fn mul(self, rhs: f64) -> SpatialVec {
        SpatialVec {
            angular: self.angular * rhs,
            linear: self.linear * rhs,
        }
    }
}

impl std::ops::Neg for SpatialVec {
    type Output = SpatialVec;
    #[inline]
    fn neg(self) -> SpatialVec {
        SpatialVec {
            angular: -self.angular,
            linear: -self.linear,
        }
    }
}

/// A rigid placement: the rotation and origin of one frame expressed in an
/// enclosing frame.
///
/// The same type serves for world poses of bodies, joint frames inside
/// parent frames, and exponential-map perturbations; which enclosing frame
/// is meant follows from where the pose came from. All six frame maps
/// (points, directions, twists both ways, wrenches, and the 6×6 motion
/// matrix) hang off this one type.
#[derive(Debug, Clone, Copy)]
pub struct Pose {
    /// Rotation mapping local coordinates to the enclosing frame.
    pub rot: Mat3,
    /// Local origin expressed in the enclosing frame.
    pub pos: Vec3,
}

impl Pose {
    /// The identity placement.
    pub fn identity() -> Self {
        Self {
            rot: Mat3::identity(),
            pos: Vec3::zeros(),
        }
    }

    /// A pure translation.
    pub fn translation(pos: Vec3) -> Self {
        Self {
            rot: Mat3::identity(),
            pos,
        }
    }

    /// A pure rotation about an axis through the local origin.
    pub fn from_axis_angle(axis: &na::Unit<Vec3>, angle: f64) -> Self {
        Self {
            rot: *na::Rotation3::from_axis_angle(axis, angle).matrix(),
            pos: Vec3::zeros(),
        }
    }

    /// Map a local point into the enclosing frame.
    #[inline]
    pub fn transform_point(&self, p: &Vec3) -> Vec3 {
        self.rot * p + self.pos
    }

    /// Map a local direction into the enclosing frame.
    #[inline]
    pub fn rotate(&self, v: &Vec3) -> Vec3 {
        self.rot * v
    }

    /// Place `inner` (a pose expressed in this pose's local frame) in the
    /// enclosing frame: kinematic chains compose outermost first.
    pub fn compose(&self, inner: &Pose) -> Pose {
        Pose {
            rot: self.rot * inner.rot,
            pos: self.rot * inner.pos + self.pos,
        }
    }

    /// Adjoint map on a local twist, yielding the twist about the
    /// enclosing frame's origin: ω' = Rω, v' = Rv + p × Rω.
    pub fn transform_twist(&self, t: &SpatialVec) -> SpatialVec {
        let w = self.rot * t.angular;
        SpatialVec {
            angular: w,
            linear: self.rot * t.linear + self.pos.cross(&w),
        }
    }

    /// Inverse adjoint: read an enclosing-frame twist in local
    /// coordinates about the local origin.
    pub fn untransform_twist(&self, t: &SpatialVec) -> SpatialVec {
        SpatialVec {
            angular: self.rot.transpose() * t.angular,
            linear: self.rot.transpose() * (t.linear - self.pos.cross(&t.angular)),
        }
    }

    /// Dual adjoint on a local wrench: f' = Rf, τ' = Rτ + p × Rf.
    ///
    /// Together with [`Self::transform_twist`] this keeps t ⋅ w invariant
    /// across frames.
    pub fn transform_wrench(&self, w: &SpatialVec) -> SpatialVec {
        let f = self.rot * w.linear;
        SpatialVec {
            angular: self.rot * w.angular + self.pos.cross(&f),
            linear: f,
        }
    }

    /// The 6×6 matrix of [`Self::untransform_twist`], for quadratic forms
    /// over composite inertias.
    pub fn into_local_motion_matrix(&self) -> Mat6 {
        let rt = self.rot.transpose();
        let bottom_left = -rt * skew(&self.pos);
        let mut m = Mat6::zeros();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&rt);
        m.fixed_view_mut::<3, 3>(3, 0).copy_from(&bottom_left);
        m.fixed_view_mut::<3, 3>(3, 3).copy_from(&rt);
        m
    }
}

/// Rigid-body inertia in the body's own frame: mass, center of mass and
/// the rotational inertia about that center.
#[derive(Debug, Clone, Copy)]
pub struct SpatialInertia {
    /// Body mass.
    pub mass: f64,
    /// Center of mass in the body frame.
    pub com: Vec3,
    /// Rotational inertia about the center of mass.
    pub inertia: Mat3,
}

impl SpatialInertia {
    /// Assemble from the three stored pieces.
    pub fn new(mass: f64, com: Vec3, inertia: Mat3) -> Self {
        Self { mass, com, inertia }
    }

    /// Uniform solid sphere centered at the body origin.
    pub fn sphere(mass: f64, radius: f64) -> Self {
        let i = 0.4 * mass * radius * radius;
        Self {
            mass,
            com: Vec3::zeros(),
            inertia: Mat3::from_diagonal(&Vec3::new(i, i, i)),
        }
    }

    /// Uniform thin rod of the given length lying along the body y axis,
    /// centered at the origin.
    pub fn rod(mass: f64, length: f64) -> Self {
        let i = mass * length * length / 12.0;
        Self {
            mass,
            com: Vec3::zeros(),
            inertia: Mat3::from_diagonal(&Vec3::new(i, 0.0, i)),
        }
    }

    /// Uniform solid box with the given half extents, centered at the
    /// origin.
    pub fn cuboid(mass: f64, half_extents: Vec3) -> Self {
        let sq = half_extents.component_mul(&half_extents);
        Self {
            mass,
            com: Vec3::zeros(),
            inertia: Mat3::from_diagonal(&Vec3::new(sq.y + sq.z, sq.x + sq.z, sq.x + sq.y))
                * (mass / 3.0),
        }
    }

    /// The 6×6 inertia about the body-frame origin, in [angular; linear]
    /// block order.
    ///
    /// The off-diagonal blocks are the first-moment couplings m[c]× that a
    /// nonzero center-of-mass offset introduces, and the angular block
    /// carries the matching parallel-axis shift.
    pub fn to_matrix(&self) -> Mat6 {
        let first_moment = skew(&self.com) * self.mass;
        let mut m = Mat6::zeros();
        m.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&(self.inertia - first_moment * skew(&self.com)));
        m.fixed_view_mut::<3, 3>(0, 3).copy_from(&first_moment);
        m.fixed_view_mut::<3, 3>(3, 0)
            .copy_from(&first_moment.transpose());
        m.fixed_view_mut::<3, 3>(3, 3)
            .copy_from(&(Mat3::identity() * self.mass));
        m
    }
}
