//! Mutable simulation state of a skeleton.

use gradyn_math::DVec;

/// Generalized positions, velocities and applied forces of one skeleton.
///
/// All three vectors have the skeleton's DOF count. Free-joint coordinates
/// are exponential coordinates, so q and q̇ always have the same length and
/// positions integrate additively.
#[derive(Debug, Clone)]
pub struct State {
    /// Generalized positions.
    pub q: DVec,
    /// Generalized velocities.
    pub v: DVec,
    /// Applied generalized forces (control torques).
    pub tau: DVec,
}

impl State {
    /// Zero state with the given DOF count.
    pub fn zeros(ndofs: usize) -> Self {
        Self {
            q: DVec::zeros(ndofs),
            v: DVec::zeros(ndofs),
            tau: DVec::zeros(ndofs),
        }
    }
}
