//! Boxed linear complementarity solving.
//!
//! The numerical routine itself is a black box behind [`BoxedLcpSolver`]:
//! given A x + b = w with lo ≤ x ≤ hi and complementarity between x and w,
//! fill in x and report success. `findex[i] = Some(j)` couples row i's
//! bounds to the magnitude of x[j] (Coulomb friction): the effective bounds
//! are lo[i]·|x[j]| and hi[i]·|x[j]|.
//!
//! The in-crate implementation is projected Gauss–Seidel, which is also the
//! fallback the step loop retries when a primary solver fails.

use gradyn_math::{DMat, DVec};
use tracing::debug;

/// Contract of a boxed LCP solver.
///
/// Returns `false` on any failure; callers must be able to recover.
pub trait BoxedLcpSolver {
    /// Human-readable solver name, for diagnostics.
    fn name(&self) -> &'static str;

    /// Solve the boxed LCP in place. `x` carries the warm-start on entry
    /// and the solution on success.
    fn solve(
        &self,
        a: &DMat,
        x: &mut DVec,
        b: &DVec,
        lo: &DVec,
        hi: &DVec,
        findex: &[Option<usize>],
    ) -> bool;
}

/// Projected Gauss–Seidel boxed-LCP solver.
#[derive(Debug, Clone)]
pub struct PgsSolver {
    /// Maximum sweep count.
    pub iterations: usize,
    /// Early-exit threshold on the largest per-sweep impulse change.
    pub tolerance: f64,
}

impl Default for PgsSolver {
    fn default() -> Self {
        Self { iterations: 256, tolerance: 1e-12 }
    }
}

impl BoxedLcpSolver for PgsSolver {
    fn name(&self) -> &'static str {
        "pgs"
    }

    fn solve(
        &self,
        a: &DMat,
        x: &mut DVec,
        b: &DVec,
        lo: &DVec,
        hi: &DVec,
        findex: &[Option<usize>],
    ) -> bool {
        let n = b.len();
        if n == 0 {
            return true;
        }

        for i in 0..n {
            if !a[(i, i)].is_finite() {
                return false;
            }
        }

        let mut sweeps = 0;
        for sweep in 0..self.iterations {
            sweeps = sweep + 1;
            let mut max_delta: f64 = 0.0;
            for i in 0..n {
                // A row with a vanishing diagonal cannot affect anything
                // (its generalized direction is zero); it keeps a zero
                // impulse.
                if a[(i, i)] < 1e-12 {
                    x[i] = 0.0;
                    continue;
                }
                let mut acc = b[i];
                for j in 0..n {
                    if j != i {
                        acc += a[(i, j)] * x[j];
                    }
                }
                let mut candidate = -acc / a[(i, i)];

                let (mut lo_i, mut hi_i) = (lo[i], hi[i]);
                if let Some(dep) = findex[i] {
                    let scale = x[dep].max(0.0);
                    lo_i *= scale;
                    hi_i *= scale;
                }
                candidate = candidate.clamp(lo_i, hi_i);

                max_delta = max_delta.max((candidate - x[i]).abs());
                x[i] = candidate;
            }
            if max_delta < self.tolerance {
                break;
            }
        }

        if x.iter().any(|v| !v.is_finite()) {
            return false;
        }
        debug!(sweeps, n, "pgs solve finished");
        true
    }
}
