//! Step configuration.

use serde::{Deserialize, Serialize};

/// Parameters for one time step of the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// The timestep (default: `1.0 / 1000.0`).
    pub dt: f64,
    /// Constraint force mixing added to the LCP diagonal (default: `0.0`).
    pub cfm: f64,
    /// Touch tolerance of the narrow phase for edge-edge pairs
    /// (default: `1e-4`).
    pub collision_margin: f64,
    /// Sweep limit of the projected Gauss–Seidel solver (default: `256`).
    pub lcp_iterations: usize,
    /// Early-exit threshold of the projected Gauss–Seidel solver
    /// (default: `1e-12`).
    pub lcp_tolerance: f64,
}

impl Default for StepConfig {
    fn default() -> Self {
        Self {
            dt: 1.0 / 1000.0,
            cfm: 0.0,
            collision_margin: 1e-4,
            lcp_iterations: 256,
            lcp_tolerance: 1e-12,
        }
    }
}
