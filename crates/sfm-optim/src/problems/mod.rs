//! Optimization problems built on the backend-agnostic IR.

pub mod global_positioning;

use crate::backend::BackendSolveOptions;
use serde::{Deserialize, Serialize};

/// Options shared by the crate's optimization problems.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationBaseOptions {
    /// Maximum number of solver iterations.
    pub max_num_iterations: usize,
    /// Solver verbosity level.
    pub verbosity: usize,
    /// Threshold of the robust loss applied to residual blocks.
    pub loss_threshold: f64,
}

impl Default for OptimizationBaseOptions {
    fn default() -> Self {
        Self {
            max_num_iterations: 100,
            verbosity: 0,
            loss_threshold: 1.0,
        }
    }
}

impl OptimizationBaseOptions {
    pub(crate) fn backend_options(&self) -> BackendSolveOptions {
        BackendSolveOptions {
            max_iters: self.max_num_iterations,
            verbosity: self.verbosity,
            ..BackendSolveOptions::default()
        }
    }
}
