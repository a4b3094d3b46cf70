//! Newton-based optimization for NDT scan matching.
//!
//! This module implements the optimization loop for NDT:
//! 1. Transform source points using current pose
//! 2. Compute derivatives (gradient + Hessian)
//! 3. Solve the regularized Newton system for a step direction
//! 4. Backtrack along it, update the pose and check convergence
//!
//! Based on Magnusson 2009, Chapter 6.

pub mod line_search;
pub mod newton;
pub mod oscillation;
pub mod solver;
pub mod types;

pub use line_search::{backtracking_line_search, LineSearchConfig, LineSearchResult};
pub use newton::{condition_number, newton_step};
pub use oscillation::{count_oscillation, OscillationResult, DEFAULT_OSCILLATION_THRESHOLD};
pub use solver::{register, NdtOptimizer, OptimizationConfig};
pub use types::{IterationRecord, NdtConfig, NdtResult, RegistrationStatus};
