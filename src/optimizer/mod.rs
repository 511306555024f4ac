//! Nonlinear least-squares optimizers for pose graphs.
//!
//! Both optimizers minimize the total error `Σ ||Σ^(-1/2) r_i||²` over the poses in a
//! [`Values`], linearizing the graph with a [`LinearSystemBuilder`] and stepping on the
//! manifold with `retract`:
//! - [`LevenbergMarquardt`]: damped steps, accepts only error decreases
//! - [`GaussNewton`]: undamped steps, always accepts

use crate::core::Key;
use crate::core::factor_graph::FactorGraph;
use crate::core::linear_system::LinearSystemBuilder;
use crate::core::values::Values;
use crate::error::PoseGraphResult;
use crate::linalg::{LinearSolverType, extract_key_covariances, normal_equations};
use faer::Mat;
use std::collections::HashMap;
use std::{
    fmt,
    fmt::{Display, Formatter},
};
use thiserror::Error;
use tracing::{error, warn};
use web_time as time;

pub mod gauss_newton;
pub mod levenberg_marquardt;

pub use gauss_newton::{GaussNewton, GaussNewtonConfig};
pub use levenberg_marquardt::{LevenbergMarquardt, LevenbergMarquardtConfig};

/// Type of optimization algorithm
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerType {
    #[default]
    LevenbergMarquardt,
    GaussNewton,
}

impl Display for OptimizerType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            OptimizerType::LevenbergMarquardt => write!(f, "Levenberg-Marquardt"),
            OptimizerType::GaussNewton => write!(f, "Gauss-Newton"),
        }
    }
}

/// Optimizer-specific error types
#[derive(Debug, Clone, Error)]
pub enum OptimizerError {
    /// The normal equations could not be solved, even with the given damping
    #[error("Singular linear system (damping {damping:.2e})")]
    SingularSystem { damping: f64 },

    /// The optimizer stopped before meeting any convergence criterion
    #[error("Not converged after {iterations} iterations (final error {final_error:.6e})")]
    NotConverged { iterations: usize, final_error: f64 },

    /// Invalid optimizer configuration
    #[error("Invalid optimizer configuration: {0}")]
    InvalidConfig(String),

    /// Linear system solve failed during optimization
    #[error("Linear system solve failed: {0}")]
    LinearSolveFailed(String),
}

impl OptimizerError {
    /// Log the error with tracing::error and return self for chaining
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }

    /// Log the error with the original source error
    ///
    /// # Arguments
    /// * `source_error` - The original error (must implement Debug)
    #[must_use]
    pub fn log_with_source<E: std::fmt::Debug>(self, source_error: E) -> Self {
        error!("{} | Source: {:?}", self, source_error);
        self
    }
}

/// Result type for optimizer operations
pub type OptimizerResult<T> = Result<T, OptimizerError>;

/// Detailed convergence information.
#[derive(Debug, Clone)]
pub struct ConvergenceInfo {
    /// `||g||∞` at the last linearization
    pub final_gradient_norm: f64,
    /// `||dx||` of the last step tried
    pub final_step_norm: f64,
    /// Number of error-only evaluations of the graph
    pub error_evaluations: usize,
    /// Number of linearizations of the graph
    pub linearizations: usize,
}

impl Display for ConvergenceInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Final gradient norm: {:.2e}, Final step norm: {:.2e}, Error evaluations: {}, Linearizations: {}",
            self.final_gradient_norm,
            self.final_step_norm,
            self.error_evaluations,
            self.linearizations
        )
    }
}

/// How an optimization run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizationStatus {
    /// A convergence criterion held
    Converged,
    /// `max_iterations` reached first
    MaxIterationsReached,
    /// The linear system could not be solved
    SingularSystem,
    /// NaN or Inf in the error or gradient
    InvalidNumericalValues,
    /// Wall-clock budget exhausted
    Timeout,
}

impl Display for OptimizationStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            OptimizationStatus::Converged => write!(f, "Converged"),
            OptimizationStatus::MaxIterationsReached => write!(f, "Maximum iterations reached"),
            OptimizationStatus::SingularSystem => write!(f, "Singular linear system"),
            OptimizationStatus::InvalidNumericalValues => {
                write!(f, "Invalid numerical values (NaN/Inf) detected")
            }
            OptimizationStatus::Timeout => write!(f, "Timeout"),
        }
    }
}

/// Result of a solver execution.
///
/// Returned on every termination path; `status` tells how the run ended and `values` holds
/// the best estimate found.
#[derive(Debug, Clone)]
pub struct SolverResult {
    /// Final estimate
    pub values: Values,
    pub status: OptimizationStatus,
    pub initial_error: f64,
    pub final_error: f64,
    /// Number of linearizations performed
    pub iterations: usize,
    pub elapsed_time: time::Duration,
    pub convergence_info: Option<ConvergenceInfo>,
    /// Marginal covariance of every optimized key, in its tangent coordinates.
    ///
    /// `None` unless `compute_covariances` was enabled and `H` could be inverted.
    pub covariances: Option<HashMap<Key, Mat<f64>>>,
    /// Damping at termination (`0.0` for Gauss-Newton)
    pub final_damping: f64,
}

impl SolverResult {
    pub fn is_converged(&self) -> bool {
        self.status == OptimizationStatus::Converged
    }

    /// Turn any status other than `Converged` into an error.
    ///
    /// # Errors
    /// - `OptimizerError::SingularSystem` for `SingularSystem`
    /// - `OptimizerError::NotConverged` for every other non-converged status
    pub fn into_converged(self) -> OptimizerResult<SolverResult> {
        match self.status {
            OptimizationStatus::Converged => Ok(self),
            OptimizationStatus::SingularSystem => Err(OptimizerError::SingularSystem {
                damping: self.final_damping,
            }
            .log()),
            _ => Err(OptimizerError::NotConverged {
                iterations: self.iterations,
                final_error: self.final_error,
            }
            .log()),
        }
    }

    /// Result for a run that stopped before its first linearization.
    pub(crate) fn unstarted(
        values: Values,
        status: OptimizationStatus,
        error: f64,
        elapsed_time: time::Duration,
    ) -> Self {
        SolverResult {
            values,
            status,
            initial_error: error,
            final_error: error,
            iterations: 0,
            elapsed_time,
            convergence_info: None,
            covariances: None,
            final_damping: 0.0,
        }
    }
}

/// Error-decrease, gradient and step thresholds shared by the optimizers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergenceTolerances {
    pub relative_error_tolerance: f64,
    pub absolute_error_tolerance: f64,
    pub error_tolerance: f64,
    pub gradient_tolerance: f64,
    pub step_tolerance: f64,
}

impl ConvergenceTolerances {
    /// Whether one iteration that moved the error from `current_error` to `new_error` meets
    /// a convergence criterion.
    ///
    /// An error increase never counts as a small decrease; only the gradient and step
    /// criteria can fire on such an iteration.
    pub fn is_converged(
        &self,
        current_error: f64,
        new_error: f64,
        gradient_norm: f64,
        step_norm: f64,
    ) -> bool {
        if new_error <= self.error_tolerance || current_error == 0.0 {
            return true;
        }
        let absolute_decrease = current_error - new_error;
        let relative_decrease = absolute_decrease / current_error;
        if absolute_decrease < 0.0 {
            warn!(
                "Error increased from {:.6e} to {:.6e}",
                current_error, new_error
            );
        }
        let decrease_converged = absolute_decrease >= 0.0
            && (relative_decrease <= self.relative_error_tolerance
                || absolute_decrease <= self.absolute_error_tolerance);

        decrease_converged
            || gradient_norm <= self.gradient_tolerance
            || step_norm <= self.step_tolerance
    }

    pub(crate) fn validate(&self) -> OptimizerResult<()> {
        let all = [
            self.relative_error_tolerance,
            self.absolute_error_tolerance,
            self.error_tolerance,
            self.gradient_tolerance,
            self.step_tolerance,
        ];
        if all.iter().any(|t| !t.is_finite() || *t < 0.0) {
            return Err(OptimizerError::InvalidConfig(
                "tolerances must be finite and non-negative".to_string(),
            )
            .log());
        }
        Ok(())
    }
}

/// Counts consecutive converged iterations.
#[derive(Debug, Clone)]
pub(crate) struct ConvergenceWindow {
    required: usize,
    consecutive: usize,
}

impl ConvergenceWindow {
    pub(crate) fn new(required: usize) -> Self {
        ConvergenceWindow {
            required: required.max(1),
            consecutive: 0,
        }
    }

    /// Record one iteration and report whether the window is full.
    pub(crate) fn record(&mut self, converged: bool) -> bool {
        if converged {
            self.consecutive += 1;
        } else {
            self.consecutive = 0;
        }
        self.consecutive >= self.required
    }
}

/// Marginal covariances at `values` from an undamped factorization of `H`.
///
/// Returns `None` (with a warning) if `H` is singular.
pub(crate) fn compute_covariances(
    builder: &LinearSystemBuilder,
    graph: &FactorGraph,
    values: &Values,
    linear_solver_type: LinearSolverType,
) -> PoseGraphResult<Option<HashMap<Key, Mat<f64>>>> {
    let system = builder.linearize(graph, values)?;
    let normal = normal_equations(&system.residual, &system.jacobian)?;
    let mut solver = linear_solver_type.create();
    if solver.solve_normal_equation(&normal).is_err() {
        warn!("Covariances unavailable: information matrix is singular");
        return Ok(None);
    }
    Ok(solver
        .compute_covariance_matrix()
        .map(|covariance| extract_key_covariances(covariance, builder.ordering())))
}

/// Optimize with the default Levenberg-Marquardt configuration, never failing.
///
/// Returns the optimized values whatever the final status, or a copy of `initial` if the
/// problem itself is malformed (missing keys, mismatched pose types, ...). Errors are logged.
pub fn optimize_safely(graph: &FactorGraph, initial: &Values) -> Values {
    match LevenbergMarquardt::new().optimize(graph, initial) {
        Ok(result) => result.values,
        Err(e) => {
            error!("Optimization failed, returning initial values: {}", e.chain_compact());
            initial.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tolerances() -> ConvergenceTolerances {
        ConvergenceTolerances {
            relative_error_tolerance: 1e-5,
            absolute_error_tolerance: 1e-5,
            error_tolerance: 0.0,
            gradient_tolerance: 1e-12,
            step_tolerance: 1e-12,
        }
    }

    #[test]
    fn test_decrease_criteria() {
        let t = tolerances();
        assert!(!t.is_converged(10.0, 5.0, 1.0, 1.0));
        // relative decrease 1e-6
        assert!(t.is_converged(10.0, 10.0 - 1e-5, 1.0, 1.0));
        // absolute decrease below 1e-5 even though relative is large
        assert!(t.is_converged(1e-5, 5e-6, 1.0, 1.0));
        assert!(t.is_converged(3.0, 3.0, 1.0, 1.0));
    }

    #[test]
    fn test_zero_error_converges() {
        let t = tolerances();
        assert!(t.is_converged(1.0, 0.0, 1.0, 1.0));
        assert!(t.is_converged(0.0, 0.0, 1.0, 1.0));
    }

    #[test]
    fn test_increase_only_converges_on_gradient_or_step() {
        let t = tolerances();
        assert!(!t.is_converged(1.0, 2.0, 1.0, 1.0));
        assert!(t.is_converged(1.0, 2.0, 0.0, 1.0));
        assert!(t.is_converged(1.0, 2.0, 1.0, 0.0));
    }

    #[test]
    fn test_invalid_tolerances_rejected() {
        let mut t = tolerances();
        assert!(t.validate().is_ok());
        t.step_tolerance = -1.0;
        assert!(matches!(t.validate(), Err(OptimizerError::InvalidConfig(_))));
    }

    #[test]
    fn test_convergence_window() {
        let mut window = ConvergenceWindow::new(2);
        assert!(!window.record(true));
        assert!(!window.record(false));
        assert!(!window.record(true));
        assert!(window.record(true));
        assert!(ConvergenceWindow::new(0).record(true));
    }

    #[test]
    fn test_into_converged() {
        let result = SolverResult::unstarted(
            Values::new(),
            OptimizationStatus::Converged,
            0.0,
            time::Duration::from_secs(0),
        );
        assert!(result.clone().into_converged().is_ok());

        let mut failed = result.clone();
        failed.status = OptimizationStatus::MaxIterationsReached;
        assert!(matches!(
            failed.into_converged(),
            Err(OptimizerError::NotConverged { .. })
        ));

        let mut singular = result;
        singular.status = OptimizationStatus::SingularSystem;
        singular.final_damping = 1e10;
        assert!(matches!(
            singular.into_converged(),
            Err(OptimizerError::SingularSystem { damping }) if damping == 1e10
        ));
    }
}
