//! Gauss-Newton algorithm for pose graphs.
//!
//! Solves the undamped normal equations at every linearization point,
//!
//! ```text
//! (JᵀJ)·dx = -Jᵀr
//! ```
//!
//! and always commits `x ⊞ dx`. Converges quadratically from a good initial estimate, but
//! needs a well-posed problem. A graph without an anchor is rank deficient. With the sparse
//! Cholesky backend a `JᵀJ` that cannot be factorized stops the run with
//! [`OptimizationStatus::SingularSystem`]. Sparse QR may still return a finite
//! least-squares step for a rank-deficient system, and only a non-finite step is reported
//! as singular. Use [`LevenbergMarquardt`](crate::optimizer::LevenbergMarquardt) when the
//! initial estimate is poor or the gauge is not fixed.

use crate::core::factor_graph::FactorGraph;
use crate::core::linear_system::LinearSystemBuilder;
use crate::core::ordering::OrderingType;
use crate::core::values::Values;
use crate::error::PoseGraphResult;
use crate::linalg::{LinearSolverType, normal_equations};
use crate::optimizer::{
    ConvergenceInfo, ConvergenceTolerances, ConvergenceWindow, OptimizationStatus,
    OptimizerError, SolverResult, compute_covariances,
};
use tracing::{debug, info, warn};
use web_time::{Duration, Instant};

/// Configuration parameters for the Gauss-Newton optimizer.
///
/// Same convergence criteria as
/// [`LevenbergMarquardtConfig`](crate::optimizer::LevenbergMarquardtConfig), without the
/// damping schedule.
#[derive(Debug, Clone)]
pub struct GaussNewtonConfig {
    pub linear_solver_type: LinearSolverType,
    pub ordering: OrderingType,
    pub max_iterations: usize,
    pub relative_error_tolerance: f64,
    pub absolute_error_tolerance: f64,
    pub error_tolerance: f64,
    pub gradient_tolerance: f64,
    pub step_tolerance: f64,
    pub convergence_window: usize,
    pub timeout: Option<Duration>,
    pub compute_covariances: bool,
}

impl Default for GaussNewtonConfig {
    fn default() -> Self {
        Self {
            linear_solver_type: LinearSolverType::default(),
            ordering: OrderingType::default(),
            max_iterations: 100,
            relative_error_tolerance: 1e-5,
            absolute_error_tolerance: 1e-5,
            error_tolerance: 0.0,
            gradient_tolerance: 1e-12,
            step_tolerance: 1e-12,
            convergence_window: 1,
            timeout: None,
            compute_covariances: false,
        }
    }
}

impl GaussNewtonConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_linear_solver_type(mut self, linear_solver_type: LinearSolverType) -> Self {
        self.linear_solver_type = linear_solver_type;
        self
    }

    pub fn with_ordering(mut self, ordering: OrderingType) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_relative_error_tolerance(mut self, tolerance: f64) -> Self {
        self.relative_error_tolerance = tolerance;
        self
    }

    pub fn with_absolute_error_tolerance(mut self, tolerance: f64) -> Self {
        self.absolute_error_tolerance = tolerance;
        self
    }

    pub fn with_error_tolerance(mut self, tolerance: f64) -> Self {
        self.error_tolerance = tolerance;
        self
    }

    pub fn with_gradient_tolerance(mut self, tolerance: f64) -> Self {
        self.gradient_tolerance = tolerance;
        self
    }

    pub fn with_step_tolerance(mut self, tolerance: f64) -> Self {
        self.step_tolerance = tolerance;
        self
    }

    pub fn with_convergence_window(mut self, window: usize) -> Self {
        self.convergence_window = window;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_compute_covariances(mut self, compute_covariances: bool) -> Self {
        self.compute_covariances = compute_covariances;
        self
    }

    pub fn tolerances(&self) -> ConvergenceTolerances {
        ConvergenceTolerances {
            relative_error_tolerance: self.relative_error_tolerance,
            absolute_error_tolerance: self.absolute_error_tolerance,
            error_tolerance: self.error_tolerance,
            gradient_tolerance: self.gradient_tolerance,
            step_tolerance: self.step_tolerance,
        }
    }

    /// Dump the configuration at DEBUG level
    pub fn print_configuration(&self) {
        debug!(
            "Configuration:\n  Solver:        Gauss-Newton\n  Linear solver: {}\n  Ordering:      {}\n  Max iterations:      {}\n  Relative tolerance:  {:.2e}\n  Absolute tolerance:  {:.2e}\n  Error tolerance:     {:.2e}\n  Gradient tolerance:  {:.2e}\n  Step tolerance:      {:.2e}\n  Window:              {}\n  Timeout:             {:?}",
            self.linear_solver_type,
            self.ordering,
            self.max_iterations,
            self.relative_error_tolerance,
            self.absolute_error_tolerance,
            self.error_tolerance,
            self.gradient_tolerance,
            self.step_tolerance,
            self.convergence_window,
            self.timeout
        );
    }
}

/// Gauss-Newton solver for pose graphs.
#[derive(Debug, Clone, Default)]
pub struct GaussNewton {
    config: GaussNewtonConfig,
}

impl GaussNewton {
    pub fn new() -> Self {
        Self::with_config(GaussNewtonConfig::default())
    }

    pub fn with_config(config: GaussNewtonConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GaussNewtonConfig {
        &self.config
    }

    /// Minimize the total error of `graph` starting from `initial`.
    ///
    /// # Errors
    /// Same as [`LevenbergMarquardt::optimize`](crate::optimizer::LevenbergMarquardt::optimize).
    pub fn optimize(&self, graph: &FactorGraph, initial: &Values) -> PoseGraphResult<SolverResult> {
        let start_time = Instant::now();
        self.config.tolerances().validate()?;

        if graph.is_empty() {
            info!("Gauss-Newton: empty graph, nothing to optimize");
            return Ok(SolverResult::unstarted(
                initial.clone(),
                OptimizationStatus::Converged,
                0.0,
                start_time.elapsed(),
            ));
        }

        let builder = LinearSystemBuilder::new(graph, initial, &self.config.ordering)?;
        let initial_error = builder.error_only(graph, initial)?;
        if !initial_error.is_finite() {
            warn!("Initial error is not finite");
            return Ok(SolverResult::unstarted(
                initial.clone(),
                OptimizationStatus::InvalidNumericalValues,
                initial_error,
                start_time.elapsed(),
            ));
        }
        if initial_error <= self.config.error_tolerance {
            return Ok(SolverResult::unstarted(
                initial.clone(),
                OptimizationStatus::Converged,
                initial_error,
                start_time.elapsed(),
            ));
        }

        let debug_enabled = tracing::enabled!(tracing::Level::DEBUG);
        if debug_enabled {
            self.config.print_configuration();
        }

        let tolerances = self.config.tolerances();
        let mut window = ConvergenceWindow::new(self.config.convergence_window);
        let mut linear_solver = self.config.linear_solver_type.create();
        let mut values = initial.clone();
        let mut error = initial_error;
        let mut iteration = 0;
        let mut error_evaluations = 1;
        let mut final_gradient_norm = 0.0;
        let mut final_step_norm = 0.0;

        let status = loop {
            if iteration >= self.config.max_iterations {
                break OptimizationStatus::MaxIterationsReached;
            }
            if let Some(timeout) = self.config.timeout
                && start_time.elapsed() >= timeout
            {
                break OptimizationStatus::Timeout;
            }

            let system = builder.linearize(graph, &values)?;
            let normal = normal_equations(&system.residual, &system.jacobian)?;
            iteration += 1;

            let gradient_norm = normal.gradient_max_norm();
            if !gradient_norm.is_finite() {
                break OptimizationStatus::InvalidNumericalValues;
            }
            final_gradient_norm = gradient_norm;

            let dx = match linear_solver.solve_normal_equation(&normal) {
                Ok(dx) => dx,
                Err(e) => {
                    warn!(
                        "{}",
                        OptimizerError::LinearSolveFailed(e.to_string())
                    );
                    break OptimizationStatus::SingularSystem;
                }
            };
            let step_norm = dx.norm_l2();
            final_step_norm = step_norm;

            let candidate = values.retract(&builder.step_to_deltas(&dx))?;
            let new_error = builder.error_only(graph, &candidate)?;
            error_evaluations += 1;
            if !new_error.is_finite() {
                break OptimizationStatus::InvalidNumericalValues;
            }

            if debug_enabled {
                debug!(
                    "{:>4}  error {:>13.6e}  change {:>13.2e}  |gradient| {:>11.2e}  |step| {:>11.2e}",
                    iteration,
                    new_error,
                    error - new_error,
                    gradient_norm,
                    step_norm
                );
            }

            let previous_error = error;
            values = candidate;
            error = new_error;

            let converged = tolerances.is_converged(previous_error, error, gradient_norm, step_norm);
            if window.record(converged) {
                break OptimizationStatus::Converged;
            }
        };

        let covariances = if self.config.compute_covariances {
            compute_covariances(&builder, graph, &values, self.config.linear_solver_type)?
        } else {
            None
        };

        info!(
            "Gauss-Newton: {} after {} iterations, error {:.6e} -> {:.6e}",
            status, iteration, initial_error, error
        );

        Ok(SolverResult {
            values,
            status,
            initial_error,
            final_error: error,
            iterations: iteration,
            elapsed_time: start_time.elapsed(),
            convergence_info: Some(ConvergenceInfo {
                final_gradient_norm,
                final_step_norm,
                error_evaluations,
                linearizations: iteration,
            }),
            covariances,
            final_damping: 0.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::noise_model::DiagonalNoise;
    use crate::factors::{BetweenFactor, EqualityFactor, PriorFactor};
    use crate::manifold::se2::SE2;
    use crate::manifold::se3::SE3;
    use crate::manifold::LieGroup;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    const TOLERANCE: f64 = 1e-6;

    fn chain_se3() -> Result<(FactorGraph, Values), Box<dyn std::error::Error>> {
        let mut graph = FactorGraph::new();
        graph.add(EqualityFactor::new(0, SE3::identity()));
        let step = SE3::from_translation_euler(1.0, 0.0, 0.0, 0.0, 0.0, 0.3);
        for i in 0..3u64 {
            graph.add(BetweenFactor::new(
                i,
                i + 1,
                step.clone(),
                DiagonalNoise::isotropic(6, 0.1)?,
            )?);
        }
        let mut values = Values::new();
        values.insert(0, SE3::identity())?;
        values.insert(1, SE3::from_translation_euler(1.1, 0.1, 0.0, 0.0, 0.05, 0.25))?;
        values.insert(2, SE3::from_translation_euler(1.9, 0.4, -0.1, 0.02, 0.0, 0.65))?;
        values.insert(3, SE3::from_translation_euler(2.5, 1.0, 0.1, 0.0, -0.03, 0.85))?;
        Ok((graph, values))
    }

    #[test]
    fn test_default_config() {
        let config = GaussNewtonConfig::default();
        assert_eq!(config.max_iterations, 100);
        assert_eq!(config.relative_error_tolerance, 1e-5);
        assert!(config.timeout.is_none());
    }

    #[test]
    fn test_chain_converges() -> TestResult {
        let (graph, values) = chain_se3()?;
        let result = GaussNewton::new().optimize(&graph, &values)?;
        assert_eq!(result.status, OptimizationStatus::Converged);
        assert!(result.final_error < 1e-6);

        let step = SE3::from_translation_euler(1.0, 0.0, 0.0, 0.0, 0.0, 0.3);
        let expected = step.compose(&step, None, None).compose(&step, None, None);
        let pose = result.values.at(3)?.as_se3().ok_or("expected SE3")?;
        assert!(pose.is_approx(&expected, 1e-4));
        Ok(())
    }

    #[test]
    fn test_matches_levenberg_marquardt() -> TestResult {
        let (graph, values) = chain_se3()?;
        let gn = GaussNewton::new().optimize(&graph, &values)?;
        let lm = crate::optimizer::LevenbergMarquardt::new().optimize(&graph, &values)?;
        assert!(gn.values.is_approx(&lm.values, 1e-4));
        Ok(())
    }

    #[test]
    fn test_unobservable_key_is_singular() -> TestResult {
        let mut graph = FactorGraph::new();
        graph.add(PriorFactor::new(0, SE2::identity(), DiagonalNoise::unit(3)?)?);
        // Whitened Jacobian underflows to zero, leaving key 1 unconstrained
        graph.add(PriorFactor::new(
            1,
            SE2::identity(),
            DiagonalNoise::isotropic(3, 1e200)?,
        )?);
        let mut values = Values::new();
        values.insert(0, SE2::from_xy_angle(1.0, 0.0, 0.0))?;
        values.insert(1, SE2::identity())?;

        let result = GaussNewton::new().optimize(&graph, &values)?;
        assert_eq!(result.status, OptimizationStatus::SingularSystem);
        assert!(result.values.is_approx(&values, TOLERANCE));
        assert!(result.into_converged().is_err());
        Ok(())
    }

    #[test]
    fn test_single_prior_is_one_step() -> TestResult {
        let mut graph = FactorGraph::new();
        graph.add(PriorFactor::new(
            7,
            SE2::from_xy_angle(1.0, 2.0, 0.5),
            DiagonalNoise::unit(3)?,
        )?);
        let mut values = Values::new();
        values.insert(7, SE2::from_xy_angle(0.0, 0.0, 0.0))?;
        let result = GaussNewton::new().optimize(&graph, &values)?;
        assert!(result.is_converged());
        assert!(result.iterations <= 3);
        let pose = result.values.at(7)?.as_se2().ok_or("expected SE2")?;
        assert!(pose.is_approx(&SE2::from_xy_angle(1.0, 2.0, 0.5), TOLERANCE));
        Ok(())
    }

    #[test]
    fn test_empty_graph() -> TestResult {
        let result = GaussNewton::new().optimize(&FactorGraph::new(), &Values::new())?;
        assert_eq!(result.status, OptimizationStatus::Converged);
        assert_eq!(result.iterations, 0);
        assert_eq!(result.final_error, 0.0);
        Ok(())
    }
}
