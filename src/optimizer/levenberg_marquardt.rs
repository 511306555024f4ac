//! Levenberg-Marquardt algorithm for pose graphs.
//!
//! Minimizes the total error of a factor graph,
//!
//! ```text
//! E(x) = ||r(x)||² = Σᵢ ||Σᵢ^(-1/2) rᵢ(x)||²
//! ```
//!
//! by solving the damped normal equations at every linearization point:
//!
//! ```text
//! (JᵀJ + λD)·dx = -Jᵀr,    D = clamp(diag(JᵀJ), min_diagonal, max_diagonal)
//! ```
//!
//! and stepping on the manifold with `x ⊞ dx`.
//!
//! ## Damping schedule
//!
//! A candidate is accepted only if it strictly decreases the error:
//! - **Accepted**: commit the candidate, `λ ← max(λ · decrease_factor, min_damping)`
//! - **Rejected**: `λ ← λ · increase_factor` and solve again with the same linearization
//!
//! If `λ` would exceed `max_damping`, the iteration ends with the values unchanged. The
//! convergence check then sees a zero decrease and stops the run: no amount of damping
//! decreases the error from that point.
//!
//! A damped system that cannot be factorized is retried once at `max_damping`; if it still
//! fails the run ends with [`OptimizationStatus::SingularSystem`] and the best values so far.
//!
//! # Example
//!
//! ```
//! use apex_pose_graph::optimizer::levenberg_marquardt::{
//!     LevenbergMarquardt, LevenbergMarquardtConfig,
//! };
//! use apex_pose_graph::{FactorGraph, Values, BetweenFactor, EqualityFactor};
//! use apex_pose_graph::core::noise_model::DiagonalNoise;
//! use apex_pose_graph::manifold::{LieGroup, se2::SE2};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut graph = FactorGraph::new();
//! graph.add(EqualityFactor::new(0, SE2::identity()));
//! graph.add(BetweenFactor::new(0, 1, SE2::from_xy_angle(1.0, 0.0, 0.0), DiagonalNoise::unit(3)?)?);
//!
//! let mut initial = Values::new();
//! initial.insert(0, SE2::identity())?;
//! initial.insert(1, SE2::from_xy_angle(1.3, 0.2, 0.1))?;
//!
//! let config = LevenbergMarquardtConfig::new().with_max_iterations(50);
//! let result = LevenbergMarquardt::with_config(config).optimize(&graph, &initial)?;
//! assert!(result.is_converged());
//! # Ok(())
//! # }
//! ```
//!
//! # References
//!
//! - Levenberg, K. (1944). "A Method for the Solution of Certain Non-Linear Problems in Least Squares". *Quarterly of Applied Mathematics*.
//! - Marquardt, D. W. (1963). "An Algorithm for Least-Squares Estimation of Nonlinear Parameters". *Journal of the Society for Industrial and Applied Mathematics*.
//! - Dellaert, F. & Kaess, M. (2017). "Factor Graphs for Robot Perception". *Foundations and Trends in Robotics*.

use crate::core::factor_graph::FactorGraph;
use crate::core::linear_system::LinearSystemBuilder;
use crate::core::ordering::OrderingType;
use crate::core::values::Values;
use crate::error::PoseGraphResult;
use crate::linalg::{LinearSolverType, NormalEquations, SparseLinearSolver, normal_equations};
use crate::optimizer::{
    ConvergenceInfo, ConvergenceTolerances, ConvergenceWindow, OptimizationStatus,
    OptimizerError, SolverResult, compute_covariances,
};

use std::{
    fmt,
    fmt::{Display, Formatter},
};
use tracing::{debug, info, warn};
use web_time::{Duration, Instant};

/// Summary statistics for one Levenberg-Marquardt run.
#[derive(Debug, Clone)]
pub struct LevenbergMarquardtSummary {
    pub initial_error: f64,
    pub final_error: f64,
    /// Number of linearizations
    pub iterations: usize,
    /// Damped solves whose candidate was accepted
    pub successful_steps: usize,
    /// Damped solves whose candidate was rejected
    pub unsuccessful_steps: usize,
    pub final_damping: f64,
    pub max_gradient_norm: f64,
    pub final_gradient_norm: f64,
    pub max_step_norm: f64,
    pub final_step_norm: f64,
    pub total_time: Duration,
    pub average_time_per_iteration: Duration,
    /// Per-iteration statistics, only collected at DEBUG level
    pub iteration_history: Vec<IterationStats>,
    pub status: OptimizationStatus,
}

impl Display for LevenbergMarquardtSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "Levenberg-Marquardt Final Result")?;
        if self.status == OptimizationStatus::Converged {
            writeln!(f, "CONVERGED")?;
        } else {
            writeln!(f, "STOPPED ({})", self.status)?;
        }

        writeln!(f)?;
        writeln!(f, "Error:")?;
        writeln!(f, "  Initial:   {:.6e}", self.initial_error)?;
        writeln!(f, "  Final:     {:.6e}", self.final_error)?;
        writeln!(
            f,
            "  Reduction: {:.6e} ({:.2}%)",
            self.initial_error - self.final_error,
            100.0 * (self.initial_error - self.final_error) / self.initial_error.max(1e-12)
        )?;
        writeln!(f)?;
        writeln!(f, "Iterations:")?;
        writeln!(f, "  Total:              {}", self.iterations)?;
        writeln!(f, "  Successful steps:   {}", self.successful_steps)?;
        writeln!(f, "  Unsuccessful steps: {}", self.unsuccessful_steps)?;
        writeln!(f, "  Final damping:      {:.2e}", self.final_damping)?;
        writeln!(f)?;
        writeln!(f, "Gradient:")?;
        writeln!(f, "  Max norm:   {:.2e}", self.max_gradient_norm)?;
        writeln!(f, "  Final norm: {:.2e}", self.final_gradient_norm)?;
        writeln!(f)?;
        writeln!(f, "Step:")?;
        writeln!(f, "  Max norm:   {:.2e}", self.max_step_norm)?;
        writeln!(f, "  Final norm: {:.2e}", self.final_step_norm)?;
        writeln!(f)?;
        writeln!(f, "Performance:")?;
        writeln!(
            f,
            "  Total time:             {:.2}ms",
            self.total_time.as_secs_f64() * 1000.0
        )?;
        writeln!(
            f,
            "  Average per iteration:  {:.2}ms",
            self.average_time_per_iteration.as_secs_f64() * 1000.0
        )?;

        Ok(())
    }
}

/// Per-iteration statistics for the DEBUG table.
#[derive(Debug, Clone)]
pub struct IterationStats {
    /// Iteration number (1-based, one per linearization)
    pub iteration: usize,
    /// Error after this iteration
    pub error: f64,
    /// Decrease in error achieved by this iteration
    pub error_change: f64,
    /// `||g||∞` at the linearization point
    pub gradient_norm: f64,
    /// `||dx||` of the last step tried
    pub step_norm: f64,
    /// Damping after this iteration
    pub damping: f64,
    /// Damped solves performed in this iteration
    pub solves: usize,
    pub iter_time_ms: f64,
    pub total_time_ms: f64,
    pub accepted: bool,
}

impl IterationStats {
    pub fn print_header() {
        debug!(
            "{:>4}  {:>13}  {:>13}  {:>13}  {:>13}  {:>11}  {:>6}  {:>11}  {:>13}  {:>6}",
            "iter",
            "error",
            "error_change",
            "|gradient|",
            "|step|",
            "lambda",
            "solves",
            "iter_time",
            "total_time",
            "status"
        );
    }

    pub fn print_line(&self) {
        let status = if self.accepted { "✓" } else { "✗" };
        debug!(
            "{:>4}  {:>13.6e}  {:>13.2e}  {:>13.2e}  {:>13.2e}  {:>11.2e}  {:>6}  {:>9.2}ms  {:>11.2}ms  {:>6}",
            self.iteration,
            self.error,
            self.error_change,
            self.gradient_norm,
            self.step_norm,
            self.damping,
            self.solves,
            self.iter_time_ms,
            self.total_time_ms,
            status
        );
    }
}

/// Configuration parameters for the Levenberg-Marquardt optimizer.
///
/// ```
/// use apex_pose_graph::optimizer::levenberg_marquardt::LevenbergMarquardtConfig;
///
/// let config = LevenbergMarquardtConfig::new()
///     .with_max_iterations(200)
///     .with_initial_damping(1e-3)
///     .with_damping_bounds(1e-12, 1e12);
/// assert_eq!(config.max_iterations, 200);
/// ```
///
/// # Convergence Criteria
///
/// An iteration is converged if ANY of these holds:
/// - `new_error <= error_tolerance`
/// - `(error - new_error) / error <= relative_error_tolerance`
/// - `error - new_error <= absolute_error_tolerance`
/// - `||Jᵀr||∞ <= gradient_tolerance`
/// - `||dx|| <= step_tolerance`
///
/// The run stops once `convergence_window` consecutive iterations are converged.
#[derive(Debug, Clone)]
pub struct LevenbergMarquardtConfig {
    pub linear_solver_type: LinearSolverType,
    pub ordering: OrderingType,
    pub max_iterations: usize,
    pub relative_error_tolerance: f64,
    pub absolute_error_tolerance: f64,
    pub error_tolerance: f64,
    pub gradient_tolerance: f64,
    pub step_tolerance: f64,
    /// Initial damping λ₀
    pub initial_damping: f64,
    pub min_damping: f64,
    pub max_damping: f64,
    /// Damping multiplier on a rejected candidate
    pub lambda_increase_factor: f64,
    /// Damping multiplier on an accepted candidate
    pub lambda_decrease_factor: f64,
    /// Lower clamp on `diag(JᵀJ)` in the damping matrix
    pub min_diagonal: f64,
    /// Upper clamp on `diag(JᵀJ)` in the damping matrix
    pub max_diagonal: f64,
    /// Consecutive converged iterations required to stop
    pub convergence_window: usize,
    pub timeout: Option<Duration>,
    /// Compute per-key marginal covariances at the final estimate
    pub compute_covariances: bool,
}

impl Default for LevenbergMarquardtConfig {
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
            initial_damping: 1e-5,
            min_damping: 1e-12,
            max_damping: 1e10,
            lambda_increase_factor: 10.0,
            lambda_decrease_factor: 0.1,
            min_diagonal: 1e-6,
            max_diagonal: 1e32,
            convergence_window: 1,
            timeout: None,
            compute_covariances: false,
        }
    }
}

impl LevenbergMarquardtConfig {
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

    pub fn with_initial_damping(mut self, damping: f64) -> Self {
        self.initial_damping = damping;
        self
    }

    pub fn with_damping_bounds(mut self, min: f64, max: f64) -> Self {
        self.min_damping = min;
        self.max_damping = max;
        self
    }

    pub fn with_damping_factors(mut self, increase: f64, decrease: f64) -> Self {
        self.lambda_increase_factor = increase;
        self.lambda_decrease_factor = decrease;
        self
    }

    pub fn with_diagonal_bounds(mut self, min: f64, max: f64) -> Self {
        self.min_diagonal = min;
        self.max_diagonal = max;
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

    /// Check the damping schedule and tolerances for consistency.
    ///
    /// # Errors
    /// `OptimizerError::InvalidConfig` describing the first offending field.
    pub fn validate(&self) -> Result<(), OptimizerError> {
        self.tolerances().validate()?;
        let invalid = |msg: &str| Err(OptimizerError::InvalidConfig(msg.to_string()).log());
        if !(self.min_damping > 0.0 && self.min_damping <= self.max_damping) {
            return invalid("damping bounds must satisfy 0 < min_damping <= max_damping");
        }
        if !(self.initial_damping >= self.min_damping && self.initial_damping <= self.max_damping)
        {
            return invalid("initial_damping must lie within the damping bounds");
        }
        if self.lambda_increase_factor <= 1.0 {
            return invalid("lambda_increase_factor must be greater than 1");
        }
        if !(self.lambda_decrease_factor > 0.0 && self.lambda_decrease_factor < 1.0) {
            return invalid("lambda_decrease_factor must lie in (0, 1)");
        }
        if !(self.min_diagonal > 0.0 && self.min_diagonal <= self.max_diagonal) {
            return invalid("diagonal bounds must satisfy 0 < min_diagonal <= max_diagonal");
        }
        Ok(())
    }

    /// Dump the configuration at DEBUG level
    pub fn print_configuration(&self) {
        debug!(
            "Configuration:\n  Solver:        Levenberg-Marquardt\n  Linear solver: {}\n  Ordering:      {}\n  Convergence Criteria:\n  Max iterations:      {}\n  Relative tolerance:  {:.2e}\n  Absolute tolerance:  {:.2e}\n  Error tolerance:     {:.2e}\n  Gradient tolerance:  {:.2e}\n  Step tolerance:      {:.2e}\n  Window:              {}\n  Timeout:             {:?}\n  Damping Parameters:\n  Initial damping:     {:.2e}\n  Damping range:       [{:.2e}, {:.2e}]\n  Increase factor:     {:.2}\n  Decrease factor:     {:.2}\n  Diagonal range:      [{:.2e}, {:.2e}]\n  Compute covariances: {}",
            self.linear_solver_type,
            self.ordering,
            self.max_iterations,
            self.relative_error_tolerance,
            self.absolute_error_tolerance,
            self.error_tolerance,
            self.gradient_tolerance,
            self.step_tolerance,
            self.convergence_window,
            self.timeout,
            self.initial_damping,
            self.min_damping,
            self.max_damping,
            self.lambda_increase_factor,
            self.lambda_decrease_factor,
            self.min_diagonal,
            self.max_diagonal,
            self.compute_covariances
        );
    }
}

/// How the inner damping loop of one iteration ended
enum StepOutcome {
    Accepted {
        values: Values,
        error: f64,
        step_norm: f64,
    },
    /// Damping would exceed `max_damping`; values unchanged
    Exhausted { step_norm: f64 },
    Singular,
}

/// Levenberg-Marquardt solver for pose graphs.
///
/// # See Also
///
/// - [`LevenbergMarquardtConfig`] - Configuration options
/// - [`GaussNewton`](crate::optimizer::GaussNewton) - Undamped variant
#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    config: LevenbergMarquardtConfig,
}

impl LevenbergMarquardt {
    /// Create a new Levenberg-Marquardt solver with default configuration.
    pub fn new() -> Self {
        Self::with_config(LevenbergMarquardtConfig::default())
    }

    pub fn with_config(config: LevenbergMarquardtConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LevenbergMarquardtConfig {
        &self.config
    }

    /// Damped solves at increasing `λ` until a candidate decreases the error.
    ///
    /// `lambda` is left at the value used for the last solve (decreased on acceptance).
    #[allow(clippy::too_many_arguments)]
    fn damped_step(
        &self,
        builder: &LinearSystemBuilder,
        graph: &FactorGraph,
        values: &Values,
        error: f64,
        normal: &NormalEquations,
        linear_solver: &mut dyn SparseLinearSolver,
        lambda: &mut f64,
        counters: &mut StepCounters,
    ) -> PoseGraphResult<StepOutcome> {
        let diagonal = normal.damping_diagonal(self.config.min_diagonal, self.config.max_diagonal);
        let mut retried_singular = false;

        loop {
            counters.solves += 1;
            let dx = match linear_solver.solve_damped_equation(normal, *lambda, &diagonal) {
                Ok(dx) => dx,
                Err(_) if !retried_singular && *lambda < self.config.max_damping => {
                    warn!(
                        "Damped system singular at lambda {:.2e}, retrying at {:.2e}",
                        *lambda, self.config.max_damping
                    );
                    retried_singular = true;
                    *lambda = self.config.max_damping;
                    continue;
                }
                Err(_) => return Ok(StepOutcome::Singular),
            };
            let step_norm = dx.norm_l2();

            let candidate = values.retract(&builder.step_to_deltas(&dx))?;
            let candidate_error = builder.error_only(graph, &candidate)?;
            counters.error_evaluations += 1;

            if candidate_error.is_finite() && candidate_error < error {
                counters.successful_steps += 1;
                *lambda = (*lambda * self.config.lambda_decrease_factor).max(self.config.min_damping);
                return Ok(StepOutcome::Accepted {
                    values: candidate,
                    error: candidate_error,
                    step_norm,
                });
            }

            counters.unsuccessful_steps += 1;
            let next = *lambda * self.config.lambda_increase_factor;
            if next > self.config.max_damping {
                warn!(
                    "Damping exhausted at lambda {:.2e}; no candidate decreases the error",
                    *lambda
                );
                return Ok(StepOutcome::Exhausted { step_norm });
            }
            *lambda = next;
        }
    }

    /// Minimize the total error of `graph` starting from `initial`.
    ///
    /// Numerical trouble (singular systems, NaN, exhausted budget) is reported through
    /// [`SolverResult::status`]; `Err` is reserved for malformed problems.
    ///
    /// # Errors
    /// - `OptimizerError::InvalidConfig` for an inconsistent configuration
    /// - `CoreError::MissingKey` / `CoreError::InvalidOrdering` if the graph references
    ///   keys absent from `initial` or the custom ordering is wrong
    /// - `FactorError` if a factor and its poses disagree on pose type
    pub fn optimize(&self, graph: &FactorGraph, initial: &Values) -> PoseGraphResult<SolverResult> {
        let start_time = Instant::now();
        self.config.validate()?;

        if graph.is_empty() {
            info!("Levenberg-Marquardt: empty graph, nothing to optimize");
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
            IterationStats::print_header();
        }

        let tolerances = self.config.tolerances();
        let mut window = ConvergenceWindow::new(self.config.convergence_window);
        let mut linear_solver = self.config.linear_solver_type.create();
        let mut values = initial.clone();
        let mut error = initial_error;
        let mut lambda = self.config.initial_damping;
        let mut iteration = 0;
        let mut counters = StepCounters {
            error_evaluations: 1,
            ..StepCounters::default()
        };
        let mut iteration_history = Vec::new();
        let mut max_gradient_norm: f64 = 0.0;
        let mut final_gradient_norm = 0.0;
        let mut max_step_norm: f64 = 0.0;
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

            let iter_start = Instant::now();
            let system = builder.linearize(graph, &values)?;
            let normal = normal_equations(&system.residual, &system.jacobian)?;
            iteration += 1;
            counters.linearizations += 1;

            let gradient_norm = normal.gradient_max_norm();
            if !gradient_norm.is_finite() {
                break OptimizationStatus::InvalidNumericalValues;
            }
            max_gradient_norm = max_gradient_norm.max(gradient_norm);
            final_gradient_norm = gradient_norm;

            let solves_before = counters.solves;
            let outcome = self.damped_step(
                &builder,
                graph,
                &values,
                error,
                &normal,
                linear_solver.as_mut(),
                &mut lambda,
                &mut counters,
            )?;

            let previous_error = error;
            let (accepted, step_norm) = match outcome {
                StepOutcome::Accepted {
                    values: candidate,
                    error: candidate_error,
                    step_norm,
                } => {
                    values = candidate;
                    error = candidate_error;
                    (true, step_norm)
                }
                StepOutcome::Exhausted { step_norm } => (false, step_norm),
                StepOutcome::Singular => break OptimizationStatus::SingularSystem,
            };
            max_step_norm = max_step_norm.max(step_norm);
            final_step_norm = step_norm;

            if debug_enabled {
                let stats = IterationStats {
                    iteration,
                    error,
                    error_change: previous_error - error,
                    gradient_norm,
                    step_norm,
                    damping: lambda,
                    solves: counters.solves - solves_before,
                    iter_time_ms: iter_start.elapsed().as_secs_f64() * 1000.0,
                    total_time_ms: start_time.elapsed().as_secs_f64() * 1000.0,
                    accepted,
                };
                stats.print_line();
                iteration_history.push(stats);
            }

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

        let elapsed = start_time.elapsed();
        info!(
            "Levenberg-Marquardt: {} after {} iterations, error {:.6e} -> {:.6e}",
            status, iteration, initial_error, error
        );
        if debug_enabled {
            let summary = LevenbergMarquardtSummary {
                initial_error,
                final_error: error,
                iterations: iteration,
                successful_steps: counters.successful_steps,
                unsuccessful_steps: counters.unsuccessful_steps,
                final_damping: lambda,
                max_gradient_norm,
                final_gradient_norm,
                max_step_norm,
                final_step_norm,
                total_time: elapsed,
                average_time_per_iteration: if iteration > 0 {
                    elapsed / iteration as u32
                } else {
                    Duration::from_secs(0)
                },
                iteration_history,
                status,
            };
            debug!("{}", summary);
        }

        Ok(SolverResult {
            values,
            status,
            initial_error,
            final_error: error,
            iterations: iteration,
            elapsed_time: elapsed,
            convergence_info: Some(ConvergenceInfo {
                final_gradient_norm,
                final_step_norm,
                error_evaluations: counters.error_evaluations,
                linearizations: counters.linearizations,
            }),
            covariances,
            final_damping: lambda,
        })
    }
}

#[derive(Debug, Default)]
struct StepCounters {
    solves: usize,
    successful_steps: usize,
    unsuccessful_steps: usize,
    error_evaluations: usize,
    linearizations: usize,
}

/// `dx` for the plain damped system, used by tests to inspect single steps.
#[cfg(test)]
fn damped_solution(
    normal: &NormalEquations,
    lambda: f64,
    config: &LevenbergMarquardtConfig,
) -> Result<faer::Mat<f64>, crate::linalg::LinAlgError> {
    let diagonal = normal.damping_diagonal(config.min_diagonal, config.max_diagonal);
    config
        .linear_solver_type
        .create()
        .solve_damped_equation(normal, lambda, &diagonal)
}
