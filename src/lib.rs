//! # Apex Pose Graph
//!
//! Nonlinear least-squares pose-graph optimization on SE(2) and SE(3).
//!
//! A pose graph is a set of pose variables (`Values`) tied together by factors
//! (`FactorGraph`): relative-pose measurements, priors and hard equality constraints. The
//! optimizers linearize every factor on the manifold tangent space, assemble a sparse
//! whitened Jacobian, and solve the normal equations with faer.
//!
//! ## Features
//!
//! - **Lie group poses**: SE(2) and SE(3) with analytic Jacobians, mixed freely in one graph
//! - **Levenberg-Marquardt** with adaptive diagonal damping, and plain **Gauss-Newton**
//! - **Sparse Cholesky and sparse QR** backends sharing one cached symbolic factorization
//! - **Marginal covariances** of every pose at the solution, on request
//! - **Parallel factor evaluation** with rayon (`parallel` feature, default)
//!
//! ## Example
//!
//! ```
//! use apex_pose_graph::{LevenbergMarquardt, simulation};
//! # fn main() -> apex_pose_graph::PoseGraphResult<()> {
//! let (graph, truth) = simulation::hexagon_graph(1.0)?;
//! let result = LevenbergMarquardt::new().optimize(&graph, &truth)?;
//! assert!(result.is_converged());
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod error;
pub mod factors;
pub mod linalg;
#[cfg(feature = "logging")]
pub mod logger;
pub mod manifold;
pub mod optimizer;
pub mod simulation;

// Re-export core types
pub use crate::core::{
    Key, factor_graph::FactorGraph, noise_model::DiagonalNoise, ordering::OrderingType,
    pose::Pose, values::Values,
};
pub use error::{PoseGraphError, PoseGraphResult};

// Re-export factor types
pub use factors::{BetweenFactor, EqualityFactor, Factor, GraphFactor, PriorFactor};

pub use linalg::{LinearSolverType, SparseCholeskySolver, SparseLinearSolver, SparseQRSolver};
#[cfg(feature = "logging")]
pub use logger::{init_logger, init_logger_with_level};
pub use manifold::{LieGroup, se2::SE2, se3::SE3};
pub use optimizer::{
    GaussNewton, GaussNewtonConfig, LevenbergMarquardt, LevenbergMarquardtConfig,
    OptimizationStatus, OptimizerType, SolverResult, optimize_safely,
};
