//! Error types for the apex-pose-graph library
//!
//! Every module defines its own `thiserror` enum. `PoseGraphError` is the top-level error
//! returned by public APIs and wraps the module errors transparently, so the source chain
//! stays inspectable.
//!
//! Example error chain:
//! ```text
//! PoseGraphError::Core(
//!     CoreError::MissingKey(42)
//! )
//! ```

use crate::{
    core::CoreError, factors::FactorError, linalg::LinAlgError, manifold::ManifoldError,
    optimizer::OptimizerError,
};
use std::error::Error as StdError;
use thiserror::Error;

/// Main result type used throughout the apex-pose-graph library
pub type PoseGraphResult<T> = Result<T, PoseGraphError>;

/// Main error type for the apex-pose-graph library
///
/// # Error Chain Access
///
/// ```rust,ignore
/// if let Err(e) = LevenbergMarquardt::new().optimize(&graph, &values) {
///     warn!("Full chain: {}", e.chain());
/// }
/// ```
#[derive(Debug, Error)]
pub enum PoseGraphError {
    /// Graph, values, ordering and linear system errors
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Factor evaluation errors
    #[error(transparent)]
    Factor(#[from] FactorError),

    /// Optimization algorithm errors
    #[error(transparent)]
    Optimizer(#[from] OptimizerError),

    /// Linear algebra errors
    #[error(transparent)]
    LinearAlgebra(#[from] LinAlgError),

    /// Manifold operation errors
    #[error(transparent)]
    Manifold(#[from] ManifoldError),
}

impl PoseGraphError {
    /// Get the full error chain as a string for logging and debugging.
    ///
    /// One line per error, from the top-level error down to the root cause.
    pub fn chain(&self) -> String {
        let mut chain = vec![self.to_string()];
        let mut source = self.source();

        while let Some(err) = source {
            chain.push(format!("  → {}", err));
            source = err.source();
        }

        chain.join("\n")
    }

    /// Get a compact single-line error chain for logging
    ///
    /// ```rust,ignore
    /// error!("Operation failed: {}", err.chain_compact());
    /// // Output: "Missing key: 42"
    /// ```
    pub fn chain_compact(&self) -> String {
        let mut chain = vec![self.to_string()];
        let mut source = self.source();

        while let Some(err) = source {
            chain.push(err.to_string());
            source = err.source();
        }

        chain.join(" → ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifold::ManifoldType;

    #[test]
    fn test_pose_graph_error_display() {
        let error = PoseGraphError::from(LinAlgError::SingularMatrix);
        assert!(error.to_string().contains("Singular matrix"));
    }

    #[test]
    fn test_pose_graph_error_chain() {
        let linalg_error =
            LinAlgError::FactorizationFailed("Cholesky factorization failed".to_string());
        let error = PoseGraphError::from(linalg_error);

        let chain = error.chain();
        assert!(chain.contains("factorization"));
        assert!(chain.contains("Cholesky"));
    }

    #[test]
    fn test_pose_graph_error_chain_compact() {
        let error = PoseGraphError::from(CoreError::MissingKey(42));
        assert!(error.chain_compact().contains("42"));
    }

    #[test]
    fn test_pose_graph_result_err() {
        let result: PoseGraphResult<i32> = Err(CoreError::DuplicateKey(1).into());
        assert!(matches!(
            result,
            Err(PoseGraphError::Core(CoreError::DuplicateKey(1)))
        ));
    }

    #[test]
    fn test_transparent_error_conversion() {
        let manifold_error = ManifoldError::TypeMismatch {
            left: ManifoldType::SE2,
            right: ManifoldType::SE3,
        };

        let error: PoseGraphError = manifold_error.into();
        assert!(matches!(error, PoseGraphError::Manifold(_)));
    }
}
