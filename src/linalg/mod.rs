//! Sparse linear algebra for the Gauss-Newton and Levenberg-Marquardt steps.
//!
//! A linearized pose graph gives a whitened residual `r` and a sparse Jacobian `J`.
//! The step `dx` solves the normal equations
//!
//! ```text
//! H dx = -g,                 H = JᵀJ, g = Jᵀr
//! (H + λD) dx = -g,          D = clamp(diag(H), min_diagonal, max_diagonal)
//! ```
//!
//! [`NormalEquations`] forms `H` and `g` once per linearization so repeated damped solves
//! with different `λ` reuse them. Solvers implement [`SparseLinearSolver`] and cache their
//! symbolic factorization, since the sparsity pattern of `H` is fixed for a given graph.

pub mod cholesky;
pub mod qr;

use crate::core::ordering::Ordering;
use crate::core::Key;
use faer::{
    Mat,
    sparse::{SparseColMat, Triplet},
};
use std::ops::Mul;
use std::{
    collections::HashMap,
    fmt,
    fmt::{Display, Formatter},
};
use thiserror::Error;
use tracing::error;

pub use cholesky::SparseCholeskySolver;
pub use qr::SparseQRSolver;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum LinearSolverType {
    #[default]
    SparseCholesky,
    SparseQR,
}

impl Display for LinearSolverType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            LinearSolverType::SparseCholesky => write!(f, "Sparse Cholesky"),
            LinearSolverType::SparseQR => write!(f, "Sparse QR"),
        }
    }
}

impl LinearSolverType {
    /// Fresh solver of this type.
    pub fn create(self) -> Box<dyn SparseLinearSolver> {
        match self {
            LinearSolverType::SparseCholesky => Box::new(SparseCholeskySolver::new()),
            LinearSolverType::SparseQR => Box::new(SparseQRSolver::new()),
        }
    }
}

/// Linear algebra specific error types
#[derive(Debug, Clone, Error)]
pub enum LinAlgError {
    /// Matrix factorization failed (Cholesky, QR, etc.)
    #[error("Matrix factorization failed: {0}")]
    FactorizationFailed(String),

    /// Singular or near-singular matrix detected
    #[error("Singular matrix detected (matrix is not invertible)")]
    SingularMatrix,

    /// Failed to create sparse matrix from triplets
    #[error("Failed to create sparse matrix: {0}")]
    SparseMatrixCreation(String),

    /// Matrix format conversion failed
    #[error("Matrix conversion failed: {0}")]
    MatrixConversion(String),
}

impl LinAlgError {
    /// Log the error with tracing::error and return self for chaining
    ///
    /// # Example
    /// ```ignore
    /// operation()
    ///     .map_err(|e| LinAlgError::from(e).log())?;
    /// ```
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }

    /// Log the error with the original source error from a third-party library
    ///
    /// This method logs both the LinAlgError and the underlying error from faer
    /// (`FaerError`, `LltError`, `CreationError`).
    ///
    /// # Arguments
    /// * `source_error` - The original error from the third-party library (must implement Debug)
    #[must_use]
    pub fn log_with_source<E: std::fmt::Debug>(self, source_error: E) -> Self {
        error!("{} | Source: {:?}", self, source_error);
        self
    }
}

/// Result type for linear algebra operations
pub type LinAlgResult<T> = Result<T, LinAlgError>;

/// `H = JᵀJ` and `g = Jᵀr` for one linearization.
#[derive(Debug, Clone)]
pub struct NormalEquations {
    pub hessian: SparseColMat<usize, f64>,
    pub gradient: Mat<f64>,
    /// `diag(H)`, the squared column norms of `J`
    pub diagonal: Vec<f64>,
}

impl NormalEquations {
    pub fn dim(&self) -> usize {
        self.gradient.nrows()
    }

    /// `||g||∞`.
    pub fn gradient_max_norm(&self) -> f64 {
        (0..self.dim())
            .map(|i| self.gradient[(i, 0)].abs())
            .fold(0.0, f64::max)
    }

    /// `diag(H)` clamped into `[min_diagonal, max_diagonal]`.
    pub fn damping_diagonal(&self, min_diagonal: f64, max_diagonal: f64) -> Vec<f64> {
        self.diagonal
            .iter()
            .map(|d| d.clamp(min_diagonal, max_diagonal))
            .collect()
    }

    /// `H + λD` as a sparse matrix with the pattern of `H`.
    pub fn damped_hessian(
        &self,
        lambda: f64,
        diagonal: &[f64],
    ) -> LinAlgResult<SparseColMat<usize, f64>> {
        let n = self.dim();
        let triplets: Vec<_> = diagonal
            .iter()
            .enumerate()
            .map(|(i, d)| Triplet::new(i, i, lambda * d))
            .collect();
        let damping = SparseColMat::try_new_from_triplets(n, n, &triplets).map_err(|e| {
            LinAlgError::SparseMatrixCreation("Failed to create damping matrix".to_string())
                .log_with_source(e)
        })?;
        Ok(&self.hessian + damping)
    }
}

/// Form the normal equations of a linearized system.
pub fn normal_equations(
    residuals: &Mat<f64>,
    jacobians: &SparseColMat<usize, f64>,
) -> LinAlgResult<NormalEquations> {
    // H = J^T * J
    let jt = jacobians.as_ref().transpose();
    let hessian = jt
        .to_col_major()
        .map_err(|e| {
            LinAlgError::MatrixConversion(
                "Failed to convert transposed Jacobian to column-major format".to_string(),
            )
            .log_with_source(e)
        })?
        .mul(jacobians.as_ref());

    // g = J^T * r
    let gradient = jacobians.as_ref().transpose().mul(residuals);

    let mut diagonal = vec![0.0; jacobians.ncols()];
    for t in jacobians.triplet_iter() {
        diagonal[t.col] += t.val * t.val;
    }

    Ok(NormalEquations {
        hessian,
        gradient,
        diagonal,
    })
}

/// Trait for sparse solvers of the normal equations
pub trait SparseLinearSolver {
    /// Solve `H dx = -g`.
    ///
    /// # Errors
    /// Returns `LinAlgError` if:
    /// - Matrix factorization fails
    /// - Matrix is singular or ill-conditioned
    fn solve_normal_equation(&mut self, system: &NormalEquations) -> LinAlgResult<Mat<f64>>;

    /// Solve `(H + λD) dx = -g` for a precomputed damping diagonal `D`.
    ///
    /// # Errors
    /// Same as [`SparseLinearSolver::solve_normal_equation`].
    fn solve_damped_equation(
        &mut self,
        system: &NormalEquations,
        lambda: f64,
        diagonal: &[f64],
    ) -> LinAlgResult<Mat<f64>>;

    /// Compute `H⁻¹` from the last factorization of the undamped `H`.
    ///
    /// Returns `None` if the last solve was damped or failed.
    fn compute_covariance_matrix(&mut self) -> Option<&Mat<f64>>;
}

/// Extract per-key covariance blocks from the full covariance matrix.
///
/// Given `H⁻¹`, returns the diagonal block of every key in the ordering, in that key's
/// tangent coordinates (3×3 for SE(2), 6×6 for SE(3)).
pub fn extract_key_covariances(
    full_covariance: &Mat<f64>,
    ordering: &Ordering,
) -> HashMap<Key, Mat<f64>> {
    ordering
        .blocks()
        .map(|(key, start, dim)| {
            let block = Mat::from_fn(dim, dim, |i, j| full_covariance[(start + i, start + j)]);
            (key, block)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    const TOLERANCE: f64 = 1e-12;

    #[test]
    fn test_normal_equations() -> TestResult {
        let triplets = vec![
            Triplet::new(0, 0, 2.0),
            Triplet::new(1, 0, 1.0),
            Triplet::new(1, 1, 3.0),
        ];
        let jacobian = SparseColMat::try_new_from_triplets(2, 2, &triplets)?;
        let residuals = Mat::from_fn(2, 1, |i, _| (i + 1) as f64);
        let system = normal_equations(&residuals, &jacobian)?;

        // J = [[2, 0], [1, 3]], r = [1, 2]
        assert_eq!(system.diagonal, vec![5.0, 9.0]);
        assert!((system.gradient[(0, 0)] - 4.0).abs() < TOLERANCE);
        assert!((system.gradient[(1, 0)] - 6.0).abs() < TOLERANCE);
        assert!((system.gradient_max_norm() - 6.0).abs() < TOLERANCE);
        Ok(())
    }

    #[test]
    fn test_damping_diagonal_is_clamped() -> TestResult {
        let triplets = vec![Triplet::new(0, 0, 1e-9), Triplet::new(1, 1, 1e20)];
        let jacobian = SparseColMat::try_new_from_triplets(2, 2, &triplets)?;
        let system = normal_equations(&Mat::zeros(2, 1), &jacobian)?;
        let diagonal = system.damping_diagonal(1e-6, 1e32);
        assert_eq!(diagonal[0], 1e-6);
        assert_eq!(diagonal[1], 1e32);
        Ok(())
    }
}
