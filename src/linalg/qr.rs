use faer::{
    Mat,
    linalg::solvers::Solve,
    sparse::SparseColMat,
    sparse::linalg::solvers::{Qr, SymbolicQr},
};

use crate::linalg::{LinAlgError, LinAlgResult, NormalEquations, SparseLinearSolver};

/// Sparse QR solver for the (damped) normal equations.
///
/// Slower than [`super::SparseCholeskySolver`] but does not require `H` to be numerically
/// positive definite to factorize. A rank-deficient `H` may still yield a finite step, so
/// only a non-finite step is reported as [`LinAlgError::SingularMatrix`].
#[derive(Debug, Clone)]
pub struct SparseQRSolver {
    factorizer: Option<Qr<usize, f64>>,

    /// Cached symbolic factorization for reuse across iterations.
    symbolic_factorization: Option<SymbolicQr<usize>>,

    undamped: bool,
    dim: usize,

    /// The parameter covariance matrix, computed as `(J^T * J)^-1`.
    covariance_matrix: Option<Mat<f64>>,
}

impl SparseQRSolver {
    pub fn new() -> Self {
        SparseQRSolver {
            factorizer: None,
            symbolic_factorization: None,
            undamped: false,
            dim: 0,
            covariance_matrix: None,
        }
    }

    fn factorize(&mut self, matrix: &SparseColMat<usize, f64>) -> LinAlgResult<&Qr<usize, f64>> {
        let sym = if let Some(ref cached_sym) = self.symbolic_factorization {
            cached_sym.clone()
        } else {
            let new_sym = SymbolicQr::try_new(matrix.symbolic()).map_err(|e| {
                LinAlgError::FactorizationFailed("Symbolic QR decomposition failed".to_string())
                    .log_with_source(e)
            })?;
            self.symbolic_factorization = Some(new_sym.clone());
            new_sym
        };

        self.factorizer = None;
        self.covariance_matrix = None;
        self.dim = matrix.ncols();
        let qr = Qr::try_new_with_symbolic(sym, matrix.as_ref())
            .map_err(|e| LinAlgError::SingularMatrix.log_with_source(e))?;
        Ok(self.factorizer.insert(qr))
    }

    fn finite_step(dx: Mat<f64>) -> LinAlgResult<Mat<f64>> {
        let finite = (0..dx.nrows()).all(|i| dx[(i, 0)].is_finite());
        if finite {
            Ok(dx)
        } else {
            Err(LinAlgError::SingularMatrix.log())
        }
    }
}

impl Default for SparseQRSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl SparseLinearSolver for SparseQRSolver {
    fn solve_normal_equation(&mut self, system: &NormalEquations) -> LinAlgResult<Mat<f64>> {
        self.undamped = false;
        let qr = self.factorize(&system.hessian)?;
        let dx = Self::finite_step(qr.solve(-&system.gradient))?;
        self.undamped = true;
        Ok(dx)
    }

    fn solve_damped_equation(
        &mut self,
        system: &NormalEquations,
        lambda: f64,
        diagonal: &[f64],
    ) -> LinAlgResult<Mat<f64>> {
        self.undamped = false;
        let damped_hessian = system.damped_hessian(lambda, diagonal)?;
        let qr = self.factorize(&damped_hessian)?;
        Self::finite_step(qr.solve(-&system.gradient))
    }

    fn compute_covariance_matrix(&mut self) -> Option<&Mat<f64>> {
        if !self.undamped {
            return None;
        }
        if self.covariance_matrix.is_none()
            && let Some(factorizer) = &self.factorizer
        {
            let identity = Mat::<f64>::identity(self.dim, self.dim);
            self.covariance_matrix = Some(factorizer.solve(&identity));
        }
        self.covariance_matrix.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::{SparseCholeskySolver, normal_equations};
    use faer::sparse::Triplet;

    const TOLERANCE: f64 = 1e-10;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn create_test_system() -> Result<NormalEquations, Box<dyn std::error::Error>> {
        // 4x3 overdetermined system
        let triplets = vec![
            Triplet::new(0, 0, 1.0),
            Triplet::new(0, 2, 1.0),
            Triplet::new(1, 1, 1.0),
            Triplet::new(1, 2, 1.0),
            Triplet::new(2, 0, 1.0),
            Triplet::new(2, 1, 1.0),
            Triplet::new(3, 0, 1.0),
        ];
        let jacobian = SparseColMat::try_new_from_triplets(4, 3, &triplets)?;
        let residuals = Mat::from_fn(4, 1, |i, _| (i + 1) as f64);
        Ok(normal_equations(&residuals, &jacobian)?)
    }

    #[test]
    fn test_qr_solver_creation() {
        let solver = SparseQRSolver::new();
        assert!(solver.factorizer.is_none());
        assert!(SparseQRSolver::default().factorizer.is_none());
    }

    #[test]
    fn test_qr_matches_cholesky() -> TestResult {
        let system = create_test_system()?;
        let qr = SparseQRSolver::new().solve_normal_equation(&system)?;
        let llt = SparseCholeskySolver::new().solve_normal_equation(&system)?;
        for i in 0..3 {
            assert!((qr[(i, 0)] - llt[(i, 0)]).abs() < TOLERANCE);
        }
        Ok(())
    }

    #[test]
    fn test_qr_damped_matches_cholesky() -> TestResult {
        let system = create_test_system()?;
        let diagonal = system.damping_diagonal(1e-6, 1e32);
        let qr = SparseQRSolver::new().solve_damped_equation(&system, 0.1, &diagonal)?;
        let llt = SparseCholeskySolver::new().solve_damped_equation(&system, 0.1, &diagonal)?;
        for i in 0..3 {
            assert!((qr[(i, 0)] - llt[(i, 0)]).abs() < TOLERANCE);
        }
        Ok(())
    }

    #[test]
    fn test_qr_factorizer_caching() -> TestResult {
        let mut solver = SparseQRSolver::new();
        let system = create_test_system()?;
        let sol1 = solver.solve_normal_equation(&system)?;
        assert!(solver.symbolic_factorization.is_some());
        let sol2 = solver.solve_normal_equation(&system)?;
        for i in 0..sol1.nrows() {
            assert!((sol1[(i, 0)] - sol2[(i, 0)]).abs() < TOLERANCE);
        }
        Ok(())
    }

    #[test]
    fn test_qr_covariance() -> TestResult {
        let mut solver = SparseQRSolver::new();
        let system = create_test_system()?;
        solver.solve_normal_equation(&system)?;
        let covariance = solver.compute_covariance_matrix().ok_or("missing covariance")?;
        let product = system.hessian.as_ref() * covariance.as_ref();
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((product[(i, j)] - expected).abs() < 1e-9);
            }
        }
        Ok(())
    }
}
