use faer::{
    Mat, Side,
    linalg::solvers::Solve,
    sparse::SparseColMat,
    sparse::linalg::solvers::{Llt, SymbolicLlt},
};

use crate::linalg::{LinAlgError, LinAlgResult, NormalEquations, SparseLinearSolver};

/// Sparse LLᵀ solver for the (damped) normal equations.
#[derive(Debug, Clone)]
pub struct SparseCholeskySolver {
    factorizer: Option<Llt<usize, f64>>,

    /// Cached symbolic factorization for reuse across iterations.
    ///
    /// Adding `λD` only touches the diagonal, which is already part of the pattern of `H`,
    /// so the same symbolic factorization serves damped and undamped solves.
    symbolic_factorization: Option<SymbolicLlt<usize>>,

    /// Whether the stored factorization is of the undamped `H`.
    undamped: bool,

    /// Dimension of the last factorized matrix.
    dim: usize,

    /// The parameter covariance matrix, computed as `(J^T * J)^-1`.
    covariance_matrix: Option<Mat<f64>>,
}

impl SparseCholeskySolver {
    pub fn new() -> Self {
        SparseCholeskySolver {
            factorizer: None,
            symbolic_factorization: None,
            undamped: false,
            dim: 0,
            covariance_matrix: None,
        }
    }

    fn factorize(&mut self, matrix: &SparseColMat<usize, f64>) -> LinAlgResult<&Llt<usize, f64>> {
        let sym = if let Some(ref cached_sym) = self.symbolic_factorization {
            // SymbolicLlt is reference-counted, so clone() is O(1)
            cached_sym.clone()
        } else {
            let new_sym = SymbolicLlt::try_new(matrix.symbolic(), Side::Lower).map_err(|e| {
                LinAlgError::FactorizationFailed(
                    "Symbolic Cholesky decomposition failed".to_string(),
                )
                .log_with_source(e)
            })?;
            self.symbolic_factorization = Some(new_sym.clone());
            new_sym
        };

        self.factorizer = None;
        self.covariance_matrix = None;
        self.dim = matrix.ncols();
        let cholesky = Llt::try_new_with_symbolic(sym, matrix.as_ref(), Side::Lower)
            .map_err(|e| LinAlgError::SingularMatrix.log_with_source(e))?;
        Ok(self.factorizer.insert(cholesky))
    }
}

impl Default for SparseCholeskySolver {
    fn default() -> Self {
        Self::new()
    }
}

impl SparseLinearSolver for SparseCholeskySolver {
    fn solve_normal_equation(&mut self, system: &NormalEquations) -> LinAlgResult<Mat<f64>> {
        self.undamped = false;
        let cholesky = self.factorize(&system.hessian)?;
        let dx = cholesky.solve(-&system.gradient);
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
        let cholesky = self.factorize(&damped_hessian)?;
        Ok(cholesky.solve(-&system.gradient))
    }

    fn compute_covariance_matrix(&mut self) -> Option<&Mat<f64>> {
        if !self.undamped {
            return None;
        }
        if self.covariance_matrix.is_none()
            && let Some(factorizer) = &self.factorizer
        {
            // Solve H * X = I to get X = H^(-1)
            let identity = Mat::<f64>::identity(self.dim, self.dim);
            self.covariance_matrix = Some(factorizer.solve(&identity));
        }
        self.covariance_matrix.as_ref()
    }
}
