//! Diagonal Gaussian noise models.
//!
//! A factor's residual `r` is weighted by the inverse square-root covariance before it
//! enters the least-squares problem. For a diagonal covariance `Σ = diag(σ²)` this is
//! an element-wise division:
//!
//! ```text
//! r̃ = Σ^(-1/2) r = r ⊘ σ        J̃ = Σ^(-1/2) J
//! ```
//!
//! so that `||r̃||²` is the squared Mahalanobis distance `rᵀ Σ⁻¹ r`.

use crate::core::{CoreError, CoreResult};
use nalgebra::{DMatrix, DVector};

/// Independent per-component Gaussian noise.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagonalNoise {
    sigmas: DVector<f64>,
    inv_sigmas: DVector<f64>,
}

impl DiagonalNoise {
    /// Build from standard deviations.
    ///
    /// # Errors
    /// Returns `CoreError::InvalidNoiseModel` if the vector is empty or any sigma is not
    /// strictly positive and finite.
    pub fn from_sigmas(sigmas: DVector<f64>) -> CoreResult<Self> {
        if sigmas.is_empty() {
            return Err(CoreError::InvalidNoiseModel("empty sigma vector".to_string()).log());
        }
        if let Some(bad) = sigmas.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
            return Err(CoreError::InvalidNoiseModel(format!(
                "sigma must be positive and finite, got {bad}"
            ))
            .log());
        }
        let inv_sigmas = sigmas.map(|s| 1.0 / s);
        Ok(DiagonalNoise { sigmas, inv_sigmas })
    }

    /// Build from variances `σ²`.
    pub fn from_variances(variances: DVector<f64>) -> CoreResult<Self> {
        if let Some(bad) = variances.iter().find(|v| !(v.is_finite() && **v > 0.0)) {
            return Err(CoreError::InvalidNoiseModel(format!(
                "variance must be positive and finite, got {bad}"
            ))
            .log());
        }
        Self::from_sigmas(variances.map(f64::sqrt))
    }

    /// Same sigma on every component.
    pub fn isotropic(dim: usize, sigma: f64) -> CoreResult<Self> {
        Self::from_sigmas(DVector::from_element(dim, sigma))
    }

    /// Unit sigmas: residuals pass through unweighted.
    pub fn unit(dim: usize) -> CoreResult<Self> {
        Self::isotropic(dim, 1.0)
    }

    /// Isotropic model for a sigma known to be positive and finite at compile time.
    pub(crate) fn constant(dim: usize, sigma: f64) -> Self {
        DiagonalNoise {
            sigmas: DVector::from_element(dim, sigma),
            inv_sigmas: DVector::from_element(dim, 1.0 / sigma),
        }
    }

    pub fn dim(&self) -> usize {
        self.sigmas.len()
    }

    pub fn sigmas(&self) -> &DVector<f64> {
        &self.sigmas
    }

    pub fn whiten(&self, residual: &DVector<f64>) -> DVector<f64> {
        residual.component_mul(&self.inv_sigmas)
    }

    /// Scale row `i` of the Jacobian by `1 / σᵢ`.
    pub fn whiten_jacobian(&self, jacobian: &DMatrix<f64>) -> DMatrix<f64> {
        let mut whitened = jacobian.clone();
        for (mut row, inv_sigma) in whitened.row_iter_mut().zip(self.inv_sigmas.iter()) {
            row *= *inv_sigma;
        }
        whitened
    }

    /// `rᵀ Σ⁻¹ r`.
    pub fn squared_mahalanobis(&self, residual: &DVector<f64>) -> f64 {
        self.whiten(residual).norm_squared()
    }
}
