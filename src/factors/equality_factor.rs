//! Equality factor anchoring a pose to a fixed value.
//!
//! A pose graph built only from relative measurements is invariant to a global rigid
//! transform, so its normal equations are rank deficient. Pinning one pose with an
//! equality factor removes that gauge freedom. The factor has the residual of a prior,
//! `r = Log(X_fixed⁻¹ ∘ X)`, weighted by a very tight isotropic noise model.

use super::{Factor, FactorResult, Linearization, check_noise_dimension, linearize_unary};
use crate::core::noise_model::DiagonalNoise;
use crate::core::pose::Pose;
use crate::core::{CoreResult, Key, offset_key};

/// Default standard deviation of an equality constraint.
pub const EQUALITY_SIGMA: f64 = 1e-6;

/// Hard constraint `X == X_fixed`, enforced through a tight noise model.
#[derive(Debug, Clone)]
pub struct EqualityFactor {
    key: [Key; 1],
    fixed: Pose,
    noise: DiagonalNoise,
}

impl EqualityFactor {
    pub fn new(key: Key, fixed: impl Into<Pose>) -> Self {
        let fixed = fixed.into();
        let noise = DiagonalNoise::constant(fixed.dim(), EQUALITY_SIGMA);
        EqualityFactor {
            key: [key],
            fixed,
            noise,
        }
    }

    /// Replace the default noise model.
    ///
    /// # Errors
    /// `FactorError::DimensionMismatch` if the noise model does not match the pose.
    pub fn with_noise(mut self, noise: DiagonalNoise) -> FactorResult<Self> {
        check_noise_dimension(&self.fixed, &noise)?;
        self.noise = noise;
        Ok(self)
    }

    pub fn fixed(&self) -> &Pose {
        &self.fixed
    }

    pub fn with_key_offset(&self, offset: Key) -> CoreResult<Self> {
        Ok(EqualityFactor {
            key: [offset_key(self.key[0], offset)?],
            fixed: self.fixed.clone(),
            noise: self.noise.clone(),
        })
    }
}

impl Factor for EqualityFactor {
    fn linearize(&self, poses: &[&Pose], compute_jacobian: bool) -> FactorResult<Linearization> {
        linearize_unary(&self.fixed, poses, compute_jacobian)
    }

    fn keys(&self) -> &[Key] {
        &self.key
    }

    fn dimension(&self) -> usize {
        self.fixed.dim()
    }

    fn noise_model(&self) -> &DiagonalNoise {
        &self.noise
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::FactorError;
    use crate::manifold::se3::SE3;
    use crate::manifold::LieGroup;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_equality_factor_default_noise_is_tight() {
        let factor = EqualityFactor::new(0, SE3::identity());
        assert_eq!(factor.noise_model().dim(), 6);
        assert!(factor.noise_model().sigmas().iter().all(|&s| s == EQUALITY_SIGMA));
    }

    #[test]
    fn test_equality_factor_with_noise() -> TestResult {
        let factor = EqualityFactor::new(0, SE3::identity()).with_noise(DiagonalNoise::unit(6)?)?;
        assert!(factor.noise_model().sigmas().iter().all(|&s| s == 1.0));

        let wrong = EqualityFactor::new(0, SE3::identity()).with_noise(DiagonalNoise::unit(3)?);
        assert!(matches!(wrong, Err(FactorError::DimensionMismatch { .. })));
        Ok(())
    }

    #[test]
    fn test_equality_factor_residual() -> TestResult {
        let factor = EqualityFactor::new(0, SE3::identity());
        let moved = Pose::from(SE3::from_translation_euler(1e-3, 0.0, 0.0, 0.0, 0.0, 0.0));
        let (residual, _) = factor.linearize(&[&moved], false)?;
        assert!((residual[0] - 1e-3).abs() < 1e-12);
        let whitened = factor.noise_model().whiten(&residual);
        assert!((whitened[0] - 1e3).abs() < 1e-6);
        Ok(())
    }
}
