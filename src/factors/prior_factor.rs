//! Prior factor for unary measurements of a pose.
//!
//! Represents a direct measurement or prior belief about a pose, such as a GPS fix or an
//! externally localized keyframe. The residual lives in the tangent space of the prior:
//!
//! ```text
//! r = Log(X_prior⁻¹ ∘ X)
//! ```
//!
//! and its Jacobian with respect to `X` is `Jr⁻¹(r)`.

use super::{Factor, FactorResult, Linearization, check_noise_dimension, linearize_unary};
use crate::core::noise_model::DiagonalNoise;
use crate::core::pose::Pose;
use crate::core::{CoreResult, Key, offset_key};

/// Soft prior on a single pose.
#[derive(Debug, Clone)]
pub struct PriorFactor {
    key: [Key; 1],
    prior: Pose,
    noise: DiagonalNoise,
}

impl PriorFactor {
    /// # Errors
    /// `FactorError::DimensionMismatch` if the noise model does not match the prior.
    pub fn new(key: Key, prior: impl Into<Pose>, noise: DiagonalNoise) -> FactorResult<Self> {
        let prior = prior.into();
        check_noise_dimension(&prior, &noise)?;
        Ok(PriorFactor {
            key: [key],
            prior,
            noise,
        })
    }

    pub fn prior(&self) -> &Pose {
        &self.prior
    }

    pub fn with_key_offset(&self, offset: Key) -> CoreResult<Self> {
        Ok(PriorFactor {
            key: [offset_key(self.key[0], offset)?],
            prior: self.prior.clone(),
            noise: self.noise.clone(),
        })
    }
}

impl Factor for PriorFactor {
    fn linearize(&self, poses: &[&Pose], compute_jacobian: bool) -> FactorResult<Linearization> {
        linearize_unary(&self.prior, poses, compute_jacobian)
    }

    fn keys(&self) -> &[Key] {
        &self.key
    }

    fn dimension(&self) -> usize {
        self.prior.dim()
    }

    fn noise_model(&self) -> &DiagonalNoise {
        &self.noise
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifold::se2::SE2;
    use crate::manifold::se3::SE3;
    use nalgebra::{DMatrix, DVector};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    const TOLERANCE: f64 = 1e-9;

    #[test]
    fn test_prior_factor_residual_is_local_coordinates() -> TestResult {
        let prior = Pose::from(SE2::from_xy_angle(1.0, 2.0, 0.3));
        let factor = PriorFactor::new(0, prior.clone(), DiagonalNoise::unit(3)?)?;
        let current = Pose::from(SE2::from_xy_angle(1.2, 1.9, 0.5));
        let (residual, _) = factor.linearize(&[&current], false)?;
        assert!((residual - prior.local_coordinates(&current)?).norm() < TOLERANCE);
        Ok(())
    }

    #[test]
    fn test_prior_factor_jacobian_matches_finite_difference() -> TestResult {
        let factor = PriorFactor::new(
            2,
            SE3::from_translation_euler(0.0, 1.0, 0.0, 0.2, 0.0, -0.1),
            DiagonalNoise::isotropic(6, 0.1)?,
        )?;
        let current = Pose::from(SE3::from_translation_euler(0.3, 0.8, -0.2, 0.5, 0.1, 0.2));
        let (base, jacobian) = factor.linearize(&[&current], true)?;
        let jacobian = jacobian.ok_or("missing jacobian")?;

        let eps = 1e-6;
        let mut numeric = DMatrix::zeros(6, 6);
        for column in 0..6 {
            let mut delta = DVector::zeros(6);
            delta[column] = eps;
            let (moved, _) = factor.linearize(&[&current.retract(&delta)?], false)?;
            numeric.set_column(column, &((moved - &base) / eps));
        }
        assert!((jacobian - numeric).amax() < 1e-5);
        Ok(())
    }

    #[test]
    fn test_prior_factor_identity_jacobian_at_prior() -> TestResult {
        let prior = SE3::from_translation_euler(1.0, 2.0, 3.0, 0.1, 0.2, 0.3);
        let factor = PriorFactor::new(0, prior.clone(), DiagonalNoise::unit(6)?)?;
        let (residual, jacobian) = factor.linearize(&[&Pose::from(prior)], true)?;
        assert!(residual.norm() < TOLERANCE);
        let jacobian = jacobian.ok_or("missing jacobian")?;
        assert!((jacobian - DMatrix::<f64>::identity(6, 6)).amax() < TOLERANCE);
        Ok(())
    }
}
