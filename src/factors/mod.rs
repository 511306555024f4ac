//! Factors for pose-graph optimization
//!
//! A factor is a measurement or constraint over one or two poses. It produces a residual
//! in the tangent space of its measurement and the Jacobian of that residual with respect
//! to each connected pose, expressed in the pose's local (right) tangent coordinates.
//!
//! # Available factors
//!
//! - [`EqualityFactor`]: pins a pose to a fixed value with a very tight noise model,
//!   removing the gauge freedom of a pose graph
//! - [`BetweenFactor`]: relative pose measurement between two poses
//! - [`PriorFactor`]: soft unary measurement of a pose
//!
//! Factors are stored in a [`FactorGraph`](crate::core::factor_graph::FactorGraph) as the
//! closed sum type [`GraphFactor`]. Each variant implements the [`Factor`] trait;
//! `GraphFactor` looks the connected poses up in a [`Values`] and whitens the result
//! with the factor's noise model.

use crate::core::noise_model::DiagonalNoise;
use crate::core::pose::Pose;
use crate::core::values::Values;
use crate::core::{CoreResult, Key};
use crate::error::PoseGraphResult;
use crate::manifold::{LieGroup, ManifoldType, Tangent};
use nalgebra::{DMatrix, DVector};
use thiserror::Error;
use tracing::error;

pub mod between_factor;
pub mod equality_factor;
pub mod prior_factor;

pub use between_factor::BetweenFactor;
pub use equality_factor::EqualityFactor;
pub use prior_factor::PriorFactor;

/// Factor-specific error types
#[derive(Debug, Clone, Error)]
pub enum FactorError {
    /// A connected pose has a different kind than the measurement
    #[error("Pose type mismatch: factor measures {expected}, got {actual}")]
    PoseTypeMismatch {
        expected: ManifoldType,
        actual: ManifoldType,
    },

    /// Noise model dimension does not match the measurement
    #[error("Invalid dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Wrong number of poses passed to `linearize`
    #[error("Invalid key count: expected {expected}, got {actual}")]
    KeyCount { expected: usize, actual: usize },
}

impl FactorError {
    /// Log the error with tracing::error and return self for chaining
    ///
    /// # Example
    /// ```ignore
    /// operation()
    ///     .map_err(|e| FactorError::from(e).log())?;
    /// ```
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }

    /// Log the error with the original source error for debugging context
    ///
    /// # Arguments
    /// * `source_error` - The original error (must implement Debug)
    #[must_use]
    pub fn log_with_source<E: std::fmt::Debug>(self, source_error: E) -> Self {
        error!("{} | Source: {:?}", self, source_error);
        self
    }
}

/// Result type for factor operations
pub type FactorResult<T> = Result<T, FactorError>;

/// Residual and optional Jacobian returned by [`Factor::linearize`].
pub type Linearization = (DVector<f64>, Option<DMatrix<f64>>);

/// Trait for factor (constraint) implementations in a pose graph.
///
/// # Thread Safety
///
/// Factors must be `Send + Sync` so the linear system builder can evaluate them in
/// parallel.
pub trait Factor: Send + Sync {
    /// Compute the unwhitened residual and Jacobian at the given poses.
    ///
    /// # Arguments
    ///
    /// * `poses` - One pose per key, in the order of [`Factor::keys`]
    /// * `compute_jacobian` - Whether to compute the Jacobian matrix
    ///
    /// # Returns
    ///
    /// Tuple `(residual, jacobian)` where the Jacobian is `dimension × Σ dof(pose)`,
    /// with one column block per pose in key order. For a between factor on two SE(2)
    /// poses this is `3 × 6`.
    fn linearize(&self, poses: &[&Pose], compute_jacobian: bool) -> FactorResult<Linearization>;

    /// Keys of the connected poses.
    fn keys(&self) -> &[Key];

    /// Dimension of the residual vector.
    fn dimension(&self) -> usize;

    fn noise_model(&self) -> &DiagonalNoise;
}

/// Whitened residual and Jacobian of one factor at a set of values.
#[derive(Debug, Clone)]
pub struct FactorEvaluation {
    pub residual: DVector<f64>,
    pub jacobian: Option<DMatrix<f64>>,
}

impl FactorEvaluation {
    /// Squared norm of the whitened residual.
    pub fn error(&self) -> f64 {
        self.residual.norm_squared()
    }
}

/// The factors a graph can hold.
#[derive(Debug, Clone)]
pub enum GraphFactor {
    Equality(EqualityFactor),
    Between(BetweenFactor),
    Prior(PriorFactor),
}

impl From<EqualityFactor> for GraphFactor {
    fn from(factor: EqualityFactor) -> Self {
        GraphFactor::Equality(factor)
    }
}

impl From<BetweenFactor> for GraphFactor {
    fn from(factor: BetweenFactor) -> Self {
        GraphFactor::Between(factor)
    }
}

impl From<PriorFactor> for GraphFactor {
    fn from(factor: PriorFactor) -> Self {
        GraphFactor::Prior(factor)
    }
}

impl GraphFactor {
    pub fn as_factor(&self) -> &dyn Factor {
        match self {
            GraphFactor::Equality(factor) => factor,
            GraphFactor::Between(factor) => factor,
            GraphFactor::Prior(factor) => factor,
        }
    }

    pub fn keys(&self) -> &[Key] {
        self.as_factor().keys()
    }

    pub fn dimension(&self) -> usize {
        self.as_factor().dimension()
    }

    pub fn noise_model(&self) -> &DiagonalNoise {
        self.as_factor().noise_model()
    }

    /// Look up the connected poses, linearize, and whiten.
    ///
    /// # Errors
    /// `CoreError::MissingKey` if a key is absent from `values`, or a `FactorError` if
    /// the poses do not match the factor.
    pub fn evaluate(
        &self,
        values: &Values,
        compute_jacobian: bool,
    ) -> PoseGraphResult<FactorEvaluation> {
        let poses = self
            .keys()
            .iter()
            .map(|&key| values.at(key))
            .collect::<Result<Vec<_>, _>>()?;
        let (residual, jacobian) = self.as_factor().linearize(&poses, compute_jacobian)?;
        let noise = self.noise_model();
        Ok(FactorEvaluation {
            residual: noise.whiten(&residual),
            jacobian: jacobian.map(|jac| noise.whiten_jacobian(&jac)),
        })
    }

    /// `||Σ^(-1/2) r||²` at `values`.
    pub fn error(&self, values: &Values) -> PoseGraphResult<f64> {
        Ok(self.evaluate(values, false)?.error())
    }

    /// Same factor with every key shifted by `offset`.
    pub fn with_key_offset(&self, offset: Key) -> CoreResult<GraphFactor> {
        Ok(match self {
            GraphFactor::Equality(factor) => factor.with_key_offset(offset)?.into(),
            GraphFactor::Between(factor) => factor.with_key_offset(offset)?.into(),
            GraphFactor::Prior(factor) => factor.with_key_offset(offset)?.into(),
        })
    }
}

/// Copy a fixed-size Lie group Jacobian into columns `[offset, offset + dim)` of `target`.
pub(crate) fn copy_block<T: LieGroup>(
    block: &T::JacobianMatrix,
    dim: usize,
    target: &mut DMatrix<f64>,
    offset: usize,
) {
    for i in 0..dim {
        for j in 0..dim {
            target[(i, j + offset)] = block[(i, j)];
        }
    }
}

/// Check that `poses` holds `expected` entries.
pub(crate) fn check_key_count(poses: &[&Pose], expected: usize) -> FactorResult<()> {
    if poses.len() == expected {
        Ok(())
    } else {
        Err(FactorError::KeyCount {
            expected,
            actual: poses.len(),
        }
        .log())
    }
}

/// Check that the noise model matches the measurement's tangent dimension.
pub(crate) fn check_noise_dimension(measurement: &Pose, noise: &DiagonalNoise) -> FactorResult<()> {
    if measurement.dim() == noise.dim() {
        Ok(())
    } else {
        Err(FactorError::DimensionMismatch {
            expected: measurement.dim(),
            actual: noise.dim(),
        }
        .log())
    }
}

/// Error for a pose whose kind differs from the measurement's.
pub(crate) fn type_mismatch(measurement: &Pose, actual: &Pose) -> FactorError {
    FactorError::PoseTypeMismatch {
        expected: measurement.manifold_type(),
        actual: actual.manifold_type(),
    }
    .log()
}

/// Residual `Log(reference⁻¹ x)` and its Jacobian `Jr⁻¹(r)` with respect to `x`.
///
/// Shared by the unary factors.
pub(crate) fn unary_residual<T: LieGroup>(
    reference: &T,
    x: &T,
    compute_jacobian: bool,
) -> Linearization {
    let dim = x.tangent_dim();
    let mut j_residual_wrt_x = T::zero_jacobian();
    let residual = x.right_minus(reference, Some(&mut j_residual_wrt_x), None);

    let jacobian = compute_jacobian.then(|| {
        let mut jacobian = DMatrix::zeros(dim, dim);
        copy_block::<T>(&j_residual_wrt_x, dim, &mut jacobian, 0);
        jacobian
    });

    (residual.to_dvector(), jacobian)
}

/// Linearize a unary factor against its reference pose.
pub(crate) fn linearize_unary(
    reference: &Pose,
    poses: &[&Pose],
    compute_jacobian: bool,
) -> FactorResult<Linearization> {
    check_key_count(poses, 1)?;
    match (reference, poses[0]) {
        (Pose::SE2(reference), Pose::SE2(x)) => Ok(unary_residual(reference, x, compute_jacobian)),
        (Pose::SE3(reference), Pose::SE3(x)) => Ok(unary_residual(reference, x, compute_jacobian)),
        (reference, actual) => Err(type_mismatch(reference, actual)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CoreError;
    use crate::error::PoseGraphError;
    use crate::manifold::se2::SE2;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_evaluate_whitens_residual() -> TestResult {
        let mut values = Values::new();
        values.insert(0, SE2::identity())?;
        values.insert(1, SE2::from_xy_angle(1.5, 0.0, 0.0))?;
        let noise = DiagonalNoise::isotropic(3, 0.5)?;
        let factor: GraphFactor =
            BetweenFactor::new(0, 1, SE2::from_xy_angle(1.0, 0.0, 0.0), noise)?.into();

        let evaluation = factor.evaluate(&values, true)?;
        assert!((evaluation.residual[0] - 1.0).abs() < 1e-12);
        assert!((factor.error(&values)? - 1.0).abs() < 1e-12);
        let jacobian = evaluation.jacobian.ok_or("missing jacobian")?;
        assert_eq!(jacobian.shape(), (3, 6));
        assert!((jacobian[(0, 3)] - 2.0).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_evaluate_missing_key() -> TestResult {
        let values = Values::new();
        let factor: GraphFactor = PriorFactor::new(4, SE2::identity(), DiagonalNoise::unit(3)?)?.into();
        assert!(matches!(
            factor.evaluate(&values, false),
            Err(PoseGraphError::Core(CoreError::MissingKey(4)))
        ));
        Ok(())
    }

    #[test]
    fn test_with_key_offset_keeps_measurement() -> TestResult {
        let factor: GraphFactor = BetweenFactor::new(
            1,
            2,
            SE2::from_xy_angle(1.0, 0.0, 0.0),
            DiagonalNoise::unit(3)?,
        )?
        .into();
        let shifted = factor.with_key_offset(10)?;
        assert_eq!(shifted.keys(), &[11, 12]);
        assert_eq!(factor.keys(), &[1, 2]);
        Ok(())
    }

    #[test]
    fn test_with_key_offset_overflow() -> TestResult {
        let factor: GraphFactor = BetweenFactor::new(
            1,
            Key::MAX - 1,
            SE2::from_xy_angle(1.0, 0.0, 0.0),
            DiagonalNoise::unit(3)?,
        )?
        .into();
        assert!(factor.with_key_offset(1).is_ok());
        assert!(matches!(
            factor.with_key_offset(2),
            Err(CoreError::KeyOverflow {
                key,
                offset: 2
            }) if key == Key::MAX - 1
        ));

        let prior: GraphFactor =
            PriorFactor::new(Key::MAX, SE2::identity(), DiagonalNoise::unit(3)?)?.into();
        assert!(prior.with_key_offset(1).is_err());
        let equality: GraphFactor = EqualityFactor::new(Key::MAX, SE2::identity()).into();
        assert!(equality.with_key_offset(1).is_err());
        assert!(equality.with_key_offset(0).is_ok());
        Ok(())
    }
}
