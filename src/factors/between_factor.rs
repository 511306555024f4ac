//! Between factor for relative pose measurements.
//!
//! The between factor is the odometry / loop-closure constraint of a pose graph. Given a
//! measured relative transform `Z_ij` between poses `X_i` and `X_j`, the residual is the
//! tangent-space discrepancy between the measurement and the relative transform predicted
//! by the current estimates:
//!
//! ```text
//! r = Log(Z_ij⁻¹ ∘ X_i⁻¹ ∘ X_j)
//! ```
//!
//! It is zero when `X_i⁻¹ ∘ X_j` equals the measurement.
//!
//! # Jacobians
//!
//! With `P = X_i⁻¹ ∘ X_j` the chain rule gives
//!
//! ```text
//! ∂r/∂X_i = Jr⁻¹(r) · (-Ad(P⁻¹)) = -Jr⁻¹(r) · Ad(X_j⁻¹ ∘ X_i)
//! ∂r/∂X_j = Jr⁻¹(r)
//! ```
//!
//! # Example
//!
//! ```
//! use apex_pose_graph::core::noise_model::DiagonalNoise;
//! use apex_pose_graph::factors::{BetweenFactor, Factor};
//! use apex_pose_graph::manifold::se2::SE2;
//! # use apex_pose_graph::error::PoseGraphResult;
//! # fn example() -> PoseGraphResult<()> {
//!
//! // Robot moved 1 m forward and turned 0.1 rad between pose 0 and pose 1
//! let odometry = SE2::from_xy_angle(1.0, 0.0, 0.1);
//! let noise = DiagonalNoise::from_sigmas(nalgebra::DVector::from_vec(vec![0.1, 0.1, 0.05]))?;
//! let factor = BetweenFactor::new(0, 1, odometry, noise)?;
//! assert_eq!(factor.keys(), [0, 1]);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

use super::{
    Factor, FactorResult, Linearization, check_key_count, check_noise_dimension, copy_block,
    type_mismatch,
};
use crate::core::noise_model::DiagonalNoise;
use crate::core::pose::Pose;
use crate::core::{CoreResult, Key, offset_key};
use crate::manifold::{LieGroup, Tangent};
use nalgebra::DMatrix;

/// Relative pose measurement between two poses.
#[derive(Debug, Clone)]
pub struct BetweenFactor {
    keys: [Key; 2],
    measured: Pose,
    noise: DiagonalNoise,
}

impl BetweenFactor {
    /// Create a between factor measuring `X_i⁻¹ ∘ X_j`.
    ///
    /// # Errors
    /// `FactorError::DimensionMismatch` if the noise model dimension differs from the
    /// measurement's tangent dimension.
    pub fn new(
        key_i: Key,
        key_j: Key,
        measured: impl Into<Pose>,
        noise: DiagonalNoise,
    ) -> FactorResult<Self> {
        let measured = measured.into();
        check_noise_dimension(&measured, &noise)?;
        Ok(BetweenFactor {
            keys: [key_i, key_j],
            measured,
            noise,
        })
    }

    pub fn measured(&self) -> &Pose {
        &self.measured
    }

    pub fn with_key_offset(&self, offset: Key) -> CoreResult<Self> {
        Ok(BetweenFactor {
            keys: [
                offset_key(self.keys[0], offset)?,
                offset_key(self.keys[1], offset)?,
            ],
            measured: self.measured.clone(),
            noise: self.noise.clone(),
        })
    }
}

/// Residual `Log(Z⁻¹ X_i⁻¹ X_j)` with the Jacobians `[∂r/∂X_i | ∂r/∂X_j]`.
fn relative_pose_residual<T: LieGroup>(
    measured: &T,
    pose_i: &T,
    pose_j: &T,
    compute_jacobian: bool,
) -> Linearization {
    // Step 1: predicted relative transform X_i⁻¹ ∘ X_j
    let mut j_predicted_wrt_i = T::zero_jacobian();
    let mut j_predicted_wrt_j = T::zero_jacobian();
    let predicted = pose_i.between(
        pose_j,
        Some(&mut j_predicted_wrt_i),
        Some(&mut j_predicted_wrt_j),
    );

    // Step 2: predicted ⊟ measured
    let mut j_residual_wrt_predicted = T::zero_jacobian();
    let residual = predicted.right_minus(measured, Some(&mut j_residual_wrt_predicted), None);

    let jacobian = compute_jacobian.then(|| {
        let dof = pose_i.tangent_dim();
        let jacobian_wrt_i = j_residual_wrt_predicted.clone() * j_predicted_wrt_i;
        let jacobian_wrt_j = j_residual_wrt_predicted * j_predicted_wrt_j;

        let mut jacobian = DMatrix::<f64>::zeros(dof, 2 * dof);
        copy_block::<T>(&jacobian_wrt_i, dof, &mut jacobian, 0);
        copy_block::<T>(&jacobian_wrt_j, dof, &mut jacobian, dof);
        jacobian
    });

    (residual.to_dvector(), jacobian)
}

impl Factor for BetweenFactor {
    fn linearize(&self, poses: &[&Pose], compute_jacobian: bool) -> FactorResult<Linearization> {
        check_key_count(poses, 2)?;
        match (&self.measured, poses[0], poses[1]) {
            (Pose::SE2(measured), Pose::SE2(pose_i), Pose::SE2(pose_j)) => Ok(
                relative_pose_residual(measured, pose_i, pose_j, compute_jacobian),
            ),
            (Pose::SE3(measured), Pose::SE3(pose_i), Pose::SE3(pose_j)) => Ok(
                relative_pose_residual(measured, pose_i, pose_j, compute_jacobian),
            ),
            (measured, pose_i, pose_j) => {
                let offending = if pose_i.manifold_type() != measured.manifold_type() {
                    pose_i
                } else {
                    pose_j
                };
                Err(type_mismatch(measured, offending))
            }
        }
    }

    fn keys(&self) -> &[Key] {
        &self.keys
    }

    fn dimension(&self) -> usize {
        self.measured.dim()
    }

    fn noise_model(&self) -> &DiagonalNoise {
        &self.noise
    }
}
