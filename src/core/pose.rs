//! Poses stored in a pose graph.
//!
//! A `Pose` is either an SE(2) or an SE(3) element. Graph-level code works on `Pose`
//! and dispatches to the concrete group, so a single graph and a single `Values` can be
//! used for planar and spatial problems alike. Operations that combine two poses of
//! different kinds fail with [`ManifoldError::TypeMismatch`].
//!
//! Tangent vectors cross this boundary as `DVector<f64>` in the group's layout:
//! `[x, y, θ]` for SE(2), `[ρx, ρy, ρz, θx, θy, θz]` for SE(3).

use crate::manifold::se2::{SE2, SE2Tangent};
use crate::manifold::se3::{SE3, SE3Tangent};
use crate::manifold::{LieGroup, ManifoldError, ManifoldResult, ManifoldType, Tangent};
use nalgebra::DVector;
use std::{
    fmt,
    fmt::{Display, Formatter},
};

/// A rigid transform in 2D or 3D.
#[derive(Debug, Clone, PartialEq)]
pub enum Pose {
    SE2(SE2),
    SE3(SE3),
}

impl Display for Pose {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Pose::SE2(pose) => write!(f, "{pose}"),
            Pose::SE3(pose) => write!(f, "{pose}"),
        }
    }
}

impl From<SE2> for Pose {
    fn from(pose: SE2) -> Self {
        Pose::SE2(pose)
    }
}

impl From<SE3> for Pose {
    fn from(pose: SE3) -> Self {
        Pose::SE3(pose)
    }
}

impl Pose {
    pub fn manifold_type(&self) -> ManifoldType {
        match self {
            Pose::SE2(_) => ManifoldType::SE2,
            Pose::SE3(_) => ManifoldType::SE3,
        }
    }

    /// Tangent space dimension (3 for SE(2), 6 for SE(3)).
    pub fn dim(&self) -> usize {
        match self {
            Pose::SE2(_) => SE2Tangent::DIM,
            Pose::SE3(_) => SE3Tangent::DIM,
        }
    }

    /// Identity of the same kind as `self`.
    pub fn identity_like(&self) -> Pose {
        match self {
            Pose::SE2(_) => Pose::SE2(SE2::identity()),
            Pose::SE3(_) => Pose::SE3(SE3::identity()),
        }
    }

    pub fn as_se2(&self) -> Option<&SE2> {
        match self {
            Pose::SE2(pose) => Some(pose),
            Pose::SE3(_) => None,
        }
    }

    pub fn as_se3(&self) -> Option<&SE3> {
        match self {
            Pose::SE3(pose) => Some(pose),
            Pose::SE2(_) => None,
        }
    }

    pub fn inverse(&self) -> Pose {
        match self {
            Pose::SE2(pose) => Pose::SE2(pose.inverse(None)),
            Pose::SE3(pose) => Pose::SE3(pose.inverse(None)),
        }
    }

    /// `self * other`.
    pub fn compose(&self, other: &Pose) -> ManifoldResult<Pose> {
        match (self, other) {
            (Pose::SE2(a), Pose::SE2(b)) => Ok(Pose::SE2(a.compose(b, None, None))),
            (Pose::SE3(a), Pose::SE3(b)) => Ok(Pose::SE3(a.compose(b, None, None))),
            _ => Err(self.mismatch(other)),
        }
    }

    /// `self⁻¹ * other`.
    pub fn between(&self, other: &Pose) -> ManifoldResult<Pose> {
        match (self, other) {
            (Pose::SE2(a), Pose::SE2(b)) => Ok(Pose::SE2(a.between(b, None, None))),
            (Pose::SE3(a), Pose::SE3(b)) => Ok(Pose::SE3(a.between(b, None, None))),
            _ => Err(self.mismatch(other)),
        }
    }

    /// `self * Exp(delta)`.
    pub fn retract(&self, delta: &DVector<f64>) -> ManifoldResult<Pose> {
        match self {
            Pose::SE2(pose) => {
                let tangent = SE2Tangent::from_dvector(delta)?;
                Ok(Pose::SE2(pose.right_plus(&tangent, None, None)))
            }
            Pose::SE3(pose) => {
                let tangent = SE3Tangent::from_dvector(delta)?;
                Ok(Pose::SE3(pose.right_plus(&tangent, None, None)))
            }
        }
    }

    /// `Log(self⁻¹ * other)`, the inverse of [`Pose::retract`].
    pub fn local_coordinates(&self, other: &Pose) -> ManifoldResult<DVector<f64>> {
        match (self, other) {
            (Pose::SE2(a), Pose::SE2(b)) => Ok(b.right_minus(a, None, None).to_dvector()),
            (Pose::SE3(a), Pose::SE3(b)) => Ok(b.right_minus(a, None, None).to_dvector()),
            _ => Err(self.mismatch(other)),
        }
    }

    /// Component-wise comparison; poses of different kinds are never approximately equal.
    pub fn is_approx(&self, other: &Pose, tolerance: f64) -> bool {
        match (self, other) {
            (Pose::SE2(a), Pose::SE2(b)) => a.is_approx(b, tolerance),
            (Pose::SE3(a), Pose::SE3(b)) => a.is_approx(b, tolerance),
            _ => false,
        }
    }

    pub fn is_valid(&self, tolerance: f64) -> bool {
        match self {
            Pose::SE2(pose) => pose.is_valid(tolerance),
            Pose::SE3(pose) => pose.is_valid(tolerance),
        }
    }

    pub fn normalize(&mut self) {
        match self {
            Pose::SE2(pose) => pose.normalize(),
            Pose::SE3(pose) => pose.normalize(),
        }
    }

    pub fn to_vector(&self) -> DVector<f64> {
        match self {
            Pose::SE2(pose) => pose.to_vector(),
            Pose::SE3(pose) => pose.to_vector(),
        }
    }

    pub(crate) fn check_same_type(&self, other: &Pose) -> ManifoldResult<()> {
        if self.manifold_type() == other.manifold_type() {
            Ok(())
        } else {
            Err(self.mismatch(other))
        }
    }

    fn mismatch(&self, other: &Pose) -> ManifoldError {
        ManifoldError::TypeMismatch {
            left: self.manifold_type(),
            right: other.manifold_type(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;
    use std::f64::consts::FRAC_PI_3;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    const TOLERANCE: f64 = 1e-9;

    #[test]
    fn test_pose_retract_local_coordinates_roundtrip() -> TestResult {
        let base = Pose::from(SE3::from_translation_euler(1.0, 2.0, 3.0, 0.1, 0.2, 0.3));
        let delta = DVector::from_vec(vec![0.1, -0.2, 0.3, 0.05, -0.04, 0.02]);
        let moved = base.retract(&delta)?;
        let recovered = base.local_coordinates(&moved)?;
        assert!((recovered - delta).norm() < TOLERANCE);
        Ok(())
    }

    #[test]
    fn test_pose_retract_of_local_reaches_target() -> TestResult {
        let a = Pose::from(SE2::from_xy_angle(1.0, -1.0, 0.4));
        let b = Pose::from(SE2::from_xy_angle(-2.0, 0.5, 2.9));
        let delta = a.local_coordinates(&b)?;
        assert!(a.retract(&delta)?.is_approx(&b, TOLERANCE));
        Ok(())
    }

    #[test]
    fn test_pose_between_self_is_identity() -> TestResult {
        let pose = Pose::from(SE3::from_translation_euler(0.5, 0.0, -1.0, 0.0, FRAC_PI_3, 0.0));
        let relative = pose.between(&pose)?;
        assert!(relative.is_approx(&pose.identity_like(), TOLERANCE));
        Ok(())
    }

    #[test]
    fn test_pose_composition_is_not_commutative() -> TestResult {
        let a = Pose::from(SE2::from_xy_angle(1.0, 0.0, 1.0));
        let b = Pose::from(SE2::from_xy_angle(0.0, 2.0, 0.0));
        assert!(!a.compose(&b)?.is_approx(&b.compose(&a)?, TOLERANCE));
        Ok(())
    }

    #[test]
    fn test_pose_mixed_types_fail() {
        let planar = Pose::from(SE2::identity());
        let spatial = Pose::from(SE3::identity());
        assert!(matches!(
            planar.between(&spatial),
            Err(ManifoldError::TypeMismatch {
                left: ManifoldType::SE2,
                right: ManifoldType::SE3
            })
        ));
        assert!(!planar.is_approx(&spatial, TOLERANCE));
    }

    #[test]
    fn test_pose_retract_checks_dimension() {
        let pose = Pose::from(SE3::identity());
        let delta = DVector::from_vec(vec![0.0; 3]);
        assert!(matches!(
            pose.retract(&delta),
            Err(ManifoldError::InvalidTangentDimension {
                expected: 6,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_pose_long_chain_stays_on_manifold() -> TestResult {
        let step = Pose::from(SE3::from_translation_euler(0.1, 0.0, 0.0, 0.01, 0.02, 0.03));
        let mut pose = step.identity_like();
        for _ in 0..500 {
            pose = pose.compose(&step)?;
        }
        assert!(pose.is_valid(1e-12));
        let translation = pose.as_se3().map(SE3::translation).unwrap_or_else(Vector3::zeros);
        assert!(translation.iter().all(|value| value.is_finite()));
        Ok(())
    }
}
