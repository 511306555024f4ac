//! SO(2) - Special Orthogonal Group in 2D
//!
//! SO(2) elements are represented using nalgebra's UnitComplex internally.
//! SO(2) tangent elements are a single angle in radians.

use crate::manifold::{LieGroup, ManifoldResult, Tangent, check_tangent_dimension};
use nalgebra::{DVector, Matrix1, Matrix2, UnitComplex, Vector2};
use rand::Rng;
use rand_distr::StandardNormal;
use std::f64::consts::PI;
use std::{
    fmt,
    fmt::{Display, Formatter},
};

/// SO(2) group element representing rotations in 2D.
#[derive(Debug, Clone, PartialEq)]
pub struct SO2 {
    complex: UnitComplex<f64>,
}

impl Display for SO2 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "SO2(angle: {:.4})", self.complex.angle())
    }
}

impl SO2 {
    /// Space dimension - dimension of the ambient space that the group acts on
    pub const DIM: usize = 2;

    /// Degrees of freedom - dimension of the tangent space
    pub const DOF: usize = 1;

    /// Representation size - size of the underlying data representation
    pub const REP_SIZE: usize = 2;

    pub fn new(complex: UnitComplex<f64>) -> Self {
        SO2 { complex }
    }

    pub fn from_angle(angle: f64) -> Self {
        SO2 {
            complex: UnitComplex::new(angle),
        }
    }

    /// Angle in `(-π, π]`.
    pub fn angle(&self) -> f64 {
        self.complex.angle()
    }

    pub fn complex(&self) -> UnitComplex<f64> {
        self.complex
    }

    pub fn rotation_matrix(&self) -> Matrix2<f64> {
        self.complex.to_rotation_matrix().into_inner()
    }

    pub fn act(&self, point: &Vector2<f64>) -> Vector2<f64> {
        self.complex * point
    }
}

impl LieGroup for SO2 {
    type TangentVector = SO2Tangent;
    type JacobianMatrix = Matrix1<f64>;
    type LieAlgebra = Matrix2<f64>;

    fn identity() -> Self {
        SO2 {
            complex: UnitComplex::identity(),
        }
    }

    fn inverse(&self, jacobian: Option<&mut Self::JacobianMatrix>) -> Self {
        if let Some(jac) = jacobian {
            *jac = -Matrix1::identity();
        }
        SO2 {
            complex: self.complex.inverse(),
        }
    }

    fn compose(
        &self,
        other: &Self,
        jacobian_self: Option<&mut Self::JacobianMatrix>,
        jacobian_other: Option<&mut Self::JacobianMatrix>,
    ) -> Self {
        if let Some(jac_self) = jacobian_self {
            *jac_self = Matrix1::identity();
        }
        if let Some(jac_other) = jacobian_other {
            *jac_other = Matrix1::identity();
        }
        SO2 {
            complex: self.complex * other.complex,
        }
    }

    fn log(&self, jacobian: Option<&mut Self::JacobianMatrix>) -> Self::TangentVector {
        if let Some(jac) = jacobian {
            *jac = Matrix1::identity();
        }
        SO2Tangent::new(self.complex.angle())
    }

    fn adjoint(&self) -> Self::JacobianMatrix {
        Matrix1::identity()
    }

    fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        SO2::from_angle(rng.random_range(-PI..PI))
    }

    fn jacobian_identity() -> Self::JacobianMatrix {
        Matrix1::identity()
    }

    fn zero_jacobian() -> Self::JacobianMatrix {
        Matrix1::zeros()
    }

    fn normalize(&mut self) {
        self.complex.renormalize();
    }

    fn is_valid(&self, tolerance: f64) -> bool {
        (self.complex.norm() - 1.0).abs() < tolerance
    }

    fn is_approx(&self, other: &Self, tolerance: f64) -> bool {
        let difference = self.rotation_matrix() - other.rotation_matrix();
        difference.iter().all(|value| value.abs() <= tolerance)
    }

    fn to_vector(&self) -> DVector<f64> {
        DVector::from_vec(vec![self.complex.re, self.complex.im])
    }
}

/// SO(2) tangent space element (an angle).
#[derive(Debug, Clone, PartialEq)]
pub struct SO2Tangent {
    angle: f64,
}

impl SO2Tangent {
    pub fn new(angle: f64) -> Self {
        SO2Tangent { angle }
    }

    pub fn angle(&self) -> f64 {
        self.angle
    }
}

impl Tangent<SO2> for SO2Tangent {
    const DIM: usize = 1;

    fn exp(&self, jacobian: Option<&mut Matrix1<f64>>) -> SO2 {
        if let Some(jac) = jacobian {
            *jac = Matrix1::identity();
        }
        SO2::from_angle(self.angle)
    }

    fn right_jacobian(&self) -> Matrix1<f64> {
        Matrix1::identity()
    }

    fn left_jacobian(&self) -> Matrix1<f64> {
        Matrix1::identity()
    }

    fn right_jacobian_inv(&self) -> Matrix1<f64> {
        Matrix1::identity()
    }

    fn left_jacobian_inv(&self) -> Matrix1<f64> {
        Matrix1::identity()
    }

    fn hat(&self) -> Matrix2<f64> {
        Matrix2::new(0.0, -self.angle, self.angle, 0.0)
    }

    fn zero() -> SO2Tangent {
        SO2Tangent::new(0.0)
    }

    fn random<R: Rng + ?Sized>(rng: &mut R) -> SO2Tangent {
        SO2Tangent::new(rng.sample(StandardNormal))
    }

    fn is_zero(&self, tolerance: f64) -> bool {
        self.angle.abs() < tolerance
    }

    fn is_approx(&self, other: &Self, tolerance: f64) -> bool {
        (self.angle - other.angle).abs() < tolerance
    }

    fn to_dvector(&self) -> DVector<f64> {
        DVector::from_vec(vec![self.angle])
    }

    fn from_dvector(data: &DVector<f64>) -> ManifoldResult<SO2Tangent> {
        check_tangent_dimension(Self::DIM, data.len())?;
        Ok(SO2Tangent::new(data[0]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-12;

    #[test]
    fn test_so2_log_wraps_angle() {
        let rotation = SO2::from_angle(3.0 * PI / 2.0);
        assert!((rotation.log(None).angle() + PI / 2.0).abs() < TOLERANCE);
    }

    #[test]
    fn test_so2_between() {
        let a = SO2::from_angle(0.3);
        let b = SO2::from_angle(1.0);
        let relative = a.between(&b, None, None);
        assert!((relative.angle() - 0.7).abs() < TOLERANCE);
    }

    #[test]
    fn test_so2_right_minus_inverts_right_plus() {
        let base = SO2::from_angle(-2.9);
        let delta = SO2Tangent::new(0.4);
        let moved = base.right_plus(&delta, None, None);
        assert!(moved.right_minus(&base, None, None).is_approx(&delta, TOLERANCE));
    }
}
