//! SE(2) - Special Euclidean Group in 2D
//!
//! SE(2) elements are a planar rotation (`SO2`, unit complex) plus a translation.
//! Tangent elements are `[x, y, θ]` with the translational part first.

use crate::manifold::so2::SO2;
use crate::manifold::{LieGroup, ManifoldResult, Tangent, check_tangent_dimension};
use nalgebra::{DVector, Isometry2, Matrix2, Matrix3, Translation2, UnitComplex, Vector2, Vector3};
use rand::Rng;
use rand_distr::StandardNormal;
use std::{
    fmt,
    fmt::{Display, Formatter},
};

/// Below this angle the Jacobian entries switch to their Taylor series.
const SMALL_ANGLE: f64 = 1e-6;

/// SE(2) group element representing rigid body transformations in 2D.
#[derive(Debug, Clone, PartialEq)]
pub struct SE2 {
    rotation: SO2,
    translation: Vector2<f64>,
}

impl Display for SE2 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SE2(x: {:.4}, y: {:.4}, theta: {:.4})",
            self.translation.x,
            self.translation.y,
            self.rotation.angle()
        )
    }
}

impl SE2 {
    /// Space dimension - dimension of the ambient space that the group acts on
    pub const DIM: usize = 2;

    /// Degrees of freedom - dimension of the tangent space
    pub const DOF: usize = 3;

    /// Representation size - size of the underlying data representation
    pub const REP_SIZE: usize = 4;

    pub fn new(translation: Vector2<f64>, rotation: UnitComplex<f64>) -> Self {
        SE2 {
            rotation: SO2::new(rotation),
            translation,
        }
    }

    pub fn from_xy_angle(x: f64, y: f64, theta: f64) -> Self {
        SE2 {
            rotation: SO2::from_angle(theta),
            translation: Vector2::new(x, y),
        }
    }

    pub fn from_translation_so2(translation: Vector2<f64>, rotation: SO2) -> Self {
        SE2 {
            rotation,
            translation,
        }
    }

    pub fn from_isometry(isometry: Isometry2<f64>) -> Self {
        SE2 {
            rotation: SO2::new(isometry.rotation),
            translation: isometry.translation.vector,
        }
    }

    pub fn x(&self) -> f64 {
        self.translation.x
    }

    pub fn y(&self) -> f64 {
        self.translation.y
    }

    /// Heading in `(-π, π]`.
    pub fn angle(&self) -> f64 {
        self.rotation.angle()
    }

    pub fn translation(&self) -> Vector2<f64> {
        self.translation
    }

    pub fn rotation_so2(&self) -> &SO2 {
        &self.rotation
    }

    pub fn rotation_matrix(&self) -> Matrix2<f64> {
        self.rotation.rotation_matrix()
    }

    pub fn isometry(&self) -> Isometry2<f64> {
        Isometry2::from_parts(
            Translation2::from(self.translation),
            self.rotation.complex(),
        )
    }

    /// Homogeneous 3×3 matrix.
    pub fn matrix(&self) -> Matrix3<f64> {
        self.isometry().to_homogeneous()
    }

    pub fn act(&self, point: &Vector2<f64>) -> Vector2<f64> {
        self.rotation.act(point) + self.translation
    }
}

impl From<SE2> for DVector<f64> {
    fn from(se2: SE2) -> Self {
        se2.to_vector()
    }
}

/// `(sin θ / θ, (1 - cos θ) / θ)`, the entries of the translational block of `V(θ)`.
fn v_coefficients(theta: f64) -> (f64, f64) {
    if theta.abs() < SMALL_ANGLE {
        let theta_sq = theta * theta;
        (1.0 - theta_sq / 6.0, theta / 2.0 - theta * theta_sq / 24.0)
    } else {
        let (sin, cos) = theta.sin_cos();
        (sin / theta, (1.0 - cos) / theta)
    }
}

/// Invert `| A  b |` over `| 0  1 |` where `A = [[a, β], [-β, a]]`.
fn invert_affine_jacobian(jacobian: &Matrix3<f64>) -> Matrix3<f64> {
    let a = jacobian[(0, 0)];
    let beta = jacobian[(0, 1)];
    let scale = 1.0 / (a * a + beta * beta);
    let block_inv = Matrix2::new(a, -beta, beta, a) * scale;
    let column = -(block_inv * Vector2::new(jacobian[(0, 2)], jacobian[(1, 2)]));

    let mut inverse = Matrix3::identity();
    inverse.fixed_view_mut::<2, 2>(0, 0).copy_from(&block_inv);
    inverse[(0, 2)] = column.x;
    inverse[(1, 2)] = column.y;
    inverse
}

impl LieGroup for SE2 {
    type TangentVector = SE2Tangent;
    type JacobianMatrix = Matrix3<f64>;
    type LieAlgebra = Matrix3<f64>;

    fn identity() -> Self {
        SE2 {
            rotation: SO2::identity(),
            translation: Vector2::zeros(),
        }
    }

    /// # Notes
    /// J_M⁻¹_M = -Ad(M)
    fn inverse(&self, jacobian: Option<&mut Self::JacobianMatrix>) -> Self {
        let rotation_inv = self.rotation.inverse(None);
        let translation_inv = -rotation_inv.act(&self.translation);

        if let Some(jac) = jacobian {
            *jac = -self.adjoint();
        }

        SE2 {
            rotation: rotation_inv,
            translation: translation_inv,
        }
    }

    /// # Notes
    /// J_MN_M = Ad(N⁻¹), J_MN_N = I
    fn compose(
        &self,
        other: &Self,
        jacobian_self: Option<&mut Self::JacobianMatrix>,
        jacobian_other: Option<&mut Self::JacobianMatrix>,
    ) -> Self {
        if let Some(jac_self) = jacobian_self {
            *jac_self = other.inverse(None).adjoint();
        }
        if let Some(jac_other) = jacobian_other {
            *jac_other = Matrix3::identity();
        }

        SE2 {
            rotation: self.rotation.compose(&other.rotation, None, None),
            translation: self.rotation.act(&other.translation) + self.translation,
        }
    }

    fn log(&self, jacobian: Option<&mut Self::JacobianMatrix>) -> Self::TangentVector {
        let theta = self.rotation.angle();
        let (a, b) = v_coefficients(theta);
        let scale = 1.0 / (a * a + b * b);
        let v_inv = Matrix2::new(a, b, -b, a) * scale;
        let rho = v_inv * self.translation;
        let tangent = SE2Tangent::new(rho.x, rho.y, theta);

        if let Some(jac) = jacobian {
            *jac = tangent.right_jacobian_inv();
        }

        tangent
    }

    /// # Notes
    /// Ad(M) = | R  (y, -x)ᵀ |
    ///         | 0     1     |
    fn adjoint(&self) -> Self::JacobianMatrix {
        let mut adjoint = Matrix3::identity();
        adjoint
            .fixed_view_mut::<2, 2>(0, 0)
            .copy_from(&self.rotation.rotation_matrix());
        adjoint[(0, 2)] = self.translation.y;
        adjoint[(1, 2)] = -self.translation.x;
        adjoint
    }

    fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let translation = Vector2::new(rng.random_range(-1.0..1.0), rng.random_range(-1.0..1.0));
        SE2::from_translation_so2(translation, SO2::random(rng))
    }

    fn jacobian_identity() -> Self::JacobianMatrix {
        Matrix3::identity()
    }

    fn zero_jacobian() -> Self::JacobianMatrix {
        Matrix3::zeros()
    }

    fn normalize(&mut self) {
        self.rotation.normalize();
    }

    fn is_valid(&self, tolerance: f64) -> bool {
        self.rotation.is_valid(tolerance) && self.translation.iter().all(|v| v.is_finite())
    }

    fn is_approx(&self, other: &Self, tolerance: f64) -> bool {
        self.rotation.is_approx(&other.rotation, tolerance)
            && (self.translation - other.translation)
                .iter()
                .all(|value| value.abs() <= tolerance)
    }

    fn to_vector(&self) -> DVector<f64> {
        let complex = self.rotation.complex();
        DVector::from_vec(vec![
            self.translation.x,
            self.translation.y,
            complex.re,
            complex.im,
        ])
    }
}

/// SE(2) tangent space element `[x, y, θ]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SE2Tangent {
    data: Vector3<f64>,
}

impl Display for SE2Tangent {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "se2(x: {:.4}, y: {:.4}, theta: {:.4})",
            self.data.x, self.data.y, self.data.z
        )
    }
}

impl SE2Tangent {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        SE2Tangent {
            data: Vector3::new(x, y, theta),
        }
    }

    pub fn x(&self) -> f64 {
        self.data.x
    }

    pub fn y(&self) -> f64 {
        self.data.y
    }

    pub fn angle(&self) -> f64 {
        self.data.z
    }

    pub fn coeffs(&self) -> Vector3<f64> {
        self.data
    }
}

impl Tangent<SE2> for SE2Tangent {
    const DIM: usize = 3;

    fn exp(&self, jacobian: Option<&mut Matrix3<f64>>) -> SE2 {
        let theta = self.angle();
        let (a, b) = v_coefficients(theta);
        let v = Matrix2::new(a, -b, b, a);
        let translation = v * Vector2::new(self.x(), self.y());

        if let Some(jac) = jacobian {
            *jac = self.right_jacobian();
        }

        SE2::from_translation_so2(translation, SO2::from_angle(theta))
    }

    fn right_jacobian(&self) -> Matrix3<f64> {
        let (x, y, theta) = (self.x(), self.y(), self.angle());
        let (a, b) = v_coefficients(theta);
        let (coupling_x, coupling_y) = if theta.abs() < SMALL_ANGLE {
            (-y / 2.0 + theta * x / 6.0, x / 2.0 + theta * y / 6.0)
        } else {
            let (sin, cos) = theta.sin_cos();
            let theta_sq = theta * theta;
            (
                (theta * x - y + y * cos - x * sin) / theta_sq,
                (x + theta * y - x * cos - y * sin) / theta_sq,
            )
        };
        Matrix3::new(a, b, coupling_x, -b, a, coupling_y, 0.0, 0.0, 1.0)
    }

    fn left_jacobian(&self) -> Matrix3<f64> {
        let (x, y, theta) = (self.x(), self.y(), self.angle());
        let (a, b) = v_coefficients(theta);
        let (coupling_x, coupling_y) = if theta.abs() < SMALL_ANGLE {
            (y / 2.0 + theta * x / 6.0, -x / 2.0 + theta * y / 6.0)
        } else {
            let (sin, cos) = theta.sin_cos();
            let theta_sq = theta * theta;
            (
                (theta * x + y - x * sin - y * cos) / theta_sq,
                (-x + theta * y + x * cos - y * sin) / theta_sq,
            )
        };
        Matrix3::new(a, -b, coupling_x, b, a, coupling_y, 0.0, 0.0, 1.0)
    }

    fn right_jacobian_inv(&self) -> Matrix3<f64> {
        invert_affine_jacobian(&self.right_jacobian())
    }

    fn left_jacobian_inv(&self) -> Matrix3<f64> {
        invert_affine_jacobian(&self.left_jacobian())
    }

    fn hat(&self) -> Matrix3<f64> {
        Matrix3::new(
            0.0,
            -self.angle(),
            self.x(),
            self.angle(),
            0.0,
            self.y(),
            0.0,
            0.0,
            0.0,
        )
    }

    fn zero() -> SE2Tangent {
        SE2Tangent {
            data: Vector3::zeros(),
        }
    }

    fn random<R: Rng + ?Sized>(rng: &mut R) -> SE2Tangent {
        SE2Tangent {
            data: Vector3::from_fn(|_, _| rng.sample(StandardNormal)),
        }
    }

    fn is_zero(&self, tolerance: f64) -> bool {
        self.data.norm() < tolerance
    }

    fn is_approx(&self, other: &Self, tolerance: f64) -> bool {
        (self.data - other.data).norm() < tolerance
    }

    fn to_dvector(&self) -> DVector<f64> {
        DVector::from_column_slice(self.data.as_slice())
    }

    fn from_dvector(data: &DVector<f64>) -> ManifoldResult<SE2Tangent> {
        check_tangent_dimension(Self::DIM, data.len())?;
        Ok(SE2Tangent::new(data[0], data[1], data[2]))
    }
}
