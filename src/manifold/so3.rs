//! SO(3) - Special Orthogonal Group in 3D
//!
//! SO(3) elements are stored as nalgebra `UnitQuaternion`s, which stay free of the
//! gimbal singularities of Euler angles. Tangent elements are axis-angle vectors in R³,
//! where the direction gives the axis of rotation and the magnitude gives the angle.

use crate::manifold::{LieGroup, ManifoldResult, Tangent, check_tangent_dimension};
use nalgebra::{DVector, Matrix3, Quaternion, Rotation3, UnitQuaternion, Vector3, Vector4};
use rand::Rng;
use rand_distr::StandardNormal;
use std::{
    fmt,
    fmt::{Display, Formatter},
};

/// Below this angle the Rodrigues coefficients switch to their Taylor series.
const SMALL_ANGLE: f64 = 1e-3;

/// SO(3) group element representing rotations in 3D.
#[derive(Debug, Clone, PartialEq)]
pub struct SO3 {
    quaternion: UnitQuaternion<f64>,
}

impl Display for SO3 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let q = self.quaternion.quaternion();
        write!(
            f,
            "SO3(quaternion: [w: {:.4}, x: {:.4}, y: {:.4}, z: {:.4}])",
            q.w, q.i, q.j, q.k
        )
    }
}

impl SO3 {
    /// Space dimension - dimension of the ambient space that the group acts on
    pub const DIM: usize = 3;

    /// Degrees of freedom - dimension of the tangent space
    pub const DOF: usize = 3;

    /// Representation size - size of the underlying data representation
    pub const REP_SIZE: usize = 4;

    /// Create a new SO(3) element from a unit quaternion.
    pub fn new(quaternion: UnitQuaternion<f64>) -> Self {
        SO3 { quaternion }
    }

    /// Create SO(3) from quaternion coefficients, normalizing them.
    pub fn from_quaternion_coeffs(w: f64, x: f64, y: f64, z: f64) -> Self {
        SO3 {
            quaternion: UnitQuaternion::from_quaternion(Quaternion::new(w, x, y, z)),
        }
    }

    /// Create SO(3) from roll, pitch and yaw (extrinsic X, Y, Z).
    pub fn from_euler_angles(roll: f64, pitch: f64, yaw: f64) -> Self {
        SO3 {
            quaternion: UnitQuaternion::from_euler_angles(roll, pitch, yaw),
        }
    }

    /// Create SO(3) from an axis-angle vector.
    pub fn from_scaled_axis(axis_angle: Vector3<f64>) -> Self {
        SO3 {
            quaternion: UnitQuaternion::from_scaled_axis(axis_angle),
        }
    }

    /// Create SO(3) from a rotation matrix assumed to be orthonormal.
    pub fn from_matrix(matrix: Matrix3<f64>) -> Self {
        let rotation = Rotation3::from_matrix_unchecked(matrix);
        SO3 {
            quaternion: UnitQuaternion::from_rotation_matrix(&rotation),
        }
    }

    /// Rotation of `angle` radians about the z axis.
    pub fn yaw(angle: f64) -> Self {
        SO3 {
            quaternion: UnitQuaternion::from_axis_angle(&Vector3::z_axis(), angle),
        }
    }

    pub fn quaternion(&self) -> UnitQuaternion<f64> {
        self.quaternion
    }

    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.quaternion.to_rotation_matrix().into_inner()
    }

    /// Rotate a point: `R p`.
    pub fn act(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.quaternion * point
    }
}

impl LieGroup for SO3 {
    type TangentVector = SO3Tangent;
    type JacobianMatrix = Matrix3<f64>;
    type LieAlgebra = Matrix3<f64>;

    fn identity() -> Self {
        SO3 {
            quaternion: UnitQuaternion::identity(),
        }
    }

    /// # Notes
    /// J_R⁻¹_R = -R
    fn inverse(&self, jacobian: Option<&mut Self::JacobianMatrix>) -> Self {
        if let Some(jac) = jacobian {
            *jac = -self.rotation_matrix();
        }
        SO3 {
            quaternion: self.quaternion.inverse(),
        }
    }

    /// # Notes
    /// J_RQ_R = Qᵀ, J_RQ_Q = I
    fn compose(
        &self,
        other: &Self,
        jacobian_self: Option<&mut Self::JacobianMatrix>,
        jacobian_other: Option<&mut Self::JacobianMatrix>,
    ) -> Self {
        if let Some(jac_self) = jacobian_self {
            *jac_self = other.rotation_matrix().transpose();
        }
        if let Some(jac_other) = jacobian_other {
            *jac_other = Matrix3::identity();
        }
        SO3 {
            quaternion: self.quaternion * other.quaternion,
        }
    }

    fn log(&self, jacobian: Option<&mut Self::JacobianMatrix>) -> Self::TangentVector {
        let q = self.quaternion.quaternion();
        // q and -q encode the same rotation; pick the one with w >= 0 for the short path
        let (w, v) = if q.w < 0.0 {
            (-q.w, -q.imag())
        } else {
            (q.w, q.imag())
        };

        let sin_half_squared = v.norm_squared();
        let log_coeff = if sin_half_squared > f64::EPSILON {
            let sin_half = sin_half_squared.sqrt();
            2.0 * f64::atan2(sin_half, w) / sin_half
        } else {
            2.0 / w
        };

        let tangent = SO3Tangent::new(v * log_coeff);

        if let Some(jac) = jacobian {
            *jac = tangent.right_jacobian_inv();
        }

        tangent
    }

    fn adjoint(&self) -> Self::JacobianMatrix {
        self.rotation_matrix()
    }

    fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        // Normalized Gaussian 4-vectors are uniform on S³
        let coeffs = Vector4::from_fn(|_, _| rng.sample::<f64, _>(StandardNormal));
        let norm = coeffs.norm();
        if norm < f64::EPSILON {
            return SO3::identity();
        }
        SO3::from_quaternion_coeffs(coeffs[0], coeffs[1], coeffs[2], coeffs[3])
    }

    fn jacobian_identity() -> Self::JacobianMatrix {
        Matrix3::identity()
    }

    fn zero_jacobian() -> Self::JacobianMatrix {
        Matrix3::zeros()
    }

    fn normalize(&mut self) {
        self.quaternion = UnitQuaternion::new_normalize(*self.quaternion.quaternion());
    }

    fn is_valid(&self, tolerance: f64) -> bool {
        (self.quaternion.quaternion().norm() - 1.0).abs() < tolerance
    }

    fn is_approx(&self, other: &Self, tolerance: f64) -> bool {
        let difference = self.rotation_matrix() - other.rotation_matrix();
        difference.iter().all(|value| value.abs() <= tolerance)
    }

    fn to_vector(&self) -> DVector<f64> {
        let q = self.quaternion.quaternion();
        DVector::from_vec(vec![q.w, q.i, q.j, q.k])
    }
}

/// SO(3) tangent space element (axis-angle vector).
#[derive(Debug, Clone, PartialEq)]
pub struct SO3Tangent {
    data: Vector3<f64>,
}

impl Display for SO3Tangent {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "so3(axis_angle: [{:.4}, {:.4}, {:.4}])",
            self.data.x, self.data.y, self.data.z
        )
    }
}

impl SO3Tangent {
    pub fn new(axis_angle: Vector3<f64>) -> Self {
        SO3Tangent { data: axis_angle }
    }

    pub fn axis_angle(&self) -> Vector3<f64> {
        self.data
    }

    /// Rotation angle (norm of the axis-angle vector).
    pub fn angle(&self) -> f64 {
        self.data.norm()
    }

    /// Coefficients `(a, b)` of `Jl = I + a[θ]ₓ + b[θ]ₓ²`.
    fn jacobian_coefficients(&self) -> (f64, f64) {
        let theta_squared = self.data.norm_squared();
        let theta = theta_squared.sqrt();
        if theta < SMALL_ANGLE {
            (
                0.5 - theta_squared / 24.0,
                1.0 / 6.0 - theta_squared / 120.0,
            )
        } else {
            (
                (1.0 - theta.cos()) / theta_squared,
                (theta - theta.sin()) / (theta_squared * theta),
            )
        }
    }

    /// Coefficient `c` of `Jl⁻¹ = I - ½[θ]ₓ + c[θ]ₓ²`.
    fn inverse_jacobian_coefficient(&self) -> f64 {
        let theta_squared = self.data.norm_squared();
        let theta = theta_squared.sqrt();
        if theta < SMALL_ANGLE {
            1.0 / 12.0 + theta_squared / 720.0
        } else {
            let half = 0.5 * theta;
            1.0 / theta_squared - half.cos() / (2.0 * theta * half.sin())
        }
    }
}

impl Tangent<SO3> for SO3Tangent {
    const DIM: usize = 3;

    fn exp(&self, jacobian: Option<&mut Matrix3<f64>>) -> SO3 {
        let quaternion = if self.data.norm_squared() > f64::EPSILON {
            UnitQuaternion::from_scaled_axis(self.data)
        } else {
            UnitQuaternion::from_quaternion(Quaternion::new(
                1.0,
                self.data.x / 2.0,
                self.data.y / 2.0,
                self.data.z / 2.0,
            ))
        };

        if let Some(jac) = jacobian {
            *jac = self.right_jacobian();
        }

        SO3 { quaternion }
    }

    fn right_jacobian(&self) -> Matrix3<f64> {
        let (a, b) = self.jacobian_coefficients();
        let skew = self.hat();
        Matrix3::identity() - skew * a + skew * skew * b
    }

    fn left_jacobian(&self) -> Matrix3<f64> {
        let (a, b) = self.jacobian_coefficients();
        let skew = self.hat();
        Matrix3::identity() + skew * a + skew * skew * b
    }

    fn right_jacobian_inv(&self) -> Matrix3<f64> {
        let c = self.inverse_jacobian_coefficient();
        let skew = self.hat();
        Matrix3::identity() + skew * 0.5 + skew * skew * c
    }

    fn left_jacobian_inv(&self) -> Matrix3<f64> {
        let c = self.inverse_jacobian_coefficient();
        let skew = self.hat();
        Matrix3::identity() - skew * 0.5 + skew * skew * c
    }

    fn hat(&self) -> Matrix3<f64> {
        skew_symmetric(&self.data)
    }

    fn zero() -> SO3Tangent {
        SO3Tangent::new(Vector3::zeros())
    }

    fn random<R: Rng + ?Sized>(rng: &mut R) -> SO3Tangent {
        SO3Tangent::new(Vector3::from_fn(|_, _| rng.sample(StandardNormal)))
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

    fn from_dvector(data: &DVector<f64>) -> ManifoldResult<SO3Tangent> {
        check_tangent_dimension(Self::DIM, data.len())?;
        Ok(SO3Tangent::new(Vector3::new(data[0], data[1], data[2])))
    }
}

/// Skew-symmetric matrix `[v]ₓ` such that `[v]ₓ w = v × w`.
pub fn skew_symmetric(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::f64::consts::PI;

    const TOLERANCE: f64 = 1e-9;

    #[test]
    fn test_so3_identity_log_is_zero() {
        let identity = SO3::identity();
        assert!(identity.log(None).is_zero(TOLERANCE));
    }

    #[test]
    fn test_so3_exp_log_roundtrip() {
        let tangent = SO3Tangent::new(Vector3::new(0.3, -0.2, 0.9));
        let recovered = tangent.exp(None).log(None);
        assert!(recovered.is_approx(&tangent, TOLERANCE));
    }

    #[test]
    fn test_so3_log_takes_short_path() {
        // Same rotation with a negated quaternion
        let rotation = SO3::from_scaled_axis(Vector3::new(0.0, 0.0, 0.5));
        let q = rotation.quaternion().into_inner();
        let flipped = SO3::from_quaternion_coeffs(-q.w, -q.i, -q.j, -q.k);
        let tangent = flipped.log(None);
        assert!((tangent.axis_angle() - Vector3::new(0.0, 0.0, 0.5)).norm() < TOLERANCE);
    }

    #[test]
    fn test_so3_log_near_pi() {
        let tangent = SO3Tangent::new(Vector3::new(0.0, PI - 1e-6, 0.0));
        let recovered = tangent.exp(None).log(None);
        assert!(recovered.is_approx(&tangent, 1e-6));
        let inv = recovered.right_jacobian_inv();
        assert!(inv.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_so3_jacobian_inverses() {
        for axis_angle in [
            Vector3::new(1e-6, -2e-6, 5e-7),
            Vector3::new(0.4, 0.1, -0.7),
            Vector3::new(2.0, -1.0, 0.5),
        ] {
            let tangent = SO3Tangent::new(axis_angle);
            let right = tangent.right_jacobian() * tangent.right_jacobian_inv();
            let left = tangent.left_jacobian() * tangent.left_jacobian_inv();
            assert!((right - Matrix3::identity()).norm() < TOLERANCE);
            assert!((left - Matrix3::identity()).norm() < TOLERANCE);
        }
    }

    #[test]
    fn test_so3_right_jacobian_matches_finite_difference() {
        let tangent = SO3Tangent::new(Vector3::new(0.3, -0.5, 0.2));
        let base = tangent.exp(None);
        let jr = tangent.right_jacobian();
        let eps = 1e-6;
        for i in 0..3 {
            let mut delta = Vector3::zeros();
            delta[i] = eps;
            let perturbed = SO3Tangent::new(tangent.axis_angle() + delta).exp(None);
            let column = base.inverse(None).compose(&perturbed, None, None).log(None);
            let expected = jr.column(i) * eps;
            assert!((column.axis_angle() - expected).norm() < 1e-10);
        }
    }

    #[test]
    fn test_so3_compose_inverse_is_identity() {
        let mut rng = StdRng::seed_from_u64(7);
        let rotation = SO3::random(&mut rng);
        let product = rotation.compose(&rotation.inverse(None), None, None);
        assert!(product.is_approx(&SO3::identity(), TOLERANCE));
    }

    #[test]
    fn test_so3_adjoint_property() {
        let rotation = SO3::from_euler_angles(0.1, -0.4, 1.2);
        let tangent = SO3Tangent::new(Vector3::new(0.05, 0.02, -0.03));
        let lhs = rotation.compose(&tangent.exp(None), None, None);
        let rotated = SO3Tangent::new(rotation.adjoint() * tangent.axis_angle());
        let rhs = rotated.exp(None).compose(&rotation, None, None);
        assert!(lhs.is_approx(&rhs, TOLERANCE));
    }

    #[test]
    fn test_so3_from_matrix_matches_rotation() {
        let rotation = SO3::from_euler_angles(0.3, 0.2, -0.1);
        let rebuilt = SO3::from_matrix(rotation.rotation_matrix());
        assert!(rebuilt.is_approx(&rotation, TOLERANCE));
    }
}
