//! SE(3) - Special Euclidean Group in 3D
//!
//! SE(3) elements are a rotation (`SO3`, unit quaternion) plus a translation.
//! Tangent elements are 6-vectors `[ρ, θ]` with the translational part first.
//!
//! The Jacobians of the exponential map couple translation and rotation through the
//! `Q(ρ, θ)` block (Barfoot, *State Estimation for Robotics*, eq. 7.86):
//!
//! ```text
//! Jl(ξ) = | Jl(θ)  Q(ρ, θ) |        Jr(ξ) = Jl(-ξ)
//!         |   0     Jl(θ)  |
//! ```

use crate::manifold::so3::{SO3, SO3Tangent, skew_symmetric};
use crate::manifold::{LieGroup, ManifoldResult, Tangent, check_tangent_dimension};
use nalgebra::{
    DVector, Isometry3, Matrix3, Matrix4, Matrix6, Translation3, UnitQuaternion, Vector3, Vector6,
};
use rand::Rng;
use rand_distr::StandardNormal;
use std::{
    fmt,
    fmt::{Display, Formatter},
};

/// Below this angle the `Q` block coefficients switch to their Taylor series.
const SMALL_ANGLE: f64 = 1e-2;

/// SE(3) group element representing rigid body transformations in 3D.
#[derive(Debug, Clone, PartialEq)]
pub struct SE3 {
    rotation: SO3,
    translation: Vector3<f64>,
}

impl Display for SE3 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let t = self.translation;
        let q = self.rotation.quaternion();
        write!(
            f,
            "SE3(translation: [{:.4}, {:.4}, {:.4}], rotation: [w: {:.4}, x: {:.4}, y: {:.4}, z: {:.4}])",
            t.x, t.y, t.z, q.w, q.i, q.j, q.k
        )
    }
}

impl SE3 {
    /// Space dimension - dimension of the ambient space that the group acts on
    pub const DIM: usize = 3;

    /// Degrees of freedom - dimension of the tangent space
    pub const DOF: usize = 6;

    /// Representation size - size of the underlying data representation
    pub const REP_SIZE: usize = 7;

    pub fn new(translation: Vector3<f64>, rotation: UnitQuaternion<f64>) -> Self {
        SE3 {
            rotation: SO3::new(rotation),
            translation,
        }
    }

    pub fn from_translation_so3(translation: Vector3<f64>, rotation: SO3) -> Self {
        SE3 {
            rotation,
            translation,
        }
    }

    /// Create SE(3) from a translation and roll, pitch, yaw angles.
    pub fn from_translation_euler(
        x: f64,
        y: f64,
        z: f64,
        roll: f64,
        pitch: f64,
        yaw: f64,
    ) -> Self {
        SE3 {
            rotation: SO3::from_euler_angles(roll, pitch, yaw),
            translation: Vector3::new(x, y, z),
        }
    }

    /// Create SE(3) from `[tx, ty, tz]` and quaternion coefficients, normalizing them.
    pub fn from_translation_quaternion(
        translation: Vector3<f64>,
        w: f64,
        x: f64,
        y: f64,
        z: f64,
    ) -> Self {
        SE3 {
            rotation: SO3::from_quaternion_coeffs(w, x, y, z),
            translation,
        }
    }

    pub fn from_isometry(isometry: Isometry3<f64>) -> Self {
        SE3 {
            rotation: SO3::new(isometry.rotation),
            translation: isometry.translation.vector,
        }
    }

    pub fn translation(&self) -> Vector3<f64> {
        self.translation
    }

    pub fn rotation_so3(&self) -> &SO3 {
        &self.rotation
    }

    pub fn rotation_quaternion(&self) -> UnitQuaternion<f64> {
        self.rotation.quaternion()
    }

    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.rotation.rotation_matrix()
    }

    pub fn isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(
            Translation3::from(self.translation),
            self.rotation.quaternion(),
        )
    }

    /// Homogeneous 4×4 matrix.
    pub fn matrix(&self) -> Matrix4<f64> {
        self.isometry().to_homogeneous()
    }

    pub fn x(&self) -> f64 {
        self.translation.x
    }

    pub fn y(&self) -> f64 {
        self.translation.y
    }

    pub fn z(&self) -> f64 {
        self.translation.z
    }

    /// Transform a point: `R p + t`.
    pub fn act(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.rotation.act(point) + self.translation
    }
}

impl From<SE3> for DVector<f64> {
    fn from(se3: SE3) -> Self {
        se3.to_vector()
    }
}

impl LieGroup for SE3 {
    type TangentVector = SE3Tangent;
    type JacobianMatrix = Matrix6<f64>;
    type LieAlgebra = Matrix4<f64>;

    fn identity() -> Self {
        SE3 {
            rotation: SO3::identity(),
            translation: Vector3::zeros(),
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

        SE3 {
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
            *jac_other = Matrix6::identity();
        }

        SE3 {
            rotation: self.rotation.compose(&other.rotation, None, None),
            translation: self.rotation.act(&other.translation) + self.translation,
        }
    }

    fn log(&self, jacobian: Option<&mut Self::JacobianMatrix>) -> Self::TangentVector {
        let theta = self.rotation.log(None);
        let rho = theta.left_jacobian_inv() * self.translation;
        let tangent = SE3Tangent::new(rho, theta.axis_angle());

        if let Some(jac) = jacobian {
            *jac = tangent.right_jacobian_inv();
        }

        tangent
    }

    /// # Notes
    /// Ad(M) = | R  [t]ₓR |
    ///         | 0    R   |
    fn adjoint(&self) -> Self::JacobianMatrix {
        let rotation = self.rotation.rotation_matrix();
        let mut adjoint = Matrix6::zeros();
        adjoint.fixed_view_mut::<3, 3>(0, 0).copy_from(&rotation);
        adjoint.fixed_view_mut::<3, 3>(3, 3).copy_from(&rotation);
        adjoint
            .fixed_view_mut::<3, 3>(0, 3)
            .copy_from(&(skew_symmetric(&self.translation) * rotation));
        adjoint
    }

    fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let translation = Vector3::new(
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
        );
        SE3::from_translation_so3(translation, SO3::random(rng))
    }

    fn jacobian_identity() -> Self::JacobianMatrix {
        Matrix6::identity()
    }

    fn zero_jacobian() -> Self::JacobianMatrix {
        Matrix6::zeros()
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
        let t = self.translation;
        let q = self.rotation.quaternion();
        DVector::from_vec(vec![t.x, t.y, t.z, q.w, q.i, q.j, q.k])
    }
}

/// SE(3) tangent space element `[ρ, θ]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SE3Tangent {
    data: Vector6<f64>,
}

impl Display for SE3Tangent {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let rho = self.rho();
        let theta = self.theta();
        write!(
            f,
            "se3(rho: [{:.4}, {:.4}, {:.4}], theta: [{:.4}, {:.4}, {:.4}])",
            rho.x, rho.y, rho.z, theta.x, theta.y, theta.z
        )
    }
}

impl SE3Tangent {
    pub fn new(rho: Vector3<f64>, theta: Vector3<f64>) -> Self {
        SE3Tangent {
            data: Vector6::new(rho.x, rho.y, rho.z, theta.x, theta.y, theta.z),
        }
    }

    pub fn from_components(
        rho_x: f64,
        rho_y: f64,
        rho_z: f64,
        theta_x: f64,
        theta_y: f64,
        theta_z: f64,
    ) -> Self {
        SE3Tangent {
            data: Vector6::new(rho_x, rho_y, rho_z, theta_x, theta_y, theta_z),
        }
    }

    pub fn rho(&self) -> Vector3<f64> {
        self.data.fixed_rows::<3>(0).into_owned()
    }

    pub fn theta(&self) -> Vector3<f64> {
        self.data.fixed_rows::<3>(3).into_owned()
    }

    pub fn coeffs(&self) -> Vector6<f64> {
        self.data
    }

    fn negated(&self) -> Self {
        SE3Tangent { data: -self.data }
    }

    /// Translation/rotation coupling block of the left Jacobian.
    fn q_block(&self) -> Matrix3<f64> {
        let rho_skew = skew_symmetric(&self.rho());
        let theta_skew = skew_symmetric(&self.theta());
        let theta_squared = self.theta().norm_squared();
        let theta = theta_squared.sqrt();

        let (c1, c2, c3) = if theta < SMALL_ANGLE {
            (
                1.0 / 6.0 - theta_squared / 120.0,
                1.0 / 24.0 - theta_squared / 720.0,
                1.0 / 120.0 - theta_squared / 2520.0,
            )
        } else {
            let (sin, cos) = theta.sin_cos();
            let theta_4 = theta_squared * theta_squared;
            (
                (theta - sin) / (theta_squared * theta),
                (theta_squared + 2.0 * cos - 2.0) / (2.0 * theta_4),
                (2.0 * theta - 3.0 * sin + theta * cos) / (2.0 * theta_4 * theta),
            )
        };

        let tr = theta_skew * rho_skew;
        let rt = rho_skew * theta_skew;
        let trt = tr * theta_skew;
        let ttr = theta_skew * tr;
        let rtt = rt * theta_skew;

        rho_skew * 0.5
            + (tr + rt + trt) * c1
            + (ttr + rtt - trt * 3.0) * c2
            + (trt * theta_skew + ttr * theta_skew) * c3
    }

    fn so3(&self) -> SO3Tangent {
        SO3Tangent::new(self.theta())
    }
}

/// Assemble `| A  B |` over `| 0  A |`.
fn block_upper_triangular(diagonal: &Matrix3<f64>, coupling: &Matrix3<f64>) -> Matrix6<f64> {
    let mut jacobian = Matrix6::zeros();
    jacobian.fixed_view_mut::<3, 3>(0, 0).copy_from(diagonal);
    jacobian.fixed_view_mut::<3, 3>(3, 3).copy_from(diagonal);
    jacobian.fixed_view_mut::<3, 3>(0, 3).copy_from(coupling);
    jacobian
}

impl Tangent<SE3> for SE3Tangent {
    const DIM: usize = 6;

    fn exp(&self, jacobian: Option<&mut Matrix6<f64>>) -> SE3 {
        let theta = self.so3();
        let rotation = theta.exp(None);
        let translation = theta.left_jacobian() * self.rho();

        if let Some(jac) = jacobian {
            *jac = self.right_jacobian();
        }

        SE3::from_translation_so3(translation, rotation)
    }

    fn right_jacobian(&self) -> Matrix6<f64> {
        self.negated().left_jacobian()
    }

    fn left_jacobian(&self) -> Matrix6<f64> {
        block_upper_triangular(&self.so3().left_jacobian(), &self.q_block())
    }

    fn right_jacobian_inv(&self) -> Matrix6<f64> {
        self.negated().left_jacobian_inv()
    }

    fn left_jacobian_inv(&self) -> Matrix6<f64> {
        let jl_inv = self.so3().left_jacobian_inv();
        let coupling = -(jl_inv * self.q_block() * jl_inv);
        block_upper_triangular(&jl_inv, &coupling)
    }

    fn hat(&self) -> Matrix4<f64> {
        let mut algebra = Matrix4::zeros();
        algebra
            .fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&skew_symmetric(&self.theta()));
        algebra.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.rho());
        algebra
    }

    fn zero() -> SE3Tangent {
        SE3Tangent {
            data: Vector6::zeros(),
        }
    }

    fn random<R: Rng + ?Sized>(rng: &mut R) -> SE3Tangent {
        SE3Tangent {
            data: Vector6::from_fn(|_, _| rng.sample(StandardNormal)),
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

    fn from_dvector(data: &DVector<f64>) -> ManifoldResult<SE3Tangent> {
        check_tangent_dimension(Self::DIM, data.len())?;
        Ok(SE3Tangent {
            data: Vector6::from_column_slice(data.as_slice()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::f64::consts::FRAC_PI_3;

    const TOLERANCE: f64 = 1e-9;

    fn sample_pose() -> SE3 {
        SE3::from_translation_euler(1.0, -2.0, 0.5, 0.2, -0.3, 1.1)
    }

    #[test]
    fn test_se3_identity_compose() {
        let pose = sample_pose();
        let composed = pose.compose(&SE3::identity(), None, None);
        assert!(composed.is_approx(&pose, TOLERANCE));
    }

    #[test]
    fn test_se3_inverse() {
        let pose = sample_pose();
        let product = pose.compose(&pose.inverse(None), None, None);
        assert!(product.is_approx(&SE3::identity(), TOLERANCE));
    }

    #[test]
    fn test_se3_exp_log_roundtrip() {
        for tangent in [
            SE3Tangent::from_components(0.1, -0.3, 0.7, 0.4, -0.1, 0.2),
            SE3Tangent::from_components(1.0, 2.0, -1.0, 1e-7, 0.0, -2e-7),
            SE3Tangent::from_components(0.0, 0.5, 0.0, 0.0, 0.0, 3.0),
        ] {
            let recovered = tangent.exp(None).log(None);
            assert!(recovered.is_approx(&tangent, TOLERANCE));
        }
    }

    #[test]
    fn test_se3_exp_pure_translation() {
        let tangent = SE3Tangent::from_components(1.0, 2.0, 3.0, 0.0, 0.0, 0.0);
        let pose = tangent.exp(None);
        assert!((pose.translation() - Vector3::new(1.0, 2.0, 3.0)).norm() < TOLERANCE);
        assert!(pose.rotation_so3().is_approx(&SO3::identity(), TOLERANCE));
    }

    #[test]
    fn test_se3_between_self_is_identity() {
        let pose = sample_pose();
        let relative = pose.between(&pose, None, None);
        assert!(relative.is_approx(&SE3::identity(), TOLERANCE));
    }

    #[test]
    fn test_se3_jacobian_inverses() {
        for tangent in [
            SE3Tangent::from_components(0.3, -0.2, 0.1, 0.5, 0.3, -0.4),
            SE3Tangent::from_components(0.3, -0.2, 0.1, 1e-4, 2e-4, -1e-4),
            SE3Tangent::from_components(-1.0, 0.5, 2.0, 0.0, FRAC_PI_3, 0.0),
        ] {
            let right = tangent.right_jacobian() * tangent.right_jacobian_inv();
            let left = tangent.left_jacobian() * tangent.left_jacobian_inv();
            assert!((right - Matrix6::identity()).norm() < TOLERANCE);
            assert!((left - Matrix6::identity()).norm() < TOLERANCE);
        }
    }

    #[test]
    fn test_se3_right_jacobian_matches_finite_difference() {
        let tangent = SE3Tangent::from_components(0.4, -0.6, 0.2, 0.3, 0.5, -0.2);
        let base = tangent.exp(None);
        let jr = tangent.right_jacobian();
        let eps = 1e-6;
        for i in 0..6 {
            let mut data = tangent.coeffs();
            data[i] += eps;
            let perturbed = SE3Tangent { data }.exp(None);
            let difference = perturbed.right_minus(&base, None, None).coeffs();
            let expected = jr.column(i) * eps;
            assert!((difference - expected).norm() < 1e-10);
        }
    }

    #[test]
    fn test_se3_adjoint_property() {
        let pose = sample_pose();
        let tangent = SE3Tangent::from_components(0.02, -0.01, 0.03, 0.01, 0.02, -0.02);
        let lhs = pose.compose(&tangent.exp(None), None, None);
        let moved = SE3Tangent {
            data: pose.adjoint() * tangent.coeffs(),
        };
        let rhs = moved.exp(None).compose(&pose, None, None);
        assert!(lhs.is_approx(&rhs, TOLERANCE));
    }

    #[test]
    fn test_se3_between_jacobians_match_finite_difference() {
        let mut rng = StdRng::seed_from_u64(11);
        let a = SE3::random(&mut rng);
        let b = SE3::random(&mut rng);
        let mut jac_a = SE3::zero_jacobian();
        let mut jac_b = SE3::zero_jacobian();
        let base = a.between(&b, Some(&mut jac_a), Some(&mut jac_b));
        let eps = 1e-6;
        for i in 0..6 {
            let mut data = Vector6::zeros();
            data[i] = eps;
            let delta = SE3Tangent { data };
            let moved_a = a.right_plus(&delta, None, None).between(&b, None, None);
            let moved_b = a.between(&b.right_plus(&delta, None, None), None, None);
            let da = moved_a.right_minus(&base, None, None).coeffs();
            let db = moved_b.right_minus(&base, None, None).coeffs();
            assert!((da - jac_a.column(i) * eps).norm() < 1e-10);
            assert!((db - jac_b.column(i) * eps).norm() < 1e-10);
        }
    }

    #[test]
    fn test_se3_vector_layout() {
        let pose = SE3::from_translation_quaternion(Vector3::new(1.0, 2.0, 3.0), 1.0, 0.0, 0.0, 0.0);
        let vector: DVector<f64> = pose.into();
        assert_eq!(vector.len(), SE3::REP_SIZE);
        assert_eq!(vector[0], 1.0);
        assert_eq!(vector[3], 1.0);
    }

    #[test]
    fn test_se3_from_dvector_checks_dimension() {
        let short = DVector::from_vec(vec![0.0; 5]);
        assert!(SE3Tangent::from_dvector(&short).is_err());
    }

    #[test]
    fn test_se3_act_matches_matrix() {
        let pose = sample_pose();
        let point = Vector3::new(0.3, -1.2, 2.0);
        let homogeneous = pose.matrix() * point.push(1.0);
        assert!((pose.act(&point) - homogeneous.xyz()).norm() < TOLERANCE);

        let back = pose.inverse(None).act(&pose.act(&point));
        assert!((back - point).norm() < TOLERANCE);
    }
}
