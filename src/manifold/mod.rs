//! Lie group representations for rigid-body poses.
//!
//! This module provides the groups a pose graph is built from:
//! - **SE(3)**: rigid body transformations in 3D
//! - **SO(3)**: rotations in 3D
//! - **SE(2)**: rigid body transformations in 2D
//! - **SO(2)**: rotations in 2D
//!
//! Lie group M,° | size   | dim | X ∈ M                   | Constraint      | T_E M             | T_X M                 | Exp(T)             | Comp. | Action
//! ------------- | ------ | --- | ----------------------- | --------------- | ----------------- | --------------------- | ------------------ | ----- | ------
//! Rotation      | SO(2),.| 4   | 1   | R                 | RᵀR = I         | [θ]x ∈ so(2)      | [θ] ∈ R²              | R = exp([θ]x)      | R₁R₂  | Rx
//! Rigid motion  | SE(2),.| 9   | 3   | M = [R t; 0 1]    | RᵀR = I         | [v̂] ∈ se(2)       | [v̂] ∈ R³              | Exp([v̂])           | M₁M₂  | Rx+t
//! Rotation      | SO(3),.| 9   | 3   | R                 | RᵀR = I         | [θ]x ∈ so(3)      | [θ] ∈ R³              | R = exp([θ]x)      | R₁R₂  | Rx
//! Rigid motion  | SE(3),.| 16  | 6   | M = [R t; 0 1]    | RᵀR = I         | [v̂] ∈ se(3)       | [v̂] ∈ R⁶              | Exp([v̂])           | M₁M₂  | Rx+t
//!
//! Conventions follow the [manif](https://github.com/artivis/manif) C++ library:
//! - perturbations are applied on the right, `g ⊞ φ = g ∘ exp(φ^∧)`
//! - `g₁ ⊟ g₂ = log(g₂⁻¹ ∘ g₁)^∨`
//! - translational tangent components come first (`[ρ, θ]`)
//!
//! Every Jacobian is analytic and expressed in the local (right) tangent space.

use nalgebra::DVector;
use rand::Rng;
use std::ops::{Mul, Neg};
use std::{
    error, fmt,
    fmt::{Display, Formatter},
};

pub mod se2;
pub mod se3;
pub mod so2;
pub mod so3;

/// Errors that can occur during manifold operations.
#[derive(Debug, Clone, PartialEq)]
pub enum ManifoldError {
    /// Invalid tangent vector dimension
    InvalidTangentDimension { expected: usize, actual: usize },
    /// Two operands live on different manifolds
    TypeMismatch { left: ManifoldType, right: ManifoldType },
    /// NaN or Inf detected in manifold element
    InvalidNumber,
}

/// Kind of pose manifold carried by a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManifoldType {
    SE2,
    SE3,
}

impl Display for ManifoldType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ManifoldType::SE2 => write!(f, "SE2"),
            ManifoldType::SE3 => write!(f, "SE3"),
        }
    }
}

impl Display for ManifoldError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ManifoldError::InvalidTangentDimension { expected, actual } => {
                write!(
                    f,
                    "Invalid tangent dimension: expected {expected}, got {actual}"
                )
            }
            ManifoldError::TypeMismatch { left, right } => {
                write!(f, "Manifold type mismatch: {left} vs {right}")
            }
            ManifoldError::InvalidNumber => {
                write!(f, "Invalid number: NaN or Inf detected")
            }
        }
    }
}

impl error::Error for ManifoldError {}

/// Result type for manifold operations.
pub type ManifoldResult<T> = Result<T, ManifoldError>;

/// Core trait for Lie group operations.
///
/// Associated types define the mathematical structure:
/// - `TangentVector`: the tangent space vector type (e.g. `SE3Tangent`)
/// - `JacobianMatrix`: square matrix of tangent dimension (e.g. `Matrix6<f64>`)
/// - `LieAlgebra`: matrix form of a tangent vector (e.g. `Matrix4<f64>`)
///
/// Every operation that can be differentiated takes optional output slots for its
/// Jacobians, so callers only pay for what they ask for.
pub trait LieGroup: Clone + PartialEq {
    /// The tangent space vector type
    type TangentVector: Tangent<Self>;

    /// The Jacobian matrix type
    type JacobianMatrix: Clone
        + PartialEq
        + Neg<Output = Self::JacobianMatrix>
        + Mul<Output = Self::JacobianMatrix>
        + std::ops::Index<(usize, usize), Output = f64>;

    /// Associated Lie algebra type
    type LieAlgebra: Clone + PartialEq;

    /// The neutral element.
    fn identity() -> Self;

    /// Compute the inverse of this manifold element.
    ///
    /// # Arguments
    /// * `jacobian` - Optional mutable reference to store the Jacobian ∂(g⁻¹)/∂g
    fn inverse(&self, jacobian: Option<&mut Self::JacobianMatrix>) -> Self;

    /// Compose this element with another (group multiplication).
    ///
    /// # Arguments
    /// * `other` - The right operand for composition
    /// * `jacobian_self` - Optional Jacobian ∂(g₁ ∘ g₂)/∂g₁
    /// * `jacobian_other` - Optional Jacobian ∂(g₁ ∘ g₂)/∂g₂
    fn compose(
        &self,
        other: &Self,
        jacobian_self: Option<&mut Self::JacobianMatrix>,
        jacobian_other: Option<&mut Self::JacobianMatrix>,
    ) -> Self;

    /// Logarithmic map from manifold to tangent space.
    ///
    /// # Arguments
    /// * `jacobian` - Optional Jacobian ∂log(g)^∨/∂g, which is `Jr⁻¹(log(g))`
    fn log(&self, jacobian: Option<&mut Self::JacobianMatrix>) -> Self::TangentVector;

    /// Adjoint matrix Ad(g).
    ///
    /// Satisfies `g ∘ exp(φ) = exp(Ad(g) φ) ∘ g`.
    fn adjoint(&self) -> Self::JacobianMatrix;

    /// Sample an element from a caller-supplied generator.
    fn random<R: Rng + ?Sized>(rng: &mut R) -> Self;

    /// Get the identity matrix for Jacobians.
    fn jacobian_identity() -> Self::JacobianMatrix;

    /// Get a zero Jacobian matrix.
    fn zero_jacobian() -> Self::JacobianMatrix;

    /// Project the element back onto the manifold (re-normalize the rotation).
    fn normalize(&mut self);

    /// Check if the element is approximately on the manifold.
    fn is_valid(&self, tolerance: f64) -> bool;

    /// Check if the element is approximately equal to another element.
    ///
    /// Rotation and translation are compared component-wise.
    fn is_approx(&self, other: &Self, tolerance: f64) -> bool;

    /// Flat representation, e.g. `[tx, ty, tz, qw, qx, qy, qz]` for SE(3).
    fn to_vector(&self) -> DVector<f64>;

    /// Right plus operation: g ⊞ φ = g ∘ exp(φ^∧).
    ///
    /// # Arguments
    /// * `tangent` - Tangent vector perturbation
    /// * `jacobian_self` - Optional Jacobian ∂(g ⊞ φ)/∂g = Ad(exp(φ))⁻¹
    /// * `jacobian_tangent` - Optional Jacobian ∂(g ⊞ φ)/∂φ = Jr(φ)
    fn right_plus(
        &self,
        tangent: &Self::TangentVector,
        jacobian_self: Option<&mut Self::JacobianMatrix>,
        jacobian_tangent: Option<&mut Self::JacobianMatrix>,
    ) -> Self {
        let exp_tangent = tangent.exp(None);

        if let Some(jac_tangent) = jacobian_tangent {
            *jac_tangent = tangent.right_jacobian();
        }

        self.compose(&exp_tangent, jacobian_self, None)
    }

    /// Right minus operation: g₁ ⊟ g₂ = log(g₂⁻¹ ∘ g₁)^∨.
    ///
    /// # Arguments
    /// * `other` - The reference element g₂
    /// * `jacobian_self` - Optional Jacobian ∂(g₁ ⊟ g₂)/∂g₁ = Jr⁻¹(τ)
    /// * `jacobian_other` - Optional Jacobian ∂(g₁ ⊟ g₂)/∂g₂ = -Jl⁻¹(τ)
    fn right_minus(
        &self,
        other: &Self,
        jacobian_self: Option<&mut Self::JacobianMatrix>,
        jacobian_other: Option<&mut Self::JacobianMatrix>,
    ) -> Self::TangentVector {
        let result = other.inverse(None).compose(self, None, None).log(None);

        if let Some(jac_self) = jacobian_self {
            *jac_self = result.right_jacobian_inv();
        }

        if let Some(jac_other) = jacobian_other {
            *jac_other = -result.left_jacobian_inv();
        }

        result
    }

    /// Compute g₁⁻¹ ∘ g₂ (relative transformation).
    ///
    /// # Arguments
    /// * `other` - The target element g₂
    /// * `jacobian_self` - Optional Jacobian ∂(g₁⁻¹ ∘ g₂)/∂g₁ = -Ad(g₂⁻¹ ∘ g₁)
    /// * `jacobian_other` - Optional Jacobian ∂(g₁⁻¹ ∘ g₂)/∂g₂ = I
    fn between(
        &self,
        other: &Self,
        jacobian_self: Option<&mut Self::JacobianMatrix>,
        jacobian_other: Option<&mut Self::JacobianMatrix>,
    ) -> Self {
        let result = self.inverse(None).compose(other, None, None);

        if let Some(jac_self) = jacobian_self {
            *jac_self = -result.inverse(None).adjoint();
        }

        if let Some(jac_other) = jacobian_other {
            *jac_other = Self::jacobian_identity();
        }

        result
    }

    /// Dimension of the tangent space.
    fn tangent_dim(&self) -> usize {
        Self::TangentVector::DIM
    }
}

/// Trait for Lie algebra operations.
///
/// # Type Parameters
///
/// - `Group`: The associated Lie group type
pub trait Tangent<Group: LieGroup>: Clone + PartialEq {
    /// Dimension of the tangent space
    const DIM: usize;

    /// Exponential map to Lie group: exp(φ^∧).
    ///
    /// # Arguments
    /// * `jacobian` - Optional Jacobian ∂exp(φ^∧)/∂φ = Jr(φ)
    fn exp(&self, jacobian: Option<&mut Group::JacobianMatrix>) -> Group;

    /// Right Jacobian Jr.
    ///
    /// exp((φ + δφ)^∧) ≈ exp(φ^∧) ∘ exp((Jr δφ)^∧)
    fn right_jacobian(&self) -> Group::JacobianMatrix;

    /// Left Jacobian Jl.
    ///
    /// exp((φ + δφ)^∧) ≈ exp((Jl δφ)^∧) ∘ exp(φ^∧)
    fn left_jacobian(&self) -> Group::JacobianMatrix;

    /// Inverse of right Jacobian Jr⁻¹.
    fn right_jacobian_inv(&self) -> Group::JacobianMatrix;

    /// Inverse of left Jacobian Jl⁻¹.
    fn left_jacobian_inv(&self) -> Group::JacobianMatrix;

    /// Hat operator: φ^∧ (vector to matrix).
    fn hat(&self) -> Group::LieAlgebra;

    /// Zero tangent vector.
    fn zero() -> Group::TangentVector;

    /// Tangent vector with independent standard-normal components.
    fn random<R: Rng + ?Sized>(rng: &mut R) -> Group::TangentVector;

    /// Check if the tangent vector is approximately zero.
    fn is_zero(&self, tolerance: f64) -> bool;

    /// Check if the tangent vector is approximately equal to another tangent vector.
    fn is_approx(&self, other: &Self, tolerance: f64) -> bool;

    /// Copy the coefficients into a dynamically sized vector.
    fn to_dvector(&self) -> DVector<f64>;

    /// Build a tangent vector from a dynamically sized vector, checking its length.
    fn from_dvector(data: &DVector<f64>) -> ManifoldResult<Group::TangentVector>;
}

/// Check that a flat tangent slice has the dimension a group expects.
pub(crate) fn check_tangent_dimension(expected: usize, actual: usize) -> ManifoldResult<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(ManifoldError::InvalidTangentDimension { expected, actual })
    }
}
