//! Core pose-graph components
//!
//! This module contains the data structures an optimization run is built from:
//! - Poses on SE(2) and SE(3)
//! - Diagonal Gaussian noise models
//! - The factor graph and the estimate store (`Values`)
//! - Column orderings and the sparse linear system builder

pub mod factor_graph;
pub mod linear_system;
pub mod noise_model;
pub mod ordering;
pub mod pose;
pub mod values;

use thiserror::Error;
use tracing::error;

/// Identifier of a pose variable.
pub type Key = u64;

/// Core module error types for graphs, values and linearization
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// A key was inserted twice into the same `Values`
    #[error("Duplicate key: {0}")]
    DuplicateKey(Key),

    /// A factor or caller referenced a key that is not present
    #[error("Missing key: {0}")]
    MissingKey(Key),

    /// A custom ordering does not cover the graph keys exactly once
    #[error("Invalid ordering: {0}")]
    InvalidOrdering(String),

    /// Symbolic structure construction failed
    #[error("Symbolic structure error: {0}")]
    SymbolicStructure(String),

    /// Non-positive or non-finite sigma in a noise model
    #[error("Invalid noise model: {0}")]
    InvalidNoiseModel(String),

    /// Dimension mismatch between residual/Jacobian/variables
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Shifting a key by an offset would leave the key range
    #[error("Key {key} cannot be shifted by {offset}")]
    KeyOverflow { key: Key, offset: Key },
}

impl CoreError {
    /// Log the error with tracing::error and return self for chaining
    ///
    /// # Example
    /// ```ignore
    /// values.at(key).map_err(|e| e.log())?;
    /// ```
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }

    /// Log the error together with the underlying third-party error
    ///
    /// # Arguments
    /// * `source_error` - The original error from the third-party library (must implement Debug)
    #[must_use]
    pub fn log_with_source<E: std::fmt::Debug>(self, source_error: E) -> Self {
        error!("{} | Source: {:?}", self, source_error);
        self
    }
}

/// Result type for core module operations
pub type CoreResult<T> = Result<T, CoreError>;

/// `key + offset`, or `CoreError::KeyOverflow` if the sum does not fit in a [`Key`].
pub fn offset_key(key: Key, offset: Key) -> CoreResult<Key> {
    key.checked_add(offset)
        .ok_or_else(|| CoreError::KeyOverflow { key, offset }.log())
}
