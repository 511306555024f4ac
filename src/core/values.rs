//! Estimate store mapping keys to poses.
//!
//! `Values` is a dense arena: poses live in a `Vec` in insertion order and a
//! `HashMap<Key, usize>` remaps each key to its slot. The optimizer never mutates the
//! caller's `Values`; it works on copies produced by [`Values::retract`].

use crate::core::pose::Pose;
use crate::core::{CoreError, CoreResult, Key, offset_key};
use crate::manifold::ManifoldError;
use nalgebra::DVector;
use rand::Rng;
use rand_distr::StandardNormal;
use std::collections::HashMap;

/// Poses indexed by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Values {
    poses: Vec<Pose>,
    keys: Vec<Key>,
    slots: HashMap<Key, usize>,
}

impl Values {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new pose.
    ///
    /// # Errors
    /// `CoreError::DuplicateKey` if `key` is already present.
    pub fn insert(&mut self, key: Key, pose: impl Into<Pose>) -> CoreResult<()> {
        if self.slots.contains_key(&key) {
            return Err(CoreError::DuplicateKey(key).log());
        }
        self.slots.insert(key, self.poses.len());
        self.keys.push(key);
        self.poses.push(pose.into());
        Ok(())
    }

    /// # Errors
    /// `CoreError::MissingKey` if `key` is absent.
    pub fn at(&self, key: Key) -> CoreResult<&Pose> {
        self.slots
            .get(&key)
            .map(|&slot| &self.poses[slot])
            .ok_or_else(|| CoreError::MissingKey(key).log())
    }

    /// Overwrite an existing pose, keeping its kind.
    pub fn update(&mut self, key: Key, pose: impl Into<Pose>) -> CoreResult<()> {
        let pose = pose.into();
        let slot = *self
            .slots
            .get(&key)
            .ok_or_else(|| CoreError::MissingKey(key).log())?;
        if let Err(ManifoldError::TypeMismatch { left, right }) =
            self.poses[slot].check_same_type(&pose)
        {
            return Err(CoreError::DimensionMismatch(format!(
                "cannot replace {left} pose {key} with a {right} pose"
            ))
            .log());
        }
        self.poses[slot] = pose;
        Ok(())
    }

    pub fn contains(&self, key: Key) -> bool {
        self.slots.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// `(key, pose)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (Key, &Pose)> {
        self.keys.iter().copied().zip(self.poses.iter())
    }

    /// Copy with every listed key moved by its tangent delta, `x ⊞ δ`.
    ///
    /// Keys absent from `delta` are copied unchanged.
    pub fn retract(&self, delta: &HashMap<Key, DVector<f64>>) -> CoreResult<Values> {
        let mut result = self.clone();
        for (key, step) in delta {
            let slot = *self
                .slots
                .get(key)
                .ok_or_else(|| CoreError::MissingKey(*key).log())?;
            result.poses[slot] = self.poses[slot].retract(step).map_err(|e| {
                CoreError::DimensionMismatch(format!("retract of key {key} failed")).log_with_source(e)
            })?;
        }
        Ok(result)
    }

    /// Copy with every pose moved by an isotropic Gaussian tangent delta.
    ///
    /// Intended for building noisy initial estimates in tests and simulations.
    pub fn perturbed<R: Rng + ?Sized>(&self, sigma: f64, rng: &mut R) -> CoreResult<Values> {
        let mut result = self.clone();
        for pose in result.poses.iter_mut() {
            let delta = DVector::from_fn(pose.dim(), |_, _| {
                sigma * rng.sample::<f64, _>(StandardNormal)
            });
            *pose = pose.retract(&delta).map_err(|e| {
                CoreError::DimensionMismatch("perturbation failed".to_string()).log_with_source(e)
            })?;
        }
        Ok(result)
    }

    /// Same key set and every pose within `tolerance`.
    pub fn is_approx(&self, other: &Values, tolerance: f64) -> bool {
        self.len() == other.len()
            && self.iter().all(|(key, pose)| {
                other
                    .slots
                    .get(&key)
                    .is_some_and(|&slot| other.poses[slot].is_approx(pose, tolerance))
            })
    }

    /// Copy with every key shifted by `offset`.
    ///
    /// # Errors
    /// `CoreError::KeyOverflow` if a shifted key would exceed `Key::MAX`.
    pub fn with_key_offset(&self, offset: Key) -> CoreResult<Values> {
        let keys = self
            .keys
            .iter()
            .map(|&key| offset_key(key, offset))
            .collect::<CoreResult<Vec<Key>>>()?;
        let slots = keys.iter().enumerate().map(|(slot, &key)| (key, slot)).collect();
        Ok(Values {
            poses: self.poses.clone(),
            keys,
            slots,
        })
    }
}
