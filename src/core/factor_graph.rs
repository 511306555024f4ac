//! Factor graph container.
//!
//! A `FactorGraph` is an ordered list of factors. Insertion order fixes the row order of
//! the stacked Jacobian and the default column ordering of the linear system. The graph
//! owns no estimates; those live in [`Values`].
//!
//! Removing a factor leaves a tombstone in its slot, so indices returned by
//! [`FactorGraph::add`] stay valid for the lifetime of the graph.

use crate::core::values::Values;
use crate::core::{CoreResult, Key};
use crate::error::PoseGraphResult;
use crate::factors::GraphFactor;
use std::collections::HashSet;

/// Ordered collection of factors.
#[derive(Debug, Clone, Default)]
pub struct FactorGraph {
    factors: Vec<Option<GraphFactor>>,
}

impl FactorGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a factor and return its index.
    pub fn add(&mut self, factor: impl Into<GraphFactor>) -> usize {
        self.factors.push(Some(factor.into()));
        self.factors.len() - 1
    }

    /// Remove the factor at `index`, leaving a tombstone.
    ///
    /// Returns `None` if the slot was out of range or already empty.
    pub fn remove(&mut self, index: usize) -> Option<GraphFactor> {
        self.factors.get_mut(index).and_then(Option::take)
    }

    pub fn get(&self, index: usize) -> Option<&GraphFactor> {
        self.factors.get(index).and_then(Option::as_ref)
    }

    /// Number of live factors.
    pub fn size(&self) -> usize {
        self.factors.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Live factors in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &GraphFactor> {
        self.factors.iter().flatten()
    }

    /// Distinct keys in first-seen order.
    pub fn keys(&self) -> Vec<Key> {
        let mut seen = HashSet::new();
        self.iter()
            .flat_map(|factor| factor.keys().iter().copied())
            .filter(|key| seen.insert(*key))
            .collect()
    }

    /// Total error `Σ ||Σ^(-1/2) r||²` at `values`.
    pub fn error(&self, values: &Values) -> PoseGraphResult<f64> {
        self.iter().map(|factor| factor.error(values)).sum()
    }

    /// Copy with every key shifted by `offset`. Tombstones are preserved.
    ///
    /// # Errors
    /// `CoreError::KeyOverflow` if a shifted key would exceed `Key::MAX`.
    pub fn with_key_offset(&self, offset: Key) -> CoreResult<FactorGraph> {
        let factors = self
            .factors
            .iter()
            .map(|slot| {
                slot.as_ref()
                    .map(|factor| factor.with_key_offset(offset))
                    .transpose()
            })
            .collect::<CoreResult<Vec<_>>>()?;
        Ok(FactorGraph { factors })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CoreError;
    use crate::core::noise_model::DiagonalNoise;
    use crate::factors::{BetweenFactor, EqualityFactor, PriorFactor};
    use crate::manifold::se2::SE2;
    use crate::manifold::LieGroup;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    const TOLERANCE: f64 = 1e-12;

    fn chain() -> Result<FactorGraph, Box<dyn std::error::Error>> {
        let mut graph = FactorGraph::new();
        graph.add(EqualityFactor::new(2, SE2::identity()));
        graph.add(BetweenFactor::new(
            2,
            0,
            SE2::from_xy_angle(1.0, 0.0, 0.0),
            DiagonalNoise::unit(3)?,
        )?);
        graph.add(BetweenFactor::new(
            0,
            1,
            SE2::from_xy_angle(1.0, 0.0, 0.0),
            DiagonalNoise::unit(3)?,
        )?);
        Ok(graph)
    }

    #[test]
    fn test_keys_in_first_seen_order() -> TestResult {
        let graph = chain()?;
        assert_eq!(graph.keys(), vec![2, 0, 1]);
        assert_eq!(graph.size(), 3);
        Ok(())
    }

    #[test]
    fn test_remove_leaves_tombstone() -> TestResult {
        let mut graph = chain()?;
        let index = graph.add(PriorFactor::new(1, SE2::identity(), DiagonalNoise::unit(3)?)?);
        assert_eq!(index, 3);
        assert!(graph.remove(1).is_some());
        assert!(graph.remove(1).is_none());
        assert_eq!(graph.size(), 3);
        assert!(graph.get(3).is_some());
        assert_eq!(graph.iter().count(), 3);
        Ok(())
    }

    #[test]
    fn test_error_sums_factors() -> TestResult {
        let graph = chain()?;
        let mut values = Values::new();
        values.insert(2, SE2::identity())?;
        values.insert(0, SE2::from_xy_angle(1.0, 0.0, 0.0))?;
        values.insert(1, SE2::from_xy_angle(3.0, 0.0, 0.0))?;
        assert!((graph.error(&values)? - 1.0).abs() < TOLERANCE);
        Ok(())
    }

    #[test]
    fn test_empty_graph() -> TestResult {
        let graph = FactorGraph::new();
        assert!(graph.is_empty());
        assert!(graph.keys().is_empty());
        assert_eq!(graph.error(&Values::new())?, 0.0);
        Ok(())
    }

    #[test]
    fn test_with_key_offset() -> TestResult {
        let mut graph = chain()?;
        graph.remove(0);
        let shifted = graph.with_key_offset(1000)?;
        assert_eq!(shifted.keys(), vec![1002, 1000, 1001]);
        assert!(shifted.get(0).is_none());
        Ok(())
    }

    #[test]
    fn test_with_key_offset_overflow_is_error() -> TestResult {
        let graph = chain()?;
        assert!(matches!(
            graph.with_key_offset(Key::MAX),
            Err(CoreError::KeyOverflow { .. })
        ));
        Ok(())
    }
}
