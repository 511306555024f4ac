//! Column orderings for the linear system.
//!
//! An `Ordering` assigns every key touched by a factor a contiguous block of columns in the
//! stacked Jacobian, sized by the key's tangent dimension. Keys present in `Values` but not
//! referenced by any factor are left out and pass through an optimization unchanged.

use crate::core::factor_graph::FactorGraph;
use crate::core::values::Values;
use crate::core::{CoreError, CoreResult, Key};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Strategy used to order the column blocks.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OrderingType {
    /// Keys in the order the graph first references them
    #[default]
    FirstSeen,
    /// Keys sorted by value
    Sorted,
    /// Caller-supplied permutation of the graph keys
    Custom(Vec<Key>),
}

impl fmt::Display for OrderingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderingType::FirstSeen => write!(f, "FirstSeen"),
            OrderingType::Sorted => write!(f, "Sorted"),
            OrderingType::Custom(keys) => write!(f, "Custom({} keys)", keys.len()),
        }
    }
}

/// Column layout of the linear system.
#[derive(Debug, Clone)]
pub struct Ordering {
    keys: Vec<Key>,
    column_offsets: HashMap<Key, usize>,
    dims: Vec<usize>,
    total_dof: usize,
}

impl Ordering {
    /// Build an ordering for `graph`, taking each block size from `values`.
    ///
    /// # Errors
    /// - `CoreError::MissingKey` if a factor key is absent from `values`
    /// - `CoreError::InvalidOrdering` if a custom ordering is not a permutation of the
    ///   graph keys
    pub fn new(
        ordering_type: &OrderingType,
        graph: &FactorGraph,
        values: &Values,
    ) -> CoreResult<Self> {
        let graph_keys = graph.keys();
        for &key in &graph_keys {
            if !values.contains(key) {
                return Err(CoreError::MissingKey(key).log());
            }
        }

        let keys = match ordering_type {
            OrderingType::FirstSeen => graph_keys,
            OrderingType::Sorted => {
                let mut keys = graph_keys;
                keys.sort_unstable();
                keys
            }
            OrderingType::Custom(custom) => {
                Self::validate_custom(custom, &graph_keys)?;
                custom.clone()
            }
        };

        let mut column_offsets = HashMap::with_capacity(keys.len());
        let mut dims = Vec::with_capacity(keys.len());
        let mut total_dof = 0;
        for &key in &keys {
            let dim = values.at(key)?.dim();
            column_offsets.insert(key, total_dof);
            dims.push(dim);
            total_dof += dim;
        }

        Ok(Ordering {
            keys,
            column_offsets,
            dims,
            total_dof,
        })
    }

    /// First-seen ordering.
    pub fn first_seen(graph: &FactorGraph, values: &Values) -> CoreResult<Self> {
        Self::new(&OrderingType::FirstSeen, graph, values)
    }

    /// Keys sorted ascending.
    pub fn sorted(graph: &FactorGraph, values: &Values) -> CoreResult<Self> {
        Self::new(&OrderingType::Sorted, graph, values)
    }

    /// Explicit permutation of the graph keys.
    pub fn custom(keys: Vec<Key>, graph: &FactorGraph, values: &Values) -> CoreResult<Self> {
        Self::new(&OrderingType::Custom(keys), graph, values)
    }

    fn validate_custom(custom: &[Key], graph_keys: &[Key]) -> CoreResult<()> {
        let expected: HashSet<Key> = graph_keys.iter().copied().collect();
        let mut seen = HashSet::with_capacity(custom.len());
        for &key in custom {
            if !expected.contains(&key) {
                return Err(CoreError::InvalidOrdering(format!(
                    "key {key} is not referenced by any factor"
                ))
                .log());
            }
            if !seen.insert(key) {
                return Err(CoreError::InvalidOrdering(format!("key {key} listed twice")).log());
            }
        }
        if seen.len() != expected.len() {
            return Err(CoreError::InvalidOrdering(format!(
                "ordering covers {} of {} graph keys",
                seen.len(),
                expected.len()
            ))
            .log());
        }
        Ok(())
    }

    /// Keys in column order.
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// `(key, first column, dimension)` in column order.
    pub fn blocks(&self) -> impl Iterator<Item = (Key, usize, usize)> + '_ {
        self.keys
            .iter()
            .zip(self.dims.iter())
            .map(|(&key, &dim)| (key, self.column_offsets[&key], dim))
    }

    /// First column of `key`'s block.
    pub fn column_offset(&self, key: Key) -> CoreResult<usize> {
        self.column_offsets
            .get(&key)
            .copied()
            .ok_or_else(|| CoreError::MissingKey(key).log())
    }

    pub fn total_dof(&self) -> usize {
        self.total_dof
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
