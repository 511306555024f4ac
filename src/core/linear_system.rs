//! Assembly of the stacked residual and sparse Jacobian.
//!
//! The sparsity pattern of the Jacobian depends only on the graph and the ordering, so it is
//! computed once by [`LinearSystemBuilder::new`] and reused for every linearization of that
//! graph. Each live factor owns a contiguous block of rows (in graph order) and writes a dense
//! `dimension × dof(key)` block into the columns of each key it touches.
//!
//! # Example structure
//! For a chain of 3 SE(2) poses with a prior on `x0`:
//! - Prior(x0): 3×3 block at rows 0-2, cols 0-2
//! - Between(x0, x1): 3×6 block at rows 3-5, cols 0-5
//! - Between(x1, x2): 3×6 block at rows 6-8, cols 3-8

use crate::core::factor_graph::FactorGraph;
use crate::core::ordering::{Ordering, OrderingType};
use crate::core::values::Values;
use crate::core::{CoreError, Key};
use crate::error::PoseGraphResult;
use crate::factors::{FactorEvaluation, GraphFactor};
use faer::{
    Mat,
    sparse::{Argsort, Pair, SparseColMat, SymbolicSparseColMat},
};
use nalgebra::DVector;
use std::collections::HashMap;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Sparsity pattern of the Jacobian together with the permutation that maps values pushed
/// in factor order onto the column-major storage.
#[derive(Debug, Clone)]
pub struct SymbolicStructure {
    pub pattern: SymbolicSparseColMat<usize>,
    pub order: Argsort<usize>,
}

/// Whitened residual `r` and Jacobian `J` at one linearization point.
#[derive(Debug, Clone)]
pub struct LinearSystem {
    pub residual: Mat<f64>,
    pub jacobian: SparseColMat<usize, f64>,
}

impl LinearSystem {
    /// `||r||²`.
    pub fn error(&self) -> f64 {
        let norm = self.residual.norm_l2();
        norm * norm
    }
}

/// Builds [`LinearSystem`]s for a fixed graph and ordering.
#[derive(Debug, Clone)]
pub struct LinearSystemBuilder {
    ordering: Ordering,
    row_offsets: Vec<usize>,
    total_rows: usize,
    symbolic: SymbolicStructure,
}

impl LinearSystemBuilder {
    /// Compute the ordering and the symbolic structure of `graph`.
    ///
    /// # Errors
    /// - `CoreError::MissingKey` if a factor key is absent from `values`
    /// - `CoreError::InvalidOrdering` for a bad custom ordering
    /// - `CoreError::SymbolicStructure` if faer rejects the pattern
    pub fn new(
        graph: &FactorGraph,
        values: &Values,
        ordering_type: &OrderingType,
    ) -> PoseGraphResult<Self> {
        let ordering = Ordering::new(ordering_type, graph, values)?;

        let mut row_offsets = Vec::with_capacity(graph.size());
        let mut indices = Vec::<Pair<usize, usize>>::new();
        let mut total_rows = 0;
        for factor in graph.iter() {
            let dim = factor.dimension();
            row_offsets.push(total_rows);
            for &key in factor.keys() {
                let col_start = ordering.column_offset(key)?;
                let key_dim = values.at(key)?.dim();
                for row in 0..dim {
                    for col in 0..key_dim {
                        indices.push(Pair::new(total_rows + row, col_start + col));
                    }
                }
            }
            total_rows += dim;
        }

        let (pattern, order) =
            SymbolicSparseColMat::try_new_from_indices(total_rows, ordering.total_dof(), &indices)
                .map_err(|e| {
                    CoreError::SymbolicStructure(
                        "Failed to build symbolic sparse matrix structure".to_string(),
                    )
                    .log_with_source(e)
                })?;

        Ok(LinearSystemBuilder {
            ordering,
            row_offsets,
            total_rows,
            symbolic: SymbolicStructure { pattern, order },
        })
    }

    pub fn ordering(&self) -> &Ordering {
        &self.ordering
    }

    pub fn total_rows(&self) -> usize {
        self.total_rows
    }

    pub fn symbolic_structure(&self) -> &SymbolicStructure {
        &self.symbolic
    }

    /// Evaluate every factor with Jacobians and assemble `r` and `J`.
    ///
    /// # Errors
    /// `CoreError::DimensionMismatch` if `graph` no longer matches the graph the builder was
    /// created for, or any error raised while evaluating a factor.
    pub fn linearize(&self, graph: &FactorGraph, values: &Values) -> PoseGraphResult<LinearSystem> {
        let factors = self.live_factors(graph)?;
        let evaluations = evaluate_all(&factors, values, true)?;

        let mut residual = Mat::<f64>::zeros(self.total_rows, 1);
        let mut jacobian_values = Vec::with_capacity(self.symbolic.pattern.compute_nnz());
        for ((factor, evaluation), &row_start) in factors
            .iter()
            .zip(evaluations.iter())
            .zip(self.row_offsets.iter())
        {
            let dim = factor.dimension();
            for i in 0..dim {
                residual[(row_start + i, 0)] = evaluation.residual[i];
            }

            let jacobian = evaluation.jacobian.as_ref().ok_or_else(|| {
                CoreError::DimensionMismatch("factor returned no Jacobian".to_string()).log()
            })?;
            let mut local_col = 0;
            for &key in factor.keys() {
                let key_dim = values.at(key)?.dim();
                if jacobian.nrows() != dim || jacobian.ncols() < local_col + key_dim {
                    return Err(CoreError::DimensionMismatch(format!(
                        "Jacobian of shape {}x{} does not cover key {key}",
                        jacobian.nrows(),
                        jacobian.ncols()
                    ))
                    .log()
                    .into());
                }
                for row in 0..dim {
                    for col in 0..key_dim {
                        jacobian_values.push(jacobian[(row, local_col + col)]);
                    }
                }
                local_col += key_dim;
            }
        }

        let jacobian = SparseColMat::new_from_argsort(
            self.symbolic.pattern.clone(),
            &self.symbolic.order,
            jacobian_values.as_slice(),
        )
        .map_err(|e| {
            CoreError::SymbolicStructure("Failed to create sparse Jacobian from argsort".to_string())
                .log_with_source(e)
        })?;

        Ok(LinearSystem { residual, jacobian })
    }

    /// Total error at `values` without forming Jacobians.
    pub fn error_only(&self, graph: &FactorGraph, values: &Values) -> PoseGraphResult<f64> {
        let factors = self.live_factors(graph)?;
        let evaluations = evaluate_all(&factors, values, false)?;
        Ok(evaluations.iter().map(FactorEvaluation::error).sum())
    }

    /// Split a stacked step into per-key tangent deltas.
    pub fn step_to_deltas(&self, dx: &Mat<f64>) -> HashMap<Key, DVector<f64>> {
        self.ordering
            .blocks()
            .map(|(key, start, dim)| (key, DVector::from_fn(dim, |i, _| dx[(start + i, 0)])))
            .collect()
    }

    fn live_factors<'a>(&self, graph: &'a FactorGraph) -> PoseGraphResult<Vec<&'a GraphFactor>> {
        let factors: Vec<&GraphFactor> = graph.iter().collect();
        if factors.len() != self.row_offsets.len() {
            return Err(CoreError::DimensionMismatch(format!(
                "graph has {} factors, linear system was built for {}",
                factors.len(),
                self.row_offsets.len()
            ))
            .log()
            .into());
        }
        Ok(factors)
    }
}

fn evaluate_all(
    factors: &[&GraphFactor],
    values: &Values,
    compute_jacobian: bool,
) -> PoseGraphResult<Vec<FactorEvaluation>> {
    #[cfg(feature = "parallel")]
    let evaluations = factors
        .par_iter()
        .map(|factor| factor.evaluate(values, compute_jacobian))
        .collect();

    #[cfg(not(feature = "parallel"))]
    let evaluations = factors
        .iter()
        .map(|factor| factor.evaluate(values, compute_jacobian))
        .collect();

    evaluations
}
