use nalgebra::{Matrix3, Vector3};

use super::error::EngineError;
use super::tasks::{Task, TaskTable};

/// The analytic derivatives of one pair weight.
///
/// `on_row` and `on_col` are the gradients of the weight with respect to the
/// two endpoint positions; they are exact negations of one another, so the
/// pair's net contribution to the total force is zero. `virial` is the
/// 3×3 stress contribution, an outer product of the displacement with itself
/// and therefore symmetric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairDerivatives {
    pub on_row: Vector3<f64>,
    pub on_col: Vector3<f64>,
    pub virial: Matrix3<f64>,
}

/// The per-cycle result vessel: one weight per task, plus a derivative block
/// for the tasks that went through Phase D.
///
/// A vessel is created fresh for every evaluation cycle and filled exactly
/// once per task; committing a task twice is a contract violation, not a
/// last-write-wins update. Weights of pairs at or beyond the cutoff are
/// stored as zero, keeping the vessel dense over the task list while the
/// derivative blocks stay sparse.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjacencyMatrix {
    weights: Vec<f64>,
    committed: Vec<bool>,
    derivatives: Vec<Option<PairDerivatives>>,
}

impl AdjacencyMatrix {
    pub(crate) fn new(n_tasks: usize) -> Self {
        Self {
            weights: vec![0.0; n_tasks],
            committed: vec![false; n_tasks],
            derivatives: vec![None; n_tasks],
        }
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Stores the result of one task's evaluation.
    pub(crate) fn commit(
        &mut self,
        index: usize,
        weight: f64,
        derivatives: Option<PairDerivatives>,
    ) -> Result<(), EngineError> {
        self.check_index(index)?;
        if self.committed[index] {
            return Err(EngineError::AlreadyCommitted { index });
        }
        self.weights[index] = weight;
        self.derivatives[index] = derivatives;
        self.committed[index] = true;
        Ok(())
    }

    /// The weight committed for a task this cycle.
    pub fn weight(&self, index: usize) -> Result<f64, EngineError> {
        self.check_index(index)?;
        if !self.committed[index] {
            return Err(EngineError::WeightNotAvailable { index });
        }
        Ok(self.weights[index])
    }

    /// The derivative block committed for a task this cycle.
    ///
    /// Fails if the cycle ran weight-only, or if the pair's weight fell at or
    /// below the tolerance and Phase D skipped it.
    pub fn derivatives(&self, index: usize) -> Result<&PairDerivatives, EngineError> {
        self.check_index(index)?;
        self.derivatives[index]
            .as_ref()
            .ok_or(EngineError::DerivativesNotAvailable { index })
    }

    pub fn has_derivatives(&self, index: usize) -> bool {
        self.derivatives.get(index).is_some_and(Option::is_some)
    }

    /// Iterates the committed weights of one (blockRow, blockCol) bucket,
    /// using the task table that produced this vessel.
    pub fn block_weights<'a>(
        &'a self,
        tasks: &'a TaskTable,
        block_row: usize,
        block_col: usize,
    ) -> impl Iterator<Item = (Task, f64)> + 'a {
        tasks
            .block_range(block_row, block_col)
            .map(move |index| (tasks.task(index), self.weights[index]))
    }

    fn check_index(&self, index: usize) -> Result<(), EngineError> {
        if index >= self.weights.len() {
            return Err(EngineError::TaskOutOfRange {
                index,
                n_tasks: self.weights.len(),
            });
        }
        Ok(())
    }
}
