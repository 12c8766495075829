use super::function::SwitchingFunction;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SwitchingMatrixError {
    #[error("Node type {index} is out of range for {n_types} types")]
    TypeOutOfRange { index: usize, n_types: usize },
    #[error("No switching function set for node types ({row}, {col})")]
    EntryNotSet { row: usize, col: usize },
}

/// A symmetric matrix of switching functions indexed by node type.
///
/// Entry (i, j) and entry (j, i) are always the same function: there is one
/// logical `set` per unordered pair, which writes both triangles, so the
/// matrix cannot become accidentally asymmetric.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchingMatrix {
    n_types: usize,
    entries: Vec<Option<SwitchingFunction>>,
}

impl SwitchingMatrix {
    pub fn new(n_types: usize) -> Self {
        Self {
            n_types,
            entries: vec![None; n_types * n_types],
        }
    }

    pub fn n_types(&self) -> usize {
        self.n_types
    }

    /// Stores a function for the unordered type pair (a, b).
    pub fn set(
        &mut self,
        a: usize,
        b: usize,
        function: SwitchingFunction,
    ) -> Result<(), SwitchingMatrixError> {
        self.check_type(a)?;
        self.check_type(b)?;
        self.entries[a * self.n_types + b] = Some(function.clone());
        self.entries[b * self.n_types + a] = Some(function);
        Ok(())
    }

    pub fn get(&self, a: usize, b: usize) -> Option<&SwitchingFunction> {
        if a >= self.n_types || b >= self.n_types {
            return None;
        }
        self.entries[a * self.n_types + b].as_ref()
    }

    /// Evaluates the function for the type pair (a, b) at a distance,
    /// returning `(weight, dfunc)` as [`SwitchingFunction::calculate`] does.
    pub fn evaluate(
        &self,
        a: usize,
        b: usize,
        distance: f64,
    ) -> Result<(f64, f64), SwitchingMatrixError> {
        self.check_type(a)?;
        self.check_type(b)?;
        let function = self.entries[a * self.n_types + b]
            .as_ref()
            .ok_or(SwitchingMatrixError::EntryNotSet { row: a, col: b })?;
        Ok(function.calculate(distance))
    }

    /// True once every type pair has a function.
    pub fn is_complete(&self) -> bool {
        self.entries.iter().all(Option::is_some)
    }

    /// The largest cutoff over all entries, the one scalar a spatial-pruning
    /// collaborator needs. Recomputed on each call so it always reflects the
    /// current entries.
    pub fn max_cutoff(&self) -> f64 {
        self.entries
            .iter()
            .flatten()
            .map(SwitchingFunction::dmax)
            .fold(0.0, f64::max)
    }

    fn check_type(&self, index: usize) -> Result<(), SwitchingMatrixError> {
        if index >= self.n_types {
            return Err(SwitchingMatrixError::TypeOutOfRange {
                index,
                n_types: self.n_types,
            });
        }
        Ok(())
    }
}
