//! Sets of constrained degrees of freedom.
use crate::error::OperatorError;
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;

/// An ordered set of unique degree-of-freedom indices in `[0, global_size)`.
///
/// The indices are validated once at construction and the set is immutable afterwards. Since
/// indices are guaranteed to be unique, scatters driven by a constraint set never write the
/// same entry twice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ConstraintSetData")]
pub struct ConstraintSet {
    indices: Vec<usize>,
    global_size: usize,
}

#[derive(Deserialize)]
struct ConstraintSetData {
    indices: Vec<usize>,
    global_size: usize,
}

impl TryFrom<ConstraintSetData> for ConstraintSet {
    type Error = OperatorError;

    fn try_from(data: ConstraintSetData) -> Result<Self, Self::Error> {
        Self::new(data.indices, data.global_size)
    }
}

impl ConstraintSet {
    /// Creates a constraint set, preserving the order of `indices`.
    ///
    /// # Errors
    ///
    /// Fails with [`OperatorError::InvalidArgument`] if an index is not smaller than
    /// `global_size` or appears more than once.
    pub fn new(indices: impl Into<Vec<usize>>, global_size: usize) -> Result<Self, OperatorError> {
        let indices = indices.into();
        let mut seen = vec![false; global_size];
        for (position, &index) in indices.iter().enumerate() {
            if index >= global_size {
                return Err(OperatorError::invalid_argument(
                    "indices",
                    format!(
                        "constraint index {} at position {} is out of bounds for {} degrees of freedom",
                        index, position, global_size
                    ),
                ));
            }
            if seen[index] {
                return Err(OperatorError::invalid_argument(
                    "indices",
                    format!("constraint index {} at position {} is repeated", index, position),
                ));
            }
            seen[index] = true;
        }

        Ok(Self { indices, global_size })
    }

    pub fn empty(global_size: usize) -> Self {
        Self {
            indices: Vec::new(),
            global_size,
        }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// The number of degrees of freedom the indices refer into.
    pub fn global_size(&self) -> usize {
        self.global_size
    }

    pub fn contains(&self, index: usize) -> bool {
        self.indices.contains(&index)
    }

    /// A boolean mask of length `global_size` that is `true` at constrained indices.
    pub fn membership(&self) -> Vec<bool> {
        let mut mask = vec![false; self.global_size];
        for &index in &self.indices {
            mask[index] = true;
        }
        mask
    }
}
