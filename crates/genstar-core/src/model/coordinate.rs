//! Coordinates: canonical value sets identifying a distribution cell.
//!
//! A coordinate keeps its values sorted by attribute, so two coordinates built
//! from the same value set in any order are equal and hash identically.

use smallvec::SmallVec;

use crate::engine::errors::GenstarError;
use crate::model::attribute::{AttributeId, ValueId};

/// Inline capacity for coordinate storage; survey tables rarely exceed it.
pub const INLINE_VALUES: usize = 8;

/// Non-empty set of values with at most one value per attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Coordinate {
    values: SmallVec<[ValueId; INLINE_VALUES]>,
}

impl Coordinate {
    /// Builds a coordinate, rejecting empty input and conflicting values for
    /// one attribute. Repeating the very same value is tolerated.
    pub fn new(values: impl IntoIterator<Item = ValueId>) -> Result<Self, GenstarError> {
        let mut values: SmallVec<[ValueId; INLINE_VALUES]> = values.into_iter().collect();
        if values.is_empty() {
            return Err(GenstarError::MatrixCoordinate(
                "a coordinate must hold at least one value".into(),
            ));
        }
        values.sort_unstable();
        values.dedup();
        if let Some(pair) = values
            .windows(2)
            .find(|w| w[0].attribute == w[1].attribute)
        {
            return Err(GenstarError::MatrixCoordinate(format!(
                "attribute {:?} has two values in one coordinate ({:?}, {:?})",
                pair[0].attribute, pair[0], pair[1]
            )));
        }
        Ok(Self { values })
    }

    /// Values in attribute order.
    pub fn values(&self) -> &[ValueId] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn attributes(&self) -> impl Iterator<Item = AttributeId> + '_ {
        self.values.iter().map(|v| v.attribute)
    }

    pub fn value_of(&self, attribute: AttributeId) -> Option<ValueId> {
        self.values
            .binary_search_by(|v| v.attribute.cmp(&attribute))
            .ok()
            .map(|i| self.values[i])
    }

    pub fn has_attribute(&self, attribute: AttributeId) -> bool {
        self.value_of(attribute).is_some()
    }

    pub fn contains(&self, value: ValueId) -> bool {
        self.value_of(value.attribute) == Some(value)
    }

    /// Whether every value of `partial` belongs to this coordinate.
    pub fn contains_all(&self, partial: &[ValueId]) -> bool {
        partial.iter().all(|v| self.contains(*v))
    }

    /// Values whose attribute satisfies `keep`, in attribute order.
    pub fn project<F>(&self, mut keep: F) -> SmallVec<[ValueId; INLINE_VALUES]>
    where
        F: FnMut(AttributeId) -> bool,
    {
        self.values
            .iter()
            .copied()
            .filter(|v| keep(v.attribute))
            .collect()
    }

    /// Union with `other`; fails when both carry different values for one attribute.
    pub fn extend<I>(&self, other: I) -> Result<Self, GenstarError>
    where
        I: IntoIterator<Item = ValueId>,
    {
        Self::new(self.values.iter().copied().chain(other))
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}:{}", v.attribute.0, v.index)?;
        }
        write!(f, "]")
    }
}
