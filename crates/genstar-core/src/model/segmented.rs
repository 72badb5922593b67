//! # Segmented matrices
//!
//! A [`SegmentedMatrix`] groups plain matrices whose dimension sets differ and
//! may overlap. None of them knows the joint distribution over the union of
//! dimensions; the inference strategies in [`crate::engine`] reconstruct it.
//!
//! [`Matrix`] is what the engine consumes: either one plain table or a
//! segmented set.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::engine::errors::GenstarError;
use crate::model::attribute::{AttributeId, ValueId};
use crate::model::catalog::Catalog;
use crate::model::control::Control;
use crate::model::coordinate::INLINE_VALUES;
use crate::model::matrix::{Dimensions, PlainMatrix, SurveyKind};

/// A set of plain matrices sharing one catalog.
#[derive(Debug, Clone)]
pub struct SegmentedMatrix<C: Control = f64> {
    label: String,
    members: Vec<PlainMatrix<C>>,
    dimensions: Dimensions,
    catalog: Arc<Catalog>,
}

impl<C: Control> SegmentedMatrix<C> {
    pub fn new(
        label: impl Into<String>,
        members: Vec<PlainMatrix<C>>,
    ) -> Result<Self, GenstarError> {
        let label = label.into();
        let Some(first) = members.first() else {
            return Err(GenstarError::IllegalArgument(format!(
                "segmented matrix '{}' has no member",
                label
            )));
        };
        let catalog = Arc::clone(first.catalog());
        if let Some(stranger) = members
            .iter()
            .find(|m| !Arc::ptr_eq(m.catalog(), &catalog))
        {
            return Err(GenstarError::IllegalArgument(format!(
                "matrix '{}' does not share the catalog of segmented matrix '{}'",
                stranger.label(),
                label
            )));
        }

        let mut dimensions: Dimensions = members
            .iter()
            .flat_map(|m| m.dimensions().iter().copied())
            .collect();
        dimensions.sort_unstable();
        dimensions.dedup();

        Ok(Self {
            label,
            members,
            dimensions,
            catalog,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn members(&self) -> &[PlainMatrix<C>] {
        &self.members
    }

    /// Union of member dimensions, in attribute order.
    pub fn dimensions(&self) -> &[AttributeId] {
        &self.dimensions
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Estimated probability of `values`.
    ///
    /// A member covering every requested attribute answers directly. Otherwise
    /// members are chained: each step multiplies by the conditional probability
    /// of the values it adds, given the already-estimated values it shares.
    pub fn total(&self, values: &[ValueId]) -> Result<f64, GenstarError> {
        if let Some(stray) = values
            .iter()
            .find(|v| self.dimensions.binary_search(&v.attribute).is_err())
        {
            return Err(GenstarError::IllegalArgument(format!(
                "attribute '{}' is not a dimension of segmented matrix '{}'",
                self.catalog.name_of(stray.attribute),
                self.label
            )));
        }
        if values.is_empty() {
            return Ok(1.0);
        }
        if let Some(member) = self
            .members
            .iter()
            .filter(|m| m.covers(values))
            .max_by_key(|m| m.len())
        {
            return Ok(member.frequency(values));
        }

        let mut known: SmallVec<[ValueId; INLINE_VALUES]> = SmallVec::new();
        let mut remaining: SmallVec<[ValueId; INLINE_VALUES]> = values.iter().copied().collect();
        let mut estimate = 1.0;
        while !remaining.is_empty() {
            let Some(member) = self.next_member(&remaining, &known) else {
                return Err(GenstarError::Internal(format!(
                    "no member of '{}' covers the remaining values",
                    self.label
                )));
            };
            let (added, rest): (SmallVec<[ValueId; INLINE_VALUES]>, _) = remaining
                .iter()
                .copied()
                .partition(|v| member.has_dimension(v.attribute));
            let condition: SmallVec<[ValueId; INLINE_VALUES]> = known
                .iter()
                .copied()
                .filter(|v| member.has_dimension(v.attribute))
                .collect();
            let marginal = if condition.is_empty() {
                1.0
            } else {
                member.frequency(&condition)
            };
            if marginal <= 0.0 {
                return Ok(0.0);
            }
            let joint: SmallVec<[ValueId; INLINE_VALUES]> =
                condition.iter().chain(added.iter()).copied().collect();
            estimate *= member.frequency(&joint) / marginal;
            known.extend(added);
            remaining = rest;
        }
        Ok(estimate)
    }

    // Most remaining values first, then most shared known values, then declaration order.
    fn next_member(&self, remaining: &[ValueId], known: &[ValueId]) -> Option<&PlainMatrix<C>> {
        self.members
            .iter()
            .enumerate()
            .map(|(i, m)| {
                let added = remaining
                    .iter()
                    .filter(|v| m.has_dimension(v.attribute))
                    .count();
                let shared = known.iter().filter(|v| m.has_dimension(v.attribute)).count();
                (added, shared, std::cmp::Reverse(i), m)
            })
            .filter(|(added, ..)| *added > 0)
            .max_by_key(|(added, shared, rank, _)| (*added, *shared, *rank))
            .map(|(.., m)| m)
    }
}

/// Input of distribution inference.
#[derive(Debug, Clone)]
pub enum Matrix<C: Control = f64> {
    Plain(PlainMatrix<C>),
    Segmented(SegmentedMatrix<C>),
}

impl<C: Control> Matrix<C> {
    pub fn label(&self) -> &str {
        match self {
            Matrix::Plain(m) => m.label(),
            Matrix::Segmented(m) => m.label(),
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        match self {
            Matrix::Plain(m) => m.catalog(),
            Matrix::Segmented(m) => m.catalog(),
        }
    }

    pub fn dimensions(&self) -> &[AttributeId] {
        match self {
            Matrix::Plain(m) => m.dimensions(),
            Matrix::Segmented(m) => m.dimensions(),
        }
    }

    /// Plain matrices making up this matrix; a plain matrix is its only member.
    pub fn members(&self) -> &[PlainMatrix<C>] {
        match self {
            Matrix::Plain(m) => std::slice::from_ref(m),
            Matrix::Segmented(m) => m.members(),
        }
    }

    pub fn is_segmented(&self) -> bool {
        matches!(self, Matrix::Segmented(_))
    }

    pub fn has_dimension(&self, attribute: AttributeId) -> bool {
        self.dimensions().binary_search(&attribute).is_ok()
    }

    /// Runs [`PlainMatrix::check_frequency_total`] on every non-empty global
    /// frequency table member.
    pub fn check_frequency_totals(
        &self,
        epsilon: f64,
        adjust_epsilon: f64,
    ) -> Result<(), GenstarError> {
        self.members()
            .iter()
            .filter(|m| m.kind() == SurveyKind::GlobalFrequencyTable && !m.is_empty())
            .try_for_each(|m| m.check_frequency_total(epsilon, adjust_epsilon).map(|_| ()))
    }

    /// Control total for `values`: the raw aggregate of a plain matrix, the
    /// estimated probability of a segmented one.
    pub fn total(&self, values: &[ValueId]) -> Result<f64, GenstarError> {
        match self {
            Matrix::Plain(m) => {
                if !m.covers(values) {
                    return Err(GenstarError::IllegalArgument(format!(
                        "matrix '{}' cannot answer values outside its dimensions",
                        m.label()
                    )));
                }
                Ok(m.total(values).as_f64())
            }
            Matrix::Segmented(m) => m.total(values),
        }
    }

    /// What [`Matrix::total`] sums to over the whole matrix.
    pub fn reference_total(&self) -> f64 {
        match self {
            Matrix::Plain(m) if m.kind().is_frequency() => 1.0,
            Matrix::Plain(m) => m.grand_total().as_f64(),
            Matrix::Segmented(_) => 1.0,
        }
    }

    /// Survey kind of a plain matrix, `None` for a segmented one.
    pub fn kind(&self) -> Option<SurveyKind> {
        match self {
            Matrix::Plain(m) => Some(m.kind()),
            Matrix::Segmented(_) => None,
        }
    }
}

impl<C: Control> From<PlainMatrix<C>> for Matrix<C> {
    fn from(matrix: PlainMatrix<C>) -> Self {
        Matrix::Plain(matrix)
    }
}

impl<C: Control> From<SegmentedMatrix<C>> for Matrix<C> {
    fn from(matrix: SegmentedMatrix<C>) -> Self {
        Matrix::Segmented(matrix)
    }
}
