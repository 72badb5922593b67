//! # Plain distribution matrix
//!
//! A [`PlainMatrix`] is one contingency table: a fixed set of dimensions and a
//! map from [`Coordinate`] to [`Control`]. Every coordinate it stores is
//! compliant: its attributes are dimensions of the matrix and its values
//! belong to their attribute's domain.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::engine::errors::GenstarError;
use crate::model::attribute::{AttributeId, ValueId};
use crate::model::catalog::Catalog;
use crate::model::control::{Control, ROUNDING_SLACK};
use crate::model::coordinate::{Coordinate, INLINE_VALUES};

/// What the controls of a matrix mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SurveyKind {
    /// Conditional frequencies: each conditioning slice sums to 1.
    LocalFrequencyTable,
    /// Joint frequencies: the whole table sums to 1.
    GlobalFrequencyTable,
    /// Raw counts.
    ContingencyTable,
    /// Individual records, one count each.
    Sample,
}

impl SurveyKind {
    pub fn is_frequency(self) -> bool {
        matches!(
            self,
            SurveyKind::LocalFrequencyTable | SurveyKind::GlobalFrequencyTable
        )
    }
}

/// Dimension set stored in attribute order.
pub type Dimensions = SmallVec<[AttributeId; INLINE_VALUES]>;

/// One contingency table over a fixed attribute set.
#[derive(Debug, Clone)]
pub struct PlainMatrix<C: Control = f64> {
    label: String,
    kind: SurveyKind,
    dimensions: Dimensions,
    catalog: Arc<Catalog>,
    cells: FxHashMap<Coordinate, C>,
}

impl<C: Control> PlainMatrix<C> {
    /// Creates an empty matrix over `dimensions`.
    pub fn new(
        catalog: Arc<Catalog>,
        label: impl Into<String>,
        kind: SurveyKind,
        dimensions: impl IntoIterator<Item = AttributeId>,
    ) -> Result<Self, GenstarError> {
        let label = label.into();
        let mut dims: Dimensions = dimensions.into_iter().collect();
        if dims.is_empty() {
            return Err(GenstarError::IllegalArgument(format!(
                "matrix '{}' needs at least one dimension",
                label
            )));
        }
        dims.sort_unstable();
        if dims.windows(2).any(|w| w[0] == w[1]) {
            return Err(GenstarError::IllegalArgument(format!(
                "matrix '{}' declares a dimension twice",
                label
            )));
        }
        if let Some(unknown) = dims.iter().find(|d| catalog.attribute(**d).is_none()) {
            return Err(GenstarError::IllegalArgument(format!(
                "matrix '{}' uses attribute {:?} unknown to the catalog",
                label, unknown
            )));
        }
        Ok(Self {
            label,
            kind,
            dimensions: dims,
            catalog,
            cells: FxHashMap::default(),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> SurveyKind {
        self.kind
    }

    pub fn dimensions(&self) -> &[AttributeId] {
        &self.dimensions
    }

    pub fn has_dimension(&self, attribute: AttributeId) -> bool {
        self.dimensions.binary_search(&attribute).is_ok()
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Number of coordinates carrying a control.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Coordinate, C)> + '_ {
        self.cells.iter().map(|(k, v)| (k, *v))
    }

    /// Every attribute of `coordinate` is a dimension and every value belongs
    /// to its attribute's domain (the empty value included).
    pub fn is_compliant(&self, coordinate: &Coordinate) -> bool {
        coordinate
            .values()
            .iter()
            .all(|v| self.has_dimension(v.attribute) && self.catalog.contains_value(*v))
    }

    fn ensure_compliant(&self, coordinate: &Coordinate) -> Result<(), GenstarError> {
        if self.is_compliant(coordinate) {
            return Ok(());
        }
        Err(GenstarError::MatrixCoordinate(format!(
            "coordinate {} is not compliant with matrix '{}' ({})",
            self.describe(coordinate),
            self.label,
            self.dimension_names().join(" x ")
        )))
    }

    /// Inserts a control; fails if the coordinate already has one.
    pub fn add(&mut self, coordinate: Coordinate, control: C) -> Result<(), GenstarError> {
        self.ensure_compliant(&coordinate)?;
        if self.cells.contains_key(&coordinate) {
            return Err(GenstarError::DuplicateCoordinate(format!(
                "{} already set in matrix '{}'",
                self.describe(&coordinate),
                self.label
            )));
        }
        self.cells.insert(coordinate, control);
        Ok(())
    }

    /// Inserts or overwrites a control, returning the previous one.
    pub fn set(&mut self, coordinate: Coordinate, control: C) -> Result<Option<C>, GenstarError> {
        self.ensure_compliant(&coordinate)?;
        Ok(self.cells.insert(coordinate, control))
    }

    /// Control of an exact coordinate.
    pub fn control(&self, coordinate: &Coordinate) -> Option<C> {
        self.cells.get(coordinate).copied()
    }

    /// Controls of every coordinate that contains all of `partial`.
    pub fn get(&self, partial: &[ValueId]) -> Vec<C> {
        self.matching(partial).map(|(_, c)| c).collect()
    }

    /// Coordinates (with their control) that contain all of `partial`.
    pub fn matching<'a>(
        &'a self,
        partial: &'a [ValueId],
    ) -> impl Iterator<Item = (&'a Coordinate, C)> + 'a {
        self.cells
            .iter()
            .filter(move |(k, _)| k.contains_all(partial))
            .map(|(k, v)| (k, *v))
    }

    /// Aggregated control over every coordinate containing `partial`.
    pub fn total(&self, partial: &[ValueId]) -> C {
        C::total(self.matching(partial).map(|(_, c)| c))
    }

    pub fn grand_total(&self) -> C {
        C::total(self.cells.values().copied())
    }

    /// Share of the grand total held by coordinates containing `partial`.
    pub fn frequency(&self, partial: &[ValueId]) -> f64 {
        let grand = self.grand_total().as_f64();
        if grand <= 0.0 {
            return 0.0;
        }
        self.total(partial).as_f64() / grand
    }

    /// Whether `values` can be looked up here: all their attributes are dimensions.
    pub fn covers(&self, values: &[ValueId]) -> bool {
        values.iter().all(|v| self.has_dimension(v.attribute))
    }

    /// Cell probabilities: frequency tables as given, counts divided by their total.
    pub fn probabilities(&self) -> Vec<(Coordinate, f64)> {
        let scale = if self.kind.is_frequency() {
            1.0
        } else {
            let total = self.grand_total().as_f64();
            if total > 0.0 {
                1.0 / total
            } else {
                1.0
            }
        };
        self.cells
            .iter()
            .map(|(k, v)| (k.clone(), v.as_f64() * scale))
            .collect()
    }

    /// Checks that a global frequency table sums to one.
    ///
    /// Returns the usable total: exactly the sum when within `epsilon`, the sum
    /// clamped when within `adjust_epsilon`, an error beyond.
    pub fn check_frequency_total(
        &self,
        epsilon: f64,
        adjust_epsilon: f64,
    ) -> Result<f64, GenstarError> {
        let total = self.grand_total().as_f64();
        let drift = (total - 1.0).abs();
        if drift <= epsilon {
            return Ok(total);
        }
        if drift <= adjust_epsilon + ROUNDING_SLACK {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                matrix = %self.label,
                total,
                "frequency table total drifts from 1, clamping"
            );
            return Ok(total);
        }
        Err(GenstarError::IllegalArgument(format!(
            "frequency table '{}' sums to {} instead of 1",
            self.label, total
        )))
    }

    pub fn dimension_names(&self) -> Vec<&str> {
        self.dimensions
            .iter()
            .map(|d| self.catalog.name_of(*d))
            .collect()
    }

    fn describe(&self, coordinate: &Coordinate) -> String {
        let parts: Vec<String> = coordinate
            .values()
            .iter()
            .map(|v| self.catalog.describe(*v))
            .collect();
        format!("[{}]", parts.join(", "))
    }
}
