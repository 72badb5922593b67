//! # Marginals for calibration
//!
//! Extracts, from a control matrix, the marginal totals an iterative
//! proportional fitting consumer needs to adjust a seed table. Control and
//! seed may describe the same concepts at different granularities; each
//! control descriptor is then transposed into the seed's value space through
//! the referent mappings of the catalog.
//!
//! - **Simple margin**: the targeted control attribute is a seed dimension too
//! - **Complex margin**: the seed holds a linked attribute instead, so every
//!   entry carries both the control and the transposed seed descriptor

use std::collections::BTreeMap;
use std::sync::Arc;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::engine::config::MarginConfig;
use crate::engine::errors::GenstarError;
use crate::model::attribute::{AttributeId, ValueId};
use crate::model::catalog::Catalog;
use crate::model::control::Control;
use crate::model::matrix::PlainMatrix;
use crate::model::segmented::Matrix;

/// One marginal total.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MarginEntry {
    /// Side values plus the targeted value, in control space.
    pub control_descriptor: Vec<ValueId>,
    /// The same descriptor transposed into the seed's value space.
    pub seed_descriptor: Vec<ValueId>,
    pub target: ValueId,
    /// Control mass of the descriptor, normalized by the control's reference total.
    pub control: f64,
}

/// Marginal totals of one targeted control attribute.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Margin {
    Simple {
        attribute: AttributeId,
        entries: Vec<MarginEntry>,
    },
    Complex {
        control_attribute: AttributeId,
        seed_attribute: AttributeId,
        entries: Vec<MarginEntry>,
    },
}

impl Margin {
    pub fn control_dimension(&self) -> AttributeId {
        match self {
            Margin::Simple { attribute, .. } => *attribute,
            Margin::Complex {
                control_attribute, ..
            } => *control_attribute,
        }
    }

    pub fn seed_dimension(&self) -> AttributeId {
        match self {
            Margin::Simple { attribute, .. } => *attribute,
            Margin::Complex { seed_attribute, .. } => *seed_attribute,
        }
    }

    pub fn entries(&self) -> &[MarginEntry] {
        match self {
            Margin::Simple { entries, .. } | Margin::Complex { entries, .. } => entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn is_simple(&self) -> bool {
        matches!(self, Margin::Simple { .. })
    }

    /// Summed control mass of every entry.
    pub fn total(&self) -> f64 {
        self.entries().iter().map(|e| e.control).sum()
    }

    /// Control mass of the entry whose control descriptor is `descriptor`.
    pub fn control_of(&self, descriptor: &[ValueId]) -> Option<f64> {
        let mut key = descriptor.to_vec();
        key.sort_unstable();
        self.entries()
            .iter()
            .find(|e| e.control_descriptor == key)
            .map(|e| e.control)
    }
}

/// Builds seed-compliant marginals out of a control matrix.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarginalsProcessor {
    config: MarginConfig,
}

impl MarginalsProcessor {
    pub fn new(config: MarginConfig) -> Result<Self, GenstarError> {
        Ok(Self {
            config: config.validate()?,
        })
    }

    pub fn config(&self) -> &MarginConfig {
        &self.config
    }

    /// One margin per root control attribute linked to a seed dimension.
    ///
    /// Fails with [`GenstarError::IllegalArgument`] when a seed dimension has
    /// no counterpart in the control, [`GenstarError::MarginTransposition`]
    /// when a descriptor has no image in the seed, and
    /// [`GenstarError::MarginConsistency`] when a margin's mass strays from 1
    /// beyond the configured tolerance.
    pub fn build_compliant_marginals<C: Control, S: Control>(
        &self,
        control: &Matrix<C>,
        seed: &PlainMatrix<S>,
    ) -> Result<Vec<Margin>, GenstarError> {
        let catalog = control.catalog();
        if !Arc::ptr_eq(catalog, seed.catalog()) {
            return Err(GenstarError::IllegalArgument(
                "control and seed matrices must share one catalog".into(),
            ));
        }
        check_attribute_match(catalog, control, seed)?;

        // control attribute -> seed attribute; a later seed dimension wins
        let mut control_to_seed: BTreeMap<AttributeId, AttributeId> = BTreeMap::new();
        for s in seed.dimensions() {
            for c in control.dimensions() {
                if catalog.is_linked(*c, *s) {
                    control_to_seed.insert(*c, *s);
                }
            }
        }
        if control_to_seed.is_empty() {
            return Err(GenstarError::IllegalArgument(
                "seed attributes do not match any attribute of the control distribution".into(),
            ));
        }

        #[cfg(feature = "tracing")]
        tracing::info!(
            control = control.label(),
            seed = seed.label(),
            matched = control_to_seed.len(),
            "estimating seed marginals from control matrix"
        );

        let reference = control.reference_total();
        if reference <= 0.0 {
            return Err(GenstarError::IllegalArgument(format!(
                "control matrix '{}' holds no mass",
                control.label()
            )));
        }
        let transposer = Transposer::new(catalog, seed);

        let mut margins = Vec::new();
        for (&target, &seed_attribute) in &control_to_seed {
            if !catalog.attr(target).is_root() {
                continue;
            }
            let side: Vec<AttributeId> = control_to_seed
                .keys()
                .copied()
                .filter(|a| *a != target)
                .collect();
            let descriptors: Vec<(Vec<ValueId>, ValueId)> = side_combinations(catalog, &side)
                .into_iter()
                .flat_map(|combo| {
                    catalog.values_of(target).map(move |v| {
                        let mut descriptor = combo.clone();
                        descriptor.push(v);
                        descriptor.sort_unstable();
                        (descriptor, v)
                    })
                })
                .collect();

            let entry = |(descriptor, value): (Vec<ValueId>, ValueId)| -> Result<Option<MarginEntry>, GenstarError> {
                let mass = control.total(&descriptor)? / reference;
                if mass <= 0.0 {
                    return Ok(None);
                }
                let seed_descriptor = transposer.transpose(&descriptor)?;
                Ok(Some(MarginEntry {
                    control_descriptor: descriptor,
                    seed_descriptor,
                    target: value,
                    control: mass,
                }))
            };

            let entries = collect_entries(descriptors, self.config.parallel, entry)?;

            let margin = if seed_attribute == target {
                Margin::Simple {
                    attribute: target,
                    entries,
                }
            } else {
                Margin::Complex {
                    control_attribute: target,
                    seed_attribute,
                    entries,
                }
            };

            let total = margin.total();
            #[cfg(feature = "tracing")]
            tracing::info!(
                size = margin.len(),
                control_dimension = catalog.name_of(target),
                seed_dimension = catalog.name_of(seed_attribute),
                sum_of_controls = total,
                "created marginals"
            );

            if !margin.is_empty() && (total - 1.0).abs() > self.config.tolerance {
                #[cfg(feature = "tracing")]
                for e in margin.entries() {
                    tracing::debug!(descriptor = ?e.control_descriptor, control = e.control, "inconsistent margin entry");
                }
                return Err(GenstarError::MarginConsistency {
                    control_dimension: catalog.name_of(target).to_string(),
                    seed_dimension: catalog.name_of(seed_attribute).to_string(),
                    total,
                });
            }
            margins.push(margin);
        }
        Ok(margins)
    }
}

/// Builds seed-compliant marginals with the default tolerance.
pub fn build_compliant_marginals<C: Control, S: Control>(
    control: &Matrix<C>,
    seed: &PlainMatrix<S>,
    parallel: bool,
) -> Result<Vec<Margin>, GenstarError> {
    MarginalsProcessor::new(MarginConfig {
        parallel,
        ..MarginConfig::default()
    })?
    .build_compliant_marginals(control, seed)
}

// Every seed dimension must be a control dimension, the referent of the
// control, or the referent of some control dimension.
fn check_attribute_match<C: Control, S: Control>(
    catalog: &Catalog,
    control: &Matrix<C>,
    seed: &PlainMatrix<S>,
) -> Result<(), GenstarError> {
    let unmatched: Vec<&str> = seed
        .dimensions()
        .iter()
        .filter(|s| {
            !(control.has_dimension(**s)
                || control.has_dimension(catalog.referent_of(**s))
                || control
                    .dimensions()
                    .iter()
                    .any(|c| catalog.attr(*c).referent() == Some(**s)))
        })
        .map(|s| catalog.name_of(*s))
        .collect();
    if unmatched.is_empty() {
        return Ok(());
    }
    let names = |dims: &[AttributeId]| {
        dims.iter()
            .map(|a| catalog.name_of(*a))
            .collect::<Vec<_>>()
            .join(", ")
    };
    Err(GenstarError::IllegalArgument(format!(
        "cannot build marginals: seed attributes [{}] have no match in control [{}] (seed: [{}])",
        unmatched.join(", "),
        names(control.dimensions()),
        names(seed.dimensions())
    )))
}

fn collect_entries<F>(
    descriptors: Vec<(Vec<ValueId>, ValueId)>,
    parallel: bool,
    entry: F,
) -> Result<Vec<MarginEntry>, GenstarError>
where
    F: Fn((Vec<ValueId>, ValueId)) -> Result<Option<MarginEntry>, GenstarError> + Send + Sync,
{
    #[cfg(feature = "parallel")]
    {
        if parallel {
            let entries = descriptors
                .into_par_iter()
                .map(entry)
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(entries.into_iter().flatten().collect());
        }
    }
    #[cfg(not(feature = "parallel"))]
    let _ = parallel;

    let entries = descriptors
        .into_iter()
        .map(entry)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries.into_iter().flatten().collect())
}

fn side_combinations(catalog: &Catalog, side: &[AttributeId]) -> Vec<Vec<ValueId>> {
    let mut combinations = vec![Vec::new()];
    for attribute in side {
        combinations = combinations
            .into_iter()
            .flat_map(|combo: Vec<ValueId>| {
                catalog.values_of(*attribute).map(move |v| {
                    let mut next = combo.clone();
                    next.push(v);
                    next
                })
            })
            .collect();
    }
    combinations
}

/// Maps control values into the seed's value space.
struct Transposer<'a> {
    catalog: &'a Catalog,
    seed_dimensions: &'a [AttributeId],
    label: &'a str,
}

impl<'a> Transposer<'a> {
    fn new<S: Control>(catalog: &'a Catalog, seed: &'a PlainMatrix<S>) -> Self {
        Self {
            catalog,
            seed_dimensions: seed.dimensions(),
            label: seed.label(),
        }
    }

    fn has(&self, attribute: AttributeId) -> bool {
        self.seed_dimensions.binary_search(&attribute).is_ok()
    }

    /// Seed dimension aggregating `referent`, if any.
    fn seed_child_of(&self, referent: AttributeId) -> Option<AttributeId> {
        self.seed_dimensions.iter().copied().find(|s| {
            let attribute = self.catalog.attr(*s);
            !attribute.is_record() && attribute.referent() == Some(referent)
        })
    }

    fn transpose(&self, descriptor: &[ValueId]) -> Result<Vec<ValueId>, GenstarError> {
        let mut out = Vec::with_capacity(descriptor.len());
        for &value in descriptor {
            let attribute = value.attribute;
            if self.has(attribute) {
                out.push(value);
                continue;
            }
            let referent = self.catalog.referent_of(attribute);
            if referent == attribute {
                if let Some(child) = self.seed_child_of(attribute) {
                    let mapped = self.catalog.map_from_referent(child, value);
                    out.extend(self.checked(value, mapped)?);
                }
                continue;
            }
            if self.has(referent) {
                let mapped = self.catalog.map_to_referent(value);
                out.extend(self.checked(value, mapped)?);
            }
            if let Some(child) = self.seed_child_of(referent) {
                let mapped = self
                    .catalog
                    .map_to_referent(value)
                    .into_iter()
                    .filter(|r| !r.is_empty())
                    .flat_map(|r| self.catalog.map_from_referent(child, r));
                out.extend(self.checked(value, mapped)?);
            }
        }
        out.sort_unstable();
        out.dedup();
        Ok(out)
    }

    fn checked(
        &self,
        from: ValueId,
        mapped: impl IntoIterator<Item = ValueId>,
    ) -> Result<Vec<ValueId>, GenstarError> {
        let mapped: Vec<ValueId> = mapped.into_iter().collect();
        let lost = mapped.is_empty()
            || mapped
                .iter()
                .any(|v| !self.has(v.attribute) || (v.is_empty() && !from.is_empty()));
        if lost {
            return Err(GenstarError::MarginTransposition(format!(
                "matrix '{}' has no value matching {}",
                self.label,
                self.catalog.describe(from)
            )));
        }
        Ok(mapped)
    }
}
