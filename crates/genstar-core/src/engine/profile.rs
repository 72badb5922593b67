//! # Flat distribution and profile folding
//!
//! A [`FlatDistribution`] maps profiles (coordinates over the attributes
//! allocated so far) to probabilities. Inference grows it one matrix at a time:
//!
//! - **seed**: the first matrix's cells, normalized
//! - **fold**: every profile is split over the matrix cells sharing its hook
//!   values, each cell receiving `p(profile) * control / hook total`
//!
//! Each profile expands independently of the others, so folds run as a map
//! over profiles followed by a reduce of the partial maps; with the `parallel`
//! feature the map runs on the rayon pool.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::engine::errors::GenstarError;
use crate::engine::observer::{StepKind, StepReport};
use crate::model::attribute::{AttributeId, ValueId};
use crate::model::catalog::Catalog;
use crate::model::control::Control;
use crate::model::coordinate::{Coordinate, INLINE_VALUES};
use crate::model::matrix::{Dimensions, PlainMatrix};

/// Profile to probability map over the attributes allocated so far.
#[derive(Debug, Clone, Default)]
pub struct FlatDistribution {
    known: Dimensions,
    profiles: FxHashMap<Coordinate, f64>,
}

impl FlatDistribution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a distribution; probabilities of repeated coordinates add up.
    pub fn from_profiles(profiles: impl IntoIterator<Item = (Coordinate, f64)>) -> Self {
        let mut dist = Self::new();
        for (coordinate, p) in profiles {
            dist.add(coordinate, p);
        }
        dist
    }

    fn from_map(profiles: FxHashMap<Coordinate, f64>) -> Self {
        let mut known: Dimensions = profiles.keys().flat_map(|c| c.attributes()).collect();
        known.sort_unstable();
        known.dedup();
        Self { known, profiles }
    }

    pub fn add(&mut self, coordinate: Coordinate, probability: f64) {
        for attribute in coordinate.attributes() {
            if let Err(at) = self.known.binary_search(&attribute) {
                self.known.insert(at, attribute);
            }
        }
        *self.profiles.entry(coordinate).or_insert(0.0) += probability;
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn get(&self, coordinate: &Coordinate) -> Option<f64> {
        self.profiles.get(coordinate).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Coordinate, f64)> + '_ {
        self.profiles.iter().map(|(c, p)| (c, *p))
    }

    /// Attributes carried by at least one profile.
    pub fn known_attributes(&self) -> &[AttributeId] {
        &self.known
    }

    pub fn knows(&self, attribute: AttributeId) -> bool {
        self.known.binary_search(&attribute).is_ok()
    }

    pub fn total_mass(&self) -> f64 {
        self.profiles.values().sum()
    }

    /// Fails unless every profile carries a value for every `expected` attribute.
    pub fn check_coverage(&self, expected: &[AttributeId]) -> Result<(), GenstarError> {
        if self.profiles.is_empty() {
            return Err(GenstarError::malformed_profiles(0, 0, 0.0, expected.len()));
        }
        let malformed = self
            .profiles
            .keys()
            .filter(|c| !expected.iter().all(|a| c.has_attribute(*a)))
            .count();
        if malformed == 0 {
            return Ok(());
        }
        let average = self.profiles.keys().map(Coordinate::len).sum::<usize>() as f64
            / self.profiles.len() as f64;
        Err(GenstarError::malformed_profiles(
            malformed,
            self.profiles.len(),
            average,
            expected.len(),
        ))
    }

    /// Profiles by increasing probability, ties broken by coordinate.
    pub fn into_sorted(self) -> Vec<(Coordinate, f64)> {
        let mut profiles: Vec<(Coordinate, f64)> = self.profiles.into_iter().collect();
        profiles.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        profiles
    }
}

pub(crate) type HookKey = SmallVec<[ValueId; INLINE_VALUES]>;

/// Matrix cells sharing one projection on the hook attributes.
#[derive(Debug, Default)]
pub(crate) struct HookGroup {
    pub(crate) cells: Vec<(Coordinate, f64)>,
    pub(crate) total: f64,
}

/// Matrix cells grouped by their hook values.
#[derive(Debug)]
pub(crate) struct HookIndex {
    hooks: Dimensions,
    groups: FxHashMap<HookKey, HookGroup>,
}

impl HookIndex {
    pub(crate) fn build(
        cells: impl IntoIterator<Item = (Coordinate, f64)>,
        hooks: &[AttributeId],
    ) -> Self {
        let hooks: Dimensions = hooks.iter().copied().collect();
        let mut groups: FxHashMap<HookKey, HookGroup> = FxHashMap::default();
        for (coordinate, p) in cells {
            if p <= 0.0 {
                continue;
            }
            let key = coordinate.project(|a| hooks.binary_search(&a).is_ok());
            let group = groups.entry(key).or_default();
            group.total += p;
            group.cells.push((coordinate, p));
        }
        Self { hooks, groups }
    }

    pub(crate) fn group(&self, profile: &Coordinate) -> Option<&HookGroup> {
        let key = profile.project(|a| self.hooks.binary_search(&a).is_ok());
        self.groups.get(&key).filter(|g| g.total > 0.0)
    }
}

/// How a fold treats profiles with no matching matrix cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Unmatched {
    Drop,
    /// Extend with the empty value of every introduced attribute.
    FillEmpty,
}

/// A known aggregated attribute restricting the cells a profile may join:
/// the cell's `referent` value must be one `aggregate` maps onto.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Refinement {
    pub(crate) aggregate: AttributeId,
    pub(crate) referent: AttributeId,
}

pub(crate) struct FoldPlan<'a> {
    pub(crate) catalog: &'a Catalog,
    pub(crate) unmatched: Unmatched,
    pub(crate) refinements: Vec<Refinement>,
    pub(crate) parallel: bool,
}

/// Seeds a distribution from a matrix's normalized cells.
pub(crate) fn seed<C: Control>(index: usize, matrix: &PlainMatrix<C>) -> (FlatDistribution, StepReport) {
    let cells = matrix.probabilities();
    let total: f64 = cells.iter().map(|(_, p)| p.max(0.0)).sum();
    let dist = if total > 0.0 {
        FlatDistribution::from_profiles(
            cells
                .into_iter()
                .filter(|(_, p)| *p > 0.0)
                .map(|(c, p)| (c, p / total)),
        )
    } else {
        FlatDistribution::new()
    };
    let report = StepReport {
        index,
        matrix: matrix.label().to_string(),
        kind: StepKind::Seed,
        hooks: Vec::new(),
        introduced: matrix.dimensions().to_vec(),
        profiles_in: 0,
        profiles_out: dist.len(),
        mass_in: dist.total_mass(),
        mass_out: dist.total_mass(),
        untargeted: 0,
    };
    (dist, report)
}

/// Folds `matrix` into `dist` through the attributes they share.
pub(crate) fn fold<C: Control>(
    index: usize,
    dist: &FlatDistribution,
    matrix: &PlainMatrix<C>,
    plan: &FoldPlan<'_>,
) -> Result<(FlatDistribution, StepReport), GenstarError> {
    let (hooks, introduced): (Vec<AttributeId>, Vec<AttributeId>) = matrix
        .dimensions()
        .iter()
        .copied()
        .partition(|a| dist.knows(*a));
    let index_cells = HookIndex::build(matrix.probabilities(), &hooks);
    let refinements: Vec<Refinement> = plan
        .refinements
        .iter()
        .copied()
        .filter(|r| dist.knows(r.aggregate) && introduced.contains(&r.referent))
        .collect();

    #[cfg(feature = "tracing")]
    tracing::debug!(
        matrix = matrix.label(),
        hooks = hooks.len(),
        introduced = introduced.len(),
        profiles = dist.len(),
        "folding matrix"
    );

    let (next, untargeted) = expand_profiles(dist, plan.parallel, |profile, p, out| {
        let Some(group) = index_cells.group(profile) else {
            return unmatched(profile, p, &introduced, plan.unmatched, out);
        };
        let allowed = |cell: &Coordinate| {
            refinements.iter().all(|r| {
                match (profile.value_of(r.aggregate), cell.value_of(r.referent)) {
                    (Some(aggregate), Some(referent)) if !aggregate.is_empty() => {
                        plan.catalog.map_to_referent(aggregate).contains(&referent)
                    }
                    _ => true,
                }
            })
        };
        let summed: f64 = if refinements.is_empty() {
            group.total
        } else {
            group
                .cells
                .iter()
                .filter(|(c, _)| allowed(c))
                .map(|(_, q)| q)
                .sum()
        };
        if summed <= 0.0 {
            return unmatched(profile, p, &introduced, plan.unmatched, out);
        }
        for (cell, q) in group.cells.iter().filter(|(c, _)| allowed(c)) {
            let probability = p * q / summed;
            if probability <= 0.0 {
                continue;
            }
            out.push((profile.extend(cell.values().iter().copied())?, probability));
        }
        Ok(true)
    })?;

    let report = StepReport {
        index,
        matrix: matrix.label().to_string(),
        kind: StepKind::Fold,
        hooks,
        introduced,
        profiles_in: dist.len(),
        profiles_out: next.len(),
        mass_in: dist.total_mass(),
        mass_out: next.total_mass(),
        untargeted,
    };
    Ok((next, report))
}

/// Handles a profile no cell matched. Returns `Ok(false)`: the profile was not targeted.
pub(crate) fn unmatched(
    profile: &Coordinate,
    p: f64,
    introduced: &[AttributeId],
    policy: Unmatched,
    out: &mut Vec<(Coordinate, f64)>,
) -> Result<bool, GenstarError> {
    if policy == Unmatched::FillEmpty && p > 0.0 {
        let filled = profile.extend(introduced.iter().map(|a| ValueId::empty(*a)))?;
        out.push((filled, p));
    }
    Ok(false)
}

/// Expands every profile with `expand` and merges the results.
///
/// `expand` pushes the profile's successors and reports whether a matrix cell
/// targeted it. Returns the merged distribution and the untargeted count.
pub(crate) fn expand_profiles<F>(
    dist: &FlatDistribution,
    parallel: bool,
    expand: F,
) -> Result<(FlatDistribution, usize), GenstarError>
where
    F: Fn(&Coordinate, f64, &mut Vec<(Coordinate, f64)>) -> Result<bool, GenstarError> + Sync,
{
    type Partial = (FxHashMap<Coordinate, f64>, usize);

    let step = |mut acc: Partial, (profile, p): (&Coordinate, f64)| -> Result<Partial, GenstarError> {
        let mut out = Vec::new();
        if !expand(profile, p, &mut out)? {
            acc.1 += 1;
        }
        for (coordinate, q) in out {
            *acc.0.entry(coordinate).or_insert(0.0) += q;
        }
        Ok(acc)
    };

    let profiles: Vec<(&Coordinate, f64)> = dist.iter().collect();

    #[cfg(feature = "parallel")]
    {
        if parallel {
            let (map, untargeted) = profiles
                .into_par_iter()
                .try_fold(|| (FxHashMap::default(), 0), step)
                .try_reduce(|| (FxHashMap::default(), 0), |a, b| Ok(merge(a, b)))?;
            return Ok((FlatDistribution::from_map(map), untargeted));
        }
    }
    #[cfg(not(feature = "parallel"))]
    let _ = parallel;

    let (map, untargeted) = profiles
        .into_iter()
        .try_fold((FxHashMap::default(), 0), step)?;
    Ok((FlatDistribution::from_map(map), untargeted))
}

fn merge(
    (mut left, left_count): (FxHashMap<Coordinate, f64>, usize),
    (mut right, right_count): (FxHashMap<Coordinate, f64>, usize),
) -> (FxHashMap<Coordinate, f64>, usize) {
    if left.len() < right.len() {
        std::mem::swap(&mut left, &mut right);
    }
    for (coordinate, p) in right {
        *left.entry(coordinate).or_insert(0.0) += p;
    }
    (left, left_count + right_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::attribute::DataType;
    use crate::model::catalog::AttributeSpec;
    use crate::model::matrix::SurveyKind;
    use std::sync::Arc;

    fn catalog() -> (Arc<Catalog>, AttributeId, AttributeId) {
        let mut b = Catalog::builder();
        let age = b
            .add(AttributeSpec::unique("Age", DataType::String, ["young", "old"]))
            .unwrap();
        let sex = b
            .add(AttributeSpec::unique("Sex", DataType::String, ["M", "F"]))
            .unwrap();
        (b.build(), age, sex)
    }

    fn one_dimension(cat: &Arc<Catalog>, name: &str, id: AttributeId, cells: &[(&str, f64)]) -> PlainMatrix<f64> {
        let mut m = PlainMatrix::new(cat.clone(), name, SurveyKind::GlobalFrequencyTable, [id]).unwrap();
        for (label, p) in cells {
            m.add(cat.coordinate(&[(name, *label)]).unwrap(), *p).unwrap();
        }
        m
    }

    #[test]
    fn seed_normalizes_counts() {
        let (cat, age, _) = catalog();
        let mut m = PlainMatrix::<u64>::new(cat.clone(), "age", SurveyKind::ContingencyTable, [age]).unwrap();
        m.add(cat.coordinate(&[("Age", "young")]).unwrap(), 3).unwrap();
        m.add(cat.coordinate(&[("Age", "old")]).unwrap(), 1).unwrap();
        let (dist, report) = seed(0, &m);
        let young = cat.coordinate(&[("Age", "young")]).unwrap();
        assert_eq!(dist.get(&young), Some(0.75));
        assert_eq!(report.kind, StepKind::Seed);
        assert!((report.mass_out - 1.0).abs() < 1e-12);
    }

    #[test]
    fn fold_without_hooks_is_a_product() {
        let (cat, age, sex) = catalog();
        let (dist, _) = seed(0, &one_dimension(&cat, "Age", age, &[("young", 0.6), ("old", 0.4)]));
        let plan = FoldPlan {
            catalog: &cat,
            unmatched: Unmatched::Drop,
            refinements: Vec::new(),
            parallel: false,
        };
        let sexes = one_dimension(&cat, "Sex", sex, &[("M", 0.5), ("F", 0.5)]);
        let (next, report) = fold(1, &dist, &sexes, &plan).unwrap();
        assert_eq!(next.len(), 4);
        let old_f = cat.coordinate(&[("Age", "old"), ("Sex", "F")]).unwrap();
        assert!((next.get(&old_f).unwrap() - 0.2).abs() < 1e-12);
        assert!(report.hooks.is_empty());
        assert_eq!(report.introduced, vec![sex]);
        assert!(next.check_coverage(&[age, sex]).is_ok());
    }

    #[test]
    fn unmatched_profiles_are_dropped_or_filled() {
        let (cat, age, sex) = catalog();
        let (dist, _) = seed(0, &one_dimension(&cat, "Age", age, &[("young", 0.6), ("old", 0.4)]));
        let mut joint = PlainMatrix::new(cat.clone(), "joint", SurveyKind::GlobalFrequencyTable, [age, sex]).unwrap();
        joint
            .add(cat.coordinate(&[("Age", "young"), ("Sex", "M")]).unwrap(), 1.0)
            .unwrap();

        let mut plan = FoldPlan {
            catalog: &cat,
            unmatched: Unmatched::Drop,
            refinements: Vec::new(),
            parallel: false,
        };
        let (dropped, report) = fold(1, &dist, &joint, &plan).unwrap();
        assert_eq!(dropped.len(), 1);
        assert_eq!(report.untargeted, 1);
        assert!((report.dropped_mass() - 0.4).abs() < 1e-12);

        plan.unmatched = Unmatched::FillEmpty;
        let (filled, _) = fold(1, &dist, &joint, &plan).unwrap();
        let old_unknown = Coordinate::new([
            cat.find_value(age, "old").unwrap(),
            ValueId::empty(sex),
        ])
        .unwrap();
        assert_eq!(filled.get(&old_unknown), Some(0.4));
        assert!((filled.total_mass() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn coverage_reports_malformed_share() {
        let (cat, age, sex) = catalog();
        let dist = FlatDistribution::from_profiles([
            (cat.coordinate(&[("Age", "young"), ("Sex", "M")]).unwrap(), 0.5),
            (cat.coordinate(&[("Age", "old")]).unwrap(), 0.5),
        ]);
        match dist.check_coverage(&[age, sex]) {
            Err(GenstarError::DistributionCreation {
                malformed_percent,
                average_attributes,
                expected_attributes,
            }) => {
                assert_eq!(malformed_percent, 50);
                assert!((average_attributes - 1.5).abs() < 1e-12);
                assert_eq!(expected_attributes, 2);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(FlatDistribution::new().check_coverage(&[age]).is_err());
    }

    #[test]
    fn sorted_profiles_are_deterministic() {
        let (cat, _, _) = catalog();
        let dist = FlatDistribution::from_profiles([
            (cat.coordinate(&[("Age", "young")]).unwrap(), 0.5),
            (cat.coordinate(&[("Age", "old")]).unwrap(), 0.25),
            (cat.coordinate(&[("Sex", "M")]).unwrap(), 0.25),
        ]);
        let sorted = dist.into_sorted();
        assert_eq!(sorted[2].1, 0.5);
        assert!(sorted[0].0 < sorted[1].0);
    }
}
