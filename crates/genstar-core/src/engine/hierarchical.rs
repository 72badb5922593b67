//! # Hierarchical inference
//!
//! Combines members in an order derived from the [`DependencyGraph`], so the
//! matrices carrying a referent attribute are resolved before the matrices
//! carrying aggregates of it.
//!
//! A matrix whose aggregated attribute refers to an already allocated referent
//! is not folded through hooks. Its mass is redistributed instead: with
//! - `oControl` the mass of profiles some cell targets
//! - `mControl` the mass of profiles a cell targets (same hooks, referent value
//!   covered by the cell's aggregate value)
//! - `aControl` the cell's control, normalized over the cells that target at
//!   least one profile
//!
//! each targeted profile receives `p / mControl * aControl * oControl` and the
//! cell's values. The aggregate's empty value covers the referent values no
//! other aggregate value covers. Untargeted profiles keep their mass and get
//! the empty value of every attribute the matrix introduces, so total mass is
//! conserved. Other matrices are folded as in the independence hypothesis.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::engine::config::InferenceConfig;
use crate::engine::dependency_graph::DependencyGraph;
use crate::engine::errors::GenstarError;
use crate::engine::observer::{InferenceDiagnostics, InferenceObserver, StepKind, StepReport};
use crate::engine::profile::{self, FlatDistribution, FoldPlan, HookKey, Refinement, Unmatched};
use crate::model::attribute::{AttributeId, AttributeKind, ValueId};
use crate::model::catalog::Catalog;
use crate::model::control::Control;
use crate::model::coordinate::Coordinate;
use crate::model::matrix::{PlainMatrix, SurveyKind};
use crate::model::segmented::Matrix;

/// An aggregated dimension resolved through its allocated referent.
#[derive(Debug, Clone, Copy)]
struct AggregatedLink {
    aggregate: AttributeId,
    referent: AttributeId,
}

/// Dependency-graph-ordered, aggregation-aware combination.
#[derive(Debug, Default, Clone, Copy)]
pub struct HierarchicalHypothesis;

impl HierarchicalHypothesis {
    pub const NAME: &'static str = "hierarchical-hypothesis";

    pub fn dependency_graph<C: Control>(&self, matrix: &Matrix<C>) -> DependencyGraph {
        DependencyGraph::new(matrix)
    }

    /// Attribute order followed by the combination, component by component.
    pub fn exploration_order<C: Control>(&self, matrix: &Matrix<C>) -> Vec<AttributeId> {
        self.dependency_graph(matrix).full_exploration_order()
    }

    /// Order in which members are combined.
    ///
    /// Members carrying a referent (and no aggregate of it) come first, then
    /// members carrying an aggregate, then the rest. Within a group: more
    /// referent dimensions first, then earliest attribute in the exploration
    /// order, then size descending, then declaration order.
    pub fn combination_order<C: Control>(&self, matrix: &Matrix<C>) -> Vec<usize> {
        let exploration = self.exploration_order(matrix);
        let position: FxHashMap<AttributeId, usize> = exploration
            .iter()
            .enumerate()
            .map(|(i, a)| (*a, i))
            .collect();
        let catalog = matrix.catalog();
        let dimensions = matrix.dimensions();

        let is_referent = |a: AttributeId| {
            dimensions.iter().any(|b| {
                *b != a
                    && catalog
                        .attribute(*b)
                        .is_some_and(|x| !x.is_record() && x.referent() == Some(a))
            })
        };
        let is_aggregate = |a: AttributeId| {
            catalog.attribute(a).is_some_and(|x| {
                x.is_aggregated()
                    && x.referent()
                        .is_some_and(|r| r != a && matrix.has_dimension(r))
            })
        };

        let members = matrix.members();
        let mut order: Vec<usize> = (0..members.len()).collect();
        order.sort_by_key(|&i| {
            let dims = members[i].dimensions();
            let referents = dims.iter().filter(|a| is_referent(**a)).count();
            let phase = if dims.iter().any(|a| is_aggregate(*a)) {
                1
            } else if referents > 0 {
                0
            } else {
                2
            };
            let earliest = dims
                .iter()
                .filter_map(|a| position.get(a).copied())
                .min()
                .unwrap_or(usize::MAX);
            (
                phase,
                std::cmp::Reverse(referents),
                earliest,
                std::cmp::Reverse(members[i].len()),
                i,
            )
        });
        order
    }

    /// Infers the joint distribution over every dimension of `matrix`.
    pub fn infer<C: Control>(
        &self,
        matrix: &Matrix<C>,
        config: &InferenceConfig,
        observer: &mut dyn InferenceObserver,
    ) -> Result<(FlatDistribution, InferenceDiagnostics), GenstarError> {
        let config = config.validate()?;
        if matrix.kind() == Some(SurveyKind::LocalFrequencyTable) {
            return Err(GenstarError::IllegalArgument(format!(
                "hierarchical inference cannot start from the single local frequency table '{}'",
                matrix.label()
            )));
        }
        matrix.check_frequency_totals(config.sampler.epsilon, config.sampler.adjust_epsilon)?;

        let catalog: &Catalog = matrix.catalog();
        let members = matrix.members();
        let mut diagnostics = InferenceDiagnostics {
            strategy: Self::NAME,
            exploration_order: self.exploration_order(matrix),
            ..InferenceDiagnostics::default()
        };

        let refinements: Vec<Refinement> = matrix
            .dimensions()
            .iter()
            .filter_map(|a| {
                let attribute = catalog.attribute(*a)?;
                let referent = attribute.referent()?;
                (!attribute.is_record() && referent != *a && matrix.has_dimension(referent))
                    .then_some(Refinement {
                        aggregate: *a,
                        referent,
                    })
            })
            .collect();
        let plan = FoldPlan {
            catalog,
            unmatched: Unmatched::Drop,
            refinements,
            parallel: config.run_parallel(),
        };

        let mut dist = FlatDistribution::new();
        for (step, index) in self.combination_order(matrix).into_iter().enumerate() {
            let member = &members[index];
            observer.step_started(step, member.label());
            let (next, report) = if step == 0 {
                profile::seed(step, member)
            } else {
                let links = aggregated_links(catalog, &dist, member);
                if links.is_empty() {
                    profile::fold(step, &dist, member, &plan)?
                } else {
                    redistribute(step, &dist, member, &links, catalog, plan.parallel)?
                }
            };
            observer.step_finished(&report);
            diagnostics.steps.push(report);
            dist = next;
        }

        dist.check_coverage(matrix.dimensions())?;
        diagnostics.profile_count = dist.len();
        diagnostics.total_mass = dist.total_mass();

        #[cfg(feature = "tracing")]
        tracing::debug!(
            matrix = matrix.label(),
            profiles = diagnostics.profile_count,
            mass = diagnostics.total_mass,
            "hierarchical inference done"
        );

        Ok((dist, diagnostics))
    }
}

// Aggregated dimensions of `matrix` whose referent is allocated but absent
// from the matrix, and which are not allocated themselves.
fn aggregated_links<C: Control>(
    catalog: &Catalog,
    dist: &FlatDistribution,
    matrix: &PlainMatrix<C>,
) -> Vec<AggregatedLink> {
    matrix
        .dimensions()
        .iter()
        .filter_map(|a| {
            let attribute = catalog.attribute(*a)?;
            let referent = attribute.referent()?;
            let eligible = matches!(attribute.kind(), AttributeKind::Aggregated { .. })
                && referent != *a
                && dist.knows(referent)
                && !matrix.has_dimension(referent)
                && !dist.knows(*a);
            eligible.then_some(AggregatedLink {
                aggregate: *a,
                referent,
            })
        })
        .collect()
}

struct TargetCell {
    coordinate: Coordinate,
    control: f64,
    /// Referent values covered, one set per link.
    covered: SmallVec<[SmallVec<[ValueId; 4]>; 2]>,
}

impl TargetCell {
    fn targets(&self, profile: &Coordinate, links: &[AggregatedLink]) -> bool {
        links.iter().zip(&self.covered).all(|(link, covered)| {
            profile
                .value_of(link.referent)
                .is_some_and(|v| covered.contains(&v))
        })
    }
}

fn redistribute<C: Control>(
    index: usize,
    dist: &FlatDistribution,
    matrix: &PlainMatrix<C>,
    links: &[AggregatedLink],
    catalog: &Catalog,
    parallel: bool,
) -> Result<(FlatDistribution, StepReport), GenstarError> {
    let is_link = |a: AttributeId| links.iter().any(|l| l.aggregate == a);
    let hooks: Vec<AttributeId> = matrix
        .dimensions()
        .iter()
        .copied()
        .filter(|a| dist.knows(*a) && !is_link(*a))
        .collect();
    let introduced: Vec<AttributeId> = matrix
        .dimensions()
        .iter()
        .copied()
        .filter(|a| !dist.knows(*a))
        .collect();

    // Referent values no substantive aggregate value covers, per link. The
    // aggregate's empty value stands for them.
    let uncovered: Vec<SmallVec<[ValueId; 4]>> = links
        .iter()
        .map(|link| {
            let covered: FxHashSet<ValueId> = catalog
                .values_of(link.aggregate)
                .flat_map(|v| catalog.map_to_referent(v))
                .filter(|v| !v.is_empty())
                .collect();
            std::iter::once(ValueId::empty(link.referent))
                .chain(catalog.values_of(link.referent))
                .filter(|v| !covered.contains(v))
                .collect()
        })
        .collect();

    let raw = matrix.probabilities();
    let table_total: f64 = raw.iter().map(|(_, p)| p.max(0.0)).sum();
    let mut cells = Vec::new();
    if table_total > 0.0 {
        for (coordinate, p) in raw {
            if p <= 0.0 {
                continue;
            }
            let covered = links
                .iter()
                .zip(&uncovered)
                .map(|(link, uncovered)| match coordinate.value_of(link.aggregate) {
                    Some(v) if !v.is_empty() => catalog.map_to_referent(v),
                    _ => uncovered.clone(),
                })
                .collect();
            cells.push(TargetCell {
                coordinate,
                control: p / table_total,
                covered,
            });
        }
    }

    let hook_key = |c: &Coordinate| -> HookKey { c.project(|a| hooks.contains(&a)) };
    let mut by_hooks: FxHashMap<HookKey, Vec<usize>> = FxHashMap::default();
    for (i, cell) in cells.iter().enumerate() {
        by_hooks.entry(hook_key(&cell.coordinate)).or_default().push(i);
    }

    let mut o_control = 0.0;
    let mut m_control = vec![0.0; cells.len()];
    for (profile, p) in dist.iter() {
        let mut targeted = false;
        if let Some(group) = by_hooks.get(&hook_key(profile)) {
            for &i in group {
                if cells[i].targets(profile, links) {
                    m_control[i] += p;
                    targeted = true;
                }
            }
        }
        if targeted {
            o_control += p;
        }
    }
    // Cells that target no profile give their share back to the others.
    let a_total: f64 = cells
        .iter()
        .zip(&m_control)
        .filter(|(_, m)| **m > 0.0)
        .map(|(cell, _)| cell.control)
        .sum();

    #[cfg(feature = "tracing")]
    tracing::debug!(
        matrix = matrix.label(),
        aggregates = links.len(),
        o_control,
        a_total,
        "redistributing through referent attributes"
    );

    let (next, untargeted) = profile::expand_profiles(dist, parallel, |profile, p, out| {
        let mut targeted = false;
        if let Some(group) = by_hooks.get(&hook_key(profile)) {
            for &i in group {
                let cell = &cells[i];
                if m_control[i] <= 0.0 || !cell.targets(profile, links) {
                    continue;
                }
                let probability = p / m_control[i] * (cell.control / a_total) * o_control;
                if probability <= 0.0 {
                    continue;
                }
                out.push((profile.extend(cell.coordinate.values().iter().copied())?, probability));
                targeted = true;
            }
        }
        if targeted {
            Ok(true)
        } else {
            profile::unmatched(profile, p, &introduced, Unmatched::FillEmpty, out)
        }
    })?;

    let mut report_hooks = hooks;
    report_hooks.extend(links.iter().map(|l| l.referent));
    report_hooks.sort_unstable();
    report_hooks.dedup();

    let report = StepReport {
        index,
        matrix: matrix.label().to_string(),
        kind: StepKind::Aggregated,
        hooks: report_hooks,
        introduced,
        profiles_in: dist.len(),
        profiles_out: next.len(),
        mass_in: dist.total_mass(),
        mass_out: next.total_mass(),
        untargeted,
    };
    Ok((next, report))
}
