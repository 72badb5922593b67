//! # Independence-hypothesis inference
//!
//! Members of a segmented matrix are combined from the largest (most
//! coordinates) to the smallest. The first one seeds the distribution; each
//! following one is folded in through its hook attributes, assuming the
//! attributes it introduces are independent of everything else given the hooks.
//! Profiles whose hook values the matrix does not know are dropped.

use crate::engine::config::InferenceConfig;
use crate::engine::errors::GenstarError;
use crate::engine::observer::{InferenceDiagnostics, InferenceObserver};
use crate::engine::profile::{self, FlatDistribution, FoldPlan, Unmatched};
use crate::model::control::Control;
use crate::model::segmented::Matrix;

/// Size-ordered combination under conditional independence.
#[derive(Debug, Default, Clone, Copy)]
pub struct IndependenceHypothesis;

impl IndependenceHypothesis {
    pub const NAME: &'static str = "independence-hypothesis";

    /// Order in which members are combined: size descending, then declaration.
    pub fn combination_order<C: Control>(&self, matrix: &Matrix<C>) -> Vec<usize> {
        let members = matrix.members();
        let mut order: Vec<usize> = (0..members.len()).collect();
        order.sort_by_key(|&i| (std::cmp::Reverse(members[i].len()), i));
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
        matrix.check_frequency_totals(config.sampler.epsilon, config.sampler.adjust_epsilon)?;
        let members = matrix.members();
        let mut diagnostics = InferenceDiagnostics {
            strategy: Self::NAME,
            ..InferenceDiagnostics::default()
        };

        let plan = FoldPlan {
            catalog: matrix.catalog(),
            unmatched: Unmatched::Drop,
            refinements: Vec::new(),
            parallel: config.run_parallel(),
        };

        let mut dist = FlatDistribution::new();
        for (step, index) in self.combination_order(matrix).into_iter().enumerate() {
            let member = &members[index];
            observer.step_started(step, member.label());
            let (next, report) = if step == 0 {
                profile::seed(step, member)
            } else {
                profile::fold(step, &dist, member, &plan)?
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
            "independence-hypothesis inference done"
        );

        Ok((dist, diagnostics))
    }
}
