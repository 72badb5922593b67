//! The inference engine.
//!
//! This module provides:
//! - **errors**: the error taxonomy of the crate
//! - **config**: inference, sampler and margin settings
//! - **observer**: step reports and the progress observer seam
//! - **profile**: flat distributions and the parallel fold shared by strategies
//! - **independence** / **hierarchical**: the two inference strategies
//! - **dependency_graph**: attribute co-occurrence and aggregation graph
//! - **sampler** / **population**: weighted drawing and population generation

pub mod config;
pub mod dependency_graph;
pub mod errors;
pub mod hierarchical;
pub mod independence;
pub mod observer;
pub mod population;
pub mod profile;
pub mod sampler;

use crate::engine::config::InferenceConfig;
use crate::engine::errors::GenstarError;
use crate::engine::hierarchical::HierarchicalHypothesis;
use crate::engine::independence::IndependenceHypothesis;
use crate::engine::observer::{InferenceDiagnostics, InferenceObserver, NoopObserver};
use crate::engine::profile::FlatDistribution;
use crate::engine::sampler::DistributionSampler;
use crate::model::control::Control;
use crate::model::segmented::Matrix;

/// How the members of a matrix are combined into one joint distribution.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InferenceStrategy {
    /// Size-ordered folds under conditional independence given the hooks.
    #[default]
    IndependenceHypothesis,
    /// Dependency-graph order with redistribution through referents.
    Hierarchical,
}

impl InferenceStrategy {
    pub fn name(self) -> &'static str {
        match self {
            InferenceStrategy::IndependenceHypothesis => IndependenceHypothesis::NAME,
            InferenceStrategy::Hierarchical => HierarchicalHypothesis::NAME,
        }
    }

    /// Runs the strategy, reporting each step to `observer`.
    pub fn infer<C: Control>(
        self,
        matrix: &Matrix<C>,
        config: &InferenceConfig,
        observer: &mut dyn InferenceObserver,
    ) -> Result<(FlatDistribution, InferenceDiagnostics), GenstarError> {
        match self {
            InferenceStrategy::IndependenceHypothesis => {
                IndependenceHypothesis.infer(matrix, config, observer)
            }
            InferenceStrategy::Hierarchical => HierarchicalHypothesis.infer(matrix, config, observer),
        }
    }
}

/// Infers a sampler over every dimension of `matrix` with default settings.
pub fn infer_distribution_sampler<C: Control>(
    matrix: &Matrix<C>,
    strategy: InferenceStrategy,
) -> Result<DistributionSampler, GenstarError> {
    infer_distribution_sampler_with_config(matrix, strategy, &InferenceConfig::default())
}

pub fn infer_distribution_sampler_with_config<C: Control>(
    matrix: &Matrix<C>,
    strategy: InferenceStrategy,
    config: &InferenceConfig,
) -> Result<DistributionSampler, GenstarError> {
    let (sampler, _) = infer_distribution_with_diagnostics(matrix, strategy, config, &mut NoopObserver)?;
    Ok(sampler)
}

/// Infers a sampler and returns the per-step diagnostics of the run.
pub fn infer_distribution_with_diagnostics<C: Control>(
    matrix: &Matrix<C>,
    strategy: InferenceStrategy,
    config: &InferenceConfig,
    observer: &mut dyn InferenceObserver,
) -> Result<(DistributionSampler, InferenceDiagnostics), GenstarError> {
    let (dist, diagnostics) = strategy.infer(matrix, config, observer)?;

    #[cfg(feature = "tracing")]
    tracing::info!(
        strategy = strategy.name(),
        matrix = matrix.label(),
        profiles = diagnostics.profile_count,
        dropped_mass = diagnostics.dropped_mass(),
        "inferred joint distribution"
    );

    let sampler = DistributionSampler::with_config(matrix.catalog().clone(), dist, config.sampler)?;
    Ok((sampler, diagnostics))
}
