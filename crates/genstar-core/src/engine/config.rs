//! Run configuration for inference, sampling and marginal extraction.

use crate::engine::errors::GenstarError;
use crate::model::control::{FREQUENCY_ADJUST_EPSILON, FREQUENCY_EPSILON};

/// Configuration of a [`DistributionSampler`](crate::engine::sampler::DistributionSampler).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SamplerConfig {
    /// Accepted drift of the probability sum from 1 without any adjustment.
    pub epsilon: f64,
    /// Drift accepted by clamping the usable upper bound to the sum.
    pub adjust_epsilon: f64,
    /// Draw batches on the rayon pool when the `parallel` feature is enabled.
    pub parallel: bool,
    /// Draws per independently seeded batch.
    pub draw_chunk_size: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            epsilon: FREQUENCY_EPSILON,
            adjust_epsilon: FREQUENCY_ADJUST_EPSILON,
            parallel: true,
            draw_chunk_size: 1024,
        }
    }
}

impl SamplerConfig {
    pub fn validate(self) -> Result<Self, GenstarError> {
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(GenstarError::IllegalArgument(
                "sampler: epsilon must be finite and > 0".into(),
            ));
        }
        if !(self.adjust_epsilon.is_finite() && self.adjust_epsilon >= self.epsilon) {
            return Err(GenstarError::IllegalArgument(
                "sampler: adjust_epsilon must be finite and >= epsilon".into(),
            ));
        }
        if self.draw_chunk_size == 0 {
            return Err(GenstarError::IllegalArgument(
                "sampler: draw_chunk_size must be > 0".into(),
            ));
        }
        Ok(self)
    }
}

/// Configuration of a distribution inference run.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InferenceConfig {
    /// Fold profiles with a parallel map + reduce when the `parallel` feature is enabled.
    pub parallel: bool,
    /// Configuration of the sampler built from the inferred distribution.
    pub sampler: SamplerConfig,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            sampler: SamplerConfig::default(),
        }
    }
}

impl InferenceConfig {
    pub fn validate(self) -> Result<Self, GenstarError> {
        self.sampler.validate()?;
        Ok(self)
    }

    /// Effective parallelism, accounting for the `parallel` feature.
    pub(crate) fn run_parallel(&self) -> bool {
        cfg!(feature = "parallel") && self.parallel
    }
}

/// Configuration of marginal extraction for calibration.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MarginConfig {
    /// Accepted deviation of a margin's total mass from 1.
    pub tolerance: f64,
    pub parallel: bool,
}

impl Default for MarginConfig {
    fn default() -> Self {
        Self {
            tolerance: 0.01,
            parallel: false,
        }
    }
}

impl MarginConfig {
    pub fn validate(self) -> Result<Self, GenstarError> {
        if !(self.tolerance.is_finite() && self.tolerance >= 0.0) {
            return Err(GenstarError::IllegalArgument(
                "margins: tolerance must be finite and >= 0".into(),
            ));
        }
        Ok(self)
    }
}
