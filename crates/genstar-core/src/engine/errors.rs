//! Error types for distribution inference, sampling and calibration.

use thiserror::Error;

/// Errors that can occur while building matrices, inferring a joint
/// distribution, configuring a sampler or extracting marginals.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in the future without breaking changes.
///
/// All setup-time validation is fail-fast: no partially built matrix, graph or
/// sampler is handed back when one of these is returned.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum GenstarError {
    /// Null/empty input, or control and seed attribute sets that cannot be matched.
    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    /// Attribute or value declaration rejected by the catalog.
    #[error("catalog error: {0}")]
    Catalog(String),

    /// Coordinate value not assignable to its attribute, or two values for one attribute.
    #[error("matrix coordinate error: {0}")]
    MatrixCoordinate(String),

    /// `add` on a coordinate that already carries a control.
    #[error("duplicate coordinate: {0}")]
    DuplicateCoordinate(String),

    /// Combined profiles do not all cover the full dimension set.
    #[error(
        "some profiles ({malformed_percent}%) do not cover all {expected_attributes} attributes \
         (average attribute count = {average_attributes:.3})"
    )]
    DistributionCreation {
        malformed_percent: u32,
        average_attributes: f64,
        expected_attributes: usize,
    },

    /// Distribution handed to a sampler sums too far from 1.
    #[error("sum of probabilities for this sampler is not equal to 1 (sum = {sum})")]
    SamplerConfiguration { sum: f64 },

    /// Cumulative index exhausted without a match. Internal invariant violation.
    #[error("sampler failed to draw a coordinate: drawn {drawn} outside bounds [{lowest} : {highest}]")]
    SamplerDrawFailure { drawn: f64, lowest: f64, highest: f64 },

    /// A margin's total mass deviates from its expected total beyond tolerance.
    #[error("inconsistent margin {control_dimension} -> {seed_dimension}: total mass {total}")]
    MarginConsistency {
        control_dimension: String,
        seed_dimension: String,
        total: f64,
    },

    /// A control descriptor maps to values the seed matrix does not know.
    #[error("margin transposition error: {0}")]
    MarginTransposition(String),

    /// Internal error (programmer error, not user error).
    #[error("internal error: {0}")]
    Internal(String),
}

impl GenstarError {
    /// Builds a [`GenstarError::DistributionCreation`] from raw profile counts.
    pub(crate) fn malformed_profiles(
        malformed: usize,
        total: usize,
        average_attributes: f64,
        expected_attributes: usize,
    ) -> Self {
        let ratio = if total == 0 {
            1.0
        } else {
            malformed as f64 / total as f64
        };
        GenstarError::DistributionCreation {
            malformed_percent: (ratio * 100.0).round() as u32,
            average_attributes,
            expected_attributes,
        }
    }
}
