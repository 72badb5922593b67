//! Controls: numeric weights attached to matrix cells.

use std::fmt::Debug;
use std::ops::Add;

/// Tolerance on the total of a frequency table.
pub const FREQUENCY_EPSILON: f64 = 1e-6;

/// Relaxed tolerance, accepted only with explicit clamping of the total.
pub const FREQUENCY_ADJUST_EPSILON: f64 = 1e-3;

/// Absorbs the rounding of `1 - sum` so a sum of exactly `1 - tolerance` is accepted.
pub(crate) const ROUNDING_SLACK: f64 = 1e-12;

/// A numeric weight (count or frequency) attached to a coordinate.
///
/// `zero()` is the identity for aggregation and `one()` the reference total of
/// a frequency table.
pub trait Control:
    Copy + Add<Output = Self> + PartialOrd + Debug + Send + Sync + 'static
{
    fn zero() -> Self;

    fn one() -> Self;

    fn as_f64(self) -> f64;

    /// Sum of an iterator of controls, starting from `zero()`.
    fn total<I: IntoIterator<Item = Self>>(controls: I) -> Self {
        controls.into_iter().fold(Self::zero(), |acc, c| acc + c)
    }
}

/// Frequencies.
impl Control for f64 {
    fn zero() -> Self {
        0.0
    }

    fn one() -> Self {
        1.0
    }

    fn as_f64(self) -> f64 {
        self
    }
}

/// Contingency counts.
impl Control for u64 {
    fn zero() -> Self {
        0
    }

    fn one() -> Self {
        1
    }

    fn as_f64(self) -> f64 {
        self as f64
    }
}
