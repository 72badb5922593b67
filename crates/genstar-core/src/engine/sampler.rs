//! # Cumulative distribution sampler
//!
//! [`DistributionSampler`] indexes a finalized distribution as two parallel
//! sequences, coordinates and running probability sums, and draws by inverse
//! CDF: a uniform value is located in the cumulative sums by binary search.
//!
//! The random source is always passed in by the caller. A sampler holds no
//! generator, so one sampler can serve many threads, each with its own
//! generator, and seeded generators give reproducible draws.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use rustc_hash::FxHashMap;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::engine::config::SamplerConfig;
use crate::engine::errors::GenstarError;
use crate::engine::profile::FlatDistribution;
use crate::model::attribute::AttributeId;
use crate::model::catalog::Catalog;
use crate::model::control::ROUNDING_SLACK;
use crate::model::coordinate::Coordinate;

/// Draws coordinates with probability proportional to a distribution.
pub trait Sampler: Send + Sync {
    fn catalog(&self) -> &Arc<Catalog>;

    /// Attributes every drawn coordinate carries.
    fn dimensions(&self) -> &[AttributeId];

    /// Number of indexed coordinates.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn draw(&self, rng: &mut dyn RngCore) -> Result<Coordinate, GenstarError>;

    /// `n` independent draws.
    fn draw_n(&self, n: usize, rng: &mut dyn RngCore) -> Result<Vec<Coordinate>, GenstarError> {
        (0..n).map(|_| self.draw(rng)).collect()
    }

    /// One row per indexed coordinate, with a header naming the attributes
    /// and a trailing `Probability` column.
    fn to_csv(&self, separator: &str) -> String;
}

/// Inverse-CDF sampler over a finalized distribution.
#[derive(Debug, Clone)]
pub struct DistributionSampler {
    catalog: Arc<Catalog>,
    dimensions: Vec<AttributeId>,
    keys: Vec<Coordinate>,
    cumulative: Vec<f64>,
    /// First position of each coordinate in `keys`.
    index: FxHashMap<Coordinate, usize>,
    upper_bound: f64,
    config: SamplerConfig,
}

impl DistributionSampler {
    pub fn new(catalog: Arc<Catalog>, distribution: FlatDistribution) -> Result<Self, GenstarError> {
        Self::with_config(catalog, distribution, SamplerConfig::default())
    }

    pub fn with_config(
        catalog: Arc<Catalog>,
        distribution: FlatDistribution,
        config: SamplerConfig,
    ) -> Result<Self, GenstarError> {
        let dimensions = distribution.known_attributes().to_vec();
        Self::from_pairs(catalog, dimensions, distribution.into_sorted(), config)
    }

    /// Indexes `(coordinate, probability)` pairs in the given order.
    ///
    /// Zero probabilities are skipped. The sum must be within `epsilon` of 1,
    /// or within `adjust_epsilon` in which case draws are restricted to
    /// `[0, sum]`.
    pub fn from_pairs(
        catalog: Arc<Catalog>,
        dimensions: impl IntoIterator<Item = AttributeId>,
        pairs: impl IntoIterator<Item = (Coordinate, f64)>,
        config: SamplerConfig,
    ) -> Result<Self, GenstarError> {
        let config = config.validate()?;
        let mut dimensions: Vec<AttributeId> = dimensions.into_iter().collect();
        dimensions.sort_unstable();
        dimensions.dedup();

        let mut keys = Vec::new();
        let mut cumulative = Vec::new();
        let mut index = FxHashMap::default();
        let mut sum = 0.0;
        for (coordinate, p) in pairs {
            if !p.is_finite() || p < 0.0 {
                return Err(GenstarError::IllegalArgument(format!(
                    "probability of {} is {}",
                    coordinate, p
                )));
            }
            if p == 0.0 {
                continue;
            }
            sum += p;
            index.entry(coordinate.clone()).or_insert(keys.len());
            keys.push(coordinate);
            cumulative.push(sum);
        }

        let drift = (sum - 1.0).abs();
        if keys.is_empty() || drift > config.adjust_epsilon + ROUNDING_SLACK {
            return Err(GenstarError::SamplerConfiguration { sum });
        }
        if drift > config.epsilon {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                sum,
                "probability sum drifts from 1, clamping sampler upper bound"
            );
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            coordinates = keys.len(),
            upper_bound = sum,
            "distribution sampler ready"
        );

        Ok(Self {
            catalog,
            dimensions,
            keys,
            cumulative,
            index,
            upper_bound: sum,
            config,
        })
    }

    /// Largest uniform value a draw may use.
    pub fn upper_bound(&self) -> f64 {
        self.upper_bound
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Indexed coordinates with their individual probability.
    pub fn iter(&self) -> impl Iterator<Item = (&Coordinate, f64)> + '_ {
        self.keys
            .iter()
            .enumerate()
            .map(move |(i, k)| (k, self.probability_at(i)))
    }

    pub fn probability(&self, coordinate: &Coordinate) -> Option<f64> {
        self.index.get(coordinate).map(|&i| self.probability_at(i))
    }

    pub fn contains(&self, coordinate: &Coordinate) -> bool {
        self.index.contains_key(coordinate)
    }

    fn probability_at(&self, index: usize) -> f64 {
        let previous = if index == 0 {
            0.0
        } else {
            self.cumulative[index - 1]
        };
        self.cumulative[index] - previous
    }

    fn locate(&self, drawn: f64) -> Result<&Coordinate, GenstarError> {
        let index = self.cumulative.partition_point(|c| *c < drawn);
        self.keys
            .get(index)
            .ok_or_else(|| GenstarError::SamplerDrawFailure {
                drawn,
                lowest: self.cumulative.first().copied().unwrap_or(0.0),
                highest: self.cumulative.last().copied().unwrap_or(0.0),
            })
    }

    fn draw_chunk(&self, seed: u64, count: usize) -> Result<Vec<Coordinate>, GenstarError> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count).map(|_| self.draw(&mut rng)).collect()
    }
}

impl Sampler for DistributionSampler {
    fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    fn dimensions(&self) -> &[AttributeId] {
        &self.dimensions
    }

    fn len(&self) -> usize {
        self.keys.len()
    }

    fn draw(&self, rng: &mut dyn RngCore) -> Result<Coordinate, GenstarError> {
        let drawn = loop {
            let candidate: f64 = rng.random();
            if candidate <= self.upper_bound {
                break candidate;
            }
        };
        self.locate(drawn).cloned()
    }

    /// Splits the draws into batches, each with its own generator seeded from
    /// `rng`; the result only depends on `rng`, not on the thread count.
    fn draw_n(&self, n: usize, rng: &mut dyn RngCore) -> Result<Vec<Coordinate>, GenstarError> {
        let chunk = self.config.draw_chunk_size;
        let batches: Vec<(u64, usize)> = (0..n.div_ceil(chunk))
            .map(|i| (rng.next_u64(), chunk.min(n - i * chunk)))
            .collect();

        #[cfg(feature = "parallel")]
        {
            if self.config.parallel {
                let drawn: Vec<Vec<Coordinate>> = batches
                    .into_par_iter()
                    .map(|(seed, count)| self.draw_chunk(seed, count))
                    .collect::<Result<_, _>>()?;
                return Ok(drawn.into_iter().flatten().collect());
            }
        }

        let mut drawn = Vec::with_capacity(n);
        for (seed, count) in batches {
            drawn.extend(self.draw_chunk(seed, count)?);
        }
        Ok(drawn)
    }

    fn to_csv(&self, separator: &str) -> String {
        let mut out = String::new();
        let header: Vec<&str> = self
            .dimensions
            .iter()
            .map(|d| self.catalog.name_of(*d))
            .collect();
        out.push_str(&header.join(separator));
        out.push_str(separator);
        out.push_str("Probability\n");
        for (coordinate, p) in self.iter() {
            let row: Vec<&str> = self
                .dimensions
                .iter()
                .map(|d| {
                    coordinate
                        .value_of(*d)
                        .map_or("", |v| self.catalog.label(v))
                })
                .collect();
            out.push_str(&row.join(separator));
            out.push_str(separator);
            out.push_str(&p.to_string());
            out.push('\n');
        }
        out
    }
}
