//! Synthetic population generation from a sampler.

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::RngCore;

use crate::engine::errors::GenstarError;
use crate::engine::sampler::Sampler;
use crate::model::attribute::{AttributeId, ValueId};
use crate::model::catalog::Catalog;
use crate::model::coordinate::Coordinate;

/// Drawn individuals; each entity is the coordinate it was drawn as.
#[derive(Debug, Clone)]
pub struct SyntheticPopulation {
    catalog: Arc<Catalog>,
    dimensions: Vec<AttributeId>,
    entities: Vec<Coordinate>,
}

impl SyntheticPopulation {
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn dimensions(&self) -> &[AttributeId] {
        &self.dimensions
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entities(&self) -> &[Coordinate] {
        &self.entities
    }

    pub fn iter(&self) -> impl Iterator<Item = &Coordinate> {
        self.entities.iter()
    }

    /// Count of entities per value of `attribute`, the empty value included.
    pub fn value_frequencies(&self, attribute: AttributeId) -> BTreeMap<ValueId, usize> {
        let mut counts = BTreeMap::new();
        for value in self.entities.iter().filter_map(|e| e.value_of(attribute)) {
            *counts.entry(value).or_insert(0) += 1;
        }
        counts
    }

    /// Count of entities carrying every value of `partial`.
    pub fn count(&self, partial: &[ValueId]) -> usize {
        self.entities
            .iter()
            .filter(|e| e.contains_all(partial))
            .count()
    }
}

/// Draws `size` individuals from `sampler`.
pub fn generate_population<S>(
    sampler: &S,
    size: usize,
    rng: &mut dyn RngCore,
) -> Result<SyntheticPopulation, GenstarError>
where
    S: Sampler + ?Sized,
{
    let entities = sampler.draw_n(size, rng)?;

    #[cfg(feature = "tracing")]
    tracing::info!(
        size,
        distinct_profiles = sampler.len(),
        "generated synthetic population"
    );

    Ok(SyntheticPopulation {
        catalog: Arc::clone(sampler.catalog()),
        dimensions: sampler.dimensions().to_vec(),
        entities,
    })
}
