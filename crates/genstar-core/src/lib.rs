//! # Genstar core - synthetic population generation
//!
//! Infers a joint distribution over survey attributes from partial,
//! overlapping contingency tables, then draws synthetic individuals from it.
//!
//! ## Architecture
//!
//! - **model**: attribute catalog, coordinates, controls, plain and segmented matrices
//! - **engine**: inference strategies, dependency graph, sampler, population generator
//! - **calibration**: seed-compliant marginals for iterative proportional fitting
//!
//! ## Usage
//!
//! ```rust
//! use genstar_core::{
//!     infer_distribution_sampler, AttributeSpec, Catalog, DataType, InferenceStrategy,
//!     Matrix, PlainMatrix, Sampler, SegmentedMatrix, SurveyKind,
//! };
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let mut builder = Catalog::builder();
//! let age = builder.add(AttributeSpec::unique("Age", DataType::String, ["young", "old"]))?;
//! let sex = builder.add(AttributeSpec::unique("Sex", DataType::String, ["M", "F"]))?;
//! let catalog = builder.build();
//!
//! let mut ages = PlainMatrix::new(catalog.clone(), "age", SurveyKind::GlobalFrequencyTable, [age])?;
//! ages.add(catalog.coordinate(&[("Age", "young")])?, 0.6)?;
//! ages.add(catalog.coordinate(&[("Age", "old")])?, 0.4)?;
//! let mut sexes = PlainMatrix::new(catalog.clone(), "sex", SurveyKind::GlobalFrequencyTable, [sex])?;
//! sexes.add(catalog.coordinate(&[("Sex", "M")])?, 0.5)?;
//! sexes.add(catalog.coordinate(&[("Sex", "F")])?, 0.5)?;
//!
//! let matrix: Matrix = SegmentedMatrix::new("census", vec![ages, sexes])?.into();
//! let sampler = infer_distribution_sampler(&matrix, InferenceStrategy::IndependenceHypothesis)?;
//! let individual = sampler.draw(&mut StdRng::seed_from_u64(7))?;
//! assert_eq!(individual.len(), 2);
//! # Ok::<(), genstar_core::GenstarError>(())
//! ```

#![forbid(unsafe_code)]

pub mod calibration;
pub mod engine;
pub mod model;

pub use calibration::{build_compliant_marginals, Margin, MarginEntry, MarginalsProcessor};
pub use engine::config::{InferenceConfig, MarginConfig, SamplerConfig};
pub use engine::dependency_graph::DependencyGraph;
pub use engine::errors::GenstarError;
pub use engine::hierarchical::HierarchicalHypothesis;
pub use engine::independence::IndependenceHypothesis;
pub use engine::observer::{
    InferenceDiagnostics, InferenceObserver, NoopObserver, RecordingObserver, StepKind,
    StepReport, TracingObserver,
};
pub use engine::population::{generate_population, SyntheticPopulation};
pub use engine::profile::FlatDistribution;
pub use engine::sampler::{DistributionSampler, Sampler};
pub use engine::{
    infer_distribution_sampler, infer_distribution_sampler_with_config,
    infer_distribution_with_diagnostics, InferenceStrategy,
};
pub use model::{
    Attribute, AttributeId, AttributeKind, AttributeSpec, Catalog, CatalogBuilder, Control,
    Coordinate, DataType, Matrix, PlainMatrix, SegmentedMatrix, SurveyKind, Value, ValueContent,
    ValueId, DEFAULT_EMPTY_LABEL,
};
