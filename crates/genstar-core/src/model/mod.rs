//! Data model: attributes, coordinates, controls and distribution matrices.
//!
//! Everything here is built once and read-only afterwards, so it can be shared
//! across worker threads without synchronization.

pub mod attribute;
pub mod catalog;
pub mod control;
pub mod coordinate;
pub mod matrix;
pub mod segmented;

pub use attribute::{Attribute, AttributeId, AttributeKind, DataType, Value, ValueContent, ValueId};
pub use catalog::{AttributeSpec, Catalog, CatalogBuilder, DEFAULT_EMPTY_LABEL};
pub use control::Control;
pub use coordinate::Coordinate;
pub use matrix::{PlainMatrix, SurveyKind};
pub use segmented::{Matrix, SegmentedMatrix};
