//! # Attribute catalog
//!
//! The catalog is the arena owning every [`Attribute`] of a run. Attributes
//! refer to their referent by [`AttributeId`], so the hierarchy never forms
//! ownership cycles; a referent must be declared before the attributes that
//! point to it, which keeps the hierarchy acyclic by construction.
//!
//! Referent mapping is what reconciles aggregated and disaggregated data:
//! - [`Catalog::map_to_referent`] sends a value onto its referent's domain
//! - [`Catalog::map_from_referent`] goes the other way, towards an aggregate

use std::sync::Arc;

use rustc_hash::FxHashMap;
use smallvec::{smallvec, SmallVec};

use crate::engine::errors::GenstarError;
use crate::model::attribute::{
    parse_ranges, parse_unique, Attribute, AttributeId, AttributeKind, DataType, Value,
    ValueContent, ValueId,
};
use crate::model::coordinate::Coordinate;

/// Label given to the empty value when the declaration does not name one.
pub const DEFAULT_EMPTY_LABEL: &str = "NA";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpecShape {
    Unique,
    Range,
    Record,
    Aggregated,
}

/// Declaration of one attribute, consumed by [`CatalogBuilder::add`].
#[derive(Debug, Clone)]
pub struct AttributeSpec {
    name: String,
    data_type: DataType,
    shape: SpecShape,
    labels: Vec<String>,
    referent: Option<AttributeId>,
    mapping: Vec<(String, Vec<String>)>,
    empty_label: Option<String>,
}

impl AttributeSpec {
    fn new(name: impl Into<String>, data_type: DataType, shape: SpecShape) -> Self {
        Self {
            name: name.into(),
            data_type,
            shape,
            labels: Vec::new(),
            referent: None,
            mapping: Vec::new(),
            empty_label: None,
        }
    }

    /// Discrete attribute.
    pub fn unique<I, S>(name: impl Into<String>, data_type: DataType, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut spec = Self::new(name, data_type, SpecShape::Unique);
        spec.labels = labels.into_iter().map(Into::into).collect();
        spec
    }

    /// Ranged attribute; labels are parsed into bounds.
    pub fn range<I, S>(name: impl Into<String>, data_type: DataType, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut spec = Self::new(name, data_type, SpecShape::Range);
        spec.labels = labels.into_iter().map(Into::into).collect();
        spec
    }

    /// Bookkeeping attribute holding a single value.
    pub fn record(name: impl Into<String>, data_type: DataType, label: impl Into<String>) -> Self {
        let mut spec = Self::new(name, data_type, SpecShape::Record);
        spec.labels = vec![label.into()];
        spec
    }

    /// Aggregate of `referent`: each aggregated label lists the referent labels it covers.
    pub fn aggregated<I, K, V, S>(
        name: impl Into<String>,
        data_type: DataType,
        referent: AttributeId,
        mapping: I,
    ) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut spec = Self::new(name, data_type, SpecShape::Aggregated);
        spec.referent = Some(referent);
        spec.mapping = mapping
            .into_iter()
            .map(|(k, vs)| (k.into(), vs.into_iter().map(Into::into).collect()))
            .collect();
        spec.labels = spec.mapping.iter().map(|(k, _)| k.clone()).collect();
        spec
    }

    /// Links a unique, range or record attribute to a referent; values
    /// correspond by label.
    pub fn with_referent(mut self, referent: AttributeId) -> Self {
        self.referent = Some(referent);
        self
    }

    pub fn with_empty_label(mut self, label: impl Into<String>) -> Self {
        self.empty_label = Some(label.into());
        self
    }
}

/// Incremental construction of a [`Catalog`].
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    attributes: Vec<Attribute>,
    by_name: FxHashMap<String, AttributeId>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and registers an attribute declaration.
    pub fn add(&mut self, spec: AttributeSpec) -> Result<AttributeId, GenstarError> {
        if spec.name.trim().is_empty() {
            return Err(GenstarError::Catalog("attribute name cannot be empty".into()));
        }
        if self.by_name.contains_key(&spec.name) {
            return Err(GenstarError::Catalog(format!(
                "attribute '{}' is declared twice",
                spec.name
            )));
        }
        if let Some(referent) = spec.referent {
            if referent.0 as usize >= self.attributes.len() {
                return Err(GenstarError::Catalog(format!(
                    "attribute '{}' refers to undeclared attribute {:?}",
                    spec.name, referent
                )));
            }
        }
        if spec.labels.is_empty() {
            return Err(GenstarError::Catalog(format!(
                "attribute '{}' has an empty domain",
                spec.name
            )));
        }

        let labels: Vec<String> = match spec.shape {
            SpecShape::Record => spec.labels.iter().take(1).map(|l| l.trim().to_string()).collect(),
            _ => spec.labels.iter().map(|l| l.trim().to_string()).collect(),
        };
        for (i, label) in labels.iter().enumerate() {
            if labels[..i].contains(label) {
                return Err(GenstarError::Catalog(format!(
                    "attribute '{}' declares value '{}' twice",
                    spec.name, label
                )));
            }
        }
        let empty_label = spec
            .empty_label
            .clone()
            .unwrap_or_else(|| DEFAULT_EMPTY_LABEL.to_string());
        if labels.contains(&empty_label) {
            return Err(GenstarError::Catalog(format!(
                "attribute '{}' uses its empty label '{}' as a value",
                spec.name, empty_label
            )));
        }

        let contents = match (spec.shape, spec.data_type.is_numeric()) {
            (SpecShape::Range, _) | (SpecShape::Aggregated, true) => parse_ranges(&labels)?,
            _ => labels
                .iter()
                .map(|l| parse_unique(spec.data_type, l))
                .collect::<Result<Vec<_>, _>>()?,
        };

        let id = AttributeId(self.attributes.len() as u32);
        let kind = match spec.shape {
            SpecShape::Unique => AttributeKind::Unique,
            SpecShape::Range => AttributeKind::Range,
            SpecShape::Record => AttributeKind::Record,
            SpecShape::Aggregated => AttributeKind::Aggregated {
                mapping: self.resolve_mapping(&spec)?,
            },
        };

        let mut values = Vec::with_capacity(labels.len() + 1);
        values.push(Value::new(empty_label, ValueContent::Empty));
        values.extend(
            labels
                .into_iter()
                .zip(contents)
                .map(|(label, content)| Value::new(label, content)),
        );

        self.by_name.insert(spec.name.clone(), id);
        self.attributes.push(Attribute::new(
            id,
            spec.name,
            spec.data_type,
            kind,
            spec.referent,
            values,
        ));
        Ok(id)
    }

    fn resolve_mapping(
        &self,
        spec: &AttributeSpec,
    ) -> Result<FxHashMap<u32, SmallVec<[u32; 4]>>, GenstarError> {
        let referent_id = spec.referent.ok_or_else(|| {
            GenstarError::Catalog(format!(
                "aggregated attribute '{}' needs a referent attribute",
                spec.name
            ))
        })?;
        let referent = &self.attributes[referent_id.0 as usize];
        if referent.is_record() {
            return Err(GenstarError::Catalog(format!(
                "aggregated attribute '{}' cannot refer to record attribute '{}'",
                spec.name,
                referent.name()
            )));
        }

        let mut mapping = FxHashMap::default();
        for (slot, (_, referent_labels)) in spec.mapping.iter().enumerate() {
            let mut targets: SmallVec<[u32; 4]> = SmallVec::new();
            for label in referent_labels {
                let value = referent.find(label.trim()).ok_or_else(|| {
                    GenstarError::Catalog(format!(
                        "aggregated attribute '{}' maps onto unknown value '{}' of '{}'",
                        spec.name,
                        label,
                        referent.name()
                    ))
                })?;
                if !targets.contains(&value.index) {
                    targets.push(value.index);
                }
            }
            targets.sort_unstable();
            // Slot 0 is the empty value, declared values start at 1.
            mapping.insert(slot as u32 + 1, targets);
        }
        Ok(mapping)
    }

    pub fn build(self) -> Arc<Catalog> {
        Arc::new(Catalog {
            attributes: self.attributes,
            by_name: self.by_name,
        })
    }
}

/// Arena of all attributes known to a run. Immutable once built.
#[derive(Debug, Clone)]
pub struct Catalog {
    attributes: Vec<Attribute>,
    by_name: FxHashMap<String, AttributeId>,
}

impl Catalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::new()
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.iter()
    }

    pub fn attribute(&self, id: AttributeId) -> Option<&Attribute> {
        self.attributes.get(id.0 as usize)
    }

    pub fn attribute_by_name(&self, name: &str) -> Option<&Attribute> {
        self.by_name.get(name).and_then(|id| self.attribute(*id))
    }

    /// Attribute lookup for ids already validated against this catalog.
    pub(crate) fn attr(&self, id: AttributeId) -> &Attribute {
        &self.attributes[id.0 as usize]
    }

    pub fn name_of(&self, id: AttributeId) -> &str {
        self.attribute(id).map(|a| a.name()).unwrap_or("?")
    }

    pub fn value(&self, value: ValueId) -> Option<&Value> {
        self.attribute(value.attribute).and_then(|a| a.value(value))
    }

    pub fn label(&self, value: ValueId) -> &str {
        self.attribute(value.attribute)
            .map(|a| a.label_of(value.index))
            .unwrap_or("")
    }

    /// Whether `value` belongs to its attribute's domain (empty value included).
    pub fn contains_value(&self, value: ValueId) -> bool {
        self.attribute(value.attribute)
            .is_some_and(|a| a.contains(value))
    }

    /// Substantive values of `attribute`.
    pub fn values_of(&self, attribute: AttributeId) -> impl Iterator<Item = ValueId> + '_ {
        self.attribute(attribute).into_iter().flat_map(|a| a.values())
    }

    pub fn empty_value(&self, attribute: AttributeId) -> ValueId {
        ValueId::empty(attribute)
    }

    /// Referent of `attribute`; a root is its own referent.
    pub fn referent_of(&self, attribute: AttributeId) -> AttributeId {
        self.attribute(attribute)
            .and_then(|a| a.referent())
            .unwrap_or(attribute)
    }

    pub fn find_value(&self, attribute: AttributeId, label: &str) -> Option<ValueId> {
        self.attribute(attribute).and_then(|a| a.find(label))
    }

    /// Values of the referent attribute that correspond to `value`.
    ///
    /// - aggregated attribute: the mapped referent values
    /// - record attribute: the referent's empty value
    /// - otherwise: the referent value with the same content when the
    ///   referent's domain has one, the referent's empty value if not
    pub fn map_to_referent(&self, value: ValueId) -> SmallVec<[ValueId; 4]> {
        let Some(attribute) = self.attribute(value.attribute) else {
            return SmallVec::new();
        };
        let Some(referent_id) = attribute.referent().filter(|r| *r != attribute.id()) else {
            return smallvec![value];
        };
        let referent = self.attr(referent_id);
        match attribute.kind() {
            AttributeKind::Aggregated { mapping } => match mapping.get(&value.index) {
                Some(targets) if !targets.is_empty() => targets
                    .iter()
                    .map(|&index| ValueId {
                        attribute: referent_id,
                        index,
                    })
                    .collect(),
                _ => smallvec![referent.empty_value()],
            },
            AttributeKind::Record => smallvec![referent.empty_value()],
            AttributeKind::Unique | AttributeKind::Range => {
                match referent.find(attribute.label_of(value.index)) {
                    Some(found) => smallvec![found],
                    None => smallvec![referent.empty_value()],
                }
            }
        }
    }

    /// Values of `attribute` that correspond to `referent_value`, a value of
    /// `attribute`'s referent.
    pub fn map_from_referent(
        &self,
        attribute: AttributeId,
        referent_value: ValueId,
    ) -> SmallVec<[ValueId; 4]> {
        let Some(target) = self.attribute(attribute) else {
            return SmallVec::new();
        };
        if referent_value.attribute == attribute {
            return smallvec![referent_value];
        }
        if target.referent() != Some(referent_value.attribute) {
            return smallvec![target.empty_value()];
        }
        let found: SmallVec<[ValueId; 4]> = match target.kind() {
            AttributeKind::Aggregated { mapping } => {
                let mut slots: SmallVec<[u32; 4]> = mapping
                    .iter()
                    .filter(|(_, targets)| targets.contains(&referent_value.index))
                    .map(|(slot, _)| *slot)
                    .collect();
                slots.sort_unstable();
                slots
                    .into_iter()
                    .map(|index| ValueId { attribute, index })
                    .collect()
            }
            AttributeKind::Record => SmallVec::new(),
            AttributeKind::Unique | AttributeKind::Range => target
                .find(self.label(referent_value))
                .into_iter()
                .collect(),
        };
        if found.is_empty() {
            smallvec![target.empty_value()]
        } else {
            found
        }
    }

    /// Same attribute, one is the other's referent, or both share a referent.
    pub fn is_linked(&self, a: AttributeId, b: AttributeId) -> bool {
        let ra = self.referent_of(a);
        let rb = self.referent_of(b);
        a == b || ra == b || rb == a || ra == rb
    }

    /// Builds a coordinate from `(attribute name, value label)` pairs.
    pub fn coordinate(&self, cells: &[(&str, &str)]) -> Result<Coordinate, GenstarError> {
        let values = cells
            .iter()
            .map(|(name, label)| {
                let attribute = self.attribute_by_name(name).ok_or_else(|| {
                    GenstarError::MatrixCoordinate(format!("unknown attribute '{}'", name))
                })?;
                attribute.find(label).ok_or_else(|| {
                    GenstarError::MatrixCoordinate(format!(
                        "value '{}' is not assignable to attribute '{}'",
                        label, name
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Coordinate::new(values)
    }

    /// `name=label` rendering of a value, for messages.
    pub fn describe(&self, value: ValueId) -> String {
        format!("{}={}", self.name_of(value.attribute), self.label(value))
    }
}
