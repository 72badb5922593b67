//! # Survey attributes and values
//!
//! An [`Attribute`] is a named survey dimension with a finite, immutable value
//! domain. Values are addressed by [`ValueId`]: the owning attribute plus a
//! slot index in that attribute's domain. Slot `0` is always the designated
//! empty/unknown value, substantive values start at slot `1`.
//!
//! Attribute variants (unique, range, record, aggregated) share one struct and
//! are told apart by [`AttributeKind`]. An aggregated attribute carries its
//! mapping onto the finer referent attribute as payload.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::engine::errors::GenstarError;

/// A unique identifier for an attribute inside its [`Catalog`](super::catalog::Catalog).
///
/// AttributeId implements Ord/PartialOrd for stable, deterministic iteration.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AttributeId(pub u32);

/// A value of one attribute: the attribute plus a slot in its domain.
///
/// Equality is (attribute identity, content): the catalog rejects duplicate
/// labels, so one slot stands for one content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ValueId {
    pub attribute: AttributeId,
    pub index: u32,
}

impl ValueId {
    /// Slot of the empty/unknown value in every domain.
    pub const EMPTY_INDEX: u32 = 0;

    /// The empty/unknown value of `attribute`.
    pub fn empty(attribute: AttributeId) -> Self {
        ValueId {
            attribute,
            index: Self::EMPTY_INDEX,
        }
    }

    pub fn is_empty(self) -> bool {
        self.index == Self::EMPTY_INDEX
    }
}

/// Declared data type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DataType {
    Integer,
    Double,
    Boolean,
    String,
}

impl DataType {
    pub fn is_numeric(self) -> bool {
        matches!(self, DataType::Integer | DataType::Double)
    }
}

/// Parsed interpretation of a value label.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ValueContent {
    /// The designated empty/unknown value.
    Empty,
    /// Free text; the label is the content.
    Text,
    Boolean(bool),
    Number(f64),
    /// Closed interval; open ends are infinite.
    Range { lower: f64, upper: f64 },
}

/// One element of an attribute's domain.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Value {
    label: String,
    content: ValueContent,
}

impl Value {
    pub(crate) fn new(label: String, content: ValueContent) -> Self {
        Self { label, content }
    }

    /// Canonical string form of the value.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn content(&self) -> ValueContent {
        self.content
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.content, ValueContent::Empty)
    }

    /// Numeric interpretation: the number itself, or the bounds of a range.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        match self.content {
            ValueContent::Number(v) => Some((v, v)),
            ValueContent::Range { lower, upper } => Some((lower, upper)),
            _ => None,
        }
    }
}

/// Attribute variant tag with its variant-specific payload.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AttributeKind {
    /// Discrete values.
    Unique,
    /// Ranged values (`"0-18"`, `"66+"`).
    Range,
    /// Pure bookkeeping attribute (e.g. a derived count).
    Record,
    /// Aggregate of its referent: aggregated slot -> referent slots.
    Aggregated {
        mapping: FxHashMap<u32, SmallVec<[u32; 4]>>,
    },
}

/// A named survey dimension with a finite, immutable value domain.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Attribute {
    id: AttributeId,
    name: String,
    data_type: DataType,
    kind: AttributeKind,
    /// `None` for a root attribute (its own referent).
    referent: Option<AttributeId>,
    /// Slot 0 is the empty value.
    values: Vec<Value>,
}

impl Attribute {
    pub(crate) fn new(
        id: AttributeId,
        name: String,
        data_type: DataType,
        kind: AttributeKind,
        referent: Option<AttributeId>,
        values: Vec<Value>,
    ) -> Self {
        Self {
            id,
            name,
            data_type,
            kind,
            referent,
            values,
        }
    }

    pub fn id(&self) -> AttributeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn kind(&self) -> &AttributeKind {
        &self.kind
    }

    /// Referent attribute, `None` when this attribute is a root.
    pub fn referent(&self) -> Option<AttributeId> {
        self.referent
    }

    pub fn is_root(&self) -> bool {
        self.referent.is_none()
    }

    pub fn is_record(&self) -> bool {
        matches!(self.kind, AttributeKind::Record)
    }

    pub fn is_aggregated(&self) -> bool {
        matches!(self.kind, AttributeKind::Aggregated { .. })
    }

    /// Substantive values of the domain (the empty value excluded).
    pub fn values(&self) -> impl Iterator<Item = ValueId> + '_ {
        (1..self.values.len() as u32).map(move |index| ValueId {
            attribute: self.id,
            index,
        })
    }

    /// Number of substantive values.
    pub fn cardinality(&self) -> usize {
        self.values.len().saturating_sub(1)
    }

    pub fn empty_value(&self) -> ValueId {
        ValueId::empty(self.id)
    }

    /// Whether `value` belongs to this attribute (empty value included).
    pub fn contains(&self, value: ValueId) -> bool {
        value.attribute == self.id && (value.index as usize) < self.values.len()
    }

    pub fn value(&self, value: ValueId) -> Option<&Value> {
        if value.attribute != self.id {
            return None;
        }
        self.values.get(value.index as usize)
    }

    /// Looks a value up by label, the empty value included.
    pub fn find(&self, label: &str) -> Option<ValueId> {
        self.values
            .iter()
            .position(|v| v.label == label)
            .map(|index| ValueId {
                attribute: self.id,
                index: index as u32,
            })
    }

    pub(crate) fn label_of(&self, index: u32) -> &str {
        self.values
            .get(index as usize)
            .map(|v| v.label.as_str())
            .unwrap_or("")
    }
}

impl std::fmt::Display for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({:?}) - {} values",
            self.name,
            self.data_type,
            self.cardinality()
        )
    }
}

/// Parses a discrete value label according to the declared data type.
pub(crate) fn parse_unique(data_type: DataType, label: &str) -> Result<ValueContent, GenstarError> {
    let trimmed = label.trim();
    match data_type {
        DataType::String => Ok(ValueContent::Text),
        DataType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(ValueContent::Boolean(true)),
            "false" | "0" => Ok(ValueContent::Boolean(false)),
            _ => Err(GenstarError::Catalog(format!(
                "'{}' is not a boolean value",
                label
            ))),
        },
        DataType::Integer | DataType::Double => trimmed
            .parse::<f64>()
            .map(ValueContent::Number)
            .map_err(|_| GenstarError::Catalog(format!("'{}' is not a numeric value", label))),
    }
}

/// Parses the labels of a ranged domain.
///
/// A label with two numbers is a closed range. A label with a single number is
/// open: downward when that number is the smallest bound of the whole domain
/// (`"<5"`), upward otherwise (`"66+"`). A bare number stays a number.
pub(crate) fn parse_ranges(labels: &[String]) -> Result<Vec<ValueContent>, GenstarError> {
    let tokens = labels
        .iter()
        .map(|l| numeric_tokens(l))
        .collect::<Result<Vec<_>, _>>()?;
    let domain_min = tokens
        .iter()
        .flatten()
        .copied()
        .fold(f64::INFINITY, f64::min);

    labels
        .iter()
        .zip(tokens)
        .map(|(label, bounds)| {
            if let Ok(v) = label.trim().parse::<f64>() {
                return Ok(ValueContent::Number(v));
            }
            match bounds.as_slice() {
                [] => Err(GenstarError::Catalog(format!(
                    "range value '{}' has no numeric bound",
                    label
                ))),
                [single] if *single == domain_min => Ok(ValueContent::Range {
                    lower: f64::NEG_INFINITY,
                    upper: *single,
                }),
                [single] => Ok(ValueContent::Range {
                    lower: *single,
                    upper: f64::INFINITY,
                }),
                [a, b, ..] => Ok(ValueContent::Range {
                    lower: a.min(*b),
                    upper: a.max(*b),
                }),
            }
        })
        .collect()
}

// '-' is a separator here, negative bounds are not supported in range labels.
fn numeric_tokens(label: &str) -> Result<Vec<f64>, GenstarError> {
    label
        .split(|c: char| !(c.is_ascii_digit() || c == '.'))
        .filter(|t| !t.is_empty() && *t != ".")
        .map(|t| {
            t.parse::<f64>().map_err(|_| {
                GenstarError::Catalog(format!("cannot parse bound '{}' in '{}'", t, label))
            })
        })
        .collect()
}
