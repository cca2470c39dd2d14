//! Metadata matcher — ordered filter predicates for stream reads.

use serde::{Deserialize, Serialize};

/// Which side of an event a predicate field refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    /// A key inside the event's metadata document.
    Metadata,
    /// A column of the event record itself (`no`, `event_id`, ...).
    MessageProperty,
}

/// Comparison applied by a predicate.
///
/// The set is closed: anything outside it is unrepresentable, so a filter
/// can never silently degrade into matching everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    /// `=`
    Equals,
    /// `!=`
    NotEquals,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanEquals,
    /// `<`
    LowerThan,
    /// `<=`
    LowerThanEquals,
    /// Membership in a list of values.
    In,
    /// Absence from a list of values.
    NotIn,
    /// Pattern match against a regular expression.
    Regex,
}

/// Value a predicate compares against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MatchValue {
    /// Boolean flag.
    Bool(bool),
    /// Integral number.
    Int(i64),
    /// Floating-point number.
    Float(f64),
    /// Text value; also the operand of `Regex`.
    Str(String),
    /// List operand for `In` / `NotIn`.
    List(Vec<String>),
}

impl From<bool> for MatchValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for MatchValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for MatchValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for MatchValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for MatchValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<Vec<String>> for MatchValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

/// A single filter predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataMatch {
    /// Metadata key or record column the predicate applies to.
    pub field: String,
    /// Whether `field` names a metadata key or a record column.
    pub field_type: FieldType,
    /// Comparison operator.
    pub operation: Operator,
    /// Right-hand operand.
    pub value: MatchValue,
}

impl MetadataMatch {
    /// Predicate over a metadata key.
    pub fn metadata(field: impl Into<String>, operation: Operator, value: impl Into<MatchValue>) -> Self {
        Self {
            field: field.into(),
            field_type: FieldType::Metadata,
            operation,
            value: value.into(),
        }
    }

    /// Predicate over a record column.
    pub fn property(field: impl Into<String>, operation: Operator, value: impl Into<MatchValue>) -> Self {
        Self {
            field: field.into(),
            field_type: FieldType::MessageProperty,
            operation,
            value: value.into(),
        }
    }
}

/// An ordered list of predicates, conjoined with `AND`. Empty means no
/// filter.
pub type MetadataMatcher = Vec<MetadataMatch>;
