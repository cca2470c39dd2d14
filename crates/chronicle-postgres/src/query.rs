//! Metadata-matcher-to-SQL compilation.
//!
//! Compiles an ordered predicate list into conjoined `WHERE` fragments
//! plus the positional bind values they reference. Parameter numbering
//! starts after `param_offset` so fragments from several streams can be
//! composed into one merged query without colliding.

use chrono::{DateTime, Utc};
use chronicle_core::error::StoreError;
use chronicle_core::matcher::{FieldType, MatchValue, MetadataMatch, Operator};
use sqlx::Postgres;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use uuid::Uuid;

/// Record columns a `MessageProperty` predicate may reference.
const MESSAGE_PROPERTY_COLUMNS: [&str; 4] = ["no", "event_id", "event_name", "created_at"];

/// A positional SQL bind value.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    /// Boolean.
    Bool(bool),
    /// 64-bit integer.
    Int(i64),
    /// Double-precision float.
    Float(f64),
    /// Text.
    Str(String),
    /// Text array.
    StrList(Vec<String>),
    /// UUID.
    Uuid(Uuid),
    /// Timestamp, stored without timezone at microsecond precision.
    Timestamp(DateTime<Utc>),
    /// JSON document.
    Json(serde_json::Value),
}

impl From<bool> for BindValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for BindValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for BindValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for BindValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for BindValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<Vec<String>> for BindValue {
    fn from(value: Vec<String>) -> Self {
        Self::StrList(value)
    }
}

impl From<Uuid> for BindValue {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

impl From<DateTime<Utc>> for BindValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl From<serde_json::Value> for BindValue {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

/// Binds a value list onto a query in order.
pub(crate) fn bind_values<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    values: &'q [BindValue],
) -> Query<'q, Postgres, PgArguments> {
    for value in values {
        query = match value {
            BindValue::Bool(v) => query.bind(*v),
            BindValue::Int(v) => query.bind(*v),
            BindValue::Float(v) => query.bind(*v),
            BindValue::Str(v) => query.bind(v.as_str()),
            BindValue::StrList(v) => query.bind(v),
            BindValue::Uuid(v) => query.bind(*v),
            BindValue::Timestamp(v) => query.bind(v.naive_utc()),
            BindValue::Json(v) => query.bind(v),
        };
    }
    query
}

enum OpKind {
    Compare(&'static str),
    In,
    NotIn,
    Regex,
}

fn op_kind(operation: Operator) -> OpKind {
    match operation {
        Operator::Equals => OpKind::Compare("="),
        Operator::NotEquals => OpKind::Compare("!="),
        Operator::GreaterThan => OpKind::Compare(">"),
        Operator::GreaterThanEquals => OpKind::Compare(">="),
        Operator::LowerThan => OpKind::Compare("<"),
        Operator::LowerThanEquals => OpKind::Compare("<="),
        Operator::In => OpKind::In,
        Operator::NotIn => OpKind::NotIn,
        Operator::Regex => OpKind::Regex,
    }
}

/// Left-hand expression for a predicate field.
///
/// Metadata values are stored untyped, so numeric and boolean comparisons
/// cast the text extraction explicitly; message properties must name a
/// known record column.
fn field_expression(predicate: &MetadataMatch) -> Result<String, StoreError> {
    match predicate.field_type {
        FieldType::Metadata => {
            let key = predicate.field.replace('\'', "''");
            Ok(match &predicate.value {
                MatchValue::Int(_) => format!("CAST(metadata->>'{key}' AS BIGINT)"),
                MatchValue::Float(_) => format!("CAST(metadata->>'{key}' AS DOUBLE PRECISION)"),
                MatchValue::Bool(_) => format!("(metadata->>'{key}')::boolean"),
                MatchValue::Str(_) | MatchValue::List(_) => format!("metadata->>'{key}'"),
            })
        }
        FieldType::MessageProperty => {
            if MESSAGE_PROPERTY_COLUMNS.contains(&predicate.field.as_str()) {
                Ok(predicate.field.clone())
            } else {
                Err(StoreError::Storage(format!(
                    "unknown message property in matcher: {}",
                    predicate.field
                )))
            }
        }
    }
}

fn invalid_operand(predicate: &MetadataMatch, expected: &str) -> StoreError {
    StoreError::Storage(format!(
        "matcher predicate on {field}: {operation:?} requires {expected}",
        field = predicate.field,
        operation = predicate.operation,
    ))
}

/// Compiles a matcher into `WHERE` fragments and bind values.
///
/// Booleans are emitted as inline literals and consume no parameter slot;
/// every other operand binds positionally, numbered from
/// `param_offset + 1`.
///
/// # Errors
///
/// Returns [`StoreError::Storage`] for operand kinds an operator cannot
/// take and for message properties outside the known column set.
pub(crate) fn compile_matcher(
    param_offset: usize,
    matcher: &[MetadataMatch],
) -> Result<(Vec<String>, Vec<BindValue>), StoreError> {
    let mut wheres = Vec::with_capacity(matcher.len());
    let mut values: Vec<BindValue> = Vec::new();

    for predicate in matcher {
        let lhs = field_expression(predicate)?;
        let clause = match op_kind(predicate.operation) {
            OpKind::In | OpKind::NotIn => {
                let MatchValue::List(items) = &predicate.value else {
                    return Err(invalid_operand(predicate, "a list value"));
                };
                values.push(BindValue::StrList(items.clone()));
                let placeholder = placeholder(param_offset + values.len());
                if matches!(op_kind(predicate.operation), OpKind::In) {
                    format!("{lhs} = ANY({placeholder})")
                } else {
                    format!("{lhs} <> ALL({placeholder})")
                }
            }
            OpKind::Regex => {
                let MatchValue::Str(pattern) = &predicate.value else {
                    return Err(invalid_operand(predicate, "a string pattern"));
                };
                values.push(BindValue::Str(pattern.clone()));
                format!("{lhs} ~ {}", placeholder(param_offset + values.len()))
            }
            OpKind::Compare(symbol) => match &predicate.value {
                MatchValue::Bool(flag) => format!("{lhs} {symbol} {flag}"),
                MatchValue::Int(v) => {
                    values.push(BindValue::Int(*v));
                    format!("{lhs} {symbol} {}", placeholder(param_offset + values.len()))
                }
                MatchValue::Float(v) => {
                    values.push(BindValue::Float(*v));
                    format!("{lhs} {symbol} {}", placeholder(param_offset + values.len()))
                }
                MatchValue::Str(v) => {
                    values.push(BindValue::Str(v.clone()));
                    format!("{lhs} {symbol} {}", placeholder(param_offset + values.len()))
                }
                MatchValue::List(_) => {
                    return Err(invalid_operand(predicate, "a scalar value"));
                }
            },
        };
        wheres.push(clause);
    }

    Ok((wheres, values))
}

fn placeholder(number: usize) -> String {
    format!("${number}")
}
