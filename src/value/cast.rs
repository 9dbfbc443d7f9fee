//! `CastValue`: the canonical in-memory representation of an attribute.
//!
//! Every value held by an attribute slot has been through its attribute type's
//! `cast`, so two inputs meant to be "the same value" end up as the same
//! `CastValue` variant. Absence (SQL `NULL`) is represented as `Option::None`
//! around a `CastValue`, never as a variant.

use chrono::{DateTime, FixedOffset, NaiveDate};
use rust_decimal::Decimal;
use sea_query::Value;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Canonical attribute value after type coercion
#[derive(Debug, Clone, PartialEq)]
pub enum CastValue {
    Integer(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Boolean(bool),
    /// Instant plus the zone it is presented in. Equality compares instants.
    Timestamp(DateTime<FixedOffset>),
    Date(NaiveDate),
    Uuid(Uuid),
    Json(JsonValue),
    Binary(Vec<u8>),
}

impl CastValue {
    /// Short kind name, used in diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            CastValue::Integer(_) => "integer",
            CastValue::Float(_) => "float",
            CastValue::Decimal(_) => "decimal",
            CastValue::Text(_) => "text",
            CastValue::Boolean(_) => "boolean",
            CastValue::Timestamp(_) => "timestamp",
            CastValue::Date(_) => "date",
            CastValue::Uuid(_) => "uuid",
            CastValue::Json(_) => "json",
            CastValue::Binary(_) => "binary",
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CastValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            CastValue::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CastValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<&DateTime<FixedOffset>> {
        match self {
            CastValue::Timestamp(t) => Some(t),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_json(&self) -> Option<&JsonValue> {
        match self {
            CastValue::Json(j) => Some(j),
            _ => None,
        }
    }

    /// Mutable access to a text buffer, for in-place edits.
    pub fn as_text_mut(&mut self) -> Option<&mut String> {
        match self {
            CastValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Mutable access to a structured value, for in-place edits.
    pub fn as_json_mut(&mut self) -> Option<&mut JsonValue> {
        match self {
            CastValue::Json(j) => Some(j),
            _ => None,
        }
    }

    pub fn as_bytes_mut(&mut self) -> Option<&mut Vec<u8>> {
        match self {
            CastValue::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Convert to the storage value currency.
    ///
    /// Attribute types with a storage representation different from their cast
    /// value (e.g. integer-backed booleans) override this in
    /// [`AttributeType::serialize`](crate::attribute::AttributeType::serialize).
    #[must_use]
    pub fn to_storage(&self) -> Value {
        match self {
            CastValue::Integer(v) => Value::BigInt(Some(*v)),
            CastValue::Float(v) => Value::Double(Some(*v)),
            CastValue::Decimal(d) => Value::from(*d),
            CastValue::Text(s) => Value::String(Some(s.clone())),
            CastValue::Boolean(b) => Value::Bool(Some(*b)),
            CastValue::Timestamp(t) => Value::from(*t),
            CastValue::Date(d) => Value::from(*d),
            CastValue::Uuid(u) => Value::from(*u),
            CastValue::Json(j) => Value::from(j.clone()),
            CastValue::Binary(b) => Value::from(b.clone()),
        }
    }
}

impl std::fmt::Display for CastValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CastValue::Integer(v) => write!(f, "{}", v),
            CastValue::Float(v) => write!(f, "{}", v),
            CastValue::Decimal(d) => write!(f, "{}", d),
            CastValue::Text(s) => write!(f, "{}", s),
            CastValue::Boolean(b) => write!(f, "{}", b),
            CastValue::Timestamp(t) => write!(f, "{}", t),
            CastValue::Date(d) => write!(f, "{}", d),
            CastValue::Uuid(u) => write!(f, "{}", u),
            CastValue::Json(j) => write!(f, "{}", j),
            CastValue::Binary(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<i64> for CastValue {
    fn from(value: i64) -> Self {
        CastValue::Integer(value)
    }
}

impl From<i32> for CastValue {
    fn from(value: i32) -> Self {
        CastValue::Integer(i64::from(value))
    }
}

impl From<f64> for CastValue {
    fn from(value: f64) -> Self {
        CastValue::Float(value)
    }
}

impl From<Decimal> for CastValue {
    fn from(value: Decimal) -> Self {
        CastValue::Decimal(value)
    }
}

impl From<&str> for CastValue {
    fn from(value: &str) -> Self {
        CastValue::Text(value.to_string())
    }
}

impl From<String> for CastValue {
    fn from(value: String) -> Self {
        CastValue::Text(value)
    }
}

impl From<bool> for CastValue {
    fn from(value: bool) -> Self {
        CastValue::Boolean(value)
    }
}

impl From<DateTime<FixedOffset>> for CastValue {
    fn from(value: DateTime<FixedOffset>) -> Self {
        CastValue::Timestamp(value)
    }
}

impl From<Uuid> for CastValue {
    fn from(value: Uuid) -> Self {
        CastValue::Uuid(value)
    }
}

impl From<JsonValue> for CastValue {
    fn from(value: JsonValue) -> Self {
        CastValue::Json(value)
    }
}
