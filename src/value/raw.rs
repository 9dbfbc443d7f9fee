//! `RawValue`: attribute input before type coercion.
//!
//! Setters accept anything convertible into a `RawValue` (form params arrive as
//! text, storage rows arrive as `sea_query::Value`, application code passes
//! native Rust values). The attribute's type decides what the input means.

use crate::error::TrackingError;
use crate::value::CastValue;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone};
use rust_decimal::Decimal;
use sea_query::{Nullable, Value, ValueType};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Uncast attribute input
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Timestamp(DateTime<FixedOffset>),
    /// Wall-clock time with no zone; interpreted in the attribute's zone
    NaiveTimestamp(NaiveDateTime),
    Date(NaiveDate),
    Uuid(Uuid),
    Json(JsonValue),
    Bytes(Vec<u8>),
}

impl RawValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, RawValue::Null)
    }

    /// `true` for null and for text made only of whitespace.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            RawValue::Null => true,
            RawValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

impl From<bool> for RawValue {
    fn from(value: bool) -> Self {
        RawValue::Bool(value)
    }
}

impl From<i32> for RawValue {
    fn from(value: i32) -> Self {
        RawValue::Int(i64::from(value))
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        RawValue::Int(value)
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Float(value)
    }
}

impl From<Decimal> for RawValue {
    fn from(value: Decimal) -> Self {
        RawValue::Decimal(value)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Text(value)
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for RawValue {
    fn from(value: DateTime<Tz>) -> Self {
        let offset = value.offset().fix();
        RawValue::Timestamp(value.with_timezone(&offset))
    }
}

impl From<NaiveDateTime> for RawValue {
    fn from(value: NaiveDateTime) -> Self {
        RawValue::NaiveTimestamp(value)
    }
}

impl From<NaiveDate> for RawValue {
    fn from(value: NaiveDate) -> Self {
        RawValue::Date(value)
    }
}

impl From<Uuid> for RawValue {
    fn from(value: Uuid) -> Self {
        RawValue::Uuid(value)
    }
}

impl From<JsonValue> for RawValue {
    fn from(value: JsonValue) -> Self {
        RawValue::Json(value)
    }
}

impl From<Vec<u8>> for RawValue {
    fn from(value: Vec<u8>) -> Self {
        RawValue::Bytes(value)
    }
}

impl<T: Into<RawValue>> From<Option<T>> for RawValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(RawValue::Null, Into::into)
    }
}

/// Reassigning an already cast value (`record.created_on = record.created_on`).
impl From<CastValue> for RawValue {
    fn from(value: CastValue) -> Self {
        match value {
            CastValue::Integer(v) => RawValue::Int(v),
            CastValue::Float(v) => RawValue::Float(v),
            CastValue::Decimal(d) => RawValue::Decimal(d),
            CastValue::Text(s) => RawValue::Text(s),
            CastValue::Boolean(b) => RawValue::Bool(b),
            CastValue::Timestamp(t) => RawValue::Timestamp(t),
            CastValue::Date(d) => RawValue::Date(d),
            CastValue::Uuid(u) => RawValue::Uuid(u),
            CastValue::Json(j) => RawValue::Json(j),
            CastValue::Binary(b) => RawValue::Bytes(b),
        }
    }
}

impl From<&CastValue> for RawValue {
    fn from(value: &CastValue) -> Self {
        RawValue::from(value.clone())
    }
}

fn extract<T>(value: Value) -> Result<Option<T>, TrackingError>
where
    T: ValueType + Nullable,
{
    <Option<T> as ValueType>::try_from(value)
        .map_err(|e| TrackingError::Persistence(format!("Failed to read storage value: {:?}", e)))
}

/// Storage rows come back as `sea_query::Value`; this maps them to uncast input
/// so reloads go through the same `cast` as every other assignment.
impl TryFrom<Value> for RawValue {
    type Error = TrackingError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let raw = match value {
            Value::Bool(v) => v.into(),
            Value::TinyInt(v) => v.map(i64::from).into(),
            Value::SmallInt(v) => v.map(i64::from).into(),
            Value::Int(v) => v.map(i64::from).into(),
            Value::BigInt(v) => v.into(),
            Value::TinyUnsigned(v) => v.map(i64::from).into(),
            Value::SmallUnsigned(v) => v.map(i64::from).into(),
            Value::Unsigned(v) => v.map(i64::from).into(),
            Value::BigUnsigned(Some(v)) => {
                RawValue::Int(<i64 as TryFrom<u64>>::try_from(v).map_err(|_| {
                    TrackingError::Persistence(format!("Unsigned value {} out of range", v))
                })?)
            }
            Value::BigUnsigned(None) => RawValue::Null,
            Value::Float(v) => v.map(f64::from).into(),
            Value::Double(v) => v.into(),
            Value::String(v) => v.into(),
            Value::Char(v) => v.map(String::from).into(),
            v @ Value::Bytes(_) => extract::<Vec<u8>>(v)?.into(),
            v @ Value::Json(_) => extract::<JsonValue>(v)?.into(),
            v @ Value::Decimal(_) => extract::<Decimal>(v)?.into(),
            v @ Value::Uuid(_) => extract::<Uuid>(v)?.into(),
            v @ Value::ChronoDate(_) => extract::<NaiveDate>(v)?.into(),
            v @ Value::ChronoDateTime(_) => extract::<NaiveDateTime>(v)?.into(),
            v @ Value::ChronoDateTimeWithTimeZone(_) => {
                extract::<DateTime<FixedOffset>>(v)?.into()
            }
            other => {
                return Err(TrackingError::Persistence(format!(
                    "Unsupported storage value: {:?}",
                    other
                )))
            }
        };
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_detection() {
        assert!(RawValue::Null.is_blank());
        assert!(RawValue::from("   ").is_blank());
        assert!(!RawValue::from("0").is_blank());
        assert!(!RawValue::Int(0).is_blank());
    }

    #[test]
    fn test_option_none_is_null() {
        assert_eq!(RawValue::from(None::<i64>), RawValue::Null);
        assert_eq!(RawValue::from(Some("x")), RawValue::Text("x".to_string()));
    }

    #[test]
    fn test_datetime_keeps_offset() {
        let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
        let t = tokyo.with_ymd_and_hms(2014, 1, 1, 21, 0, 0).unwrap();
        match RawValue::from(t) {
            RawValue::Timestamp(ts) => assert_eq!(ts.offset().local_minus_utc(), 9 * 3600),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_storage_scalars_convert() {
        assert_eq!(RawValue::try_from(Value::Int(Some(3))).unwrap(), RawValue::Int(3));
        assert_eq!(RawValue::try_from(Value::BigInt(None)).unwrap(), RawValue::Null);
        assert_eq!(
            RawValue::try_from(Value::String(Some("arr".to_string()))).unwrap(),
            RawValue::Text("arr".to_string())
        );
        assert_eq!(
            RawValue::try_from(Value::Bool(Some(true))).unwrap(),
            RawValue::Bool(true)
        );
    }

    #[test]
    fn test_storage_big_unsigned_must_fit() {
        assert_eq!(
            RawValue::try_from(Value::BigUnsigned(Some(12))).unwrap(),
            RawValue::Int(12)
        );
        assert!(RawValue::try_from(Value::BigUnsigned(Some(u64::MAX))).is_err());
    }

    #[test]
    fn test_storage_decimal_round_trips_through_sea_query() {
        let d = Decimal::new(1050, 2);
        let stored = CastValue::Decimal(d).to_storage();
        assert_eq!(RawValue::try_from(stored).unwrap(), RawValue::Decimal(d));
    }
}
