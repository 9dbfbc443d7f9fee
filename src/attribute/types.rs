//! Attribute type descriptors.
//!
//! An `AttributeType` knows how to turn raw input into a canonical
//! [`CastValue`], how to compare two cast values semantically, how to detect
//! that a mutable value was edited in place, and how to serialize a value for
//! storage. The built-in kinds are a closed set of variants; user types plug
//! in through [`CustomType`].

use crate::error::TrackingError;
use crate::value::{CastValue, RawValue};
use chrono::{
    DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, SubsecRound, TimeZone,
    Utc,
};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use sea_query::Value;
use serde_json::Value as JsonValue;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// Fractional second digits kept by timestamp attributes unless overridden.
pub const DEFAULT_TIMESTAMP_PRECISION: u32 = 6;

const TRUE_VALUES: &[&str] = &["1", "t", "true", "on", "yes", "y"];
const FALSE_VALUES: &[&str] = &["0", "f", "false", "off", "no", "n"];

/// How a boolean attribute is persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BooleanStorage {
    /// Native boolean column
    #[default]
    Native,
    /// Integer column holding `1` / `0`
    Integer,
}

/// Capability set for user-defined attribute types
///
/// Implementations receive the attribute name so error messages can point at
/// the offending attribute. Only `cast` is required; the remaining operations
/// default to plain value comparison and the generic storage mapping.
///
/// # Example
///
/// ```
/// use changeguard::{CastValue, CustomType, RawValue, TrackingError};
///
/// #[derive(Debug)]
/// struct UpcaseText;
///
/// impl CustomType for UpcaseText {
///     fn name(&self) -> &str {
///         "upcase_text"
///     }
///
///     fn cast(&self, attribute: &str, raw: RawValue) -> Result<Option<CastValue>, TrackingError> {
///         match raw {
///             RawValue::Null => Ok(None),
///             RawValue::Text(s) => Ok(Some(CastValue::Text(s.to_uppercase()))),
///             other => Err(TrackingError::Cast {
///                 attribute: attribute.to_string(),
///                 type_name: self.name().to_string(),
///                 value: format!("{:?}", other),
///             }),
///         }
///     }
/// }
/// ```
pub trait CustomType: std::fmt::Debug + Send + Sync {
    /// Type name used in diagnostics
    fn name(&self) -> &str;

    /// Coerce raw input into a canonical value
    ///
    /// # Errors
    ///
    /// Returns `TrackingError::Cast` when the input cannot be interpreted.
    fn cast(&self, attribute: &str, raw: RawValue) -> Result<Option<CastValue>, TrackingError>;

    /// Semantic equality of two cast values
    fn equal(&self, a: &CastValue, b: &CastValue) -> bool {
        a == b
    }

    /// Whether values of this type can be edited without reassignment
    fn is_mutable(&self) -> bool {
        false
    }

    /// Detect in-place edits by comparing contents
    ///
    /// Only called for attributes of this type, and only when the type reports
    /// itself as mutable.
    ///
    /// # Errors
    ///
    /// Implementations may fail; the failure is confined to this attribute.
    fn changed_in_place(
        &self,
        _attribute: &str,
        original: Option<&CastValue>,
        current: Option<&CastValue>,
    ) -> Result<bool, TrackingError> {
        Ok(original != current)
    }

    /// Storage representation of a non-null value
    fn serialize(&self, value: &CastValue) -> Value {
        value.to_storage()
    }

    /// Storage representation of null
    fn null_storage(&self) -> Value {
        Value::String(None)
    }
}

/// Attribute type descriptor
#[derive(Debug, Clone)]
pub enum AttributeType {
    Integer,
    Float,
    /// Decimal, optionally rounded to `scale` fractional digits
    Decimal { scale: Option<u32> },
    Text,
    Boolean { storage: BooleanStorage },
    /// Timestamp keeping `precision` fractional digits. With a `zone`, every
    /// value is presented in that zone; without one, values are kept in UTC.
    Timestamp {
        precision: u32,
        zone: Option<FixedOffset>,
    },
    Date,
    Uuid,
    /// Serialized structured value
    Json,
    Binary,
    Custom(Arc<dyn CustomType>),
}

impl AttributeType {
    /// Native boolean
    #[must_use]
    pub fn boolean() -> Self {
        AttributeType::Boolean {
            storage: BooleanStorage::Native,
        }
    }

    /// Decimal without rounding
    #[must_use]
    pub fn decimal() -> Self {
        AttributeType::Decimal { scale: None }
    }

    /// Timestamp with default precision; the zone is resolved by the schema.
    #[must_use]
    pub fn timestamp() -> Self {
        AttributeType::Timestamp {
            precision: DEFAULT_TIMESTAMP_PRECISION,
            zone: None,
        }
    }

    #[must_use]
    pub fn custom<T: CustomType + 'static>(custom: T) -> Self {
        AttributeType::Custom(Arc::new(custom))
    }

    /// Type name used in diagnostics
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            AttributeType::Integer => "integer",
            AttributeType::Float => "float",
            AttributeType::Decimal { .. } => "decimal",
            AttributeType::Text => "text",
            AttributeType::Boolean { .. } => "boolean",
            AttributeType::Timestamp { .. } => "timestamp",
            AttributeType::Date => "date",
            AttributeType::Uuid => "uuid",
            AttributeType::Json => "json",
            AttributeType::Binary => "binary",
            AttributeType::Custom(custom) => custom.name(),
        }
    }

    /// Whether held values may be edited without going through a setter
    #[must_use]
    pub fn is_mutable(&self) -> bool {
        match self {
            AttributeType::Text | AttributeType::Json | AttributeType::Binary => true,
            AttributeType::Custom(custom) => custom.is_mutable(),
            _ => false,
        }
    }

    /// Coerce raw input into this type's canonical representation
    ///
    /// # Arguments
    ///
    /// * `attribute` - Attribute name, reported in cast errors
    /// * `raw` - Input value
    ///
    /// # Returns
    ///
    /// `Ok(None)` for null (and, for numeric and temporal types, blank text).
    ///
    /// # Errors
    ///
    /// Returns `TrackingError::Cast` if the input cannot be interpreted.
    pub fn cast(&self, attribute: &str, raw: RawValue) -> Result<Option<CastValue>, TrackingError> {
        match self {
            AttributeType::Integer => self.cast_integer(attribute, raw),
            AttributeType::Float => self.cast_float(attribute, raw),
            AttributeType::Decimal { scale } => self.cast_decimal(attribute, raw, *scale),
            AttributeType::Text => self.cast_text(attribute, raw),
            AttributeType::Boolean { .. } => self.cast_boolean(attribute, raw),
            AttributeType::Timestamp { precision, zone } => {
                self.cast_timestamp(attribute, raw, *precision, *zone)
            }
            AttributeType::Date => self.cast_date(attribute, raw),
            AttributeType::Uuid => self.cast_uuid(attribute, raw),
            AttributeType::Json => self.cast_json(attribute, raw),
            AttributeType::Binary => self.cast_binary(attribute, raw),
            AttributeType::Custom(custom) => custom.cast(attribute, raw),
        }
    }

    /// Semantic equality of two cast values (null equals only null)
    #[must_use]
    pub fn equal(&self, a: Option<&CastValue>, b: Option<&CastValue>) -> bool {
        match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) => match (self, a, b) {
                (AttributeType::Float, CastValue::Float(x), CastValue::Float(y)) => {
                    x == y || (x.is_nan() && y.is_nan())
                }
                (AttributeType::Custom(custom), a, b) => custom.equal(a, b),
                (_, a, b) => a == b,
            },
            _ => false,
        }
    }

    /// Detect an in-place edit of a mutable value
    ///
    /// Compares the serialized form of the original value with the current one.
    /// Immutable types always report `false`.
    ///
    /// # Errors
    ///
    /// Only custom types can fail here.
    pub fn changed_in_place(
        &self,
        attribute: &str,
        original: Option<&CastValue>,
        current: Option<&CastValue>,
    ) -> Result<bool, TrackingError> {
        match self {
            AttributeType::Text | AttributeType::Binary => Ok(original != current),
            AttributeType::Json => Ok(serialized_json(original) != serialized_json(current)),
            AttributeType::Custom(custom) => custom.changed_in_place(attribute, original, current),
            _ => Ok(false),
        }
    }

    /// Storage representation of a cast value
    #[must_use]
    pub fn serialize(&self, value: Option<&CastValue>) -> Value {
        match (self, value) {
            (AttributeType::Custom(custom), Some(v)) => custom.serialize(v),
            (AttributeType::Custom(custom), None) => custom.null_storage(),
            (
                AttributeType::Boolean {
                    storage: BooleanStorage::Integer,
                },
                Some(CastValue::Boolean(b)),
            ) => Value::Int(Some(i32::from(*b))),
            (_, Some(v)) => v.to_storage(),
            (_, None) => self.null_storage(),
        }
    }

    fn null_storage(&self) -> Value {
        match self {
            AttributeType::Integer => Value::BigInt(None),
            AttributeType::Float => Value::Double(None),
            AttributeType::Decimal { .. } => Value::Decimal(None),
            AttributeType::Text => Value::String(None),
            AttributeType::Boolean {
                storage: BooleanStorage::Native,
            } => Value::Bool(None),
            AttributeType::Boolean {
                storage: BooleanStorage::Integer,
            } => Value::Int(None),
            AttributeType::Timestamp { .. } => Value::ChronoDateTimeWithTimeZone(None),
            AttributeType::Date => Value::ChronoDate(None),
            AttributeType::Uuid => Value::Uuid(None),
            AttributeType::Json => Value::Json(None),
            AttributeType::Binary => Value::Bytes(None),
            AttributeType::Custom(custom) => custom.null_storage(),
        }
    }

    fn cast_error(&self, attribute: &str, raw: &RawValue) -> TrackingError {
        TrackingError::cast(attribute, self.name(), raw)
    }

    fn cast_integer(
        &self,
        attribute: &str,
        raw: RawValue,
    ) -> Result<Option<CastValue>, TrackingError> {
        let value = match &raw {
            RawValue::Null => return Ok(None),
            RawValue::Bool(b) => i64::from(*b),
            RawValue::Int(i) => *i,
            RawValue::Float(f) => {
                truncate_float(*f).ok_or_else(|| self.cast_error(attribute, &raw))?
            }
            RawValue::Decimal(d) => d
                .trunc()
                .to_i64()
                .ok_or_else(|| self.cast_error(attribute, &raw))?,
            RawValue::Text(s) => {
                let s = s.trim();
                if s.is_empty() {
                    return Ok(None);
                }
                match s.parse::<i64>() {
                    Ok(i) => i,
                    Err(_) => parse_decimal(s)
                        .and_then(|d| d.trunc().to_i64())
                        .ok_or_else(|| self.cast_error(attribute, &raw))?,
                }
            }
            _ => return Err(self.cast_error(attribute, &raw)),
        };
        Ok(Some(CastValue::Integer(value)))
    }

    fn cast_float(
        &self,
        attribute: &str,
        raw: RawValue,
    ) -> Result<Option<CastValue>, TrackingError> {
        let value = match &raw {
            RawValue::Null => return Ok(None),
            RawValue::Bool(b) => f64::from(u8::from(*b)),
            RawValue::Int(i) => *i as f64,
            RawValue::Float(f) => *f,
            RawValue::Decimal(d) => d.to_f64().ok_or_else(|| self.cast_error(attribute, &raw))?,
            RawValue::Text(s) => {
                let s = s.trim();
                if s.is_empty() {
                    return Ok(None);
                }
                s.parse::<f64>().map_err(|_| self.cast_error(attribute, &raw))?
            }
            _ => return Err(self.cast_error(attribute, &raw)),
        };
        Ok(Some(CastValue::Float(value)))
    }

    fn cast_decimal(
        &self,
        attribute: &str,
        raw: RawValue,
        scale: Option<u32>,
    ) -> Result<Option<CastValue>, TrackingError> {
        let value = match &raw {
            RawValue::Null => return Ok(None),
            RawValue::Bool(b) => Decimal::from(u8::from(*b)),
            RawValue::Int(i) => Decimal::from(*i),
            RawValue::Float(f) => {
                Decimal::from_f64(*f).ok_or_else(|| self.cast_error(attribute, &raw))?
            }
            RawValue::Decimal(d) => *d,
            RawValue::Text(s) => {
                let s = s.trim();
                if s.is_empty() {
                    return Ok(None);
                }
                parse_decimal(s).ok_or_else(|| self.cast_error(attribute, &raw))?
            }
            _ => return Err(self.cast_error(attribute, &raw)),
        };
        Ok(Some(CastValue::Decimal(match scale {
            Some(dp) => value.round_dp(dp),
            None => value,
        })))
    }

    fn cast_text(
        &self,
        attribute: &str,
        raw: RawValue,
    ) -> Result<Option<CastValue>, TrackingError> {
        let text = match raw {
            RawValue::Null => return Ok(None),
            RawValue::Text(s) => s,
            RawValue::Bool(b) => (if b { "t" } else { "f" }).to_string(),
            RawValue::Int(i) => i.to_string(),
            RawValue::Float(f) => f.to_string(),
            RawValue::Decimal(d) => d.to_string(),
            RawValue::Timestamp(t) => t.to_string(),
            RawValue::NaiveTimestamp(t) => t.to_string(),
            RawValue::Date(d) => d.to_string(),
            RawValue::Uuid(u) => u.to_string(),
            RawValue::Json(JsonValue::String(s)) => s,
            RawValue::Json(j) => j.to_string(),
            RawValue::Bytes(b) => match String::from_utf8(b) {
                Ok(s) => s,
                Err(e) => {
                    return Err(self.cast_error(attribute, &RawValue::Bytes(e.into_bytes())))
                }
            },
        };
        Ok(Some(CastValue::Text(text)))
    }

    fn cast_boolean(
        &self,
        attribute: &str,
        raw: RawValue,
    ) -> Result<Option<CastValue>, TrackingError> {
        let value = match &raw {
            RawValue::Null => return Ok(None),
            RawValue::Bool(b) => *b,
            RawValue::Int(i) => *i != 0,
            RawValue::Float(f) => *f != 0.0,
            RawValue::Decimal(d) => !d.is_zero(),
            RawValue::Text(s) => {
                let s = s.trim().to_ascii_lowercase();
                if s.is_empty() {
                    return Ok(None);
                }
                if TRUE_VALUES.contains(&s.as_str()) {
                    true
                } else if FALSE_VALUES.contains(&s.as_str()) {
                    false
                } else {
                    return Err(self.cast_error(attribute, &raw));
                }
            }
            _ => return Err(self.cast_error(attribute, &raw)),
        };
        Ok(Some(CastValue::Boolean(value)))
    }

    fn cast_timestamp(
        &self,
        attribute: &str,
        raw: RawValue,
        precision: u32,
        zone: Option<FixedOffset>,
    ) -> Result<Option<CastValue>, TrackingError> {
        let target = zone.unwrap_or_else(|| Utc.fix());
        let instant = match &raw {
            RawValue::Null => return Ok(None),
            RawValue::Timestamp(t) => *t,
            RawValue::NaiveTimestamp(n) => in_zone(&target, *n)
                .ok_or_else(|| self.cast_error(attribute, &raw))?,
            RawValue::Date(d) => in_zone(&target, d.and_time(NaiveTime::MIN))
                .ok_or_else(|| self.cast_error(attribute, &raw))?,
            RawValue::Text(s) => {
                let s = s.trim();
                if s.is_empty() {
                    return Ok(None);
                }
                parse_timestamp(s, &target).ok_or_else(|| self.cast_error(attribute, &raw))?
            }
            _ => return Err(self.cast_error(attribute, &raw)),
        };
        let digits = u16::try_from(precision).unwrap_or(9).min(9);
        Ok(Some(CastValue::Timestamp(
            instant.with_timezone(&target).trunc_subsecs(digits),
        )))
    }

    fn cast_date(
        &self,
        attribute: &str,
        raw: RawValue,
    ) -> Result<Option<CastValue>, TrackingError> {
        let date = match &raw {
            RawValue::Null => return Ok(None),
            RawValue::Date(d) => *d,
            RawValue::Timestamp(t) => t.date_naive(),
            RawValue::NaiveTimestamp(n) => n.date(),
            RawValue::Text(s) => {
                let s = s.trim();
                if s.is_empty() {
                    return Ok(None);
                }
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()
                    .or_else(|| parse_timestamp(s, &Utc.fix()).map(|t| t.date_naive()))
                    .ok_or_else(|| self.cast_error(attribute, &raw))?
            }
            _ => return Err(self.cast_error(attribute, &raw)),
        };
        Ok(Some(CastValue::Date(date)))
    }

    fn cast_uuid(
        &self,
        attribute: &str,
        raw: RawValue,
    ) -> Result<Option<CastValue>, TrackingError> {
        let uuid = match &raw {
            RawValue::Null => return Ok(None),
            RawValue::Uuid(u) => *u,
            RawValue::Text(s) => {
                let s = s.trim();
                if s.is_empty() {
                    return Ok(None);
                }
                Uuid::parse_str(s).map_err(|_| self.cast_error(attribute, &raw))?
            }
            RawValue::Bytes(b) => {
                Uuid::from_slice(b).map_err(|_| self.cast_error(attribute, &raw))?
            }
            _ => return Err(self.cast_error(attribute, &raw)),
        };
        Ok(Some(CastValue::Uuid(uuid)))
    }

    fn cast_json(
        &self,
        attribute: &str,
        raw: RawValue,
    ) -> Result<Option<CastValue>, TrackingError> {
        let json = match raw {
            RawValue::Null | RawValue::Json(JsonValue::Null) => return Ok(None),
            RawValue::Json(j) => j,
            RawValue::Text(s) => JsonValue::String(s),
            RawValue::Bool(b) => JsonValue::Bool(b),
            RawValue::Int(i) => JsonValue::from(i),
            RawValue::Float(f) => match serde_json::Number::from_f64(f) {
                Some(n) => JsonValue::Number(n),
                None => return Err(self.cast_error(attribute, &RawValue::Float(f))),
            },
            RawValue::Decimal(d) => JsonValue::String(d.to_string()),
            RawValue::Timestamp(t) => JsonValue::String(t.to_rfc3339()),
            RawValue::NaiveTimestamp(t) => JsonValue::String(t.to_string()),
            RawValue::Date(d) => JsonValue::String(d.to_string()),
            RawValue::Uuid(u) => JsonValue::String(u.to_string()),
            other @ RawValue::Bytes(_) => return Err(self.cast_error(attribute, &other)),
        };
        Ok(Some(CastValue::Json(json)))
    }

    fn cast_binary(
        &self,
        attribute: &str,
        raw: RawValue,
    ) -> Result<Option<CastValue>, TrackingError> {
        match raw {
            RawValue::Null => Ok(None),
            RawValue::Bytes(b) => Ok(Some(CastValue::Binary(b))),
            RawValue::Text(s) => Ok(Some(CastValue::Binary(s.into_bytes()))),
            other => Err(self.cast_error(attribute, &other)),
        }
    }
}

fn truncate_float(f: f64) -> Option<i64> {
    if f.is_finite() {
        f.trunc().to_i64()
    } else {
        None
    }
}

fn parse_decimal(s: &str) -> Option<Decimal> {
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}

fn in_zone(zone: &FixedOffset, naive: NaiveDateTime) -> Option<DateTime<FixedOffset>> {
    zone.from_local_datetime(&naive).single()
}

fn serialized_json(value: Option<&CastValue>) -> Option<String> {
    value.map(|v| match v {
        CastValue::Json(j) => j.to_string(),
        other => other.to_string(),
    })
}

/// Parse the textual timestamp forms accepted from callers and storage.
///
/// Text without an offset is wall-clock time in `zone`.
fn parse_timestamp(s: &str, zone: &FixedOffset) -> Option<DateTime<FixedOffset>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t);
    }
    for format in [
        "%Y-%m-%d %H:%M:%S%.f %z",
        "%Y-%m-%d %H:%M:%S %z",
        "%Y-%m-%d %H:%M:%S%.f %:z",
        "%Y-%m-%d %H:%M:%S %:z",
    ] {
        if let Ok(t) = DateTime::parse_from_str(s, format) {
            return Some(t);
        }
    }
    if let Some(utc) = s.strip_suffix(" UTC") {
        return parse_naive(utc).and_then(|n| in_zone(&Utc.fix(), n));
    }
    if let Some(n) = parse_naive(s) {
        return in_zone(zone, n);
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| in_zone(zone, d.and_time(NaiveTime::MIN)))
}

fn parse_naive(s: &str) -> Option<NaiveDateTime> {
    [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
    ]
    .iter()
    .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
}
