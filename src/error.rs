//! Error types for change tracking operations.
//!
//! This module provides the `TrackingError` enum for errors raised while casting
//! attribute input, resolving attribute names, and driving a persistence write.

/// Error type for change tracking operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackingError {
    /// Raw input could not be interpreted by the attribute's type
    Cast {
        attribute: String,
        type_name: String,
        value: String,
    },
    /// Attribute name is not part of the schema
    UnknownAttribute(String),
    /// An attribute type failed while comparing or deriving values
    Type { attribute: String, message: String },
    /// Schema definition is inconsistent (duplicate names, dangling aliases, ...)
    InvalidSchema(String),
    /// Primary key required but not set
    PrimaryKeyRequired,
    /// Record not found (e.g., UPDATE affected zero rows)
    RecordNotFound,
    /// Optimistic lock check failed at the storage layer
    StaleRecord { table: String, lock_version: i64 },
    /// Persistence executor failed
    Persistence(String),
}

impl TrackingError {
    pub(crate) fn cast(attribute: &str, type_name: &str, value: impl std::fmt::Debug) -> Self {
        TrackingError::Cast {
            attribute: attribute.to_string(),
            type_name: type_name.to_string(),
            value: format!("{:?}", value),
        }
    }
}

impl std::fmt::Display for TrackingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackingError::Cast {
                attribute,
                type_name,
                value,
            } => write!(
                f,
                "Cannot cast {} to {} for attribute {}",
                value, type_name, attribute
            ),
            TrackingError::UnknownAttribute(name) => {
                write!(f, "Unknown attribute: {}", name)
            }
            TrackingError::Type { attribute, message } => {
                write!(f, "Type error on attribute {}: {}", attribute, message)
            }
            TrackingError::InvalidSchema(msg) => write!(f, "Invalid schema: {}", msg),
            TrackingError::PrimaryKeyRequired => {
                write!(f, "Primary key is required for this operation")
            }
            TrackingError::RecordNotFound => {
                write!(f, "Record not found (no rows affected)")
            }
            TrackingError::StaleRecord {
                table,
                lock_version,
            } => write!(
                f,
                "Attempted to update a stale {} record (expected lock version {})",
                table, lock_version
            ),
            TrackingError::Persistence(msg) => write!(f, "Persistence error: {}", msg),
        }
    }
}

impl std::error::Error for TrackingError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cast_error_names_attribute_and_type() {
        let err = TrackingError::cast("parrot_id", "integer", "arrr");
        assert_eq!(
            err.to_string(),
            "Cannot cast \"arrr\" to integer for attribute parrot_id"
        );
    }

    #[test]
    fn test_stale_record_message() {
        let err = TrackingError::StaleRecord {
            table: "people".to_string(),
            lock_version: 3,
        };
        assert!(err.to_string().contains("people"));
        assert!(err.to_string().contains('3'));
    }
}
