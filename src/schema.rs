//! Schema registry for one record kind.
//!
//! A `Schema` is the ordered list of attribute definitions for a table together
//! with aliases, the primary key, and the kind's [`TrackingConfig`]. It is
//! immutable once built and shared (`Arc`) by every record of that kind; all
//! mutable tracking state lives in each record's own attribute set.
//!
//! # Example
//!
//! ```
//! use changeguard::{AttributeType, Schema, TrackingConfig};
//!
//! let schema = Schema::builder("pirates")
//!     .attribute("id", AttributeType::Integer)
//!     .attribute("catchphrase", AttributeType::Text)
//!     .attribute("parrot_id", AttributeType::Integer)
//!     .attribute("created_on", AttributeType::timestamp())
//!     .attribute("updated_on", AttributeType::timestamp())
//!     .config(TrackingConfig::default())
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(schema.primary_key(), Some("id"));
//! assert_eq!(schema.position("catchphrase").unwrap(), 1);
//! ```

use crate::attribute::AttributeType;
use crate::config::TrackingConfig;
use crate::error::TrackingError;
use crate::value::{CastValue, RawValue};
use std::collections::HashMap;
use std::sync::Arc;

/// Read-time default hook: receives the current value and may return a
/// replacement to assign before the value is handed out.
pub type ReadDefault = Arc<dyn Fn(Option<&CastValue>) -> Option<RawValue> + Send + Sync>;

/// Definition of a single attribute
#[derive(Clone)]
pub struct AttributeDefinition {
    name: String,
    ty: AttributeType,
    default: Option<RawValue>,
    cast_default: Option<CastValue>,
    persisted: bool,
    read_default: Option<ReadDefault>,
}

impl std::fmt::Debug for AttributeDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributeDefinition")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("default", &self.default)
            .field("persisted", &self.persisted)
            .field("read_default", &self.read_default.is_some())
            .finish()
    }
}

impl AttributeDefinition {
    #[must_use]
    pub fn new(name: impl Into<String>, ty: AttributeType) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
            cast_default: None,
            persisted: true,
            read_default: None,
        }
    }

    /// Value new records start with (cast when the schema is built)
    #[must_use]
    pub fn default_value(mut self, value: impl Into<RawValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Virtual attribute: tracked like any other, never written to storage
    #[must_use]
    pub fn virtual_attribute(mut self) -> Self {
        self.persisted = false;
        self
    }

    /// Install a read-time default hook
    ///
    /// The hook runs on the first `get` after each assignment or load, at most
    /// once per value. Returning `Some` assigns the returned value through the
    /// normal cast path, so it shows up as a change.
    #[must_use]
    pub fn default_on_read<F>(mut self, hook: F) -> Self
    where
        F: Fn(Option<&CastValue>) -> Option<RawValue> + Send + Sync + 'static,
    {
        self.read_default = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn attribute_type(&self) -> &AttributeType {
        &self.ty
    }

    /// Whether this attribute maps to a storage column
    #[must_use]
    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    #[must_use]
    pub fn cast_default(&self) -> Option<&CastValue> {
        self.cast_default.as_ref()
    }

    pub(crate) fn read_default(&self) -> Option<&ReadDefault> {
        self.read_default.as_ref()
    }
}

/// Ordered attribute registry for one record kind
#[derive(Debug)]
pub struct Schema {
    table: String,
    attributes: Vec<AttributeDefinition>,
    positions: HashMap<String, usize>,
    aliases: HashMap<String, String>,
    primary_key: Option<String>,
    config: TrackingConfig,
}

impl Schema {
    #[must_use]
    pub fn builder(table: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            table: table.into(),
            attributes: Vec::new(),
            aliases: Vec::new(),
            primary_key: None,
            config: TrackingConfig::default(),
        }
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[must_use]
    pub fn primary_key(&self) -> Option<&str> {
        self.primary_key.as_deref()
    }

    /// Definition-order position of the primary key
    #[must_use]
    pub fn primary_key_position(&self) -> Option<usize> {
        self.primary_key
            .as_deref()
            .and_then(|pk| self.positions.get(pk).copied())
    }

    #[must_use]
    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    #[must_use]
    pub fn attributes(&self) -> &[AttributeDefinition] {
        &self.attributes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Resolve an attribute or alias name to its canonical name
    ///
    /// # Errors
    ///
    /// Returns `TrackingError::UnknownAttribute` for names outside the schema.
    pub fn resolve<'a>(&'a self, name: &'a str) -> Result<&'a str, TrackingError> {
        let canonical = self.aliases.get(name).map_or(name, String::as_str);
        if self.positions.contains_key(canonical) {
            Ok(canonical)
        } else {
            Err(TrackingError::UnknownAttribute(name.to_string()))
        }
    }

    /// Definition-order position of an attribute (aliases resolved)
    ///
    /// # Errors
    ///
    /// Returns `TrackingError::UnknownAttribute` for names outside the schema.
    pub fn position(&self, name: &str) -> Result<usize, TrackingError> {
        let canonical = self.aliases.get(name).map_or(name, String::as_str);
        self.positions
            .get(canonical)
            .copied()
            .ok_or_else(|| TrackingError::UnknownAttribute(name.to_string()))
    }

    /// Definition of an attribute (aliases resolved)
    ///
    /// # Errors
    ///
    /// Returns `TrackingError::UnknownAttribute` for names outside the schema.
    pub fn definition(&self, name: &str) -> Result<&AttributeDefinition, TrackingError> {
        self.position(name).map(|idx| &self.attributes[idx])
    }

    /// Whether `name` (or the attribute it aliases) is defined
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_ok()
    }
}

/// Builder for [`Schema`]
#[derive(Debug)]
pub struct SchemaBuilder {
    table: String,
    attributes: Vec<AttributeDefinition>,
    aliases: Vec<(String, String)>,
    primary_key: Option<String>,
    config: TrackingConfig,
}

impl SchemaBuilder {
    /// Add a persisted attribute with no default
    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>, ty: AttributeType) -> Self {
        self.attributes.push(AttributeDefinition::new(name, ty));
        self
    }

    /// Add a fully specified attribute
    #[must_use]
    pub fn define(mut self, definition: AttributeDefinition) -> Self {
        self.attributes.push(definition);
        self
    }

    /// Make `alias` another name for `target`
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>, target: impl Into<String>) -> Self {
        self.aliases.push((alias.into(), target.into()));
        self
    }

    /// Primary key attribute; defaults to `id` when such an attribute exists
    #[must_use]
    pub fn primary_key(mut self, name: impl Into<String>) -> Self {
        self.primary_key = Some(name.into());
        self
    }

    #[must_use]
    pub fn config(mut self, config: TrackingConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate definitions, resolve timestamp zones and cast defaults
    ///
    /// # Errors
    ///
    /// Returns `TrackingError::InvalidSchema` for duplicate names, aliases that
    /// shadow or miss attributes, an unknown primary key or an unparsable zone,
    /// and `TrackingError::Cast` for defaults the attribute type rejects.
    pub fn build(self) -> Result<Arc<Schema>, TrackingError> {
        let SchemaBuilder {
            table,
            mut attributes,
            aliases,
            primary_key,
            config,
        } = self;

        let mut positions = HashMap::with_capacity(attributes.len());
        for (idx, def) in attributes.iter().enumerate() {
            if positions.insert(def.name.clone(), idx).is_some() {
                return Err(TrackingError::InvalidSchema(format!(
                    "attribute {} defined twice on {}",
                    def.name, table
                )));
            }
        }

        let mut alias_map = HashMap::with_capacity(aliases.len());
        for (alias, target) in aliases {
            if positions.contains_key(&alias) {
                return Err(TrackingError::InvalidSchema(format!(
                    "alias {} shadows an attribute of {}",
                    alias, table
                )));
            }
            if !positions.contains_key(&target) {
                return Err(TrackingError::InvalidSchema(format!(
                    "alias {} targets unknown attribute {}",
                    alias, target
                )));
            }
            alias_map.insert(alias, target);
        }

        let primary_key = match primary_key {
            Some(pk) if positions.contains_key(&pk) => Some(pk),
            Some(pk) => {
                return Err(TrackingError::InvalidSchema(format!(
                    "primary key {} is not an attribute of {}",
                    pk, table
                )))
            }
            None => positions.contains_key("id").then(|| "id".to_string()),
        };

        for def in &mut attributes {
            if let AttributeType::Timestamp { zone, .. } = &mut def.ty {
                *zone = config.zone_for(&def.name)?;
            }
            def.cast_default = match &def.default {
                Some(raw) => def.ty.cast(&def.name, raw.clone())?,
                None => None,
            };
        }

        log::debug!(
            "built schema for {} with {} attributes",
            table,
            attributes.len()
        );

        Ok(Arc::new(Schema {
            table,
            attributes,
            positions,
            aliases: alias_map,
            primary_key,
            config,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parrots() -> Arc<Schema> {
        Schema::builder("parrots")
            .attribute("id", AttributeType::Integer)
            .attribute("name", AttributeType::Text)
            .alias("title", "name")
            .build()
            .unwrap()
    }

    #[test]
    fn test_alias_resolves_to_target() {
        let schema = parrots();
        assert_eq!(schema.resolve("title").unwrap(), "name");
        assert_eq!(schema.position("title").unwrap(), 1);
        assert!(schema.contains("title"));
    }

    #[test]
    fn test_unknown_attribute() {
        let schema = parrots();
        assert_eq!(
            schema.position("beak").unwrap_err(),
            TrackingError::UnknownAttribute("beak".to_string())
        );
    }

    #[test]
    fn test_primary_key_defaults_to_id() {
        assert_eq!(parrots().primary_key(), Some("id"));
        let keyless = Schema::builder("tags")
            .attribute("label", AttributeType::Text)
            .build()
            .unwrap();
        assert_eq!(keyless.primary_key(), None);
        assert_eq!(keyless.primary_key_position(), None);
        assert_eq!(parrots().primary_key_position(), Some(0));
    }

    #[test]
    fn test_duplicate_attribute_rejected() {
        let err = Schema::builder("pirates")
            .attribute("id", AttributeType::Integer)
            .attribute("id", AttributeType::Integer)
            .build()
            .unwrap_err();
        assert!(matches!(err, TrackingError::InvalidSchema(_)));
    }

    #[test]
    fn test_dangling_alias_rejected() {
        let err = Schema::builder("parrots")
            .attribute("name", AttributeType::Text)
            .alias("title", "label")
            .build()
            .unwrap_err();
        assert!(matches!(err, TrackingError::InvalidSchema(_)));
    }

    #[test]
    fn test_defaults_are_cast_at_build() {
        let schema = Schema::builder("topics")
            .define(
                AttributeDefinition::new("approved", AttributeType::boolean()).default_value(1),
            )
            .build()
            .unwrap();
        assert_eq!(
            schema.definition("approved").unwrap().cast_default(),
            Some(&CastValue::Boolean(true))
        );

        let err = Schema::builder("topics")
            .define(
                AttributeDefinition::new("replies", AttributeType::Integer).default_value("many"),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, TrackingError::Cast { .. }));
    }

    #[test]
    fn test_timestamp_zone_resolved_from_config() {
        let config = TrackingConfig {
            default_time_zone: "+01:00".to_string(),
            skip_time_zone_conversion_for_attributes: vec!["created_on".to_string()],
            ..TrackingConfig::default()
        };
        let schema = Schema::builder("pirates")
            .attribute("created_on", AttributeType::timestamp())
            .attribute("updated_on", AttributeType::timestamp())
            .config(config)
            .build()
            .unwrap();
        let zone = |name: &str| match schema.definition(name).unwrap().attribute_type() {
            AttributeType::Timestamp { zone, .. } => zone.map(|z| z.local_minus_utc()),
            _ => unreachable!(),
        };
        assert_eq!(zone("created_on"), None);
        assert_eq!(zone("updated_on"), Some(3600));
    }
}
