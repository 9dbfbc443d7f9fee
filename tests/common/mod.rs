//! Shared schemas and helpers for the behavioral tests.

#![allow(dead_code)]

use changeguard::{
    AttributeDefinition, AttributeType, MemoryExecutor, RawValue, Record, Schema, TrackingConfig,
    TrackingError,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;

/// Fixed clock so timestamp assertions are deterministic.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub fn later(seconds: i64) -> DateTime<Utc> {
    now() + Duration::seconds(seconds)
}

pub fn zoned(zone: &str) -> TrackingConfig {
    TrackingConfig {
        default_time_zone: zone.to_string(),
        ..TrackingConfig::default()
    }
}

pub fn pirates_with(config: TrackingConfig) -> Arc<Schema> {
    Schema::builder("pirates")
        .attribute("id", AttributeType::Integer)
        .attribute("catchphrase", AttributeType::Text)
        .attribute("parrot_id", AttributeType::Integer)
        .attribute("created_on", AttributeType::timestamp())
        .attribute("updated_on", AttributeType::timestamp())
        .config(config)
        .build()
        .expect("pirates schema")
}

pub fn pirates() -> Arc<Schema> {
    pirates_with(TrackingConfig::default())
}

pub fn parrots() -> Arc<Schema> {
    Schema::builder("parrots")
        .attribute("id", AttributeType::Integer)
        .attribute("name", AttributeType::Text)
        .alias("title", "name")
        .build()
        .expect("parrots schema")
}

pub fn people() -> Arc<Schema> {
    people_builder().build().expect("people schema")
}

pub fn people_builder() -> changeguard::SchemaBuilder {
    Schema::builder("people")
        .attribute("id", AttributeType::Integer)
        .attribute("first_name", AttributeType::Text)
        .define(AttributeDefinition::new("lock_version", AttributeType::Integer).default_value(0))
        .define(
            AttributeDefinition::new("followers_count", AttributeType::Integer).default_value(0),
        )
}

pub fn topics_with(config: TrackingConfig) -> Arc<Schema> {
    Schema::builder("topics")
        .attribute("id", AttributeType::Integer)
        .attribute("author_name", AttributeType::Text)
        .attribute("content", AttributeType::Json)
        .attribute("written_on", AttributeType::timestamp())
        .define(AttributeDefinition::new("approved", AttributeType::boolean()).default_value(true))
        .attribute("updated_at", AttributeType::timestamp())
        .config(config)
        .build()
        .expect("topics schema")
}

pub fn topics() -> Arc<Schema> {
    topics_with(TrackingConfig::default())
}

pub fn numeric_data() -> Arc<Schema> {
    Schema::builder("numeric_data")
        .attribute("id", AttributeType::Integer)
        .attribute("bank_balance", AttributeType::Decimal { scale: Some(2) })
        .attribute("temperature", AttributeType::Float)
        .build()
        .expect("numeric_data schema")
}

/// Build, assign and save a new record.
pub fn create<'a>(
    executor: &MemoryExecutor,
    schema: &Arc<Schema>,
    values: impl IntoIterator<Item = (&'a str, RawValue)>,
) -> Result<Record, TrackingError> {
    let mut record = Record::new(Arc::clone(schema));
    for (name, value) in values {
        record.set(name, value)?;
    }
    record.save_at(executor, now())?;
    Ok(record)
}

/// Load a stored row by primary key, like a fresh `find`.
pub fn find(
    executor: &MemoryExecutor,
    schema: &Arc<Schema>,
    id: &RawValue,
) -> Result<Record, TrackingError> {
    let mut record = Record::from_database(Arc::clone(schema), [("id", id.clone())])?;
    record.reload(executor)?;
    Ok(record)
}

pub fn id_of(record: &Record) -> RawValue {
    RawValue::from(record.id().cloned())
}
