//! # Changeguard
//!
//! Attribute-level change tracking for persistent records: type-aware dirty
//! checking, change history across saves, and partial writes with optimistic
//! locking.
//!
//! A [`Schema`] describes a record kind; each [`Record`] owns an
//! [`AttributeSet`] whose slots remember the last stored value next to the
//! current one. The [`WritePlanner`] turns the difference into a
//! [`WritePlan`], which a [`PersistenceExecutor`] carries out.

pub mod attribute;
pub mod config;
pub mod dirty;
pub mod error;
pub mod executor;
pub mod planner;
pub mod record;
pub mod schema;
pub mod value;

pub use attribute::{AttributeSet, AttributeSlot, AttributeType, BooleanStorage, CustomType};
pub use config::TrackingConfig;
pub use dirty::{AttributeChange, ChangeDetector, ChangeHistory, ChangeSet};
pub use error::TrackingError;
pub use executor::{MemoryExecutor, PersistenceExecutor, StoredRow};
pub use planner::{LockCondition, PersistenceState, WriteOperation, WritePlan, WritePlanner};
pub use record::Record;
pub use schema::{AttributeDefinition, Schema, SchemaBuilder};
pub use value::{CastValue, RawValue};
