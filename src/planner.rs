//! Write planning: turn an attribute set's dirty state into a storage write.
//!
//! The planner reads an [`AttributeSet`] and the kind's [`TrackingConfig`] and
//! produces a [`WritePlan`]. It never touches the store: bookkeeping values it
//! decides on (timestamps, the next lock version) travel inside the plan and
//! are applied by the record only once the executor reports success.
//!
//! | state     | partial writes                       | always-write                    |
//! |-----------|--------------------------------------|---------------------------------|
//! | new       | non-default columns + timestamps     | every non-null column           |
//! | persisted | changed columns, `Skip` when none    | every known column              |

use crate::attribute::AttributeSet;
use crate::config::TrackingConfig;
use crate::error::TrackingError;
use crate::value::{CastValue, RawValue};
use chrono::{DateTime, Utc};
use sea_query::{
    Alias, Expr, ExprTrait, InsertStatement, PostgresQueryBuilder, Query, UpdateStatement, Value,
    Values,
};
use std::collections::HashSet;

/// Whether the record has a stored counterpart yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceState {
    New,
    Persisted,
}

/// Optimistic lock check for the storage layer to enforce
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockCondition {
    pub column: String,
    /// Version the stored row must still carry
    pub expected: i64,
}

/// One planned insert or update
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOperation {
    pub table: String,
    pub primary_key: Option<String>,
    /// Stored key of the row to update (`None` for inserts)
    pub key: Option<Value>,
    /// Columns to write, in definition order
    pub columns: Vec<(String, Value)>,
    pub lock: Option<LockCondition>,
    bookkeeping: Vec<(String, Option<CastValue>)>,
}

impl WriteOperation {
    /// Operation without columns, key, or lock condition
    #[must_use]
    pub fn new(table: impl Into<String>, primary_key: Option<String>) -> Self {
        Self {
            table: table.into(),
            primary_key,
            key: None,
            columns: Vec::new(),
            lock: None,
            bookkeeping: Vec::new(),
        }
    }

    /// Storage value planned for a column
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Value> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    /// Values the planner filled in itself (timestamps, next lock version)
    ///
    /// The record assigns these after the write succeeds.
    #[must_use]
    pub fn bookkeeping(&self) -> &[(String, Option<CastValue>)] {
        &self.bookkeeping
    }

    /// Render as an `INSERT`
    ///
    /// An operation without columns becomes `INSERT INTO ... VALUES (DEFAULT)`.
    ///
    /// # Errors
    ///
    /// Returns `TrackingError::Persistence` if sea-query rejects the statement.
    pub fn insert_statement(&self) -> Result<InsertStatement, TrackingError> {
        let mut query = Query::insert();
        query.into_table(Alias::new(self.table.as_str()));
        if self.columns.is_empty() {
            query.or_default_values();
            return Ok(query);
        }
        query.columns(self.columns.iter().map(|(n, _)| Alias::new(n.as_str())));
        query
            .values(self.columns.iter().map(|(_, v)| Expr::val(v.clone())))
            .map_err(|e| TrackingError::Persistence(format!("Failed to build insert: {}", e)))?;
        Ok(query)
    }

    /// Render as an `UPDATE` keyed on the primary key, with the lock check in
    /// the `WHERE` clause
    ///
    /// # Errors
    ///
    /// Returns `TrackingError::PrimaryKeyRequired` if the operation has no key.
    pub fn update_statement(&self) -> Result<UpdateStatement, TrackingError> {
        let (pk, key) = match (&self.primary_key, &self.key) {
            (Some(pk), Some(key)) => (pk, key),
            _ => return Err(TrackingError::PrimaryKeyRequired),
        };
        let mut query = Query::update();
        query.table(Alias::new(self.table.as_str()));
        for (name, value) in &self.columns {
            query.value(Alias::new(name.as_str()), Expr::val(value.clone()));
        }
        query.and_where(Expr::col(Alias::new(pk.as_str())).eq(key.clone()));
        if let Some(lock) = &self.lock {
            query.and_where(Expr::col(Alias::new(lock.column.as_str())).eq(lock.expected));
        }
        Ok(query)
    }
}

/// Outcome of planning one save
#[derive(Debug, Clone, PartialEq)]
pub enum WritePlan {
    /// Nothing to write; no statement is issued
    Skip,
    Insert(WriteOperation),
    Update(WriteOperation),
}

impl WritePlan {
    #[must_use]
    pub fn is_skip(&self) -> bool {
        matches!(self, WritePlan::Skip)
    }

    #[must_use]
    pub fn operation(&self) -> Option<&WriteOperation> {
        match self {
            WritePlan::Skip => None,
            WritePlan::Insert(op) | WritePlan::Update(op) => Some(op),
        }
    }

    /// PostgreSQL text and bind values, `None` for `Skip`
    ///
    /// # Errors
    ///
    /// Propagates statement construction failures.
    pub fn to_sql(&self) -> Result<Option<(String, Values)>, TrackingError> {
        Ok(match self {
            WritePlan::Skip => None,
            WritePlan::Insert(op) => Some(op.insert_statement()?.build(PostgresQueryBuilder)),
            WritePlan::Update(op) => Some(op.update_statement()?.build(PostgresQueryBuilder)),
        })
    }
}

/// Computes write plans under one tracking configuration
#[derive(Debug, Clone, Copy)]
pub struct WritePlanner<'a> {
    config: &'a TrackingConfig,
}

impl<'a> WritePlanner<'a> {
    #[must_use]
    pub fn new(config: &'a TrackingConfig) -> Self {
        Self { config }
    }

    /// Plan the write for one save
    ///
    /// # Arguments
    ///
    /// * `attributes` - The record's attribute store (left untouched)
    /// * `state` - Whether the record is new or already persisted
    /// * `now` - Instant used for automatic timestamps
    ///
    /// # Returns
    ///
    /// `WritePlan::Insert` for new records (possibly without columns),
    /// `WritePlan::Update` for persisted records with something to write, and
    /// `WritePlan::Skip` when a partial update would write nothing.
    ///
    /// # Errors
    ///
    /// Returns `PrimaryKeyRequired` when a persisted record has no key, `Cast`
    /// if a timestamp attribute rejects `now`, or the failure of an attribute
    /// type comparison.
    pub fn plan(
        &self,
        attributes: &AttributeSet,
        state: PersistenceState,
        now: DateTime<Utc>,
    ) -> Result<WritePlan, TrackingError> {
        let changed: HashSet<&str> = attributes.detector().changed_names()?.into_iter().collect();
        match state {
            PersistenceState::New => self.plan_insert(attributes, &changed, now),
            PersistenceState::Persisted => self.plan_update(attributes, &changed, now),
        }
    }

    fn plan_insert(
        &self,
        attributes: &AttributeSet,
        changed: &HashSet<&str>,
        now: DateTime<Utc>,
    ) -> Result<WritePlan, TrackingError> {
        let schema = attributes.schema();
        let mut bookkeeping = Vec::new();
        if self.config.record_timestamps {
            let names = self
                .config
                .create_timestamp_attributes
                .iter()
                .chain(&self.config.update_timestamp_attributes);
            for name in names {
                if self.is_storable(attributes, name) && attributes.peek(name)?.is_none() {
                    bookkeeping.push((name.clone(), timestamp_value(attributes, name, now)?));
                }
            }
        }

        let mut columns = Vec::new();
        for (def, slot) in attributes.iter() {
            if !def.is_persisted() {
                continue;
            }
            let planned = planned_value(&bookkeeping, def.name());
            let value = planned.unwrap_or_else(|| slot.current());
            // columns still at their schema default are left to the storage default
            let include = if self.config.partial_writes {
                planned.is_some()
                    || changed.contains(def.name())
                    || (value.is_some() && !def.attribute_type().equal(value, def.cast_default()))
            } else {
                value.is_some()
            };
            if include {
                columns.push((def.name().to_string(), def.attribute_type().serialize(value)));
            }
        }

        log::debug!(
            "planned insert into {} ({} columns)",
            schema.table(),
            columns.len()
        );
        Ok(WritePlan::Insert(WriteOperation {
            table: schema.table().to_string(),
            primary_key: schema.primary_key().map(str::to_string),
            key: None,
            columns,
            lock: None,
            bookkeeping,
        }))
    }

    fn plan_update(
        &self,
        attributes: &AttributeSet,
        changed: &HashSet<&str>,
        now: DateTime<Utc>,
    ) -> Result<WritePlan, TrackingError> {
        let schema = attributes.schema();
        let pk = schema.primary_key().ok_or(TrackingError::PrimaryKeyRequired)?;
        let pk_slot = attributes.slot(pk)?;
        let key = pk_slot
            .original()
            .or_else(|| pk_slot.current())
            .ok_or(TrackingError::PrimaryKeyRequired)?;
        let key = schema.definition(pk)?.attribute_type().serialize(Some(key));

        let candidates: Vec<&str> = attributes
            .iter()
            .filter(|(def, slot)| {
                def.is_persisted()
                    && if self.config.partial_writes {
                        changed.contains(def.name())
                    } else {
                        (slot.is_known() || slot.is_assigned())
                            && (def.name() != pk || changed.contains(pk))
                    }
            })
            .map(|(def, _)| def.name())
            .collect();
        if candidates.is_empty() {
            log::debug!("no changes to write for {}, skipping update", schema.table());
            return Ok(WritePlan::Skip);
        }

        let mut bookkeeping = Vec::new();
        if self.config.record_timestamps {
            for name in &self.config.update_timestamp_attributes {
                if self.is_storable(attributes, name) && !changed.contains(name.as_str()) {
                    bookkeeping.push((name.clone(), timestamp_value(attributes, name, now)?));
                }
            }
        }

        let mut lock = None;
        if self.config.lock_optimistically
            && self.is_storable(attributes, &self.config.locking_column)
        {
            let column = &self.config.locking_column;
            let expected = attributes
                .original(column)?
                .and_then(CastValue::as_i64)
                .unwrap_or(0);
            let next = expected.checked_add(1).ok_or_else(|| TrackingError::Type {
                attribute: column.clone(),
                message: format!("lock version {} cannot be incremented", expected),
            })?;
            bookkeeping.retain(|(name, _)| name != column);
            bookkeeping.push((column.clone(), Some(CastValue::Integer(next))));
            lock = Some(LockCondition {
                column: column.clone(),
                expected,
            });
        }

        let mut columns = Vec::new();
        for (def, slot) in attributes.iter() {
            let planned = planned_value(&bookkeeping, def.name());
            if planned.is_none() && !candidates.contains(&def.name()) {
                continue;
            }
            let value = planned.unwrap_or_else(|| slot.current());
            columns.push((def.name().to_string(), def.attribute_type().serialize(value)));
        }

        log::debug!(
            "planned update of {} ({} columns, lock: {:?})",
            schema.table(),
            columns.len(),
            lock
        );
        Ok(WritePlan::Update(WriteOperation {
            table: schema.table().to_string(),
            primary_key: Some(pk.to_string()),
            key: Some(key),
            columns,
            lock,
            bookkeeping,
        }))
    }

    fn is_storable(&self, attributes: &AttributeSet, name: &str) -> bool {
        attributes
            .schema()
            .definition(name)
            .map(|def| def.is_persisted())
            .unwrap_or(false)
    }
}

fn planned_value<'v>(
    bookkeeping: &'v [(String, Option<CastValue>)],
    name: &str,
) -> Option<Option<&'v CastValue>> {
    bookkeeping
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.as_ref())
}

/// `now` cast through the attribute's own type (zone and precision applied)
fn timestamp_value(
    attributes: &AttributeSet,
    name: &str,
    now: DateTime<Utc>,
) -> Result<Option<CastValue>, TrackingError> {
    let def = attributes.schema().definition(name)?;
    def.attribute_type()
        .cast(def.name(), RawValue::Timestamp(now.fixed_offset()))
}
