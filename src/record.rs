//! `Record`: one tracked record instance.
//!
//! A record couples an [`AttributeSet`] with the [`ChangeHistory`] of its last
//! save and whether it has been persisted yet. Reads, writes, and change
//! queries delegate to the attribute set; `save` / `reload` drive a
//! [`PersistenceExecutor`] and apply the outcome.
//!
//! # Example
//!
//! ```
//! use changeguard::{AttributeType, MemoryExecutor, Record, Schema};
//!
//! let schema = Schema::builder("pirates")
//!     .attribute("id", AttributeType::Integer)
//!     .attribute("catchphrase", AttributeType::Text)
//!     .build()
//!     .unwrap();
//! let executor = MemoryExecutor::new();
//!
//! let mut pirate = Record::new(schema);
//! pirate.set("catchphrase", "arrr").unwrap();
//! pirate.save(&executor).unwrap();
//!
//! assert!(!pirate.is_changed().unwrap());
//! assert!(pirate.previous_changes().contains("catchphrase"));
//! assert!(pirate.previous_changes().contains("id"));
//! ```

use crate::attribute::{AttributeSet, AttributeSlot};
use crate::config::TrackingConfig;
use crate::dirty::{AttributeChange, ChangeHistory, ChangeSet};
use crate::error::TrackingError;
use crate::executor::PersistenceExecutor;
use crate::planner::{PersistenceState, WritePlan, WritePlanner};
use crate::schema::Schema;
use crate::value::{CastValue, RawValue};
use chrono::{DateTime, Utc};
use sea_query::Value;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Record {
    attributes: AttributeSet,
    history: ChangeHistory,
    state: PersistenceState,
}

impl Record {
    /// New, unsaved record with every attribute at its default
    #[must_use]
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            attributes: AttributeSet::new(schema),
            history: ChangeHistory::new(),
            state: PersistenceState::New,
        }
    }

    /// Persisted record built from a loaded row
    ///
    /// Columns missing from `values` were not selected: they start unknown
    /// and become dirty as soon as they are assigned, even to null.
    ///
    /// # Errors
    ///
    /// Returns `UnknownAttribute` or `Cast`.
    pub fn from_database<I, K, V>(schema: Arc<Schema>, values: I) -> Result<Self, TrackingError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<RawValue>,
    {
        Ok(Self {
            attributes: AttributeSet::from_database(schema, values)?,
            history: ChangeHistory::new(),
            state: PersistenceState::Persisted,
        })
    }

    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        self.attributes.schema()
    }

    #[must_use]
    pub fn attributes(&self) -> &AttributeSet {
        &self.attributes
    }

    #[must_use]
    pub fn state(&self) -> PersistenceState {
        self.state
    }

    #[must_use]
    pub fn is_new_record(&self) -> bool {
        self.state == PersistenceState::New
    }

    #[must_use]
    pub fn is_persisted(&self) -> bool {
        self.state == PersistenceState::Persisted
    }

    /// Current primary key value
    #[must_use]
    pub fn id(&self) -> Option<&CastValue> {
        let pk = self.schema().primary_key()?;
        self.attributes.peek(pk).ok().flatten()
    }

    pub fn set(&mut self, name: &str, raw: impl Into<RawValue>) -> Result<(), TrackingError> {
        self.attributes.set(name, raw)
    }

    pub fn get(&mut self, name: &str) -> Result<Option<&CastValue>, TrackingError> {
        self.attributes.get(name)
    }

    pub fn peek(&self, name: &str) -> Result<Option<&CastValue>, TrackingError> {
        self.attributes.peek(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Result<Option<&mut CastValue>, TrackingError> {
        self.attributes.get_mut(name)
    }

    pub fn slot(&self, name: &str) -> Result<&AttributeSlot, TrackingError> {
        self.attributes.slot(name)
    }

    pub fn changed(&self, name: &str) -> Result<bool, TrackingError> {
        self.attributes.changed(name)
    }

    pub fn is_changed(&self) -> Result<bool, TrackingError> {
        self.attributes.detector().is_changed()
    }

    pub fn changed_names(&self) -> Result<Vec<&str>, TrackingError> {
        self.attributes.detector().changed_names()
    }

    pub fn changes(&self) -> Result<ChangeSet, TrackingError> {
        self.attributes.detector().changes()
    }

    pub fn changed_value(
        &self,
        name: &str,
        from: Option<&CastValue>,
    ) -> Result<bool, TrackingError> {
        self.attributes.detector().changed_value(name, from)
    }

    pub fn changed_value_to(
        &self,
        name: &str,
        from: Option<&CastValue>,
        to: Option<&CastValue>,
    ) -> Result<bool, TrackingError> {
        self.attributes.detector().changed_value_to(name, from, to)
    }

    pub fn attribute_change(&self, name: &str) -> Result<Option<AttributeChange>, TrackingError> {
        self.attributes.detector().attribute_change(name)
    }

    /// Value as of the last clean state
    pub fn attribute_was(&self, name: &str) -> Result<Option<&CastValue>, TrackingError> {
        self.attributes.original(name)
    }

    pub fn mark_will_change(&mut self, name: &str) -> Result<(), TrackingError> {
        self.attributes.mark_will_change(name)
    }

    pub fn restore(&mut self, name: &str) -> Result<(), TrackingError> {
        self.attributes.restore(name)
    }

    pub fn restore_all(&mut self) {
        self.attributes.restore_all();
    }

    /// Changes captured by the last successful save
    #[must_use]
    pub fn previous_changes(&self) -> &ChangeSet {
        self.history.changes()
    }

    /// Plan the next save without performing it
    ///
    /// # Errors
    ///
    /// See [`WritePlanner::plan`].
    pub fn plan(&self, now: DateTime<Utc>) -> Result<WritePlan, TrackingError> {
        self.plan_with(self.schema().config(), now)
    }

    /// Plan the next save under `config` instead of the schema's own
    ///
    /// # Errors
    ///
    /// See [`WritePlanner::plan`].
    pub fn plan_with(
        &self,
        config: &TrackingConfig,
        now: DateTime<Utc>,
    ) -> Result<WritePlan, TrackingError> {
        WritePlanner::new(config).plan(&self.attributes, self.state, now)
    }

    /// Apply a write the executor reported as successful
    ///
    /// Assigns the planner's bookkeeping values and the generated key, then
    /// records the diff into the change history and makes the record clean.
    /// A `Skip` plan still replaces the history (with an empty diff).
    ///
    /// The outcome is applied to a copy of the store and swapped in only once
    /// everything succeeded.
    ///
    /// # Errors
    ///
    /// Returns `Cast` if the generated key is rejected by the key attribute;
    /// the record is then left exactly as it was.
    pub fn write_succeeded(
        &mut self,
        plan: &WritePlan,
        generated_key: Option<RawValue>,
    ) -> Result<(), TrackingError> {
        let key = match (plan, generated_key) {
            (WritePlan::Insert(op), Some(raw)) => match op.primary_key.as_deref() {
                Some(pk) => {
                    let def = self.schema().definition(pk)?;
                    Some((pk, def.attribute_type().cast(def.name(), raw)?))
                }
                None => None,
            },
            _ => None,
        };

        let mut attributes = self.attributes.clone();
        if let Some(op) = plan.operation() {
            for (name, value) in op.bookkeeping() {
                attributes.assign_cast(name, value.clone())?;
            }
        }
        if let Some((pk, value)) = key {
            if attributes.peek(pk)?.is_none() {
                attributes.assign_cast(pk, value)?;
            }
        }
        attributes.clean_cut(&mut self.history)?;

        self.attributes = attributes;
        if matches!(plan, WritePlan::Insert(_)) {
            self.state = PersistenceState::Persisted;
        }
        Ok(())
    }

    /// Note a failed write; the record keeps its dirty state.
    pub fn write_failed(&self, err: TrackingError) -> TrackingError {
        log::warn!("write to {} failed: {}", self.schema().table(), err);
        err
    }

    /// Re-seed from a freshly read row and forget the last save
    ///
    /// # Errors
    ///
    /// Returns `UnknownAttribute` or `Cast`; the record is then unchanged.
    pub fn reload_completed<I, K, V>(&mut self, values: I) -> Result<(), TrackingError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<RawValue>,
    {
        self.attributes.reload(values)?;
        self.history.clear();
        self.state = PersistenceState::Persisted;
        log::debug!("reloaded {} {:?}", self.schema().table(), self.id());
        Ok(())
    }

    /// Save with the current time for automatic timestamps
    ///
    /// # Errors
    ///
    /// See [`Record::save_at`].
    pub fn save<E: PersistenceExecutor + ?Sized>(
        &mut self,
        executor: &E,
    ) -> Result<WritePlan, TrackingError> {
        self.save_at(executor, Utc::now())
    }

    /// Plan, execute, and apply one save
    ///
    /// # Arguments
    ///
    /// * `executor` - Storage to write to
    /// * `now` - Instant used for automatic timestamps
    ///
    /// # Returns
    ///
    /// The plan that was executed. `WritePlan::Skip` means no statement was
    /// issued.
    ///
    /// # Errors
    ///
    /// Returns planning errors, or the executor's failure. On failure the
    /// record's attributes, dirty state and history are left as they were.
    pub fn save_at<E: PersistenceExecutor + ?Sized>(
        &mut self,
        executor: &E,
        now: DateTime<Utc>,
    ) -> Result<WritePlan, TrackingError> {
        let config = self.schema().config().clone();
        self.save_with(executor, &config, now)
    }

    /// Save under an explicit tracking configuration
    ///
    /// # Errors
    ///
    /// See [`Record::save_at`].
    pub fn save_with<E: PersistenceExecutor + ?Sized>(
        &mut self,
        executor: &E,
        config: &TrackingConfig,
        now: DateTime<Utc>,
    ) -> Result<WritePlan, TrackingError> {
        let plan = self.plan_with(config, now)?;
        let generated = match &plan {
            WritePlan::Skip => None,
            WritePlan::Insert(op) => executor.insert(op).map_err(|e| self.write_failed(e))?,
            WritePlan::Update(op) => {
                executor.update(op).map_err(|e| self.write_failed(e))?;
                None
            }
        };
        self.write_succeeded(&plan, generated)?;
        Ok(plan)
    }

    /// Replace every attribute with the stored row
    ///
    /// # Errors
    ///
    /// Returns `PrimaryKeyRequired` for records without a key and
    /// `RecordNotFound` when the row is gone.
    pub fn reload<E: PersistenceExecutor + ?Sized>(
        &mut self,
        executor: &E,
    ) -> Result<(), TrackingError> {
        let (pk, key) = self.stored_key()?;
        let row = executor
            .fetch(self.schema().table(), &pk, &key)?
            .ok_or(TrackingError::RecordNotFound)?;
        let values = row
            .into_iter()
            .map(|(name, value)| Ok((name, RawValue::try_from(value)?)))
            .collect::<Result<Vec<_>, TrackingError>>()?;
        self.reload_completed(values)
    }

    /// Write columns straight to storage
    ///
    /// Values are cast and serialized through their attribute types, but the
    /// record itself is not modified: its attributes, dirty state and change
    /// history stay exactly as they were.
    ///
    /// # Errors
    ///
    /// Returns `UnknownAttribute`, `Cast`, `PrimaryKeyRequired`, or the
    /// executor's failure.
    pub fn update_columns<E, I, K, V>(&self, executor: &E, values: I) -> Result<u64, TrackingError>
    where
        E: PersistenceExecutor + ?Sized,
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<RawValue>,
    {
        let (pk, key) = self.stored_key()?;
        let schema = self.schema();
        let mut columns = Vec::new();
        for (name, raw) in values {
            let def = schema.definition(name.as_ref())?;
            let ty = def.attribute_type();
            let value = ty.cast(def.name(), raw.into())?;
            columns.push((def.name().to_string(), ty.serialize(value.as_ref())));
        }
        executor.update_columns(schema.table(), &pk, &key, &columns)
    }

    /// Independent unsaved copy
    ///
    /// Attribute values and their dirty state are copied; the primary key is
    /// cleared and the copy starts with an empty history.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        let mut attributes = self.attributes.duplicate();
        attributes.reset_primary_key();
        Self {
            attributes,
            history: ChangeHistory::new(),
            state: PersistenceState::New,
        }
    }

    fn stored_key(&self) -> Result<(String, Value), TrackingError> {
        if self.is_new_record() {
            return Err(TrackingError::PrimaryKeyRequired);
        }
        let pk = self.schema().primary_key().ok_or(TrackingError::PrimaryKeyRequired)?;
        let slot = self.attributes.slot(pk)?;
        let key = slot
            .original()
            .or_else(|| slot.current())
            .ok_or(TrackingError::PrimaryKeyRequired)?;
        let ty = self.schema().definition(pk)?.attribute_type();
        Ok((pk.to_string(), ty.serialize(Some(key))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::AttributeType;
    use crate::executor::MemoryExecutor;
    use chrono::TimeZone;

    fn pirates() -> Arc<Schema> {
        Schema::builder("pirates")
            .attribute("id", AttributeType::Integer)
            .attribute("catchphrase", AttributeType::Text)
            .attribute("parrot_id", AttributeType::Integer)
            .build()
            .unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_failed_save_keeps_changes() {
        let executor = MemoryExecutor::new();
        let mut pirate = Record::new(pirates());
        pirate.set("catchphrase", "arrr").unwrap();
        executor.fail_next_write("disk full");
        assert!(pirate.save_at(&executor, now()).is_err());
        assert!(pirate.is_new_record());
        assert_eq!(pirate.changed_names().unwrap(), vec!["catchphrase"]);
        assert!(pirate.previous_changes().is_empty());
    }

    #[test]
    fn test_rejected_generated_key_leaves_record_untouched() {
        let schema = Schema::builder("parrots")
            .attribute("id", AttributeType::Uuid)
            .attribute("name", AttributeType::Text)
            .attribute("updated_at", AttributeType::timestamp())
            .build()
            .unwrap();
        let executor = MemoryExecutor::new();
        let mut parrot = Record::new(schema);
        parrot.set("name", "Polly").unwrap();

        // the memory executor generates integer keys
        let err = parrot.save_at(&executor, now()).unwrap_err();
        assert!(matches!(err, TrackingError::Cast { ref attribute, .. } if attribute == "id"));
        assert!(parrot.is_new_record());
        assert_eq!(parrot.peek("updated_at").unwrap(), None);
        assert_eq!(parrot.changed_names().unwrap(), vec!["name"]);
        assert!(parrot.previous_changes().is_empty());
    }

    #[test]
    fn test_skip_save_clears_previous_changes() {
        let executor = MemoryExecutor::new();
        let mut pirate = Record::new(pirates());
        pirate.set("catchphrase", "arrr").unwrap();
        pirate.save_at(&executor, now()).unwrap();
        assert_eq!(pirate.previous_changes().len(), 2);
        assert!(pirate.save_at(&executor, now()).unwrap().is_skip());
        assert!(pirate.previous_changes().is_empty());
        assert_eq!(executor.write_count(), 1);
    }

    #[test]
    fn test_duplicate_resets_key() {
        let mut pirate = Record::from_database(
            pirates(),
            [
                ("id", RawValue::Int(5)),
                ("catchphrase", RawValue::from("arrr")),
                ("parrot_id", RawValue::Null),
            ],
        )
        .unwrap();
        pirate.set("parrot_id", 2).unwrap();
        let copy = pirate.duplicate();
        assert!(copy.is_new_record());
        assert_eq!(copy.id(), None);
        assert_eq!(copy.changed_names().unwrap(), vec!["parrot_id"]);
        pirate.restore_all();
        assert!(copy.changed("parrot_id").unwrap());
    }

    #[test]
    fn test_update_columns_bypasses_tracking() {
        let executor = MemoryExecutor::new();
        let mut pirate = Record::new(pirates());
        pirate.set("catchphrase", "arrr").unwrap();
        pirate.save_at(&executor, now()).unwrap();
        pirate.set("parrot_id", 3).unwrap();

        pirate
            .update_columns(&executor, [("catchphrase", "Ahoy!")])
            .unwrap();
        assert_eq!(pirate.peek("catchphrase").unwrap(), Some(&CastValue::from("arrr")));
        assert_eq!(pirate.changed_names().unwrap(), vec!["parrot_id"]);
        assert_eq!(pirate.previous_changes().len(), 2);

        pirate.reload(&executor).unwrap();
        assert_eq!(pirate.peek("catchphrase").unwrap(), Some(&CastValue::from("Ahoy!")));
        assert!(!pirate.is_changed().unwrap());
        assert!(pirate.previous_changes().is_empty());
    }

    #[test]
    fn test_new_record_cannot_reload() {
        let executor = MemoryExecutor::new();
        let mut pirate = Record::new(pirates());
        assert_eq!(pirate.reload(&executor).unwrap_err(), TrackingError::PrimaryKeyRequired);
    }
}
