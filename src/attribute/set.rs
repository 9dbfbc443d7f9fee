//! `AttributeSet`: the ordered attribute store of one record instance.

use super::slot::AttributeSlot;
use crate::dirty::{ChangeDetector, ChangeHistory};
use crate::error::TrackingError;
use crate::schema::{AttributeDefinition, Schema};
use crate::value::{CastValue, RawValue};
use std::sync::Arc;

/// Attribute store for a single record instance
///
/// Slots are kept in schema definition order. The schema is shared and
/// immutable; every slot is owned by this set, so `duplicate` yields a store
/// whose tracking state evolves independently of the source.
#[derive(Debug, Clone)]
pub struct AttributeSet {
    schema: Arc<Schema>,
    slots: Vec<AttributeSlot>,
}

impl AttributeSet {
    /// Store for a new record: every slot holds its default, nothing is dirty.
    #[must_use]
    pub fn new(schema: Arc<Schema>) -> Self {
        let slots = schema
            .attributes()
            .iter()
            .map(|def| AttributeSlot::from_database(def.cast_default().cloned()))
            .collect();
        Self { schema, slots }
    }

    /// Store for a loaded row
    ///
    /// Persisted attributes missing from `values` were not selected and start
    /// unknown; virtual attributes start at their default.
    ///
    /// # Errors
    ///
    /// Returns `UnknownAttribute` for columns outside the schema and `Cast`
    /// for values the attribute type rejects.
    pub fn from_database<I, K, V>(schema: Arc<Schema>, values: I) -> Result<Self, TrackingError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<RawValue>,
    {
        let mut loaded = cast_row(&schema, values)?;
        let slots = schema
            .attributes()
            .iter()
            .zip(loaded.iter_mut())
            .map(|(def, value)| match value.take() {
                Some(v) => AttributeSlot::from_database(v),
                None if def.is_persisted() => AttributeSlot::unknown(),
                None => AttributeSlot::from_database(def.cast_default().cloned()),
            })
            .collect();
        Ok(Self { schema, slots })
    }

    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Attribute names in definition order
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.schema.attributes().iter().map(AttributeDefinition::name)
    }

    /// `(definition, slot)` pairs in definition order
    pub fn iter(&self) -> impl Iterator<Item = (&AttributeDefinition, &AttributeSlot)> + '_ {
        self.schema.attributes().iter().zip(self.slots.iter())
    }

    /// Slot for an attribute (aliases resolved)
    ///
    /// # Errors
    ///
    /// Returns `UnknownAttribute` for names outside the schema.
    pub fn slot(&self, name: &str) -> Result<&AttributeSlot, TrackingError> {
        let idx = self.schema.position(name)?;
        Ok(&self.slots[idx])
    }

    /// Cast `raw` and assign it
    ///
    /// The assignment is atomic: a cast failure leaves the slot untouched.
    ///
    /// # Errors
    ///
    /// Returns `UnknownAttribute` or `Cast`.
    pub fn set(&mut self, name: &str, raw: impl Into<RawValue>) -> Result<(), TrackingError> {
        let idx = self.schema.position(name)?;
        let def = &self.schema.attributes()[idx];
        let value = def.attribute_type().cast(def.name(), raw.into())?;
        log::trace!("{}.{} = {:?}", self.schema.table(), def.name(), value);
        self.slots[idx].assign(value);
        Ok(())
    }

    /// Current value, running the attribute's read-time default hook first
    ///
    /// The hook runs at most once per assigned value; when it returns a
    /// replacement, that value is assigned through `cast` and is visible to
    /// change detection like any other assignment.
    ///
    /// # Errors
    ///
    /// Returns `UnknownAttribute`, or `Cast` if the hook's value is rejected
    /// (the slot is then left as it was).
    pub fn get(&mut self, name: &str) -> Result<Option<&CastValue>, TrackingError> {
        let idx = self.schema.position(name)?;
        let def = &self.schema.attributes()[idx];
        let slot = &mut self.slots[idx];
        if let Some(hook) = def.read_default() {
            if !slot.is_materialized() {
                match hook(slot.current()) {
                    Some(raw) => {
                        let value = def.attribute_type().cast(def.name(), raw)?;
                        slot.assign_materialized(value);
                    }
                    None => slot.mark_materialized(),
                }
            }
        }
        Ok(self.slots[idx].current())
    }

    /// Current value without running hooks
    ///
    /// # Errors
    ///
    /// Returns `UnknownAttribute` for names outside the schema.
    pub fn peek(&self, name: &str) -> Result<Option<&CastValue>, TrackingError> {
        self.slot(name).map(AttributeSlot::current)
    }

    /// Mutable access to the current value for in-place edits
    ///
    /// Edits made through this reference are picked up by change detection
    /// without any setter call.
    ///
    /// # Errors
    ///
    /// Returns `UnknownAttribute` for names outside the schema.
    pub fn get_mut(&mut self, name: &str) -> Result<Option<&mut CastValue>, TrackingError> {
        let idx = self.schema.position(name)?;
        Ok(self.slots[idx].current_mut())
    }

    /// Value as of the last clean state
    ///
    /// # Errors
    ///
    /// Returns `UnknownAttribute` for names outside the schema.
    pub fn original(&self, name: &str) -> Result<Option<&CastValue>, TrackingError> {
        self.slot(name).map(AttributeSlot::original)
    }

    /// Force an attribute dirty regardless of equality
    ///
    /// # Errors
    ///
    /// Returns `UnknownAttribute` for names outside the schema.
    pub fn mark_will_change(&mut self, name: &str) -> Result<(), TrackingError> {
        let idx = self.schema.position(name)?;
        self.slots[idx].force_dirty();
        Ok(())
    }

    /// Put the original value back and clear the forced flag
    ///
    /// # Errors
    ///
    /// Returns `UnknownAttribute` for names outside the schema.
    pub fn restore(&mut self, name: &str) -> Result<(), TrackingError> {
        let idx = self.schema.position(name)?;
        self.slots[idx].restore();
        Ok(())
    }

    pub fn restore_all(&mut self) {
        for slot in &mut self.slots {
            slot.restore();
        }
    }

    /// Whether an attribute differs from its original
    ///
    /// Only this attribute's type is consulted.
    ///
    /// # Errors
    ///
    /// Returns `UnknownAttribute`, or the attribute type's own failure.
    pub fn changed(&self, name: &str) -> Result<bool, TrackingError> {
        let idx = self.schema.position(name)?;
        let def = &self.schema.attributes()[idx];
        self.slots[idx].changed(def.name(), def.attribute_type())
    }

    /// Change detector over this store
    #[must_use]
    pub fn detector(&self) -> ChangeDetector<'_> {
        ChangeDetector::new(self)
    }

    /// Apply a successful write
    ///
    /// Records the pre-write diff into `history`, then makes every current
    /// value the new original and clears forced flags. If the diff cannot be
    /// computed nothing is touched.
    ///
    /// # Errors
    ///
    /// Propagates a failing attribute type comparison.
    pub fn clean_cut(&mut self, history: &mut ChangeHistory) -> Result<(), TrackingError> {
        let changes = self.detector().changes()?;
        history.record_save(changes);
        for slot in &mut self.slots {
            slot.clean_cut();
        }
        log::debug!("clean cut for {}", self.schema.table());
        Ok(())
    }

    /// Re-seed every slot from a freshly read row
    ///
    /// Persisted attributes missing from `values` are stored as null; virtual
    /// attributes return to their default. The new state is built before the
    /// store is replaced, so a cast failure leaves it untouched.
    ///
    /// # Errors
    ///
    /// Returns `UnknownAttribute` or `Cast`.
    pub fn reload<I, K, V>(&mut self, values: I) -> Result<(), TrackingError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<RawValue>,
    {
        let mut loaded = cast_row(&self.schema, values)?;
        self.slots = self
            .schema
            .attributes()
            .iter()
            .zip(loaded.iter_mut())
            .map(|(def, value)| match value.take() {
                Some(v) => AttributeSlot::from_database(v),
                None if def.is_persisted() => AttributeSlot::from_database(None),
                None => AttributeSlot::from_database(def.cast_default().cloned()),
            })
            .collect();
        Ok(())
    }

    /// Independent copy of this store
    ///
    /// Slots are copied by value, dirty state included: an attribute dirty in
    /// the source starts dirty in the copy, and resolving it on one side never
    /// affects the other.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        self.clone()
    }

    /// Assign an already-cast value (planner bookkeeping, generated keys)
    pub(crate) fn assign_cast(
        &mut self,
        name: &str,
        value: Option<CastValue>,
    ) -> Result<(), TrackingError> {
        let idx = self.schema.position(name)?;
        self.slots[idx].assign(value);
        Ok(())
    }

    /// Reset the primary key slot to a clean null
    pub(crate) fn reset_primary_key(&mut self) {
        if let Some(idx) = self.schema.primary_key_position() {
            self.slots[idx] = AttributeSlot::from_database(None);
        }
    }
}

/// Cast a row into per-position values; `None` marks an absent column.
fn cast_row<I, K, V>(
    schema: &Schema,
    values: I,
) -> Result<Vec<Option<Option<CastValue>>>, TrackingError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<RawValue>,
{
    let mut loaded: Vec<Option<Option<CastValue>>> = vec![None; schema.len()];
    for (name, raw) in values {
        let idx = schema.position(name.as_ref())?;
        let def = &schema.attributes()[idx];
        loaded[idx] = Some(def.attribute_type().cast(def.name(), raw.into())?);
    }
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::AttributeType;
    use crate::schema::AttributeDefinition;

    fn pirates() -> Arc<Schema> {
        Schema::builder("pirates")
            .attribute("id", AttributeType::Integer)
            .attribute("catchphrase", AttributeType::Text)
            .attribute("parrot_id", AttributeType::Integer)
            .build()
            .unwrap()
    }

    fn loaded() -> AttributeSet {
        AttributeSet::from_database(
            pirates(),
            [
                ("id", RawValue::Int(1)),
                ("catchphrase", RawValue::from("Yar!")),
                ("parrot_id", RawValue::Null),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_failed_cast_leaves_slot_untouched() {
        let mut set = loaded();
        set.set("parrot_id", 4).unwrap();
        assert!(set.set("parrot_id", "four").is_err());
        assert_eq!(set.peek("parrot_id").unwrap(), Some(&CastValue::Integer(4)));
    }

    #[test]
    fn test_unknown_attribute_is_reported() {
        let mut set = loaded();
        assert_eq!(
            set.set("beard", "long").unwrap_err(),
            TrackingError::UnknownAttribute("beard".to_string())
        );
        assert!(set.changed("beard").is_err());
    }

    #[test]
    fn test_missing_columns_start_unknown() {
        let set = AttributeSet::from_database(pirates(), [("id", 1)]).unwrap();
        assert!(set.slot("id").unwrap().is_known());
        assert!(!set.slot("catchphrase").unwrap().is_known());
    }

    #[test]
    fn test_reload_fills_missing_columns_with_null() {
        let mut set = AttributeSet::from_database(pirates(), [("id", 1)]).unwrap();
        set.reload([("id", RawValue::Int(1))]).unwrap();
        assert!(set.slot("catchphrase").unwrap().is_known());
        assert_eq!(set.peek("catchphrase").unwrap(), None);
    }

    #[test]
    fn test_restore_all() {
        let mut set = loaded();
        set.set("catchphrase", "Ahoy!").unwrap();
        set.set("parrot_id", 1).unwrap();
        set.restore_all();
        assert!(set.detector().changed_names().unwrap().is_empty());
        assert_eq!(set.peek("catchphrase").unwrap(), Some(&CastValue::from("Yar!")));
    }

    #[test]
    fn test_duplicate_is_independent() {
        let mut source = loaded();
        let mut copy = source.duplicate();
        copy.restore("catchphrase").unwrap();
        source.set("catchphrase", "I love Rum").unwrap();
        assert!(source.changed("catchphrase").unwrap());
        assert!(!copy.changed("catchphrase").unwrap());
    }

    #[test]
    fn test_duplicate_copies_dirty_state() {
        let mut source = loaded();
        source.set("catchphrase", "Ahoy!").unwrap();
        let mut copy = source.duplicate();
        assert!(copy.changed("catchphrase").unwrap());
        copy.restore("catchphrase").unwrap();
        assert!(source.changed("catchphrase").unwrap());
    }

    #[test]
    fn test_read_default_runs_once_per_value() {
        let schema = Schema::builder("pirates")
            .attribute("id", AttributeType::Integer)
            .define(
                AttributeDefinition::new("catchphrase", AttributeType::Text).default_on_read(
                    |current| match current.and_then(CastValue::as_str) {
                        Some(s) if !s.trim().is_empty() => None,
                        _ => Some(RawValue::from("arr")),
                    },
                ),
            )
            .build()
            .unwrap();
        let mut set = AttributeSet::from_database(
            schema,
            [("id", RawValue::Int(1)), ("catchphrase", RawValue::from("lol"))],
        )
        .unwrap();
        assert_eq!(set.get("catchphrase").unwrap(), Some(&CastValue::from("lol")));
        set.set("catchphrase", RawValue::Null).unwrap();
        assert_eq!(set.get("catchphrase").unwrap(), Some(&CastValue::from("arr")));
        assert!(set.changed("catchphrase").unwrap());
        assert!(set.slot("catchphrase").unwrap().is_materialized());
    }
}
