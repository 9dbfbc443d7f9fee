//! `AttributeSlot`: one attribute's tracking state.

use super::types::AttributeType;
use crate::error::TrackingError;
use crate::value::CastValue;

/// Tracking state for a single attribute
///
/// A slot holds the value last known to be stored (`original`) next to the
/// value currently held (`current`). Whether the attribute is dirty is always
/// computed from those two values, so reverting to the original through any
/// sequence of assignments leaves the slot clean.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeSlot {
    original: Option<CastValue>,
    current: Option<CastValue>,
    forced_dirty: bool,
    /// `false` when the stored value was never loaded (partial select)
    known: bool,
    /// A setter ran since the last clean state
    assigned: bool,
    /// The read-time default hook already ran for the current value
    materialized: bool,
}

impl AttributeSlot {
    /// Slot seeded from a stored (or default) value
    #[must_use]
    pub fn from_database(value: Option<CastValue>) -> Self {
        Self {
            original: value.clone(),
            current: value,
            forced_dirty: false,
            known: true,
            assigned: false,
            materialized: false,
        }
    }

    /// Slot for an attribute whose stored value was not loaded
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            original: None,
            current: None,
            forced_dirty: false,
            known: false,
            assigned: false,
            materialized: false,
        }
    }

    #[must_use]
    pub fn original(&self) -> Option<&CastValue> {
        self.original.as_ref()
    }

    #[must_use]
    pub fn current(&self) -> Option<&CastValue> {
        self.current.as_ref()
    }

    #[must_use]
    pub fn is_known(&self) -> bool {
        self.known
    }

    #[must_use]
    pub fn is_forced_dirty(&self) -> bool {
        self.forced_dirty
    }

    #[must_use]
    pub fn is_assigned(&self) -> bool {
        self.assigned
    }

    #[must_use]
    pub fn is_materialized(&self) -> bool {
        self.materialized
    }

    pub(crate) fn current_mut(&mut self) -> Option<&mut CastValue> {
        self.current.as_mut()
    }

    pub(crate) fn assign(&mut self, value: Option<CastValue>) {
        self.current = value;
        self.assigned = true;
        self.materialized = false;
    }

    /// Assignment performed by the read-time default hook. The slot stays
    /// materialized so the hook does not run again for this value.
    pub(crate) fn assign_materialized(&mut self, value: Option<CastValue>) {
        self.current = value;
        self.assigned = true;
        self.materialized = true;
    }

    pub(crate) fn mark_materialized(&mut self) {
        self.materialized = true;
    }

    /// Force the slot dirty. An unknown original is seeded with a copy of the
    /// current value so later in-place edits have a baseline.
    pub(crate) fn force_dirty(&mut self) {
        if !self.known {
            self.original = self.current.clone();
            self.known = true;
        }
        self.forced_dirty = true;
    }

    pub(crate) fn restore(&mut self) {
        self.current = self.original.clone();
        self.forced_dirty = false;
        self.assigned = false;
        self.materialized = false;
    }

    /// Current value becomes the original.
    ///
    /// An attribute that was never loaded and never written stays unknown.
    pub(crate) fn clean_cut(&mut self) {
        if self.known || self.assigned {
            self.original = self.current.clone();
            self.known = true;
        }
        self.forced_dirty = false;
        self.assigned = false;
    }

    /// Whether this slot differs from its original
    ///
    /// `changed_in_place` is consulted last, and only for mutable types, so a
    /// slot already known to be dirty never pays for (or fails on) a deep
    /// comparison.
    ///
    /// # Errors
    ///
    /// Propagates failures from a custom type's `changed_in_place`.
    pub fn changed(&self, name: &str, ty: &AttributeType) -> Result<bool, TrackingError> {
        if self.forced_dirty {
            return Ok(true);
        }
        if !self.known {
            return Ok(self.assigned);
        }
        if !ty.equal(self.original(), self.current()) {
            return Ok(true);
        }
        if ty.is_mutable() {
            return ty.changed_in_place(name, self.original(), self.current());
        }
        Ok(false)
    }
}
