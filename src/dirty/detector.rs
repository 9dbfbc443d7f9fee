//! `ChangeDetector`: on-demand diff over an attribute set.
//!
//! Nothing here is cached. In-place edits can change a current value without a
//! setter call, so every query recomputes original-versus-current.

use super::{AttributeChange, ChangeSet};
use crate::attribute::AttributeSet;
use crate::error::TrackingError;
use crate::value::CastValue;

/// Read-only change queries over an [`AttributeSet`]
#[derive(Debug, Clone, Copy)]
pub struct ChangeDetector<'a> {
    attributes: &'a AttributeSet,
}

impl<'a> ChangeDetector<'a> {
    #[must_use]
    pub fn new(attributes: &'a AttributeSet) -> Self {
        Self { attributes }
    }

    /// Changed attribute names in definition order
    ///
    /// # Errors
    ///
    /// Fails if an attribute type's in-place comparison fails.
    pub fn changed_names(&self) -> Result<Vec<&'a str>, TrackingError> {
        let mut names = Vec::new();
        for (def, slot) in self.attributes.iter() {
            if slot.changed(def.name(), def.attribute_type())? {
                names.push(def.name());
            }
        }
        Ok(names)
    }

    /// `(original, current)` for every changed attribute
    ///
    /// # Errors
    ///
    /// Fails if an attribute type's in-place comparison fails.
    pub fn changes(&self) -> Result<ChangeSet, TrackingError> {
        let mut changes = ChangeSet::new();
        for (def, slot) in self.attributes.iter() {
            if slot.changed(def.name(), def.attribute_type())? {
                changes.push(
                    def.name(),
                    AttributeChange::new(slot.original().cloned(), slot.current().cloned()),
                );
            }
        }
        Ok(changes)
    }

    /// Whether any attribute changed
    ///
    /// # Errors
    ///
    /// Fails if an attribute type's in-place comparison fails.
    pub fn is_changed(&self) -> Result<bool, TrackingError> {
        for (def, slot) in self.attributes.iter() {
            if slot.changed(def.name(), def.attribute_type())? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// `(original, current)` for one attribute, `None` when unchanged
    ///
    /// # Errors
    ///
    /// Returns `UnknownAttribute`, or the attribute type's own failure.
    pub fn attribute_change(&self, name: &str) -> Result<Option<AttributeChange>, TrackingError> {
        if !self.attributes.changed(name)? {
            return Ok(None);
        }
        let slot = self.attributes.slot(name)?;
        Ok(Some(AttributeChange::new(
            slot.original().cloned(),
            slot.current().cloned(),
        )))
    }

    /// Changed, and the original value equals `from`
    ///
    /// `from` is compared with the attribute type's semantic equality.
    ///
    /// # Errors
    ///
    /// Returns `UnknownAttribute`, or the attribute type's own failure.
    pub fn changed_value(
        &self,
        name: &str,
        from: Option<&CastValue>,
    ) -> Result<bool, TrackingError> {
        if !self.attributes.changed(name)? {
            return Ok(false);
        }
        let def = self.attributes.schema().definition(name)?;
        let slot = self.attributes.slot(name)?;
        Ok(def.attribute_type().equal(slot.original(), from))
    }

    /// Changed from `from` to `to`
    ///
    /// # Errors
    ///
    /// Returns `UnknownAttribute`, or the attribute type's own failure.
    pub fn changed_value_to(
        &self,
        name: &str,
        from: Option<&CastValue>,
        to: Option<&CastValue>,
    ) -> Result<bool, TrackingError> {
        if !self.changed_value(name, from)? {
            return Ok(false);
        }
        let def = self.attributes.schema().definition(name)?;
        let slot = self.attributes.slot(name)?;
        Ok(def.attribute_type().equal(slot.current(), to))
    }
}
