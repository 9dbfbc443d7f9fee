//! `ChangeHistory`: what the most recent successful save changed.

use super::{AttributeChange, ChangeSet};

/// Changes captured at the last successful save
///
/// Each save replaces the history wholesale; nothing accumulates across
/// saves. A save that changed nothing leaves an empty history.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeHistory {
    changes: ChangeSet,
}

impl ChangeHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the history with the pre-write diff of a successful save
    pub fn record_save(&mut self, changes: ChangeSet) {
        self.changes = changes;
    }

    /// Forget the last save (reload, duplicate)
    pub fn clear(&mut self) {
        self.changes = ChangeSet::new();
    }

    #[must_use]
    pub fn changes(&self) -> &ChangeSet {
        &self.changes
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttributeChange> {
        self.changes.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}
