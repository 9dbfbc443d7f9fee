//! Change detection and change history.
//!
//! - **`ChangeDetector`** - point-in-time diff of an attribute set
//! - **`ChangeHistory`** - diff captured by the most recent successful save
//! - **`ChangeSet`** / **`AttributeChange`** - the ordered `(before, after)` pairs both produce

pub mod detector;
pub mod history;

pub use detector::ChangeDetector;
pub use history::ChangeHistory;

use crate::value::CastValue;

/// Before/after pair for one attribute
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeChange {
    pub before: Option<CastValue>,
    pub after: Option<CastValue>,
}

impl AttributeChange {
    #[must_use]
    pub fn new(before: Option<CastValue>, after: Option<CastValue>) -> Self {
        Self { before, after }
    }
}

/// Ordered mapping of attribute name to its change
///
/// Entries follow schema definition order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChangeSet {
    entries: Vec<(String, AttributeChange)>,
}

impl ChangeSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, name: impl Into<String>, change: AttributeChange) {
        self.entries.push((name.into(), change));
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttributeChange> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, change)| change)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeChange)> + '_ {
        self.entries.iter().map(|(n, c)| (n.as_str(), c))
    }
}

impl IntoIterator for ChangeSet {
    type Item = (String, AttributeChange);
    type IntoIter = std::vec::IntoIter<(String, AttributeChange)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
