//! Labels (legacy "keywords")
//!
//! Label names compare case-insensitively. A [`LabelSet`] is always a full
//! replacement of the labels on an aggregate, never an incremental merge.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A named label with a visibility flag
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Label {
    name: String,
    visible: bool,
}

impl Label {
    /// Create a label; surrounding whitespace is trimmed
    pub fn new(name: impl Into<String>, visible: bool) -> Self {
        Self {
            name: name.into().trim().to_string(),
            visible,
        }
    }

    pub fn visible(name: impl Into<String>) -> Self {
        Self::new(name, true)
    }

    pub fn hidden(name: impl Into<String>) -> Self {
        Self::new(name, false)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Case-folded name used for identity
    pub fn folded_name(&self) -> String {
        fold(&self.name)
    }

    /// Same label name, ignoring case and visibility
    pub fn same_name(&self, other: &Label) -> bool {
        self.folded_name() == other.folded_name()
    }
}

/// Labels are equal when their names match case-insensitively and their
/// visibility matches.
impl PartialEq for Label {
    fn eq(&self, other: &Self) -> bool {
        self.same_name(other) && self.visible == other.visible
    }
}

impl Eq for Label {}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

pub(crate) fn fold(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Ordered set of labels, unique by case-folded name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabelSet {
    labels: Vec<Label>,
}

impl LabelSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set; on duplicate names the first occurrence wins
    pub fn from_labels(labels: impl IntoIterator<Item = Label>) -> Self {
        let mut set = Self::new();
        for label in labels {
            set.insert(label);
        }
        set
    }

    /// Insert a label unless one with the same name is already present.
    /// Returns true when inserted. Empty names are ignored.
    pub fn insert(&mut self, label: Label) -> bool {
        if label.name().is_empty() || self.contains_name(label.name()) {
            return false;
        }
        self.labels.push(label);
        true
    }

    /// Remove a label by name (case-insensitive). Returns true when removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let folded = fold(name);
        let before = self.labels.len();
        self.labels.retain(|l| l.folded_name() != folded);
        before != self.labels.len()
    }

    pub fn contains_name(&self, name: &str) -> bool {
        let folded = fold(name);
        self.labels.iter().any(|l| l.folded_name() == folded)
    }

    pub fn get(&self, name: &str) -> Option<&Label> {
        let folded = fold(name);
        self.labels.iter().find(|l| l.folded_name() == folded)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Label> {
        self.labels.iter()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.labels.iter().map(|l| l.name().to_string()).collect()
    }
}

/// Order-independent equality: same names (case-folded) with the same visibility
impl PartialEq for LabelSet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .labels
                .iter()
                .all(|l| other.get(l.name()).map(|o| o == l).unwrap_or(false))
    }
}

impl Eq for LabelSet {}

impl IntoIterator for LabelSet {
    type Item = Label;
    type IntoIter = std::vec::IntoIter<Label>;

    fn into_iter(self) -> Self::IntoIter {
        self.labels.into_iter()
    }
}

impl FromIterator<Label> for LabelSet {
    fn from_iter<T: IntoIterator<Item = Label>>(iter: T) -> Self {
        Self::from_labels(iter)
    }
}
