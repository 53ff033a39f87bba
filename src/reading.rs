use std::collections::BTreeMap;

use serde::Serialize;

/// A flat mapping from sensor key to numeric value, built fresh per fetch
/// cycle and handed to observers as-is.
///
/// Every guaranteed key is always present: missing or unparseable source
/// data degrades to `0.0`, never to an absent key.
#[derive(
    Clone, Debug, Default, PartialEq, Serialize, derive_more::Index, derive_more::IntoIterator,
)]
pub struct Reading(BTreeMap<String, f64>);

impl Reading {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: f64) {
        self.0.insert(key.into(), value);
    }

    /// Inserts only when the key is not present yet.
    pub fn default_to(&mut self, key: &str, value: f64) {
        self.0.entry(key.to_owned()).or_insert(value);
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<f64> {
        self.0.get(key).copied()
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(key, value)| (key.as_str(), *value))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
