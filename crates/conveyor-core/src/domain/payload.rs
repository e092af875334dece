//! Payload: the key→value data attached to task input and output.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An ordered key→value mapping carried into and out of executors.
///
/// Values are JSON so callers can put whatever they like in here without
/// the scheduler caring about the shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(BTreeMap<String, serde_json::Value>);

impl Payload {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Build from key/value pairs.
    ///
    /// ```ignore
    /// let input = Payload::from_pairs([("image_id", 42.into())]);
    /// ```
    pub fn from_pairs<K, I>(pairs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, serde_json::Value)>,
    {
        Self(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// String accessor for the common case.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_str())
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.0.get(key).and_then(|v| v.as_i64())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Merge `other` into `self`; keys from `other` win.
    ///
    /// Used when a chained successor inherits its predecessor's output.
    pub fn merge(&mut self, other: &Payload) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }
}
