//! Values, priorities and snapshots
//!
//! Stored data is plain JSON ([`serde_json::Value`]). A [`Snapshot`] is an
//! immutable point-in-time view of the data at one location.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::path;

/// Ordering priority attached to a location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Priority {
    /// Numeric priority, sorts before string priorities
    Number(f64),
    /// String priority
    String(String),
}

impl From<f64> for Priority {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for Priority {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<&str> for Priority {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Priority {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

/// Immutable view of the data at a location.
///
/// A missing location is represented by a snapshot whose value is
/// [`Value::Null`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    key: Option<String>,
    value: Value,
    priority: Option<Priority>,
}

impl Snapshot {
    /// Create a snapshot for the location named `key` (`None` for the root)
    pub fn new(key: Option<String>, value: Value) -> Self {
        Self {
            key,
            value,
            priority: None,
        }
    }

    /// Attach a priority
    pub fn with_priority(mut self, priority: Option<Priority>) -> Self {
        self.priority = priority;
        self
    }

    /// Last path segment of the location, `None` for the root
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// The data at this location
    pub fn val(&self) -> &Value {
        &self.value
    }

    /// Consume the snapshot, returning its data
    pub fn into_val(self) -> Value {
        self.value
    }

    /// Priority of the location, if one was set
    pub fn priority(&self) -> Option<&Priority> {
        self.priority.as_ref()
    }

    /// True when data exists at this location
    pub fn exists(&self) -> bool {
        !self.value.is_null()
    }

    /// Snapshot of a descendant location, relative to this one
    pub fn child(&self, relative: &str) -> Snapshot {
        let segments = path::segments(relative);
        let mut current = &self.value;
        for segment in &segments {
            match current.get(*segment) {
                Some(next) => current = next,
                None => {
                    current = &Value::Null;
                    break;
                }
            }
        }
        let key = segments
            .last()
            .map(|s| s.to_string())
            .or_else(|| self.key.clone());
        Snapshot::new(key, current.clone())
    }

    /// Number of direct children (zero for leaves)
    pub fn num_children(&self) -> usize {
        self.value.as_object().map_or(0, |m| m.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_child_walks_nested_objects() {
        let snap = Snapshot::new(Some("users".into()), json!({"alice": {"age": 30}}));
        let age = snap.child("alice/age");
        assert_eq!(age.key(), Some("age"));
        assert_eq!(age.val(), &json!(30));
        assert!(!snap.child("bob").exists());
    }

    #[test]
    fn test_priority_untagged_serde() {
        let p: Priority = serde_json::from_str("3.5").unwrap();
        assert_eq!(p, Priority::Number(3.5));
        let p: Priority = serde_json::from_str("\"a\"").unwrap();
        assert_eq!(p, Priority::from("a"));
    }
}
