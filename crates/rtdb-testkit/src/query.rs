//! Query parameters and child ordering
//!
//! Children are ordered by priority (none, then numbers ascending, then
//! strings), then by key. `start_at` / `end_at` bound that ordering and
//! `limit(n)` keeps the last `n` children inside the range.

use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;

use rtdb_core::{path, Priority};

/// Range bound: priority plus optional child name
#[derive(Debug, Clone, PartialEq)]
pub struct Bound {
    /// Priority the bound sits at
    pub priority: Option<Priority>,
    /// Child name tiebreaker; `None` means the whole priority bucket
    pub name: Option<String>,
}

/// Filters accumulated by `limit` / `start_at` / `end_at`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    /// Maximum number of children
    pub limit: Option<usize>,
    /// Inclusive lower bound
    pub start: Option<Bound>,
    /// Inclusive upper bound
    pub end: Option<Bound>,
}

impl QueryParams {
    /// True when no filter is set
    pub fn is_default(&self) -> bool {
        self.limit.is_none() && self.start.is_none() && self.end.is_none()
    }

    /// Apply the filters to the children of `value` at `location`.
    ///
    /// Leaves are returned unchanged.
    pub(crate) fn apply(
        &self,
        location: &[String],
        value: Value,
        priorities: &HashMap<String, Priority>,
    ) -> Value {
        if self.is_default() {
            return value;
        }
        let Value::Object(map) = value else {
            return value;
        };

        let priority_of = |key: &str| {
            let mut child = location.to_vec();
            child.push(key.to_string());
            priorities.get(&path::join(&child)).cloned()
        };

        let mut children: Vec<(Option<Priority>, String, Value)> = map
            .into_iter()
            .map(|(key, v)| (priority_of(&key), key, v))
            .filter(|(priority, key, _)| {
                let after_start = self.start.as_ref().map_or(true, |bound| {
                    compare_to_bound(priority.as_ref(), key, bound, Ordering::Less)
                        != Ordering::Less
                });
                let before_end = self.end.as_ref().map_or(true, |bound| {
                    compare_to_bound(priority.as_ref(), key, bound, Ordering::Greater)
                        != Ordering::Greater
                });
                after_start && before_end
            })
            .collect();
        children.sort_by(|a, b| {
            compare_priority(a.0.as_ref(), b.0.as_ref()).then_with(|| a.1.cmp(&b.1))
        });

        if let Some(limit) = self.limit {
            let skip = children.len().saturating_sub(limit);
            children.drain(..skip);
        }

        let filtered: Map<String, Value> = children.into_iter().map(|(_, k, v)| (k, v)).collect();
        if filtered.is_empty() {
            Value::Null
        } else {
            Value::Object(filtered)
        }
    }
}

fn priority_rank(priority: Option<&Priority>) -> u8 {
    match priority {
        None => 0,
        Some(Priority::Number(_)) => 1,
        Some(Priority::String(_)) => 2,
    }
}

/// Total order over priorities: none < numbers < strings
pub fn compare_priority(a: Option<&Priority>, b: Option<&Priority>) -> Ordering {
    match (a, b) {
        (Some(Priority::Number(x)), Some(Priority::Number(y))) => x.total_cmp(y),
        (Some(Priority::String(x)), Some(Priority::String(y))) => x.cmp(y),
        _ => priority_rank(a).cmp(&priority_rank(b)),
    }
}

/// Position of a child relative to a bound.
///
/// A bound without a name compares as `open` against every key in its own
/// priority bucket, so the whole bucket is included.
fn compare_to_bound(
    priority: Option<&Priority>,
    key: &str,
    bound: &Bound,
    open: Ordering,
) -> Ordering {
    compare_priority(priority, bound.priority.as_ref()).then_with(|| match &bound.name {
        Some(name) => key.cmp(name.as_str()),
        None => open.reverse(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn no_priorities() -> HashMap<String, Priority> {
        HashMap::new()
    }

    #[test]
    fn test_limit_keeps_last_children() {
        let params = QueryParams {
            limit: Some(2),
            ..QueryParams::default()
        };
        let out = params.apply(&[], json!({"a": 1, "b": 2, "c": 3}), &no_priorities());
        assert_eq!(out, json!({"b": 2, "c": 3}));
    }

    #[test]
    fn test_start_at_name_without_priorities() {
        let params = QueryParams {
            start: Some(Bound {
                priority: None,
                name: Some("b".into()),
            }),
            ..QueryParams::default()
        };
        let out = params.apply(&[], json!({"a": 1, "b": 2, "c": 3}), &no_priorities());
        assert_eq!(out, json!({"b": 2, "c": 3}));
    }

    #[test]
    fn test_end_at_priority_bucket() {
        let mut priorities = HashMap::new();
        priorities.insert("/scores/a".to_string(), Priority::Number(1.0));
        priorities.insert("/scores/b".to_string(), Priority::Number(5.0));
        priorities.insert("/scores/c".to_string(), Priority::Number(9.0));
        let params = QueryParams {
            end: Some(Bound {
                priority: Some(Priority::Number(5.0)),
                name: None,
            }),
            ..QueryParams::default()
        };
        let location = vec!["scores".to_string()];
        let out = params.apply(&location, json!({"a": 1, "b": 2, "c": 3}), &priorities);
        assert_eq!(out, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn test_priority_order() {
        let n = Priority::Number(1.0);
        let s = Priority::from("x");
        assert_eq!(compare_priority(None, Some(&n)), Ordering::Less);
        assert_eq!(compare_priority(Some(&n), Some(&s)), Ordering::Less);
    }
}
