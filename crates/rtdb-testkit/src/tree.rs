//! JSON tree storage
//!
//! The store is one `serde_json::Value`. Nulls and empty objects never persist:
//! writing `null` deletes, and a parent left empty disappears with its last
//! child.

use serde_json::{Map, Value};

/// Borrow the value at `path`
pub(crate) fn get<'a>(root: &'a Value, path: &[String]) -> Option<&'a Value> {
    let mut node = root;
    for segment in path {
        node = node.as_object()?.get(segment)?;
    }
    Some(node)
}

/// Clone of the value at `path`, `Null` when absent
pub(crate) fn get_cloned(root: &Value, path: &[String]) -> Value {
    get(root, path).cloned().unwrap_or(Value::Null)
}

/// Strip null members and empty objects
pub(crate) fn normalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let map: Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, normalize(v)))
                .filter(|(_, v)| !v.is_null())
                .collect();
            if map.is_empty() {
                Value::Null
            } else {
                Value::Object(map)
            }
        }
        other => other,
    }
}

/// Replace the value at `path`, pruning parents that become empty
pub(crate) fn set(root: &mut Value, path: &[String], value: Value) {
    match path.split_first() {
        None => *root = normalize(value),
        Some((head, rest)) => {
            if !root.is_object() {
                if value.is_null() {
                    return;
                }
                *root = Value::Object(Map::new());
            }
            let Value::Object(map) = &mut *root else {
                return;
            };
            let child = map.entry(head.clone()).or_insert(Value::Null);
            set(child, rest, value);
            if child.is_null() {
                map.remove(head);
            }
            if map.is_empty() {
                *root = Value::Null;
            }
        }
    }
}

/// True when `path` equals `prefix` or lies below it
pub(crate) fn is_at_or_below(path: &[String], prefix: &[String]) -> bool {
    path.len() >= prefix.len() && path[..prefix.len()] == *prefix
}
