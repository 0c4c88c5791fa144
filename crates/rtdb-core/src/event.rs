//! Event types a listener can subscribe to

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::ClientError;

/// Kind of change notification delivered by `on` / `once`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// The whole value at the location
    Value,
    /// A direct child appeared
    ChildAdded,
    /// A direct child's value changed
    ChildChanged,
    /// A direct child disappeared
    ChildRemoved,
    /// A direct child changed position in the query ordering
    ChildMoved,
}

impl EventType {
    /// Wire name of the event type
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Value => "value",
            Self::ChildAdded => "child_added",
            Self::ChildChanged => "child_changed",
            Self::ChildRemoved => "child_removed",
            Self::ChildMoved => "child_moved",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "value" => Ok(Self::Value),
            "child_added" => Ok(Self::ChildAdded),
            "child_changed" => Ok(Self::ChildChanged),
            "child_removed" => Ok(Self::ChildRemoved),
            "child_moved" => Ok(Self::ChildMoved),
            other => Err(ClientError::invalid_argument(format!(
                "unknown event type {other:?}"
            ))),
        }
    }
}

/// Identifier returned by `on`, used to remove that listener with `off`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListenerId(pub u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}
