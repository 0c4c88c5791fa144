//! Capability handles over [`MemoryDatabase`]
//!
//! Handles are cheap clones holding the shared database and a location.
//! Malformed arguments (bad keys in paths or values) are rejected
//! synchronously with `InvalidArgument`, dropping the callback unused.

use serde_json::{Map, Value};
use std::fmt;

use rtdb_core::{
    path, AuthCallback, CancelCallback, ClientError, CompletionCallback, EventType, ListenerId,
    Observable, OnDisconnectHandle, OnceFailure, OnceSuccess, Priority, QueryHandle, RefHandle,
    Result, SnapshotCallback, TransactionCallback, TransactionUpdate,
};

use crate::memory::{DisconnectOp, MemoryDatabase};
use crate::query::{Bound, QueryParams};

/// Reject values whose object keys the store cannot hold
fn validate_value(value: &Value) -> Result<()> {
    match value {
        Value::Object(map) => map.iter().try_for_each(|(key, child)| {
            path::validate_key(key)?;
            validate_value(child)
        }),
        Value::Array(items) => items.iter().try_for_each(validate_value),
        _ => Ok(()),
    }
}

/// Update keys may be relative paths
fn validate_update(values: &Map<String, Value>) -> Result<()> {
    for (key, value) in values {
        if path::segments(key).is_empty() {
            return Err(ClientError::invalid_argument("empty update path"));
        }
        path::validate_path(key)?;
        validate_value(value)?;
    }
    Ok(())
}

fn bound(priority: Option<Priority>, name: Option<&str>) -> Bound {
    Bound {
        priority,
        name: name.map(str::to_string),
    }
}

/// Location in a [`MemoryDatabase`]
#[derive(Clone)]
pub struct MemoryRef {
    db: MemoryDatabase,
    path: Vec<String>,
}

impl MemoryRef {
    pub(crate) fn new(db: MemoryDatabase, path: Vec<String>) -> Self {
        Self { db, path }
    }

    /// Database this handle points into
    pub fn database(&self) -> &MemoryDatabase {
        &self.db
    }

    /// Canonical absolute path
    pub fn path(&self) -> String {
        path::join(&self.path)
    }

    fn query(&self, params: QueryParams) -> MemoryQuery {
        MemoryQuery {
            db: self.db.clone(),
            path: self.path.clone(),
            params,
        }
    }
}

impl fmt::Display for MemoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "memory:{}", path::join(&self.path))
    }
}

impl fmt::Debug for MemoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MemoryRef").field(&self.path()).finish()
    }
}

impl Observable for MemoryRef {
    fn on(
        &self,
        event: EventType,
        callback: SnapshotCallback,
        cancel: Option<CancelCallback>,
    ) -> ListenerId {
        self.db
            .listen(self.path.clone(), QueryParams::default(), event, callback, cancel)
    }

    fn off(&self, event: Option<EventType>, listener: Option<ListenerId>) {
        self.db
            .unlisten(&self.path, &QueryParams::default(), event, listener);
    }

    fn once(&self, event: EventType, success: OnceSuccess, failure: OnceFailure) {
        self.db
            .listen_once(self.path.clone(), QueryParams::default(), event, success, failure);
    }
}

impl RefHandle for MemoryRef {
    type Query = MemoryQuery;
    type OnDisconnect = MemoryOnDisconnect;

    fn auth(&self, token: &str, on_complete: AuthCallback, on_cancel: Option<CancelCallback>) {
        self.db.auth(token, on_complete, on_cancel);
    }

    fn unauth(&self) {
        self.db.unauth();
    }

    fn child(&self, relative: &str) -> Result<Self> {
        let segments = path::segments(relative);
        if segments.is_empty() {
            return Err(ClientError::invalid_argument("empty child path"));
        }
        path::validate_path(relative)?;
        let mut location = self.path.clone();
        location.extend(segments.into_iter().map(str::to_string));
        Ok(Self::new(self.db.clone(), location))
    }

    fn parent(&self) -> Option<Self> {
        let (_, parent) = self.path.split_last()?;
        Some(Self::new(self.db.clone(), parent.to_vec()))
    }

    fn root(&self) -> Self {
        Self::new(self.db.clone(), Vec::new())
    }

    fn key(&self) -> Option<String> {
        self.path.last().cloned()
    }

    fn set(&self, value: Value, on_complete: CompletionCallback) -> Result<()> {
        validate_value(&value)?;
        self.db.set(&self.path, value, None, on_complete);
        Ok(())
    }

    fn update(&self, values: Map<String, Value>, on_complete: CompletionCallback) -> Result<()> {
        validate_update(&values)?;
        self.db.update(&self.path, values, on_complete);
        Ok(())
    }

    fn remove(&self, on_complete: CompletionCallback) -> Result<()> {
        self.db.set(&self.path, Value::Null, None, on_complete);
        Ok(())
    }

    fn push(&self) -> Self {
        let mut location = self.path.clone();
        location.push(self.db.next_push_key());
        Self::new(self.db.clone(), location)
    }

    fn set_with_priority(
        &self,
        value: Value,
        priority: Priority,
        on_complete: CompletionCallback,
    ) -> Result<()> {
        validate_value(&value)?;
        self.db.set(&self.path, value, Some(priority), on_complete);
        Ok(())
    }

    fn set_priority(
        &self,
        priority: Option<Priority>,
        on_complete: CompletionCallback,
    ) -> Result<()> {
        self.db.set_priority(&self.path, priority, on_complete);
        Ok(())
    }

    fn transaction(
        &self,
        update: TransactionUpdate,
        on_complete: TransactionCallback,
        apply_locally: bool,
    ) -> Result<()> {
        self.db
            .transaction(self.path.clone(), update, on_complete, apply_locally);
        Ok(())
    }

    fn limit(&self, n: usize) -> MemoryQuery {
        self.query(QueryParams {
            limit: Some(n),
            ..QueryParams::default()
        })
    }

    fn start_at(&self, priority: Option<Priority>, name: Option<&str>) -> MemoryQuery {
        self.query(QueryParams {
            start: Some(bound(priority, name)),
            ..QueryParams::default()
        })
    }

    fn end_at(&self, priority: Option<Priority>, name: Option<&str>) -> MemoryQuery {
        self.query(QueryParams {
            end: Some(bound(priority, name)),
            ..QueryParams::default()
        })
    }

    fn on_disconnect(&self) -> MemoryOnDisconnect {
        MemoryOnDisconnect {
            db: self.db.clone(),
            path: self.path.clone(),
        }
    }
}

/// Filtered view over a [`MemoryDatabase`] location
#[derive(Clone)]
pub struct MemoryQuery {
    db: MemoryDatabase,
    path: Vec<String>,
    params: QueryParams,
}

impl MemoryQuery {
    /// Filters applied by this query
    pub fn params(&self) -> &QueryParams {
        &self.params
    }

    fn narrowed(&self, change: impl FnOnce(&mut QueryParams)) -> Self {
        let mut next = self.clone();
        change(&mut next.params);
        next
    }
}

impl fmt::Debug for MemoryQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryQuery")
            .field("path", &path::join(&self.path))
            .field("params", &self.params)
            .finish()
    }
}

impl Observable for MemoryQuery {
    fn on(
        &self,
        event: EventType,
        callback: SnapshotCallback,
        cancel: Option<CancelCallback>,
    ) -> ListenerId {
        self.db
            .listen(self.path.clone(), self.params.clone(), event, callback, cancel)
    }

    fn off(&self, event: Option<EventType>, listener: Option<ListenerId>) {
        self.db.unlisten(&self.path, &self.params, event, listener);
    }

    fn once(&self, event: EventType, success: OnceSuccess, failure: OnceFailure) {
        self.db
            .listen_once(self.path.clone(), self.params.clone(), event, success, failure);
    }
}

impl QueryHandle for MemoryQuery {
    fn limit(&self, n: usize) -> Self {
        self.narrowed(|params| params.limit = Some(n))
    }

    fn start_at(&self, priority: Option<Priority>, name: Option<&str>) -> Self {
        self.narrowed(|params| params.start = Some(bound(priority, name)))
    }

    fn end_at(&self, priority: Option<Priority>, name: Option<&str>) -> Self {
        self.narrowed(|params| params.end = Some(bound(priority, name)))
    }
}

/// Disconnect queue for one [`MemoryDatabase`] location
#[derive(Clone)]
pub struct MemoryOnDisconnect {
    db: MemoryDatabase,
    path: Vec<String>,
}

impl OnDisconnectHandle for MemoryOnDisconnect {
    fn set(&self, value: Value, on_complete: CompletionCallback) -> Result<()> {
        validate_value(&value)?;
        self.db
            .queue_disconnect(&self.path, DisconnectOp::Set(value, None), on_complete);
        Ok(())
    }

    fn set_with_priority(
        &self,
        value: Value,
        priority: Priority,
        on_complete: CompletionCallback,
    ) -> Result<()> {
        validate_value(&value)?;
        self.db.queue_disconnect(
            &self.path,
            DisconnectOp::Set(value, Some(priority)),
            on_complete,
        );
        Ok(())
    }

    fn update(&self, values: Map<String, Value>, on_complete: CompletionCallback) -> Result<()> {
        validate_update(&values)?;
        self.db
            .queue_disconnect(&self.path, DisconnectOp::Update(values), on_complete);
        Ok(())
    }

    fn remove(&self, on_complete: CompletionCallback) -> Result<()> {
        self.db
            .queue_disconnect(&self.path, DisconnectOp::Remove, on_complete);
        Ok(())
    }

    fn cancel(&self, on_complete: CompletionCallback) {
        self.db.cancel_disconnect(&self.path, on_complete);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_child_rejects_forbidden_keys() {
        let db = MemoryDatabase::new();
        let err = db.reference().child("users/a.b").unwrap_err();
        assert_eq!(err.code, rtdb_core::ErrorCode::InvalidArgument);
        assert!(db.reference().child("").is_err());
    }

    #[test]
    fn test_navigation() {
        let db = MemoryDatabase::new();
        let leaf = db.reference().child("a/b").unwrap();
        assert_eq!(leaf.to_string(), "memory:/a/b");
        assert_eq!(leaf.key().as_deref(), Some("b"));
        assert_eq!(leaf.parent().unwrap().path(), "/a");
        assert_eq!(leaf.root().path(), "/");
        assert!(leaf.root().parent().is_none());
    }

    #[test]
    fn test_set_rejects_bad_value_keys_without_calling_back() {
        let db = MemoryDatabase::new();
        let called = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = called.clone();
        let result = db.reference().set(
            json!({"bad$key": 1}),
            Box::new(move |_| flag.store(true, std::sync::atomic::Ordering::SeqCst)),
        );
        assert!(result.is_err());
        assert!(!called.load(std::sync::atomic::Ordering::SeqCst));
        assert_eq!(db.write_calls(), 0);
    }

    #[test]
    fn test_push_keys_are_unique_and_ordered() {
        let db = MemoryDatabase::new();
        let list = db.reference_at("list");
        let a = list.push().key().unwrap();
        let b = list.push().key().unwrap();
        assert!(a < b);
    }
}
