//! Reference wrapper
//!
//! [`RefP`] is a thin value wrapper around one client reference. Operations
//! fall into four groups:
//!
//! - delegates (`auth`, `unauth`, `key`, `Display`, `on`, `off`) forward to the
//!   handle unchanged
//! - navigation (`child`, `parent`, `root`, `limit`, `start_at`, `end_at`)
//!   returns a new wrapper around the handle the client produced
//! - single-outcome writes return a [`Pending`] that settles exactly once
//! - `once` and `transaction` adapt reads and multi-fire callbacks
//!
//! Synchronous argument errors from the client are returned from the call
//! itself and never appear as rejections.

use serde_json::Map;
use std::fmt;
use std::sync::Arc;

use rtdb_core::{
    AuthCallback, CancelCallback, EventType, ListenerId, Observable, Priority, RefHandle, Snapshot,
    SnapshotCallback, Value,
};

use crate::on_disconnect::OnDisconnectP;
use crate::query::{once_on, QueryP, QueryPromise};
use crate::settle::{adapt_completion, pending, Pending};
use crate::transaction::{self, Transaction};

/// Future-returning wrapper around a client reference
#[derive(Clone)]
pub struct RefP<R: RefHandle> {
    handle: R,
}

impl<R: RefHandle> RefP<R> {
    /// Wrap `handle`
    pub fn new(handle: R) -> Self {
        Self { handle }
    }

    /// The wrapped client reference
    pub fn handle(&self) -> &R {
        &self.handle
    }

    /// Unwrap into the client reference
    pub fn into_handle(self) -> R {
        self.handle
    }

    // ------------------------------------------------------------------
    // Delegates
    // ------------------------------------------------------------------

    /// Authenticate the connection
    pub fn auth(&self, token: &str, on_complete: AuthCallback, on_cancel: Option<CancelCallback>) {
        self.handle.auth(token, on_complete, on_cancel);
    }

    /// Drop the authenticated session
    pub fn unauth(&self) {
        self.handle.unauth();
    }

    /// Last path segment, `None` at the root
    pub fn key(&self) -> Option<String> {
        self.handle.key()
    }

    /// Register a persistent listener
    pub fn on(
        &self,
        event: EventType,
        callback: SnapshotCallback,
        cancel: Option<CancelCallback>,
    ) -> ListenerId {
        self.handle.on(event, callback, cancel)
    }

    /// Remove listeners
    pub fn off(&self, event: Option<EventType>, listener: Option<ListenerId>) {
        self.handle.off(event, listener);
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    /// Wrapper for the descendant at `path`
    pub fn child(&self, path: &str) -> rtdb_core::Result<RefP<R>> {
        self.handle.child(path).map(RefP::new)
    }

    /// Wrapper for the parent, `None` at the root
    pub fn parent(&self) -> Option<RefP<R>> {
        self.handle.parent().map(RefP::new)
    }

    /// Wrapper for the root
    pub fn root(&self) -> RefP<R> {
        RefP::new(self.handle.root())
    }

    /// A fresh wrapper for this same location
    pub fn reference(&self) -> RefP<R> {
        self.clone()
    }

    /// Query limited to `n` children
    pub fn limit(&self, n: usize) -> QueryP<R> {
        QueryP::new(self.handle.limit(n), self.clone())
    }

    /// Query starting at the given priority / name
    pub fn start_at(&self, priority: Option<Priority>, name: Option<&str>) -> QueryP<R> {
        QueryP::new(self.handle.start_at(priority, name), self.clone())
    }

    /// Query ending at the given priority / name
    pub fn end_at(&self, priority: Option<Priority>, name: Option<&str>) -> QueryP<R> {
        QueryP::new(self.handle.end_at(priority, name), self.clone())
    }

    /// Writes to perform when this client disconnects
    pub fn on_disconnect(&self) -> OnDisconnectP<R::OnDisconnect> {
        OnDisconnectP::new(self.handle.on_disconnect())
    }

    // ------------------------------------------------------------------
    // Single-outcome writes
    // ------------------------------------------------------------------

    /// Replace the value at this location
    pub fn set(&self, value: impl Into<Value>) -> rtdb_core::Result<Pending<()>> {
        let value = value.into();
        adapt_completion(|done| self.handle.set(value, done))
    }

    /// Write several children at once
    pub fn update(&self, values: Map<String, Value>) -> rtdb_core::Result<Pending<()>> {
        adapt_completion(|done| self.handle.update(values, done))
    }

    /// Delete this location
    pub fn remove(&self) -> rtdb_core::Result<Pending<()>> {
        adapt_completion(|done| self.handle.remove(done))
    }

    /// Replace value and priority
    pub fn set_with_priority(
        &self,
        value: impl Into<Value>,
        priority: impl Into<Priority>,
    ) -> rtdb_core::Result<Pending<()>> {
        let (value, priority) = (value.into(), priority.into());
        adapt_completion(|done| self.handle.set_with_priority(value, priority, done))
    }

    /// Change only the priority; `None` clears it
    pub fn set_priority(&self, priority: Option<Priority>) -> rtdb_core::Result<Pending<()>> {
        adapt_completion(|done| self.handle.set_priority(priority, done))
    }

    // ------------------------------------------------------------------
    // push
    // ------------------------------------------------------------------

    /// Allocate a new child location without writing to it.
    ///
    /// The location id is reserved immediately.
    pub fn push(&self) -> RefP<R> {
        RefP::new(self.handle.push())
    }

    /// Allocate a new child and write `value` to it.
    ///
    /// Returns the write's outcome rather than the reference; use
    /// [`RefP::push_with_ref`] to keep both.
    pub fn push_value(&self, value: impl Into<Value>) -> rtdb_core::Result<Pending<()>> {
        self.push().set(value)
    }

    /// Allocate a new child, write `value`, and return both the child and
    /// the write's outcome
    pub fn push_with_ref(
        &self,
        value: impl Into<Value>,
    ) -> rtdb_core::Result<(RefP<R>, Pending<()>)> {
        let child = self.push();
        let written = child.set(value)?;
        Ok((child, written))
    }

    // ------------------------------------------------------------------
    // Reads and transactions
    // ------------------------------------------------------------------

    /// Single read of `event`
    pub fn once(&self, event: EventType) -> Pending<Snapshot> {
        once_on(&self.handle, event)
    }

    /// Atomically modify the value at this location.
    ///
    /// `update` may run several times. Intermediate local states are only
    /// visible through [`Transaction::local_commits`]; the returned future
    /// settles with the committed snapshot or the client's error.
    pub fn transaction<F>(&self, update: F, apply_locally: bool) -> rtdb_core::Result<Transaction>
    where
        F: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    {
        let (settler, outcome) = pending();
        let (callback, tx) = transaction::transaction(settler, outcome);
        self.handle
            .transaction(Arc::new(update), callback, apply_locally)?;
        Ok(tx)
    }

    /// Transaction that reports local commits to a callback instead of a
    /// stream
    pub fn transaction_with<F, L>(
        &self,
        update: F,
        apply_locally: bool,
        on_local_commit: L,
    ) -> rtdb_core::Result<Pending<Snapshot>>
    where
        F: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
        L: FnMut(Snapshot) + Send + 'static,
    {
        let (settler, outcome) = pending();
        let callback = transaction::notifying_callback(settler, on_local_commit);
        self.handle
            .transaction(Arc::new(update), callback, apply_locally)?;
        Ok(outcome)
    }
}

impl<R: RefHandle> QueryPromise for RefP<R> {
    type Owner = R;

    fn on(
        &self,
        event: EventType,
        callback: SnapshotCallback,
        cancel: Option<CancelCallback>,
    ) -> ListenerId {
        RefP::on(self, event, callback, cancel)
    }

    fn off(&self, event: Option<EventType>, listener: Option<ListenerId>) {
        RefP::off(self, event, listener);
    }

    fn once(&self, event: EventType) -> Pending<Snapshot> {
        RefP::once(self, event)
    }

    fn limit(&self, n: usize) -> QueryP<R> {
        RefP::limit(self, n)
    }

    fn start_at(&self, priority: Option<Priority>, name: Option<&str>) -> QueryP<R> {
        RefP::start_at(self, priority, name)
    }

    fn end_at(&self, priority: Option<Priority>, name: Option<&str>) -> QueryP<R> {
        RefP::end_at(self, priority, name)
    }

    fn reference(&self) -> RefP<R> {
        RefP::reference(self)
    }
}

impl<R: RefHandle> fmt::Display for RefP<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.handle, f)
    }
}

impl<R: RefHandle> fmt::Debug for RefP<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RefP").field(&self.handle.to_string()).finish()
    }
}
