//! Client Capability Traits
//!
//! Pure interfaces describing the callback-based surface of a realtime
//! database client. Nothing in this module performs I/O; concrete clients
//! (network-backed, or the in-memory one in `rtdb-testkit`) implement these
//! traits and own connection management, caching and synchronization.
//!
//! # Capability classes
//!
//! - [`Observable`]: listen/unlisten/one-shot read, shared by every handle
//! - [`QueryHandle`]: a filtered view that can be narrowed further
//! - [`RefHandle`]: a location; reads, writes, navigation, auth
//! - [`OnDisconnectHandle`]: writes queued server-side until disconnect
//!
//! # Callback contract
//!
//! Completion callbacks are invoked at most once by a well-behaved client.
//! Transaction callbacks may be invoked many times: once per optimistic local
//! application, then once more with the terminal outcome. Handles may reject
//! malformed arguments synchronously by returning `Err`; in that case the
//! callback passed to the call is dropped without being invoked.

use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

use crate::auth::AuthResult;
use crate::errors::{ClientError, Result};
use crate::event::{EventType, ListenerId};
use crate::value::{Priority, Snapshot};

/// Node-style completion: `None` on success, the error on failure
pub type CompletionCallback = Box<dyn FnOnce(Option<ClientError>) + Send>;

/// Listener invoked for every matching event
pub type SnapshotCallback = Arc<dyn Fn(&Snapshot) + Send + Sync>;

/// Invoked when the client revokes a listener or an auth session
pub type CancelCallback = Box<dyn FnOnce(ClientError) + Send>;

/// Success half of a one-shot read
pub type OnceSuccess = Box<dyn FnOnce(Snapshot) + Send>;

/// Failure half of a one-shot read; the client supplies no error detail
pub type OnceFailure = Box<dyn FnOnce() + Send>;

/// Outcome of an `auth` call
pub type AuthCallback = Box<dyn FnOnce(std::result::Result<AuthResult, ClientError>) + Send>;

/// Pure function from the current value to the desired value.
///
/// Returning `None` aborts the transaction. The client may call it several
/// times while it retries against fresher data.
pub type TransactionUpdate = Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>;

/// Transaction progress: `(error, committed, snapshot)`.
///
/// Invoked once per local application with `(None, false, Some(local))` and
/// finally with either an error or `(None, true, Some(committed))`.
pub type TransactionCallback = Box<dyn FnMut(Option<ClientError>, bool, Option<Snapshot>) + Send>;

/// Read surface shared by references and queries
pub trait Observable: Send + Sync + 'static {
    /// Register a persistent listener for `event`.
    ///
    /// `cancel` is invoked if the client later revokes the listener, for
    /// example when security rules stop allowing the read.
    fn on(
        &self,
        event: EventType,
        callback: SnapshotCallback,
        cancel: Option<CancelCallback>,
    ) -> ListenerId;

    /// Remove listeners. `None` arguments widen the match: no event removes
    /// every event type, no listener removes every listener of that type.
    fn off(&self, event: Option<EventType>, listener: Option<ListenerId>);

    /// Listen for exactly one delivery of `event`
    fn once(&self, event: EventType, success: OnceSuccess, failure: OnceFailure);
}

/// A filtered, ordered view over a location
pub trait QueryHandle: Observable + Clone {
    /// Keep at most `n` children
    fn limit(&self, n: usize) -> Self;

    /// Start the range at the given priority and optional child name
    fn start_at(&self, priority: Option<Priority>, name: Option<&str>) -> Self;

    /// End the range at the given priority and optional child name
    fn end_at(&self, priority: Option<Priority>, name: Option<&str>) -> Self;
}

/// Writes the server performs when this client disconnects
pub trait OnDisconnectHandle: Send + Sync + 'static {
    /// Queue a set
    fn set(&self, value: Value, on_complete: CompletionCallback) -> Result<()>;

    /// Queue a set with priority
    fn set_with_priority(
        &self,
        value: Value,
        priority: Priority,
        on_complete: CompletionCallback,
    ) -> Result<()>;

    /// Queue a multi-child update
    fn update(&self, values: Map<String, Value>, on_complete: CompletionCallback) -> Result<()>;

    /// Queue a removal
    fn remove(&self, on_complete: CompletionCallback) -> Result<()>;

    /// Cancel every queued write at this location and below
    fn cancel(&self, on_complete: CompletionCallback);
}

/// A location in the realtime store.
///
/// `Display` renders the absolute URL or path of the location.
pub trait RefHandle: Observable + Clone + fmt::Display {
    /// Handle produced by `limit` / `start_at` / `end_at`
    type Query: QueryHandle;

    /// Handle produced by `on_disconnect`
    type OnDisconnect: OnDisconnectHandle;

    /// Authenticate the client connection with `token`.
    ///
    /// `on_cancel` fires if the session is later revoked (e.g. token expiry).
    fn auth(&self, token: &str, on_complete: AuthCallback, on_cancel: Option<CancelCallback>);

    /// Drop the authenticated session
    fn unauth(&self);

    /// Descendant location at relative `path`
    fn child(&self, path: &str) -> Result<Self>;

    /// Parent location, `None` at the root
    fn parent(&self) -> Option<Self>;

    /// Root location
    fn root(&self) -> Self;

    /// Last path segment, `None` at the root
    fn key(&self) -> Option<String>;

    /// Replace the value at this location
    fn set(&self, value: Value, on_complete: CompletionCallback) -> Result<()>;

    /// Write several children at once
    fn update(&self, values: Map<String, Value>, on_complete: CompletionCallback) -> Result<()>;

    /// Delete this location
    fn remove(&self, on_complete: CompletionCallback) -> Result<()>;

    /// Allocate a new uniquely named child location. No data is written.
    fn push(&self) -> Self;

    /// Replace the value and priority at this location
    fn set_with_priority(
        &self,
        value: Value,
        priority: Priority,
        on_complete: CompletionCallback,
    ) -> Result<()>;

    /// Change only the priority; `None` clears it
    fn set_priority(&self, priority: Option<Priority>, on_complete: CompletionCallback)
        -> Result<()>;

    /// Atomically modify the value at this location
    fn transaction(
        &self,
        update: TransactionUpdate,
        on_complete: TransactionCallback,
        apply_locally: bool,
    ) -> Result<()>;

    /// Query limited to `n` children
    fn limit(&self, n: usize) -> Self::Query;

    /// Query starting at the given priority / name
    fn start_at(&self, priority: Option<Priority>, name: Option<&str>) -> Self::Query;

    /// Query ending at the given priority / name
    fn end_at(&self, priority: Option<Priority>, name: Option<&str>) -> Self::Query;

    /// Writes to perform server-side when this client disconnects
    fn on_disconnect(&self) -> Self::OnDisconnect;
}
