//! In-memory realtime database
//!
//! [`MemoryDatabase`] keeps one JSON tree plus listener, auth and
//! disconnect-queue state behind a `parking_lot::Mutex`. Every mutation
//! collects the resulting listener deliveries under the lock and runs them
//! after releasing it, so callbacks are free to call back into the database.
//!
//! Writes are applied locally at once and fire listeners immediately, like a
//! real client's local cache. Completion callbacks run right after the local
//! events in [`CompletionMode::Immediate`], or are queued until
//! [`MemoryDatabase::flush`] in [`CompletionMode::Deferred`].

use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use rtdb_core::{
    path, AuthCallback, AuthResult, CancelCallback, ClientError, CompletionCallback, EventType,
    ListenerId, OnceFailure, OnceSuccess, Priority, Snapshot, SnapshotCallback,
    TransactionCallback, TransactionUpdate,
};

use crate::handles::MemoryRef;
use crate::query::QueryParams;
use crate::transaction::CapturedTransaction;
use crate::tree;

/// When completion callbacks run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionMode {
    /// Right after the write's local events
    #[default]
    Immediate,
    /// Queued until [`MemoryDatabase::flush`]
    Deferred,
}

/// How `transaction` calls are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionMode {
    /// Run the update function against the current value and commit
    #[default]
    Auto,
    /// Capture the call for the test to drive by hand
    Scripted,
}

enum Sink {
    Persistent {
        callback: SnapshotCallback,
        cancel: Option<CancelCallback>,
    },
    Once {
        success: OnceSuccess,
        failure: OnceFailure,
    },
}

struct Listener {
    id: ListenerId,
    path: Vec<String>,
    params: QueryParams,
    event: EventType,
    last: Value,
    sink: Sink,
}

/// Callback invocation collected under the lock, run after releasing it
pub(crate) enum Delivery {
    Snapshot(SnapshotCallback, Snapshot),
    Once(OnceSuccess, Snapshot),
    Cancel(CancelCallback, ClientError),
    OnceFailed(OnceFailure),
    Completion(CompletionCallback, Option<ClientError>),
    Transaction(TransactionCallback, Option<ClientError>, bool, Option<Snapshot>),
}

impl Delivery {
    fn run(self) {
        match self {
            Self::Snapshot(callback, snapshot) => callback(&snapshot),
            Self::Once(success, snapshot) => success(snapshot),
            Self::Cancel(cancel, err) => cancel(err),
            Self::OnceFailed(failure) => failure(),
            Self::Completion(done, err) => done(err),
            Self::Transaction(mut callback, err, committed, snapshot) => {
                callback(err, committed, snapshot);
            }
        }
    }
}

pub(crate) fn run_all(deliveries: Vec<Delivery>) {
    for delivery in deliveries {
        delivery.run();
    }
}

/// Write queued with `on_disconnect`
#[derive(Debug, Clone)]
pub(crate) enum DisconnectOp {
    Set(Value, Option<Priority>),
    Update(Map<String, Value>),
    Remove,
}

struct AuthSession {
    token: String,
    cancel: Option<CancelCallback>,
}

#[derive(Default)]
pub(crate) struct DbState {
    data: Value,
    priorities: HashMap<String, Priority>,
    listeners: Vec<Listener>,
    next_listener: u64,
    push_counter: u64,
    completion_mode: CompletionMode,
    transaction_mode: TransactionMode,
    deferred: VecDeque<Delivery>,
    captured: VecDeque<CapturedTransaction>,
    write_failures: Vec<(Vec<String>, ClientError)>,
    read_denials: Vec<(Vec<String>, ClientError)>,
    tokens: HashMap<String, Result<AuthResult, ClientError>>,
    session: Option<AuthSession>,
    auth_calls: usize,
    unauth_calls: usize,
    write_calls: usize,
    disconnect_queue: Vec<(Vec<String>, DisconnectOp)>,
}

impl DbState {
    fn view(&self, location: &[String], params: &QueryParams) -> Value {
        params.apply(location, tree::get_cloned(&self.data, location), &self.priorities)
    }

    fn snapshot(&self, location: &[String], value: Value) -> Snapshot {
        Snapshot::new(location.last().cloned(), value)
            .with_priority(self.priorities.get(&path::join(location)).cloned())
    }

    fn write_failure(&self, location: &[String]) -> Option<ClientError> {
        self.write_failures
            .iter()
            .find(|(prefix, _)| tree::is_at_or_below(location, prefix))
            .map(|(_, err)| err.clone())
    }

    fn read_denial(&self, location: &[String]) -> Option<ClientError> {
        self.read_denials
            .iter()
            .find(|(prefix, _)| tree::is_at_or_below(location, prefix))
            .map(|(_, err)| err.clone())
    }

    fn clear_priorities_below(&mut self, location: &[String]) {
        let prefix = path::join(location);
        self.priorities.retain(|key, _| {
            !(key == &prefix || prefix == "/" || key.starts_with(&format!("{prefix}/")))
        });
    }

    fn apply_set(&mut self, location: &[String], value: Value, priority: Option<Priority>) {
        self.clear_priorities_below(location);
        tree::set(&mut self.data, location, value);
        if let Some(priority) = priority {
            self.priorities.insert(path::join(location), priority);
        }
    }

    fn apply_update(&mut self, location: &[String], values: Map<String, Value>) {
        for (key, value) in values {
            let mut target = location.to_vec();
            target.extend(path::segments(&key).into_iter().map(str::to_string));
            self.apply_set(&target, value, None);
        }
    }

    fn apply_op(&mut self, location: &[String], op: DisconnectOp) {
        match op {
            DisconnectOp::Set(value, priority) => self.apply_set(location, value, priority),
            DisconnectOp::Update(values) => self.apply_update(location, values),
            DisconnectOp::Remove => self.apply_set(location, Value::Null, None),
        }
    }

    /// Compare every listener's last view with the current data
    fn collect_changes(&mut self) -> Vec<Delivery> {
        let mut deliveries = Vec::new();
        let mut fired_once = 0usize;
        let listeners = std::mem::take(&mut self.listeners);
        let mut kept = Vec::with_capacity(listeners.len());

        for mut listener in listeners {
            let view = self.view(&listener.path, &listener.params);
            if view == listener.last {
                kept.push(listener);
                continue;
            }
            let snapshots = event_snapshots(self, &listener, &view);
            listener.last = view;
            match listener.sink {
                Sink::Persistent { ref callback, .. } => {
                    for snapshot in snapshots {
                        deliveries.push(Delivery::Snapshot(Arc::clone(callback), snapshot));
                    }
                    kept.push(listener);
                }
                Sink::Once { success, failure } => match snapshots.into_iter().next() {
                    Some(snapshot) => {
                        fired_once += 1;
                        deliveries.push(Delivery::Once(success, snapshot));
                    }
                    None => {
                        listener.sink = Sink::Once { success, failure };
                        kept.push(listener);
                    }
                },
            }
        }
        self.listeners = kept;
        if fired_once > 0 {
            tracing::trace!(count = fired_once, "one-shot listeners fired");
        }
        deliveries
    }

    fn completion(
        &mut self,
        done: CompletionCallback,
        err: Option<ClientError>,
    ) -> Option<Delivery> {
        let delivery = Delivery::Completion(done, err);
        match self.completion_mode {
            CompletionMode::Immediate => Some(delivery),
            CompletionMode::Deferred => {
                self.deferred.push_back(delivery);
                None
            }
        }
    }

    fn transaction_outcome(
        &mut self,
        callback: TransactionCallback,
        err: Option<ClientError>,
        committed: bool,
        snapshot: Option<Snapshot>,
    ) -> Option<Delivery> {
        let delivery = Delivery::Transaction(callback, err, committed, snapshot);
        match self.completion_mode {
            CompletionMode::Immediate => Some(delivery),
            CompletionMode::Deferred => {
                self.deferred.push_back(delivery);
                None
            }
        }
    }
}

/// Snapshots a listener should receive when its view changes to `view`
fn event_snapshots(state: &DbState, listener: &Listener, view: &Value) -> Vec<Snapshot> {
    let child_snapshot = |key: &String, value: &Value| {
        let mut location = listener.path.clone();
        location.push(key.clone());
        state.snapshot(&location, value.clone())
    };
    let empty = Map::new();
    let old = listener.last.as_object().unwrap_or(&empty);
    let new = view.as_object().unwrap_or(&empty);

    match listener.event {
        EventType::Value => vec![state.snapshot(&listener.path, view.clone())],
        EventType::ChildAdded => new
            .iter()
            .filter(|(k, _)| !old.contains_key(*k))
            .map(|(k, v)| child_snapshot(k, v))
            .collect(),
        EventType::ChildRemoved => old
            .iter()
            .filter(|(k, _)| !new.contains_key(*k))
            .map(|(k, v)| child_snapshot(k, v))
            .collect(),
        EventType::ChildChanged => new
            .iter()
            .filter(|(k, v)| old.get(*k).is_some_and(|prev| prev != *v))
            .map(|(k, v)| child_snapshot(k, v))
            .collect(),
        EventType::ChildMoved => Vec::new(),
    }
}

/// Shared in-memory database; clones share state
#[derive(Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<DbState>>,
}

impl MemoryDatabase {
    /// Empty database with immediate completions
    pub fn new() -> Self {
        Self::default()
    }

    /// Database seeded with `data` at the root
    pub fn with_data(data: Value) -> Self {
        let db = Self::new();
        db.state.lock().data = tree::normalize(data);
        db
    }

    /// Root reference
    pub fn reference(&self) -> MemoryRef {
        MemoryRef::new(self.clone(), Vec::new())
    }

    /// Reference at `location`
    pub fn reference_at(&self, location: &str) -> MemoryRef {
        MemoryRef::new(self.clone(), owned_segments(location))
    }

    // ------------------------------------------------------------------
    // Test controls
    // ------------------------------------------------------------------

    /// Switch completion delivery mode
    pub fn set_completion_mode(&self, mode: CompletionMode) {
        self.state.lock().completion_mode = mode;
    }

    /// Switch transaction handling mode
    pub fn set_transaction_mode(&self, mode: TransactionMode) {
        self.state.lock().transaction_mode = mode;
    }

    /// Run every queued completion, returning how many ran
    pub fn flush(&self) -> usize {
        let queued: Vec<Delivery> = self.state.lock().deferred.drain(..).collect();
        let count = queued.len();
        run_all(queued);
        count
    }

    /// Number of completions waiting for [`MemoryDatabase::flush`]
    pub fn pending_completions(&self) -> usize {
        self.state.lock().deferred.len()
    }

    /// Oldest transaction captured in [`TransactionMode::Scripted`]
    pub fn take_transaction(&self) -> Option<CapturedTransaction> {
        self.state.lock().captured.pop_front()
    }

    /// Make writes at or below `location` fail with `err`
    pub fn fail_writes_at(&self, location: &str, err: ClientError) {
        self.state
            .lock()
            .write_failures
            .push((owned_segments(location), err));
    }

    /// Stop failing writes
    pub fn clear_write_failures(&self) {
        self.state.lock().write_failures.clear();
    }

    /// Revoke read access at or below `location`.
    ///
    /// Live listeners there are removed and their cancel callbacks run;
    /// waiting one-shot reads fail.
    pub fn deny_reads_at(&self, location: &str, err: ClientError) {
        let denied = owned_segments(location);
        let deliveries = {
            let mut state = self.state.lock();
            state.read_denials.push((denied.clone(), err.clone()));
            let listeners = std::mem::take(&mut state.listeners);
            let (revoked, kept): (Vec<_>, Vec<_>) = listeners
                .into_iter()
                .partition(|l| tree::is_at_or_below(&l.path, &denied));
            state.listeners = kept;
            revoked
                .into_iter()
                .filter_map(|listener| match listener.sink {
                    Sink::Persistent { cancel, .. } => {
                        cancel.map(|cancel| Delivery::Cancel(cancel, err.clone()))
                    }
                    Sink::Once { failure, .. } => Some(Delivery::OnceFailed(failure)),
                })
                .collect::<Vec<_>>()
        };
        tracing::debug!(location, revoked = deliveries.len(), "read access revoked");
        run_all(deliveries);
    }

    /// Restore read access everywhere
    pub fn allow_all_reads(&self) {
        self.state.lock().read_denials.clear();
    }

    /// Accept `token`, answering with `result`
    pub fn register_token(&self, token: &str, result: AuthResult) {
        self.state.lock().tokens.insert(token.to_string(), Ok(result));
    }

    /// Reject `token` with `err`
    pub fn reject_token(&self, token: &str, err: ClientError) {
        self.state.lock().tokens.insert(token.to_string(), Err(err));
    }

    /// Revoke the current auth session, running its cancel callback
    pub fn expire_session(&self, err: ClientError) {
        let session = self.state.lock().session.take();
        if let Some(AuthSession {
            cancel: Some(cancel),
            ..
        }) = session
        {
            cancel(err);
        }
    }

    /// Re-deliver the current view to the value listeners at `location`, as a
    /// client does after a reconnect. Returns the number of deliveries.
    pub fn replay_listeners_at(&self, location: &str) -> usize {
        let location = owned_segments(location);
        let deliveries = {
            let state = self.state.lock();
            state
                .listeners
                .iter()
                .filter(|l| l.path == location && l.event == EventType::Value)
                .filter_map(|l| match &l.sink {
                    Sink::Persistent { callback, .. } => Some(Delivery::Snapshot(
                        Arc::clone(callback),
                        state.snapshot(&l.path, l.last.clone()),
                    )),
                    Sink::Once { .. } => None,
                })
                .collect::<Vec<_>>()
        };
        let count = deliveries.len();
        tracing::debug!(path = %path::join(&location), count, "replaying listeners");
        run_all(deliveries);
        count
    }

    /// Perform every queued disconnect write
    pub fn simulate_disconnect(&self) {
        let deliveries = {
            let mut state = self.state.lock();
            let queue = std::mem::take(&mut state.disconnect_queue);
            for (location, op) in queue {
                state.apply_op(&location, op);
            }
            state.collect_changes()
        };
        run_all(deliveries);
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Value stored at `location`, `Null` when absent
    pub fn value_at(&self, location: &str) -> Value {
        tree::get_cloned(&self.state.lock().data, &owned_segments(location))
    }

    /// Priority stored at `location`
    pub fn priority_at(&self, location: &str) -> Option<Priority> {
        let key = path::join(&owned_segments(location));
        self.state.lock().priorities.get(&key).cloned()
    }

    /// Number of `auth` calls received
    pub fn auth_calls(&self) -> usize {
        self.state.lock().auth_calls
    }

    /// Number of `unauth` calls received
    pub fn unauth_calls(&self) -> usize {
        self.state.lock().unauth_calls
    }

    /// Number of write operations received (including failed ones)
    pub fn write_calls(&self) -> usize {
        self.state.lock().write_calls
    }

    /// Token of the current auth session
    pub fn authenticated_token(&self) -> Option<String> {
        self.state.lock().session.as_ref().map(|s| s.token.clone())
    }

    /// Registered persistent and waiting one-shot listeners
    pub fn listener_count(&self) -> usize {
        self.state.lock().listeners.len()
    }

    /// Listeners registered exactly at `location`
    pub fn listeners_at(&self, location: &str) -> usize {
        let location = owned_segments(location);
        self.state
            .lock()
            .listeners
            .iter()
            .filter(|l| l.path == location)
            .count()
    }

    /// Writes waiting in the disconnect queue
    pub fn queued_disconnect_writes(&self) -> usize {
        self.state.lock().disconnect_queue.len()
    }

    // ------------------------------------------------------------------
    // Client operations used by the handles
    // ------------------------------------------------------------------

    pub(crate) fn next_push_key(&self) -> String {
        let mut state = self.state.lock();
        state.push_counter += 1;
        format!("-K{:012}", state.push_counter)
    }

    pub(crate) fn listen(
        &self,
        location: Vec<String>,
        params: QueryParams,
        event: EventType,
        callback: SnapshotCallback,
        cancel: Option<CancelCallback>,
    ) -> ListenerId {
        let (id, deliveries) = {
            let mut state = self.state.lock();
            state.next_listener += 1;
            let id = ListenerId(state.next_listener);
            let mut deliveries = Vec::new();
            match state.read_denial(&location) {
                Some(err) => {
                    deliveries.extend(cancel.map(|cancel| Delivery::Cancel(cancel, err)));
                }
                None => {
                    let view = state.view(&location, &params);
                    for snapshot in initial_snapshots(&state, &location, event, &view) {
                        deliveries.push(Delivery::Snapshot(Arc::clone(&callback), snapshot));
                    }
                    state.listeners.push(Listener {
                        id,
                        path: location,
                        params,
                        event,
                        last: view,
                        sink: Sink::Persistent { callback, cancel },
                    });
                }
            }
            (id, deliveries)
        };
        run_all(deliveries);
        id
    }

    pub(crate) fn unlisten(
        &self,
        location: &[String],
        params: &QueryParams,
        event: Option<EventType>,
        listener: Option<ListenerId>,
    ) {
        let mut state = self.state.lock();
        state.listeners.retain(|l| {
            let matches = l.path == location
                && l.params == *params
                && matches!(l.sink, Sink::Persistent { .. })
                && event.map_or(true, |e| e == l.event)
                && listener.map_or(true, |id| id == l.id);
            !matches
        });
    }

    pub(crate) fn listen_once(
        &self,
        location: Vec<String>,
        params: QueryParams,
        event: EventType,
        success: OnceSuccess,
        failure: OnceFailure,
    ) {
        let delivery = {
            let mut state = self.state.lock();
            if state.read_denial(&location).is_some() {
                Some(Delivery::OnceFailed(failure))
            } else {
                let view = state.view(&location, &params);
                let first = initial_snapshots(&state, &location, event, &view)
                    .into_iter()
                    .next();
                match first {
                    Some(snapshot) => Some(Delivery::Once(success, snapshot)),
                    None => {
                        state.next_listener += 1;
                        let id = ListenerId(state.next_listener);
                        state.listeners.push(Listener {
                            id,
                            path: location,
                            params,
                            event,
                            last: view,
                            sink: Sink::Once { success, failure },
                        });
                        None
                    }
                }
            }
        };
        if let Some(delivery) = delivery {
            delivery.run();
        }
    }

    /// Shared write path: injected failure or apply, then notify
    pub(crate) fn write(
        &self,
        location: &[String],
        done: CompletionCallback,
        apply: impl FnOnce(&mut DbState),
    ) {
        let deliveries = {
            let mut state = self.state.lock();
            state.write_calls += 1;
            let mut deliveries = Vec::new();
            match state.write_failure(location) {
                Some(err) => {
                    tracing::debug!(
                        location = %path::join(location),
                        error = %err,
                        "injected write failure"
                    );
                    deliveries.extend(state.completion(done, Some(err)));
                }
                None => {
                    apply(&mut *state);
                    deliveries = state.collect_changes();
                    deliveries.extend(state.completion(done, None));
                }
            }
            deliveries
        };
        run_all(deliveries);
    }

    pub(crate) fn set(
        &self,
        location: &[String],
        value: Value,
        priority: Option<Priority>,
        done: CompletionCallback,
    ) {
        self.write(location, done, |state| state.apply_set(location, value, priority));
    }

    pub(crate) fn update(
        &self,
        location: &[String],
        values: Map<String, Value>,
        done: CompletionCallback,
    ) {
        self.write(location, done, |state| state.apply_update(location, values));
    }

    pub(crate) fn set_priority(
        &self,
        location: &[String],
        priority: Option<Priority>,
        done: CompletionCallback,
    ) {
        let key = path::join(location);
        self.write(location, done, move |state| match priority {
            Some(priority) => {
                state.priorities.insert(key, priority);
            }
            None => {
                state.priorities.remove(&key);
            }
        });
    }

    pub(crate) fn transaction(
        &self,
        location: Vec<String>,
        update: TransactionUpdate,
        mut callback: TransactionCallback,
        apply_locally: bool,
    ) {
        let deliveries = {
            let mut state = self.state.lock();
            if state.transaction_mode == TransactionMode::Scripted {
                let captured = CapturedTransaction::new(
                    path::join(&location),
                    update,
                    callback,
                    apply_locally,
                );
                state.captured.push_back(captured);
                return;
            }
            state.write_calls += 1;

            let current = tree::get_cloned(&state.data, &location);
            let Some(next) = update(&current) else {
                tracing::debug!(location = %path::join(&location), "transaction aborted");
                let snapshot = state.snapshot(&location, current);
                drop(state);
                callback(None, false, Some(snapshot));
                return;
            };

            let mut deliveries = Vec::new();
            if apply_locally {
                let local = state.snapshot(&location, tree::normalize(next.clone()));
                // Local notifications are always synchronous.
                drop(state);
                callback(None, false, Some(local));
                state = self.state.lock();
            }

            match state.write_failure(&location) {
                Some(err) => {
                    deliveries.extend(state.transaction_outcome(callback, Some(err), false, None));
                }
                None => {
                    state.apply_set(&location, next, None);
                    deliveries = state.collect_changes();
                    let stored = tree::get_cloned(&state.data, &location);
                    let committed = state.snapshot(&location, stored);
                    deliveries.extend(state.transaction_outcome(
                        callback,
                        None,
                        true,
                        Some(committed),
                    ));
                }
            }
            deliveries
        };
        run_all(deliveries);
    }

    pub(crate) fn auth(
        &self,
        token: &str,
        on_complete: AuthCallback,
        on_cancel: Option<CancelCallback>,
    ) {
        let outcome = {
            let mut state = self.state.lock();
            state.auth_calls += 1;
            let outcome = state
                .tokens
                .get(token)
                .cloned()
                .unwrap_or_else(|| {
                    Err(ClientError::invalid_token(format!("unknown token {token:?}")))
                });
            if outcome.is_ok() {
                state.session = Some(AuthSession {
                    token: token.to_string(),
                    cancel: on_cancel,
                });
            }
            outcome
        };
        on_complete(outcome);
    }

    pub(crate) fn unauth(&self) {
        let mut state = self.state.lock();
        state.unauth_calls += 1;
        // The session's cancel callback is dropped, not invoked.
        state.session = None;
    }

    pub(crate) fn queue_disconnect(
        &self,
        location: &[String],
        op: DisconnectOp,
        done: CompletionCallback,
    ) {
        let delivery = {
            let mut state = self.state.lock();
            state.disconnect_queue.push((location.to_vec(), op));
            state.completion(done, None)
        };
        if let Some(delivery) = delivery {
            delivery.run();
        }
    }

    pub(crate) fn cancel_disconnect(&self, location: &[String], done: CompletionCallback) {
        let delivery = {
            let mut state = self.state.lock();
            state
                .disconnect_queue
                .retain(|(queued, _)| !tree::is_at_or_below(queued, location));
            state.completion(done, None)
        };
        if let Some(delivery) = delivery {
            delivery.run();
        }
    }
}

/// Snapshots delivered when a listener is first registered
fn initial_snapshots(
    state: &DbState,
    location: &[String],
    event: EventType,
    view: &Value,
) -> Vec<Snapshot> {
    match event {
        EventType::Value => vec![state.snapshot(location, view.clone())],
        EventType::ChildAdded => view
            .as_object()
            .map(|children| {
                children
                    .iter()
                    .map(|(k, v)| {
                        let mut child = location.to_vec();
                        child.push(k.clone());
                        state.snapshot(&child, v.clone())
                    })
                    .collect()
            })
            .unwrap_or_default(),
        EventType::ChildChanged | EventType::ChildRemoved | EventType::ChildMoved => Vec::new(),
    }
}

pub(crate) fn owned_segments(location: &str) -> Vec<String> {
    path::segments(location)
        .into_iter()
        .map(str::to_string)
        .collect()
}
