//! Behaviour of the in-memory database through the capability traits

#![allow(clippy::unwrap_used)]

use assert_matches::assert_matches;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;

use rtdb_core::{
    AuthClaims, AuthResult, ClientError, ErrorCode, EventType, Observable, OnDisconnectHandle,
    Priority, QueryHandle, RefHandle, Snapshot,
};
use rtdb_testkit::{CompletionMode, MemoryDatabase, TransactionMode};

type Log<T> = Arc<Mutex<Vec<T>>>;

fn log<T>() -> Log<T> {
    Arc::new(Mutex::new(Vec::new()))
}

fn record_values(log: &Log<Value>) -> rtdb_core::SnapshotCallback {
    let log = log.clone();
    Arc::new(move |snap: &Snapshot| log.lock().push(snap.val().clone()))
}

fn record_completion(log: &Log<Option<ClientError>>) -> rtdb_core::CompletionCallback {
    let log = log.clone();
    Box::new(move |err| log.lock().push(err))
}

#[test]
fn test_value_listener_sees_initial_and_later_values() {
    rtdb_testkit::init_test_tracing();
    let db = MemoryDatabase::with_data(json!({"a": 1}));
    let seen = log();
    let a = db.reference_at("a");
    let id = a.on(EventType::Value, record_values(&seen), None);

    a.set(json!(2), Box::new(|_| {})).unwrap();
    a.off(Some(EventType::Value), Some(id));
    a.set(json!(3), Box::new(|_| {})).unwrap();

    assert_eq!(*seen.lock(), vec![json!(1), json!(2)]);
    assert_eq!(db.listener_count(), 0);
}

#[test]
fn test_parent_listener_fires_for_child_write() {
    let db = MemoryDatabase::new();
    let seen = log();
    db.reference().on(EventType::Value, record_values(&seen), None);
    db.reference_at("users/alice")
        .set(json!({"name": "Alice"}), Box::new(|_| {}))
        .unwrap();
    assert_eq!(
        *seen.lock(),
        vec![Value::Null, json!({"users": {"alice": {"name": "Alice"}}})]
    );
}

#[test]
fn test_deferred_completion_waits_for_flush() {
    let db = MemoryDatabase::new();
    db.set_completion_mode(CompletionMode::Deferred);
    let done = log();
    db.reference_at("x")
        .set(json!(true), record_completion(&done))
        .unwrap();

    assert_eq!(db.value_at("x"), json!(true));
    assert!(done.lock().is_empty());
    assert_eq!(db.pending_completions(), 1);

    assert_eq!(db.flush(), 1);
    assert_eq!(*done.lock(), vec![None]);
}

#[test]
fn test_injected_write_failure_leaves_data_untouched() {
    let db = MemoryDatabase::with_data(json!({"locked": {"v": 1}}));
    db.fail_writes_at("locked", ClientError::permission_denied("rules"));
    let done = log();
    db.reference_at("locked/v")
        .set(json!(2), record_completion(&done))
        .unwrap();

    assert_eq!(db.value_at("locked/v"), json!(1));
    assert_matches!(
        done.lock().as_slice(),
        [Some(err)] if err.code == ErrorCode::PermissionDenied
    );
    assert_eq!(db.write_calls(), 1);
}

#[test]
fn test_revoked_read_cancels_listeners_and_once() {
    let db = MemoryDatabase::with_data(json!({"secret": 1}));
    let cancelled = log();
    let sink = cancelled.clone();
    db.reference_at("secret").on(
        EventType::Value,
        Arc::new(|_: &Snapshot| {}),
        Some(Box::new(move |err| sink.lock().push(err))),
    );
    db.reference_at("secret")
        .on(EventType::ChildAdded, Arc::new(|_: &Snapshot| {}), None);

    db.deny_reads_at("secret", ClientError::permission_denied("revoked"));
    assert_eq!(cancelled.lock().len(), 1);
    assert_eq!(db.listener_count(), 0);

    let failed = Arc::new(Mutex::new(false));
    let flag = failed.clone();
    db.reference_at("secret/deeper").once(
        EventType::Value,
        Box::new(|_| panic!("read should be denied")),
        Box::new(move || *flag.lock() = true),
    );
    assert!(*failed.lock());
}

#[test]
fn test_child_events_on_limited_query() {
    let db = MemoryDatabase::new();
    let list = db.reference_at("list");
    let added = log();
    let removed = log();
    let query = list.limit(2);
    query.on(EventType::ChildAdded, record_values(&added), None);
    query.on(EventType::ChildRemoved, record_values(&removed), None);

    for n in 1..=3 {
        list.child(&format!("k{n}"))
            .unwrap()
            .set(json!(n), Box::new(|_| {}))
            .unwrap();
    }

    assert_eq!(*added.lock(), vec![json!(1), json!(2), json!(3)]);
    assert_eq!(*removed.lock(), vec![json!(1)]);
}

#[test]
fn test_priority_bounds_filter_children() {
    let db = MemoryDatabase::new();
    let scores = db.reference_at("scores");
    for (name, score) in [("ann", 10.0), ("bob", 50.0), ("cat", 90.0)] {
        scores
            .child(name)
            .unwrap()
            .set_with_priority(json!(score), Priority::Number(score), Box::new(|_| {}))
            .unwrap();
    }
    assert_eq!(db.priority_at("scores/bob"), Some(Priority::Number(50.0)));

    let seen = log();
    scores
        .start_at(Some(Priority::Number(20.0)), None)
        .end_at(Some(Priority::Number(90.0)), None)
        .on(EventType::Value, record_values(&seen), None);
    assert_eq!(*seen.lock(), vec![json!({"bob": 50.0, "cat": 90.0})]);
}

#[test]
fn test_disconnect_queue_runs_on_simulated_disconnect() {
    let db = MemoryDatabase::with_data(json!({"presence": {"alice": "online"}}));
    let alice = db.reference_at("presence/alice");
    alice
        .on_disconnect()
        .set(json!("offline"), Box::new(|_| {}))
        .unwrap();
    db.reference_at("typing")
        .on_disconnect()
        .remove(Box::new(|_| {}))
        .unwrap();
    assert_eq!(db.queued_disconnect_writes(), 2);

    db.reference_at("typing")
        .on_disconnect()
        .cancel(Box::new(|_| {}));
    assert_eq!(db.queued_disconnect_writes(), 1);
    assert_eq!(db.value_at("presence/alice"), json!("online"));

    db.simulate_disconnect();
    assert_eq!(db.value_at("presence/alice"), json!("offline"));
    assert_eq!(db.queued_disconnect_writes(), 0);
}

#[test]
fn test_auto_transaction_reports_local_then_commit() {
    let db = MemoryDatabase::with_data(json!({"counter": 4}));
    let calls: Log<(bool, bool, Option<Value>)> = log();
    let sink = calls.clone();
    db.reference_at("counter")
        .transaction(
            Arc::new(|current: &Value| Some(json!(current.as_i64().unwrap_or(0) + 1))),
            Box::new(move |err, committed, snap| {
                sink.lock()
                    .push((err.is_some(), committed, snap.map(Snapshot::into_val)))
            }),
            true,
        )
        .unwrap();

    assert_eq!(
        *calls.lock(),
        vec![(false, false, Some(json!(5))), (false, true, Some(json!(5)))]
    );
    assert_eq!(db.value_at("counter"), json!(5));
}

#[test]
fn test_scripted_transaction_is_captured() {
    let db = MemoryDatabase::new();
    db.set_transaction_mode(TransactionMode::Scripted);
    db.reference_at("n")
        .transaction(Arc::new(|_: &Value| Some(json!(1))), Box::new(|_, _, _| {}), false)
        .unwrap();

    let captured = db.take_transaction().unwrap();
    assert_eq!(captured.path(), "/n");
    assert!(!captured.apply_locally());
    assert_eq!(captured.run_update(&Value::Null), Some(json!(1)));
    assert!(db.take_transaction().is_none());
}

#[test]
fn test_auth_tokens_and_session_expiry() {
    let db = MemoryDatabase::new();
    let claims = AuthClaims::new().with("uid", "alice");
    db.register_token("good", AuthResult::new(claims.clone()));
    db.reject_token("stale", ClientError::expired_token("expired"));

    let outcomes = log();
    let cancels = log();
    for token in ["good", "stale", "unknown"] {
        let outcomes = outcomes.clone();
        let cancels = cancels.clone();
        db.reference().auth(
            token,
            Box::new(move |result| outcomes.lock().push(result.map(|r| r.auth))),
            Some(Box::new(move |err| cancels.lock().push(err.code))),
        );
    }

    assert_matches!(
        outcomes.lock().as_slice(),
        [Ok(c), Err(stale), Err(unknown)]
            if *c == claims
                && stale.code == ErrorCode::ExpiredToken
                && unknown.code == ErrorCode::InvalidToken
    );
    assert_eq!(db.authenticated_token().as_deref(), Some("good"));
    assert_eq!(db.auth_calls(), 3);

    db.expire_session(ClientError::expired_token("timeout"));
    assert_eq!(*cancels.lock(), vec![ErrorCode::ExpiredToken]);
    assert!(db.authenticated_token().is_none());
}

#[test]
fn test_replay_redelivers_unchanged_value() {
    let db = MemoryDatabase::with_data(json!({"version": "v1", "other": 0}));
    let seen = log();
    db.reference_at("version")
        .on(EventType::Value, record_values(&seen), None);
    db.reference_at("version")
        .on(EventType::ChildAdded, Arc::new(|_: &Snapshot| {}), None);
    db.reference_at("other")
        .on(EventType::Value, Arc::new(|_: &Snapshot| {}), None);

    assert_eq!(db.replay_listeners_at("version"), 1);
    assert_eq!(*seen.lock(), vec![json!("v1"), json!("v1")]);
    assert_eq!(db.replay_listeners_at("missing"), 0);
}
