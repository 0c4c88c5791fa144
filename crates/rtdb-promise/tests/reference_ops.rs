//! Future-returning reference and query operations against the in-memory client

#![allow(clippy::unwrap_used)]

use assert_matches::assert_matches;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use rtdb_core::{ClientError, ErrorCode, EventType, Priority, Snapshot};
use rtdb_promise::{PromiseError, QueryPromise, RefP};
use rtdb_testkit::{CompletionMode, MemoryDatabase, MemoryRef};

fn setup(data: Value) -> (MemoryDatabase, RefP<MemoryRef>) {
    rtdb_testkit::init_test_tracing();
    let db = MemoryDatabase::with_data(data);
    let root = RefP::new(db.reference());
    (db, root)
}

#[tokio::test]
async fn test_set_resolves_when_client_confirms() {
    let (db, root) = setup(Value::Null);
    db.set_completion_mode(CompletionMode::Deferred);

    let mut written = root.child("users/alice").unwrap().set(json!({"age": 30})).unwrap();
    assert!(written.try_outcome().is_none());
    assert_eq!(db.value_at("users/alice/age"), json!(30));

    assert_eq!(db.flush(), 1);
    assert_eq!(written.await, Ok(()));
}

#[tokio::test]
async fn test_write_error_rejects_with_client_error() {
    let (db, root) = setup(json!({"locked": 1}));
    db.fail_writes_at("locked", ClientError::permission_denied("rules deny write"));

    let outcome = root.child("locked").unwrap().set(2).unwrap().await;
    assert_eq!(
        outcome,
        Err(PromiseError::Client(ClientError::permission_denied("rules deny write")))
    );
    assert_eq!(db.value_at("locked"), json!(1));
}

#[tokio::test]
async fn test_update_remove_and_priorities() {
    let (db, root) = setup(json!({"a": {"x": 1, "y": 2}}));
    let a = root.child("a").unwrap();

    let mut values = Map::new();
    values.insert("y".into(), json!(20));
    values.insert("z/deep".into(), json!(true));
    a.update(values).unwrap().await.unwrap();
    assert_eq!(db.value_at("a"), json!({"x": 1, "y": 20, "z": {"deep": true}}));

    a.child("x").unwrap().remove().unwrap().await.unwrap();
    assert_eq!(db.value_at("a/x"), Value::Null);

    a.child("y").unwrap().set_with_priority(21, 5.0).unwrap().await.unwrap();
    assert_eq!(db.priority_at("a/y"), Some(Priority::Number(5.0)));

    a.child("y")
        .unwrap()
        .set_priority(Some(Priority::from("high")))
        .unwrap()
        .await
        .unwrap();
    assert_eq!(db.priority_at("a/y"), Some(Priority::from("high")));
    assert_eq!(db.value_at("a/y"), json!(21));
}

#[tokio::test]
async fn test_sync_argument_error_is_returned_from_the_call() {
    let (db, root) = setup(Value::Null);
    let err = root.set(json!({"bad.key": 1})).err().unwrap();
    assert_eq!(err.code, ErrorCode::InvalidArgument);
    assert_eq!(db.write_calls(), 0);

    assert_matches!(root.child("a#b"), Err(e) if e.code == ErrorCode::InvalidArgument);
}

#[tokio::test]
async fn test_push_without_value_returns_reference_and_writes_nothing() {
    let (db, root) = setup(Value::Null);
    let messages = root.child("messages").unwrap();

    let slot = messages.push();
    let key = slot.key().unwrap();
    assert_eq!(slot.parent().unwrap().to_string(), messages.to_string());
    assert_eq!(db.write_calls(), 0);
    assert_eq!(db.value_at("messages"), Value::Null);

    slot.set("reserved").unwrap().await.unwrap();
    assert_eq!(db.value_at(&format!("messages/{key}")), json!("reserved"));
}

#[tokio::test]
async fn test_push_with_value_settles_with_the_write() {
    let (db, root) = setup(Value::Null);
    let messages = root.child("messages").unwrap();

    messages.push_value("hello").unwrap().await.unwrap();
    let (child, written) = messages.push_with_ref("world").unwrap();
    written.await.unwrap();

    assert_eq!(db.write_calls(), 2);
    let stored = db.value_at("messages");
    assert_eq!(stored.as_object().unwrap().len(), 2);
    assert_eq!(
        db.value_at(&format!("messages/{}", child.key().unwrap())),
        json!("world")
    );
}

#[tokio::test]
async fn test_navigation_returns_new_wrappers() {
    let (_db, root) = setup(Value::Null);
    let leaf = root.child("a/b").unwrap();

    assert_eq!(leaf.to_string(), "memory:/a/b");
    assert_eq!(leaf.key().as_deref(), Some("b"));
    assert_eq!(leaf.parent().unwrap().to_string(), "memory:/a");
    assert_eq!(leaf.root().to_string(), root.to_string());
    assert!(root.parent().is_none());
    assert!(root.key().is_none());

    let query = leaf.limit(10).start_at(None, Some("k"));
    assert_eq!(query.reference().to_string(), leaf.to_string());
    assert_eq!(leaf.reference().to_string(), leaf.to_string());
}

#[tokio::test]
async fn test_once_resolves_with_snapshot() {
    let (_db, root) = setup(json!({"config": {"theme": "dark"}}));
    let snapshot = root.child("config").unwrap().once(EventType::Value).await.unwrap();
    assert_eq!(snapshot.key(), Some("config"));
    assert_eq!(snapshot.child("theme").val(), &json!("dark"));
}

#[tokio::test]
async fn test_once_rejects_without_detail_when_read_denied() {
    let (db, root) = setup(json!({"private": 1}));
    db.deny_reads_at("private", ClientError::permission_denied("no"));
    let outcome = root.child("private").unwrap().once(EventType::Value).await;
    assert_eq!(outcome, Err(PromiseError::ReadCancelled));
}

#[tokio::test]
async fn test_once_child_added_waits_for_first_child() {
    let (_db, root) = setup(Value::Null);
    let inbox = root.child("inbox").unwrap();
    let mut first = inbox.once(EventType::ChildAdded);
    assert!(first.try_outcome().is_none());

    inbox.child("m1").unwrap().set("hi").unwrap().await.unwrap();
    let snapshot = first.await.unwrap();
    assert_eq!(snapshot.key(), Some("m1"));
}

#[tokio::test]
async fn test_on_and_off_are_delegated() {
    let (db, root) = setup(json!({"counter": 1}));
    let counter = root.child("counter").unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();

    let id = counter.on(
        EventType::Value,
        Arc::new(move |snap: &Snapshot| sink.lock().push(snap.val().clone())),
        None,
    );
    assert_eq!(db.listeners_at("counter"), 1);

    counter.set(2).unwrap().await.unwrap();
    counter.off(Some(EventType::Value), Some(id));
    counter.set(3).unwrap().await.unwrap();

    assert_eq!(*seen.lock(), vec![json!(1), json!(2)]);
    assert_eq!(db.listeners_at("counter"), 0);
}

async fn first_value<Q: QueryPromise>(query: &Q) -> Value {
    query.once(EventType::Value).await.unwrap().into_val()
}

#[tokio::test]
async fn test_queries_and_references_share_the_query_contract() {
    let (_db, root) = setup(json!({"list": {"a": 1, "b": 2, "c": 3}}));
    let list = root.child("list").unwrap();

    assert_eq!(first_value(&list).await, json!({"a": 1, "b": 2, "c": 3}));
    assert_eq!(first_value(&list.limit(2)).await, json!({"b": 2, "c": 3}));
    assert_eq!(
        first_value(&list.start_at(None, Some("b")).limit(1)).await,
        json!({"c": 3})
    );
    assert_eq!(
        first_value(&list.end_at(None, Some("a"))).await,
        json!({"a": 1})
    );
}

#[tokio::test]
async fn test_on_disconnect_writes_settle_on_queueing() {
    let (db, root) = setup(json!({"presence": {"bob": "online"}}));
    let bob = root.child("presence/bob").unwrap();

    bob.on_disconnect().set("offline").unwrap().await.unwrap();
    bob.child("since")
        .unwrap()
        .on_disconnect()
        .set_with_priority(0, 1.0)
        .unwrap()
        .await
        .unwrap();
    assert_eq!(db.queued_disconnect_writes(), 2);

    bob.child("since").unwrap().on_disconnect().cancel().await.unwrap();
    assert_eq!(db.queued_disconnect_writes(), 1);

    db.simulate_disconnect();
    assert_eq!(db.value_at("presence/bob"), json!("offline"));
}
