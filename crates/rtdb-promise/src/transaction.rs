//! Transactions as two channels
//!
//! A client transaction callback fires once per optimistic local application
//! and once more with the terminal outcome. A future can only settle once, so
//! the two are split: [`Transaction`] is the terminal future, and
//! [`LocalCommits`] is a stream of the intermediate local states.
//!
//! Non-terminal notifications never settle the future. The stream ends when
//! the transaction settles; dropping it stops delivery without affecting the
//! outcome.

use futures::channel::mpsc;
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use rtdb_core::{Snapshot, TransactionCallback, Value};

use crate::errors::PromiseError;
use crate::settle::{Pending, Settler};

/// Stream of locally applied, not yet committed, transaction states
pub struct LocalCommits {
    rx: mpsc::UnboundedReceiver<Snapshot>,
}

impl Stream for LocalCommits {
    type Item = Snapshot;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx).poll_next(cx)
    }
}

impl LocalCommits {
    /// Next already-delivered local state, without waiting.
    ///
    /// `None` means nothing is buffered right now (or the stream ended).
    pub fn try_next_local(&mut self) -> Option<Snapshot> {
        self.rx.try_next().ok().flatten()
    }
}

/// In-flight transaction.
///
/// Awaiting it yields the committed snapshot or the client's error.
#[must_use = "a transaction outcome is only observable by awaiting it"]
pub struct Transaction {
    outcome: Pending<Snapshot>,
    local_commits: LocalCommits,
}

impl Transaction {
    /// Intermediate local states delivered so far and in the future
    pub fn local_commits(&mut self) -> &mut LocalCommits {
        &mut self.local_commits
    }

    /// Split into the terminal future and the notification stream
    pub fn into_parts(self) -> (Pending<Snapshot>, LocalCommits) {
        (self.outcome, self.local_commits)
    }

    /// Non-blocking check of the terminal outcome
    pub fn try_outcome(&mut self) -> Option<Result<Snapshot, PromiseError>> {
        self.outcome.try_outcome()
    }
}

impl Future for Transaction {
    type Output = Result<Snapshot, PromiseError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.outcome).poll(cx)
    }
}

/// Build the transaction callback that feeds both channels
fn channel_callback(settler: Settler<Snapshot>) -> (TransactionCallback, LocalCommits) {
    let (tx, rx) = mpsc::unbounded();
    let callback = notifying_callback(settler, move |snapshot| {
        // A dropped stream only means nobody is watching local commits.
        let _ = tx.unbounded_send(snapshot);
    });
    (callback, LocalCommits { rx })
}

/// Build a transaction callback that reports local commits to `on_local_commit`.
///
/// `on_local_commit` is dropped as soon as the transaction settles. A commit
/// reported without a snapshot resolves with the last local one, or with an
/// empty keyless snapshot when there was none.
pub(crate) fn notifying_callback<F>(
    settler: Settler<Snapshot>,
    on_local_commit: F,
) -> TransactionCallback
where
    F: FnMut(Snapshot) + Send + 'static,
{
    let mut notify = Some(on_local_commit);
    let mut last_local: Option<Snapshot> = None;
    Box::new(move |error, committed, snapshot| {
        if settler.is_settled() {
            tracing::debug!(committed, "ignoring transaction notification after settlement");
            return;
        }
        if let Some(err) = error {
            tracing::debug!(error = %err, "transaction failed");
            notify = None;
            settler.reject(err);
            return;
        }
        if committed {
            notify = None;
            let snapshot = snapshot.or_else(|| {
                tracing::warn!(
                    has_local = last_local.is_some(),
                    "client committed a transaction without a snapshot"
                );
                last_local.take()
            });
            settler.resolve(snapshot.unwrap_or_else(|| Snapshot::new(None, Value::Null)));
            return;
        }
        tracing::trace!("transaction applied locally, awaiting commit");
        if let Some(snapshot) = snapshot {
            last_local = Some(snapshot.clone());
            if let Some(notify) = notify.as_mut() {
                notify(snapshot);
            }
        }
    })
}

/// Pair a settler with its channels
pub(crate) fn transaction(
    settler: Settler<Snapshot>,
    outcome: Pending<Snapshot>,
) -> (TransactionCallback, Transaction) {
    let (callback, local_commits) = channel_callback(settler);
    (
        callback,
        Transaction {
            outcome,
            local_commits,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settle::pending;
    use rtdb_core::ClientError;
    use serde_json::json;

    fn snap(value: Value) -> Option<Snapshot> {
        Some(Snapshot::new(Some("counter".into()), value))
    }

    #[test]
    fn test_local_then_commit() {
        let (settler, outcome) = pending();
        let (mut callback, mut tx) = transaction(settler, outcome);

        callback(None, false, snap(json!(1)));
        assert!(tx.try_outcome().is_none());
        assert_eq!(tx.local_commits().try_next_local().unwrap().val(), &json!(1));

        callback(None, true, snap(json!(2)));
        let committed = tx.try_outcome().unwrap().unwrap();
        assert_eq!(committed.val(), &json!(2));
    }

    #[test]
    fn test_commit_without_snapshot_uses_last_local() {
        let (settler, outcome) = pending();
        let (mut callback, mut tx) = transaction(settler, outcome);

        callback(None, false, snap(json!(1)));
        callback(None, false, snap(json!(2)));
        callback(None, true, None);

        let committed = tx.try_outcome().unwrap().unwrap();
        assert_eq!(committed.key(), Some("counter"));
        assert_eq!(committed.val(), &json!(2));
    }

    #[test]
    fn test_commit_without_any_snapshot_is_empty() {
        let (settler, outcome) = pending();
        let (mut callback, mut tx) = transaction(settler, outcome);

        callback(None, true, None);
        let committed = tx.try_outcome().unwrap().unwrap();
        assert!(committed.key().is_none());
        assert!(!committed.exists());
    }

    #[test]
    fn test_error_settles_and_later_calls_are_ignored() {
        let (settler, outcome) = pending();
        let (mut callback, tx) = transaction(settler, outcome);
        let (mut outcome, mut local) = tx.into_parts();

        callback(Some(ClientError::overridden("set")), false, None);
        callback(None, false, snap(json!(5)));
        callback(None, true, snap(json!(6)));

        assert_eq!(
            outcome.try_outcome(),
            Some(Err(PromiseError::Client(ClientError::overridden("set"))))
        );
        assert!(local.try_next_local().is_none());
    }
}
