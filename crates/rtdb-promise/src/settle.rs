//! Callback-to-future adaptation
//!
//! [`pending`] creates a linked [`Settler`] / [`Pending`] pair. The settler is
//! moved into whatever callback the client will invoke; the pending future is
//! handed to the caller. The settler enforces single settlement: the first
//! `resolve`/`reject` wins and every later call is ignored, no matter how many
//! times the client invokes its callback or how many clones of the settler
//! exist.
//!
//! If every settler is dropped before settling, the future resolves with
//! [`PromiseError::CallbackDropped`] rather than staying pending forever.

use futures::channel::oneshot;
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use rtdb_core::{ClientError, CompletionCallback};

use crate::errors::PromiseError;

type Outcome<T> = Result<T, PromiseError>;

/// Settling half of a pending operation
pub struct Settler<T> {
    slot: Arc<Mutex<Option<oneshot::Sender<Outcome<T>>>>>,
}

impl<T> Clone for Settler<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Settler<T> {
    /// Settle with `outcome`. Returns `false` if already settled.
    pub fn settle(&self, outcome: Outcome<T>) -> bool {
        let sender = self.slot.lock().take();
        match sender {
            Some(tx) => {
                if tx.send(outcome).is_err() {
                    tracing::trace!("pending operation was dropped before it settled");
                }
                true
            }
            None => {
                tracing::debug!("ignoring repeated settlement of a finished operation");
                false
            }
        }
    }

    /// Resolve with `value`
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Reject with `error`
    pub fn reject(&self, error: impl Into<PromiseError>) -> bool {
        self.settle(Err(error.into()))
    }

    /// True once a settlement has been accepted
    pub fn is_settled(&self) -> bool {
        self.slot.lock().is_none()
    }
}

/// Future side of a pending operation; yields exactly one outcome
#[must_use = "a pending operation does nothing useful unless awaited"]
pub struct Pending<T> {
    rx: oneshot::Receiver<Outcome<T>>,
}

impl<T> Pending<T> {
    /// Non-blocking check: `Some(outcome)` once the operation has settled.
    ///
    /// After this returns `Some`, the outcome has been taken and the future
    /// must not be polled again.
    pub fn try_outcome(&mut self) -> Option<Outcome<T>> {
        match self.rx.try_recv() {
            Ok(Some(outcome)) => Some(outcome),
            Ok(None) => None,
            Err(oneshot::Canceled) => Some(Err(PromiseError::CallbackDropped)),
        }
    }
}

impl<T> Future for Pending<T> {
    type Output = Outcome<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(PromiseError::CallbackDropped)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Create a linked settler and pending future
pub fn pending<T>() -> (Settler<T>, Pending<T>) {
    let (tx, rx) = oneshot::channel();
    (
        Settler {
            slot: Arc::new(Mutex::new(Some(tx))),
        },
        Pending { rx },
    )
}

/// Node-style completion callback that settles `settler`.
///
/// `None` resolves, `Some(err)` rejects with the client's error.
pub fn completion(settler: Settler<()>) -> CompletionCallback {
    Box::new(move |error: Option<ClientError>| {
        match error {
            None => settler.resolve(()),
            Some(err) => settler.reject(err),
        };
    })
}

/// Adapt a call that takes a node-style completion callback.
///
/// `invoke` receives the completion callback and performs the client call.
/// A synchronous `Err` from the client is returned as-is; it is never turned
/// into a rejection.
pub fn adapt_completion<F>(invoke: F) -> rtdb_core::Result<Pending<()>>
where
    F: FnOnce(CompletionCallback) -> rtdb_core::Result<()>,
{
    let (settler, pending) = pending();
    invoke(completion(settler))?;
    Ok(pending)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_settlement_wins() {
        let (settler, mut pending) = pending::<u32>();
        assert!(pending.try_outcome().is_none());
        assert!(settler.resolve(1));
        assert!(!settler.reject(ClientError::other("late")));
        assert!(!settler.clone().resolve(2));
        assert_eq!(pending.try_outcome(), Some(Ok(1)));
    }

    #[test]
    fn test_dropped_settler_rejects() {
        let (settler, pending) = pending::<()>();
        drop(settler);
        let outcome = futures::executor::block_on(pending);
        assert_eq!(outcome, Err(PromiseError::CallbackDropped));
    }

    #[test]
    fn test_completion_maps_node_style_errors() {
        let (settler, pending) = pending();
        let callback = completion(settler);
        callback(Some(ClientError::permission_denied("nope")));
        let outcome = futures::executor::block_on(pending);
        assert_eq!(
            outcome,
            Err(PromiseError::Client(ClientError::permission_denied("nope")))
        );
    }

    #[test]
    fn test_sync_rejection_is_returned_not_settled() {
        let result = adapt_completion(|_callback| Err(ClientError::invalid_argument("bad")));
        assert!(matches!(result, Err(err) if err == ClientError::invalid_argument("bad")));
    }
}
