//! Hand-driven transactions
//!
//! In [`TransactionMode::Scripted`](crate::TransactionMode::Scripted) the
//! database does not run transactions itself. Each call is captured as a
//! [`CapturedTransaction`] so a test can replay any notification sequence a
//! real client might produce, including misbehaving ones.

use serde_json::Value;
use std::fmt;

use rtdb_core::{ClientError, Snapshot, TransactionCallback, TransactionUpdate};

/// A `transaction` call waiting for the test to drive it
pub struct CapturedTransaction {
    path: String,
    update: TransactionUpdate,
    callback: TransactionCallback,
    apply_locally: bool,
}

impl CapturedTransaction {
    pub(crate) fn new(
        path: String,
        update: TransactionUpdate,
        callback: TransactionCallback,
        apply_locally: bool,
    ) -> Self {
        Self {
            path,
            update,
            callback,
            apply_locally,
        }
    }

    /// Absolute path the transaction targets
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether the caller asked for local application
    pub fn apply_locally(&self) -> bool {
        self.apply_locally
    }

    /// Run the caller's update function
    pub fn run_update(&self, current: &Value) -> Option<Value> {
        (self.update)(current)
    }

    /// Raw callback invocation, in any order the test likes
    pub fn invoke(
        &mut self,
        err: Option<ClientError>,
        committed: bool,
        snapshot: Option<Snapshot>,
    ) {
        (self.callback)(err, committed, snapshot);
    }

    /// Report an optimistic local application
    pub fn notify_local(&mut self, snapshot: Snapshot) {
        self.invoke(None, false, Some(snapshot));
    }

    /// Report a successful commit
    pub fn commit(mut self, snapshot: Option<Snapshot>) {
        self.invoke(None, true, snapshot);
    }

    /// Report failure
    pub fn fail(mut self, err: ClientError) {
        self.invoke(Some(err), false, None);
    }
}

impl fmt::Debug for CapturedTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturedTransaction")
            .field("path", &self.path)
            .field("apply_locally", &self.apply_locally)
            .finish_non_exhaustive()
    }
}
