//! Disconnect-time writes

use serde_json::Map;

use rtdb_core::{OnDisconnectHandle, Priority, Value};

use crate::settle::{adapt_completion, completion, pending, Pending};

/// Future-returning wrapper around a client's disconnect queue.
///
/// Each future settles when the server has acknowledged queueing the write,
/// not when the write is eventually performed.
pub struct OnDisconnectP<D: OnDisconnectHandle> {
    handle: D,
}

impl<D: OnDisconnectHandle> OnDisconnectP<D> {
    /// Wrap `handle`
    pub fn new(handle: D) -> Self {
        Self { handle }
    }

    /// Queue a set
    pub fn set(&self, value: impl Into<Value>) -> rtdb_core::Result<Pending<()>> {
        let value = value.into();
        adapt_completion(|done| self.handle.set(value, done))
    }

    /// Queue a set with priority
    pub fn set_with_priority(
        &self,
        value: impl Into<Value>,
        priority: impl Into<Priority>,
    ) -> rtdb_core::Result<Pending<()>> {
        let (value, priority) = (value.into(), priority.into());
        adapt_completion(|done| self.handle.set_with_priority(value, priority, done))
    }

    /// Queue a multi-child update
    pub fn update(&self, values: Map<String, Value>) -> rtdb_core::Result<Pending<()>> {
        adapt_completion(|done| self.handle.update(values, done))
    }

    /// Queue a removal
    pub fn remove(&self) -> rtdb_core::Result<Pending<()>> {
        adapt_completion(|done| self.handle.remove(done))
    }

    /// Cancel queued writes at this location and below
    pub fn cancel(&self) -> Pending<()> {
        let (settler, pending) = pending();
        self.handle.cancel(completion(settler));
        pending
    }
}
