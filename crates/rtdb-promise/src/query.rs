//! Query wrappers
//!
//! [`QueryP`] wraps a filtered client query and remembers the reference it was
//! derived from. [`QueryPromise`] is the query-wrapper contract; both
//! [`QueryP`] and [`RefP`] implement it, so code written against queries also
//! accepts full references.

use std::fmt;

use rtdb_core::{
    CancelCallback, EventType, ListenerId, Observable, Priority, QueryHandle, RefHandle, Snapshot,
    SnapshotCallback,
};

use crate::errors::PromiseError;
use crate::reference::RefP;
use crate::settle::{pending, Pending};

/// Read and filter operations shared by every wrapper
pub trait QueryPromise {
    /// Reference type the query belongs to
    type Owner: RefHandle;

    /// Register a persistent listener (delegated unchanged)
    fn on(
        &self,
        event: EventType,
        callback: SnapshotCallback,
        cancel: Option<CancelCallback>,
    ) -> ListenerId;

    /// Remove listeners (delegated unchanged)
    fn off(&self, event: Option<EventType>, listener: Option<ListenerId>);

    /// Single read of `event`
    fn once(&self, event: EventType) -> Pending<Snapshot>;

    /// Narrow to at most `n` children
    fn limit(&self, n: usize) -> QueryP<Self::Owner>;

    /// Range start
    fn start_at(&self, priority: Option<Priority>, name: Option<&str>) -> QueryP<Self::Owner>;

    /// Range end
    fn end_at(&self, priority: Option<Priority>, name: Option<&str>) -> QueryP<Self::Owner>;

    /// The reference this query reads from
    fn reference(&self) -> RefP<Self::Owner>;
}

/// One-shot read against any observable handle.
///
/// Resolves with the delivered snapshot; rejects with
/// [`PromiseError::ReadCancelled`] if the client reports failure.
pub(crate) fn once_on<O: Observable>(target: &O, event: EventType) -> Pending<Snapshot> {
    let (settler, pending) = pending();
    let on_failure = settler.clone();
    target.once(
        event,
        Box::new(move |snapshot| {
            settler.resolve(snapshot);
        }),
        Box::new(move || {
            tracing::debug!(%event, "one-shot read cancelled");
            on_failure.reject(PromiseError::ReadCancelled);
        }),
    );
    pending
}

/// Future-returning wrapper around a client query
pub struct QueryP<R: RefHandle> {
    query: R::Query,
    owner: RefP<R>,
}

impl<R: RefHandle> Clone for QueryP<R> {
    fn clone(&self) -> Self {
        Self {
            query: self.query.clone(),
            owner: self.owner.clone(),
        }
    }
}

impl<R: RefHandle> QueryP<R> {
    /// Wrap `query`, derived from `owner`
    pub fn new(query: R::Query, owner: RefP<R>) -> Self {
        Self { query, owner }
    }

    /// The wrapped client query
    pub fn handle(&self) -> &R::Query {
        &self.query
    }

    fn derive(&self, query: R::Query) -> Self {
        Self::new(query, self.owner.clone())
    }

    /// Register a persistent listener
    pub fn on(
        &self,
        event: EventType,
        callback: SnapshotCallback,
        cancel: Option<CancelCallback>,
    ) -> ListenerId {
        self.query.on(event, callback, cancel)
    }

    /// Remove listeners
    pub fn off(&self, event: Option<EventType>, listener: Option<ListenerId>) {
        self.query.off(event, listener);
    }

    /// Single read of `event`
    pub fn once(&self, event: EventType) -> Pending<Snapshot> {
        once_on(&self.query, event)
    }

    /// Narrow to at most `n` children
    pub fn limit(&self, n: usize) -> QueryP<R> {
        self.derive(self.query.limit(n))
    }

    /// Range start
    pub fn start_at(&self, priority: Option<Priority>, name: Option<&str>) -> QueryP<R> {
        self.derive(self.query.start_at(priority, name))
    }

    /// Range end
    pub fn end_at(&self, priority: Option<Priority>, name: Option<&str>) -> QueryP<R> {
        self.derive(self.query.end_at(priority, name))
    }

    /// The reference this query was derived from
    pub fn reference(&self) -> RefP<R> {
        self.owner.clone()
    }
}

impl<R: RefHandle> QueryPromise for QueryP<R> {
    type Owner = R;

    fn on(
        &self,
        event: EventType,
        callback: SnapshotCallback,
        cancel: Option<CancelCallback>,
    ) -> ListenerId {
        QueryP::on(self, event, callback, cancel)
    }

    fn off(&self, event: Option<EventType>, listener: Option<ListenerId>) {
        QueryP::off(self, event, listener);
    }

    fn once(&self, event: EventType) -> Pending<Snapshot> {
        QueryP::once(self, event)
    }

    fn limit(&self, n: usize) -> QueryP<R> {
        QueryP::limit(self, n)
    }

    fn start_at(&self, priority: Option<Priority>, name: Option<&str>) -> QueryP<R> {
        QueryP::start_at(self, priority, name)
    }

    fn end_at(&self, priority: Option<Priority>, name: Option<&str>) -> QueryP<R> {
        QueryP::end_at(self, priority, name)
    }

    fn reference(&self) -> RefP<R> {
        QueryP::reference(self)
    }
}

impl<R: RefHandle> fmt::Debug for QueryP<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryP")
            .field("owner", &self.owner.to_string())
            .finish_non_exhaustive()
    }
}
