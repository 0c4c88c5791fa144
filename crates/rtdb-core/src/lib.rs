//! rtdb Core - Client Capability Model
//!
//! This crate describes the surface of a callback-based realtime database
//! client as plain Rust traits and value types. It contains no client
//! implementation: adapters (`rtdb-promise`) are written against these
//! traits, and concrete clients implement them.
//!
//! ## Modules
//! - [`client`]: `Observable`, `QueryHandle`, `RefHandle`, `OnDisconnectHandle`
//!   and the callback type aliases they accept
//! - [`value`]: `Snapshot` and `Priority`
//! - [`event`]: `EventType` and `ListenerId`
//! - [`auth`]: `AuthResult` and token `AuthClaims`
//! - [`path`]: slash-separated location paths
//! - [`errors`]: `ClientError`, the error value clients report

#![forbid(unsafe_code)]

/// Capability traits implemented by clients
pub mod client;

/// Client-reported errors
pub mod errors;

/// Listener event types
pub mod event;

/// Authentication results and claims
pub mod auth;

/// Location path helpers
pub mod path;

/// Snapshots and priorities
pub mod value;

pub use auth::{AuthClaims, AuthResult};
pub use client::{
    AuthCallback, CancelCallback, CompletionCallback, Observable, OnDisconnectHandle,
    OnceFailure, OnceSuccess, QueryHandle, RefHandle, SnapshotCallback, TransactionCallback,
    TransactionUpdate,
};
pub use errors::{ClientError, ErrorCode, Result};
pub use event::{EventType, ListenerId};
pub use value::{Priority, Snapshot};

/// JSON value type used for all stored data
pub use serde_json::Value;
