//! rtdb Promise - Future-based realtime database access
//!
//! Wraps any client implementing the `rtdb-core` capability traits so that
//! callback-taking operations return futures and navigation returns wrapped
//! handles.
//!
//! # Components
//!
//! - [`RefP`] / [`QueryP`]: reference and query wrappers. Writes return
//!   [`Pending`], which settles exactly once; `once` resolves with the first
//!   delivered snapshot; navigation returns new wrappers.
//! - [`Transaction`]: terminal future plus a [`LocalCommits`] stream of
//!   optimistic states.
//! - [`VersionGatedAuth`]: authenticates and then unauthenticates the client
//!   when the schema version pinned in the token no longer matches the live
//!   version.
//! - [`settle`]: the generic callback-to-future adapter the rest is built on.
//!
//! # Usage
//!
//! ```rust,ignore
//! use rtdb_promise::{RefP, VersionGatedAuth};
//!
//! let root = RefP::new(client_ref);
//! root.child("users/alice")?.set(json!({"name": "Alice"}))?.await?;
//!
//! let id = root.child("messages")?.push();
//! id.set("hello")?.await?;
//!
//! let gate = VersionGatedAuth::new(root.into_handle());
//! gate.authenticate(token, |_| ready(), |err| eprintln!("{err}"));
//! ```
//!
//! No thread or task is spawned: futures settle inside the client's own
//! callback invocations.

#![forbid(unsafe_code)]

pub mod errors;
pub mod on_disconnect;
pub mod query;
pub mod reference;
pub mod settle;
pub mod transaction;
pub mod version_auth;

pub use errors::{ConfigError, PromiseError, VersionAuthError};
pub use on_disconnect::OnDisconnectP;
pub use query::{QueryP, QueryPromise};
pub use reference::RefP;
pub use settle::{adapt_completion, pending, Pending, Settler};
pub use transaction::{LocalCommits, Transaction};
pub use version_auth::{
    AuthEvent, AuthEvents, AuthState, VersionAuthConfig, VersionGatedAuth, DEFAULT_VERSION_PATH,
};
