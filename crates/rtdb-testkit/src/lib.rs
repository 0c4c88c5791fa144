//! rtdb Testing Infrastructure
//!
//! An in-memory implementation of the `rtdb-core` capability traits, with
//! knobs for the situations adapter tests need to provoke: deferred
//! completions, injected write failures, revoked reads, rejected or expiring
//! tokens and hand-driven transactions.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! rtdb-testkit = { path = "../rtdb-testkit" }
//! ```
//!
//! ```rust,no_run
//! use rtdb_testkit::*;
//!
//! let db = MemoryDatabase::with_data(serde_json::json!({"version": "v3"}));
//! let root = db.reference();
//! ```

pub mod handles;
pub mod memory;
pub mod query;
pub mod transaction;
mod tree;

pub use handles::{MemoryOnDisconnect, MemoryQuery, MemoryRef};
pub use memory::{CompletionMode, MemoryDatabase, TransactionMode};
pub use query::{compare_priority, Bound, QueryParams};
pub use transaction::CapturedTransaction;

use std::sync::Once;

static TRACING: Once = Once::new();

/// Install a test subscriber honouring `RUST_LOG`, once per process
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}
