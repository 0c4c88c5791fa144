//! Version-gated authentication
//!
//! Tokens are issued for one schema version: they carry a `requireVersion`
//! claim and optionally a `versionPath` claim (default `/version`). After the
//! client authenticates, [`VersionGatedAuth`] watches the value at the version
//! path. As long as it equals the pinned version the session stays up and
//! `on_ready` fires (possibly repeatedly, once per re-confirming value). As
//! soon as it diverges, or the watch is revoked, the gate unauthenticates the
//! client and reports why through `on_cancelled`.
//!
//! Nothing else has to be blocked client-side: a single validation rule at
//! the store root keyed on the version rejects writes from stale clients.
//!
//! # State machine
//!
//! ```text
//! Unauthenticated ──authenticate──▶ Authenticating ──claims ok──▶ Watching
//!        ▲                               │                          │
//!        └───── auth failed / missing claim / mismatch / watch revoked / unauth
//! ```
//!
//! # Composition
//!
//! The gate composes around a handle instead of patching the client type.
//! It does not itself implement [`RefHandle`], so it cannot end up wrapped
//! twice; [`VersionGatedAuth::version_gated`] on an existing gate returns it
//! unchanged.

mod config;
mod watchdog;

pub use config::{
    VersionAuthConfig, DEFAULT_VERSION_PATH, REQUIRE_VERSION_CLAIM, VERSION_PATH_CLAIM,
};

use futures::channel::mpsc;
use futures::Stream;
use parking_lot::Mutex;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use rtdb_core::{AuthResult, RefHandle};

use crate::errors::{ConfigError, VersionAuthError};
use crate::reference::RefP;
use watchdog::{SessionState, Watchdog};

/// Observable state of a gate's session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// No session
    Unauthenticated,
    /// Auth call issued, waiting for the client
    Authenticating,
    /// Session established, version path being watched
    Watching {
        /// Version pinned by the token
        expected: String,
        /// Path being watched
        version_path: String,
    },
}

/// Notification delivered through [`AuthEvents`]
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    /// The live version matches the token
    Ready(AuthResult),
    /// The session ended or never started
    Cancelled(VersionAuthError),
}

/// Stream form of the gate's callbacks
pub struct AuthEvents {
    rx: mpsc::UnboundedReceiver<AuthEvent>,
}

impl AuthEvents {
    /// Next buffered event, without waiting
    pub fn try_next_event(&mut self) -> Option<AuthEvent> {
        self.rx.try_next().ok().flatten()
    }
}

impl Stream for AuthEvents {
    type Item = AuthEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx).poll_next(cx)
    }
}

/// Authentication wrapper enforcing a token-pinned schema version
pub struct VersionGatedAuth<R: RefHandle> {
    handle: R,
    config: Arc<VersionAuthConfig>,
    session: Arc<Mutex<SessionState<R>>>,
}

impl<R: RefHandle> Clone for VersionGatedAuth<R> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            config: Arc::clone(&self.config),
            session: Arc::clone(&self.session),
        }
    }
}

impl<R: RefHandle> VersionGatedAuth<R> {
    /// Gate `handle` with the default configuration
    pub fn new(handle: R) -> Self {
        Self {
            handle,
            config: Arc::new(VersionAuthConfig::default()),
            session: Arc::new(Mutex::new(SessionState::default())),
        }
    }

    /// Gate `handle` with a custom configuration
    pub fn with_config(handle: R, config: VersionAuthConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            handle,
            config: Arc::new(config),
            session: Arc::new(Mutex::new(SessionState::default())),
        })
    }

    /// Already gated; returns `self` without adding a layer
    pub fn version_gated(self) -> Self {
        self
    }

    /// The gated client reference
    pub fn handle(&self) -> &R {
        &self.handle
    }

    /// Active configuration
    pub fn config(&self) -> &VersionAuthConfig {
        &self.config
    }

    /// Current session state
    pub fn state(&self) -> AuthState {
        self.session.lock().state.clone()
    }

    /// True while a version watch is live
    pub fn is_watching(&self) -> bool {
        self.session.lock().watch.is_some()
    }

    /// Authenticate and start enforcing the token's pinned version.
    ///
    /// `on_ready` receives the auth result each time the live version
    /// confirms the token. `on_cancelled` receives the reason the session
    /// ended or could not start. A session already in progress is replaced:
    /// its watch is released and the client unauthenticated before the new
    /// token is presented.
    pub fn authenticate<F, C>(&self, token: &str, on_ready: F, on_cancelled: C)
    where
        F: Fn(&AuthResult) + Send + Sync + 'static,
        C: Fn(VersionAuthError) + Send + Sync + 'static,
    {
        let (generation, superseded, previous) = {
            let mut session = self.session.lock();
            session.generation += 1;
            let superseded = std::mem::replace(&mut session.state, AuthState::Authenticating);
            (session.generation, superseded, session.watch.take())
        };
        if let Some(watch) = previous {
            watch.release();
        }
        // The old session must not outlive its watch if the new token is
        // rejected.
        if superseded != AuthState::Unauthenticated {
            tracing::debug!(state = ?superseded, "replacing previous version-gated session");
            self.handle.unauth();
        }

        tracing::debug!(target_ref = %self.handle, "authenticating with version gate");
        Watchdog {
            handle: self.handle.clone(),
            config: Arc::clone(&self.config),
            session: Arc::clone(&self.session),
            generation,
            on_ready: Arc::new(on_ready),
            on_cancelled: Arc::new(on_cancelled),
        }
        .start(token);
    }

    /// Authenticate, delivering outcomes as a stream
    pub fn authenticate_events(&self, token: &str) -> AuthEvents {
        let (tx, rx) = mpsc::unbounded();
        let cancelled_tx = tx.clone();
        self.authenticate(
            token,
            move |result| {
                let _ = tx.unbounded_send(AuthEvent::Ready(result.clone()));
            },
            move |err| {
                let _ = cancelled_tx.unbounded_send(AuthEvent::Cancelled(err));
            },
        );
        AuthEvents { rx }
    }

    /// End the session at the caller's request.
    ///
    /// Releases the version watch and unauthenticates the client;
    /// `on_cancelled` is not invoked.
    pub fn unauth(&self) {
        let watch = {
            let mut session = self.session.lock();
            session.generation += 1;
            session.state = AuthState::Unauthenticated;
            session.watch.take()
        };
        if let Some(watch) = watch {
            watch.release();
        }
        self.handle.unauth();
    }
}

impl<R: RefHandle> From<RefP<R>> for VersionGatedAuth<R> {
    fn from(reference: RefP<R>) -> Self {
        Self::new(reference.into_handle())
    }
}

impl<R: RefHandle> RefP<R> {
    /// Version-gated auth for this wrapper's client
    pub fn version_gated(&self) -> VersionGatedAuth<R> {
        VersionGatedAuth::new(self.handle().clone())
    }
}

impl<R: RefHandle> fmt::Debug for VersionGatedAuth<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionGatedAuth")
            .field("handle", &self.handle.to_string())
            .field("state", &self.state())
            .finish()
    }
}
