//! Session internals of the version watchdog
//!
//! Every `authenticate` call bumps the session generation. Callbacks from the
//! client carry the generation they were registered under and are ignored once
//! it is stale, so a superseded or torn-down session can never act again.
//! The session lock is never held while calling into the client or into user
//! callbacks.

use parking_lot::Mutex;
use std::sync::Arc;

use rtdb_core::{AuthResult, ClientError, EventType, ListenerId, RefHandle, Snapshot};

use super::config::VersionAuthConfig;
use super::AuthState;
use crate::errors::VersionAuthError;

pub(crate) type ReadyFn = Arc<dyn Fn(&AuthResult) + Send + Sync>;
pub(crate) type CancelledFn = Arc<dyn Fn(VersionAuthError) + Send + Sync>;

/// Live listener on the version path
pub(crate) struct VersionWatch<R> {
    reference: R,
    listener: ListenerId,
}

impl<R: RefHandle> VersionWatch<R> {
    pub(crate) fn release(self) {
        tracing::debug!(
            path = %self.reference,
            listener = %self.listener,
            "releasing version watch"
        );
        self.reference
            .off(Some(EventType::Value), Some(self.listener));
    }
}

/// Shared session record, one per gate
pub(crate) struct SessionState<R> {
    pub(crate) generation: u64,
    pub(crate) state: AuthState,
    pub(crate) watch: Option<VersionWatch<R>>,
}

impl<R> Default for SessionState<R> {
    fn default() -> Self {
        Self {
            generation: 0,
            state: AuthState::Unauthenticated,
            watch: None,
        }
    }
}

/// One authentication attempt and the session it may establish
pub(crate) struct Watchdog<R: RefHandle> {
    pub(crate) handle: R,
    pub(crate) config: Arc<VersionAuthConfig>,
    pub(crate) session: Arc<Mutex<SessionState<R>>>,
    pub(crate) generation: u64,
    pub(crate) on_ready: ReadyFn,
    pub(crate) on_cancelled: CancelledFn,
}

impl<R: RefHandle> Clone for Watchdog<R> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            config: Arc::clone(&self.config),
            session: Arc::clone(&self.session),
            generation: self.generation,
            on_ready: Arc::clone(&self.on_ready),
            on_cancelled: Arc::clone(&self.on_cancelled),
        }
    }
}

impl<R: RefHandle> Watchdog<R> {
    fn is_current(&self, session: &SessionState<R>) -> bool {
        session.generation == self.generation
    }

    /// Issue the underlying auth call
    pub(crate) fn start(self, token: &str) {
        let on_complete = self.clone();
        let on_cancel = self.clone();
        self.handle.auth(
            token,
            Box::new(move |outcome| on_complete.on_auth_complete(outcome)),
            Some(Box::new(move |err| on_cancel.on_auth_cancelled(err))),
        );
    }

    fn on_auth_complete(&self, outcome: Result<AuthResult, ClientError>) {
        let result = match outcome {
            Ok(result) => result,
            Err(err) => {
                {
                    let mut session = self.session.lock();
                    if !self.is_current(&session) {
                        return;
                    }
                    session.state = AuthState::Unauthenticated;
                }
                tracing::warn!(error = %err, "authentication failed");
                (self.on_cancelled)(VersionAuthError::AuthFailed(err));
                return;
            }
        };

        let claim = &self.config.require_version_claim;
        let Some(expected) = result.auth.get_str(claim).map(str::to_string) else {
            tracing::warn!(%claim, "token does not pin a schema version");
            self.force_unauth(VersionAuthError::MissingRequiredVersion {
                claim: claim.clone(),
            });
            return;
        };
        let version_path = result
            .auth
            .get_str(&self.config.version_path_claim)
            .unwrap_or(&self.config.default_version_path)
            .to_string();

        let resolved = self.handle.root().child(&version_path);
        let version_ref = match resolved {
            Ok(reference) => reference,
            Err(source) => {
                self.force_unauth(VersionAuthError::InvalidVersionPath {
                    path: version_path,
                    source,
                });
                return;
            }
        };

        {
            let mut session = self.session.lock();
            if !self.is_current(&session) || session.state != AuthState::Authenticating {
                return;
            }
            session.state = AuthState::Watching {
                expected: expected.clone(),
                version_path: version_path.clone(),
            };
        }
        tracing::info!(path = %version_path, %expected, "authenticated, watching schema version");

        let result = Arc::new(result);
        let on_value = self.clone();
        let on_watch_cancel = self.clone();
        let listener = version_ref.on(
            EventType::Value,
            Arc::new(move |snapshot: &Snapshot| on_value.on_version(snapshot, &expected, &result)),
            Some(Box::new(move |err| on_watch_cancel.on_watch_cancelled(err))),
        );

        // The client may have delivered (and we may have acted on) a value
        // before `on` returned.
        let watch = VersionWatch {
            reference: version_ref,
            listener,
        };
        let stale = {
            let mut session = self.session.lock();
            if self.is_current(&session) && matches!(session.state, AuthState::Watching { .. }) {
                session.watch = Some(watch);
                None
            } else {
                Some(watch)
            }
        };
        if let Some(watch) = stale {
            watch.release();
        }
    }

    fn on_version(&self, snapshot: &Snapshot, expected: &str, result: &AuthResult) {
        {
            let session = self.session.lock();
            if !self.is_current(&session) || !matches!(session.state, AuthState::Watching { .. }) {
                tracing::trace!("ignoring version notification for an ended session");
                return;
            }
        }

        let observed = snapshot.val();
        tracing::debug!(live_version = %observed, "live version");
        if observed.as_str() == Some(expected) {
            (self.on_ready)(result);
        } else {
            tracing::warn!(%expected, live_version = %observed, "wrong version, unauthenticating");
            self.force_unauth(VersionAuthError::VersionMismatch {
                expected: expected.to_string(),
                observed: observed.clone(),
            });
        }
    }

    fn on_watch_cancelled(&self, err: ClientError) {
        tracing::warn!(error = %err, "version watch revoked");
        self.force_unauth(VersionAuthError::WatchFailed(err));
    }

    fn on_auth_cancelled(&self, err: ClientError) {
        let watch = {
            let mut session = self.session.lock();
            if !self.is_current(&session) || session.state == AuthState::Unauthenticated {
                return;
            }
            session.state = AuthState::Unauthenticated;
            session.watch.take()
        };
        if let Some(watch) = watch {
            watch.release();
        }
        tracing::warn!(error = %err, "auth was cancelled");
        (self.on_cancelled)(VersionAuthError::AuthCancelled(err));
    }

    /// End the session: release the watch, unauthenticate, report `err`.
    ///
    /// Acts at most once per session.
    fn force_unauth(&self, err: VersionAuthError) {
        let watch = {
            let mut session = self.session.lock();
            if !self.is_current(&session) || session.state == AuthState::Unauthenticated {
                return;
            }
            session.state = AuthState::Unauthenticated;
            session.watch.take()
        };
        if let Some(watch) = watch {
            watch.release();
        }
        tracing::info!(reason = %err, "forcing unauthentication");
        self.handle.unauth();
        (self.on_cancelled)(err);
    }
}
