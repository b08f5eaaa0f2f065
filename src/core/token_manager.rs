//! Token lifecycle management with single-flight refresh
//!
//! Handles:
//! - Deduplicating concurrent refresh requests into one network call
//! - Circuit breaker and throttle checks before each attempt
//! - Writing refreshed tokens back to the session and token store
//! - Publishing `session-refreshed` / `session-expired`
//!
//! ## Single flight
//!
//! The pending slot is `None` while idle. The first caller checks the
//! breaker, records the attempt, opens the slot with itself as the first
//! waiter and spawns the refresh task. Callers arriving while the slot is
//! open only add a waiter. The task applies its result to the session, then
//! takes the slot and answers every waiter with the same outcome.
//!
//! A result is only applied while the session still holds the refresh token
//! that was sent; otherwise every waiter gets `Superseded`.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::FutureExt;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::core::circuit_breaker::{is_circuit_open, retry_after};
use crate::core::events::SessionEvent;
use crate::core::session::{CredentialPair, SessionContext, SessionState};
use crate::error::RefreshError;

/// Tokens returned by a successful refresh call
#[derive(Debug, Clone)]
pub struct RefreshedTokens {
    pub access_token: SecretString,
    /// Present only when the server rotated the refresh token
    pub refresh_token: Option<SecretString>,
}

/// Remote call that exchanges a refresh token for a new access token
#[async_trait]
pub trait RefreshApi: Send + Sync {
    async fn refresh(&self, refresh_token: &SecretString) -> Result<RefreshedTokens, RefreshError>;
}

type RefreshOutcome = Result<SecretString, RefreshError>;
type Waiter = oneshot::Sender<RefreshOutcome>;

enum Begin {
    /// A refresh was already running; we were queued behind it
    Joined,
    /// We opened the slot and must start the task
    Started(SecretString),
    /// Rejected before any network call
    Rejected(RefreshError),
}

/// Coordinates token refresh for one [`SessionContext`]
///
/// Cheap to clone; clones share the same in-flight slot.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

struct Inner {
    session: Arc<SessionContext>,
    api: Arc<dyn RefreshApi>,
    pending: Mutex<Option<Vec<Waiter>>>,
}

impl TokenManager {
    pub fn new(session: Arc<SessionContext>, api: Arc<dyn RefreshApi>) -> Self {
        Self {
            inner: Arc::new(Inner {
                session,
                api,
                pending: Mutex::new(None),
            }),
        }
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.inner.session
    }

    /// Whether a refresh network call is currently in flight
    pub fn is_refreshing(&self) -> bool {
        self.inner.pending().is_some()
    }

    /// Obtain a new access token
    ///
    /// Joins the in-flight refresh if there is one. Otherwise starts one,
    /// unless the circuit is open, the previous attempt was too recent, or
    /// there is no refresh token.
    ///
    /// ## Errors
    ///
    /// - `CircuitOpen` - too many consecutive failures; session cleared
    /// - `Throttled` - previous attempt too recent; session untouched
    /// - `MissingRefreshToken` - nothing to refresh with; session cleared
    /// - `Rejected` / `Transport` / `Protocol` - the refresh call failed
    pub async fn refresh_access_token(&self) -> Result<SecretString, RefreshError> {
        let (tx, rx) = oneshot::channel();

        match self.inner.begin(tx) {
            Begin::Joined => {
                tracing::debug!("joining in-flight token refresh");
            }
            Begin::Started(refresh_token) => {
                let inner = self.inner.clone();
                // Detached so the refresh completes even if this caller is dropped
                tokio::spawn(async move { inner.run(refresh_token).await });
            }
            Begin::Rejected(err) => return Err(err),
        }

        rx.await.unwrap_or(Err(RefreshError::Abandoned))
    }

    /// Count a network failure of a call re-issued after a refresh
    ///
    /// Shares the refresh failure counter, so reaching `max_failures` clears
    /// the session and publishes `session-expired` just like failed refreshes.
    pub fn record_failure(&self) {
        let exhausted = {
            let mut state = self.inner.session.lock();
            let exhausted = self.inner.count_failure(&mut state);
            tracing::warn!(
                failures = state.refresh_failures,
                exhausted,
                "retried call failed after token refresh"
            );
            exhausted
        };

        if exhausted {
            self.inner.session.events().publish(SessionEvent::Expired);
        }
    }
}

impl Inner {
    fn pending(&self) -> MutexGuard<'_, Option<Vec<Waiter>>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn begin(&self, waiter: Waiter) -> Begin {
        let rejection = {
            let mut pending = self.pending();
            if let Some(queue) = pending.as_mut() {
                queue.push(waiter);
                return Begin::Joined;
            }

            let now = Instant::now();
            let config = *self.session.breaker();
            let mut state = self.session.lock();

            if is_circuit_open(&mut state, now, &config) {
                state.clear_credentials();
                RefreshError::CircuitOpen
            } else if let Some(wait) = retry_after(&state, now, &config) {
                return Begin::Rejected(RefreshError::Throttled { retry_after: wait });
            } else if let Some(refresh_token) = state.refresh_token().cloned() {
                state.last_refresh_attempt = Some(now);
                *pending = Some(vec![waiter]);
                tracing::debug!("starting token refresh");
                return Begin::Started(refresh_token);
            } else {
                state.clear_credentials();
                RefreshError::MissingRefreshToken
            }
        };

        tracing::warn!(error = %rejection, "token refresh refused, session cleared");
        self.session.wipe_store();
        self.session.events().publish(SessionEvent::Expired);
        Begin::Rejected(rejection)
    }

    async fn run(&self, refresh_token: SecretString) {
        let result = AssertUnwindSafe(self.api.refresh(&refresh_token))
            .catch_unwind()
            .await
            .unwrap_or(Err(RefreshError::Abandoned));

        // Session and store are settled before the slot is released, so no
        // new attempt can start against half-applied state
        let (outcome, event) = self.settle(&refresh_token, result);

        let waiters = self.pending().take().unwrap_or_default();
        tracing::debug!(waiters = waiters.len(), "token refresh settled");

        if let Some(event) = event {
            self.session.events().publish(event);
        }

        for waiter in waiters {
            // A waiter that went away no longer needs the answer
            let _ = waiter.send(outcome.clone());
        }
    }

    /// Apply a refresh result to the session it was started from
    ///
    /// Runs under the session lock only. If the session no longer holds the
    /// refresh token that was sent (logout or a new login happened meanwhile),
    /// the result is discarded and the session is left alone.
    fn settle(
        &self,
        sent: &SecretString,
        result: Result<RefreshedTokens, RefreshError>,
    ) -> (RefreshOutcome, Option<SessionEvent>) {
        let mut state = self.session.lock();

        let same_session = state
            .refresh_token()
            .is_some_and(|current| current.expose_secret() == sent.expose_secret());
        if !same_session {
            tracing::info!(
                succeeded = result.is_ok(),
                "session changed during token refresh, result discarded"
            );
            return (Err(RefreshError::Superseded), None);
        }

        match result {
            Ok(tokens) => {
                // Keep the old refresh token when the server did not rotate it
                let pair = CredentialPair {
                    access_token: tokens.access_token,
                    refresh_token: Some(tokens.refresh_token.unwrap_or_else(|| sent.clone())),
                };
                state.tokens = Some(pair.clone());
                state.is_authenticated = true;
                state.refresh_failures = 0;
                self.session.persist(&pair);

                tracing::info!("token refresh succeeded");
                (Ok(pair.access_token), Some(SessionEvent::Refreshed))
            }
            Err(err) => {
                let exhausted = self.count_failure(&mut state);
                tracing::warn!(
                    error = %err,
                    failures = state.refresh_failures,
                    "token refresh failed"
                );
                (Err(err), exhausted.then_some(SessionEvent::Expired))
            }
        }
    }

    /// Add one failure; at the threshold the session and store are cleared
    fn count_failure(&self, state: &mut SessionState) -> bool {
        state.refresh_failures += 1;
        let exhausted = state.refresh_failures >= self.session.breaker().max_failures;
        if exhausted {
            state.clear_credentials();
            self.session.wipe_store();
        }
        exhausted
    }
}
