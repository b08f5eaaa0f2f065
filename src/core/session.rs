//! Session state shared by the API client and the token manager
//!
//! A [`SessionContext`] is built once by the composition root (see
//! `cli::context`) and handed to every component as an `Arc`. It owns:
//! - the in-memory [`SessionState`]
//! - the [`TokenStore`] the tokens are mirrored into
//! - the [`SessionEvents`] channel
//! - the circuit breaker limits applied to refresh
//!
//! Only the token manager and explicit login/logout mutate the state.

use std::sync::{Arc, Mutex, MutexGuard};

use secrecy::{ExposeSecret, SecretString};
use tokio::time::Instant;

use crate::core::config::CircuitBreakerConfig;
use crate::core::credentials::{TokenStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use crate::core::events::{SessionEvent, SessionEvents};
use crate::error::Result;

/// Access token plus the refresh token used to renew it
#[derive(Debug, Clone)]
pub struct CredentialPair {
    /// Short-lived token attached to authenticated calls
    pub access_token: SecretString,
    /// Long-lived token, only sent to the refresh endpoint
    pub refresh_token: Option<SecretString>,
}

impl CredentialPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: SecretString::from(access_token.into()),
            refresh_token: Some(SecretString::from(refresh_token.into())),
        }
    }
}

/// In-memory session record
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub is_authenticated: bool,
    pub tokens: Option<CredentialPair>,
    /// When the last refresh was started, successful or not
    pub last_refresh_attempt: Option<Instant>,
    /// Consecutive refresh failures since the last success
    pub refresh_failures: u32,
}

impl SessionState {
    pub fn access_token(&self) -> Option<&SecretString> {
        self.tokens.as_ref().map(|t| &t.access_token)
    }

    pub fn refresh_token(&self) -> Option<&SecretString> {
        self.tokens.as_ref().and_then(|t| t.refresh_token.as_ref())
    }

    /// Drop the credentials but keep the refresh bookkeeping
    ///
    /// The failure counter and last attempt survive so an exhausted session
    /// keeps its circuit open until the reset timeout elapses.
    pub fn clear_credentials(&mut self) {
        self.is_authenticated = false;
        self.tokens = None;
    }
}

/// Process-wide session, injected wherever credentials are needed
pub struct SessionContext {
    store: Arc<dyn TokenStore>,
    state: Mutex<SessionState>,
    events: SessionEvents,
    breaker: CircuitBreakerConfig,
}

impl SessionContext {
    /// Start with an empty, unauthenticated session
    pub fn new(store: Arc<dyn TokenStore>, breaker: CircuitBreakerConfig) -> Self {
        Self {
            store,
            state: Mutex::new(SessionState::default()),
            events: SessionEvents::new(),
            breaker,
        }
    }

    /// Rebuild the session from whatever the token store holds
    ///
    /// An access token alone is enough to be authenticated; without a
    /// refresh token the first 401 ends the session.
    pub fn restore(store: Arc<dyn TokenStore>, breaker: CircuitBreakerConfig) -> Result<Self> {
        let access = store.get(ACCESS_TOKEN_KEY)?;
        let refresh = store.get(REFRESH_TOKEN_KEY)?;

        let context = Self::new(store, breaker);
        if let Some(access) = access.filter(|a| !a.is_empty()) {
            let mut state = context.lock();
            state.is_authenticated = true;
            state.tokens = Some(CredentialPair {
                access_token: SecretString::from(access),
                refresh_token: refresh.filter(|r| !r.is_empty()).map(SecretString::from),
            });
            tracing::debug!(
                has_refresh = state.refresh_token().is_some(),
                "restored session from token store"
            );
        }

        Ok(context)
    }

    pub fn events(&self) -> &SessionEvents {
        &self.events
    }

    pub fn breaker(&self) -> &CircuitBreakerConfig {
        &self.breaker
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> SessionState {
        self.lock().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock().is_authenticated
    }

    /// Current access token, if any
    pub fn access_token(&self) -> Option<SecretString> {
        self.lock().access_token().cloned()
    }

    /// Whether `token` is still the current access token
    pub fn is_current_token(&self, token: Option<&SecretString>) -> bool {
        let state = self.lock();
        match (state.access_token(), token) {
            (Some(current), Some(sent)) => current.expose_secret() == sent.expose_secret(),
            (None, None) => true,
            _ => false,
        }
    }

    /// Install a fresh credential pair after login
    ///
    /// Resets the refresh bookkeeping so a previously exhausted session does
    /// not keep the circuit open against the new credentials.
    pub fn set_tokens(&self, pair: CredentialPair) -> Result<()> {
        {
            // Store and state change together so an in-flight refresh sees either both or neither
            let mut state = self.lock();
            self.store
                .set(ACCESS_TOKEN_KEY, pair.access_token.expose_secret())?;
            match &pair.refresh_token {
                Some(refresh) => self.store.set(REFRESH_TOKEN_KEY, refresh.expose_secret())?,
                None => self.store.clear(&[REFRESH_TOKEN_KEY])?,
            }

            state.is_authenticated = true;
            state.tokens = Some(pair);
            state.refresh_failures = 0;
            state.last_refresh_attempt = None;
        }

        self.events.publish(SessionEvent::Changed);
        Ok(())
    }

    /// Explicit logout
    pub fn logout(&self) -> Result<()> {
        {
            let mut state = self.lock();
            state.clear_credentials();
            self.store.clear(&[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY])?;
        }
        self.events.publish(SessionEvent::Changed);
        Ok(())
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mirror refreshed tokens into the store; failures are logged only
    ///
    /// Callers hold the session lock so the write cannot land after a logout.
    pub(crate) fn persist(&self, pair: &CredentialPair) {
        if let Err(e) = self
            .store
            .set(ACCESS_TOKEN_KEY, pair.access_token.expose_secret())
        {
            tracing::warn!(error = %e, "failed to persist access token");
        }
        if let Some(refresh) = &pair.refresh_token {
            if let Err(e) = self.store.set(REFRESH_TOKEN_KEY, refresh.expose_secret()) {
                tracing::warn!(error = %e, "failed to persist refresh token");
            }
        }
    }

    /// Remove persisted tokens; failures are logged only
    pub(crate) fn wipe_store(&self) {
        if let Err(e) = self.store.clear(&[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY]) {
            tracing::warn!(error = %e, "failed to clear token store");
        }
    }
}
