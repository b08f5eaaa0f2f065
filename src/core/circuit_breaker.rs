//! Refresh circuit breaker
//!
//! Two independent gates in front of every token refresh:
//! - **circuit open**: `max_failures` consecutive failures, the latest one
//!   within `reset_timeout`. Rejects until the timeout elapses.
//! - **throttle**: the previous attempt started less than
//!   `min_refresh_interval` ago, regardless of its outcome.
//!
//! Both are evaluated against a [`SessionState`] while the caller holds the
//! session lock.

use std::time::Duration;

use tokio::time::Instant;

use crate::core::config::CircuitBreakerConfig;
use crate::core::session::SessionState;

/// Whether refresh attempts must be rejected after sustained failure
///
/// Once the failure threshold is reached and `reset_timeout` has elapsed
/// since the last attempt, the failure counter is reset to zero and the
/// circuit reports closed.
pub fn is_circuit_open(state: &mut SessionState, now: Instant, config: &CircuitBreakerConfig) -> bool {
    if state.refresh_failures < config.max_failures {
        return false;
    }

    let within_window = state
        .last_refresh_attempt
        .map(|last| now.saturating_duration_since(last) <= config.reset_timeout())
        .unwrap_or(false);

    if within_window {
        return true;
    }

    tracing::debug!(
        failures = state.refresh_failures,
        "refresh circuit reset after cool-down"
    );
    state.refresh_failures = 0;
    false
}

/// Whether the previous attempt was too recent
pub fn should_throttle(state: &SessionState, now: Instant, config: &CircuitBreakerConfig) -> bool {
    retry_after(state, now, config).is_some()
}

/// Time left before the throttle lets another attempt through
pub fn retry_after(
    state: &SessionState,
    now: Instant,
    config: &CircuitBreakerConfig,
) -> Option<Duration> {
    let last = state.last_refresh_attempt?;
    let elapsed = now.saturating_duration_since(last);
    let interval = config.min_refresh_interval();
    (elapsed < interval).then(|| interval - elapsed)
}
