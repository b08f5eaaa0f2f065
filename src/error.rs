//! Custom error types for lookbook-rs
//!
//! User-friendly error messages for all failure scenarios.

use std::time::Duration;

use thiserror::Error;

/// Why a token refresh attempt did not produce a new access token
///
/// Cloneable because a single failed attempt is delivered verbatim to every
/// caller that was waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// Too many consecutive failures; the session was cleared
    #[error("Token refresh is disabled after repeated failures. Your session has been cleared.\n\n  → Run 'lookbook auth login' to sign in again.")]
    CircuitOpen,

    /// A refresh was attempted too soon after the previous one
    #[error("Token refresh attempted too soon. Try again in {}s.", retry_after.as_secs().max(1))]
    Throttled {
        /// Remaining time before another attempt is allowed
        retry_after: Duration,
    },

    /// No refresh token is available; the session was cleared
    #[error("No refresh token is available. Your session has been cleared.\n\n  → Run 'lookbook auth login' to sign in again.")]
    MissingRefreshToken,

    /// The server declined the refresh request
    #[error("The server rejected the token refresh ({status}): {message}")]
    Rejected {
        /// HTTP status returned by the refresh endpoint
        status: u16,
        /// Server-provided detail, if any
        message: String,
    },

    /// Network-level failure while talking to the refresh endpoint
    #[error("Network failure during token refresh: {0}\n\n  → Check your internet connection.")]
    Transport(String),

    /// The refresh endpoint answered with an unexpected body
    #[error("Unexpected token refresh response: {0}")]
    Protocol(String),

    /// The refresh task ended without reporting an outcome
    #[error("Token refresh was abandoned before completing.")]
    Abandoned,

    /// The session was logged out or replaced while the refresh was running;
    /// its result was discarded
    #[error("The session changed while the token was being refreshed.")]
    Superseded,
}

impl RefreshError {
    /// Whether this failure leaves the session as the refresh found it
    pub fn keeps_session(&self) -> bool {
        matches!(
            self,
            RefreshError::Throttled { .. } | RefreshError::Superseded
        )
    }
}

/// Main error type for the lookbook-rs application
#[derive(Error, Debug)]
pub enum LookbookError {
    /// User is not authenticated
    #[error("You are not logged in.\n\n  → Run 'lookbook auth login' to authenticate.")]
    NotAuthenticated,

    /// Token refresh failed
    #[error(transparent)]
    Refresh(#[from] RefreshError),

    /// Login request was rejected
    #[error("Login failed: {0}\n\n  → Check your username and password.")]
    LoginFailed(String),

    /// Non-success response from a business endpoint
    #[error("API request failed ({status}): {body}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Raw response body
        body: String,
    },

    /// Network request error
    #[error("Network request failed: {0}\n\n  → Check your internet connection and the configured API URL.")]
    Transport(String),

    /// Credential storage error
    #[error("Cannot access secure storage: {0}\n\n  → On macOS: Make sure Keychain Access is available.\n  → On Linux: Ensure a secret service (like gnome-keyring) is running.\n  → Or switch backends: 'lookbook config set token-store file'")]
    Credential(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("File operation failed: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Failed to parse response: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML serialization/deserialization error
    #[error("Configuration file is invalid: {0}")]
    Toml(String),

    /// Malformed URL
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Invalid input from user
    #[error("{0}")]
    InvalidInput(String),
}

impl From<keyring::Error> for LookbookError {
    fn from(err: keyring::Error) -> Self {
        LookbookError::Credential(err.to_string())
    }
}

impl From<reqwest::Error> for LookbookError {
    fn from(err: reqwest::Error) -> Self {
        LookbookError::Transport(err.to_string())
    }
}

impl From<toml::de::Error> for LookbookError {
    fn from(err: toml::de::Error) -> Self {
        LookbookError::Toml(err.to_string())
    }
}

impl From<toml::ser::Error> for LookbookError {
    fn from(err: toml::ser::Error) -> Self {
        LookbookError::Toml(err.to_string())
    }
}

/// Result type alias using LookbookError
pub type Result<T> = std::result::Result<T, LookbookError>;
