//! Authentication endpoints
//!
//! - `POST /auth/login/` exchanges username and password for a token pair
//! - `POST /auth/refresh/` exchanges the refresh token for a new access token,
//!   optionally rotating the refresh token
//!
//! Refresh goes straight to the transport: it is a public endpoint and must
//! not re-enter the 401 handling it serves.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::api::client::ApiClient;
use crate::api::transport::{ApiRequest, ApiResponse, Transport};
use crate::core::session::CredentialPair;
use crate::core::token_manager::{RefreshApi, RefreshedTokens};
use crate::error::{LookbookError, RefreshError, Result};

const LOGIN_PATH: &str = "/auth/login/";
const REFRESH_PATH: &str = "/auth/refresh/";

/// Longest server message copied into an error
const MAX_ERROR_DETAIL: usize = 200;

/// Login request body
#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

/// Token pair returned by login
#[derive(Debug, Deserialize)]
struct LoginResponse {
    access: String,
    refresh: String,
}

/// Refresh request body
#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

/// Refresh response; `refresh` is only present when rotated
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access: String,
    #[serde(default)]
    refresh: Option<String>,
}

/// Error body returned by the auth endpoints
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

/// Best human-readable explanation of a failed auth response
fn error_detail(response: &ApiResponse) -> String {
    if let Ok(error) = serde_json::from_str::<ErrorResponse>(&response.body) {
        if let Some(detail) = error.detail.or(error.code) {
            return detail;
        }
    }

    let body = response.body.trim();
    if body.is_empty() {
        response
            .status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string()
    } else {
        body.chars().take(MAX_ERROR_DETAIL).collect()
    }
}

/// Token refresh over the raw transport
pub struct AuthApi {
    transport: Arc<dyn Transport>,
}

impl AuthApi {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl RefreshApi for AuthApi {
    async fn refresh(&self, refresh_token: &SecretString) -> std::result::Result<RefreshedTokens, RefreshError> {
        let request = ApiRequest::post(REFRESH_PATH)
            .json(&RefreshRequest {
                refresh: refresh_token.expose_secret(),
            })
            .map_err(|e| RefreshError::Protocol(e.to_string()))?;

        let response = self
            .transport
            .execute(&request)
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        if !response.is_success() {
            return Err(RefreshError::Rejected {
                status: response.status.as_u16(),
                message: error_detail(&response),
            });
        }

        let parsed: RefreshResponse = serde_json::from_str(&response.body)
            .map_err(|e| RefreshError::Protocol(e.to_string()))?;

        if parsed.access.is_empty() {
            return Err(RefreshError::Protocol("empty access token".to_string()));
        }

        Ok(RefreshedTokens {
            access_token: SecretString::from(parsed.access),
            refresh_token: parsed
                .refresh
                .filter(|r| !r.is_empty())
                .map(SecretString::from),
        })
    }
}

/// Handler for login and logout, borrowed from an [`ApiClient`]
pub struct AuthHandler<'a> {
    client: &'a ApiClient,
}

impl<'a> AuthHandler<'a> {
    pub fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    /// Log in and install the returned token pair
    ///
    /// Publishes `session-changed` on success.
    pub async fn login(&self, username: &str, password: &SecretString) -> Result<()> {
        let request = ApiRequest::post(LOGIN_PATH).json(&LoginRequest {
            username,
            password: password.expose_secret(),
        })?;

        let response = self.client.send(request).await?;
        if !response.is_success() {
            return Err(LookbookError::LoginFailed(error_detail(&response)));
        }

        let tokens: LoginResponse = serde_json::from_str(&response.body)?;
        self.client
            .session()
            .set_tokens(CredentialPair::new(tokens.access, tokens.refresh))?;

        tracing::info!(username, "logged in");
        Ok(())
    }

    /// Forget the stored credentials
    pub fn logout(&self) -> Result<()> {
        if !self.client.session().is_authenticated() {
            return Err(LookbookError::NotAuthenticated);
        }
        self.client.session().logout()?;
        tracing::info!("logged out");
        Ok(())
    }
}
