//! Lookbook API client with credential interceptors
//!
//! Every call goes through [`ApiClient::send`]:
//!
//! ```text
//! request interceptor ──> transport ──> response interceptor ──> caller
//!  (attach bearer?)                      (401: queue / refresh / retry)
//! ```
//!
//! On a 401 from a credentialed call that has not been retried yet:
//! - if another call already refreshed the token, retry with the current one
//! - if a refresh is in flight, wait for it and retry (queue)
//! - otherwise start the refresh and retry (lead); when it fails, send the
//!   user back to the login view
//!
//! Business errors (any other status) are returned untouched.

use std::sync::Arc;

use secrecy::SecretString;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::api::auth::AuthHandler;
use crate::api::endpoints::{Access, EndpointPolicy};
use crate::api::transport::{ApiRequest, ApiResponse, Transport};
use crate::core::session::SessionContext;
use crate::core::token_manager::TokenManager;
use crate::error::{LookbookError, RefreshError, Result};

/// Where the user goes when the session cannot be recovered
#[cfg_attr(test, mockall::automock)]
pub trait LoginNavigator: Send + Sync {
    /// Whether the login view is already showing
    fn is_on_login_view(&self) -> bool;

    /// Show the login view
    fn navigate_to_login(&self);
}

/// Navigator that does nothing, for headless use
pub struct NoopNavigator;

impl LoginNavigator for NoopNavigator {
    fn is_on_login_view(&self) -> bool {
        false
    }

    fn navigate_to_login(&self) {}
}

/// Lookbook API client
///
/// Cheap to clone; clones share the session and the in-flight refresh.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    tokens: TokenManager,
    policy: Arc<EndpointPolicy>,
    navigator: Arc<dyn LoginNavigator>,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>, tokens: TokenManager) -> Self {
        Self {
            transport,
            tokens,
            policy: Arc::new(EndpointPolicy::default()),
            navigator: Arc::new(NoopNavigator),
        }
    }

    /// Replace the endpoint classification tables
    pub fn with_policy(mut self, policy: EndpointPolicy) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    /// Install the login redirect used when refresh fails
    pub fn with_navigator(mut self, navigator: Arc<dyn LoginNavigator>) -> Self {
        self.navigator = navigator;
        self
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        self.tokens.session()
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    pub fn policy(&self) -> &EndpointPolicy {
        &self.policy
    }

    /// Get auth handler (login/logout)
    pub fn auth(&self) -> AuthHandler<'_> {
        AuthHandler::new(self)
    }

    /// GET a path and decode the JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(ApiRequest::get(path)).await?.json()
    }

    /// POST a JSON body and decode the JSON response
    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.send(ApiRequest::post(path).json(body)?).await?.json()
    }

    /// Send a request through both interceptors
    ///
    /// ## Errors
    ///
    /// - `Transport` - the network call itself failed; on a retried call this
    ///   also counts as a refresh failure
    /// - `Refresh` - a 401 needed a token refresh and the refresh failed
    pub async fn send(&self, mut request: ApiRequest) -> Result<ApiResponse> {
        let access = self.authorize(&mut request);
        let response = self.transport.execute(&request).await?;

        if !response.is_unauthorized() {
            return Ok(response);
        }

        if access == Access::Public || request.retried {
            tracing::debug!(path = %request.path, "401 not eligible for refresh");
            return Ok(response);
        }

        // Someone else refreshed while this call was on the wire
        if let Some(current) = self.newer_token(&request) {
            tracing::debug!(path = %request.path, "retrying with newer access token");
            return self.retry(request, current).await;
        }

        let leading = !self.tokens.is_refreshing();
        if leading {
            request.retried = true;
        } else {
            tracing::debug!(path = %request.path, "refresh in flight, queueing request");
        }

        let token = match self.tokens.refresh_access_token().await {
            Ok(token) => token,
            Err(err) => {
                // A refresh may have settled between the checks above and this attempt
                if matches!(err, RefreshError::Throttled { .. } | RefreshError::Superseded) {
                    if let Some(current) = self.newer_token(&request) {
                        tracing::debug!(path = %request.path, error = %err, "retrying with newer access token");
                        return self.retry(request, current).await;
                    }
                }
                if leading && !err.keeps_session() && !self.navigator.is_on_login_view() {
                    self.navigator.navigate_to_login();
                }
                return Err(err.into());
            }
        };

        self.retry(request, token).await
    }

    /// Current access token, if it differs from the one `request` was sent with
    fn newer_token(&self, request: &ApiRequest) -> Option<SecretString> {
        if self.session().is_current_token(request.bearer.as_ref()) {
            return None;
        }
        self.session().access_token()
    }

    /// Request interceptor: decide on and attach the bearer token
    fn authorize(&self, request: &mut ApiRequest) -> Access {
        let access = self.policy.classify(&request.path);
        request.bearer = match access {
            Access::Public => None,
            Access::Authenticated => self.session().access_token(),
        };
        tracing::debug!(
            path = %request.path,
            ?access,
            has_token = request.bearer.is_some(),
            "classified request"
        );
        access
    }

    /// Re-issue a call with a new token; network failures count against the refresh breaker
    async fn retry(&self, mut request: ApiRequest, token: SecretString) -> Result<ApiResponse> {
        request.retried = true;
        request.bearer = Some(token);

        let result = self.transport.execute(&request).await;
        if let Err(LookbookError::Transport(e)) = &result {
            tracing::warn!(path = %request.path, error = %e, "retried request failed");
            self.tokens.record_failure();
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use reqwest::StatusCode;
    use secrecy::ExposeSecret;

    use crate::api::auth::AuthApi;
    use crate::core::config::CircuitBreakerConfig;
    use crate::core::credentials::{
        MemoryTokenStore, TokenStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY,
    };
    use crate::core::session::CredentialPair;

    /// Fake server: protected paths need the current token, refresh issues the next one
    struct FakeServer {
        valid_token: Mutex<String>,
        next_token: Mutex<Option<String>>,
        refresh_calls: AtomicUsize,
        honor_refresh: AtomicBool,
        seen: Mutex<Vec<(String, Option<String>)>>,
    }

    impl FakeServer {
        fn new(valid: &str, next: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                valid_token: Mutex::new(valid.to_string()),
                next_token: Mutex::new(next.map(str::to_string)),
                refresh_calls: AtomicUsize::new(0),
                honor_refresh: AtomicBool::new(true),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn refresh_calls(&self) -> usize {
            self.refresh_calls.load(Ordering::SeqCst)
        }

        fn seen(&self) -> Vec<(String, Option<String>)> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for FakeServer {
        async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
            let bearer = request.bearer().map(|t| t.expose_secret().to_string());
            self.seen
                .lock()
                .unwrap()
                .push((request.path.clone(), bearer.clone()));

            if request.path == "/auth/refresh/" {
                self.refresh_calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                let next = self.next_token.lock().unwrap().clone();
                return Ok(match next {
                    Some(token) => {
                        if self.honor_refresh.load(Ordering::SeqCst) {
                            *self.valid_token.lock().unwrap() = token.clone();
                        }
                        ApiResponse::new(StatusCode::OK, format!(r#"{{"access": "{}"}}"#, token))
                    }
                    None => ApiResponse::new(
                        StatusCode::UNAUTHORIZED,
                        r#"{"detail": "Token is invalid or expired", "code": "token_not_valid"}"#,
                    ),
                });
            }

            if request.path.starts_with("/auth/login/") {
                return Ok(ApiResponse::new(
                    StatusCode::UNAUTHORIZED,
                    r#"{"detail": "No active account found"}"#,
                ));
            }

            let valid = self.valid_token.lock().unwrap().clone();
            if bearer.as_deref() == Some(valid.as_str()) {
                Ok(ApiResponse::new(StatusCode::OK, r#"{"ok": true}"#))
            } else {
                Ok(ApiResponse::new(StatusCode::UNAUTHORIZED, r#"{"detail": "expired"}"#))
            }
        }
    }

    fn client_for(server: Arc<FakeServer>, stored: &[(&str, &str)]) -> ApiClient {
        let store = Arc::new(MemoryTokenStore::new());
        for (key, value) in stored {
            store.set(key, value).unwrap();
        }
        let session = Arc::new(
            SessionContext::restore(store, CircuitBreakerConfig::default()).unwrap(),
        );
        let tokens = TokenManager::new(session, Arc::new(AuthApi::new(server.clone())));
        ApiClient::new(server, tokens)
    }

    const LOGGED_IN: &[(&str, &str)] = &[(ACCESS_TOKEN_KEY, "a1"), (REFRESH_TOKEN_KEY, "r1")];

    #[tokio::test(start_paused = true)]
    async fn test_protected_call_attaches_token() {
        let server = FakeServer::new("a1", None);
        let client = client_for(server.clone(), LOGGED_IN);

        let response = client.send(ApiRequest::get("/outfits/")).await.unwrap();

        assert!(response.is_success());
        assert_eq!(server.seen(), vec![("/outfits/".into(), Some("a1".into()))]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_public_call_never_carries_token() {
        let server = FakeServer::new("a1", Some("a2"));
        let client = client_for(server.clone(), LOGGED_IN);

        let response = client.send(ApiRequest::post("/auth/login/")).await.unwrap();

        // A failed login is returned as-is, no refresh attempted
        assert!(response.is_unauthorized());
        assert_eq!(server.refresh_calls(), 0);
        assert_eq!(server.seen(), vec![("/auth/login/".into(), None)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_complete_carries_token() {
        let server = FakeServer::new("a1", None);
        let client = client_for(server.clone(), LOGGED_IN);

        client
            .send(ApiRequest::post("/auth/register/complete/"))
            .await
            .unwrap();

        assert_eq!(
            server.seen()[0],
            ("/auth/register/complete/".into(), Some("a1".into()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_token_is_refreshed_and_retried() {
        let server = FakeServer::new("a2", Some("a2"));
        let client = client_for(server.clone(), LOGGED_IN);

        let response = client.send(ApiRequest::get("/wardrobe/")).await.unwrap();

        assert!(response.is_success());
        assert_eq!(server.refresh_calls(), 1);
        let state = client.session().snapshot();
        assert_eq!(state.access_token().unwrap().expose_secret(), "a2");
        assert_eq!(state.refresh_token().unwrap().expose_secret(), "r1");
        assert_eq!(state.refresh_failures, 0);
        assert_eq!(
            server.seen().last().unwrap(),
            &("/wardrobe/".to_string(), Some("a2".to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_401s_share_one_refresh() {
        let server = FakeServer::new("a2", Some("a2"));
        let client = client_for(server.clone(), LOGGED_IN);

        let calls = (0..6).map(|i| {
            let client = client.clone();
            async move { client.send(ApiRequest::get(format!("/posts/{}/", i))).await }
        });
        let responses = futures::future::join_all(calls).await;

        assert_eq!(server.refresh_calls(), 1);
        for response in responses {
            assert!(response.unwrap().is_success());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retried_call_is_not_refreshed_twice() {
        // Refresh succeeds but the server still refuses the new token
        let server = FakeServer::new("never", Some("a2"));
        server.honor_refresh.store(false, Ordering::SeqCst);
        let client = client_for(server.clone(), LOGGED_IN);

        let response = client.send(ApiRequest::get("/lookbooks/")).await.unwrap();

        assert!(response.is_unauthorized());
        assert_eq!(server.refresh_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_redirects_to_login() {
        let server = FakeServer::new("a9", None);
        let mut navigator = MockLoginNavigator::new();
        navigator.expect_is_on_login_view().return_const(false);
        navigator.expect_navigate_to_login().times(1).return_const(());
        let client = client_for(server.clone(), LOGGED_IN).with_navigator(Arc::new(navigator));

        let err = client.send(ApiRequest::get("/outfits/")).await.unwrap_err();

        assert!(matches!(
            err,
            LookbookError::Refresh(RefreshError::Rejected { status: 401, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_redirect_when_already_on_login_view() {
        let server = FakeServer::new("a9", None);
        let mut navigator = MockLoginNavigator::new();
        navigator.expect_is_on_login_view().return_const(true);
        navigator.expect_navigate_to_login().never();
        let client = client_for(server, LOGGED_IN).with_navigator(Arc::new(navigator));

        assert!(client.send(ApiRequest::get("/outfits/")).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_refresh_does_not_redirect() {
        let server = FakeServer::new("a2", Some("a2"));
        let mut navigator = MockLoginNavigator::new();
        navigator.expect_is_on_login_view().return_const(false);
        navigator.expect_navigate_to_login().never();
        let client = client_for(server.clone(), LOGGED_IN).with_navigator(Arc::new(navigator));

        client.tokens().refresh_access_token().await.unwrap();
        // Server revokes the fresh token immediately
        *server.valid_token.lock().unwrap() = "a3".into();

        let err = client.send(ApiRequest::get("/outfits/")).await.unwrap_err();
        assert!(matches!(
            err,
            LookbookError::Refresh(RefreshError::Throttled { .. })
        ));
        assert!(client.session().is_authenticated());
    }

    /// 401 on the first protected call, a good refresh, then the connection drops
    struct DropsAfterRefresh {
        protected_calls: AtomicUsize,
    }

    #[async_trait]
    impl Transport for DropsAfterRefresh {
        async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
            if request.path == "/auth/refresh/" {
                return Ok(ApiResponse::new(StatusCode::OK, r#"{"access": "a2"}"#));
            }
            match self.protected_calls.fetch_add(1, Ordering::SeqCst) {
                0 => Ok(ApiResponse::new(StatusCode::UNAUTHORIZED, "{}")),
                _ => Err(LookbookError::Transport("connection reset".into())),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_failure_on_retry_counts_as_refresh_failure() {
        let transport = Arc::new(DropsAfterRefresh {
            protected_calls: AtomicUsize::new(0),
        });
        let store = Arc::new(MemoryTokenStore::new());
        store.set(ACCESS_TOKEN_KEY, "a1").unwrap();
        store.set(REFRESH_TOKEN_KEY, "r1").unwrap();
        let session = Arc::new(
            SessionContext::restore(store, CircuitBreakerConfig::default()).unwrap(),
        );
        let tokens = TokenManager::new(session, Arc::new(AuthApi::new(transport.clone())));
        let client = ApiClient::new(transport, tokens);

        let err = client.send(ApiRequest::get("/outfits/")).await.unwrap_err();

        assert!(matches!(err, LookbookError::Transport(_)));
        let state = client.session().snapshot();
        assert_eq!(state.refresh_failures, 1);
        assert_eq!(state.access_token().unwrap().expose_secret(), "a2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_during_refresh_retries_with_new_token() {
        let server = FakeServer::new("b1", Some("a2"));
        server.honor_refresh.store(false, Ordering::SeqCst);
        let mut navigator = MockLoginNavigator::new();
        navigator.expect_is_on_login_view().return_const(false);
        navigator.expect_navigate_to_login().never();
        let client = client_for(server.clone(), LOGGED_IN).with_navigator(Arc::new(navigator));

        let call = tokio::spawn({
            let client = client.clone();
            async move { client.send(ApiRequest::get("/outfits/")).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        client
            .session()
            .set_tokens(CredentialPair::new("b1", "s1"))
            .unwrap();

        let response = call.await.unwrap().unwrap();
        assert!(response.is_success());
        assert_eq!(
            server.seen().last().unwrap(),
            &("/outfits/".to_string(), Some("b1".to_string()))
        );
        assert_eq!(
            client.session().access_token().unwrap().expose_secret(),
            "b1"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_business_errors_pass_through() {
        struct NotFound;

        #[async_trait]
        impl Transport for NotFound {
            async fn execute(&self, _request: &ApiRequest) -> Result<ApiResponse> {
                Ok(ApiResponse::new(StatusCode::NOT_FOUND, "{}"))
            }
        }

        let server = FakeServer::new("a1", None);
        let session = Arc::new(SessionContext::new(
            Arc::new(MemoryTokenStore::new()),
            CircuitBreakerConfig::default(),
        ));
        let tokens = TokenManager::new(session, Arc::new(AuthApi::new(server)));
        let client = ApiClient::new(Arc::new(NotFound), tokens);

        let response = client.send(ApiRequest::get("/outfits/99/")).await.unwrap();
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert!(!client.tokens().is_refreshing());
    }
}
