//! End-to-end session flows through the public API with a scripted server

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::ExposeSecret;

use lookbook_rs::api::{ApiClient, ApiRequest, ApiResponse, AuthApi, Transport};
use lookbook_rs::core::config::CircuitBreakerConfig;
use lookbook_rs::core::credentials::{
    MemoryTokenStore, TokenStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY,
};
use lookbook_rs::core::{SessionContext, SessionEvent, TokenManager};
use lookbook_rs::{LookbookError, RefreshError, Result};

/// `/outfits/` needs the current access token; `/auth/refresh/` plays back a script
struct ScriptedServer {
    valid_token: Mutex<String>,
    refresh_script: Mutex<VecDeque<(StatusCode, String)>>,
    refresh_calls: AtomicUsize,
}

impl ScriptedServer {
    fn new(valid: &str, script: Vec<(StatusCode, &str)>) -> Arc<Self> {
        Arc::new(Self {
            valid_token: Mutex::new(valid.to_string()),
            refresh_script: Mutex::new(
                script
                    .into_iter()
                    .map(|(status, body)| (status, body.to_string()))
                    .collect(),
            ),
            refresh_calls: AtomicUsize::new(0),
        })
    }

    fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedServer {
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
        if request.path == "/auth/refresh/" {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;

            let (status, body) = self
                .refresh_script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or((StatusCode::UNAUTHORIZED, r#"{"detail": "exhausted"}"#.into()));

            if status.is_success() {
                let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
                *self.valid_token.lock().unwrap() = parsed["access"].as_str().unwrap().to_string();
            }
            return Ok(ApiResponse::new(status, body));
        }

        let valid = self.valid_token.lock().unwrap().clone();
        match request.bearer() {
            Some(token) if token.expose_secret() == valid => {
                Ok(ApiResponse::new(StatusCode::OK, r#"[{"id": 1}]"#))
            }
            _ => Ok(ApiResponse::new(
                StatusCode::UNAUTHORIZED,
                r#"{"detail": "Given token not valid for any token type"}"#,
            )),
        }
    }
}

/// Session restored from a store holding `a1`/`r1`, as after a restart
fn restored_client(server: Arc<ScriptedServer>) -> (ApiClient, Arc<MemoryTokenStore>) {
    let store = Arc::new(MemoryTokenStore::new());
    store.set(ACCESS_TOKEN_KEY, "a1").unwrap();
    store.set(REFRESH_TOKEN_KEY, "r1").unwrap();

    let session =
        Arc::new(SessionContext::restore(store.clone(), CircuitBreakerConfig::default()).unwrap());
    let tokens = TokenManager::new(session, Arc::new(AuthApi::new(server.clone())));
    (ApiClient::new(server, tokens), store)
}

#[tokio::test(start_paused = true)]
async fn expired_token_is_refreshed_once_for_concurrent_calls() {
    let server = ScriptedServer::new("a2", vec![(StatusCode::OK, r#"{"access": "a2"}"#)]);
    let (client, store) = restored_client(server.clone());
    let mut events = client.session().events().subscribe();

    assert!(client.session().is_authenticated());

    let calls = (0..3).map(|_| {
        let client = client.clone();
        tokio::spawn(async move { client.get_json::<serde_json::Value>("/outfits/").await })
    });
    for call in futures::future::join_all(calls).await {
        assert_eq!(call.unwrap().unwrap(), serde_json::json!([{"id": 1}]));
    }

    assert_eq!(server.refresh_calls(), 1);
    assert_eq!(store.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("a2"));
    assert_eq!(store.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("r1"));
    assert_eq!(events.recv().await.unwrap(), SessionEvent::Refreshed);
    assert_eq!(client.session().snapshot().refresh_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn repeated_refresh_failures_end_the_session() {
    let rejected = (StatusCode::UNAUTHORIZED, r#"{"detail": "Token is blacklisted"}"#);
    let server = ScriptedServer::new("never", vec![rejected; 3]);
    let (client, store) = restored_client(server.clone());
    let mut events = client.session().events().subscribe();

    for attempt in 1..=3u32 {
        let err = client.tokens().refresh_access_token().await.unwrap_err();
        assert!(matches!(err, RefreshError::Rejected { status: 401, .. }));
        assert_eq!(client.session().snapshot().refresh_failures, attempt);

        // Step past the minimum refresh interval
        tokio::time::advance(Duration::from_secs(6)).await;
    }

    assert!(!client.session().is_authenticated());
    assert_eq!(store.get(ACCESS_TOKEN_KEY).unwrap(), None);
    assert_eq!(store.get(REFRESH_TOKEN_KEY).unwrap(), None);
    assert_eq!(events.recv().await.unwrap(), SessionEvent::Expired);

    assert_eq!(
        client.tokens().refresh_access_token().await.unwrap_err(),
        RefreshError::CircuitOpen
    );
    assert_eq!(server.refresh_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn refresh_right_after_a_failure_is_throttled() {
    let server = ScriptedServer::new(
        "a2",
        vec![
            (StatusCode::SERVICE_UNAVAILABLE, ""),
            (StatusCode::OK, r#"{"access": "a2", "refresh": "r2"}"#),
        ],
    );
    let (client, store) = restored_client(server.clone());

    let err = client.get_json::<serde_json::Value>("/outfits/").await.unwrap_err();
    assert!(matches!(
        err,
        LookbookError::Refresh(RefreshError::Rejected { status: 503, .. })
    ));

    let err = client.tokens().refresh_access_token().await.unwrap_err();
    assert!(matches!(err, RefreshError::Throttled { .. }));
    assert!(client.session().is_authenticated());

    tokio::time::advance(Duration::from_secs(5)).await;

    let outfits: serde_json::Value = client.get_json("/outfits/").await.unwrap();
    assert_eq!(outfits, serde_json::json!([{"id": 1}]));
    assert_eq!(store.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("r2"));
    assert_eq!(server.refresh_calls(), 2);
}
