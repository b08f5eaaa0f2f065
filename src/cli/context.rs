//! Composition root
//!
//! Builds the single session for this process and wires it into the token
//! manager and API client.

use std::sync::Arc;

use crate::api::{ApiClient, AuthApi, LoginNavigator, ReqwestTransport, Transport};
use crate::core::config::Config;
use crate::core::credentials::open_token_store;
use crate::core::events::SessionEvent;
use crate::core::session::SessionContext;
use crate::core::token_manager::TokenManager;
use crate::error::Result;

/// Login redirect for the terminal: print how to log in again
pub struct CliNavigator {
    on_login_view: bool,
}

impl CliNavigator {
    /// `on_login_view` is true while running `auth login` itself
    pub fn new(on_login_view: bool) -> Self {
        Self { on_login_view }
    }
}

impl LoginNavigator for CliNavigator {
    fn is_on_login_view(&self) -> bool {
        self.on_login_view
    }

    fn navigate_to_login(&self) {
        eprintln!();
        eprintln!("Your session has ended.");
        eprintln!("  → Run 'lookbook auth login' to sign in again.");
    }
}

/// Build the API client for the loaded configuration
pub fn build_client(config: &Config, navigator: Arc<dyn LoginNavigator>) -> Result<ApiClient> {
    let store = open_token_store(config)?;
    let session = Arc::new(SessionContext::restore(store, config.circuit_breaker)?);

    session.events().on(|event| {
        if event == SessionEvent::Expired {
            tracing::warn!("session expired, stored credentials removed");
        }
        Ok(())
    });

    let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::from_config(config)?);
    let tokens = TokenManager::new(session, Arc::new(AuthApi::new(transport.clone())));

    Ok(ApiClient::new(transport, tokens).with_navigator(navigator))
}
