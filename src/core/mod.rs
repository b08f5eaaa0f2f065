//! Core functionality for lookbook-rs
//!
//! This module contains the session machinery shared by the CLI and the API
//! client:
//! - Application configuration
//! - Credential persistence
//! - Session state and lifecycle events
//! - Refresh circuit breaker
//! - Token lifecycle management

pub mod circuit_breaker;
pub mod config;
pub mod credentials;
pub mod events;
pub mod session;
pub mod token_manager;

pub use config::Config;
pub use credentials::TokenStore;
pub use events::{SessionEvent, SessionEvents};
pub use session::{CredentialPair, SessionContext, SessionState};
pub use token_manager::TokenManager;
