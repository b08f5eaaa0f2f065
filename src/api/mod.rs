//! Lookbook API integration module
//!
//! This module provides the HTTP side of the session:
//! - Request/response types and the transport seam
//! - Credential classification of endpoints
//! - The intercepting API client (bearer attachment, 401 refresh and retry)
//! - Login and token refresh endpoints

pub mod auth;
pub mod client;
pub mod endpoints;
pub mod transport;

pub use auth::{AuthApi, AuthHandler};
pub use client::{ApiClient, LoginNavigator, NoopNavigator};
pub use endpoints::{Access, EndpointPolicy};
pub use transport::{ApiRequest, ApiResponse, ReqwestTransport, Transport};
