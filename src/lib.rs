//! lookbook-rs - Session and token lifecycle client for the Lookbook API
//!
//! This library attaches credentials to outgoing API calls, refreshes an
//! expired access token exactly once under concurrent load, and stops
//! refreshing after repeated failures. A small CLI exercises it.

pub mod api;
pub mod cli;
pub mod core;
pub mod error;

pub use error::{LookbookError, RefreshError, Result};
