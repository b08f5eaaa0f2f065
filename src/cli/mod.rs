//! CLI module for lookbook-rs
//!
//! This module contains all CLI command definitions and handlers using clap.

pub mod auth;
pub mod commands;
pub mod config;
pub mod context;
pub mod request;

pub use commands::{Cli, Commands};
