//! CLI command definitions using clap
//!
//! Defines the command structure for the `lookbook` CLI tool.

use clap::{Parser, Subcommand, ValueEnum};
use reqwest::Method;

/// lookbook - Lookbook API session client
///
/// Logs in to the Lookbook API, keeps the session alive across restarts and
/// sends authenticated requests.
#[derive(Parser, Debug)]
#[command(name = "lookbook", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage the login session
    Auth(AuthArgs),

    /// Send a request to the API with the current session
    Request(RequestArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Auth Commands
// ─────────────────────────────────────────────────────────────────────────────

/// Authentication commands
#[derive(Parser, Debug)]
pub struct AuthArgs {
    #[command(subcommand)]
    pub command: AuthCommand,
}

#[derive(Subcommand, Debug)]
pub enum AuthCommand {
    /// Log in with username and password
    Login {
        /// Account username (prompted if omitted)
        #[arg(long, short)]
        username: Option<String>,

        /// Read the password from the first line of stdin without prompting
        #[arg(long)]
        password_stdin: bool,
    },
    /// Logout and remove stored credentials
    Logout,
    /// Show current authentication status
    Status,
    /// Exchange the refresh token for a new access token now
    Refresh,
}

// ─────────────────────────────────────────────────────────────────────────────
// Request Commands
// ─────────────────────────────────────────────────────────────────────────────

/// Arguments for a raw API request
#[derive(Parser, Debug)]
pub struct RequestArgs {
    /// HTTP method
    #[arg(value_enum)]
    pub method: HttpMethod,

    /// Path relative to the API base URL (e.g. /outfits/)
    pub path: String,

    /// JSON request body
    #[arg(long, short)]
    pub data: Option<String>,

    /// Query parameter as key=value (repeatable)
    #[arg(long = "query", short = 'q', value_name = "KEY=VALUE")]
    pub query: Vec<String>,

    /// Print the status line before the body
    #[arg(long, short = 'i')]
    pub include_status: bool,
}

/// HTTP methods accepted by `lookbook request`
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_method(&self) -> Method {
        match self {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Delete => Method::DELETE,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Config Commands
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration commands
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Set a configuration value
    Set {
        /// Configuration key
        key: ConfigKey,

        /// Configuration value
        value: String,
    },

    /// Get a configuration value
    Get {
        /// Configuration key
        key: ConfigKey,
    },

    /// Reset a configuration value to its default
    Remove {
        /// Configuration key
        key: ConfigKey,
    },

    /// Print the configuration file path
    Path,
}

/// Available configuration keys
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ConfigKey {
    /// API base URL
    #[value(name = "api-url")]
    ApiUrl,

    /// Token store backend (keyring, file, memory)
    #[value(name = "token-store")]
    TokenStore,

    /// Request timeout in seconds
    #[value(name = "request-timeout")]
    RequestTimeout,

    /// Consecutive refresh failures before giving up
    #[value(name = "max-failures")]
    MaxFailures,

    /// Seconds before a tripped refresh breaker resets
    #[value(name = "reset-timeout")]
    ResetTimeout,

    /// Minimum seconds between refresh attempts
    #[value(name = "min-refresh-interval")]
    MinRefreshInterval,
}
