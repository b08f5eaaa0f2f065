//! Configuration CLI command handlers

use crate::cli::commands::{ConfigCommand, ConfigKey};
use crate::core::config::{CircuitBreakerConfig, Config, TokenStoreKind};
use crate::error::{LookbookError, Result};

/// Handle configuration commands
pub fn handle_config(command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Set { key, value } => handle_set(key, value),
        ConfigCommand::Get { key } => handle_get(key),
        ConfigCommand::Remove { key } => handle_remove(key),
        ConfigCommand::Path => {
            println!("{}", Config::config_path()?.display());
            Ok(())
        }
    }
}

/// Handle setting a configuration value
fn handle_set(key: ConfigKey, value: String) -> Result<()> {
    let mut config = Config::load_file()?;
    apply(&mut config, key, &value)?;
    config.save()?;

    println!("{} set to: {}", label(key), describe(&config, key));
    Ok(())
}

/// Handle getting a configuration value
fn handle_get(key: ConfigKey) -> Result<()> {
    let config = Config::load()?;
    println!("{}: {}", label(key), describe(&config, key));
    Ok(())
}

/// Handle resetting a configuration value
fn handle_remove(key: ConfigKey) -> Result<()> {
    let mut config = Config::load_file()?;
    let defaults = Config::default();

    match key {
        ConfigKey::ApiUrl => config.api_base_url = defaults.api_base_url,
        ConfigKey::TokenStore => config.token_store = defaults.token_store,
        ConfigKey::RequestTimeout => config.request_timeout_secs = defaults.request_timeout_secs,
        ConfigKey::MaxFailures => {
            config.circuit_breaker.max_failures = CircuitBreakerConfig::default().max_failures
        }
        ConfigKey::ResetTimeout => {
            config.circuit_breaker.reset_timeout_secs =
                CircuitBreakerConfig::default().reset_timeout_secs
        }
        ConfigKey::MinRefreshInterval => {
            config.circuit_breaker.min_refresh_interval_secs =
                CircuitBreakerConfig::default().min_refresh_interval_secs
        }
    }
    config.save()?;

    println!("{} reset to default: {}", label(key), describe(&config, key));
    Ok(())
}

/// Validate `value` and store it under `key`
fn apply(config: &mut Config, key: ConfigKey, value: &str) -> Result<()> {
    match key {
        ConfigKey::ApiUrl => config.set_api_base_url(value)?,
        ConfigKey::TokenStore => {
            config.token_store = TokenStoreKind::from_str(value).ok_or_else(|| {
                LookbookError::InvalidInput(format!(
                    "Invalid token store '{}'. Available backends: {}",
                    value,
                    TokenStoreKind::all()
                        .iter()
                        .map(|k| k.name())
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })?;
        }
        ConfigKey::RequestTimeout => config.request_timeout_secs = parse_positive(key, value)?,
        ConfigKey::MaxFailures => {
            config.circuit_breaker.max_failures = u32::try_from(parse_positive(key, value)?)
                .map_err(|_| LookbookError::InvalidInput(format!("{} is too large", value)))?;
        }
        ConfigKey::ResetTimeout => {
            config.circuit_breaker.reset_timeout_secs = parse_positive(key, value)?
        }
        ConfigKey::MinRefreshInterval => {
            config.circuit_breaker.min_refresh_interval_secs = value.parse().map_err(|_| {
                LookbookError::InvalidInput(format!(
                    "Invalid {} '{}'. Expected a number of seconds",
                    label(key),
                    value
                ))
            })?;
        }
    }
    Ok(())
}

fn parse_positive(key: ConfigKey, value: &str) -> Result<u64> {
    match value.parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(LookbookError::InvalidInput(format!(
            "Invalid {} '{}'. Expected a positive whole number",
            label(key),
            value
        ))),
    }
}

fn label(key: ConfigKey) -> &'static str {
    match key {
        ConfigKey::ApiUrl => "API URL",
        ConfigKey::TokenStore => "Token store",
        ConfigKey::RequestTimeout => "Request timeout",
        ConfigKey::MaxFailures => "Max refresh failures",
        ConfigKey::ResetTimeout => "Circuit reset timeout",
        ConfigKey::MinRefreshInterval => "Min refresh interval",
    }
}

fn describe(config: &Config, key: ConfigKey) -> String {
    match key {
        ConfigKey::ApiUrl => config.api_base_url.clone(),
        ConfigKey::TokenStore => config.token_store.to_string(),
        ConfigKey::RequestTimeout => format!("{}s", config.request_timeout_secs),
        ConfigKey::MaxFailures => config.circuit_breaker.max_failures.to_string(),
        ConfigKey::ResetTimeout => format!("{}s", config.circuit_breaker.reset_timeout_secs),
        ConfigKey::MinRefreshInterval => {
            format!("{}s", config.circuit_breaker.min_refresh_interval_secs)
        }
    }
}
