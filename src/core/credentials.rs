//! Credential persistence
//!
//! The session mirrors its access and refresh tokens into a [`TokenStore`] so
//! they survive process restarts. Three backends are provided:
//! - [`KeyringTokenStore`] - system keyring (macOS Keychain, Linux Secret Service)
//!   with in-memory caching to minimize keychain prompts
//! - [`FileTokenStore`] - a JSON file, for machines without a keyring
//! - [`MemoryTokenStore`] - nothing persisted; tests and throwaway sessions
//!
//! Stores hold opaque strings and never inspect token contents.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use keyring::Entry;
use secrecy::{ExposeSecret, SecretString};

use crate::core::config::{Config, TokenStoreKind};
use crate::error::{LookbookError, Result};

const SERVICE_NAME: &str = "lookbook-rs";

/// Store key for the access token
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Store key for the refresh token
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// File name used by [`FileTokenStore::in_config_dir`]
const TOKEN_FILE: &str = "tokens.json";

/// Synchronous key-value persistence for credential strings
#[cfg_attr(test, mockall::automock)]
pub trait TokenStore: Send + Sync {
    /// Read a value, `None` when the key was never set or has been cleared
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove the given keys; missing keys are not an error
    fn clear(&self, keys: &[&'static str]) -> Result<()>;
}

/// Build the token store selected in the configuration
pub fn open_token_store(config: &Config) -> Result<Arc<dyn TokenStore>> {
    let store: Arc<dyn TokenStore> = match config.token_store {
        TokenStoreKind::Keyring => Arc::new(KeyringTokenStore::new()),
        TokenStoreKind::File => Arc::new(FileTokenStore::in_config_dir()?),
        TokenStoreKind::Memory => Arc::new(MemoryTokenStore::new()),
    };
    Ok(store)
}

// ─────────────────────────────────────────────────────────────────────────────
// Keyring
// ─────────────────────────────────────────────────────────────────────────────

/// Token store backed by the system keyring
///
/// Every key is a separate keyring entry under the `lookbook-rs` service.
///
/// Cache semantics per key:
///   - absent = not yet fetched from keyring
///   - `Some(None)` = fetched, but no credential exists
///   - `Some(Some(value))` = fetched and cached
pub struct KeyringTokenStore {
    service: String,
    cache: RwLock<HashMap<String, Option<SecretString>>>,
}

impl KeyringTokenStore {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    /// Use a custom keyring service name (separate profiles, testing)
    pub fn with_service(service: &str) -> Self {
        Self {
            service: service.to_string(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        Ok(Entry::new(&self.service, key)?)
    }

    fn cache_put(&self, key: &str, value: Option<SecretString>) {
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(key.to_string(), value);
        }
    }

    /// Fetch directly from keyring (no cache)
    fn fetch(&self, key: &str) -> Result<Option<SecretString>> {
        match self.entry(key)?.get_password() {
            Ok(password) => Ok(Some(SecretString::from(password))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(LookbookError::Credential(format!(
                "Cannot access system keychain. Make sure your keyring is unlocked. ({})",
                e
            ))),
        }
    }
}

impl Default for KeyringTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore for KeyringTokenStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        if let Ok(cache) = self.cache.read() {
            if let Some(cached) = cache.get(key) {
                return Ok(cached.as_ref().map(|s| s.expose_secret().to_string()));
            }
        }

        let result = self.fetch(key)?;
        let plain = result.as_ref().map(|s| s.expose_secret().to_string());
        self.cache_put(key, result);
        Ok(plain)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entry(key)?.set_password(value)?;
        self.cache_put(key, Some(SecretString::from(value.to_string())));
        Ok(())
    }

    fn clear(&self, keys: &[&'static str]) -> Result<()> {
        let mut first_error = None;

        for key in keys {
            let result = self
                .entry(key)
                .and_then(|entry| match entry.delete_credential() {
                    Ok(()) => Ok(()),
                    Err(keyring::Error::NoEntry) => Ok(()), // Already deleted
                    Err(e) => Err(LookbookError::Credential(e.to_string())),
                });

            // Clear cache even if the keyring refused, so we stop serving the old value
            self.cache_put(key, None);

            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// File
// ─────────────────────────────────────────────────────────────────────────────

/// Token store persisted as a flat JSON object
///
/// The whole file is rewritten on every mutation. Contents are not encrypted.
pub struct FileTokenStore {
    path: PathBuf,
    lock: RwLock<()>,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
        }
    }

    /// Store at `tokens.json` in the configuration directory
    pub fn in_config_dir() -> Result<Self> {
        Ok(Self::new(Config::config_dir()?.join(TOKEN_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<HashMap<String, String>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(HashMap::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    fn write_all(&self, values: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(values)?;
        fs::write(&self.path, contents)?;
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.read().unwrap_or_else(|e| e.into_inner());
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.write().unwrap_or_else(|e| e.into_inner());
        let mut values = self.read_all()?;
        values.insert(key.to_string(), value.to_string());
        self.write_all(&values)
    }

    fn clear(&self, keys: &[&'static str]) -> Result<()> {
        let _guard = self.lock.write().unwrap_or_else(|e| e.into_inner());
        let mut values = self.read_all()?;
        let before = values.len();
        for key in keys {
            values.remove(*key);
        }
        if values.len() != before {
            self.write_all(&values)?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory
// ─────────────────────────────────────────────────────────────────────────────

/// Non-persistent token store
#[derive(Default)]
pub struct MemoryTokenStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear(&self, keys: &[&'static str]) -> Result<()> {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        for key in keys {
            values.remove(*key);
        }
        Ok(())
    }
}

/// Get a masked version of a token for display (shows first 4 and last 4 chars)
pub fn mask_token(token: &SecretString) -> String {
    let exposed = token.expose_secret();
    let chars: Vec<char> = exposed.chars().collect();
    if chars.len() <= 8 {
        "*".repeat(chars.len())
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    }
}
