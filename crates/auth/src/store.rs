//! Key/value stores for access and refresh credentials.
//!
//! Credentials are read fresh on every call so a token written by
//! unrelated code is picked up on the next connection attempt.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};

use tracing::{debug, warn};

use crate::error::StoreError;

/// Client-side credential storage keyed by fixed names
/// ([`ACCESS_TOKEN_KEY`](medlink_protocol::constants::ACCESS_TOKEN_KEY),
/// [`REFRESH_TOKEN_KEY`](medlink_protocol::constants::REFRESH_TOKEN_KEY)).
pub trait CredentialStore: Send + Sync {
    /// Returns the stored value, if any.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores several values in one write. Either all are stored or none.
    fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StoreError>;

    /// Stores a single value.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.set_many(&[(key, value)])
    }
}

/// Credential store persisted as a JSON object on disk.
///
/// Nothing is cached: every `get` reads the file.
pub struct FileCredentialStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, key: &str) -> Option<String> {
        match load_tokens(&self.path) {
            Ok(mut tokens) => tokens.remove(key),
            Err(e) => {
                warn!(path = %self.path.display(), "failed to read credential store: {e}");
                None
            }
        }
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut tokens = load_tokens(&self.path)?;
        for (key, value) in entries {
            tokens.insert((*key).to_string(), (*value).to_string());
        }
        persist(&self.path, &tokens)
    }
}

/// Loads the credential map, treating a missing file as empty.
fn load_tokens(path: &Path) -> Result<HashMap<String, String>, StoreError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let data = std::fs::read_to_string(path)?;
    if data.trim().is_empty() {
        return Ok(HashMap::new());
    }
    Ok(serde_json::from_str(&data)?)
}

/// Writes the map through a sibling temp file so readers never see a
/// half-written store.
fn persist(path: &Path, tokens: &HashMap<String, String>) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(tokens)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    debug!("persisted {} credential(s) to {:?}", tokens.len(), path);
    Ok(())
}

/// In-process credential store.
#[derive(Default)]
pub struct MemoryCredentialStore {
    tokens: RwLock<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, handy for wiring tests and demos.
    pub fn with(self, key: &str, value: &str) -> Self {
        self.tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn remove(&self, key: &str) {
        self.tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, key: &str) -> Option<String> {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StoreError> {
        let mut map = self.tokens.write().unwrap_or_else(PoisonError::into_inner);
        for (key, value) in entries {
            map.insert((*key).to_string(), (*value).to_string());
        }
        Ok(())
    }
}
