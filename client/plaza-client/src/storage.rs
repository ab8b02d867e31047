//! Durable key-value storage for client state
//!
//! Only two keys exist: the signed-in account and the cached profile. They
//! are written as one JSON document so they can be cleared together.

use error_types::{ClientError, ClientResult};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
    Account,
    Profile,
}

impl StorageKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKey::Account => "account",
            StorageKey::Profile => "profile",
        }
    }
}

pub trait KeyValueStore: Send + Sync {
    fn get_raw(&self, key: StorageKey) -> ClientResult<Option<Value>>;

    fn set_raw(&self, key: StorageKey, value: Value) -> ClientResult<()>;

    fn remove(&self, key: StorageKey) -> ClientResult<()>;
}

impl dyn KeyValueStore {
    /// Read and decode a value. Undecodable entries are treated as absent.
    pub fn load<T: DeserializeOwned>(&self, key: StorageKey) -> ClientResult<Option<T>> {
        match self.get_raw(key)? {
            Some(value) => match serde_json::from_value(value) {
                Ok(decoded) => Ok(Some(decoded)),
                Err(e) => {
                    warn!(key = key.as_str(), error = %e, "Discarding unreadable stored value");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    pub fn save<T: Serialize>(&self, key: StorageKey, value: &T) -> ClientResult<()> {
        let value = serde_json::to_value(value)
            .map_err(|e| ClientError::parse(format!("stored {}", key.as_str()), e))?;
        self.set_raw(key, value)
    }
}

/// JSON file on disk, rewritten on every change
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<Map<String, Value>>,
}

impl FileStore {
    pub fn open(path: impl AsRef<Path>) -> ClientResult<Self> {
        let path = path.as_ref().to_path_buf();

        let entries = match std::fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => Map::new(),
            Ok(contents) => match serde_json::from_str::<Map<String, Value>>(&contents) {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Stored state is corrupt, starting empty");
                    Map::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => {
                return Err(ClientError::storage(
                    format!("failed to read {}", path.display()),
                    Some(e),
                ))
            }
        };

        debug!(path = %path.display(), keys = entries.len(), "Opened client storage");

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &Map<String, Value>) -> ClientResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ClientError::storage(format!("failed to create {}", parent.display()), Some(e))
                })?;
            }
        }

        let body = serde_json::to_vec_pretty(entries)
            .map_err(|e| ClientError::parse("client storage document", e))?;

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, body)
            .map_err(|e| ClientError::storage(format!("failed to write {}", tmp.display()), Some(e)))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            ClientError::storage(format!("failed to replace {}", self.path.display()), Some(e))
        })?;

        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get_raw(&self, key: StorageKey) -> ClientResult<Option<Value>> {
        Ok(self.entries.lock().get(key.as_str()).cloned())
    }

    fn set_raw(&self, key: StorageKey, value: Value) -> ClientResult<()> {
        let mut entries = self.entries.lock();
        let mut next = entries.clone();
        next.insert(key.as_str().to_string(), value);
        self.persist(&next)?;
        *entries = next;
        Ok(())
    }

    fn remove(&self, key: StorageKey) -> ClientResult<()> {
        let mut entries = self.entries.lock();
        if !entries.contains_key(key.as_str()) {
            return Ok(());
        }
        let mut next = entries.clone();
        next.remove(key.as_str());
        self.persist(&next)?;
        *entries = next;
        Ok(())
    }
}

/// Volatile store for tests and ephemeral sessions
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<Map<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get_raw(&self, key: StorageKey) -> ClientResult<Option<Value>> {
        Ok(self.entries.lock().get(key.as_str()).cloned())
    }

    fn set_raw(&self, key: StorageKey, value: Value) -> ClientResult<()> {
        self.entries.lock().insert(key.as_str().to_string(), value);
        Ok(())
    }

    fn remove(&self, key: StorageKey) -> ClientResult<()> {
        self.entries.lock().remove(key.as_str());
        Ok(())
    }
}
