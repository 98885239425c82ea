//! Key-value store
//!
//! A flat JSON document on disk, read once and rewritten on every mutation.
//! Handles can be namespaced; a namespaced key is stored as `ns::key`.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::storage::{get_data_dir, StorageError};

const STORE_FILE: &str = "store.json";

struct Inner {
    path: Option<PathBuf>,
    data: Map<String, Value>,
}

impl Inner {
    fn flush(&self) -> Result<(), StorageError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.data)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// Handle to the key-value store
#[derive(Clone)]
pub struct JsonStore {
    inner: Arc<Mutex<Inner>>,
    namespace: String,
}

impl JsonStore {
    /// Open the store in the application data directory
    pub fn open_default() -> Result<Self, StorageError> {
        Self::open(get_data_dir()?.join(STORE_FILE))
    }

    /// Open (or create on first write) a store backed by `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let data = if path.exists() {
            let json = fs::read_to_string(&path)?;
            if json.trim().is_empty() {
                Map::new()
            } else {
                serde_json::from_str(&json)?
            }
        } else {
            Map::new()
        };
        tracing::debug!("Opened key-value store at {:?} ({} keys)", path, data.len());
        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                path: Some(path),
                data,
            })),
            namespace: String::new(),
        })
    }

    /// A store that never touches disk
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                path: None,
                data: Map::new(),
            })),
            namespace: String::new(),
        }
    }

    /// A handle sharing the same document under another namespace
    pub fn namespaced(&self, namespace: impl Into<String>) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            namespace: namespace.into(),
        }
    }

    fn add_namespace(&self, key: &str) -> String {
        if self.namespace.is_empty() {
            key.to_string()
        } else {
            format!("{}::{}", self.namespace, key)
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read and deserialize a value; missing or mistyped entries read as `None`
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get_raw(&self.add_namespace(key))?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!("Ignoring unreadable store entry '{}': {}", key, e);
                None
            }
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let value = serde_json::to_value(value)?;
        self.set_raw(&self.add_namespace(key), value)
    }

    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.remove_raw(&self.add_namespace(key))
    }

    /// Remove every key in this handle's namespace (everything, if unnamespaced)
    pub fn clear(&self) -> Result<(), StorageError> {
        let mut inner = self.lock();
        if self.namespace.is_empty() {
            inner.data.clear();
        } else {
            let prefix = format!("{}::", self.namespace);
            inner.data.retain(|k, _| !k.starts_with(&prefix));
        }
        inner.flush()
    }

    /// Write several entries at once
    pub fn store<T: Serialize>(
        &self,
        entries: impl IntoIterator<Item = (String, T)>,
    ) -> Result<(), StorageError> {
        let mut inner = self.lock();
        for (key, value) in entries {
            let value = serde_json::to_value(&value)?;
            inner.data.insert(self.add_namespace(&key), value);
        }
        inner.flush()
    }

    /// All stored keys, fully qualified
    pub fn raw_keys(&self) -> Vec<String> {
        self.lock().data.keys().cloned().collect()
    }

    pub fn get_raw(&self, key: &str) -> Option<Value> {
        self.lock().data.get(key).cloned()
    }

    pub fn set_raw(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let mut inner = self.lock();
        inner.data.insert(key.to_string(), value);
        inner.flush()
    }

    pub fn remove_raw(&self, key: &str) -> Result<(), StorageError> {
        let mut inner = self.lock();
        if inner.data.remove(key).is_some() {
            inner.flush()?;
        }
        Ok(())
    }
}
