//! Key-value persistence for session state
//!
//! A [`ConfigStore`] maps string keys to TOML values. [`FileStore`] keeps
//! the whole table in one file and rewrites it on every change, so a `set`
//! has hit the disk by the time it returns. [`MemoryStore`] backs the tests.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to access state file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse state file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize state: {0}")]
    Serialize(#[from] toml::ser::Error),
}

pub trait ConfigStore {
    fn get_value(&self, key: &str) -> Option<toml::Value>;

    fn set_value(&mut self, key: &str, value: toml::Value) -> Result<(), StoreError>;

    fn delete(&mut self, key: &str) -> Result<(), StoreError>;

    /// Typed read; `default` is returned when the key is absent or does not
    /// deserialize into `T`
    fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T
    where
        Self: Sized,
    {
        self.get_value(key)
            .and_then(|value| T::deserialize(value).ok())
            .unwrap_or(default)
    }

    fn set<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), StoreError>
    where
        Self: Sized,
    {
        let value = toml::Value::try_from(value)?;
        self.set_value(key, value)
    }
}

/// TOML file backed store
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    table: toml::Table,
}

impl FileStore {
    /// Open the store, starting empty if the file does not exist yet
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        let table = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            toml::from_str(&content)?
        } else {
            toml::Table::new()
        };

        Ok(Self { path, table })
    }

    fn flush(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(&self.table)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

impl ConfigStore for FileStore {
    fn get_value(&self, key: &str) -> Option<toml::Value> {
        self.table.get(key).cloned()
    }

    fn set_value(&mut self, key: &str, value: toml::Value) -> Result<(), StoreError> {
        self.table.insert(key.to_string(), value);
        self.flush()
    }

    fn delete(&mut self, key: &str) -> Result<(), StoreError> {
        if self.table.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }
}

/// In-memory store that counts writes
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: BTreeMap<String, toml::Value>,
    writes: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `set_value`/`delete` calls
    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }
}

impl ConfigStore for MemoryStore {
    fn get_value(&self, key: &str) -> Option<toml::Value> {
        self.values.get(key).cloned()
    }

    fn set_value(&mut self, key: &str, value: toml::Value) -> Result<(), StoreError> {
        self.values.insert(key.to_string(), value);
        self.writes += 1;
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<(), StoreError> {
        self.values.remove(key);
        self.writes += 1;
        Ok(())
    }
}
