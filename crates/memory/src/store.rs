use crate::error::MemoryError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// A key-value store for values the tuning loop keeps across iterations and runs.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn put(&self, key: &str, value: Value) -> Result<(), MemoryError>;

    /// `None` when the key is unknown.
    async fn get(&self, key: &str) -> Result<Option<Value>, MemoryError>;

    /// Deleting an unknown key is not an error.
    async fn delete(&self, key: &str) -> Result<(), MemoryError>;

    /// Appends to the list under `key`, creating it when missing and wrapping a
    /// scalar into a one-element list first.
    async fn append(&self, key: &str, value: Value) -> Result<(), MemoryError>;

    async fn keys(&self) -> Result<Vec<String>, MemoryError>;
}

/// Adds `value` to `existing` as `append` defines it.
pub(crate) fn appended(existing: Option<Value>, value: Value) -> Value {
    match existing {
        None | Some(Value::Null) => Value::Array(vec![value]),
        Some(Value::Array(mut items)) => {
            items.push(value);
            Value::Array(items)
        }
        Some(scalar) => Value::Array(vec![scalar, value]),
    }
}

/// A JSON object on disk, read whole on every operation and rewritten whole on
/// every mutation.
///
/// A missing or corrupt file reads as an empty store. Operations from one process
/// are serialised; nothing guards against a second process writing the same file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Map<String, Value> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Map::new(),
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "Failed to read memory file");
                return Map::new();
            }
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => map,
            Ok(_) | Err(_) => {
                tracing::error!(path = %self.path.display(), "Memory file is not a JSON object; treating as empty");
                Map::new()
            }
        }
    }

    async fn save(&self, data: &Map<String, Value>) -> Result<(), MemoryError> {
        let io = |source| MemoryError::Io {
            path: self.path.display().to_string(),
            source,
        };
        if let Some(dir) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await.map_err(io)?;
        }
        let text = serde_json::to_string_pretty(data)?;
        tokio::fs::write(&self.path, text).await.map_err(io)
    }
}

#[async_trait]
impl MemoryStore for JsonFileStore {
    async fn put(&self, key: &str, value: Value) -> Result<(), MemoryError> {
        let _guard = self.lock.lock().await;
        let mut data = self.load().await;
        data.insert(key.to_string(), value);
        self.save(&data).await?;
        tracing::debug!(key, "PUT");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, MemoryError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await.remove(key))
    }

    async fn delete(&self, key: &str) -> Result<(), MemoryError> {
        let _guard = self.lock.lock().await;
        let mut data = self.load().await;
        if data.remove(key).is_none() {
            tracing::debug!(key, "DELETE of unknown key");
            return Ok(());
        }
        self.save(&data).await?;
        tracing::debug!(key, "DELETE");
        Ok(())
    }

    async fn append(&self, key: &str, value: Value) -> Result<(), MemoryError> {
        let _guard = self.lock.lock().await;
        let mut data = self.load().await;
        let updated = appended(data.remove(key), value);
        data.insert(key.to_string(), updated);
        self.save(&data).await?;
        tracing::debug!(key, "APPEND");
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, MemoryError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await.keys().cloned().collect())
    }
}
