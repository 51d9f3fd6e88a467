//! Durable key-value storage for session records.
//!
//! Records are opaque JSON strings. `SessionStore` decides what goes in them.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use redis::AsyncCommands;
use tokio::sync::RwLock;

use crate::errors::AppError;

#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<String>, AppError>;
    async fn save(&self, key: &str, record: &str) -> Result<(), AppError>;
    async fn remove(&self, key: &str) -> Result<(), AppError>;
}

/// Process-local storage. Records vanish on restart.
#[derive(Default, Clone)]
pub struct MemorySessionStorage {
    records: Arc<RwLock<HashMap<String, String>>>,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStorage for MemorySessionStorage {
    async fn load(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn save(&self, key: &str, record: &str) -> Result<(), AppError> {
        self.records
            .write()
            .await
            .insert(key.to_string(), record.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), AppError> {
        self.records.write().await.remove(key);
        Ok(())
    }
}

/// One JSON file per key inside a directory. Writes go through a temporary
/// file in the same directory and are renamed into place.
#[derive(Clone)]
pub struct FileSessionStorage {
    dir: PathBuf,
}

impl FileSessionStorage {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, AppError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| storage_error(&dir, e))?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{file_name}.json"))
    }
}

fn storage_error(path: &Path, e: impl std::fmt::Display) -> AppError {
    AppError::Storage(format!("{}: {e}", path.display()))
}

#[async_trait]
impl SessionStorage for FileSessionStorage {
    async fn load(&self, key: &str) -> Result<Option<String>, AppError> {
        let path = self.path_for(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(record) => Ok(Some(record)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_error(&path, e)),
        }
    }

    async fn save(&self, key: &str, record: &str) -> Result<(), AppError> {
        let dir = self.dir.clone();
        let path = self.path_for(key);
        let record = record.to_string();
        tokio::task::spawn_blocking(move || {
            let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| storage_error(&dir, e))?;
            tmp.write_all(record.as_bytes())
                .map_err(|e| storage_error(tmp.path(), e))?;
            tmp.persist(&path).map_err(|e| storage_error(&path, e))?;
            Ok::<(), AppError>(())
        })
        .await
        .map_err(|e| AppError::Internal(e.into()))?
    }

    async fn remove(&self, key: &str) -> Result<(), AppError> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error(&path, e)),
        }
    }
}

/// Redis-backed storage, shared by every API instance.
#[derive(Clone)]
pub struct RedisSessionStorage {
    conn: redis::aio::MultiplexedConnection,
}

impl RedisSessionStorage {
    pub async fn connect(client: &redis::Client) -> Result<Self, AppError> {
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl SessionStorage for RedisSessionStorage {
    async fn load(&self, key: &str) -> Result<Option<String>, AppError> {
        let mut conn = self.conn.clone();
        Ok(conn.get(key).await?)
    }

    async fn save(&self, key: &str, record: &str) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, record).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_storage_round_trip() {
        let storage = MemorySessionStorage::new();
        assert!(storage.load("inveron_user:a").await.unwrap().is_none());
        storage.save("inveron_user:a", "{}").await.unwrap();
        assert_eq!(storage.load("inveron_user:a").await.unwrap().as_deref(), Some("{}"));
        storage.remove("inveron_user:a").await.unwrap();
        assert!(storage.load("inveron_user:a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_storage_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileSessionStorage::open(dir.path()).unwrap();
        storage.save("inveron_user:abc", r#"{"a":1}"#).await.unwrap();

        let reopened = FileSessionStorage::open(dir.path()).unwrap();
        assert_eq!(
            reopened.load("inveron_user:abc").await.unwrap().as_deref(),
            Some(r#"{"a":1}"#)
        );
    }

    #[tokio::test]
    async fn test_file_storage_overwrites_and_removes() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileSessionStorage::open(dir.path()).unwrap();
        storage.save("k", "one").await.unwrap();
        storage.save("k", "two").await.unwrap();
        assert_eq!(storage.load("k").await.unwrap().as_deref(), Some("two"));

        storage.remove("k").await.unwrap();
        storage.remove("k").await.unwrap();
        assert!(storage.load("k").await.unwrap().is_none());
    }

    #[test]
    fn test_file_names_are_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileSessionStorage::open(dir.path()).unwrap();
        let path = storage.path_for("inveron_user:../../etc");
        assert_eq!(path.parent(), Some(dir.path()));
        assert_eq!(path.file_name().unwrap(), "inveron_user_______etc.json");
    }
}
