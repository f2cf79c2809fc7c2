//! Offset persistence backends for consumer offset tracking.
//!
//! Provides [`MemoryOffsetStore`] and [`FileOffsetStore`] for durable offset
//! checkpointing across consumer restarts.
//!
//! ```no_run
//! # async fn example() -> lance_client::error::Result<()> {
//! use lance_client::offset::{FileOffsetStore, OffsetStore};
//!
//! let store = FileOffsetStore::new("/var/lib/lance/offsets")?;
//! store.save("my-consumer", 1, 42_000).await?;
//! let offset = store.load("my-consumer", 1).await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{error, warn};

use crate::error::Result;

/// Abstract persistence backend for `(consumer_name, topic_id) -> offset`.
#[async_trait]
pub trait OffsetStore: Send + Sync {
    /// Load the last committed offset. Returns `None` if not found.
    async fn load(&self, consumer_name: &str, topic_id: u32) -> Result<Option<u64>>;

    /// Persist the current offset.
    async fn save(&self, consumer_name: &str, topic_id: u32, offset: u64) -> Result<()>;

    /// Remove a stored offset.
    async fn delete(&self, consumer_name: &str, topic_id: u32) -> Result<()>;
}

/// In-memory offset store. Offsets are lost on process exit; useful for
/// tests and for consumers that checkpoint through an external system.
#[derive(Default)]
pub struct MemoryOffsetStore {
    offsets: Mutex<HashMap<(String, u32), u64>>,
}

impl MemoryOffsetStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OffsetStore for MemoryOffsetStore {
    async fn load(&self, consumer_name: &str, topic_id: u32) -> Result<Option<u64>> {
        Ok(self
            .offsets
            .lock()
            .await
            .get(&(consumer_name.to_string(), topic_id))
            .copied())
    }

    async fn save(&self, consumer_name: &str, topic_id: u32, offset: u64) -> Result<()> {
        self.offsets
            .lock()
            .await
            .insert((consumer_name.to_string(), topic_id), offset);
        Ok(())
    }

    async fn delete(&self, consumer_name: &str, topic_id: u32) -> Result<()> {
        self.offsets
            .lock()
            .await
            .remove(&(consumer_name.to_string(), topic_id));
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedOffset {
    consumer: String,
    topic_id: u32,
    offset: u64,
}

/// File-based offset store. Persists offsets as one JSON file per
/// `(consumer_name, topic_id)` pair, written via a `.tmp`-then-rename to
/// guarantee a crash never leaves a partially-written file in place of a
/// committed one.
pub struct FileOffsetStore {
    base_dir: PathBuf,
}

impl FileOffsetStore {
    /// Create the store, creating `base_dir` (and its parents) if absent.
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir)?;
        Ok(FileOffsetStore { base_dir })
    }

    fn path(&self, consumer_name: &str, topic_id: u32) -> PathBuf {
        let safe_name = consumer_name.replace(['/', '\\'], "_");
        self.base_dir.join(format!("{safe_name}_{topic_id}.offset"))
    }
}

#[async_trait]
impl OffsetStore for FileOffsetStore {
    async fn load(&self, consumer_name: &str, topic_id: u32) -> Result<Option<u64>> {
        let path = self.path(consumer_name, topic_id);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read offset file");
                return Ok(None);
            }
        };

        match serde_json::from_str::<PersistedOffset>(&text) {
            Ok(record) => Ok(Some(record.offset)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to parse offset file");
                Ok(None)
            }
        }
    }

    async fn save(&self, consumer_name: &str, topic_id: u32, offset: u64) -> Result<()> {
        let path = self.path(consumer_name, topic_id);
        let tmp = path.with_extension("tmp");

        let record = PersistedOffset {
            consumer: consumer_name.to_string(),
            topic_id,
            offset,
        };
        let body = serde_json::to_string(&record)?;

        if let Err(e) = tokio::fs::write(&tmp, &body).await {
            error!(path = %tmp.display(), error = %e, "failed to write offset tmp file");
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            error!(path = %path.display(), error = %e, "failed to rename offset tmp file into place");
            return Err(e.into());
        }
        Ok(())
    }

    async fn delete(&self, consumer_name: &str, topic_id: u32) -> Result<()> {
        let path = self.path(consumer_name, topic_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) | Err(_) if !path.exists() => Ok(()),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to delete offset file");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_round_trips() {
        let store = MemoryOffsetStore::new();
        assert_eq!(store.load("c", 1).await.unwrap(), None);
        store.save("c", 1, 42).await.unwrap();
        assert_eq!(store.load("c", 1).await.unwrap(), Some(42));
        store.delete("c", 1).await.unwrap();
        assert_eq!(store.load("c", 1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn file_store_atomic_persistence_vector() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileOffsetStore::new(dir.path()).unwrap();

        store.save("grp/w-1", 1, 100).await.unwrap();

        let path = dir.path().join("grp_w-1_1.offset");
        assert!(path.exists());
        let contents = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed["consumer"], "grp/w-1");
        assert_eq!(parsed["topic_id"], 1);
        assert_eq!(parsed["offset"], 100);

        assert_eq!(store.load("grp/w-1", 1).await.unwrap(), Some(100));
    }

    #[tokio::test]
    async fn file_store_load_returns_none_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileOffsetStore::new(dir.path()).unwrap();
        assert_eq!(store.load("nope", 1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn file_store_load_returns_none_for_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileOffsetStore::new(dir.path()).unwrap();
        std::fs::write(dir.path().join("c_1.offset"), b"not json").unwrap();
        assert_eq!(store.load("c", 1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn file_store_delete_tolerates_absent_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileOffsetStore::new(dir.path()).unwrap();
        store.delete("never-saved", 1).await.unwrap();
    }

    #[tokio::test]
    async fn file_store_crash_between_tmp_write_and_rename_keeps_prior_offset() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileOffsetStore::new(dir.path()).unwrap();

        store.save("c", 1, 1).await.unwrap();
        // Simulate a crash after the .tmp write but before the rename: the
        // target file is untouched by a dangling .tmp.
        let tmp_path = dir.path().join("c_1.tmp");
        std::fs::write(&tmp_path, b"{\"consumer\":\"c\",\"topic_id\":1,\"offset\":2}").unwrap();

        assert_eq!(store.load("c", 1).await.unwrap(), Some(1));
    }
}
