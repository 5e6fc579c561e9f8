//! Persistence of the subscription list.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::Entity;
use crate::utils::fs;
use crate::{Error, Result};

/// Storage backend for registry snapshots.
#[async_trait]
pub trait RegistryStore: Send + Sync + 'static {
    /// Load the full, ordered subscription list.
    async fn load_snapshot(&self) -> Result<Vec<Entity>>;

    /// Atomically replace the stored list.
    async fn save_snapshot(&self, entities: &[Entity]) -> Result<()>;

    /// Whether the store was modified by someone else since the last
    /// load or save.
    async fn poll_for_external_change(&self) -> Result<bool>;
}

/// On-disk document.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    entities: Vec<Entity>,
}

/// Registry persisted as pretty-printed JSON.
pub struct FileRegistryStore {
    path: PathBuf,
    /// Modification time observed at the last load or own write.
    last_seen: Mutex<Option<SystemTime>>,
}

impl FileRegistryStore {
    /// Open the store at `path`. A directory at `path` is a fatal error.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if path.is_dir() {
            return Err(Error::config(format!(
                "registry path {} is a directory",
                path.display()
            )));
        }
        Ok(Self {
            path,
            last_seen: Mutex::new(None),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn modified_time(&self) -> Result<Option<SystemTime>> {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) => Ok(meta.modified().ok()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io_path("reading registry metadata", &self.path, e)),
        }
    }

    fn parse(text: &str, path: &Path) -> Result<Vec<Entity>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let file: RegistryFile = serde_json::from_str(text).map_err(|e| {
            Error::config(format!("malformed registry {}: {}", path.display(), e))
        })?;

        let mut seen = HashSet::new();
        for entity in &file.entities {
            Entity::validate_id(entity.id)?;
            if !seen.insert(entity.id) {
                return Err(Error::config(format!(
                    "duplicate entity id {} in {}",
                    entity.id,
                    path.display()
                )));
            }
        }
        Ok(file.entities)
    }

    fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::ensure_dir_all_sync_with_op("creating registry directory", &dir)?;

        let mut temp = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|e| Error::io_path("creating registry temp file", &dir, e))?;
        temp.write_all(bytes)
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|e| Error::io_path("writing registry temp file", temp.path(), e))?;
        temp.persist(path)
            .map_err(|e| Error::io_path("replacing registry", path, e.error))?;
        Ok(())
    }
}

#[async_trait]
impl RegistryStore for FileRegistryStore {
    async fn load_snapshot(&self) -> Result<Vec<Entity>> {
        let modified = self.modified_time().await?;
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Registry file missing, starting empty");
                *self.last_seen.lock() = None;
                return Ok(Vec::new());
            }
            Err(e) => return Err(Error::io_path("reading registry", &self.path, e)),
        };

        let entities = Self::parse(&text, &self.path)?;
        *self.last_seen.lock() = modified;
        debug!(path = %self.path.display(), count = entities.len(), "Registry loaded");
        Ok(entities)
    }

    async fn save_snapshot(&self, entities: &[Entity]) -> Result<()> {
        let file = RegistryFile {
            entities: entities.to_vec(),
        };
        let mut bytes = serde_json::to_vec_pretty(&file)?;
        bytes.push(b'\n');

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::write_atomic(&path, &bytes))
            .await
            .map_err(|e| Error::Other(format!("registry write task failed: {}", e)))??;

        *self.last_seen.lock() = self.modified_time().await?;
        info!(path = %self.path.display(), count = entities.len(), "Registry saved");
        Ok(())
    }

    async fn poll_for_external_change(&self) -> Result<bool> {
        let current = self.modified_time().await?;
        let last = *self.last_seen.lock();
        Ok(current != last)
    }
}
