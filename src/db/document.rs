//! A typed JSON document kept in memory and mirrored to a single file.
//!
//! All writers in the process go through the mutex so read-modify-write
//! cycles never interleave. The file is re-read under the lock before each
//! access, which picks up changes made by another process such as the CLI.
//! Every mutation is written to a sibling temp file and renamed over the
//! target, so a crash mid-write leaves the previous version intact.

use anyhow::{Context, Result};
use serde::{Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub struct JsonDocument<T> {
    path: PathBuf,
    inner: Mutex<T>,
}

impl<T> JsonDocument<T>
where
    T: Serialize + DeserializeOwned + Default + Clone + PartialEq + Send,
{
    /// Loads the document from `path`, or starts from `T::default()` when the
    /// file does not exist yet. Nothing is written until the first change.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let value = load(&path).await?.unwrap_or_default();

        Ok(Self {
            path,
            inner: Mutex::new(value),
        })
    }

    /// Runs `f` against the current file contents. If the file cannot be
    /// read the last known value is used.
    pub async fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let mut guard = self.inner.lock().await;
        match load(&self.path).await {
            Ok(Some(value)) => *guard = value,
            Ok(None) => {}
            Err(e) => warn!("Using cached {}: {e:#}", self.path.display()),
        }
        f(&guard)
    }

    /// Applies `f` to a copy of the freshly loaded document and persists it.
    ///
    /// The in-memory value only changes once the file has been replaced, so
    /// a failed write leaves both in their previous state. When `f` leaves the
    /// document unchanged nothing is written.
    pub async fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let mut guard = self.inner.lock().await;
        if let Some(value) = load(&self.path).await? {
            *guard = value;
        }

        let mut next = guard.clone();
        let out = f(&mut next);

        if next != *guard {
            self.persist(&next).await?;
            *guard = next;
        }

        Ok(out)
    }

    async fn persist(&self, value: &T) -> Result<()> {
        let json = serde_json::to_vec_pretty(value)?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("Invalid document path: {}", self.path.display()))?
            .to_string_lossy();
        let tmp_path = self
            .path
            .with_file_name(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4().simple()));

        let write = async {
            let mut file = fs::File::create(&tmp_path).await?;
            file.write_all(&json).await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, &self.path).await
        };

        if let Err(e) = write.await {
            fs::remove_file(&tmp_path).await.ok();
            return Err(e).with_context(|| format!("Failed to write {}", self.path.display()));
        }

        debug!(path = %self.path.display(), bytes = json.len(), "Document persisted");
        Ok(())
    }
}

/// `None` when the file does not exist yet. A blank file reads as the default.
async fn load<T: DeserializeOwned + Default>(path: &Path) -> Result<Option<T>> {
    match fs::read(path).await {
        Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Some(T::default())),
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .with_context(|| format!("Failed to parse {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}
