//! Storage backends behind a document handle
//!
//! A backend only moves whole documents as strings; caching, ordering and
//! parsing live in [`crate::store::Document`].

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Trait for the physical storage of documents
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    /// Create the parent directory of `path` if needed.
    ///
    /// Returns `true` when the directory did not exist before this call.
    async fn prepare(&self, path: &Path) -> io::Result<bool>;

    /// Read a whole document, `None` when it does not exist
    async fn load(&self, path: &Path) -> io::Result<Option<String>>;

    /// Replace a whole document
    async fn store(&self, path: &Path, contents: String) -> io::Result<()>;
}

/// Filesystem backend using `tokio::fs`
#[derive(Debug, Default, Clone)]
pub struct FsBackend;

impl FsBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DocumentBackend for FsBackend {
    async fn prepare(&self, path: &Path) -> io::Result<bool> {
        let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
            return Ok(false);
        };

        if tokio::fs::try_exists(parent).await? {
            return Ok(false);
        }

        tokio::fs::create_dir_all(parent).await?;
        debug!("Created document directory {}", parent.display());
        Ok(true)
    }

    async fn load(&self, path: &Path) -> io::Result<Option<String>> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn store(&self, path: &Path, contents: String) -> io::Result<()> {
        tokio::fs::write(path, contents).await
    }
}

/// In-memory backend for tests.
///
/// Supports queued per-write delays and failures, and records the order in
/// which writes complete.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    files: Mutex<HashMap<PathBuf, String>>,
    directories: Mutex<HashSet<PathBuf>>,
    write_delays: Mutex<VecDeque<Duration>>,
    write_failures: Mutex<VecDeque<bool>>,
    completed_writes: Mutex<Vec<(PathBuf, String)>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset a document, marking its directory as existing
    pub fn with_file(self, path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if let Ok(mut dirs) = self.directories.lock() {
                dirs.insert(parent.to_path_buf());
            }
        }
        if let Ok(mut files) = self.files.lock() {
            files.insert(path, contents.into());
        }
        self
    }

    /// Mark a directory as already existing
    pub fn with_directory(self, path: impl Into<PathBuf>) -> Self {
        if let Ok(mut dirs) = self.directories.lock() {
            dirs.insert(path.into());
        }
        self
    }

    /// Delay the next writes, in order, by the given durations
    pub fn delay_writes(&self, delays: impl IntoIterator<Item = Duration>) {
        if let Ok(mut queue) = self.write_delays.lock() {
            queue.extend(delays);
        }
    }

    /// Make the next writes fail (`true`) or succeed (`false`), in order
    pub fn fail_writes(&self, outcomes: impl IntoIterator<Item = bool>) {
        if let Ok(mut queue) = self.write_failures.lock() {
            queue.extend(outcomes);
        }
    }

    /// Current contents of a document
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<String> {
        self.files
            .lock()
            .ok()
            .and_then(|files| files.get(path.as_ref()).cloned())
    }

    /// Writes in completion order
    pub fn completed_writes(&self) -> Vec<(PathBuf, String)> {
        self.completed_writes
            .lock()
            .map(|writes| writes.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentBackend for InMemoryBackend {
    async fn prepare(&self, path: &Path) -> io::Result<bool> {
        let Some(parent) = path.parent() else {
            return Ok(false);
        };
        let mut dirs = self
            .directories
            .lock()
            .map_err(|_| io::Error::other("directory lock poisoned"))?;
        Ok(dirs.insert(parent.to_path_buf()))
    }

    async fn load(&self, path: &Path) -> io::Result<Option<String>> {
        let files = self
            .files
            .lock()
            .map_err(|_| io::Error::other("file lock poisoned"))?;
        Ok(files.get(path).cloned())
    }

    async fn store(&self, path: &Path, contents: String) -> io::Result<()> {
        let delay = self
            .write_delays
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front());
        if let Some(delay) = delay {
            sleep(delay).await;
        }

        let fail = self
            .write_failures
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or(false);
        if fail {
            return Err(io::Error::other("injected write failure"));
        }

        {
            let mut files = self
                .files
                .lock()
                .map_err(|_| io::Error::other("file lock poisoned"))?;
            files.insert(path.to_path_buf(), contents.clone());
        }
        if let Ok(mut writes) = self.completed_writes.lock() {
            writes.push((path.to_path_buf(), contents));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fs_backend_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("doc.json");
        let backend = FsBackend::new();

        assert!(backend.prepare(&path).await.unwrap());
        assert!(!backend.prepare(&path).await.unwrap());
        assert_eq!(backend.load(&path).await.unwrap(), None);

        backend.store(&path, "[]".to_string()).await.unwrap();
        assert_eq!(backend.load(&path).await.unwrap().as_deref(), Some("[]"));
    }

    #[tokio::test]
    async fn test_in_memory_backend_injected_failure() {
        let backend = InMemoryBackend::new();
        backend.fail_writes([true]);

        let path = Path::new("data/doc.json");
        assert!(backend.store(path, "1".to_string()).await.is_err());
        backend.store(path, "2".to_string()).await.unwrap();

        assert_eq!(backend.contents(path).as_deref(), Some("2"));
        assert_eq!(backend.completed_writes().len(), 1);
    }
}
