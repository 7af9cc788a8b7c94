//! Lazily loaded JSON document with serialized writes
//!
//! A [`Document`] binds one backing path. The first read loads and caches the
//! value; later reads never touch the backend again. Writes persist whatever
//! the cached value is when the write runs, and queue behind each other in
//! call order so at most one physical write per handle is in flight.

use crate::error::StoreError;
use crate::store::backend::DocumentBackend;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, error, info, warn};

/// In-memory state of a handle
#[derive(Debug)]
enum DocumentState<T> {
    /// Nothing read yet
    Unloaded,
    /// Cached value, authoritative for writes
    Loaded(T),
    /// The backing document failed to parse
    Poisoned(String),
}

/// Handle to a single persisted document
pub struct Document<T> {
    path: PathBuf,
    default: T,
    backend: Arc<dyn DocumentBackend>,
    /// Set once the parent directory has been prepared; holds whether it was
    /// freshly created
    initialized: OnceCell<bool>,
    state: Mutex<DocumentState<T>>,
    /// FIFO turnstile for writes
    write_queue: Mutex<()>,
}

impl<T> Document<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    /// Open a handle. No I/O happens until the first read or write.
    pub fn open(path: impl Into<PathBuf>, default: T, backend: Arc<dyn DocumentBackend>) -> Self {
        Self {
            path: path.into(),
            default,
            backend,
            initialized: OnceCell::new(),
            state: Mutex::new(DocumentState::Unloaded),
            write_queue: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn display_path(&self) -> String {
        self.path.display().to_string()
    }

    /// Prepare the parent directory, once per handle
    async fn init(&self) -> Result<bool, StoreError> {
        let created = self
            .initialized
            .get_or_try_init(|| async {
                self.backend
                    .prepare(&self.path)
                    .await
                    .map_err(|e| StoreError::Io {
                        path: self.display_path(),
                        message: e.to_string(),
                    })
            })
            .await?;
        Ok(*created)
    }

    /// Load into `state` if nothing is cached yet
    async fn ensure_loaded(&self, state: &mut DocumentState<T>) -> Result<(), StoreError> {
        match state {
            DocumentState::Loaded(_) => return Ok(()),
            DocumentState::Poisoned(_) => {
                return Err(StoreError::Poisoned {
                    path: self.display_path(),
                })
            }
            DocumentState::Unloaded => {}
        }

        let freshly_created = self.init().await?;
        let raw = self
            .backend
            .load(&self.path)
            .await
            .map_err(|e| StoreError::Io {
                path: self.display_path(),
                message: e.to_string(),
            })?;

        match raw {
            Some(raw) => match serde_json::from_str::<T>(&raw) {
                Ok(value) => {
                    debug!("Loaded document {}", self.path.display());
                    *state = DocumentState::Loaded(value);
                    Ok(())
                }
                Err(e) => {
                    error!(
                        "Document {} is corrupt, handle disabled: {}",
                        self.path.display(),
                        e
                    );
                    *state = DocumentState::Poisoned(e.to_string());
                    Err(StoreError::Parse {
                        path: self.display_path(),
                        message: e.to_string(),
                    })
                }
            },
            None if freshly_created => {
                info!(
                    "Document {} starts from its default value",
                    self.path.display()
                );
                *state = DocumentState::Loaded(self.default.clone());
                Ok(())
            }
            None => Err(StoreError::NotFound {
                path: self.display_path(),
            }),
        }
    }

    /// Current value, loading it on the first call only
    pub async fn read(&self) -> Result<T, StoreError> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await?;
        match &*state {
            DocumentState::Loaded(value) => Ok(value.clone()),
            _ => Err(StoreError::Poisoned {
                path: self.display_path(),
            }),
        }
    }

    /// Like [`Document::read`], but a missing document is seeded with the
    /// default value and persisted
    pub async fn read_or_seed(&self) -> Result<T, StoreError> {
        match self.read().await {
            Err(StoreError::NotFound { .. }) => {
                info!("Seeding missing document {}", self.path.display());
                {
                    let mut state = self.state.lock().await;
                    *state = DocumentState::Loaded(self.default.clone());
                }
                self.write().await?;
                Ok(self.default.clone())
            }
            other => other,
        }
    }

    /// Mutate the cached value in place (loading it first). Does not persist.
    pub async fn modify<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, StoreError> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await?;
        match &mut *state {
            DocumentState::Loaded(value) => Ok(f(value)),
            _ => Err(StoreError::Poisoned {
                path: self.display_path(),
            }),
        }
    }

    /// Persist the cached value.
    ///
    /// Calls run one at a time in the order they were made. A failed write is
    /// returned to its caller and does not block the writes queued after it.
    pub async fn write(&self) -> Result<(), StoreError> {
        let _turn = self.write_queue.lock().await;

        let contents = {
            let state = self.state.lock().await;
            match &*state {
                DocumentState::Loaded(value) => to_pretty_json(value).map_err(|e| {
                    StoreError::Serialize {
                        path: self.display_path(),
                        message: e.to_string(),
                    }
                })?,
                DocumentState::Unloaded => {
                    debug!(
                        "Skipping write of never-loaded document {}",
                        self.path.display()
                    );
                    return Ok(());
                }
                DocumentState::Poisoned(_) => {
                    return Err(StoreError::Poisoned {
                        path: self.display_path(),
                    })
                }
            }
        };

        self.init().await?;
        self.backend
            .store(&self.path, contents)
            .await
            .map_err(|e| {
                warn!("Write to {} failed: {}", self.path.display(), e);
                StoreError::Io {
                    path: self.display_path(),
                    message: e.to_string(),
                }
            })?;

        debug!("Persisted document {}", self.path.display());
        Ok(())
    }
}

/// JSON with 4-space indentation
fn to_pretty_json<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut serializer)?;
    // serde_json only emits valid UTF-8
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
