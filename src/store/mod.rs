//! Document persistence for lobby rosters and player profiles
//!
//! Each guild owns two independent documents, one per collection. They have
//! separate write queues and no atomicity between them.

pub mod backend;
pub mod document;

pub use backend::{DocumentBackend, FsBackend, InMemoryBackend};
pub use document::Document;

use crate::lobby::Lobby;
use crate::types::{GuildId, ProfileBook};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Factory for the per-guild documents under one data directory
#[derive(Clone)]
pub struct DocumentStore {
    data_dir: PathBuf,
    backend: Arc<dyn DocumentBackend>,
}

impl DocumentStore {
    pub fn new(data_dir: impl Into<PathBuf>, backend: Arc<dyn DocumentBackend>) -> Self {
        Self {
            data_dir: data_dir.into(),
            backend,
        }
    }

    /// Store on the local filesystem
    pub fn filesystem(data_dir: impl Into<PathBuf>) -> Self {
        Self::new(data_dir, Arc::new(FsBackend::new()))
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn lobbies_path(&self, guild_id: &GuildId) -> PathBuf {
        self.data_dir.join("lobbies").join(format!("{}.json", guild_id))
    }

    pub fn profiles_path(&self, guild_id: &GuildId) -> PathBuf {
        self.data_dir.join("players").join(format!("{}.json", guild_id))
    }

    /// Lobby roster document of a guild
    pub fn open_lobbies(&self, guild_id: &GuildId) -> Document<Vec<Lobby>> {
        Document::open(
            self.lobbies_path(guild_id),
            Vec::new(),
            self.backend.clone(),
        )
    }

    /// Player profile document of a guild
    pub fn open_profiles(&self, guild_id: &GuildId) -> Document<ProfileBook> {
        Document::open(
            self.profiles_path(guild_id),
            ProfileBook::new(),
            self.backend.clone(),
        )
    }
}
