//! Configuration management for the lobby service
//!
//! This module handles configuration loading from TOML files and environment
//! variables, validation, default values, and per-guild settings lookup.

pub mod app;
pub mod guild;

// Re-export commonly used types
pub use app::{validate_config, AppConfig, RegistrationSettings, ServiceSettings, StorageSettings};
pub use guild::{GuildConfigProvider, GuildSettings, StaticGuildConfigProvider};
