//! Main application configuration
//!
//! This module defines the primary configuration structures for the service,
//! loaded from a TOML file or environment variables and then validated.

use crate::config::guild::GuildSettings;
use crate::types::GuildId;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub storage: StorageSettings,
    pub registration: RegistrationSettings,
    /// Settings for guilds without an explicit entry
    pub guild_defaults: GuildSettings,
    /// Per-guild overrides
    pub guilds: HashMap<GuildId, GuildSettings>,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

/// Where documents are kept
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub data_dir: PathBuf,
}

/// Registration conversation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationSettings {
    /// Conversations idle longer than this are dropped
    pub idle_timeout_seconds: u64,
    /// How often idle conversations are swept
    pub sweep_interval_seconds: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "pug-lobby".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

impl Default for RegistrationSettings {
    fn default() -> Self {
        Self {
            idle_timeout_seconds: 1800, // 30 minutes
            sweep_interval_seconds: 60,
        }
    }
}

impl RegistrationSettings {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file; environment variables still win
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config = Self::from_toml(&raw)?;
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Parse a TOML document without touching the environment
    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| anyhow!("Invalid configuration: {}", e))
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(name) = env::var("SERVICE_NAME") {
            self.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            self.service.log_level = log_level;
        }
        if let Ok(data_dir) = env::var("DATA_DIR") {
            self.storage.data_dir = PathBuf::from(data_dir);
        }
        if let Ok(timeout) = env::var("REGISTRATION_IDLE_TIMEOUT_SECONDS") {
            self.registration.idle_timeout_seconds = timeout.parse().map_err(|_| {
                anyhow!("Invalid REGISTRATION_IDLE_TIMEOUT_SECONDS value: {}", timeout)
            })?;
        }
        if let Ok(interval) = env::var("REGISTRATION_SWEEP_INTERVAL_SECONDS") {
            self.registration.sweep_interval_seconds = interval.parse().map_err(|_| {
                anyhow!(
                    "Invalid REGISTRATION_SWEEP_INTERVAL_SECONDS value: {}",
                    interval
                )
            })?;
        }
        Ok(())
    }

    /// Settings for one guild
    pub fn guild(&self, guild_id: &GuildId) -> &GuildSettings {
        self.guilds.get(guild_id).unwrap_or(&self.guild_defaults)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    if config.storage.data_dir.as_os_str().is_empty() {
        return Err(anyhow!("Data directory cannot be empty"));
    }

    if config.registration.idle_timeout_seconds == 0 {
        return Err(anyhow!("Registration idle timeout must be greater than 0"));
    }
    if config.registration.sweep_interval_seconds == 0 {
        return Err(anyhow!("Registration sweep interval must be greater than 0"));
    }

    config
        .guild_defaults
        .validate()
        .context("Invalid guild defaults")?;
    for (guild_id, settings) in &config.guilds {
        settings
            .validate()
            .with_context(|| format!("Invalid settings for guild {}", guild_id))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        validate_config(&config).unwrap();
        assert_eq!(config.guild_defaults.lobby_capacity, 12);
        assert_eq!(config.registration.idle_timeout(), Duration::from_secs(1800));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [storage]
            data_dir = "/var/lib/pugs"

            [guilds.123]
            registered_role = "555"
            lobby_capacity = 10

            [guilds.123.regions]
            eu = "1001"
            na = "1002"
            "#,
        )
        .unwrap();
        validate_config(&config).unwrap();

        assert_eq!(config.storage.data_dir, PathBuf::from("/var/lib/pugs"));
        assert_eq!(config.service.log_level, "info");

        let guild = config.guild(&"123".to_string());
        assert_eq!(guild.lobby_capacity, 10);
        assert_eq!(guild.registered_role.as_deref(), Some("555"));
        assert_eq!(guild.region_grant("na"), Some("1002"));

        // Unknown guilds fall back to defaults
        assert_eq!(config.guild(&"999".to_string()).lobby_capacity, 12);
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let mut config = AppConfig::default();
        config.service.log_level = "loud".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut config = AppConfig::default();
        config
            .guilds
            .insert("1".to_string(), GuildSettings {
                lobby_capacity: 0,
                ..GuildSettings::default()
            });
        assert!(validate_config(&config).is_err());
    }
}
