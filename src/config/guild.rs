//! Per-guild settings and the provider that serves them

use crate::config::app::AppConfig;
use crate::error::Result;
use crate::types::GuildId;
use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Settings of one guild
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuildSettings {
    /// Region tag to externally managed grant id. An empty id registers the
    /// region without a grant.
    pub regions: BTreeMap<String, String>,
    /// Grant given to every registered player
    pub registered_role: Option<String>,
    /// Parent category for lobby voice rooms
    pub voice_category_id: Option<String>,
    /// Roster cap used when balancing
    pub lobby_capacity: usize,
    pub voice_bitrate: u32,
}

impl Default for GuildSettings {
    fn default() -> Self {
        let regions = ["eu", "na"]
            .into_iter()
            .map(|r| (r.to_string(), String::new()))
            .collect();

        Self {
            regions,
            registered_role: None,
            voice_category_id: None,
            lobby_capacity: 12,
            voice_bitrate: 96000,
        }
    }
}

impl GuildSettings {
    /// Region tags a player may choose, sorted
    pub fn valid_regions(&self) -> Vec<String> {
        self.regions.keys().cloned().collect()
    }

    /// Grant tied to a region, if any
    pub fn region_grant(&self, region: &str) -> Option<&str> {
        self.regions
            .get(region)
            .map(String::as_str)
            .filter(|id| !id.is_empty())
    }

    pub fn validate(&self) -> Result<()> {
        if self.lobby_capacity == 0 {
            return Err(anyhow!("Lobby capacity must be greater than 0"));
        }
        if self.voice_bitrate == 0 {
            return Err(anyhow!("Voice bitrate must be greater than 0"));
        }
        for region in self.regions.keys() {
            if region.is_empty()
                || region.chars().any(|c| c.is_whitespace() || c == ',')
                || region.to_lowercase() != *region
            {
                return Err(anyhow!(
                    "Region tags must be lowercase single words: '{}'",
                    region
                ));
            }
            if region == "none" || region == "and" {
                return Err(anyhow!("Region tag '{}' is reserved", region));
            }
        }
        Ok(())
    }
}

/// Trait for looking up guild settings
pub trait GuildConfigProvider: Send + Sync {
    /// Settings for a guild. Treated as read-only by callers.
    fn guild_settings(&self, guild_id: &GuildId) -> Result<GuildSettings>;
}

/// Provider backed by the loaded application configuration
#[derive(Debug, Clone, Default)]
pub struct StaticGuildConfigProvider {
    config: AppConfig,
}

impl StaticGuildConfigProvider {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Same settings for every guild
    pub fn uniform(settings: GuildSettings) -> Self {
        Self {
            config: AppConfig {
                guild_defaults: settings,
                ..AppConfig::default()
            },
        }
    }
}

impl GuildConfigProvider for StaticGuildConfigProvider {
    fn guild_settings(&self, guild_id: &GuildId) -> Result<GuildSettings> {
        Ok(self.config.guild(guild_id).clone())
    }
}
