//! Common types used throughout the lobby service

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Opaque, externally assigned user identifier
pub type PlayerId = String;

/// Identifier of the community (guild) a lobby lives in
pub type GuildId = String;

/// Identifier of a community text channel
pub type ChannelId = String;

/// Handle of an externally provisioned voice room
pub type RoomId = String;

/// Registered profiles of one guild, keyed by user
pub type ProfileBook = BTreeMap<PlayerId, PlayerProfile>;

/// Highest skill rating accepted during registration
pub const MAX_SKILL_RATING: u32 = 5000;

/// Canonical in-game roles.
///
/// Variant order is the alphabetical order of the tags, which is the order
/// teams are sorted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Dps,
    Support,
    Tank,
}

impl Role {
    /// Every role, in the order a flex player lists them
    pub const ALL: [Role; 3] = [Role::Dps, Role::Tank, Role::Support];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Dps => "dps",
            Role::Support => "support",
            Role::Tank => "tank",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "dps" => Ok(Role::Dps),
            "support" => Ok(Role::Support),
            "tank" => Ok(Role::Tank),
            _ => Err(()),
        }
    }
}

/// A completed player registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerProfile {
    pub id: PlayerId,
    pub regions: Vec<String>,
    pub battle_tag: String,
    /// 0 means unranked
    pub skill_rating: u32,
    /// Preference order matters to the balancer
    pub roles: Vec<Role>,
    pub voice_preference: bool,
}

impl PlayerProfile {
    pub fn is_unranked(&self) -> bool {
        self.skill_rating == 0
    }
}

/// Where an inbound message was posted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelKind {
    /// Private conversation between the bot and one user
    Direct,
    /// A text channel of a guild
    Community {
        guild_id: GuildId,
        channel_id: ChannelId,
    },
}

/// A chat message delivered to the service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub sender_id: PlayerId,
    pub channel: ChannelKind,
    pub text: String,
}

impl InboundMessage {
    pub fn direct(sender_id: impl Into<PlayerId>, text: impl Into<String>) -> Self {
        Self {
            sender_id: sender_id.into(),
            channel: ChannelKind::Direct,
            text: text.into(),
        }
    }

    pub fn is_direct(&self) -> bool {
        matches!(self.channel, ChannelKind::Direct)
    }
}

/// Destination of an outbound reply
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReplyTarget {
    /// Direct conversation with a user
    User(PlayerId),
    /// A guild text channel
    Channel(ChannelId),
}

impl fmt::Display for ReplyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplyTarget::User(id) => write!(f, "dm:{}", id),
            ReplyTarget::Channel(id) => write!(f, "#{}", id),
        }
    }
}
