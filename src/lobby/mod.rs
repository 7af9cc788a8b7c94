//! Lobby management for the PUG service
//!
//! Each guild has one [`LobbyManager`] that owns its lobby roster and player
//! profiles and composes the registration engine and the team balancer.

pub mod instance;
pub mod manager;

// Re-export commonly used types
pub use instance::{Lobby, DEFAULT_CAPACITY, VOICE_ROOM_SUFFIXES};
pub use manager::{BalanceResult, JoinOutcome, LobbyManager, LobbyManagerStats, TEAM_COUNT};
