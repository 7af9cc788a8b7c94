//! Error types for the PUG lobby service
//!
//! Operations return `anyhow::Result`; the typed enums below are what callers
//! downcast to when deciding between a user-facing reply and a hard failure.

use crate::types::PlayerId;

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Coarse classification of lobby failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// A lobby or player lookup missed
    NotFound,
    /// The request conflicts with current state or the caller's rights
    Precondition,
}

/// Lobby and roster failures surfaced to the requester
#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    #[error("Lobby not found: {name}")]
    LobbyNotFound { name: String },

    #[error("Player not registered: {player_id}")]
    PlayerNotFound { player_id: PlayerId },

    #[error("Player {player_id} is not in a lobby")]
    NotInLobby { player_id: PlayerId },

    #[error("There are no open lobbies")]
    NoOpenLobbies,

    #[error("A lobby named {name} already exists")]
    DuplicateLobbyName { name: String },

    #[error("Already a member of lobby {name}")]
    AlreadyInLobby { name: String },

    #[error("Only the owner of lobby {name} can do that")]
    NotLobbyOwner { name: String },

    #[error("There are {count} open lobbies, please specify one")]
    AmbiguousLobby { count: usize },

    #[error("Players still completing registration: {}", players.join(", "))]
    IncompleteRegistrations { players: Vec<PlayerId> },

    #[error("Team count must be at least 1")]
    InvalidTeamCount,

    #[error("Profile for {player_id} has no roles")]
    InvalidProfile { player_id: PlayerId },
}

impl LobbyError {
    /// Which part of the error taxonomy this failure belongs to
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::LobbyNotFound { .. }
            | Self::PlayerNotFound { .. }
            | Self::NotInLobby { .. }
            | Self::NoOpenLobbies => FailureKind::NotFound,
            Self::DuplicateLobbyName { .. }
            | Self::AlreadyInLobby { .. }
            | Self::NotLobbyOwner { .. }
            | Self::AmbiguousLobby { .. }
            | Self::IncompleteRegistrations { .. }
            | Self::InvalidTeamCount
            | Self::InvalidProfile { .. } => FailureKind::Precondition,
        }
    }

    /// Static label for metrics
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::LobbyNotFound { .. } => "lobby_not_found",
            Self::PlayerNotFound { .. } => "player_not_found",
            Self::NotInLobby { .. } => "not_in_lobby",
            Self::NoOpenLobbies => "no_open_lobbies",
            Self::DuplicateLobbyName { .. } => "duplicate_lobby_name",
            Self::AlreadyInLobby { .. } => "already_in_lobby",
            Self::NotLobbyOwner { .. } => "not_lobby_owner",
            Self::AmbiguousLobby { .. } => "ambiguous_lobby",
            Self::IncompleteRegistrations { .. } => "incomplete_registrations",
            Self::InvalidTeamCount => "invalid_team_count",
            Self::InvalidProfile { .. } => "invalid_profile",
        }
    }
}

/// Malformed registration input. The message doubles as the re-prompt text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("No valid regions specified! Please try again.")]
    NoValidRegions,

    #[error("Invalid BattleTag! Use the format Name#1234 (note that this is *not* your chat username).")]
    InvalidBattleTag,

    #[error("Invalid SR!")]
    InvalidSkillRating,

    #[error("Very funny.")]
    UnrealisticSkillRating,

    #[error("{token} is not a valid role")]
    UnknownRole { token: String },

    #[error("Please name at least one role.")]
    NoRoles,
}

/// Document store failures (the persistence error family)
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Document not found: {path}")]
    NotFound { path: String },

    #[error("Failed to parse document {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Failed to serialize document {path}: {message}")]
    Serialize { path: String, message: String },

    #[error("I/O error on document {path}: {message}")]
    Io { path: String, message: String },

    #[error("Document {path} is unusable after an earlier parse failure")]
    Poisoned { path: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lobby_error_kinds() {
        let missing = LobbyError::LobbyNotFound {
            name: "scrims".to_string(),
        };
        assert_eq!(missing.kind(), FailureKind::NotFound);
        assert_eq!(missing.error_code(), "lobby_not_found");

        let duplicate = LobbyError::DuplicateLobbyName {
            name: "scrims".to_string(),
        };
        assert_eq!(duplicate.kind(), FailureKind::Precondition);
    }

    #[test]
    fn test_incomplete_registrations_names_offenders() {
        let error = LobbyError::IncompleteRegistrations {
            players: vec!["alice".to_string(), "bob".to_string()],
        };
        assert_eq!(
            error.to_string(),
            "Players still completing registration: alice, bob"
        );
    }

    #[test]
    fn test_validation_messages_are_replies() {
        let error = ValidationError::UnknownRole {
            token: "healer".to_string(),
        };
        assert_eq!(error.to_string(), "healer is not a valid role");
        assert_eq!(
            ValidationError::UnrealisticSkillRating.to_string(),
            "Very funny."
        );
    }

    #[test]
    fn test_downcast_through_anyhow() {
        let error: anyhow::Error = LobbyError::NoOpenLobbies.into();
        assert!(matches!(
            error.downcast_ref::<LobbyError>(),
            Some(LobbyError::NoOpenLobbies)
        ));
    }
}
