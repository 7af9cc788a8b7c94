//! Lobby record as persisted in the guild roster document

use crate::types::{PlayerId, RoomId};
use serde::{Deserialize, Serialize};

/// Default roster cap
pub const DEFAULT_CAPACITY: usize = 12;

/// Suffixes of the voice rooms every lobby gets, in creation order
pub const VOICE_ROOM_SUFFIXES: [&str; 3] = ["Lobby", "Team 1", "Team 2"];

/// A named play session within a guild
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lobby {
    /// Creator of the lobby
    pub owner: PlayerId,
    pub name: String,
    /// Lobby room, then one room per team
    pub voice_room_ids: Vec<RoomId>,
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Join order, no duplicates
    #[serde(default)]
    pub members: Vec<PlayerId>,
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

impl Lobby {
    pub fn new(owner: impl Into<PlayerId>, name: impl Into<String>, capacity: usize) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            voice_room_ids: Vec::new(),
            capacity,
            members: Vec::new(),
        }
    }

    /// Names of the voice rooms to create for a lobby
    pub fn voice_room_names(name: &str) -> Vec<String> {
        VOICE_ROOM_SUFFIXES
            .iter()
            .map(|suffix| format!("{} - {}", name, suffix))
            .collect()
    }

    /// Case-insensitive name comparison
    pub fn is_named(&self, name: &str) -> bool {
        self.name.to_lowercase() == name.trim().to_lowercase()
    }

    pub fn is_owned_by(&self, player_id: &PlayerId) -> bool {
        self.owner == *player_id
    }

    pub fn contains(&self, player_id: &PlayerId) -> bool {
        self.members.contains(player_id)
    }

    /// Append a member; false if already present
    pub fn add_member(&mut self, player_id: PlayerId) -> bool {
        if self.contains(&player_id) {
            return false;
        }
        self.members.push(player_id);
        true
    }

    /// Remove a member; false if absent
    pub fn remove_member(&mut self, player_id: &PlayerId) -> bool {
        let before = self.members.len();
        self.members.retain(|member| member != player_id);
        self.members.len() != before
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_membership_has_no_duplicates() {
        let mut lobby = Lobby::new("owner", "Scrims", DEFAULT_CAPACITY);

        assert!(lobby.add_member("a".to_string()));
        assert!(!lobby.add_member("a".to_string()));
        assert!(lobby.add_member("b".to_string()));
        assert_eq!(lobby.members, vec!["a", "b"]);

        assert!(lobby.remove_member(&"a".to_string()));
        assert!(!lobby.remove_member(&"a".to_string()));
        assert_eq!(lobby.member_count(), 1);
    }

    #[test]
    fn test_name_matching_ignores_case() {
        let lobby = Lobby::new("owner", "Friday Scrims", DEFAULT_CAPACITY);
        assert!(lobby.is_named("friday scrims"));
        assert!(lobby.is_named("FRIDAY SCRIMS "));
        assert!(!lobby.is_named("friday"));
    }

    #[test]
    fn test_voice_room_names() {
        assert_eq!(
            Lobby::voice_room_names("Scrims"),
            vec!["Scrims - Lobby", "Scrims - Team 1", "Scrims - Team 2"]
        );
    }

    #[test]
    fn test_serialized_shape() {
        let mut lobby = Lobby::new("owner", "Scrims", 12);
        lobby.voice_room_ids = vec!["r1".to_string()];
        lobby.add_member("a".to_string());

        let json = serde_json::to_value(&lobby).unwrap();
        assert_eq!(json["voiceRoomIds"][0], "r1");
        assert_eq!(json["members"][0], "a");
        assert_eq!(json["capacity"], 12);

        let restored: Lobby =
            serde_json::from_str(r#"{"owner":"o","name":"n","voiceRoomIds":[]}"#).unwrap();
        assert_eq!(restored.capacity, DEFAULT_CAPACITY);
        assert!(restored.members.is_empty());
    }
}
