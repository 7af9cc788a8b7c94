//! Chat platform gateway
//!
//! Everything the core asks of the chat platform goes through
//! [`ChatGateway`]: replies, voice room provisioning and member grants.

use crate::error::Result;
use crate::types::{GuildId, PlayerId, ReplyTarget, RoomId};
use anyhow::anyhow;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Parameters for a voice room to create
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceRoomRequest {
    pub name: String,
    /// Parent category, if configured
    pub category_id: Option<String>,
    pub bitrate: u32,
}

/// Externally managed group tags to add to and remove from a member
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantChanges {
    pub add: Vec<String>,
    pub remove: Vec<String>,
}

impl GrantChanges {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

/// Trait for the chat platform the service runs in
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Send a message
    async fn send(&self, target: &ReplyTarget, text: &str) -> Result<()>;

    /// Create a voice room and return its handle
    async fn create_voice_room(&self, guild_id: &GuildId, request: &VoiceRoomRequest)
        -> Result<RoomId>;

    /// Delete a voice room
    async fn delete_voice_room(&self, guild_id: &GuildId, room_id: &RoomId) -> Result<()>;

    /// Add and remove member grants
    async fn update_member_grants(
        &self,
        guild_id: &GuildId,
        player_id: &PlayerId,
        changes: &GrantChanges,
    ) -> Result<()>;
}

/// Mock gateway that records every call for testing
#[derive(Debug, Default)]
pub struct MockChatGateway {
    sent: Mutex<Vec<(ReplyTarget, String)>>,
    created_rooms: Mutex<Vec<(RoomId, VoiceRoomRequest)>>,
    deleted_rooms: Mutex<Vec<RoomId>>,
    grant_updates: Mutex<Vec<(PlayerId, GrantChanges)>>,
    fail_room_creation: Mutex<bool>,
    fail_room_deletion: Mutex<bool>,
    fail_grants: Mutex<bool>,
}

impl MockChatGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages sent (for testing)
    pub fn sent_messages(&self) -> Vec<(ReplyTarget, String)> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }

    /// Messages sent to one target
    pub fn messages_to(&self, target: &ReplyTarget) -> Vec<String> {
        self.sent_messages()
            .into_iter()
            .filter(|(t, _)| t == target)
            .map(|(_, text)| text)
            .collect()
    }

    /// Last message sent to one target
    pub fn last_message_to(&self, target: &ReplyTarget) -> Option<String> {
        self.messages_to(target).pop()
    }

    pub fn created_rooms(&self) -> Vec<(RoomId, VoiceRoomRequest)> {
        self.created_rooms
            .lock()
            .map(|rooms| rooms.clone())
            .unwrap_or_default()
    }

    pub fn deleted_rooms(&self) -> Vec<RoomId> {
        self.deleted_rooms
            .lock()
            .map(|rooms| rooms.clone())
            .unwrap_or_default()
    }

    pub fn grant_updates(&self) -> Vec<(PlayerId, GrantChanges)> {
        self.grant_updates
            .lock()
            .map(|updates| updates.clone())
            .unwrap_or_default()
    }

    pub fn set_fail_room_creation(&self, fail: bool) {
        if let Ok(mut flag) = self.fail_room_creation.lock() {
            *flag = fail;
        }
    }

    pub fn set_fail_room_deletion(&self, fail: bool) {
        if let Ok(mut flag) = self.fail_room_deletion.lock() {
            *flag = fail;
        }
    }

    pub fn set_fail_grants(&self, fail: bool) {
        if let Ok(mut flag) = self.fail_grants.lock() {
            *flag = fail;
        }
    }

    fn flag(flag: &Mutex<bool>) -> bool {
        flag.lock().map(|f| *f).unwrap_or(false)
    }
}

#[async_trait]
impl ChatGateway for MockChatGateway {
    async fn send(&self, target: &ReplyTarget, text: &str) -> Result<()> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((target.clone(), text.to_string()));
        }
        Ok(())
    }

    async fn create_voice_room(
        &self,
        _guild_id: &GuildId,
        request: &VoiceRoomRequest,
    ) -> Result<RoomId> {
        if Self::flag(&self.fail_room_creation) {
            return Err(anyhow!("voice room creation refused: {}", request.name));
        }

        let room_id = Uuid::new_v4().to_string();
        debug!("Mock created voice room '{}' as {}", request.name, room_id);
        if let Ok(mut rooms) = self.created_rooms.lock() {
            rooms.push((room_id.clone(), request.clone()));
        }
        Ok(room_id)
    }

    async fn delete_voice_room(&self, _guild_id: &GuildId, room_id: &RoomId) -> Result<()> {
        if Self::flag(&self.fail_room_deletion) {
            return Err(anyhow!("voice room deletion refused: {}", room_id));
        }

        if let Ok(mut rooms) = self.deleted_rooms.lock() {
            rooms.push(room_id.clone());
        }
        Ok(())
    }

    async fn update_member_grants(
        &self,
        _guild_id: &GuildId,
        player_id: &PlayerId,
        changes: &GrantChanges,
    ) -> Result<()> {
        if Self::flag(&self.fail_grants) {
            return Err(anyhow!("grant update refused for {}", player_id));
        }

        if let Ok(mut updates) = self.grant_updates.lock() {
            updates.push((player_id.clone(), changes.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_records_messages() {
        let gateway = MockChatGateway::new();
        let target = ReplyTarget::User("alice".to_string());

        gateway.send(&target, "hello").await.unwrap();
        gateway
            .send(&ReplyTarget::Channel("general".to_string()), "other")
            .await
            .unwrap();

        assert_eq!(gateway.messages_to(&target), vec!["hello".to_string()]);
        assert_eq!(gateway.sent_messages().len(), 2);
    }

    #[tokio::test]
    async fn test_mock_room_failure_injection() {
        let gateway = MockChatGateway::new();
        let guild = "g1".to_string();
        let request = VoiceRoomRequest {
            name: "scrims - Lobby".to_string(),
            category_id: None,
            bitrate: 96000,
        };

        let room = gateway.create_voice_room(&guild, &request).await.unwrap();
        assert_eq!(gateway.created_rooms()[0].0, room);

        gateway.set_fail_room_creation(true);
        assert!(gateway.create_voice_room(&guild, &request).await.is_err());
        assert_eq!(gateway.created_rooms().len(), 1);
    }
}
