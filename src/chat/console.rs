//! Terminal-backed gateway for running the service locally

use crate::chat::gateway::{ChatGateway, GrantChanges, VoiceRoomRequest};
use crate::error::Result;
use crate::types::{GuildId, PlayerId, ReplyTarget, RoomId};
use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, Stdout};
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

/// Writes replies to stdout and logs platform side effects
pub struct ConsoleChatGateway {
    out: Mutex<Stdout>,
}

impl ConsoleChatGateway {
    pub fn new() -> Self {
        Self {
            out: Mutex::new(tokio::io::stdout()),
        }
    }
}

impl Default for ConsoleChatGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatGateway for ConsoleChatGateway {
    async fn send(&self, target: &ReplyTarget, text: &str) -> Result<()> {
        let mut out = self.out.lock().await;
        for line in text.lines() {
            out.write_all(format!("[{}] {}\n", target, line).as_bytes())
                .await?;
        }
        out.flush().await?;
        Ok(())
    }

    async fn create_voice_room(
        &self,
        guild_id: &GuildId,
        request: &VoiceRoomRequest,
    ) -> Result<RoomId> {
        let room_id = Uuid::new_v4().to_string();
        info!(
            "Voice room created - guild: '{}', name: '{}', id: {}, bitrate: {}",
            guild_id, request.name, room_id, request.bitrate
        );
        Ok(room_id)
    }

    async fn delete_voice_room(&self, guild_id: &GuildId, room_id: &RoomId) -> Result<()> {
        info!("Voice room deleted - guild: '{}', id: {}", guild_id, room_id);
        Ok(())
    }

    async fn update_member_grants(
        &self,
        guild_id: &GuildId,
        player_id: &PlayerId,
        changes: &GrantChanges,
    ) -> Result<()> {
        info!(
            "Member grants updated - guild: '{}', player: '{}', add: {:?}, remove: {:?}",
            guild_id, player_id, changes.add, changes.remove
        );
        Ok(())
    }
}
