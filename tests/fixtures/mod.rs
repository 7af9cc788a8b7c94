//! Test fixtures and helper gateways for integration testing

use anyhow::anyhow;
use async_trait::async_trait;
use pug_lobby::chat::{ChatGateway, GrantChanges, MockChatGateway, VoiceRoomRequest};
use pug_lobby::config::{GuildSettings, RegistrationSettings, StaticGuildConfigProvider};
use pug_lobby::error::Result;
use pug_lobby::lobby::LobbyManager;
use pug_lobby::metrics::MetricsCollector;
use pug_lobby::store::{DocumentStore, InMemoryBackend};
use pug_lobby::types::{GuildId, InboundMessage, PlayerId, PlayerProfile, ReplyTarget, Role, RoomId};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const GUILD: &str = "guild-1";

/// Gateway that creates a fixed number of voice rooms and then refuses
#[derive(Debug)]
pub struct FlakyRoomGateway {
    inner: MockChatGateway,
    rooms_left: AtomicUsize,
}

impl FlakyRoomGateway {
    pub fn allowing(rooms: usize) -> Self {
        Self {
            inner: MockChatGateway::new(),
            rooms_left: AtomicUsize::new(rooms),
        }
    }

    pub fn created_rooms(&self) -> Vec<RoomId> {
        self.inner
            .created_rooms()
            .into_iter()
            .map(|(id, _)| id)
            .collect()
    }

    pub fn deleted_rooms(&self) -> Vec<RoomId> {
        self.inner.deleted_rooms()
    }
}

#[async_trait]
impl ChatGateway for FlakyRoomGateway {
    async fn send(&self, target: &ReplyTarget, text: &str) -> Result<()> {
        self.inner.send(target, text).await
    }

    async fn create_voice_room(
        &self,
        guild_id: &GuildId,
        request: &VoiceRoomRequest,
    ) -> Result<RoomId> {
        let granted = self
            .rooms_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if !granted {
            return Err(anyhow!("room quota exhausted"));
        }
        self.inner.create_voice_room(guild_id, request).await
    }

    async fn delete_voice_room(&self, guild_id: &GuildId, room_id: &RoomId) -> Result<()> {
        self.inner.delete_voice_room(guild_id, room_id).await
    }

    async fn update_member_grants(
        &self,
        guild_id: &GuildId,
        player_id: &PlayerId,
        changes: &GrantChanges,
    ) -> Result<()> {
        self.inner
            .update_member_grants(guild_id, player_id, changes)
            .await
    }
}

/// Guild settings with a grant per region and a registered role
pub fn guild_settings() -> GuildSettings {
    let mut settings = GuildSettings::default();
    settings.regions.insert("eu".to_string(), "grant-eu".to_string());
    settings.regions.insert("na".to_string(), "grant-na".to_string());
    settings.registered_role = Some("grant-registered".to_string());
    settings
}

/// A manager over the given backend and gateway
pub async fn load_manager(
    backend: Arc<InMemoryBackend>,
    gateway: Arc<dyn ChatGateway>,
) -> LobbyManager {
    LobbyManager::load(
        GUILD.to_string(),
        &DocumentStore::new("data", backend),
        gateway,
        Arc::new(StaticGuildConfigProvider::uniform(guild_settings())),
        Arc::new(MetricsCollector::new().expect("metrics")),
        &RegistrationSettings::default(),
    )
    .await
    .expect("manager loads")
}

/// Complete test system: manager, recording gateway and in-memory backend
pub async fn create_test_system() -> (LobbyManager, Arc<MockChatGateway>, Arc<InMemoryBackend>) {
    let backend = Arc::new(InMemoryBackend::new());
    let gateway = Arc::new(MockChatGateway::new());
    let manager = load_manager(backend.clone(), gateway.clone()).await;
    (manager, gateway, backend)
}

pub fn player(id: &str) -> PlayerId {
    id.to_string()
}

pub fn profile(id: &str, skill_rating: u32, roles: &[Role]) -> PlayerProfile {
    PlayerProfile {
        id: id.to_string(),
        regions: vec!["eu".to_string()],
        battle_tag: format!("{}#1000", id),
        skill_rating,
        roles: roles.to_vec(),
        voice_preference: false,
    }
}

/// Store profiles directly, skipping the conversation
pub async fn register_all(manager: &LobbyManager, profiles: &[PlayerProfile]) {
    let profiles = profiles.to_vec();
    manager
        .profiles()
        .modify(move |book| {
            for p in profiles {
                book.insert(p.id.clone(), p);
            }
        })
        .await
        .expect("profiles loaded");
    manager.profiles().write().await.expect("profiles written");
}

/// Answer every registration question by direct message
pub async fn answer_registration(manager: &mut LobbyManager, user: &str, answers: &[&str]) {
    for answer in answers {
        manager
            .handle_direct_message(&InboundMessage::direct(user, *answer))
            .await
            .expect("registration step");
    }
}
