//! Main service state and event routing
//!
//! This module contains the PugService that owns one LobbyManager per guild,
//! turns inbound chat events into manager calls and replies, and runs the
//! registration sweep in the background.

use crate::chat::ChatGateway;
use crate::config::{AppConfig, GuildConfigProvider, StaticGuildConfigProvider};
use crate::error::{LobbyError, Result, ValidationError};
use crate::lobby::LobbyManager;
use crate::metrics::MetricsCollector;
use crate::service::command::{Command, CommandError};
use crate::service::render;
use crate::store::DocumentStore;
use crate::types::{ChannelId, ChannelKind, GuildId, InboundMessage, PlayerId, ReplyTarget};
use crate::utils::current_timestamp;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

/// Events the service reacts to
#[derive(Debug, Clone)]
pub enum InboundEvent {
    /// A chat message, direct or in a guild channel
    Message(InboundMessage),
    /// Drop idle registration conversations now
    SweepRegistrations,
}

/// Guild managers, loaded on first use
type ManagerMap = Arc<Mutex<HashMap<GuildId, LobbyManager>>>;

/// Main service state
pub struct PugService {
    config: AppConfig,
    store: DocumentStore,
    gateway: Arc<dyn ChatGateway>,
    config_provider: Arc<dyn GuildConfigProvider>,
    metrics: Arc<MetricsCollector>,
    /// Events are processed one at a time under this lock
    managers: ManagerMap,
    background_tasks: Vec<JoinHandle<()>>,
    is_running: Arc<RwLock<bool>>,
}

impl PugService {
    /// Build the service with guild settings taken from `config`
    pub fn new(
        config: AppConfig,
        store: DocumentStore,
        gateway: Arc<dyn ChatGateway>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let config_provider = Arc::new(StaticGuildConfigProvider::new(config.clone()));
        Self::with_provider(config, store, gateway, config_provider, metrics)
    }

    pub fn with_provider(
        config: AppConfig,
        store: DocumentStore,
        gateway: Arc<dyn ChatGateway>,
        config_provider: Arc<dyn GuildConfigProvider>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        info!(
            "Initializing service - name: '{}', data_dir: '{}'",
            config.service.name,
            store.data_dir().display()
        );

        Self {
            config,
            store,
            gateway,
            config_provider,
            metrics,
            managers: Arc::new(Mutex::new(HashMap::new())),
            background_tasks: Vec::new(),
            is_running: Arc::new(RwLock::new(false)),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// Guilds whose manager has been loaded
    pub async fn loaded_guilds(&self) -> Vec<GuildId> {
        let mut guilds: Vec<GuildId> = self.managers.lock().await.keys().cloned().collect();
        guilds.sort();
        guilds
    }

    /// Load a guild's manager ahead of its first event
    pub async fn load_guild(&self, guild_id: &GuildId) -> Result<()> {
        let mut managers = self.managers.lock().await;
        self.manager_for(&mut managers, guild_id).await?;
        Ok(())
    }

    /// Start background tasks
    pub async fn start(&mut self) -> Result<()> {
        *self.is_running.write().await = true;
        self.start_sweep_task();
        info!("Service started - name: '{}'", self.config.service.name);
        Ok(())
    }

    /// Stop background tasks and flush every loaded roster
    pub async fn shutdown(&mut self) -> Result<()> {
        info!("Starting graceful shutdown");
        *self.is_running.write().await = false;

        for handle in self.background_tasks.drain(..) {
            handle.abort();
            let _ = handle.await;
        }

        let managers = self.managers.lock().await;
        for (guild_id, manager) in managers.iter() {
            if let Err(e) = manager.flush().await {
                error!("Failed to flush lobbies - guild: '{}', error: {}", guild_id, e);
            }
        }

        info!("Shutdown completed");
        Ok(())
    }

    /// Periodically drop idle registration conversations
    fn start_sweep_task(&mut self) {
        let managers = Arc::clone(&self.managers);
        let period = self.config.registration.sweep_interval();

        let handle = tokio::spawn(async move {
            let mut sweep_interval = interval(period);

            loop {
                sweep_interval.tick().await;
                let expired = sweep(&managers).await;
                if expired > 0 {
                    debug!("Registration sweep expired {} conversations", expired);
                }
            }
        });

        self.background_tasks.push(handle);
        info!(
            "Started registration sweep task - interval: {}s",
            period.as_secs()
        );
    }

    /// Handle one inbound event
    pub async fn handle_event(&self, event: InboundEvent) -> Result<()> {
        match event {
            InboundEvent::Message(message) => self.handle_message(&message).await,
            InboundEvent::SweepRegistrations => {
                sweep(&self.managers).await;
                Ok(())
            }
        }
    }

    /// Route a chat message. Refusals become replies; persistence and other
    /// failures are returned.
    pub async fn handle_message(&self, message: &InboundMessage) -> Result<()> {
        match &message.channel {
            ChannelKind::Direct => self.handle_direct_message(message).await,
            ChannelKind::Community {
                guild_id,
                channel_id,
            } => {
                self.handle_channel_message(guild_id, channel_id, message)
                    .await
            }
        }
    }

    /// Direct messages go to the registration engine of every loaded guild,
    /// in guild id order. A failing guild does not stop delivery to the rest.
    async fn handle_direct_message(&self, message: &InboundMessage) -> Result<()> {
        let mut managers = self.managers.lock().await;
        let mut guilds: Vec<GuildId> = managers.keys().cloned().collect();
        guilds.sort();

        let mut failures = Vec::new();
        for guild_id in guilds {
            let Some(manager) = managers.get_mut(&guild_id) else {
                continue;
            };
            match manager.handle_direct_message(message).await {
                Ok(outcome) => debug!(
                    "Direct message handled - guild: '{}', player: '{}', outcome: {:?}",
                    guild_id, message.sender_id, outcome
                ),
                Err(e) => {
                    error!(
                        "Direct message failed - guild: '{}', player: '{}', error: {:#}",
                        guild_id, message.sender_id, e
                    );
                    failures.push((guild_id, e));
                }
            }
        }

        let failed_guilds: Vec<GuildId> = failures.iter().map(|(g, _)| g.clone()).collect();
        match failures.into_iter().next() {
            None => Ok(()),
            Some((_, first)) => Err(first.context(format!(
                "Direct message from '{}' failed in guilds: {}",
                message.sender_id,
                failed_guilds.join(", ")
            ))),
        }
    }

    async fn handle_channel_message(
        &self,
        guild_id: &GuildId,
        channel_id: &ChannelId,
        message: &InboundMessage,
    ) -> Result<()> {
        let target = ReplyTarget::Channel(channel_id.clone());

        let command = match Command::parse(&message.text) {
            Ok(Some(command)) => command,
            Ok(None) => return Ok(()),
            Err(e @ CommandError::Usage { .. }) => {
                self.reply(&target, &e.to_string()).await;
                return Ok(());
            }
        };

        info!(
            "Processing command - guild: '{}', command: '{}', sender: '{}'",
            guild_id,
            command.keyword(),
            message.sender_id
        );

        let mut managers = self.managers.lock().await;
        let manager = self.manager_for(&mut managers, guild_id).await?;

        match self
            .execute(manager, &command, &message.sender_id, &target)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => {
                if let Some(refused) = e.downcast_ref::<LobbyError>() {
                    self.reply(&target, &render::refusal(refused, &message.sender_id))
                        .await;
                    Ok(())
                } else if let Some(invalid) = e.downcast_ref::<ValidationError>() {
                    self.reply(&target, &invalid.to_string()).await;
                    Ok(())
                } else {
                    error!(
                        "Command failed - guild: '{}', command: '{}', error: {:#}",
                        guild_id,
                        command.keyword(),
                        e
                    );
                    Err(e)
                }
            }
        }
    }

    async fn execute(
        &self,
        manager: &mut LobbyManager,
        command: &Command,
        sender: &PlayerId,
        target: &ReplyTarget,
    ) -> Result<()> {
        match command {
            Command::CreateLobby { name } => {
                let lobby = manager.create_lobby(sender, name).await?;
                self.reply(
                    target,
                    &format!(
                        "Lobby \"{}\" created! Type `!join {}` to join",
                        lobby.name, lobby.name
                    ),
                )
                .await;
            }
            Command::CloseLobby { name } => {
                let lobby = manager.close_lobby(name.as_deref()).await?;
                self.reply(target, &format!("Lobby \"{}\" closed!", lobby.name))
                    .await;
            }
            Command::Join { name } => {
                let outcome = manager.join(sender, name.as_deref()).await?;
                let mut text = format!("Joined {}", outcome.lobby);
                if outcome.registration_pending {
                    text.push_str(". Check your direct messages to finish registering.");
                }
                self.reply(target, &text).await;
            }
            Command::Leave => {
                let lobby = manager.leave(sender).await?;
                self.reply(target, &format!("Left {}", lobby)).await;
            }
            Command::Kick { player_id, name } => {
                manager.kick(sender, player_id, name.as_deref()).await?;
                manager.flush().await?;
                self.reply(
                    target,
                    &format!("{} has been kicked from the lobby!", player_id),
                )
                .await;
            }
            Command::LobbyPlayers { name } => {
                let lobby = manager.lobby(name.as_deref()).await?;
                self.reply(target, &render::members(&lobby.name, &lobby.members))
                    .await;
            }
            Command::Balance { name } => {
                let result = manager.request_balance(name.as_deref()).await?;
                for text in render::teams(&result) {
                    self.reply(target, &text).await;
                }
                if !result.benched.is_empty() {
                    self.reply(
                        target,
                        &format!("Sitting out this round: {}", result.benched.join(", ")),
                    )
                    .await;
                }
            }
            Command::Register => {
                manager.start_registration(sender).await?;
            }
            Command::AutoRegister => {
                self.reply(
                    target,
                    "Adding the Registered role to all previously registered users...",
                )
                .await;
                let issued = manager.grant_registered_role_to_all().await?;
                self.reply(target, &format!("Added the role to {} members!", issued))
                    .await;
            }
            Command::Player { player_id } => {
                let profile = manager.profile(player_id).await?;
                self.reply(target, &render::player_info(&profile)).await;
            }
        }
        Ok(())
    }

    /// Manager of a guild, loading it on first use
    async fn manager_for<'a>(
        &self,
        managers: &'a mut HashMap<GuildId, LobbyManager>,
        guild_id: &GuildId,
    ) -> Result<&'a mut LobbyManager> {
        if !managers.contains_key(guild_id) {
            let manager = LobbyManager::load(
                guild_id.clone(),
                &self.store,
                self.gateway.clone(),
                self.config_provider.clone(),
                self.metrics.clone(),
                &self.config.registration,
            )
            .await?;
            managers.insert(guild_id.clone(), manager);
        }

        managers
            .get_mut(guild_id)
            .ok_or_else(|| anyhow::anyhow!("Guild {} failed to load", guild_id))
    }

    async fn reply(&self, target: &ReplyTarget, text: &str) {
        if let Err(e) = self.gateway.send(target, text).await {
            warn!("Failed to send reply to {}: {}", target, e);
        }
    }
}

/// Sweep every loaded guild; returns the number of conversations dropped
async fn sweep(managers: &ManagerMap) -> usize {
    let now = current_timestamp();
    let mut managers = managers.lock().await;
    managers
        .values_mut()
        .map(|manager| manager.sweep_registrations(now))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::MockChatGateway;
    use crate::config::GuildSettings;
    use crate::error::StoreError;
    use crate::store::InMemoryBackend;

    fn service() -> (PugService, Arc<MockChatGateway>, Arc<InMemoryBackend>) {
        let backend = Arc::new(InMemoryBackend::new());
        let gateway = Arc::new(MockChatGateway::new());
        let mut config = AppConfig::default();
        config.guild_defaults = GuildSettings {
            registered_role: Some("registered".to_string()),
            ..GuildSettings::default()
        };

        let service = PugService::new(
            config,
            DocumentStore::new("data", backend.clone()),
            gateway.clone(),
            Arc::new(MetricsCollector::new().unwrap()),
        );
        (service, gateway, backend)
    }

    fn said(sender: &str, text: &str) -> InboundMessage {
        InboundMessage {
            sender_id: sender.to_string(),
            channel: ChannelKind::Community {
                guild_id: "g1".to_string(),
                channel_id: "general".to_string(),
            },
            text: text.to_string(),
        }
    }

    fn said_in(guild: &str, sender: &str, text: &str) -> InboundMessage {
        InboundMessage {
            sender_id: sender.to_string(),
            channel: ChannelKind::Community {
                guild_id: guild.to_string(),
                channel_id: "general".to_string(),
            },
            text: text.to_string(),
        }
    }

    fn channel() -> ReplyTarget {
        ReplyTarget::Channel("general".to_string())
    }

    #[tokio::test]
    async fn test_manager_loaded_lazily() {
        let (service, _, _) = service();
        assert!(service.loaded_guilds().await.is_empty());

        service.handle_message(&said("a", "just chatting")).await.unwrap();
        assert!(service.loaded_guilds().await.is_empty());

        service.handle_message(&said("a", "!join")).await.unwrap();
        assert_eq!(service.loaded_guilds().await, vec!["g1".to_string()]);
    }

    #[tokio::test]
    async fn test_refusals_become_replies() {
        let (service, gateway, _) = service();

        service.handle_message(&said("a", "!join")).await.unwrap();
        assert_eq!(
            gateway.last_message_to(&channel()),
            Some("There are no open lobbies!".to_string())
        );

        service.handle_message(&said("a", "!createlobby")).await.unwrap();
        assert_eq!(
            gateway.last_message_to(&channel()),
            Some("Usage: !createlobby <lobby name>".to_string())
        );
    }

    #[tokio::test]
    async fn test_lobby_commands() {
        let (service, gateway, _) = service();

        service
            .handle_message(&said("host", "!createlobby Scrims"))
            .await
            .unwrap();
        assert_eq!(
            gateway.last_message_to(&channel()),
            Some("Lobby \"Scrims\" created! Type `!join Scrims` to join".to_string())
        );

        service.handle_message(&said("a", "!join scrims")).await.unwrap();
        assert!(gateway
            .last_message_to(&channel())
            .unwrap()
            .starts_with("Joined Scrims"));

        service.handle_message(&said("host", "!lobbyplayers")).await.unwrap();
        assert_eq!(
            gateway.last_message_to(&channel()),
            Some("The lobby has 1 players:\na".to_string())
        );

        service.handle_message(&said("host", "!balance")).await.unwrap();
        assert!(gateway
            .last_message_to(&channel())
            .unwrap()
            .contains("still completing their registration"));

        service.handle_message(&said("a", "!leave")).await.unwrap();
        assert_eq!(
            gateway.last_message_to(&channel()),
            Some("Left Scrims".to_string())
        );

        service.handle_message(&said("host", "!closelobby")).await.unwrap();
        assert_eq!(gateway.deleted_rooms().len(), 3);
    }

    #[tokio::test]
    async fn test_direct_messages_reach_loaded_guilds() {
        let (service, gateway, _) = service();

        service.handle_message(&said("a", "!register")).await.unwrap();
        for reply in ["eu", "Name#1234", "2500", "dps", "yes"] {
            service
                .handle_event(InboundEvent::Message(InboundMessage::direct("a", reply)))
                .await
                .unwrap();
        }

        assert_eq!(
            gateway.last_message_to(&ReplyTarget::User("a".to_string())),
            Some(crate::registration::COMPLETION_REPLY.to_string())
        );

        service.handle_message(&said("host", "!player <@a>")).await.unwrap();
        assert!(gateway
            .last_message_to(&channel())
            .unwrap()
            .contains("BattleTag: Name#1234"));

        let updates = gateway.grant_updates();
        assert_eq!(updates.len(), 1);
        assert!(updates[0].1.add.contains(&"registered".to_string()));
    }

    #[tokio::test]
    async fn test_direct_message_reaches_every_guild_when_one_fails() {
        let (service, gateway, backend) = service();
        for guild in ["g1", "g2"] {
            service
                .handle_message(&said_in(guild, "a", "!register"))
                .await
                .unwrap();
        }
        for reply in ["eu", "Name#1234", "2500", "dps"] {
            service
                .handle_message(&InboundMessage::direct("a", reply))
                .await
                .unwrap();
        }

        backend.fail_writes([true]);
        let err = service
            .handle_message(&InboundMessage::direct("a", "yes"))
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<StoreError>().is_some());
        assert!(err.to_string().contains("g1"));

        let managers = service.managers.lock().await;
        for guild in ["g1", "g2"] {
            assert!(!managers[guild].registration().is_registering(&"a".to_string()));
        }
        drop(managers);

        assert!(backend
            .contents("data/players/g1.json")
            .map_or(true, |c| !c.contains("Name#1234")));
        assert!(backend
            .contents("data/players/g2.json")
            .unwrap()
            .contains("Name#1234"));

        let replies = gateway.messages_to(&ReplyTarget::User("a".to_string()));
        assert!(replies.contains(&crate::registration::SAVE_FAILED_REPLY.to_string()));
        assert_eq!(
            replies.last(),
            Some(&crate::registration::COMPLETION_REPLY.to_string())
        );
    }

    #[tokio::test]
    async fn test_sweep_event_expires_idle_registrations() {
        let backend = Arc::new(InMemoryBackend::new());
        let mut config = AppConfig::default();
        config.registration.idle_timeout_seconds = 0;
        let service = PugService::new(
            config,
            DocumentStore::new("data", backend),
            Arc::new(MockChatGateway::new()),
            Arc::new(MetricsCollector::new().unwrap()),
        );

        service.handle_message(&said("a", "!register")).await.unwrap();
        service
            .handle_event(InboundEvent::SweepRegistrations)
            .await
            .unwrap();

        let managers = service.managers.lock().await;
        let manager = managers.get("g1").unwrap();
        assert!(!manager.registration().is_registering(&"a".to_string()));
    }

    #[tokio::test]
    async fn test_store_failures_propagate() {
        let (service, _, backend) = service();
        service.load_guild(&"g1".to_string()).await.unwrap();
        backend.fail_writes([true]);

        let result = service
            .handle_message(&said("host", "!createlobby Scrims"))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let (mut service, _, _) = service();
        service.start().await.unwrap();
        assert!(service.is_running().await);

        service.handle_message(&said("a", "!join")).await.unwrap();
        service.shutdown().await.unwrap();
        assert!(!service.is_running().await);
    }
}
