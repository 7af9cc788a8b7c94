//! Registration conversation engine for one guild
//!
//! Holds the in-flight conversations, routes direct messages to them and
//! writes completed profiles into the shared profile document.

use crate::chat::{ChatGateway, GrantChanges};
use crate::config::{GuildConfigProvider, GuildSettings, RegistrationSettings};
use crate::error::{Result, ValidationError};
use crate::metrics::MetricsCollector;
use crate::registration::progress::{RegistrationProgress, RegistrationStep, StepResult};
use crate::store::Document;
use crate::types::{GuildId, InboundMessage, PlayerId, PlayerProfile, ProfileBook, ReplyTarget};
use crate::utils::current_timestamp;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Reply sent once a profile is stored
pub const COMPLETION_REPLY: &str = "Registration complete! You can now play in PUGs.";

/// Sent when the finished profile could not be saved
pub const SAVE_FAILED_REPLY: &str =
    "Your registration could not be saved. Please try again later with `!register`.";

/// What the engine did with a request
#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationOutcome {
    /// Empty or unsolicited message
    Ignored,
    /// A conversation was already open; nothing changed
    AlreadyInProgress,
    /// New conversation opened and the first question asked
    Started,
    /// Valid reply; the next question was asked
    Advanced(RegistrationStep),
    /// Invalid reply; the step stays put
    Rejected {
        step: RegistrationStep,
        error: ValidationError,
    },
    /// Profile stored
    Completed(PlayerProfile),
}

/// Grant changes bringing a member in line with the regions they chose
pub fn grant_changes(settings: &GuildSettings, regions: &[String]) -> GrantChanges {
    let mut changes = GrantChanges::default();

    for (region, grant) in &settings.regions {
        if grant.is_empty() || regions.contains(region) {
            continue;
        }
        if !changes.remove.contains(grant) {
            changes.remove.push(grant.clone());
        }
    }

    let selected = regions
        .iter()
        .filter_map(|region| settings.region_grant(region))
        .chain(settings.registered_role.as_deref().filter(|id| !id.is_empty()));
    for grant in selected {
        if !changes.add.iter().any(|g| g == grant) {
            changes.add.push(grant.to_string());
        }
    }

    changes
}

/// Registration conversations of one guild
pub struct RegistrationEngine {
    guild_id: GuildId,
    conversations: HashMap<PlayerId, RegistrationProgress>,
    profiles: Arc<Document<ProfileBook>>,
    gateway: Arc<dyn ChatGateway>,
    config_provider: Arc<dyn GuildConfigProvider>,
    metrics: Arc<MetricsCollector>,
    idle_timeout: Duration,
}

impl RegistrationEngine {
    pub fn new(
        guild_id: GuildId,
        profiles: Arc<Document<ProfileBook>>,
        gateway: Arc<dyn ChatGateway>,
        config_provider: Arc<dyn GuildConfigProvider>,
        metrics: Arc<MetricsCollector>,
        settings: &RegistrationSettings,
    ) -> Self {
        Self {
            guild_id,
            conversations: HashMap::new(),
            profiles,
            gateway,
            config_provider,
            metrics,
            idle_timeout: settings.idle_timeout(),
        }
    }

    pub fn guild_id(&self) -> &GuildId {
        &self.guild_id
    }

    pub fn is_registering(&self, player_id: &PlayerId) -> bool {
        self.conversations.contains_key(player_id)
    }

    /// Current step of a player's conversation
    pub fn step_of(&self, player_id: &PlayerId) -> Option<RegistrationStep> {
        self.conversations.get(player_id).map(|p| p.step())
    }

    pub fn in_progress_count(&self) -> usize {
        self.conversations.len()
    }

    /// Open a conversation and ask the first question. Idempotent.
    pub async fn start(&mut self, player_id: &PlayerId) -> Result<RegistrationOutcome> {
        if self.conversations.contains_key(player_id) {
            debug!(
                "Registration already in progress - guild: '{}', player: '{}'",
                self.guild_id, player_id
            );
            return Ok(RegistrationOutcome::AlreadyInProgress);
        }

        let settings = self.config_provider.guild_settings(&self.guild_id)?;
        self.conversations.insert(
            player_id.clone(),
            RegistrationProgress::new(player_id.clone(), current_timestamp()),
        );
        self.metrics.registration().registrations_started_total.inc();
        self.metrics
            .set_registrations_in_progress(self.conversations.len());

        info!(
            "Started registration - guild: '{}', player: '{}'",
            self.guild_id, player_id
        );

        let prompt = RegistrationStep::Regions.prompt(&settings.valid_regions());
        self.reply(player_id, &prompt).await;

        Ok(RegistrationOutcome::Started)
    }

    /// Feed a message to the sender's conversation, if any
    pub async fn handle_message(&mut self, message: &InboundMessage) -> Result<RegistrationOutcome> {
        if !message.is_direct() {
            return Ok(RegistrationOutcome::Ignored);
        }

        let content = message.text.trim();
        if content.is_empty() || !self.conversations.contains_key(&message.sender_id) {
            return Ok(RegistrationOutcome::Ignored);
        }

        let settings = self.config_provider.guild_settings(&self.guild_id)?;
        let valid_regions = settings.valid_regions();

        let Some(progress) = self.conversations.get_mut(&message.sender_id) else {
            return Ok(RegistrationOutcome::Ignored);
        };
        let step = progress.step();
        progress.touch(current_timestamp());

        match progress.apply(content, &valid_regions) {
            Err(error) => {
                debug!(
                    "Rejected registration reply - player: '{}', step: {}, reason: {}",
                    message.sender_id, step, error
                );
                self.metrics.record_rejection(step.label());
                self.reply(&message.sender_id, &error.to_string()).await;
                Ok(RegistrationOutcome::Rejected { step, error })
            }
            Ok(StepResult::Advanced(next)) => {
                self.reply(&message.sender_id, &next.prompt(&valid_regions))
                    .await;
                Ok(RegistrationOutcome::Advanced(next))
            }
            Ok(StepResult::Completed(profile)) => self.complete(profile, &settings).await,
        }
    }

    async fn complete(
        &mut self,
        profile: PlayerProfile,
        settings: &GuildSettings,
    ) -> Result<RegistrationOutcome> {
        self.conversations.remove(&profile.id);
        self.metrics
            .set_registrations_in_progress(self.conversations.len());

        if let Err(e) = self.save_profile(&profile).await {
            self.reply(&profile.id, SAVE_FAILED_REPLY).await;
            return Err(e);
        }

        self.metrics
            .registration()
            .registrations_completed_total
            .inc();
        info!(
            "Completed registration - guild: '{}', player: '{}', battle_tag: '{}'",
            self.guild_id, profile.id, profile.battle_tag
        );

        self.reconcile_grants(&profile, settings).await;
        self.reply(&profile.id, COMPLETION_REPLY).await;

        Ok(RegistrationOutcome::Completed(profile))
    }

    async fn save_profile(&self, profile: &PlayerProfile) -> Result<()> {
        let stored = profile.clone();
        self.profiles
            .modify(move |book| {
                book.insert(stored.id.clone(), stored);
            })
            .await?;

        let written = self.profiles.write().await;
        self.metrics
            .record_document_write("players", written.is_ok());
        written?;
        Ok(())
    }

    /// Best-effort grant reconciliation; failures are logged and counted
    pub async fn reconcile_grants(&self, profile: &PlayerProfile, settings: &GuildSettings) {
        let changes = grant_changes(settings, &profile.regions);
        if changes.is_empty() {
            return;
        }

        if let Err(e) = self
            .gateway
            .update_member_grants(&self.guild_id, &profile.id, &changes)
            .await
        {
            warn!(
                "Grant update failed after registration - guild: '{}', player: '{}', error: {}",
                self.guild_id, profile.id, e
            );
            self.metrics.registration().grant_failures_total.inc();
        }
    }

    /// Drop conversations idle for longer than the configured timeout
    pub fn sweep_expired(&mut self, now: DateTime<Utc>) -> usize {
        let timeout = self.idle_timeout;
        let before = self.conversations.len();
        self.conversations
            .retain(|_, progress| !progress.is_idle(now, timeout));

        let expired = before - self.conversations.len();
        if expired > 0 {
            info!(
                "Expired idle registrations - guild: '{}', count: {}",
                self.guild_id, expired
            );
            self.metrics
                .registration()
                .registrations_expired_total
                .inc_by(expired as u64);
            self.metrics
                .set_registrations_in_progress(self.conversations.len());
        }
        expired
    }

    async fn reply(&self, player_id: &PlayerId, text: &str) {
        let target = ReplyTarget::User(player_id.clone());
        if let Err(e) = self.gateway.send(&target, text).await {
            warn!("Failed to send reply to {}: {}", target, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::MockChatGateway;
    use crate::config::StaticGuildConfigProvider;
    use crate::error::StoreError;
    use crate::store::{DocumentStore, InMemoryBackend};
    use crate::types::Role;

    struct Harness {
        engine: RegistrationEngine,
        gateway: Arc<MockChatGateway>,
        backend: Arc<InMemoryBackend>,
        profiles: Arc<Document<ProfileBook>>,
    }

    fn settings() -> GuildSettings {
        let mut settings = GuildSettings::default();
        settings.regions.insert("eu".to_string(), "role-eu".to_string());
        settings.regions.insert("na".to_string(), "role-na".to_string());
        settings.regions.insert("oce".to_string(), "role-oce".to_string());
        settings.registered_role = Some("role-registered".to_string());
        settings
    }

    async fn harness() -> Harness {
        let backend = Arc::new(InMemoryBackend::new());
        let store = DocumentStore::new("data", backend.clone());
        let profiles = Arc::new(store.open_profiles(&"g1".to_string()));
        profiles.read_or_seed().await.unwrap();

        let gateway = Arc::new(MockChatGateway::new());
        let engine = RegistrationEngine::new(
            "g1".to_string(),
            profiles.clone(),
            gateway.clone(),
            Arc::new(StaticGuildConfigProvider::uniform(settings())),
            Arc::new(MetricsCollector::new().unwrap()),
            &RegistrationSettings::default(),
        );

        Harness {
            engine,
            gateway,
            backend,
            profiles,
        }
    }

    fn dm(text: &str) -> InboundMessage {
        InboundMessage::direct("p1", text)
    }

    fn player() -> PlayerId {
        "p1".to_string()
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let mut h = harness().await;

        assert_eq!(
            h.engine.start(&player()).await.unwrap(),
            RegistrationOutcome::Started
        );
        assert_eq!(
            h.engine.start(&player()).await.unwrap(),
            RegistrationOutcome::AlreadyInProgress
        );

        let prompts = h.gateway.messages_to(&ReplyTarget::User(player()));
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("**EU**, **NA**, **OCE**, **None**"));
        assert_eq!(h.engine.step_of(&player()), Some(RegistrationStep::Regions));
    }

    #[tokio::test]
    async fn test_unsolicited_and_empty_messages_ignored() {
        let mut h = harness().await;

        assert_eq!(
            h.engine.handle_message(&dm("EU")).await.unwrap(),
            RegistrationOutcome::Ignored
        );

        h.engine.start(&player()).await.unwrap();
        assert_eq!(
            h.engine.handle_message(&dm("   ")).await.unwrap(),
            RegistrationOutcome::Ignored
        );

        let community = InboundMessage {
            sender_id: player(),
            channel: crate::types::ChannelKind::Community {
                guild_id: "g1".to_string(),
                channel_id: "c1".to_string(),
            },
            text: "EU".to_string(),
        };
        assert_eq!(
            h.engine.handle_message(&community).await.unwrap(),
            RegistrationOutcome::Ignored
        );
        assert_eq!(h.engine.step_of(&player()), Some(RegistrationStep::Regions));
    }

    #[tokio::test]
    async fn test_full_registration_persists_profile() {
        let mut h = harness().await;
        h.engine.start(&player()).await.unwrap();

        for reply in ["EU NA", "Name#1234", "2500", "tank support"] {
            assert!(matches!(
                h.engine.handle_message(&dm(reply)).await.unwrap(),
                RegistrationOutcome::Advanced(_)
            ));
        }

        let profile = match h.engine.handle_message(&dm("yes")).await.unwrap() {
            RegistrationOutcome::Completed(profile) => profile,
            other => panic!("Expected completion, got {:?}", other),
        };
        assert_eq!(profile.regions, vec!["eu", "na"]);
        assert_eq!(profile.battle_tag, "Name#1234");
        assert_eq!(profile.skill_rating, 2500);
        assert_eq!(profile.roles, vec![Role::Tank, Role::Support]);
        assert!(profile.voice_preference);

        assert!(!h.engine.is_registering(&player()));
        assert_eq!(h.profiles.read().await.unwrap().get("p1"), Some(&profile));

        let stored = h.backend.contents("data/players/g1.json").unwrap();
        assert!(stored.contains("\"battleTag\": \"Name#1234\""));

        assert_eq!(
            h.gateway.last_message_to(&ReplyTarget::User(player())),
            Some(COMPLETION_REPLY.to_string())
        );

        let updates = h.gateway.grant_updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].1.add, vec!["role-eu", "role-na", "role-registered"]);
        assert_eq!(updates[0].1.remove, vec!["role-oce"]);
    }

    #[tokio::test]
    async fn test_invalid_reply_reprompts_without_advancing() {
        let mut h = harness().await;
        h.engine.start(&player()).await.unwrap();
        h.engine.handle_message(&dm("eu")).await.unwrap();

        let outcome = h.engine.handle_message(&dm("Name")).await.unwrap();
        assert_eq!(
            outcome,
            RegistrationOutcome::Rejected {
                step: RegistrationStep::BattleTag,
                error: ValidationError::InvalidBattleTag,
            }
        );
        assert_eq!(h.engine.step_of(&player()), Some(RegistrationStep::BattleTag));
        assert_eq!(
            h.gateway.last_message_to(&ReplyTarget::User(player())),
            Some(ValidationError::InvalidBattleTag.to_string())
        );
    }

    #[tokio::test]
    async fn test_grant_failure_does_not_fail_registration() {
        let mut h = harness().await;
        h.gateway.set_fail_grants(true);
        h.engine.start(&player()).await.unwrap();

        for reply in ["none", "Name#1", "unranked", "flex", "no"] {
            h.engine.handle_message(&dm(reply)).await.unwrap();
        }

        let profile = h.profiles.read().await.unwrap().get("p1").cloned().unwrap();
        assert!(profile.regions.is_empty());
        assert_eq!(profile.skill_rating, 0);
        assert_eq!(profile.roles, Role::ALL.to_vec());
        assert!(!profile.voice_preference);
        assert_eq!(
            h.engine.metrics.registration().grant_failures_total.get(),
            1
        );
    }

    #[tokio::test]
    async fn test_failed_profile_write_tells_the_player() {
        let mut h = harness().await;
        h.engine.start(&player()).await.unwrap();
        for reply in ["eu", "Name#1", "2000", "tank"] {
            h.engine.handle_message(&dm(reply)).await.unwrap();
        }

        h.backend.fail_writes([true]);
        let err = h.engine.handle_message(&dm("yes")).await.unwrap_err();
        assert!(err.downcast_ref::<StoreError>().is_some());

        assert_eq!(
            h.gateway.last_message_to(&ReplyTarget::User(player())),
            Some(SAVE_FAILED_REPLY.to_string())
        );
        assert!(h.gateway.grant_updates().is_empty());
        assert!(!h.engine.is_registering(&player()));
    }

    #[tokio::test]
    async fn test_sweep_drops_idle_conversations() {
        let mut h = harness().await;
        h.engine.start(&player()).await.unwrap();

        assert_eq!(h.engine.sweep_expired(current_timestamp()), 0);
        let later = current_timestamp() + chrono::Duration::seconds(1801);
        assert_eq!(h.engine.sweep_expired(later), 1);
        assert!(!h.engine.is_registering(&player()));
    }

    #[test]
    fn test_grant_changes_skip_empty_grants() {
        let mut settings = GuildSettings::default();
        settings.regions.insert("eu".to_string(), "1".to_string());

        let changes = grant_changes(&settings, &["na".to_string()]);
        assert!(changes.add.is_empty());
        assert_eq!(changes.remove, vec!["1"]);
    }
}
