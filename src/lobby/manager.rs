//! Lobby manager for one guild
//!
//! This module provides the LobbyManager that owns a guild's lobby roster and
//! player profiles, drives registration for players who join unregistered,
//! and hands complete rosters to the team balancer.

use crate::balance::{RoleBalancer, Team, TeamBalancer};
use crate::chat::{ChatGateway, GrantChanges, VoiceRoomRequest};
use crate::config::{GuildConfigProvider, GuildSettings, RegistrationSettings};
use crate::error::{LobbyError, Result};
use crate::lobby::instance::Lobby;
use crate::metrics::MetricsCollector;
use crate::registration::{RegistrationEngine, RegistrationOutcome};
use crate::store::{Document, DocumentStore};
use crate::types::{GuildId, InboundMessage, PlayerId, PlayerProfile, ProfileBook, RoomId};
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lobbies always split into this many teams
pub const TEAM_COUNT: usize = 2;

/// Snapshot of a guild's lobby state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LobbyManagerStats {
    pub open_lobbies: usize,
    /// Players across all lobbies
    pub players_in_lobbies: usize,
    pub registered_players: usize,
    pub registrations_in_progress: usize,
}

/// Result of a successful join
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    /// Lobby joined
    pub lobby: String,
    /// Lobby the player was moved out of, if any
    pub previous_lobby: Option<String>,
    /// The player has no profile yet and was sent the registration prompt
    pub registration_pending: bool,
}

/// Teams formed for a lobby
#[derive(Debug, Clone)]
pub struct BalanceResult {
    pub lobby: String,
    pub teams: Vec<Team>,
    /// Members beyond the lobby capacity, not placed this round
    pub benched: Vec<PlayerId>,
}

/// The lobby manager of one guild
pub struct LobbyManager {
    guild_id: GuildId,
    /// Lobby roster document
    lobbies: Document<Vec<Lobby>>,
    /// Player profile document, shared with the registration engine
    profiles: Arc<Document<ProfileBook>>,
    registration: RegistrationEngine,
    gateway: Arc<dyn ChatGateway>,
    config_provider: Arc<dyn GuildConfigProvider>,
    balancer: Arc<dyn TeamBalancer>,
    metrics_collector: Arc<MetricsCollector>,
}

impl LobbyManager {
    /// Open a guild's documents and load them, seeding missing ones
    pub async fn load(
        guild_id: GuildId,
        store: &DocumentStore,
        gateway: Arc<dyn ChatGateway>,
        config_provider: Arc<dyn GuildConfigProvider>,
        metrics_collector: Arc<MetricsCollector>,
        registration_settings: &RegistrationSettings,
    ) -> Result<Self> {
        let lobbies = store.open_lobbies(&guild_id);
        let profiles = Arc::new(store.open_profiles(&guild_id));

        let roster = lobbies.read_or_seed().await?;
        let book = profiles.read_or_seed().await?;

        info!(
            "Loaded guild - guild: '{}', lobbies: {}, profiles: {}",
            guild_id,
            roster.len(),
            book.len()
        );

        let registration = RegistrationEngine::new(
            guild_id.clone(),
            profiles.clone(),
            gateway.clone(),
            config_provider.clone(),
            metrics_collector.clone(),
            registration_settings,
        );

        Ok(Self {
            guild_id,
            lobbies,
            profiles,
            registration,
            gateway,
            config_provider,
            balancer: Arc::new(RoleBalancer::new()),
            metrics_collector,
        })
    }

    pub fn guild_id(&self) -> &GuildId {
        &self.guild_id
    }

    pub fn registration(&self) -> &RegistrationEngine {
        &self.registration
    }

    pub fn profiles(&self) -> &Arc<Document<ProfileBook>> {
        &self.profiles
    }

    fn settings(&self) -> Result<GuildSettings> {
        self.config_provider.guild_settings(&self.guild_id)
    }

    /// Count the refusal and turn it into an error
    fn refuse(&self, error: LobbyError) -> anyhow::Error {
        debug!(
            "Refused lobby request - guild: '{}', reason: {}",
            self.guild_id, error
        );
        self.metrics_collector.record_lobby_error(error.error_code());
        error.into()
    }

    /// Index of the lobby a request refers to. Without a name, the only
    /// open lobby is meant.
    fn resolve(&self, roster: &[Lobby], name: Option<&str>) -> Result<usize> {
        match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => roster.iter().position(|l| l.is_named(name)).ok_or_else(|| {
                self.refuse(LobbyError::LobbyNotFound {
                    name: name.to_string(),
                })
            }),
            None => match roster.len() {
                0 => Err(self.refuse(LobbyError::NoOpenLobbies)),
                1 => Ok(0),
                count => Err(self.refuse(LobbyError::AmbiguousLobby { count })),
            },
        }
    }

    /// All open lobbies
    pub async fn lobbies(&self) -> Result<Vec<Lobby>> {
        Ok(self.lobbies.read().await?)
    }

    /// One lobby, by name or as the only open one
    pub async fn lobby(&self, name: Option<&str>) -> Result<Lobby> {
        let roster = self.lobbies.read().await?;
        let index = self.resolve(&roster, name)?;
        Ok(roster[index].clone())
    }

    /// Members of a lobby in join order
    pub async fn members(&self, name: Option<&str>) -> Result<Vec<PlayerId>> {
        Ok(self.lobby(name).await?.members)
    }

    /// The lobby a player is in, if any
    pub async fn lobby_of(&self, player_id: &PlayerId) -> Result<Option<Lobby>> {
        let roster = self.lobbies.read().await?;
        Ok(roster.into_iter().find(|l| l.contains(player_id)))
    }

    /// Persist the roster as it currently is in memory
    pub async fn flush(&self) -> Result<()> {
        let written = self.lobbies.write().await;
        self.metrics_collector
            .record_document_write("lobbies", written.is_ok());
        Ok(written?)
    }

    /// Create a lobby with its voice rooms
    pub async fn create_lobby(&mut self, owner: &PlayerId, name: &str) -> Result<Lobby> {
        let name = name.trim();
        let roster = self.lobbies.read().await?;
        if roster.iter().any(|l| l.is_named(name)) {
            return Err(self.refuse(LobbyError::DuplicateLobbyName {
                name: name.to_string(),
            }));
        }

        let settings = self.settings()?;
        let mut lobby = Lobby::new(owner.clone(), name, settings.lobby_capacity);

        for room_name in Lobby::voice_room_names(name) {
            let request = VoiceRoomRequest {
                name: room_name,
                category_id: settings.voice_category_id.clone(),
                bitrate: settings.voice_bitrate,
            };
            match self
                .gateway
                .create_voice_room(&self.guild_id, &request)
                .await
            {
                Ok(room_id) => lobby.voice_room_ids.push(room_id),
                Err(e) => {
                    self.discard_rooms(&lobby.voice_room_ids).await;
                    return Err(e.context(format!(
                        "Failed to create voice room '{}'",
                        request.name
                    )));
                }
            }
        }

        let created = lobby.clone();
        self.lobbies
            .modify(move |lobbies| lobbies.push(created))
            .await?;
        self.flush().await?;

        self.metrics_collector.lobby().lobbies_created_total.inc();
        info!(
            "Created lobby - guild: '{}', name: '{}', owner: '{}', rooms: {}",
            self.guild_id,
            lobby.name,
            lobby.owner,
            lobby.voice_room_ids.len()
        );

        Ok(lobby)
    }

    /// Rooms of a lobby that never made it into the roster
    async fn discard_rooms(&self, room_ids: &[RoomId]) {
        for room_id in room_ids {
            if let Err(e) = self
                .gateway
                .delete_voice_room(&self.guild_id, room_id)
                .await
            {
                warn!(
                    "Failed to discard voice room - guild: '{}', room: '{}', error: {}",
                    self.guild_id, room_id, e
                );
            }
        }
    }

    /// Tear down a lobby's voice rooms and remove it
    pub async fn close_lobby(&mut self, name: Option<&str>) -> Result<Lobby> {
        let roster = self.lobbies.read().await?;
        let index = self.resolve(&roster, name)?;
        let lobby = roster[index].clone();

        try_join_all(
            lobby
                .voice_room_ids
                .iter()
                .map(|room_id| self.gateway.delete_voice_room(&self.guild_id, room_id)),
        )
        .await?;

        let closed = lobby.name.clone();
        self.lobbies
            .modify(move |lobbies| lobbies.retain(|l| l.name != closed))
            .await?;
        self.flush().await?;

        self.metrics_collector.lobby().lobbies_closed_total.inc();
        info!(
            "Closed lobby - guild: '{}', name: '{}', members: {}",
            self.guild_id,
            lobby.name,
            lobby.member_count()
        );

        Ok(lobby)
    }

    /// Join a lobby, leaving any other lobby first. Unregistered players are
    /// sent the registration prompt.
    pub async fn join(&mut self, player_id: &PlayerId, name: Option<&str>) -> Result<JoinOutcome> {
        let roster = self.lobbies.read().await?;
        let index = self.resolve(&roster, name)?;
        let target = roster[index].name.clone();

        if roster[index].contains(player_id) {
            return Err(self.refuse(LobbyError::AlreadyInLobby { name: target }));
        }

        let previous_lobby = self
            .lobbies
            .modify(|lobbies| {
                let mut previous = None;
                for lobby in lobbies.iter_mut() {
                    if lobby.remove_member(player_id) {
                        previous = Some(lobby.name.clone());
                    }
                }
                if let Some(lobby) = lobbies.iter_mut().find(|l| l.name == target) {
                    lobby.add_member(player_id.clone());
                }
                previous
            })
            .await?;

        let registered = self.profiles.read().await?.contains_key(player_id);
        if !registered {
            self.registration.start(player_id).await?;
        }

        self.flush().await?;

        if previous_lobby.is_some() {
            self.metrics_collector.record_roster_change("leave");
        }
        self.metrics_collector.record_roster_change("join");
        info!(
            "Player joined lobby - guild: '{}', lobby: '{}', player: '{}', previous: {:?}, registered: {}",
            self.guild_id, target, player_id, previous_lobby, registered
        );

        Ok(JoinOutcome {
            lobby: target,
            previous_lobby,
            registration_pending: !registered,
        })
    }

    /// Leave the player's current lobby
    pub async fn leave(&mut self, player_id: &PlayerId) -> Result<String> {
        let Some(lobby) = self.lobby_of(player_id).await? else {
            return Err(self.refuse(LobbyError::NotInLobby {
                player_id: player_id.clone(),
            }));
        };

        self.lobbies
            .modify(|lobbies| {
                for lobby in lobbies.iter_mut() {
                    lobby.remove_member(player_id);
                }
            })
            .await?;
        self.flush().await?;

        self.metrics_collector.record_roster_change("leave");
        info!(
            "Player left lobby - guild: '{}', lobby: '{}', player: '{}'",
            self.guild_id, lobby.name, player_id
        );

        Ok(lobby.name)
    }

    /// Remove a member on the owner's behalf.
    ///
    /// Only the in-memory roster changes; follow with [`LobbyManager::flush`].
    pub async fn kick(
        &mut self,
        requester: &PlayerId,
        player_id: &PlayerId,
        name: Option<&str>,
    ) -> Result<String> {
        let roster = self.lobbies.read().await?;
        let index = self.resolve(&roster, name)?;
        let lobby = &roster[index];

        if !lobby.is_owned_by(requester) {
            return Err(self.refuse(LobbyError::NotLobbyOwner {
                name: lobby.name.clone(),
            }));
        }
        if !lobby.contains(player_id) {
            return Err(self.refuse(LobbyError::NotInLobby {
                player_id: player_id.clone(),
            }));
        }

        let target = lobby.name.clone();
        self.lobbies
            .modify(|lobbies| {
                if let Some(lobby) = lobbies.iter_mut().find(|l| l.name == target) {
                    lobby.remove_member(player_id);
                }
            })
            .await?;

        self.metrics_collector.record_roster_change("kick");
        info!(
            "Player kicked - guild: '{}', lobby: '{}', player: '{}', by: '{}'",
            self.guild_id, target, player_id, requester
        );

        Ok(target)
    }

    /// Registered profile of a player
    pub async fn profile(&self, player_id: &PlayerId) -> Result<PlayerProfile> {
        let book = self.profiles.read().await?;
        match book.get(player_id) {
            Some(profile) => Ok(profile.clone()),
            None => Err(self.refuse(LobbyError::PlayerNotFound {
                player_id: player_id.clone(),
            })),
        }
    }

    /// Form teams for a lobby, shuffling the roster first
    pub async fn request_balance(&self, name: Option<&str>) -> Result<BalanceResult> {
        let (lobby, players) = self.balance_roster(name).await?;
        self.balance_lobby(lobby, players, &mut rand::thread_rng())
    }

    /// [`LobbyManager::request_balance`] with a caller-supplied shuffle source
    pub async fn request_balance_with<R: Rng + Send>(
        &self,
        name: Option<&str>,
        rng: &mut R,
    ) -> Result<BalanceResult> {
        let (lobby, players) = self.balance_roster(name).await?;
        self.balance_lobby(lobby, players, rng)
    }

    /// Lobby and member profiles, refusing while anyone is unregistered
    async fn balance_roster(&self, name: Option<&str>) -> Result<(Lobby, Vec<PlayerProfile>)> {
        let lobby = self.lobby(name).await?;
        let book = self.profiles.read().await?;

        let missing: Vec<PlayerId> = lobby
            .members
            .iter()
            .filter(|id| !book.contains_key(*id))
            .cloned()
            .collect();
        if !missing.is_empty() {
            self.metrics_collector.record_balance("incomplete");
            return Err(self.refuse(LobbyError::IncompleteRegistrations { players: missing }));
        }

        let players = lobby
            .members
            .iter()
            .filter_map(|id| book.get(id).cloned())
            .collect();
        Ok((lobby, players))
    }

    fn balance_lobby<R: Rng + ?Sized>(
        &self,
        lobby: Lobby,
        mut players: Vec<PlayerProfile>,
        rng: &mut R,
    ) -> Result<BalanceResult> {
        players.shuffle(rng);
        let benched: Vec<PlayerId> = players
            .iter()
            .skip(lobby.capacity)
            .map(|p| p.id.clone())
            .collect();
        players.truncate(lobby.capacity);

        let teams = match self.balancer.balance(&players, TEAM_COUNT) {
            Ok(teams) => teams,
            Err(e) => {
                self.metrics_collector.record_balance("error");
                return Err(e);
            }
        };

        self.metrics_collector.record_balance("ok");
        info!(
            "Balanced lobby - guild: '{}', lobby: '{}', players: {}, benched: {}, averages: {:?}",
            self.guild_id,
            lobby.name,
            players.len(),
            benched.len(),
            teams
                .iter()
                .map(|t| t.average_skill_rating)
                .collect::<Vec<_>>()
        );

        Ok(BalanceResult {
            lobby: lobby.name,
            teams,
            benched,
        })
    }

    /// Open a registration conversation on request
    pub async fn start_registration(&mut self, player_id: &PlayerId) -> Result<RegistrationOutcome> {
        self.registration.start(player_id).await
    }

    /// Route a direct message to the registration engine
    pub async fn handle_direct_message(
        &mut self,
        message: &InboundMessage,
    ) -> Result<RegistrationOutcome> {
        self.registration.handle_message(message).await
    }

    /// Drop idle registration conversations
    pub fn sweep_registrations(&mut self, now: DateTime<Utc>) -> usize {
        self.registration.sweep_expired(now)
    }

    /// Give the registered-player grant to every stored profile. Returns the
    /// number of grant requests issued.
    pub async fn grant_registered_role_to_all(&self) -> Result<usize> {
        let settings = self.settings()?;
        let Some(role) = settings.registered_role.filter(|r| !r.is_empty()) else {
            debug!(
                "No registered role configured - guild: '{}'",
                self.guild_id
            );
            return Ok(0);
        };

        let book = self.profiles.read().await?;
        let changes = GrantChanges {
            add: vec![role],
            remove: Vec::new(),
        };

        let mut issued = 0;
        for player_id in book.keys() {
            issued += 1;
            if let Err(e) = self
                .gateway
                .update_member_grants(&self.guild_id, player_id, &changes)
                .await
            {
                warn!(
                    "Registered role grant failed - guild: '{}', player: '{}', error: {}",
                    self.guild_id, player_id, e
                );
                self.metrics_collector
                    .registration()
                    .grant_failures_total
                    .inc();
            }
        }

        info!(
            "Issued registered role grants - guild: '{}', count: {}",
            self.guild_id, issued
        );
        Ok(issued)
    }

    /// Current lobby statistics
    pub async fn get_stats(&self) -> Result<LobbyManagerStats> {
        let roster = self.lobbies.read().await?;
        let book = self.profiles.read().await?;

        Ok(LobbyManagerStats {
            open_lobbies: roster.len(),
            players_in_lobbies: roster.iter().map(Lobby::member_count).sum(),
            registered_players: book.len(),
            registrations_in_progress: self.registration.in_progress_count(),
        })
    }
}
