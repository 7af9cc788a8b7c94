//! Role- and rating-aware team balancing
//!
//! The balancer is a pure function of its input order. Callers that want
//! different splits for the same group shuffle the roster first.

use crate::error::{LobbyError, Result};
use crate::types::{PlayerProfile, Role};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// A player placed on a team
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignedPlayer {
    pub profile: PlayerProfile,
    pub assigned_role: Role,
    /// Skill rating rounded to the nearest `RATING_BUCKET`
    pub sort_rating: u32,
}

/// One balanced team
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub players: Vec<AssignedPlayer>,
    pub average_skill_rating: u32,
}

/// Ratings are rounded to a multiple of this before ordering
pub const RATING_BUCKET: u32 = 500;

/// Players dealt to a team before moving to the next one
pub const BLOCK_SIZE: usize = 2;

/// Trait for team balancing algorithms
pub trait TeamBalancer: Send + Sync {
    /// Split `players` into `team_count` teams covering every player once
    fn balance(&self, players: &[PlayerProfile], team_count: usize) -> Result<Vec<Team>>;
}

/// Default balancer: assign roles evenly, then deal players out in pairs by
/// role and coarse rating
#[derive(Debug, Default)]
pub struct RoleBalancer;

impl RoleBalancer {
    pub fn new() -> Self {
        Self
    }

    /// Round to the nearest bucket, halves rounding up. Ratings loaded from a
    /// hand-edited document can exceed the registration limit.
    pub fn sort_rating(&self, skill_rating: u32) -> u32 {
        skill_rating.saturating_add(RATING_BUCKET / 2) / RATING_BUCKET * RATING_BUCKET
    }

    /// Give each player one role, filling every role up to its even share
    /// before falling back to the player's first preference
    fn assign_roles(&self, players: &[PlayerProfile]) -> Vec<AssignedPlayer> {
        let distinct_roles: BTreeSet<Role> = players
            .iter()
            .flat_map(|p| p.roles.iter().copied())
            .collect();
        let per_role = players.len() / distinct_roles.len().max(1);

        // Players with fewer options pick first; flexible players fill gaps
        let mut by_flexibility: Vec<&PlayerProfile> = players.iter().collect();
        by_flexibility.sort_by_key(|p| p.roles.len());

        let mut role_counts: HashMap<Role, usize> = HashMap::new();
        by_flexibility
            .into_iter()
            .map(|player| {
                let assigned_role = player
                    .roles
                    .iter()
                    .copied()
                    .find(|role| role_counts.get(role).copied().unwrap_or(0) < per_role)
                    .unwrap_or(player.roles[0]);
                *role_counts.entry(assigned_role).or_insert(0) += 1;

                AssignedPlayer {
                    profile: player.clone(),
                    assigned_role,
                    sort_rating: self.sort_rating(player.skill_rating),
                }
            })
            .collect()
    }
}

impl TeamBalancer for RoleBalancer {
    fn balance(&self, players: &[PlayerProfile], team_count: usize) -> Result<Vec<Team>> {
        if team_count == 0 {
            return Err(LobbyError::InvalidTeamCount.into());
        }
        if let Some(player) = players.iter().find(|p| p.roles.is_empty()) {
            return Err(LobbyError::InvalidProfile {
                player_id: player.id.clone(),
            }
            .into());
        }

        let mut assigned = self.assign_roles(players);

        // Role, then higher coarse rating, then voice users first
        assigned.sort_by(|a, b| {
            a.assigned_role
                .cmp(&b.assigned_role)
                .then(b.sort_rating.cmp(&a.sort_rating))
                .then(b.profile.voice_preference.cmp(&a.profile.voice_preference))
        });

        let mut teams: Vec<Vec<AssignedPlayer>> = vec![Vec::new(); team_count];
        for (index, player) in assigned.into_iter().enumerate() {
            teams[(index / BLOCK_SIZE) % team_count].push(player);
        }

        let teams: Vec<Team> = teams
            .into_iter()
            .map(|mut players| {
                players.sort_by(|a, b| {
                    a.assigned_role
                        .cmp(&b.assigned_role)
                        .then(b.profile.skill_rating.cmp(&a.profile.skill_rating))
                });
                let average_skill_rating = average_rating(&players);
                Team {
                    players,
                    average_skill_rating,
                }
            })
            .collect();

        debug!(
            "Balanced {} players into {} teams - averages: {:?}",
            players.len(),
            team_count,
            teams
                .iter()
                .map(|t| t.average_skill_rating)
                .collect::<Vec<_>>()
        );

        Ok(teams)
    }
}

/// Rounded mean of raw ratings, 0 for an empty team
fn average_rating(players: &[AssignedPlayer]) -> u32 {
    if players.is_empty() {
        return 0;
    }
    let total: u64 = players.iter().map(|p| p.profile.skill_rating as u64).sum();
    let count = players.len() as u64;
    ((total + count / 2) / count) as u32
}
