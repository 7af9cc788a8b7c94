//! Per-player registration state
//!
//! The conversation is an explicit state machine. Each state carries exactly
//! the answers collected so far, so a state can never be reached with a field
//! missing.

use crate::error::ValidationError;
use crate::registration::parse::{
    parse_battle_tag, parse_regions, parse_roles, parse_skill_rating, parse_voice_preference,
};
use crate::types::{PlayerId, PlayerProfile, Role};
use crate::utils::{bold_list, trim_lines};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// The question a conversation is waiting on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStep {
    Regions,
    BattleTag,
    SkillRating,
    Roles,
    VoicePreference,
}

impl RegistrationStep {
    /// Label used in logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            RegistrationStep::Regions => "regions",
            RegistrationStep::BattleTag => "battle_tag",
            RegistrationStep::SkillRating => "skill_rating",
            RegistrationStep::Roles => "roles",
            RegistrationStep::VoicePreference => "voice_preference",
        }
    }

    /// Question asked on entering this step
    pub fn prompt(&self, valid_regions: &[String]) -> String {
        match self {
            RegistrationStep::Regions => {
                let options = if valid_regions.is_empty() {
                    "**None**".to_string()
                } else {
                    format!("{}, **None**", bold_list(valid_regions))
                };
                trim_lines(&format!(
                    "Before you can participate in PUGs, we need a little bit of information about you.

                    To start off, which regions would you like to play in?
                    You will also get alerts for PUGs in the regions you choose.

                    Available options: {}",
                    options
                ))
            }
            RegistrationStep::BattleTag => "Ok. And what is your BattleTag?".to_string(),
            RegistrationStep::SkillRating => {
                "Ok. What is your current SR? Reply `unranked` if unranked.".to_string()
            }
            RegistrationStep::Roles => trim_lines(
                "Ok. Which roles would you prefer to play?
                Available options: **DPS**, **Tank**, **Support**
                You can also reply **Flex** or **Any** if you're fine with any role.",
            ),
            RegistrationStep::VoicePreference => {
                "Ok. Finally, are you going to use voice chat while playing?".to_string()
            }
        }
    }
}

impl fmt::Display for RegistrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Answers collected so far, by state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationState {
    AwaitingRegions,
    AwaitingBattleTag {
        regions: Vec<String>,
    },
    AwaitingSkillRating {
        regions: Vec<String>,
        battle_tag: String,
    },
    AwaitingRoles {
        regions: Vec<String>,
        battle_tag: String,
        skill_rating: u32,
    },
    AwaitingVoicePreference {
        regions: Vec<String>,
        battle_tag: String,
        skill_rating: u32,
        roles: Vec<Role>,
    },
}

impl RegistrationState {
    pub fn step(&self) -> RegistrationStep {
        match self {
            RegistrationState::AwaitingRegions => RegistrationStep::Regions,
            RegistrationState::AwaitingBattleTag { .. } => RegistrationStep::BattleTag,
            RegistrationState::AwaitingSkillRating { .. } => RegistrationStep::SkillRating,
            RegistrationState::AwaitingRoles { .. } => RegistrationStep::Roles,
            RegistrationState::AwaitingVoicePreference { .. } => RegistrationStep::VoicePreference,
        }
    }
}

/// Result of applying one valid reply
#[derive(Debug, Clone, PartialEq)]
pub enum StepResult {
    /// Moved on to the given step
    Advanced(RegistrationStep),
    /// Every answer collected
    Completed(PlayerProfile),
}

/// In-flight registration of one player. Never persisted.
#[derive(Debug, Clone)]
pub struct RegistrationProgress {
    player_id: PlayerId,
    state: RegistrationState,
    started_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
}

impl RegistrationProgress {
    pub fn new(player_id: impl Into<PlayerId>, now: DateTime<Utc>) -> Self {
        Self {
            player_id: player_id.into(),
            state: RegistrationState::AwaitingRegions,
            started_at: now,
            last_activity: now,
        }
    }

    pub fn player_id(&self) -> &PlayerId {
        &self.player_id
    }

    pub fn state(&self) -> &RegistrationState {
        &self.state
    }

    pub fn step(&self) -> RegistrationStep {
        self.state.step()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    /// Record that the player replied, valid or not
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity = now;
    }

    /// Whether the conversation has been idle for at least `timeout`.
    /// Activity stamped after `now` never counts as idle.
    pub fn is_idle(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        (now - self.last_activity)
            .to_std()
            .map_or(false, |idle| idle >= timeout)
    }

    /// Apply one reply to the current step.
    ///
    /// On error the state is left untouched. On completion the state is
    /// spent and the progress should be discarded.
    pub fn apply(
        &mut self,
        input: &str,
        valid_regions: &[String],
    ) -> Result<StepResult, ValidationError> {
        let input = input.trim();

        match &mut self.state {
            RegistrationState::AwaitingRegions => {
                let regions = parse_regions(input, valid_regions)?;
                self.state = RegistrationState::AwaitingBattleTag { regions };
            }
            RegistrationState::AwaitingBattleTag { regions } => {
                let battle_tag = parse_battle_tag(input)?;
                let regions = std::mem::take(regions);
                self.state = RegistrationState::AwaitingSkillRating {
                    regions,
                    battle_tag,
                };
            }
            RegistrationState::AwaitingSkillRating {
                regions,
                battle_tag,
            } => {
                let skill_rating = parse_skill_rating(input)?;
                let regions = std::mem::take(regions);
                let battle_tag = std::mem::take(battle_tag);
                self.state = RegistrationState::AwaitingRoles {
                    regions,
                    battle_tag,
                    skill_rating,
                };
            }
            RegistrationState::AwaitingRoles {
                regions,
                battle_tag,
                skill_rating,
            } => {
                let roles = parse_roles(input)?;
                let skill_rating = *skill_rating;
                let regions = std::mem::take(regions);
                let battle_tag = std::mem::take(battle_tag);
                self.state = RegistrationState::AwaitingVoicePreference {
                    regions,
                    battle_tag,
                    skill_rating,
                    roles,
                };
            }
            RegistrationState::AwaitingVoicePreference {
                regions,
                battle_tag,
                skill_rating,
                roles,
            } => {
                let voice_preference = parse_voice_preference(input);
                return Ok(StepResult::Completed(PlayerProfile {
                    id: self.player_id.clone(),
                    regions: std::mem::take(regions),
                    battle_tag: std::mem::take(battle_tag),
                    skill_rating: *skill_rating,
                    roles: std::mem::take(roles),
                    voice_preference,
                }));
            }
        }

        Ok(StepResult::Advanced(self.state.step()))
    }
}
