//! Plain-text replies for channel commands

use crate::balance::Team;
use crate::error::LobbyError;
use crate::lobby::BalanceResult;
use crate::types::{PlayerId, PlayerProfile};

/// Marker shown next to players who use voice chat
pub const VOICE_MARKER: &str = "voice";

/// Reply for a refused lobby request
pub fn refusal(error: &LobbyError, requester: &PlayerId) -> String {
    match error {
        LobbyError::LobbyNotFound { .. } => "Lobby not found!".to_string(),
        LobbyError::NoOpenLobbies => "There are no open lobbies!".to_string(),
        LobbyError::AmbiguousLobby { .. } => {
            "There is more than 1 open lobby. Please specify which one.".to_string()
        }
        LobbyError::DuplicateLobbyName { .. } => {
            "A lobby with that name already exists!".to_string()
        }
        LobbyError::AlreadyInLobby { .. } => "You're already in that lobby!".to_string(),
        LobbyError::NotInLobby { player_id } if player_id == requester => {
            "You're not in a lobby!".to_string()
        }
        LobbyError::NotInLobby { player_id } => format!("{} isn't in that lobby!", player_id),
        LobbyError::NotLobbyOwner { name } => {
            format!("Only the owner of {} can do that!", name)
        }
        LobbyError::PlayerNotFound { .. } => "Player hasn't registered yet!".to_string(),
        LobbyError::IncompleteRegistrations { players } => format!(
            "The following players are still completing their registration:\n{}",
            players.join(", ")
        ),
        LobbyError::InvalidTeamCount | LobbyError::InvalidProfile { .. } => error.to_string(),
    }
}

/// One message per team: a heading and an aligned table of members
pub fn teams(result: &BalanceResult) -> Vec<String> {
    result
        .teams
        .iter()
        .enumerate()
        .map(|(i, team)| team_table(&result.lobby, i + 1, team))
        .collect()
}

fn team_table(lobby: &str, number: usize, team: &Team) -> String {
    let tag_width = team
        .players
        .iter()
        .map(|p| p.profile.battle_tag.chars().count())
        .max()
        .unwrap_or(0);

    let rows: Vec<String> = team
        .players
        .iter()
        .map(|p| {
            let marker = if p.profile.voice_preference {
                VOICE_MARKER
            } else {
                ""
            };
            let row = format!(
                "{:<tag_width$}  {:<7}  {}",
                p.profile.battle_tag,
                p.assigned_role.as_str(),
                marker,
                tag_width = tag_width
            );
            row.trim_end().to_string()
        })
        .collect();

    format!(
        "**{} - Team {}** (average SR {})\n```\n{}\n```",
        lobby,
        number,
        team.average_skill_rating,
        rows.join("\n")
    )
}

/// Member list of a lobby
pub fn members(lobby: &str, members: &[String]) -> String {
    if members.is_empty() {
        return format!("{} has no players yet.", lobby);
    }
    format!(
        "The lobby has {} players:\n{}",
        members.len(),
        members.join(", ")
    )
}

/// Key-value table of a profile
pub fn player_info(profile: &PlayerProfile) -> String {
    let regions = if profile.regions.is_empty() {
        "none".to_string()
    } else {
        profile
            .regions
            .iter()
            .map(|r| r.to_uppercase())
            .collect::<Vec<_>>()
            .join(", ")
    };
    let rating = if profile.is_unranked() {
        "unranked".to_string()
    } else {
        profile.skill_rating.to_string()
    };
    let roles = profile
        .roles
        .iter()
        .map(|r| r.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    let pairs = [
        ("Player", profile.id.clone()),
        ("BattleTag", profile.battle_tag.clone()),
        ("SR", rating),
        ("Roles", roles),
        ("Regions", regions),
        ("Voice", profile.voice_preference.to_string()),
    ];
    let width = pairs.iter().map(|(k, _)| k.len()).max().unwrap_or(0);

    let rows: Vec<String> = pairs
        .iter()
        .map(|(k, v)| format!("{:>width$}: {}", k, v, width = width))
        .collect();
    format!("```\n{}\n```", rows.join("\n"))
}
