//! Parsers for free-text registration replies
//!
//! Each parser takes the trimmed reply and either produces the field value or
//! the [`ValidationError`] whose text is sent back as the re-prompt.

use crate::error::ValidationError;
use crate::types::{Role, MAX_SKILL_RATING};
use regex::Regex;
use std::sync::LazyLock;

static BATTLE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^#]+#[0-9]+$").expect("valid BattleTag pattern"));

/// Role tokens accepted besides the canonical roles
const FLEX_TOKENS: [&str; 2] = ["flex", "any"];

/// Regions the player opts into.
///
/// "none" opts out of every region. Otherwise tokens may be separated by
/// spaces, commas or "and"; unknown tokens are dropped, and at least one
/// known region must remain.
pub fn parse_regions(input: &str, valid_regions: &[String]) -> Result<Vec<String>, ValidationError> {
    let lowered = input.trim().to_lowercase();
    if lowered == "none" {
        return Ok(Vec::new());
    }

    let mut regions: Vec<String> = Vec::new();
    for token in lowered.replace(',', " ").split_whitespace() {
        if token == "and" || !valid_regions.iter().any(|r| r == token) {
            continue;
        }
        if !regions.iter().any(|r| r == token) {
            regions.push(token.to_string());
        }
    }

    if regions.is_empty() {
        return Err(ValidationError::NoValidRegions);
    }
    Ok(regions)
}

/// `Name#1234`: anything but '#', then '#', then digits
pub fn parse_battle_tag(input: &str) -> Result<String, ValidationError> {
    let tag = input.trim();
    if BATTLE_TAG.is_match(tag) {
        Ok(tag.to_string())
    } else {
        Err(ValidationError::InvalidBattleTag)
    }
}

/// Digits, or "unranked" for 0. Values above the rating ceiling are refused.
pub fn parse_skill_rating(input: &str) -> Result<u32, ValidationError> {
    let input = input.trim();
    if input.eq_ignore_ascii_case("unranked") {
        return Ok(0);
    }
    if input.is_empty() || !input.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ValidationError::InvalidSkillRating);
    }

    // Too many digits to parse is just as implausible as 5001
    match input.parse::<u64>() {
        Ok(value) if value <= MAX_SKILL_RATING as u64 => Ok(value as u32),
        _ => Err(ValidationError::UnrealisticSkillRating),
    }
}

/// Preferred roles in the order given. "flex" or "any" means every role.
pub fn parse_roles(input: &str) -> Result<Vec<Role>, ValidationError> {
    let cleaned: String = input
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();

    let tokens: Vec<&str> = cleaned
        .split_whitespace()
        .filter(|token| *token != "and")
        .collect();

    if let Some(invalid) = tokens
        .iter()
        .find(|token| !FLEX_TOKENS.contains(token) && token.parse::<Role>().is_err())
    {
        return Err(ValidationError::UnknownRole {
            token: invalid.to_string(),
        });
    }

    if tokens.is_empty() {
        return Err(ValidationError::NoRoles);
    }

    if tokens.iter().any(|token| FLEX_TOKENS.contains(token)) {
        return Ok(Role::ALL.to_vec());
    }

    let mut roles = Vec::new();
    for role in tokens.iter().filter_map(|token| token.parse::<Role>().ok()) {
        if !roles.contains(&role) {
            roles.push(role);
        }
    }
    Ok(roles)
}

/// Anything starting with 'y' is a yes
pub fn parse_voice_preference(input: &str) -> bool {
    input.trim().to_lowercase().starts_with('y')
}
