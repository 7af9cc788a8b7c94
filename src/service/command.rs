//! Parsing of `!command` messages posted in guild channels

use crate::types::PlayerId;
use thiserror::Error;

/// Prefix marking a message as a command
pub const COMMAND_PREFIX: char = '!';

/// A recognised command with its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    CreateLobby {
        name: String,
    },
    CloseLobby {
        name: Option<String>,
    },
    Join {
        name: Option<String>,
    },
    /// Any lobby name typed after `!leave` is ignored
    Leave,
    Kick {
        player_id: PlayerId,
        name: Option<String>,
    },
    LobbyPlayers {
        name: Option<String>,
    },
    Balance {
        name: Option<String>,
    },
    Register,
    AutoRegister,
    Player {
        player_id: PlayerId,
    },
}

/// A known command with missing arguments
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Usage: {usage}")]
    Usage { usage: &'static str },
}

impl Command {
    /// Parse a channel message. `Ok(None)` for anything that is not a known
    /// command.
    pub fn parse(text: &str) -> Result<Option<Command>, CommandError> {
        let Some(body) = text.trim().strip_prefix(COMMAND_PREFIX) else {
            return Ok(None);
        };

        let mut words = body.split_whitespace();
        let Some(keyword) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();
        let rest = optional_name(&args);

        let command = match keyword.to_lowercase().as_str() {
            "createlobby" => Command::CreateLobby {
                name: rest.ok_or(CommandError::Usage {
                    usage: "!createlobby <lobby name>",
                })?,
            },
            "closelobby" => Command::CloseLobby { name: rest },
            "join" => Command::Join { name: rest },
            "leave" => Command::Leave,
            "lobbykick" => {
                let (user, name) = args.split_first().ok_or(CommandError::Usage {
                    usage: "!lobbykick <user> [lobby name]",
                })?;
                Command::Kick {
                    player_id: mention_id(user),
                    name: optional_name(name),
                }
            }
            "lobbyplayers" => Command::LobbyPlayers { name: rest },
            "balance" => Command::Balance { name: rest },
            "register" => Command::Register,
            "autoregister" => Command::AutoRegister,
            "player" => {
                let user = args.first().ok_or(CommandError::Usage {
                    usage: "!player <user>",
                })?;
                Command::Player {
                    player_id: mention_id(user),
                }
            }
            _ => return Ok(None),
        };

        Ok(Some(command))
    }

    /// Name used in logs
    pub fn keyword(&self) -> &'static str {
        match self {
            Command::CreateLobby { .. } => "createlobby",
            Command::CloseLobby { .. } => "closelobby",
            Command::Join { .. } => "join",
            Command::Leave => "leave",
            Command::Kick { .. } => "lobbykick",
            Command::LobbyPlayers { .. } => "lobbyplayers",
            Command::Balance { .. } => "balance",
            Command::Register => "register",
            Command::AutoRegister => "autoregister",
            Command::Player { .. } => "player",
        }
    }
}

/// Lobby names may contain spaces
fn optional_name(args: &[&str]) -> Option<String> {
    if args.is_empty() {
        None
    } else {
        Some(args.join(" "))
    }
}

/// Accept `<@123>`, `<@!123>`, `@123` or a bare id
fn mention_id(raw: &str) -> PlayerId {
    raw.trim_start_matches('<')
        .trim_end_matches('>')
        .trim_start_matches('@')
        .trim_start_matches('!')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_commands_are_ignored() {
        assert_eq!(Command::parse("hello there"), Ok(None));
        assert_eq!(Command::parse("!"), Ok(None));
        assert_eq!(Command::parse("!dance"), Ok(None));
    }

    #[test]
    fn test_lobby_names_keep_spaces() {
        assert_eq!(
            Command::parse("!createlobby Friday Night Scrims"),
            Ok(Some(Command::CreateLobby {
                name: "Friday Night Scrims".to_string()
            }))
        );
        assert_eq!(
            Command::parse("!JOIN  scrims "),
            Ok(Some(Command::Join {
                name: Some("scrims".to_string())
            }))
        );
        assert_eq!(
            Command::parse("!balance"),
            Ok(Some(Command::Balance { name: None }))
        );
    }

    #[test]
    fn test_missing_arguments() {
        assert!(matches!(
            Command::parse("!createlobby"),
            Err(CommandError::Usage { .. })
        ));
        assert!(matches!(
            Command::parse("!lobbykick"),
            Err(CommandError::Usage { .. })
        ));
        assert!(matches!(
            Command::parse("!player"),
            Err(CommandError::Usage { .. })
        ));
    }

    #[test]
    fn test_mentions() {
        assert_eq!(
            Command::parse("!lobbykick <@!42> scrims"),
            Ok(Some(Command::Kick {
                player_id: "42".to_string(),
                name: Some("scrims".to_string())
            }))
        );
        assert_eq!(
            Command::parse("!player @alice"),
            Ok(Some(Command::Player {
                player_id: "alice".to_string()
            }))
        );
        assert_eq!(
            Command::parse("!leave scrims"),
            Ok(Some(Command::Leave))
        );
    }
}
