//! Input line parsing.
//!
//! Plain lines are chat messages. Lines starting with `/` are commands:
//!
//! | Command | Effect |
//! |---------|--------|
//! | `/room <workspace> <room>` | Enter a room |
//! | `/leave` | Leave the active room |
//! | `/older` | Load the next older page |
//! | `/reload` | Reload the newest page |
//! | `/status <online\|idle\|dnd\|offline>` | Change presence status |
//! | `/note [text]` | Set the custom status, or clear it |
//! | `/watch <user>...` | Watch presence of users |
//! | `/quit` | Exit |

use murmur_client::SyncEvent;
use murmur_proto::{PresenceStatus, RoomKey, UserId};
use thiserror::Error;

/// Errors from [`parse`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    /// Command name not recognised
    #[error("unknown command: /{0}")]
    Unknown(String),

    /// Required argument missing
    #[error("usage: {0}")]
    Usage(&'static str),

    /// Argument failed to parse
    #[error("invalid {what}: {value}")]
    Invalid {
        /// Argument name
        what: &'static str,
        /// Offending value
        value: String,
    },
}

/// What an input line asks for.
#[derive(Debug, PartialEq)]
pub enum Command {
    /// Feed this event to the engine
    Sync(SyncEvent),
    /// Exit the client
    Quit,
    /// Blank line
    Nothing,
}

/// Parse one input line.
pub fn parse(line: &str) -> Result<Command, CommandError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let Some(rest) = line.strip_prefix('/') else {
        if line.trim().is_empty() {
            return Ok(Command::Nothing);
        }
        return Ok(Command::Sync(SyncEvent::SendMessage { text: line.to_string() }));
    };

    let (name, args) = rest.split_once(' ').unwrap_or((rest, ""));
    let args = args.trim();

    let event = match name {
        "quit" | "exit" => return Ok(Command::Quit),
        "room" => {
            const USAGE: &str = "/room <workspace> <room>";
            let mut parts = args.split_whitespace();
            let workspace = parse_id(parts.next().ok_or(CommandError::Usage(USAGE))?, "workspace")?;
            let room = parse_id(parts.next().ok_or(CommandError::Usage(USAGE))?, "room")?;
            SyncEvent::EnterRoom { room: RoomKey::new(workspace, room) }
        },
        "leave" => SyncEvent::LeaveRoom,
        "older" => SyncEvent::LoadOlder,
        "reload" => SyncEvent::ReloadHistory,
        "status" => {
            if args.is_empty() {
                return Err(CommandError::Usage("/status <online|idle|dnd|offline>"));
            }
            let status = args
                .parse::<PresenceStatus>()
                .map_err(|_| CommandError::Invalid { what: "status", value: args.to_string() })?;
            SyncEvent::ChangeStatus { status }
        },
        "note" => {
            let text = (!args.is_empty()).then(|| args.to_string());
            SyncEvent::ChangeCustomStatus { text, emoji: None }
        },
        "watch" => {
            let user_ids =
                args.split_whitespace().map(|id| parse_id(id, "user")).collect::<Result<Vec<UserId>, _>>()?;
            if user_ids.is_empty() {
                return Err(CommandError::Usage("/watch <user>..."));
            }
            SyncEvent::SubscribePresence { user_ids }
        },
        other => return Err(CommandError::Unknown(other.to_string())),
    };

    Ok(Command::Sync(event))
}

fn parse_id(value: &str, what: &'static str) -> Result<u64, CommandError> {
    value.parse().map_err(|_| CommandError::Invalid { what, value: value.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_a_message() {
        assert_eq!(
            parse("hello there\n").unwrap(),
            Command::Sync(SyncEvent::SendMessage { text: "hello there".to_string() })
        );
    }

    #[test]
    fn blank_line_does_nothing() {
        assert_eq!(parse("   ").unwrap(), Command::Nothing);
    }

    #[test]
    fn room_takes_two_ids() {
        assert_eq!(
            parse("/room 3 7").unwrap(),
            Command::Sync(SyncEvent::EnterRoom { room: RoomKey::new(3, 7) })
        );
        assert_eq!(parse("/room 3"), Err(CommandError::Usage("/room <workspace> <room>")));
        assert!(matches!(parse("/room x 7"), Err(CommandError::Invalid { what: "workspace", .. })));
    }

    #[test]
    fn paging_commands() {
        assert_eq!(parse("/older").unwrap(), Command::Sync(SyncEvent::LoadOlder));
        assert_eq!(parse("/reload").unwrap(), Command::Sync(SyncEvent::ReloadHistory));
        assert_eq!(parse("/leave").unwrap(), Command::Sync(SyncEvent::LeaveRoom));
    }

    #[test]
    fn status_is_validated() {
        assert_eq!(
            parse("/status dnd").unwrap(),
            Command::Sync(SyncEvent::ChangeStatus { status: PresenceStatus::Dnd })
        );
        assert!(matches!(parse("/status busy"), Err(CommandError::Invalid { what: "status", .. })));
        assert!(matches!(parse("/status"), Err(CommandError::Usage(_))));
    }

    #[test]
    fn note_sets_or_clears() {
        assert_eq!(
            parse("/note out for lunch").unwrap(),
            Command::Sync(SyncEvent::ChangeCustomStatus {
                text: Some("out for lunch".to_string()),
                emoji: None
            })
        );
        assert_eq!(
            parse("/note").unwrap(),
            Command::Sync(SyncEvent::ChangeCustomStatus { text: None, emoji: None })
        );
    }

    #[test]
    fn watch_parses_user_list() {
        assert_eq!(
            parse("/watch 4 9").unwrap(),
            Command::Sync(SyncEvent::SubscribePresence { user_ids: vec![4, 9] })
        );
        assert!(matches!(parse("/watch"), Err(CommandError::Usage(_))));
        assert!(matches!(parse("/watch 4 bob"), Err(CommandError::Invalid { what: "user", .. })));
    }

    #[test]
    fn quit_and_unknown() {
        assert_eq!(parse("/quit").unwrap(), Command::Quit);
        assert_eq!(parse("/dance"), Err(CommandError::Unknown("dance".to_string())));
    }
}
