//! Checks run by [`InvariantRegistry::standard`].
//!
//! [`InvariantRegistry::standard`]: super::InvariantRegistry::standard

use std::collections::HashSet;

use super::{Invariant, InvariantResult, SystemSnapshot, Violation};

/// Confirmed message ids appear at most once in a message list.
///
/// Holds across optimistic sends, echoes, REST confirmations and older-page
/// prepends in any order.
pub struct NoDuplicateMessages;

impl Invariant for NoDuplicateMessages {
    fn name(&self) -> &'static str {
        "no_duplicate_messages"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            let mut seen = HashSet::new();
            for message in client.messages.iter().filter(|m| m.client_ref.is_none()) {
                if !seen.insert(message.id) {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!("client {}: message {} listed twice", client.user_id, message.id),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Each correlation ref has at most one pending optimistic entry.
pub struct SingleOptimisticPerRef;

impl Invariant for SingleOptimisticPerRef {
    fn name(&self) -> &'static str {
        "single_optimistic_per_ref"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            let mut seen = HashSet::new();
            for client_ref in client.messages.iter().filter_map(|m| m.client_ref) {
                if !seen.insert(client_ref) {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "client {}: client_ref {client_ref} pending twice",
                            client.user_id
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// A connection never has both heartbeat and reconnect timers armed, and
/// heartbeats run only while connected.
pub struct ExclusiveTimers;

impl Invariant for ExclusiveTimers {
    fn name(&self) -> &'static str {
        "exclusive_timers"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            for channel in &client.channels {
                if channel.heartbeat_armed && channel.reconnect_armed {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "client {} channel {}: heartbeat and reconnect both armed",
                            client.user_id, channel.address
                        ),
                    });
                }
                if channel.heartbeat_armed && channel.state != "Connected" {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "client {} channel {}: heartbeat armed while {}",
                            client.user_id, channel.address, channel.state
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// At most one room channel is held, and it belongs to the active room.
pub struct SingleRoomChannel;

impl Invariant for SingleRoomChannel {
    fn name(&self) -> &'static str {
        "single_room_channel"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            let rooms: Vec<_> = client.channels.iter().filter_map(|c| c.room.as_ref()).collect();

            match rooms.as_slice() {
                [] => {},
                [room] if client.active_room.as_ref() == Some(*room) => {},
                _ => {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "client {}: room channels {:?} with active room {:?}",
                            client.user_id, rooms, client.active_room
                        ),
                    });
                },
            }
        }
        Ok(())
    }
}

/// The local user never appears in their own typing set.
pub struct TypingExcludesSelf;

impl Invariant for TypingExcludesSelf {
    fn name(&self) -> &'static str {
        "typing_excludes_self"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            if client.typing.contains(&client.user_id) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("client {}: shown as typing to themselves", client.user_id),
                });
            }
        }
        Ok(())
    }
}
