use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Opaque ID types for type safety
pub type ConnectionId = String;
pub type PersistentId = String;
pub type RoomCode = String;

/// A single submitted mood vote: one emoji plus a 1-10 rating
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoteValue {
    pub emoji: String,
    pub scale: u8,
}

/// One person's identity and voting state within a room.
///
/// `connection_id` changes on every reconnect; `persistent_id` is the stable
/// identity used to reunite the record with its new connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub connection_id: ConnectionId,
    pub persistent_id: PersistentId,
    pub display_name: String,
    pub is_admin: bool,
    pub has_voted: bool,
    pub vote: Option<VoteValue>,
    pub online: bool,
    pub offline_since: Option<DateTime<Utc>>,
}

impl Participant {
    /// A freshly joined participant with no vote yet
    pub fn new(
        connection_id: &str,
        persistent_id: Option<&str>,
        display_name: &str,
        is_admin: bool,
    ) -> Self {
        Self {
            connection_id: connection_id.to_string(),
            // Clients that supply no stable identity fall back to their first
            // connection id, which only survives as long as that connection.
            persistent_id: persistent_id.unwrap_or(connection_id).to_string(),
            display_name: display_name.to_string(),
            is_admin,
            has_voted: false,
            vote: None,
            online: true,
            offline_since: None,
        }
    }
}

/// Lifecycle phase of a room, derived from its flags
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomPhase {
    Open,
    AwaitingReveal,
    Revealed,
    Finished,
}

/// One mood-check session, identified by a 4-digit code.
///
/// Participants are keyed by their current connection id; reconnect lookup by
/// persistent id is a linear scan of the map. Rooms are never removed from
/// the store; `finished` is the soft-delete signal.
#[derive(Debug, Clone)]
pub struct Room {
    pub code: RoomCode,
    pub participants: HashMap<ConnectionId, Participant>,
    pub voting_open: bool,
    /// Legacy manual-close flag; superseded by `finished` in the primary flow
    pub closed: bool,
    pub results_revealed: bool,
    pub finished: bool,
    pub created_at: DateTime<Utc>,
}

impl Room {
    pub fn new(code: RoomCode) -> Self {
        Self {
            code,
            participants: HashMap::new(),
            voting_open: true,
            closed: false,
            results_revealed: false,
            finished: false,
            created_at: Utc::now(),
        }
    }

    pub fn phase(&self) -> RoomPhase {
        if self.finished {
            RoomPhase::Finished
        } else if self.results_revealed {
            RoomPhase::Revealed
        } else if self.voting_open {
            RoomPhase::Open
        } else {
            RoomPhase::AwaitingReveal
        }
    }

    /// Number of participants currently connected
    pub fn online_count(&self) -> usize {
        self.participants.values().filter(|p| p.online).count()
    }
}
