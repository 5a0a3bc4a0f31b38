use crate::error::RoomError;
use crate::types::*;
use serde::{Deserialize, Serialize};

/// Events a client may send.
///
/// Payloads are validated at this boundary by serde (required fields, field
/// types); domain validation (scale range, emoji shape, admin checks) happens
/// in the state operations. `scale` is deliberately wider than the accepted
/// range so an out-of-range value reaches the state machine as an
/// `INVALID_PAYLOAD` rejection instead of dying in deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "kebab-case")]
pub enum ClientMessage {
    CreateRoom {
        display_name: String,
        #[serde(default)]
        persistent_id: Option<PersistentId>,
    },
    JoinRoom {
        code: RoomCode,
        display_name: String,
        #[serde(default)]
        persistent_id: Option<PersistentId>,
    },
    SubmitVote {
        code: RoomCode,
        emoji: String,
        scale: i64,
    },
    /// Legacy manual close; superseded by auto-reveal/finish
    CloseVoting {
        code: RoomCode,
    },
    /// Re-open voting after a manual close
    StartVoting {
        code: RoomCode,
    },
    Reveal {
        code: RoomCode,
    },
    Reset {
        code: RoomCode,
    },
    Finish {
        code: RoomCode,
    },
    LeaveRoom {
        code: RoomCode,
    },
}

/// Events the server emits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "kebab-case")]
pub enum ServerMessage {
    RoomCreated {
        code: RoomCode,
    },
    RoomJoined {
        code: RoomCode,
    },
    /// Full-replace participant list, never a delta
    Presence {
        participants: Vec<PresenceEntry>,
    },
    VoteAck,
    VotingStarted,
    VotingClosed,
    ResultsRevealed {
        results: Vec<VoteResult>,
    },
    RoundReset,
    SessionFinished {
        code: RoomCode,
    },
    Error {
        code: String,
        msg: String,
    },
}

impl ServerMessage {
    pub fn error(err: &RoomError) -> Self {
        ServerMessage::Error {
            code: err.code().to_string(),
            msg: err.to_string(),
        }
    }
}

/// Public per-participant view carried in every presence push
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresenceEntry {
    pub persistent_id: PersistentId,
    pub display_name: String,
    pub is_admin: bool,
    pub has_voted: bool,
    pub online: bool,
}

impl From<&Participant> for PresenceEntry {
    fn from(p: &Participant) -> Self {
        Self {
            persistent_id: p.persistent_id.clone(),
            display_name: p.display_name.clone(),
            is_admin: p.is_admin,
            has_voted: p.has_voted,
            online: p.online,
        }
    }
}

/// One revealed vote
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoteResult {
    pub participant_id: PersistentId,
    pub display_name: String,
    pub emoji: String,
    pub scale: u8,
}
