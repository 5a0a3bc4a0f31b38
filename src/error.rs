//! Error taxonomy for room operations.
//!
//! Every error here is terminal for the single operation that caused it and
//! is surfaced to the acting connection only, never broadcast.

/// Result type for room operations
pub type RoomResult<T> = Result<T, RoomError>;

/// Errors that can occur while handling a room operation
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    #[error("Room not found")]
    NotFound,

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    InvalidPayload(String),

    #[error("Room has finished")]
    Finished,

    /// Code generation gave up after a full retry burst. Practically
    /// unreachable at 10,000 codes; callers may simply retry.
    #[error("No free room codes available, please retry")]
    CodeSpaceExhausted,
}

impl RoomError {
    /// Wire code delivered alongside the human-readable message
    pub fn code(&self) -> &'static str {
        match self {
            RoomError::NotFound => "ROOM_NOT_FOUND",
            RoomError::Unauthorized(_) => "UNAUTHORIZED",
            RoomError::InvalidPayload(_) => "INVALID_PAYLOAD",
            RoomError::Finished => "ROOM_FINISHED",
            RoomError::CodeSpaceExhausted => "CODES_EXHAUSTED",
        }
    }

    pub fn admin_only(action: &str) -> Self {
        RoomError::Unauthorized(format!("Only the room admin can {}", action))
    }
}
