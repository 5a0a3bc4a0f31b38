//! WebSocket event dispatch
//!
//! Entry point for inbound client events. Room lookup, admin checks and
//! payload validation live in the state operations; this module only routes
//! events. Errors bubble back to the socket loop, which surfaces them to the
//! acting connection and nobody else.

use crate::error::RoomResult;
use crate::protocol::ClientMessage;
use crate::state::AppState;
use std::sync::Arc;

/// Handle one client event
pub async fn handle_message(
    msg: ClientMessage,
    connection_id: &str,
    state: &Arc<AppState>,
) -> RoomResult<()> {
    match msg {
        ClientMessage::CreateRoom {
            display_name,
            persistent_id,
        } => {
            tracing::info!("Room creation requested by {}", display_name);
            state
                .create_room(connection_id, &display_name, persistent_id.as_deref())
                .await
                .map(|_| ())
        }

        ClientMessage::JoinRoom {
            code,
            display_name,
            persistent_id,
        } => {
            tracing::info!("{} joining room {}", display_name, code);
            state
                .join_room(connection_id, &code, &display_name, persistent_id.as_deref())
                .await
        }

        ClientMessage::SubmitVote { code, emoji, scale } => {
            state.submit_vote(connection_id, &code, &emoji, scale).await
        }

        ClientMessage::CloseVoting { code } => state.close_voting(connection_id, &code).await,

        ClientMessage::StartVoting { code } => state.start_voting(connection_id, &code).await,

        ClientMessage::Reveal { code } => state.reveal(connection_id, &code).await,

        ClientMessage::Reset { code } => state.reset(connection_id, &code).await,

        ClientMessage::Finish { code } => state.finish(connection_id, &code).await,

        ClientMessage::LeaveRoom { code } => state.leave_room(connection_id, &code).await,
    }
}
