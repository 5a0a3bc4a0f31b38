//! The room store: an in-memory registry of live rooms keyed by 4-digit code.

use super::AppState;
use crate::error::{RoomError, RoomResult};
use crate::protocol::ServerMessage;
use crate::types::*;
use rand::Rng;

/// Room codes are 4 decimal digits, zero-padded
const CODE_SPACE: u32 = 10_000;
/// Attempts before a create call gives up; practically unreachable
const MAX_CODE_ATTEMPTS: u32 = CODE_SPACE;

fn generate_room_code() -> RoomCode {
    let mut rng = rand::rng();
    format!("{:04}", rng.random_range(0..CODE_SPACE))
}

impl AppState {
    /// Create a room with the caller as its admin and sole participant,
    /// voting open immediately.
    ///
    /// Code generation and insertion happen under one write lock so two
    /// concurrent creates can never claim the same code. Emits
    /// `room-created`, `voting-started`, then the first presence push.
    pub async fn create_room(
        &self,
        connection_id: &str,
        display_name: &str,
        persistent_id: Option<&str>,
    ) -> RoomResult<RoomCode> {
        let code = {
            let mut rooms = self.rooms.write().await;

            let mut attempts = 0;
            let code = loop {
                let candidate = generate_room_code();
                if !rooms.contains_key(&candidate) {
                    break candidate;
                }
                attempts += 1;
                if attempts >= MAX_CODE_ATTEMPTS {
                    return Err(RoomError::CodeSpaceExhausted);
                }
            };

            let mut room = Room::new(code.clone());
            room.participants.insert(
                connection_id.to_string(),
                Participant::new(connection_id, persistent_id, display_name, true),
            );
            rooms.insert(code.clone(), room);
            code
        };

        self.set_connection_room(connection_id, Some(&code)).await;

        tracing::info!("Room {} created by {}", code, display_name);

        self.send_to(
            connection_id,
            ServerMessage::RoomCreated { code: code.clone() },
        )
        .await;
        self.send_to(connection_id, ServerMessage::VotingStarted).await;
        self.broadcast_presence(&code).await;

        Ok(code)
    }

    /// Snapshot of a room, for read paths and tests
    pub async fn get_room(&self, code: &str) -> RoomResult<Room> {
        self.rooms
            .read()
            .await
            .get(code)
            .cloned()
            .ok_or(RoomError::NotFound)
    }

    /// Run a mutation against one room under the table write lock.
    ///
    /// All state-machine transitions go through here, which serializes every
    /// mutating operation; an unknown code aborts with `NotFound` before the
    /// closure runs.
    pub(crate) async fn with_room_mut<T>(
        &self,
        code: &str,
        mutate: impl FnOnce(&mut Room) -> RoomResult<T>,
    ) -> RoomResult<T> {
        let mut rooms = self.rooms.write().await;
        let room = rooms.get_mut(code).ok_or(RoomError::NotFound)?;
        mutate(room)
    }
}
