//! Identity resolution: reuniting participants with their records across
//! reconnects.

use crate::error::{RoomError, RoomResult};
use crate::types::*;
use chrono::Utc;

impl Room {
    /// Find or create the participant record for an inbound connection.
    ///
    /// A claimed persistent id that matches an existing record is a rejoin:
    /// the record moves to the new connection id and keeps its vote and admin
    /// bit. Anything else is a new participant. Emits no events; the caller
    /// broadcasts.
    pub fn resolve_participant(
        &mut self,
        connection_id: &str,
        persistent_id: Option<&str>,
        display_name: &str,
    ) {
        if let Some(claimed) = persistent_id {
            let existing = self
                .participants
                .iter()
                .find(|(_, p)| p.persistent_id == claimed)
                .map(|(conn, _)| conn.clone());

            if let Some(old_conn) = existing {
                if let Some(mut participant) = self.participants.remove(&old_conn) {
                    participant.connection_id = connection_id.to_string();
                    participant.online = true;
                    participant.offline_since = None;
                    participant.display_name = display_name.to_string();
                    self.participants
                        .insert(connection_id.to_string(), participant);
                    return;
                }
            }
        }

        self.participants.insert(
            connection_id.to_string(),
            Participant::new(connection_id, persistent_id, display_name, false),
        );
    }

    /// Flip a participant offline, keeping its record and vote.
    /// Returns false when the connection holds no participant here.
    pub fn mark_offline(&mut self, connection_id: &str) -> bool {
        match self.participants.get_mut(connection_id) {
            Some(participant) => {
                participant.online = false;
                participant.offline_since = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    /// Admin gate for privileged operations
    pub fn require_admin(&self, connection_id: &str, action: &str) -> RoomResult<()> {
        let is_admin = self
            .participants
            .get(connection_id)
            .map(|p| p.is_admin)
            .unwrap_or(false);
        if is_admin {
            Ok(())
        } else {
            Err(RoomError::admin_only(action))
        }
    }
}
