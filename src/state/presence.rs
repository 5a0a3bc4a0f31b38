//! Presence broadcasting: the full participant list pushed to a room after
//! every mutation.

use super::AppState;
use crate::protocol::{PresenceEntry, ServerMessage};
use crate::types::*;

impl Room {
    /// Current participant list as carried by a presence push.
    /// Admins sort first, then by display name, so clients render a stable
    /// order without tracking join times.
    pub fn presence(&self) -> Vec<PresenceEntry> {
        let mut entries: Vec<PresenceEntry> =
            self.participants.values().map(PresenceEntry::from).collect();
        entries.sort_by(|a, b| {
            b.is_admin
                .cmp(&a.is_admin)
                .then_with(|| a.display_name.cmp(&b.display_name))
                .then_with(|| a.persistent_id.cmp(&b.persistent_id))
        });
        entries
    }
}

impl AppState {
    /// Queue a message on one connection's outbound channel.
    /// A dropped receiver means the socket is closing; nothing to do then.
    pub async fn send_to(&self, connection_id: &str, msg: ServerMessage) {
        let connections = self.connections.read().await;
        if let Some(handle) = connections.get(connection_id) {
            let _ = handle.tx.send(msg);
        }
    }

    /// Deliver a message to every connection joined to a room
    pub async fn broadcast_to_room(&self, code: &str, msg: ServerMessage) {
        let connections = self.connections.read().await;
        for handle in connections
            .values()
            .filter(|h| h.room.as_deref() == Some(code))
        {
            let _ = handle.tx.send(msg.clone());
        }
    }

    /// Push the room's full participant list to all of its connections.
    ///
    /// Always a full replace, never a delta; the triggering operation must
    /// have queued the actor's own acknowledgment first so clients see
    /// ack-then-presence in causal order.
    pub async fn broadcast_presence(&self, code: &str) {
        let participants = {
            let rooms = self.rooms.read().await;
            match rooms.get(code) {
                Some(room) => room.presence(),
                None => return,
            }
        };
        self.broadcast_to_room(code, ServerMessage::Presence { participants })
            .await;
    }
}
