mod identity;
mod presence;
mod room;
mod session;

pub use session::validate_vote;

use crate::notify::Notifier;
use crate::protocol::ServerMessage;
use crate::types::*;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// Handle to one live WebSocket connection.
///
/// Messages queued on `tx` are drained in order by the connection's writer
/// task, so everything sent to a connection arrives in queue order.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub tx: mpsc::UnboundedSender<ServerMessage>,
    /// Code of the room this connection has created or joined, if any
    pub room: Option<RoomCode>,
}

/// Shared application state.
///
/// The room table is the unit of mutual exclusion: every mutating operation
/// takes its write lock, so no two operations ever interleave their
/// read-modify-write of a room.
#[derive(Clone)]
pub struct AppState {
    pub rooms: Arc<RwLock<HashMap<RoomCode, Room>>>,
    pub connections: Arc<RwLock<HashMap<ConnectionId, ConnectionHandle>>>,
    pub notifier: Arc<Notifier>,
}

impl AppState {
    pub fn new() -> Self {
        Self::with_notifier(Notifier::disabled())
    }

    pub fn with_notifier(notifier: Notifier) -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            connections: Arc::new(RwLock::new(HashMap::new())),
            notifier: Arc::new(notifier),
        }
    }

    /// Register a freshly upgraded connection's outbound queue
    pub async fn register_connection(
        &self,
        connection_id: &str,
        tx: mpsc::UnboundedSender<ServerMessage>,
    ) {
        self.connections
            .write()
            .await
            .insert(connection_id.to_string(), ConnectionHandle { tx, room: None });
    }

    /// Tag a connection with the room it belongs to
    pub(crate) async fn set_connection_room(&self, connection_id: &str, code: Option<&str>) {
        if let Some(handle) = self.connections.write().await.get_mut(connection_id) {
            handle.room = code.map(str::to_string);
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
