//! Connected clients and their outbound message queues.
//!
//! Every connection owns a bounded queue drained by its own writer task,
//! so handing a message to one client never waits on another client's socket.
//! A client that lets its queue fill up is disconnected.

use crate::id_generator::IdentifierGenerator;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, info, warn};
use shared::{ServerMessage, MAX_PLAYER_NAME_LEN};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Notify};

/// Messages that may wait for a client's writer before it is dropped.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 1024;

/// What the game core needs from the transport.
pub trait Outbound: Send + Sync {
    /// Queues `message` for one connection. Unknown ids are ignored.
    fn send(&self, connection_id: u32, message: ServerMessage);

    /// Asks the transport to drop a connection.
    fn disconnect(&self, connection_id: u32);
}

/// Result of registering a player name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameStatus {
    Success,
    InvalidUsername,
    UnknownConnection,
}

/// Handed back to the transport when a connection registers.
#[derive(Debug, Clone)]
pub struct Registration {
    pub id: u32,
    /// Notified when the server wants the connection closed.
    pub shutdown: Arc<Notify>,
}

#[derive(Debug)]
struct Connection {
    addr: SocketAddr,
    connected_at: Instant,
    sender: mpsc::Sender<ServerMessage>,
    shutdown: Arc<Notify>,
    player_name: Option<String>,
}

pub struct ConnectionManager {
    connections: DashMap<u32, Connection>,
    ids: IdentifierGenerator,
}

impl ConnectionManager {
    pub fn new(ids: IdentifierGenerator) -> Self {
        Self {
            connections: DashMap::new(),
            ids,
        }
    }

    /// Stores a new connection under an id no live connection holds.
    pub fn register(&self, addr: SocketAddr, sender: mpsc::Sender<ServerMessage>) -> Registration {
        let shutdown = Arc::new(Notify::new());
        let connection = Connection {
            addr,
            connected_at: Instant::now(),
            sender,
            shutdown: Arc::clone(&shutdown),
            player_name: None,
        };

        let id = loop {
            let id = self.ids.generate_id();
            match self.connections.entry(id) {
                Entry::Occupied(_) => {
                    debug!("Connection id {} is still in use, drawing again", id)
                }
                Entry::Vacant(slot) => {
                    slot.insert(connection);
                    break id;
                }
            }
        };
        info!("Client {} connected from {}", id, addr);
        Registration { id, shutdown }
    }

    /// Forgets a connection. Dropping its sender lets the writer task drain and exit.
    pub fn unregister(&self, id: u32) -> bool {
        match self.connections.remove(&id) {
            Some((_, connection)) => {
                info!(
                    "Client {} ({}) disconnected after {:.1}s",
                    id,
                    connection.addr,
                    connection.connected_at.elapsed().as_secs_f64()
                );
                true
            }
            None => false,
        }
    }

    pub fn is_connected(&self, id: u32) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn set_player_name(&self, id: u32, name: &str) -> NameStatus {
        let Some(name) = validate_player_name(name) else {
            return NameStatus::InvalidUsername;
        };
        match self.connections.get_mut(&id) {
            Some(mut connection) => {
                debug!("Client {} is now known as {:?}", id, name);
                connection.player_name = Some(name);
                NameStatus::Success
            }
            None => NameStatus::UnknownConnection,
        }
    }

    /// Registered name, or a generated one for clients that never sent theirs.
    pub fn player_name(&self, id: u32) -> String {
        self.connections
            .get(&id)
            .and_then(|connection| connection.player_name.clone())
            .unwrap_or_else(|| format!("Player {}", id))
    }
}

impl Outbound for ConnectionManager {
    fn send(&self, connection_id: u32, message: ServerMessage) {
        let sent = match self.connections.get(&connection_id) {
            Some(connection) => connection.sender.try_send(message),
            None => {
                debug!(
                    "Dropping {} for unknown client {}",
                    message.message_type(),
                    connection_id
                );
                return;
            }
        };

        match sent {
            Ok(()) => {}
            Err(TrySendError::Full(message)) => {
                warn!(
                    "Outbound queue of client {} is full at {}, disconnecting",
                    connection_id,
                    message.message_type()
                );
                self.disconnect(connection_id);
            }
            Err(TrySendError::Closed(_)) => {
                warn!("Outbound queue of client {} is closed", connection_id)
            }
        }
    }

    fn disconnect(&self, connection_id: u32) {
        if let Some((_, connection)) = self.connections.remove(&connection_id) {
            info!("Disconnecting client {}", connection_id);
            // notify_one keeps a permit, so a reader that is not waiting yet still sees it
            connection.shutdown.notify_one();
        }
    }
}

/// Trims `name` and checks it is 1..=MAX_PLAYER_NAME_LEN characters of
/// letters, digits, spaces, `_` or `-`.
pub fn validate_player_name(name: &str) -> Option<String> {
    let name = name.trim();
    let length = name.chars().count();
    let allowed = name
        .chars()
        .all(|c| c.is_alphanumeric() || c == ' ' || c == '_' || c == '-');

    if (1..=MAX_PLAYER_NAME_LEN).contains(&length) && allowed {
        Some(name.to_string())
    } else {
        None
    }
}
