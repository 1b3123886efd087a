//! Registry of live sessions and of which connection sits in which session.

use crate::connection::Outbound;
use crate::error::SessionError;
use crate::id_generator::IdentifierGenerator;
use crate::session::Session;
use crate::text::TextProvider;
use log::{debug, error, info};
use shared::{Reason, ServerMessage, MAX_SESSION_SIZE, STATE_BROADCAST_INTERVAL_MS};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Answer to a join attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinStatus {
    Success,
    SessionNotFound,
    SessionGameAlreadyStarted,
    SessionFull,
}

impl JoinStatus {
    pub fn reason(&self) -> Reason {
        match self {
            JoinStatus::Success => Reason::Success,
            JoinStatus::SessionNotFound => Reason::SessionNotFound,
            JoinStatus::SessionGameAlreadyStarted => Reason::SessionGameAlreadyStarted,
            JoinStatus::SessionFull => Reason::SessionFull,
        }
    }
}

/// A connection that just left a session.
#[derive(Clone)]
pub struct Departure {
    pub session: Arc<Session>,
    pub remaining: usize,
    pub game_finished: bool,
    /// The session became empty and was closed.
    pub session_closed: bool,
}

/// Full answer to a join attempt.
#[derive(Clone)]
pub struct JoinOutcome {
    pub status: JoinStatus,
    /// The connection was already a member; nothing changed.
    pub already_member: bool,
    /// Member count of the target session after the join.
    pub num_players: usize,
    /// The session the connection was moved out of.
    pub previous: Option<Departure>,
}

impl JoinOutcome {
    fn rejected(status: JoinStatus) -> Self {
        Self {
            status,
            already_member: false,
            num_players: 0,
            previous: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub max_size: usize,
    pub broadcast_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_size: MAX_SESSION_SIZE,
            broadcast_interval: Duration::from_millis(STATE_BROADCAST_INTERVAL_MS),
        }
    }
}

#[derive(Default)]
struct Registry {
    sessions: HashMap<u32, Arc<Session>>,
    session_by_connection: HashMap<u32, u32>,
}

/// Owns every session.
///
/// The registry lock is always taken before any session lock, never the
/// other way around, so a connection can be moved between sessions without
/// anyone observing it in two places.
pub struct SessionManager {
    registry: RwLock<Registry>,
    ids: IdentifierGenerator,
    config: SessionConfig,
    outbound: Arc<dyn Outbound>,
    texts: Arc<dyn TextProvider>,
}

impl SessionManager {
    pub fn new(
        config: SessionConfig,
        ids: IdentifierGenerator,
        outbound: Arc<dyn Outbound>,
        texts: Arc<dyn TextProvider>,
    ) -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            ids,
            config,
            outbound,
            texts,
        }
    }

    /// Creates an empty session with its own text and broadcaster.
    pub async fn create_session(&self) -> u32 {
        let mut registry = self.registry.write().await;

        let mut id = self.ids.generate_id();
        while registry.sessions.contains_key(&id) {
            id = self.ids.generate_id();
        }

        let session = Arc::new(Session::new(
            id,
            self.texts.current_text(),
            self.config.max_size,
            Arc::clone(&self.outbound),
        ));
        session.start_broadcasting(self.config.broadcast_interval);
        registry.sessions.insert(id, session);

        info!("Created session {} ({} live)", id, registry.sessions.len());
        id
    }

    pub async fn join_session_by_id(
        &self,
        connection_id: u32,
        session_id: u32,
    ) -> Result<JoinStatus, SessionError> {
        Ok(self.join_session(connection_id, session_id).await?.status)
    }

    /// Joins `session_id`, leaving the connection's current session if the
    /// join succeeds. A rejected join changes nothing.
    pub async fn join_session(
        &self,
        connection_id: u32,
        session_id: u32,
    ) -> Result<JoinOutcome, SessionError> {
        let mut registry = self.registry.write().await;

        let Some(target) = registry.sessions.get(&session_id).cloned() else {
            debug!(
                "Client {} asked for unknown session {}",
                connection_id, session_id
            );
            return Ok(JoinOutcome::rejected(JoinStatus::SessionNotFound));
        };

        let current = registry.session_by_connection.get(&connection_id).copied();
        if current == Some(session_id) {
            return Ok(JoinOutcome {
                status: JoinStatus::Success,
                already_member: true,
                num_players: target.number_of_connected_clients().await,
                previous: None,
            });
        }

        let status = target.try_join(connection_id).await?;
        if status != JoinStatus::Success {
            debug!(
                "Client {} could not join session {}: {:?}",
                connection_id, session_id, status
            );
            return Ok(JoinOutcome::rejected(status));
        }
        let num_players = target.number_of_connected_clients().await;

        let previous = match current {
            Some(previous_id) => {
                match Self::depart(&mut registry, &*self.outbound, connection_id, previous_id)
                    .await
                {
                    Ok(previous) => previous,
                    Err(err) => {
                        // Leave the connection in no session rather than in one the index misses
                        if let Err(undo) = target.remove_player(connection_id).await {
                            error!(
                                "Could not undo join of client {} to session {}: {}",
                                connection_id, session_id, undo
                            );
                        }
                        return Err(err);
                    }
                }
            }
            None => None,
        };
        registry
            .session_by_connection
            .insert(connection_id, session_id);

        Ok(JoinOutcome {
            status,
            already_member: false,
            num_players,
            previous,
        })
    }

    /// Removes the connection from its session, closing the session if it
    /// became empty. `None` when the connection was in no session.
    pub async fn leave(&self, connection_id: u32) -> Result<Option<Departure>, SessionError> {
        let mut registry = self.registry.write().await;
        let Some(session_id) = registry.session_by_connection.remove(&connection_id) else {
            return Ok(None);
        };
        Self::depart(&mut registry, &*self.outbound, connection_id, session_id).await
    }

    pub async fn leave_session(&self, connection_id: u32) -> Result<bool, SessionError> {
        Ok(self.leave(connection_id).await?.is_some())
    }

    /// Closes a session and disconnects everyone still in it.
    pub async fn close_session(&self, session_id: u32) {
        let mut registry = self.registry.write().await;
        Self::close_locked(&mut registry, &*self.outbound, session_id).await;
    }

    /// Closes every session; used on shutdown.
    pub async fn close_all(&self) {
        let mut registry = self.registry.write().await;
        let ids: Vec<u32> = registry.sessions.keys().copied().collect();
        for id in ids {
            Self::close_locked(&mut registry, &*self.outbound, id).await;
        }
    }

    pub async fn session(&self, session_id: u32) -> Option<Arc<Session>> {
        self.registry.read().await.sessions.get(&session_id).cloned()
    }

    pub async fn session_of(&self, connection_id: u32) -> Option<Arc<Session>> {
        let registry = self.registry.read().await;
        registry
            .session_by_connection
            .get(&connection_id)
            .and_then(|id| registry.sessions.get(id))
            .cloned()
    }

    pub async fn session_count(&self) -> usize {
        self.registry.read().await.sessions.len()
    }

    pub async fn session_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.registry.read().await.sessions.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Sends `message` to every member of `session_id`. False if no such session.
    pub async fn broadcast(&self, session_id: u32, message: ServerMessage) -> bool {
        match self.session(session_id).await {
            Some(session) => {
                session.broadcast_message(message).await;
                true
            }
            None => false,
        }
    }

    async fn depart(
        registry: &mut Registry,
        outbound: &dyn Outbound,
        connection_id: u32,
        session_id: u32,
    ) -> Result<Option<Departure>, SessionError> {
        registry.session_by_connection.remove(&connection_id);
        let Some(session) = registry.sessions.get(&session_id).cloned() else {
            return Ok(None);
        };

        let removal = session.remove_player(connection_id).await?;
        let session_closed = removal.remaining == 0;
        if session_closed {
            Self::close_locked(registry, outbound, session_id).await;
        }

        Ok(Some(Departure {
            session,
            remaining: removal.remaining,
            game_finished: removal.game_finished,
            session_closed,
        }))
    }

    async fn close_locked(registry: &mut Registry, outbound: &dyn Outbound, session_id: u32) {
        let Some(session) = registry.sessions.remove(&session_id) else {
            return;
        };
        for member in session.close().await {
            registry.session_by_connection.remove(&member);
            outbound.disconnect(member);
        }
        info!(
            "Removed session {} ({} live)",
            session_id,
            registry.sessions.len()
        );
    }
}
