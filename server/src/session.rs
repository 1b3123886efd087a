//! A session groups connections around one race.

use crate::broadcaster;
use crate::connection::Outbound;
use crate::error::{GameError, SessionError};
use crate::game::TypeRacerGame;
use crate::player::{PlayerSnapshot, PlayerState, TypingResult};
use crate::session_manager::JoinStatus;
use log::{debug, info};
use shared::{GameStatus, ServerMessage};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// What changed after a readiness update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyUpdate {
    pub num_players: usize,
    pub ready: bool,
    /// The update made everyone ready and the race started.
    pub started: bool,
}

/// A validated keystroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keystroke {
    pub result: TypingResult,
    /// This keystroke completed the race for the whole session.
    pub game_finished: bool,
}

/// A player that left the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Removal {
    pub remaining: usize,
    /// The departure left only finished players behind and ended the race.
    pub game_finished: bool,
}

#[derive(Debug)]
struct SessionInner {
    members: BTreeSet<u32>,
    game: TypeRacerGame,
    closed: bool,
}

/// Members and game of one session.
///
/// Membership and game state share one lock, so a joiner can never slip in
/// between a capacity check and the insert, and the ready check cannot race
/// the start. Keystrokes take the lock for reading only.
pub struct Session {
    id: u32,
    max_size: usize,
    inner: RwLock<SessionInner>,
    outbound: Arc<dyn Outbound>,
    broadcaster: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    pub fn new(
        id: u32,
        text: impl Into<String>,
        max_size: usize,
        outbound: Arc<dyn Outbound>,
    ) -> Self {
        Self {
            id,
            max_size,
            inner: RwLock::new(SessionInner {
                members: BTreeSet::new(),
                game: TypeRacerGame::new(text),
                closed: false,
            }),
            outbound,
            broadcaster: Mutex::new(None),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Starts the periodic player state broadcast. Replaces a running one.
    pub fn start_broadcasting(self: &Arc<Self>, period: Duration) {
        let handle = broadcaster::spawn(self, period);
        let mut slot = self.broadcaster.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    fn stop_broadcasting(&self) {
        let handle = self
            .broadcaster
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }

    /// Adds a member without the joinability checks.
    pub async fn add_player(&self, id: u32) -> Result<usize, SessionError> {
        let mut inner = self.inner.write().await;
        if inner.closed {
            return Err(SessionError::Closed(self.id));
        }
        if inner.members.contains(&id) {
            return Err(GameError::DuplicatePlayer(id).into());
        }
        inner.game.add_player(id)?;
        inner.members.insert(id);
        Ok(inner.members.len())
    }

    /// Adds `id` if the race has not started and there is room, checked and
    /// applied under one lock.
    pub async fn try_join(&self, id: u32) -> Result<JoinStatus, SessionError> {
        let mut inner = self.inner.write().await;
        if inner.closed {
            return Err(SessionError::Closed(self.id));
        }
        if inner.game.has_started() {
            return Ok(JoinStatus::SessionGameAlreadyStarted);
        }
        if inner.members.len() >= self.max_size {
            return Ok(JoinStatus::SessionFull);
        }
        if inner.members.contains(&id) {
            return Err(GameError::DuplicatePlayer(id).into());
        }

        inner.game.add_player(id)?;
        inner.members.insert(id);
        info!(
            "Client {} joined session {} ({}/{})",
            id,
            self.id,
            inner.members.len(),
            self.max_size
        );
        Ok(JoinStatus::Success)
    }

    pub async fn remove_player(&self, id: u32) -> Result<Removal, SessionError> {
        let mut inner = self.inner.write().await;
        if inner.closed {
            return Err(SessionError::Closed(self.id));
        }
        if !inner.members.remove(&id) {
            return Err(GameError::UnknownPlayer(id).into());
        }
        inner.game.remove_player(id)?;
        let game_finished = inner.game.finish_if_complete();
        info!("Client {} left session {}", id, self.id);

        Ok(Removal {
            remaining: inner.members.len(),
            game_finished,
        })
    }

    /// Sets readiness and starts the race once everyone is ready.
    pub async fn set_ready(&self, id: u32, ready: bool) -> Result<ReadyUpdate, SessionError> {
        let mut inner = self.inner.write().await;
        if inner.closed {
            return Err(SessionError::Closed(self.id));
        }
        inner.game.set_ready(id, ready)?;

        let started = ready && inner.game.is_everyone_ready();
        if started {
            inner.game.start()?;
            info!("Session {} started its race", self.id);
        }

        Ok(ReadyUpdate {
            num_players: inner.members.len(),
            ready,
            started,
        })
    }

    /// Applies a keystroke, finishing the race if it was the last one needed.
    pub async fn type_character(
        &self,
        id: u32,
        character: char,
    ) -> Result<Keystroke, SessionError> {
        let (result, everyone_finished) = {
            let inner = self.inner.read().await;
            if inner.closed {
                return Err(SessionError::Closed(self.id));
            }
            let result = inner.game.type_character(id, character)?;
            let everyone_finished =
                result == TypingResult::Correct && inner.game.is_everyone_finished();
            (result, everyone_finished)
        };

        let game_finished = everyone_finished && self.inner.write().await.game.finish_if_complete();
        if game_finished {
            info!("Session {} finished its race", self.id);
        }

        Ok(Keystroke {
            result,
            game_finished,
        })
    }

    pub async fn number_of_connected_clients(&self) -> usize {
        self.inner.read().await.members.len()
    }

    pub async fn is_full(&self) -> bool {
        self.inner.read().await.members.len() >= self.max_size
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.members.is_empty()
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.read().await.closed
    }

    /// Open, not started and not full.
    pub async fn is_joinable(&self) -> bool {
        let inner = self.inner.read().await;
        !inner.closed && !inner.game.has_started() && inner.members.len() < self.max_size
    }

    pub async fn contains(&self, id: u32) -> bool {
        self.inner.read().await.members.contains(&id)
    }

    pub async fn members(&self) -> Vec<u32> {
        self.inner.read().await.members.iter().copied().collect()
    }

    pub async fn status(&self) -> GameStatus {
        self.inner.read().await.game.status()
    }

    pub async fn text(&self) -> String {
        self.inner.read().await.game.text().to_string()
    }

    pub async fn player_state(&self, id: u32) -> Option<PlayerState> {
        self.inner.read().await.game.player_state(id)
    }

    pub async fn is_player_ready(&self, id: u32) -> Option<bool> {
        self.inner.read().await.game.is_player_ready(id)
    }

    pub async fn player_snapshots(&self) -> Vec<PlayerSnapshot> {
        self.inner.read().await.game.player_snapshots()
    }

    /// Members and player snapshots taken under one lock. `None` once closed.
    pub(crate) async fn broadcast_view(&self) -> Option<(Vec<u32>, Vec<PlayerSnapshot>)> {
        let inner = self.inner.read().await;
        if inner.closed {
            return None;
        }
        Some((
            inner.members.iter().copied().collect(),
            inner.game.player_snapshots(),
        ))
    }

    /// Sends `message` to every current member.
    pub async fn broadcast_message(&self, message: ServerMessage) {
        let members = self.members().await;
        debug!(
            "Session {} broadcasting {} to {} members",
            self.id,
            message.message_type(),
            members.len()
        );
        self.send_to(&members, &message);
    }

    pub fn send_message(&self, id: u32, message: ServerMessage) {
        self.outbound.send(id, message);
    }

    pub(crate) fn send_to(&self, recipients: &[u32], message: &ServerMessage) {
        for id in recipients {
            self.outbound.send(*id, message.clone());
        }
    }

    /// Stops the broadcaster and empties the session. Returns the members
    /// that were still inside; later mutations fail with `Closed`.
    pub async fn close(&self) -> Vec<u32> {
        self.stop_broadcasting();
        let mut inner = self.inner.write().await;
        inner.closed = true;
        let members = std::mem::take(&mut inner.members);
        for id in &members {
            let _ = inner.game.remove_player(*id);
        }
        info!("Session {} closed", self.id);
        members.into_iter().collect()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop_broadcasting();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionManager, OUTBOUND_QUEUE_CAPACITY};
    use crate::id_generator::IdentifierGenerator;
    use tokio::sync::mpsc;

    fn session(text: &str, max_size: usize) -> (Session, Arc<ConnectionManager>) {
        let connections = Arc::new(ConnectionManager::new(IdentifierGenerator::sequential(1)));
        let outbound: Arc<dyn Outbound> = connections.clone();
        (Session::new(100, text, max_size, outbound), connections)
    }

    #[tokio::test]
    async fn test_try_join_until_full() {
        let (session, _) = session("abc", 2);

        assert_eq!(session.try_join(1).await, Ok(JoinStatus::Success));
        assert_eq!(session.try_join(2).await, Ok(JoinStatus::Success));
        assert_eq!(session.try_join(3).await, Ok(JoinStatus::SessionFull));
        assert!(session.is_full().await);
        assert!(!session.is_joinable().await);
        assert_eq!(session.number_of_connected_clients().await, 2);
    }

    #[tokio::test]
    async fn test_try_join_after_start() {
        let (session, _) = session("abc", 5);
        session.try_join(1).await.unwrap();
        session.set_ready(1, true).await.unwrap();

        assert_eq!(
            session.try_join(2).await,
            Ok(JoinStatus::SessionGameAlreadyStarted)
        );
    }

    #[tokio::test]
    async fn test_add_and_remove_contract() {
        let (session, _) = session("abc", 5);
        assert_eq!(session.add_player(1).await, Ok(1));
        assert_eq!(
            session.add_player(1).await,
            Err(SessionError::Game(GameError::DuplicatePlayer(1)))
        );
        assert_eq!(
            session.remove_player(2).await,
            Err(SessionError::Game(GameError::UnknownPlayer(2)))
        );
    }

    #[tokio::test]
    async fn test_last_ready_starts_race() {
        let (session, _) = session("abc", 5);
        session.try_join(1).await.unwrap();
        session.try_join(2).await.unwrap();

        let first = session.set_ready(1, true).await.unwrap();
        assert!(!first.started);
        assert_eq!(session.status().await, GameStatus::WaitingForReady);

        let second = session.set_ready(2, true).await.unwrap();
        assert!(second.started);
        assert_eq!(second.num_players, 2);
        assert_eq!(session.status().await, GameStatus::Running);
    }

    #[tokio::test]
    async fn test_unready_does_not_start() {
        let (session, _) = session("abc", 5);
        session.try_join(1).await.unwrap();

        let update = session.set_ready(1, false).await.unwrap();
        assert!(!update.started);
        assert_eq!(session.is_player_ready(1).await, Some(false));
    }

    #[tokio::test]
    async fn test_final_keystroke_finishes_once() {
        let (session, _) = session("ab", 5);
        session.try_join(1).await.unwrap();
        session.set_ready(1, true).await.unwrap();

        let first = session.type_character(1, 'a').await.unwrap();
        assert_eq!(first.result, TypingResult::Correct);
        assert!(!first.game_finished);

        let last = session.type_character(1, 'b').await.unwrap();
        assert!(last.game_finished);
        assert_eq!(session.status().await, GameStatus::Finished);

        let after = session.type_character(1, 'b').await.unwrap();
        assert_eq!(after.result, TypingResult::PlayerFinishedAlready);
        assert!(!after.game_finished);
    }

    #[tokio::test]
    async fn test_removal_can_finish_race() {
        let (session, _) = session("a", 5);
        session.try_join(1).await.unwrap();
        session.try_join(2).await.unwrap();
        session.set_ready(1, true).await.unwrap();
        session.set_ready(2, true).await.unwrap();
        session.type_character(1, 'a').await.unwrap();

        let removal = session.remove_player(2).await.unwrap();
        assert_eq!(removal.remaining, 1);
        assert!(removal.game_finished);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_members_only() {
        let (session, connections) = session("abc", 5);
        let addr = "127.0.0.1:1".parse().unwrap();
        let (tx_a, mut rx_a) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let (tx_b, mut rx_b) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let a = connections.register(addr, tx_a).id;
        let _b = connections.register(addr, tx_b).id;
        session.try_join(a).await.unwrap();

        session
            .broadcast_message(ServerMessage::TextNotification {
                text: "abc".to_string(),
            })
            .await;

        assert!(matches!(
            rx_a.try_recv(),
            Ok(ServerMessage::TextNotification { .. })
        ));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_session_rejects_mutations() {
        let (session, _) = session("abc", 5);
        session.try_join(1).await.unwrap();
        session.try_join(2).await.unwrap();

        let members = session.close().await;

        assert_eq!(members, vec![1, 2]);
        assert!(session.is_empty().await);
        assert!(session.is_closed().await);
        assert!(!session.is_joinable().await);
        assert_eq!(session.try_join(3).await, Err(SessionError::Closed(100)));
        assert_eq!(
            session.set_ready(1, true).await,
            Err(SessionError::Closed(100))
        );
        assert!(session.broadcast_view().await.is_none());
    }
}
