//! Authoritative race state: the text, the players, and the
//! waiting → running → finished state machine.

use crate::error::GameError;
use crate::player::{Player, PlayerSnapshot, PlayerState, TypingResult};
use log::{debug, info};
use shared::GameStatus;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// One round of the race.
///
/// Structural changes (players joining or leaving, readiness, status
/// transitions) take `&mut self`. Keystrokes only need `&self`: every player
/// sits behind its own mutex, so keystrokes of different players never wait
/// on each other while those of one player are applied one at a time.
#[derive(Debug)]
pub struct TypeRacerGame {
    text: String,
    chars: Vec<char>,
    status: GameStatus,
    started_at: Option<Instant>,
    players: HashMap<u32, Mutex<Player>>,
}

impl TypeRacerGame {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let chars = text.chars().collect();
        Self {
            text,
            chars,
            status: GameStatus::WaitingForReady,
            started_at: None,
            players: HashMap::new(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    pub fn has_started(&self) -> bool {
        self.status != GameStatus::WaitingForReady
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn contains_player(&self, id: u32) -> bool {
        self.players.contains_key(&id)
    }

    pub fn add_player(&mut self, id: u32) -> Result<(), GameError> {
        if self.players.contains_key(&id) {
            return Err(GameError::DuplicatePlayer(id));
        }
        if self.has_started() {
            debug!("Player {} added after the race started", id);
        }
        self.players.insert(id, Mutex::new(Player::new(id)));
        Ok(())
    }

    pub fn remove_player(&mut self, id: u32) -> Result<(), GameError> {
        self.players
            .remove(&id)
            .map(|_| ())
            .ok_or(GameError::UnknownPlayer(id))
    }

    pub fn set_ready(&mut self, id: u32, ready: bool) -> Result<(), GameError> {
        if self.status != GameStatus::WaitingForReady {
            return Err(GameError::NotWaitingForReady(id));
        }
        let player = self
            .players
            .get_mut(&id)
            .ok_or(GameError::UnknownPlayer(id))?;
        player.get_mut().unwrap_or_else(PoisonError::into_inner).set_ready(ready);
        Ok(())
    }

    pub fn is_player_ready(&self, id: u32) -> Option<bool> {
        self.players.get(&id).map(|player| lock(player).is_ready())
    }

    /// True when there is at least one player and all of them are ready.
    pub fn is_everyone_ready(&self) -> bool {
        !self.players.is_empty() && self.players.values().all(|player| lock(player).is_ready())
    }

    /// Moves the game from waiting to running and records the start time.
    pub fn start(&mut self) -> Result<(), GameError> {
        if self.status != GameStatus::WaitingForReady {
            return Err(GameError::AlreadyStarted);
        }
        if self.players.is_empty() {
            return Err(GameError::NoPlayers);
        }
        if let Some(id) = self
            .players
            .iter()
            .find(|(_, player)| !lock(player).is_ready())
            .map(|(id, _)| *id)
        {
            return Err(GameError::PlayerNotReady(id));
        }

        self.status = GameStatus::Running;
        self.started_at = Some(Instant::now());
        info!("Race started with {} players", self.players.len());
        Ok(())
    }

    /// Applies one keystroke of player `id`.
    ///
    /// Once the game has finished every keystroke reports
    /// `PlayerFinishedAlready`. Typing before the start is a contract violation.
    pub fn type_character(&self, id: u32, character: char) -> Result<TypingResult, GameError> {
        let player = self.players.get(&id).ok_or(GameError::UnknownPlayer(id))?;

        match self.status {
            GameStatus::WaitingForReady => Err(GameError::NotRunning),
            GameStatus::Finished => Ok(TypingResult::PlayerFinishedAlready),
            GameStatus::Running => {
                let elapsed = self.elapsed();
                Ok(lock(player).type_character(character, &self.chars, elapsed))
            }
        }
    }

    /// True when the race is running and every remaining player is done.
    pub fn is_everyone_finished(&self) -> bool {
        self.status == GameStatus::Running
            && !self.players.is_empty()
            && self.players.values().all(|player| lock(player).is_finished())
    }

    /// Transitions to `Finished` if every remaining player is done.
    /// Returns true only for the call that performed the transition.
    pub fn finish_if_complete(&mut self) -> bool {
        if !self.is_everyone_finished() {
            return false;
        }
        self.status = GameStatus::Finished;
        info!("Race finished after {:.1}s", self.elapsed().as_secs_f64());
        true
    }

    pub fn player_state(&self, id: u32) -> Option<PlayerState> {
        self.players.get(&id).map(|player| lock(player).state().clone())
    }

    /// Snapshots of all players ordered by id.
    pub fn player_snapshots(&self) -> Vec<PlayerSnapshot> {
        let mut snapshots: Vec<PlayerSnapshot> = self
            .players
            .values()
            .map(|player| lock(player).snapshot())
            .collect();
        snapshots.sort_by_key(|snapshot| snapshot.player_id);
        snapshots
    }

    fn elapsed(&self) -> Duration {
        self.started_at
            .map(|started| started.elapsed())
            .unwrap_or_default()
    }
}

fn lock(player: &Mutex<Player>) -> MutexGuard<'_, Player> {
    player.lock().unwrap_or_else(PoisonError::into_inner)
}
