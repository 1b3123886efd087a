//! Per-player typing state and keystroke validation.

use shared::ServerMessage;
use std::time::Duration;

/// Outcome of a single keystroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingResult {
    Correct,
    Incorrect,
    PlayerFinishedAlready,
}

/// Mutable race statistics of one player.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerState {
    /// Index of the next character to type.
    pub current_text_index: usize,
    /// Fraction of the text typed so far, in `[0, 1]`.
    pub progress: f64,
    pub words_per_minute: f64,
    pub characters_per_minute: f64,
    pub num_typed_words: u32,
    pub num_keystrokes: u32,
    pub num_correct_keystrokes: u32,
    pub is_ready: bool,
    pub is_finished: bool,
}

/// Point-in-time view of a player, as broadcast to the session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerSnapshot {
    pub player_id: u32,
    pub progress: f64,
    pub words_per_minute: f64,
    pub accuracy: f64,
}

impl PlayerSnapshot {
    pub fn to_notification(&self) -> ServerMessage {
        ServerMessage::PlayerStateNotification {
            player_id: self.player_id,
            accuracy: self.accuracy,
            progress: self.progress,
            wpm: self.words_per_minute,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Player {
    id: u32,
    state: PlayerState,
}

impl Player {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            state: PlayerState::default(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn state(&self) -> &PlayerState {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_ready
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.state.is_ready = ready;
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_finished
    }

    /// Share of keystrokes that matched; 1.0 before the first keystroke.
    pub fn accuracy(&self) -> f64 {
        if self.state.num_keystrokes == 0 {
            1.0
        } else {
            self.state.num_correct_keystrokes as f64 / self.state.num_keystrokes as f64
        }
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            player_id: self.id,
            progress: self.state.progress,
            words_per_minute: self.state.words_per_minute,
            accuracy: self.accuracy(),
        }
    }

    /// Validates `typed` against the character at the player's position in `text`.
    ///
    /// Speeds are recomputed on every accepted keystroke, including wrong ones,
    /// so they keep falling while a player struggles. Position and progress only
    /// move on a match.
    pub fn type_character(
        &mut self,
        typed: char,
        text: &[char],
        elapsed: Duration,
    ) -> TypingResult {
        let index = self.state.current_text_index;
        let expected = match text.get(index) {
            Some(expected) if !self.state.is_finished => *expected,
            _ => return TypingResult::PlayerFinishedAlready,
        };

        self.state.num_keystrokes += 1;

        let result = if typed == expected {
            self.state.num_correct_keystrokes += 1;
            self.state.current_text_index = index + 1;
            self.state.progress = (index + 1) as f64 / text.len() as f64;

            if expected.is_whitespace() {
                self.state.num_typed_words += 1;
            }
            if self.state.current_text_index == text.len() {
                self.state.progress = 1.0;
                self.state.is_finished = true;
            }
            TypingResult::Correct
        } else {
            TypingResult::Incorrect
        };

        self.update_typing_speeds(elapsed);
        result
    }

    fn update_typing_speeds(&mut self, elapsed: Duration) {
        self.state.words_per_minute = typing_speed(self.state.num_typed_words as usize, elapsed);
        self.state.characters_per_minute = typing_speed(self.state.current_text_index, elapsed);
    }
}

/// `metric` per minute over `elapsed`; zero when no time has passed.
fn typing_speed(metric: usize, elapsed: Duration) -> f64 {
    let seconds = elapsed.as_secs_f64();
    if seconds <= 0.0 {
        return 0.0;
    }
    metric as f64 * 60.0 / seconds
}
