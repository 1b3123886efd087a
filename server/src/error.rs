//! Error types for the race server.
//!
//! Errors here describe misuse of the game or session API by the protocol
//! layer, or malformed client input. Legitimate rejections such as a full
//! session are plain result values and never show up as an `Err`.

use thiserror::Error;

/// Contract violations against a game's state machine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("game cannot start without players")]
    NoPlayers,

    #[error("player {0} is not ready, but start was attempted")]
    PlayerNotReady(u32),

    #[error("readiness can only change while waiting for players (player {0})")]
    NotWaitingForReady(u32),

    #[error("game has already started")]
    AlreadyStarted,

    #[error("game is not running")]
    NotRunning,

    #[error("player {0} is already part of the game")]
    DuplicatePlayer(u32),

    #[error("player {0} is not part of the game")]
    UnknownPlayer(u32),
}

/// Failures of a session-level operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error(transparent)]
    Game(#[from] GameError),

    #[error("session {0} is closed")]
    Closed(u32),
}

/// Problems with what a client sent.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("message has no messageType field")]
    MissingMessageType,

    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("connection {0} is not in a session")]
    NotInSession(u32),

    #[error("message is not valid UTF-8")]
    InvalidUtf8,

    #[error("message exceeds {0} bytes")]
    LineTooLong(usize),
}

/// Anything that aborted the handling of one inbound message.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("contract violation: {0}")]
    Contract(#[from] SessionError),
}

impl From<GameError> for DispatchError {
    fn from(err: GameError) -> Self {
        DispatchError::Contract(SessionError::Game(err))
    }
}

impl DispatchError {
    /// True when the error points at a server-side protocol bug rather than bad client input.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, DispatchError::Contract(_))
    }
}
