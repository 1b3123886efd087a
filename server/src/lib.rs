//! # Typing Race Server Library
//!
//! This library provides the authoritative server for multiplayer typing races.
//! Players gather in sessions, mark themselves ready, and race to type the same
//! text. The server validates every keystroke, decides when a race starts and
//! ends, and keeps every member of a session informed about everyone's progress.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Validation
//! Clients only send the characters they type. Whether a character was correct,
//! how far a player has progressed, and how fast they are typing is decided
//! here and nowhere else.
//!
//! ### Session Management
//! Handles the lifecycle of sessions:
//! - Creation with a freshly drawn text and identifier
//! - Joining with capacity and "already started" checks
//! - Moving connections between sessions
//! - Closing a session once its last member has left
//!
//! ### State Broadcasting
//! Every session periodically sends the progress, speed and accuracy of each of
//! its players to all members, independent of when keystrokes arrive.
//!
//! ## Architecture Design
//!
//! ### Task Per Connection
//! Each TCP connection gets a reader task, which decodes and dispatches its
//! messages in arrival order, and a writer task that drains the connection's
//! bounded outbound queue. Responses and broadcasts are queued, so a slow client
//! never stalls anybody else; one that stops reading is disconnected.
//!
//! ### Locking
//! The session registry and every session have their own async `RwLock`.
//! Keystrokes only take a session's lock for reading and lock the typing
//! player alone, so players of the same session type concurrently while
//! membership changes and game transitions stay serialized.
//!
//! ## Module Organization
//!
//! ### Game Modules (`player`, `game`)
//! Keystroke validation, typing statistics, and the
//! waiting → running → finished state machine of one race.
//!
//! ### Session Modules (`session`, `session_manager`, `broadcaster`)
//! Membership, joinability rules, the registry of live sessions and the
//! periodic player state broadcast.
//!
//! ### Protocol Modules (`codec`, `dispatcher`, `connection`, `network`)
//! Line framing, message decoding and routing, the per-connection outbound
//! queues and the TCP transport speaking newline-delimited JSON.
//!
//! ### Support Modules (`config`, `error`, `id_generator`, `text`)
//! Command line configuration, error types, identifier generation and the
//! texts players race on.

pub mod broadcaster;
pub mod codec;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod game;
pub mod id_generator;
pub mod network;
pub mod player;
pub mod session;
pub mod session_manager;
pub mod text;

pub use config::{Args, ServerConfig};
pub use connection::{ConnectionManager, Outbound};
pub use dispatcher::{Handled, MessageDispatcher};
pub use error::{DispatchError, GameError, ProtocolError, SessionError};
pub use game::TypeRacerGame;
pub use network::Server;
pub use session::Session;
pub use session_manager::{JoinStatus, SessionConfig, SessionManager};
pub use text::{TextProvider, TextSource};
