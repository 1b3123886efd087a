//! Turns inbound client messages into session operations and replies.

use crate::connection::{ConnectionManager, NameStatus, Outbound};
use crate::error::{DispatchError, ProtocolError};
use crate::player::TypingResult;
use crate::session_manager::{Departure, JoinStatus, SessionManager};
use log::{debug, error, info, warn};
use shared::{ClientMessage, GameStatus, Outcome, Reason, ServerMessage, MESSAGE_TYPE_FIELD};
use std::sync::Arc;

/// How a message was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    Accepted,
    Denied(Reason),
    Keystroke(TypingResult),
}

/// Routes every client message to its handler.
///
/// Each handler answers the sender first and then notifies the rest of the
/// session, so a client always sees its own response before the broadcast
/// it caused.
pub struct MessageDispatcher {
    sessions: Arc<SessionManager>,
    connections: Arc<ConnectionManager>,
}

impl MessageDispatcher {
    pub fn new(sessions: Arc<SessionManager>, connections: Arc<ConnectionManager>) -> Self {
        Self {
            sessions,
            connections,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    /// Decodes one line of JSON, telling a missing tag apart from an
    /// unknown one and from a bad payload.
    pub fn decode(line: &str) -> Result<ClientMessage, ProtocolError> {
        let value: serde_json::Value = serde_json::from_str(line)?;
        let tag = value
            .get(MESSAGE_TYPE_FIELD)
            .and_then(|tag| tag.as_str())
            .ok_or(ProtocolError::MissingMessageType)?;
        if !ClientMessage::MESSAGE_TYPES.contains(&tag) {
            return Err(ProtocolError::UnknownMessageType(tag.to_string()));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Decodes and handles one inbound line, logging whatever went wrong.
    pub async fn dispatch_line(
        &self,
        connection_id: u32,
        line: &str,
    ) -> Result<Handled, DispatchError> {
        let result = match Self::decode(line) {
            Ok(message) => self.dispatch(connection_id, message).await,
            Err(err) => Err(err.into()),
        };

        match &result {
            Ok(Handled::Denied(reason)) => {
                debug!("Denied request of client {}: {:?}", connection_id, reason)
            }
            Ok(_) => {}
            Err(err) if err.is_contract_violation() => {
                error!("Client {}: {}", connection_id, err)
            }
            Err(err) => warn!("Client {}: {}", connection_id, err),
        }
        result
    }

    pub async fn dispatch(
        &self,
        connection_id: u32,
        message: ClientMessage,
    ) -> Result<Handled, DispatchError> {
        debug!("Client {} sent {}", connection_id, message.message_type());
        match message {
            ClientMessage::JoinGameRequest { player_name } => {
                Ok(self.handle_join_game(connection_id, &player_name))
            }
            ClientMessage::CreateSessionRequest => {
                Ok(self.handle_create_session(connection_id).await)
            }
            ClientMessage::JoinSessionRequest { session_id } => {
                self.handle_join_session(connection_id, session_id).await
            }
            ClientMessage::ReadyRequest { ready } => self.handle_ready(connection_id, ready).await,
            ClientMessage::CharacterRequest { character } => {
                self.handle_character(connection_id, character).await
            }
            ClientMessage::LeaveSessionRequest => self.handle_leave_session(connection_id).await,
        }
    }

    /// Cleans up after a connection that went away.
    pub async fn handle_disconnect(&self, connection_id: u32) {
        match self.sessions.leave(connection_id).await {
            Ok(Some(departure)) => self.announce_departure(connection_id, &departure).await,
            Ok(None) => {}
            Err(err) => error!("Client {} failed to leave its session: {}", connection_id, err),
        }
        self.connections.unregister(connection_id);
    }

    fn handle_join_game(&self, connection_id: u32, player_name: &str) -> Handled {
        let reason = match self.connections.set_player_name(connection_id, player_name) {
            NameStatus::Success => Reason::Success,
            NameStatus::InvalidUsername => Reason::InvalidUsername,
            NameStatus::UnknownConnection => Reason::Unknown,
        };
        let outcome = outcome_for(reason);
        self.reply(connection_id, ServerMessage::JoinGameResponse { outcome });

        if reason == Reason::Success {
            info!(
                "Client {} joined the game as {:?}",
                connection_id,
                self.connections.player_name(connection_id)
            );
        }
        handled_for(reason)
    }

    async fn handle_create_session(&self, connection_id: u32) -> Handled {
        let session_id = self.sessions.create_session().await;
        self.reply(
            connection_id,
            ServerMessage::CreateSessionResponse {
                session_id,
                outcome: Outcome::accepted(),
            },
        );
        Handled::Accepted
    }

    async fn handle_join_session(
        &self,
        connection_id: u32,
        session_id: u32,
    ) -> Result<Handled, DispatchError> {
        let outcome = match self.sessions.join_session(connection_id, session_id).await {
            Ok(outcome) => outcome,
            Err(err) => {
                self.reply(
                    connection_id,
                    ServerMessage::JoinSessionResponse {
                        outcome: Outcome::denied(Reason::Unknown),
                    },
                );
                return Err(err.into());
            }
        };

        let reason = outcome.status.reason();
        self.reply(
            connection_id,
            ServerMessage::JoinSessionResponse {
                outcome: outcome_for(reason),
            },
        );
        if outcome.status != JoinStatus::Success {
            return Ok(Handled::Denied(reason));
        }
        if outcome.already_member {
            return Ok(Handled::Accepted);
        }

        if let Some(previous) = &outcome.previous {
            self.announce_departure(connection_id, previous).await;
        }

        let Some(session) = self.sessions.session(session_id).await else {
            return Ok(Handled::Accepted);
        };
        session
            .broadcast_message(ServerMessage::PlayerJoinedNotification {
                num_players: outcome.num_players,
                player_id: connection_id,
                player_name: self.connections.player_name(connection_id),
            })
            .await;

        // Introduce everyone already inside to the newcomer.
        for member in session.members().await {
            if member == connection_id {
                continue;
            }
            self.reply(
                connection_id,
                ServerMessage::PlayerUpdateNotification {
                    num_players: outcome.num_players,
                    player_id: member,
                    player_name: self.connections.player_name(member),
                    ready: session.is_player_ready(member).await.unwrap_or(false),
                },
            );
        }
        Ok(Handled::Accepted)
    }

    async fn handle_ready(
        &self,
        connection_id: u32,
        ready: bool,
    ) -> Result<Handled, DispatchError> {
        let Some(session) = self.sessions.session_of(connection_id).await else {
            self.reply(
                connection_id,
                ServerMessage::ReadyResponse {
                    outcome: Outcome::denied(Reason::Unknown),
                },
            );
            return Err(ProtocolError::NotInSession(connection_id).into());
        };

        let update = match session.set_ready(connection_id, ready).await {
            Ok(update) => update,
            Err(err) => {
                self.reply(
                    connection_id,
                    ServerMessage::ReadyResponse {
                        outcome: Outcome::denied(Reason::Unknown),
                    },
                );
                return Err(err.into());
            }
        };

        self.reply(
            connection_id,
            ServerMessage::ReadyResponse {
                outcome: Outcome::accepted(),
            },
        );
        session
            .broadcast_message(ServerMessage::PlayerUpdateNotification {
                num_players: update.num_players,
                player_id: connection_id,
                player_name: self.connections.player_name(connection_id),
                ready: update.ready,
            })
            .await;

        if update.started {
            session
                .broadcast_message(ServerMessage::GameStateNotification {
                    status: GameStatus::Running,
                })
                .await;
            session
                .broadcast_message(ServerMessage::TextNotification {
                    text: session.text().await,
                })
                .await;
        }
        Ok(Handled::Accepted)
    }

    async fn handle_character(
        &self,
        connection_id: u32,
        character: char,
    ) -> Result<Handled, DispatchError> {
        let Some(session) = self.sessions.session_of(connection_id).await else {
            self.reply(connection_id, ServerMessage::CharacterResponse { correct: false });
            return Err(ProtocolError::NotInSession(connection_id).into());
        };

        let keystroke = match session.type_character(connection_id, character).await {
            Ok(keystroke) => keystroke,
            Err(err) => {
                self.reply(connection_id, ServerMessage::CharacterResponse { correct: false });
                return Err(err.into());
            }
        };

        self.reply(
            connection_id,
            ServerMessage::CharacterResponse {
                correct: keystroke.result == TypingResult::Correct,
            },
        );
        if keystroke.game_finished {
            session
                .broadcast_message(ServerMessage::GameStateNotification {
                    status: GameStatus::Finished,
                })
                .await;
        }
        Ok(Handled::Keystroke(keystroke.result))
    }

    async fn handle_leave_session(&self, connection_id: u32) -> Result<Handled, DispatchError> {
        let departure = match self.sessions.leave(connection_id).await {
            Ok(departure) => departure,
            Err(err) => {
                self.reply(
                    connection_id,
                    ServerMessage::LeaveSessionResponse {
                        outcome: Outcome::denied(Reason::Unknown),
                    },
                );
                return Err(err.into());
            }
        };

        let Some(departure) = departure else {
            self.reply(
                connection_id,
                ServerMessage::LeaveSessionResponse {
                    outcome: Outcome::denied(Reason::Unknown),
                },
            );
            return Ok(Handled::Denied(Reason::Unknown));
        };

        self.reply(
            connection_id,
            ServerMessage::LeaveSessionResponse {
                outcome: Outcome::accepted(),
            },
        );
        self.announce_departure(connection_id, &departure).await;
        Ok(Handled::Accepted)
    }

    /// Tells the remaining members who left and whether that ended the race.
    async fn announce_departure(&self, connection_id: u32, departure: &Departure) {
        if departure.session_closed {
            return;
        }
        departure
            .session
            .broadcast_message(ServerMessage::PlayerLeftNotification {
                num_players: departure.remaining,
                player_id: connection_id,
            })
            .await;
        if departure.game_finished {
            departure
                .session
                .broadcast_message(ServerMessage::GameStateNotification {
                    status: GameStatus::Finished,
                })
                .await;
        }
    }

    fn reply(&self, connection_id: u32, message: ServerMessage) {
        self.connections.send(connection_id, message);
    }
}

fn outcome_for(reason: Reason) -> Outcome {
    if reason == Reason::Success {
        Outcome::accepted()
    } else {
        Outcome::denied(reason)
    }
}

fn handled_for(reason: Reason) -> Handled {
    if reason == Reason::Success {
        Handled::Accepted
    } else {
        Handled::Denied(reason)
    }
}
