//! Wire protocol shared by the typing race server and its clients.
//!
//! Every message travels as one line of JSON. The message kind is carried in the
//! `messageType` field and all other fields use camelCase names, e.g.
//! `{"messageType":"JoinSessionRequest","sessionId":1034512}`.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 4441;
pub const MAX_SESSION_SIZE: usize = 5;
pub const STATE_BROADCAST_INTERVAL_MS: u64 = 200;
pub const MAX_PLAYER_NAME_LEN: usize = 20;

/// Name of the JSON field holding the message kind.
pub const MESSAGE_TYPE_FIELD: &str = "messageType";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionStatus {
    Accepted,
    Denied,
}

/// Why a request was (not) granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reason {
    Success,
    SessionNotFound,
    SessionGameAlreadyStarted,
    SessionFull,
    InvalidUsername,
    Unknown,
}

impl Reason {
    /// Human-readable text shown to the player.
    pub fn description(&self) -> &'static str {
        match self {
            Reason::Success => "Success.",
            Reason::SessionNotFound => "This session does not exist.",
            Reason::SessionGameAlreadyStarted => "The game has already started.",
            Reason::SessionFull => "This session is full.",
            Reason::InvalidUsername => "This username is not allowed.",
            Reason::Unknown => "An unexpected error occurred.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameStatus {
    WaitingForReady,
    Running,
    Finished,
}

/// Permission part of a response: accepted, or denied with a reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub status: PermissionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<Reason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Outcome {
    pub fn accepted() -> Self {
        Self {
            status: PermissionStatus::Accepted,
            reason: Some(Reason::Success),
            detail: None,
        }
    }

    pub fn denied(reason: Reason) -> Self {
        Self {
            status: PermissionStatus::Denied,
            reason: Some(reason),
            detail: Some(reason.description().to_string()),
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.status == PermissionStatus::Accepted
    }
}

/// Requests sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "messageType", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    JoinGameRequest { player_name: String },
    ReadyRequest { ready: bool },
    CharacterRequest { character: char },
    CreateSessionRequest,
    JoinSessionRequest { session_id: u32 },
    LeaveSessionRequest,
}

impl ClientMessage {
    /// Every `messageType` value a client may send.
    pub const MESSAGE_TYPES: [&'static str; 6] = [
        "JoinGameRequest",
        "ReadyRequest",
        "CharacterRequest",
        "CreateSessionRequest",
        "JoinSessionRequest",
        "LeaveSessionRequest",
    ];

    pub fn message_type(&self) -> &'static str {
        match self {
            ClientMessage::JoinGameRequest { .. } => "JoinGameRequest",
            ClientMessage::ReadyRequest { .. } => "ReadyRequest",
            ClientMessage::CharacterRequest { .. } => "CharacterRequest",
            ClientMessage::CreateSessionRequest => "CreateSessionRequest",
            ClientMessage::JoinSessionRequest { .. } => "JoinSessionRequest",
            ClientMessage::LeaveSessionRequest => "LeaveSessionRequest",
        }
    }
}

/// Responses and notifications sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "messageType", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    JoinGameResponse {
        #[serde(flatten)]
        outcome: Outcome,
    },
    ReadyResponse {
        #[serde(flatten)]
        outcome: Outcome,
    },
    CharacterResponse {
        correct: bool,
    },
    CreateSessionResponse {
        session_id: u32,
        #[serde(flatten)]
        outcome: Outcome,
    },
    JoinSessionResponse {
        #[serde(flatten)]
        outcome: Outcome,
    },
    LeaveSessionResponse {
        #[serde(flatten)]
        outcome: Outcome,
    },
    PlayerJoinedNotification {
        num_players: usize,
        player_id: u32,
        player_name: String,
    },
    PlayerLeftNotification {
        num_players: usize,
        player_id: u32,
    },
    PlayerUpdateNotification {
        num_players: usize,
        player_id: u32,
        player_name: String,
        ready: bool,
    },
    PlayerStateNotification {
        player_id: u32,
        accuracy: f64,
        progress: f64,
        wpm: f64,
    },
    GameStateNotification {
        status: GameStatus,
    },
    TextNotification {
        text: String,
    },
}

impl ServerMessage {
    pub fn message_type(&self) -> &'static str {
        match self {
            ServerMessage::JoinGameResponse { .. } => "JoinGameResponse",
            ServerMessage::ReadyResponse { .. } => "ReadyResponse",
            ServerMessage::CharacterResponse { .. } => "CharacterResponse",
            ServerMessage::CreateSessionResponse { .. } => "CreateSessionResponse",
            ServerMessage::JoinSessionResponse { .. } => "JoinSessionResponse",
            ServerMessage::LeaveSessionResponse { .. } => "LeaveSessionResponse",
            ServerMessage::PlayerJoinedNotification { .. } => "PlayerJoinedNotification",
            ServerMessage::PlayerLeftNotification { .. } => "PlayerLeftNotification",
            ServerMessage::PlayerUpdateNotification { .. } => "PlayerUpdateNotification",
            ServerMessage::PlayerStateNotification { .. } => "PlayerStateNotification",
            ServerMessage::GameStateNotification { .. } => "GameStateNotification",
            ServerMessage::TextNotification { .. } => "TextNotification",
        }
    }
}

/// Encodes a message as a single JSON line without the trailing newline.
pub fn encode<T: Serialize>(message: &T) -> serde_json::Result<String> {
    serde_json::to_string(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use serde_json::{json, Value};

    #[test]
    fn test_client_message_uses_message_type_tag() {
        let msg = ClientMessage::JoinSessionRequest { session_id: 42 };
        let value: Value = serde_json::from_str(&encode(&msg).unwrap()).unwrap();

        assert_eq!(value[MESSAGE_TYPE_FIELD], "JoinSessionRequest");
        assert_eq!(value["sessionId"], 42);
    }

    #[test]
    fn test_decode_character_request() {
        let line = r#"{"messageType":"CharacterRequest","character":"a"}"#;
        let msg: ClientMessage = serde_json::from_str(line).unwrap();
        assert_eq!(msg, ClientMessage::CharacterRequest { character: 'a' });
    }

    #[test]
    fn test_decode_unit_requests() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"messageType":"CreateSessionRequest"}"#).unwrap();
        assert_eq!(msg, ClientMessage::CreateSessionRequest);

        let msg: ClientMessage =
            serde_json::from_str(r#"{"messageType":"LeaveSessionRequest"}"#).unwrap();
        assert_eq!(msg, ClientMessage::LeaveSessionRequest);
    }

    #[test]
    fn test_decode_join_game_request_camel_case() {
        let line = r#"{"messageType":"JoinGameRequest","playerName":"alice"}"#;
        let msg: ClientMessage = serde_json::from_str(line).unwrap();
        assert_eq!(
            msg,
            ClientMessage::JoinGameRequest {
                player_name: "alice".to_string()
            }
        );
    }

    #[test]
    fn test_message_types_cover_all_variants() {
        let samples = [
            ClientMessage::JoinGameRequest {
                player_name: "bob".to_string(),
            },
            ClientMessage::ReadyRequest { ready: true },
            ClientMessage::CharacterRequest { character: 'x' },
            ClientMessage::CreateSessionRequest,
            ClientMessage::JoinSessionRequest { session_id: 7 },
            ClientMessage::LeaveSessionRequest,
        ];

        for sample in &samples {
            assert!(ClientMessage::MESSAGE_TYPES.contains(&sample.message_type()));
            let value: Value = serde_json::from_str(&encode(sample).unwrap()).unwrap();
            assert_eq!(value[MESSAGE_TYPE_FIELD], sample.message_type());
        }
    }

    #[test]
    fn test_outcome_is_flattened_into_response() {
        let msg = ServerMessage::JoinSessionResponse {
            outcome: Outcome::denied(Reason::SessionFull),
        };
        let value: Value = serde_json::from_str(&encode(&msg).unwrap()).unwrap();

        assert_eq!(
            value,
            json!({
                "messageType": "JoinSessionResponse",
                "status": "DENIED",
                "reason": "SESSION_FULL",
                "detail": "This session is full."
            })
        );
    }

    #[test]
    fn test_accepted_outcome_carries_success_sentinel() {
        let outcome = Outcome::accepted();
        assert!(outcome.is_accepted());
        assert_eq!(outcome.reason, Some(Reason::Success));
        assert!(outcome.detail.is_none());

        let msg = ServerMessage::CreateSessionResponse {
            session_id: 1_234_567,
            outcome,
        };
        let value: Value = serde_json::from_str(&encode(&msg).unwrap()).unwrap();
        assert_eq!(value["sessionId"], 1_234_567);
        assert_eq!(value["status"], "ACCEPTED");
        assert_eq!(value["reason"], "SUCCESS");
        assert!(value.get("detail").is_none());
    }

    #[test]
    fn test_server_message_decodes_back() {
        let line = r#"{"messageType":"ReadyResponse","status":"DENIED","reason":"UNKNOWN"}"#;
        let msg: ServerMessage = serde_json::from_str(line).unwrap();

        match msg {
            ServerMessage::ReadyResponse { outcome } => {
                assert!(!outcome.is_accepted());
                assert_eq!(outcome.reason, Some(Reason::Unknown));
                assert_eq!(outcome.detail, None);
            }
            other => panic!("Unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_player_state_notification_fields() {
        let msg = ServerMessage::PlayerStateNotification {
            player_id: 3,
            accuracy: 0.75,
            progress: 0.5,
            wpm: 42.0,
        };
        let value: Value = serde_json::from_str(&encode(&msg).unwrap()).unwrap();

        assert_eq!(value["playerId"], 3);
        assert_approx_eq!(value["accuracy"].as_f64().unwrap(), 0.75);
        assert_approx_eq!(value["progress"].as_f64().unwrap(), 0.5);
        assert_approx_eq!(value["wpm"].as_f64().unwrap(), 42.0);
    }

    #[test]
    fn test_game_status_codes() {
        let msg = ServerMessage::GameStateNotification {
            status: GameStatus::WaitingForReady,
        };
        let value: Value = serde_json::from_str(&encode(&msg).unwrap()).unwrap();
        assert_eq!(value["status"], "WAITING_FOR_READY");
    }

    #[test]
    fn test_every_denial_has_description() {
        let reasons = [
            Reason::SessionNotFound,
            Reason::SessionGameAlreadyStarted,
            Reason::SessionFull,
            Reason::InvalidUsername,
            Reason::Unknown,
        ];

        for reason in reasons {
            let outcome = Outcome::denied(reason);
            assert_eq!(outcome.status, PermissionStatus::Denied);
            assert!(!outcome.detail.unwrap().is_empty());
        }
    }
}
