//! Inbound and outbound events.
//!
//! Every frame on the wire is one JSON object discriminated by a `type`
//! string:
//!
//! ```text
//! { "type": "join-room", "roomCode": "AB12CD" }
//! { "type": "member-joined", "userId": 7, "username": "ada", "role": "player" }
//! ```
//!
//! `#[serde(tag = "type", rename_all = "kebab-case")]` gives the
//! internally-tagged, kebab-case discriminator; each variant's
//! `#[serde(rename_all = "camelCase")]` gives the JavaScript-style field
//! names browsers expect.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ProtocolError, Role, RoomCode, RoomStatus, UserId};

/// Chat messages longer than this (in characters, after trimming) are
/// truncated.
pub const CHAT_MAX_LEN: usize = 500;

// ---------------------------------------------------------------------------
// Shared payload types
// ---------------------------------------------------------------------------

/// A player's chosen AI provider and model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSelection {
    pub provider: String,
    pub model: String,
}

/// The final outcome of a contest, written once when the room finishes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameResult {
    pub player1_score: u32,
    pub player2_score: u32,
    pub player1_prompts_used: u32,
    pub player2_prompts_used: u32,
    /// Serialized evaluation detail; opaque to the server.
    #[serde(default)]
    pub detail: Option<Value>,
    /// `None` for a draw.
    #[serde(default)]
    pub winner: Option<UserId>,
}

/// One live member of a room, as shown to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberView {
    pub user_id: UserId,
    pub username: String,
    pub role: Role,
}

/// Full picture of a room: the durable record plus who is connected now.
/// Sent to a connection when it joins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub code: RoomCode,
    pub status: RoomStatus,
    pub host: UserId,
    pub challenge_id: String,
    pub player1: Option<UserId>,
    pub player2: Option<UserId>,
    pub player1_ready: bool,
    pub player2_ready: bool,
    pub player1_provider: Option<ProviderSelection>,
    pub player2_provider: Option<ProviderSelection>,
    pub player1_penalties: u32,
    pub player2_penalties: u32,
    pub result: Option<GameResult>,
    /// Members currently live-connected, players first.
    pub members: Vec<MemberView>,
}

// ---------------------------------------------------------------------------
// ClientEvent (browser to server)
// ---------------------------------------------------------------------------

/// Everything a client may send. One variant per inbound message type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// First message on a connection: present a credential.
    Auth { token: String },

    /// Attach this connection to a room the user is already a member of.
    #[serde(rename_all = "camelCase")]
    JoinRoom { room_code: RoomCode },

    /// Detach from the current room (the durable membership is untouched).
    LeaveRoom,

    /// Flip the sender's ready flag while the room is waiting.
    ReadyToggle,

    /// Post to the room's chat.
    ChatMessage { message: String },

    /// Host only: start the contest.
    GameStart,

    /// In-game state, relayed to everyone else in the room.
    GameState { data: Value },

    /// A player's terminal stream, relayed to spectators only.
    TerminalOutput { data: Value },

    /// The contest is over.
    GameEnd {
        #[serde(default)]
        data: Option<Value>,
    },

    /// Latency check. The timestamp is whatever the client clock produced
    /// (integer millis, `performance.now()` float, ...) and is echoed back
    /// untouched.
    Ping {
        #[serde(default)]
        timestamp: Option<Value>,
    },
}

impl ClientEvent {
    /// Every `type` string [`ClientEvent`] understands.
    pub const TYPES: [&'static str; 10] = [
        "auth",
        "join-room",
        "leave-room",
        "ready-toggle",
        "chat-message",
        "game-start",
        "game-state",
        "terminal-output",
        "game-end",
        "ping",
    ];

    /// Parses and validates one inbound frame.
    ///
    /// Unknown `type` values are reported separately from shape errors so
    /// the server can log them differently; both are sent back to the client
    /// as malformed-message errors.
    ///
    /// # Errors
    /// - [`ProtocolError::Decode`]: not JSON, or fields don't match the variant
    /// - [`ProtocolError::UnknownEvent`]: unrecognized `type`
    /// - [`ProtocolError::InvalidMessage`]: missing `type`, empty token or
    ///   chat message, bad room code
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_slice(data).map_err(ProtocolError::Decode)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::InvalidMessage("missing \"type\" field".into()))?;
        if !Self::TYPES.contains(&kind) {
            return Err(ProtocolError::UnknownEvent(kind.to_owned()));
        }
        let event: Self = serde_json::from_value(value).map_err(ProtocolError::Decode)?;
        event.validated()
    }

    /// Applies per-variant field rules that serde can't express.
    fn validated(self) -> Result<Self, ProtocolError> {
        match self {
            Self::Auth { token } => {
                let token = token.trim();
                if token.is_empty() {
                    return Err(ProtocolError::InvalidMessage("token is empty".into()));
                }
                Ok(Self::Auth {
                    token: token.to_owned(),
                })
            }
            Self::ChatMessage { message } => {
                // Only trim and cap; inner whitespace is the author's business.
                let trimmed = message.trim();
                if trimmed.is_empty() {
                    return Err(ProtocolError::InvalidMessage("chat message is empty".into()));
                }
                Ok(Self::ChatMessage {
                    message: trimmed.chars().take(CHAT_MAX_LEN).collect(),
                })
            }
            other => Ok(other),
        }
    }

    /// The wire name of this event, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth",
            Self::JoinRoom { .. } => "join-room",
            Self::LeaveRoom => "leave-room",
            Self::ReadyToggle => "ready-toggle",
            Self::ChatMessage { .. } => "chat-message",
            Self::GameStart => "game-start",
            Self::GameState { .. } => "game-state",
            Self::TerminalOutput { .. } => "terminal-output",
            Self::GameEnd { .. } => "game-end",
            Self::Ping { .. } => "ping",
        }
    }
}

// ---------------------------------------------------------------------------
// ServerEvent (server to browser)
// ---------------------------------------------------------------------------

/// Everything the server may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// The `auth` credential was accepted.
    #[serde(rename_all = "camelCase")]
    AuthSuccess { user_id: UserId, username: String },

    /// Full snapshot, sent only to a connection that just joined.
    RoomState { room: RoomSnapshot, role: Role },

    /// Someone attached to the room.
    #[serde(rename_all = "camelCase")]
    MemberJoined {
        user_id: UserId,
        username: String,
        role: Role,
    },

    /// Someone detached from the room (explicit leave or disconnect).
    #[serde(rename_all = "camelCase")]
    MemberLeft {
        user_id: UserId,
        username: String,
        role: Role,
    },

    /// Ready flags after a toggle.
    #[serde(rename_all = "camelCase")]
    ReadyChanged {
        player1_ready: bool,
        player2_ready: bool,
    },

    /// A stored chat message with its author.
    #[serde(rename_all = "camelCase")]
    ChatMessage {
        id: u64,
        user_id: UserId,
        username: String,
        message: String,
        sent_at: u64,
    },

    /// The room moved to `playing`.
    GameStarted { room: RoomSnapshot },

    /// Relayed in-game state from `user_id`.
    #[serde(rename_all = "camelCase")]
    GameState { user_id: UserId, data: Value },

    /// Relayed terminal output from player `user_id`.
    #[serde(rename_all = "camelCase")]
    TerminalOutput { user_id: UserId, data: Value },

    /// The room moved to `finished`.
    #[serde(rename_all = "camelCase")]
    GameEnded {
        user_id: UserId,
        #[serde(default)]
        data: Option<Value>,
    },

    /// Reply to `ping`.
    Pong {
        #[serde(default)]
        timestamp: Option<Value>,
    },

    /// A request from this connection failed. Never broadcast.
    /// `code` follows HTTP conventions (400, 401, 403, 404, 409, 500).
    Error { code: u16, error: String },
}
