//! Core vocabulary shared by every duelroom crate: who (user ids), where
//! (room ids and codes), and in what capacity (roles, room status).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A stable user identity, as resolved by the identity verifier.
///
/// Newtype over `u64` so a `UserId` can't be passed where a [`RoomId`] is
/// expected. `#[serde(transparent)]` keeps it a plain number on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U-{}", self.0)
    }
}

/// The durable store's primary key for a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub u64);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// RoomCode
// ---------------------------------------------------------------------------

/// Number of characters in a public room code.
pub const ROOM_CODE_LEN: usize = 6;

/// The short, human-typed public code of a room (e.g. `AB12CD`).
///
/// Parsing is lenient about what people type: surrounding whitespace is
/// trimmed and letters are upper-cased. It is strict about shape: exactly
/// [`ROOM_CODE_LEN`] ASCII letters or digits. Generating codes from the
/// confusable-free alphabet is the store's job, not this type's.
///
/// Deserialization goes through [`RoomCode::parse`], so a `join-room` event
/// with a malformed code is rejected at parse time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode(String);

impl RoomCode {
    /// Normalizes and validates a user-supplied code.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidMessage`] if the trimmed input is not
    /// exactly six ASCII alphanumerics.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let code = raw.trim().to_ascii_uppercase();
        if code.len() != ROOM_CODE_LEN || !code.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(ProtocolError::InvalidMessage(format!(
                "room code must be {ROOM_CODE_LEN} letters or digits, got {raw:?}"
            )));
        }
        Ok(Self(code))
    }

    /// Returns the normalized code.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RoomCode {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// The capacity in which a live connection is attached to a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Occupies one of the room's two player slots.
    Player,
    /// Watches; recorded in the room's durable spectator set.
    Spectator,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Player => f.write_str("player"),
            Self::Spectator => f.write_str("spectator"),
        }
    }
}

// ---------------------------------------------------------------------------
// RoomStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a durable room.
///
/// Transitions are one-directional, no skipping and no going back:
///
/// ```text
/// Waiting → Playing → Finished
/// ```
///
/// - **Waiting**: players gather, toggle ready, pick providers.
/// - **Playing**: the contest is running; slots and selections are frozen.
/// - **Finished**: terminal. The result payload (if any) is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Waiting,
    Playing,
    Finished,
}

impl RoomStatus {
    /// Returns the only status this one may move to, or `None` when terminal.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Waiting => Some(Self::Playing),
            Self::Playing => Some(Self::Finished),
            Self::Finished => None,
        }
    }

    /// Returns `true` if moving to `target` is a legal transition.
    pub fn can_transition_to(self, target: Self) -> bool {
        self.next() == Some(target)
    }

    /// Returns `true` for `Finished`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished)
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => f.write_str("waiting"),
            Self::Playing => f.write_str("playing"),
            Self::Finished => f.write_str("finished"),
        }
    }
}
