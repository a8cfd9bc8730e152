//! Session types: the server's record of one live connection.
//!
//! A session tracks:
//! - HOW to reach the connection (its [`Outbox`])
//! - WHO is on the other end, once authenticated ([`Identity`])
//! - WHERE it is attached, if anywhere ([`RoomAttachment`])

use std::fmt;
use std::sync::Arc;

use duelroom_protocol::{Role, RoomCode, UserId};
use tokio::sync::mpsc;

/// An encoded outbound frame. Shared, so one broadcast encodes once and
/// every recipient gets a cheap clone of the same bytes.
pub type Frame = Arc<[u8]>;

/// Channel into a connection's writer task.
///
/// The writer task owns the receiving half and drops it when the socket
/// dies, which closes the outbox. A closed outbox is how the rest of the
/// server tells that a socket is no longer open.
pub type Outbox = mpsc::UnboundedSender<Frame>;

/// Identifier of a registered session, assigned by the
/// [`ConnectionRegistry`](crate::ConnectionRegistry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Creates a `SessionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}", self.0)
    }
}

/// A verified user, as returned by the
/// [`IdentityVerifier`](crate::IdentityVerifier).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub username: String,
}

impl Identity {
    pub fn new(user_id: UserId, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
        }
    }
}

/// The room a session is currently attached to, and as what.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomAttachment {
    pub code: RoomCode,
    pub role: Role,
}

/// One live connection.
///
/// Created anonymous by `register`, gains an identity on authentication,
/// gains and loses a [`RoomAttachment`] as the client joins and leaves rooms,
/// and is destroyed on disconnect or by the liveness sweep.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub outbox: Outbox,
    pub identity: Option<Identity>,
    pub room: Option<RoomAttachment>,
}

impl Session {
    /// Returns `true` while the connection's writer task is still running.
    pub fn is_open(&self) -> bool {
        !self.outbox.is_closed()
    }

    /// The authenticated user, if any.
    pub fn user_id(&self) -> Option<UserId> {
        self.identity.as_ref().map(|i| i.user_id)
    }

    /// The display name, or an empty string before authentication.
    pub fn username(&self) -> &str {
        self.identity.as_ref().map_or("", |i| i.username.as_str())
    }

    /// Queues a frame for this connection.
    ///
    /// Returns `false` (and drops the frame) when the socket is gone.
    pub fn deliver(&self, frame: Frame) -> bool {
        self.outbox.send(frame).is_ok()
    }
}
