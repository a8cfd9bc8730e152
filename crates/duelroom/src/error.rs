//! Unified error type for the duelroom server.

use duelroom_protocol::ProtocolError;
use duelroom_room::{RoomError, StoreError};
use duelroom_session::SessionError;
use duelroom_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// Handlers return this, and the dispatcher turns it into an `error`
/// event for the sending connection via [`wire_code`](Self::wire_code) and
/// [`client_message`](Self::client_message).
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A malformed or unknown inbound frame, or an encode failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// An authentication or session-lookup failure.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A room rule was violated.
    #[error(transparent)]
    Room(#[from] RoomError),

    /// The room store failed or refused a write.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServerError {
    /// HTTP-style status code reported to the client.
    pub fn wire_code(&self) -> u16 {
        match self {
            Self::Protocol(ProtocolError::Encode(_)) => 500,
            Self::Protocol(_) => 400,
            Self::Session(SessionError::Unauthenticated | SessionError::InvalidCredential(_)) => 401,
            Self::Session(SessionError::AlreadyAuthenticated(_)) => 409,
            Self::Session(SessionError::NotFound(_)) => 500,
            Self::Room(RoomError::NotFound(_)) => 404,
            Self::Room(RoomError::NotAMember(..) | RoomError::NotAuthorized(_)) => 403,
            Self::Room(RoomError::InvalidState(_)) => 409,
            Self::Room(RoomError::Store(e)) | Self::Store(e) => store_code(e),
            Self::Transport(_) => 500,
        }
    }

    /// Text reported to the client. Internal failures get a generic message
    /// so store and transport details never leak.
    pub fn client_message(&self) -> String {
        if self.is_internal() {
            "internal server error".to_string()
        } else {
            self.to_string()
        }
    }

    /// `true` for failures that are the server's fault, not the client's.
    pub fn is_internal(&self) -> bool {
        self.wire_code() >= 500
    }
}

fn store_code(e: &StoreError) -> u16 {
    match e {
        StoreError::NotFound(_) => 404,
        StoreError::Conflict { .. } | StoreError::InvalidTransition { .. } => 409,
        StoreError::CodeTaken(_) | StoreError::Unavailable(_) => 500,
    }
}
