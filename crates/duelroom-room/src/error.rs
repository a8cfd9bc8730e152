//! Error types for the room layer.

use duelroom_protocol::{RoomCode, RoomId, RoomStatus, UserId};

/// Errors raised by a [`RoomStore`](crate::RoomStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No room row with this id.
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// A conditional write found the room in a different status than the
    /// caller expected. The other path got there first.
    #[error("room {room_id} is {actual}, expected {expected}")]
    Conflict {
        room_id: RoomId,
        expected: RoomStatus,
        actual: RoomStatus,
    },

    /// The patch asks for a status change the lifecycle forbids.
    #[error("cannot move room from {from} to {to}")]
    InvalidTransition { from: RoomStatus, to: RoomStatus },

    /// Another room already uses this public code.
    #[error("room code {0} is taken")]
    CodeTaken(RoomCode),

    /// The backing store could not be reached.
    #[error("room store unavailable: {0}")]
    Unavailable(String),
}

/// Errors that can occur during room operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The code does not resolve to a durable room.
    #[error("room {0} not found")]
    NotFound(RoomCode),

    /// The user is neither a recorded player nor a recorded spectator.
    #[error("user {0} is not a member of room {1}")]
    NotAMember(UserId, RoomCode),

    /// The user is a member but may not perform this action
    /// (e.g. a non-host starting the game).
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// The action isn't valid in the room's current state
    /// (e.g. toggling ready after the game started).
    #[error("invalid room state for this operation: {0}")]
    InvalidState(String),

    /// The store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}
