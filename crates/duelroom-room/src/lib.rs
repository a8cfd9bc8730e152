//! Rooms for duelroom: the durable record and the live mirror.
//!
//! A room exists twice:
//!
//! - **Durably**, as a [`Room`] row in a [`RoomStore`] shared with the
//!   request/response web app. This is the source of truth for status,
//!   player slots, ready flags, and results.
//! - **Ephemerally**, as a [`RoomState`] inside the [`MembershipIndex`]:
//!   which live sessions are attached right now, as player or spectator.
//!   Always reconstructible from the durable row plus live connections.
//!
//! # Key types
//!
//! - [`RoomStore`]: the durable store interface ([`MemoryRoomStore`] ships
//!   for development and tests)
//! - [`MembershipIndex`] / [`resolve_role`]: who is here right now, and may
//!   this user be here at all
//! - [`Lobby`]: the request-path room operations and the durable sweep

#![allow(async_fn_in_trait)]

mod code;
mod error;
mod lobby;
mod membership;
mod model;
mod store;

pub use code::{ROOM_CODE_ALPHABET, generate_room_code};
pub use error::{RoomError, StoreError};
pub use lobby::{DurableSweepReport, LeaveOutcome, Lobby, LobbyConfig};
pub use membership::{MembershipIndex, RetainReport, RoomMembers, RoomState, resolve_role};
pub use model::{ChatMessage, NewRoom, Room, RoomPatch, Slot};
pub use store::{MemoryRoomStore, RoomStore};
