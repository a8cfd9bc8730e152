//! Wire protocol for duelroom.
//!
//! This crate defines the "language" spoken between browsers and the
//! real-time room server:
//!
//! - **Types** ([`UserId`], [`RoomCode`], [`Role`], [`RoomStatus`], ...):
//!   identity and room vocabulary shared by every other crate.
//! - **Events** ([`ClientEvent`], [`ServerEvent`]): closed tagged unions,
//!   one variant per message kind, validated at parse time.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how outbound events are
//!   turned into frames.
//! - **Errors** ([`ProtocolError`]).
//!
//! ```text
//! Transport (frames) → Protocol (ClientEvent) → Dispatcher (handlers)
//! ```

mod codec;
mod error;
mod events;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use events::{
    CHAT_MAX_LEN, ClientEvent, GameResult, MemberView, ProviderSelection, RoomSnapshot,
    ServerEvent,
};
pub use types::{ROOM_CODE_LEN, Role, RoomCode, RoomId, RoomStatus, UserId};
