//! # duelroom
//!
//! Real-time room synchronization for two-player AI coding duels with
//! spectators.
//!
//! Browsers hold one WebSocket each. The server authenticates them,
//! attaches them to rooms they are durable members of, relays game events
//! between the two players, streams player terminal output to spectators,
//! and keeps its in-memory view of who is connected consistent with the
//! durable room store it shares with the web app.
//!
//! ## Layers
//!
//! - `duelroom-transport`: WebSocket accept, send, receive
//! - `duelroom-protocol`: the JSON event unions and codec
//! - `duelroom-session`: connection registry and identity verification
//! - `duelroom-room`: durable room store, membership index, lobby
//! - `duelroom-sweep`: the cleanup-sweep scheduler
//! - this crate: the [`Engine`] that ties them together, the per-connection
//!   handler, and the server loop
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use duelroom::prelude::*;
//!
//! # async fn run() -> Result<(), ServerError> {
//! let verifier = Arc::new(StaticVerifier::new());
//! let store = Arc::new(MemoryRoomStore::new());
//! let server = DuelroomServerBuilder::new()
//!     .bind("0.0.0.0:8080")
//!     .build(verifier, store)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod broadcast;
mod config;
mod dispatch;
mod engine;
mod error;
mod handler;
mod server;
mod sweep;

pub use config::{DEFAULT_IDLE_TIMEOUT, EngineConfig};
pub use engine::Engine;
pub use error::ServerError;
pub use server::{DuelroomServer, DuelroomServerBuilder};
pub use sweep::{SweepReport, spawn_sweeper};

pub mod prelude {
    pub use crate::{DuelroomServer, DuelroomServerBuilder, Engine, EngineConfig, ServerError, SweepReport};
    pub use duelroom_protocol::{
        ClientEvent, Codec, JsonCodec, Role, RoomCode, RoomId, RoomStatus, ServerEvent, UserId,
    };
    pub use duelroom_room::{Lobby, LobbyConfig, MemoryRoomStore, RoomStore};
    pub use duelroom_session::{Identity, IdentityVerifier, SessionError, StaticVerifier};
    pub use duelroom_sweep::SweepConfig;
}
