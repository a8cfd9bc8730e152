//! The engine: shared state behind every connection task.
//!
//! One [`Engine`] per server. It owns the two in-memory tables, each behind
//! its own `tokio::sync::Mutex`:
//!
//! - `sessions`: the [`ConnectionRegistry`] (who is connected)
//! - `rooms`: the [`MembershipIndex`] (who is live in which room)
//!
//! and shares the identity verifier and room store with whatever else the
//! process runs (the request path's `Lobby`, typically).
//!
//! # Locking rules
//!
//! - Neither lock is ever held across a verifier or store call.
//! - When both are needed, `sessions` is taken before `rooms`.

use std::sync::Arc;

use duelroom_protocol::{ClientEvent, Codec, RoomCode, ServerEvent};
use duelroom_room::{MembershipIndex, RoomMembers, RoomStore};
use duelroom_session::{ConnectionRegistry, IdentityVerifier, Outbox, SessionId};
use tokio::sync::Mutex;

use crate::{EngineConfig, ServerError};

/// Shared server state, wrapped in `Arc` and handed to each connection task.
pub struct Engine<V: IdentityVerifier, S: RoomStore, C: Codec> {
    pub(crate) sessions: Mutex<ConnectionRegistry>,
    pub(crate) rooms: Mutex<MembershipIndex>,
    pub(crate) verifier: Arc<V>,
    pub(crate) store: Arc<S>,
    pub(crate) codec: C,
    pub(crate) config: EngineConfig,
}

impl<V, S, C> Engine<V, S, C>
where
    V: IdentityVerifier,
    S: RoomStore,
    C: Codec,
{
    pub fn new(verifier: Arc<V>, store: Arc<S>, codec: C, config: EngineConfig) -> Self {
        Self {
            sessions: Mutex::new(ConnectionRegistry::new()),
            rooms: Mutex::new(MembershipIndex::new()),
            verifier,
            store,
            codec,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn verifier(&self) -> &Arc<V> {
        &self.verifier
    }

    /// Registers a new anonymous connection.
    pub async fn connect(&self, outbox: Outbox) -> SessionId {
        self.sessions.lock().await.register(outbox)
    }

    /// Handles one inbound frame from `session`.
    ///
    /// Never fails: parse errors and handler errors are reported to the
    /// sender as an `error` event and the connection stays up.
    pub async fn handle_frame(&self, session: SessionId, data: &[u8]) {
        let result = match ClientEvent::parse(data) {
            Ok(event) => {
                let kind = event.kind();
                tracing::trace!(%session, kind, "event received");
                self.dispatch(session, event).await
            }
            Err(e) => Err(ServerError::from(e)),
        };

        if let Err(e) = result {
            if e.is_internal() {
                tracing::warn!(%session, error = %e, "handler failed");
            } else {
                tracing::debug!(%session, error = %e, "request rejected");
            }
            let event = ServerEvent::Error {
                code: e.wire_code(),
                error: e.client_message(),
            };
            if let Err(e) = self.send_to(session, &event).await {
                tracing::warn!(%session, error = %e, "failed to report error");
            }
        }
    }

    /// Tears down a connection: drops its session and, if it was in a room,
    /// removes it from the room and tells the others.
    ///
    /// Safe to call more than once.
    pub async fn disconnect(&self, session: SessionId) {
        // Both tables change under both locks, so the sweep never sees an
        // index entry whose session has already left the registry.
        let (identity, attachment, role) = {
            let mut sessions = self.sessions.lock().await;
            let mut rooms = self.rooms.lock().await;
            let Some(removed) = sessions.remove(session) else {
                return;
            };
            let (Some(identity), Some(attachment)) = (removed.identity, removed.room) else {
                return;
            };
            let role = rooms.leave(&attachment.code, identity.user_id, session);
            (identity, attachment, role)
        };
        if let Some(role) = role {
            tracing::info!(
                %session,
                user_id = %identity.user_id,
                room_code = %attachment.code,
                "member disconnected"
            );
            let event = ServerEvent::MemberLeft {
                user_id: identity.user_id,
                username: identity.username,
                role,
            };
            if let Err(e) = self.broadcast_to_room(&attachment.code, &event, None).await {
                tracing::warn!(room_code = %attachment.code, error = %e, "member-left broadcast failed");
            }
        }
    }

    /// Drops every session and empties the index. Dropping the sessions
    /// closes their outboxes, which ends every writer task.
    pub async fn shutdown(&self) {
        let mut sessions = self.sessions.lock().await;
        let mut rooms = self.rooms.lock().await;
        let drained = sessions.drain();
        rooms.clear();
        tracing::info!(sessions = drained.len(), "engine shut down");
    }

    /// Number of registered connections.
    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Live members of `code`.
    pub async fn members_of(&self, code: &RoomCode) -> RoomMembers {
        self.rooms.lock().await.members_of(code)
    }

    /// Codes of every room with a live member.
    pub async fn live_rooms(&self) -> Vec<RoomCode> {
        self.rooms.lock().await.room_codes()
    }
}
