//! The connection registry: every live connection and its session.
//!
//! Responsibilities:
//! - Assigning a [`SessionId`] when a connection is accepted
//! - Attaching an identity once the credential has been verified
//! - Recording which room a session is attached to
//! - Finding and removing sessions whose socket has died
//!
//! # Concurrency note
//!
//! `ConnectionRegistry` is a plain `HashMap` wrapper with `&mut self`
//! mutators. The server owns exactly one, behind a `tokio::sync::Mutex`,
//! and never holds that lock across a call to the identity verifier or
//! the room store. That is why [`authenticate`](ConnectionRegistry::authenticate)
//! takes an already-verified [`Identity`] instead of a raw credential.

use std::collections::HashMap;

use duelroom_protocol::{Role, RoomCode};

use crate::{Identity, Outbox, RoomAttachment, Session, SessionError, SessionId};

/// Maps each live connection to its [`Session`].
///
/// ## Lifecycle
///
/// ```text
/// register() ──→ authenticate() ──→ attach_room() ⇄ detach_room()
///     │                 │                  │
///     └─────────────────┴──────────────────┴──→ remove() / reap_dead()
/// ```
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    sessions: HashMap<SessionId, Session>,
    next_id: u64,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly accepted, still anonymous connection.
    pub fn register(&mut self, outbox: Outbox) -> SessionId {
        self.next_id += 1;
        let id = SessionId::new(self.next_id);
        self.sessions.insert(
            id,
            Session {
                id,
                outbox,
                identity: None,
                room: None,
            },
        );
        tracing::debug!(session_id = %id, "session registered");
        id
    }

    /// Stores a verified identity on the session.
    ///
    /// Does not touch any room.
    ///
    /// # Errors
    /// - [`SessionError::NotFound`]: the session is gone
    /// - [`SessionError::AlreadyAuthenticated`]: a connection authenticates once
    pub fn authenticate(
        &mut self,
        id: SessionId,
        identity: Identity,
    ) -> Result<&Session, SessionError> {
        let session = self.sessions.get_mut(&id).ok_or(SessionError::NotFound(id))?;
        if session.identity.is_some() {
            return Err(SessionError::AlreadyAuthenticated(id));
        }
        tracing::info!(
            session_id = %id,
            user_id = %identity.user_id,
            username = %identity.username,
            "session authenticated"
        );
        session.identity = Some(identity);
        Ok(session)
    }

    /// Looks up a session.
    pub fn lookup(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    /// A clone of the session's outbox, for sending outside the lock.
    pub fn outbox(&self, id: SessionId) -> Option<Outbox> {
        self.sessions.get(&id).map(|s| s.outbox.clone())
    }

    /// Looks up a session and its identity, failing for anonymous sessions.
    ///
    /// # Errors
    /// [`SessionError::Unauthenticated`] if the session is unknown or has
    /// not authenticated yet.
    pub fn require_identity(&self, id: SessionId) -> Result<(&Session, &Identity), SessionError> {
        let session = self.sessions.get(&id).ok_or(SessionError::Unauthenticated)?;
        let identity = session.identity.as_ref().ok_or(SessionError::Unauthenticated)?;
        Ok((session, identity))
    }

    /// Records that the session is now attached to `code` as `role`.
    ///
    /// Returns the previous attachment, if there was one.
    ///
    /// # Errors
    /// [`SessionError::NotFound`] if the session is gone.
    pub fn attach_room(
        &mut self,
        id: SessionId,
        code: RoomCode,
        role: Role,
    ) -> Result<Option<RoomAttachment>, SessionError> {
        let session = self.sessions.get_mut(&id).ok_or(SessionError::NotFound(id))?;
        Ok(session.room.replace(RoomAttachment { code, role }))
    }

    /// Clears the session's room attachment and returns it.
    pub fn detach_room(&mut self, id: SessionId) -> Option<RoomAttachment> {
        self.sessions.get_mut(&id).and_then(|s| s.room.take())
    }

    /// Returns `true` if the session exists and its socket is still open.
    pub fn is_live(&self, id: SessionId) -> bool {
        self.sessions.get(&id).is_some_and(Session::is_open)
    }

    /// Removes a session, returning it so the caller can clean up its room.
    pub fn remove(&mut self, id: SessionId) -> Option<Session> {
        let removed = self.sessions.remove(&id);
        if removed.is_some() {
            tracing::debug!(session_id = %id, "session removed");
        }
        removed
    }

    /// Ids of sessions whose socket is no longer open.
    pub fn dead_sessions(&self) -> Vec<SessionId> {
        self.sessions
            .values()
            .filter(|s| !s.is_open())
            .map(|s| s.id)
            .collect()
    }

    /// Removes every session whose socket is no longer open.
    pub fn reap_dead(&mut self) -> Vec<Session> {
        let dead = self.dead_sessions();
        dead.into_iter()
            .filter_map(|id| self.sessions.remove(&id))
            .collect()
    }

    /// Removes and returns every session. Used at shutdown; dropping the
    /// returned sessions drops their outboxes.
    pub fn drain(&mut self) -> Vec<Session> {
        self.sessions.drain().map(|(_, s)| s).collect()
    }

    /// Number of registered sessions (authenticated or not).
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if there are no sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================
