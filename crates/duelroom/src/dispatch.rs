//! Per-event handlers.
//!
//! Each inbound [`ClientEvent`] maps to one handler below. A handler:
//!
//! 1. snapshots what it needs from the registry (identity, current room)
//! 2. re-reads the durable room when the event depends on it
//! 3. writes through the store, using `transition` for anything that must
//!    not happen once the room has moved on
//! 4. broadcasts the resulting delta
//!
//! Locks are only held inside steps 1 and 4.

use duelroom_protocol::{ClientEvent, Codec, Role, RoomCode, RoomStatus, ServerEvent, UserId};
use duelroom_room::{Room, RoomError, RoomPatch, RoomStore, StoreError, resolve_role};
use duelroom_session::{IdentityVerifier, SessionError, SessionId};
use serde_json::Value;

use crate::broadcast::member_views;
use crate::{Engine, ServerError};

/// The sender of an in-room event, as seen by the registry.
#[derive(Debug, Clone)]
struct Member {
    user_id: UserId,
    username: String,
    code: RoomCode,
    role: Role,
}

impl<V, S, C> Engine<V, S, C>
where
    V: IdentityVerifier,
    S: RoomStore,
    C: Codec,
{
    pub(crate) async fn dispatch(
        &self,
        session: SessionId,
        event: ClientEvent,
    ) -> Result<(), ServerError> {
        match event {
            ClientEvent::Auth { token } => self.on_auth(session, &token).await,
            ClientEvent::JoinRoom { room_code } => self.on_join_room(session, room_code).await,
            ClientEvent::LeaveRoom => self.on_leave_room(session).await,
            ClientEvent::ReadyToggle => self.on_ready_toggle(session).await,
            ClientEvent::ChatMessage { message } => self.on_chat_message(session, message).await,
            ClientEvent::GameStart => self.on_game_start(session).await,
            ClientEvent::GameState { data } => self.on_game_state(session, data).await,
            ClientEvent::TerminalOutput { data } => self.on_terminal_output(session, data).await,
            ClientEvent::GameEnd { data } => self.on_game_end(session, data).await,
            ClientEvent::Ping { timestamp } => {
                self.send_to(session, &ServerEvent::Pong { timestamp }).await?;
                Ok(())
            }
        }
    }

    async fn member(&self, session: SessionId) -> Result<Member, ServerError> {
        let sessions = self.sessions.lock().await;
        let (s, identity) = sessions.require_identity(session)?;
        let attachment = s
            .room
            .as_ref()
            .ok_or_else(|| RoomError::InvalidState("join a room first".into()))?;
        Ok(Member {
            user_id: identity.user_id,
            username: identity.username.clone(),
            code: attachment.code.clone(),
            role: attachment.role,
        })
    }

    /// Moves the session's attachment and index entry to `role` when the
    /// durable row says its cached role is stale.
    async fn sync_role(&self, session: SessionId, member: &Member, role: Role) {
        if member.role == role {
            return;
        }
        let mut sessions = self.sessions.lock().await;
        let mut rooms = self.rooms.lock().await;
        let attached = sessions
            .lookup(session)
            .and_then(|s| s.room.as_ref())
            .is_some_and(|a| a.code == member.code);
        if !attached || rooms.session_of(&member.code, member.user_id) != Some(session) {
            return;
        }
        if sessions.attach_room(session, member.code.clone(), role).is_ok() {
            rooms.join(&member.code, member.user_id, session, role);
            tracing::debug!(%session, user_id = %member.user_id, room_code = %member.code, ?role, "cached role refreshed");
        }
    }

    async fn room(&self, code: &RoomCode) -> Result<Room, ServerError> {
        self.store
            .get_by_code(code)
            .await?
            .ok_or_else(|| RoomError::NotFound(code.clone()).into())
    }

    // -----------------------------------------------------------------------
    // auth
    // -----------------------------------------------------------------------

    async fn on_auth(&self, session: SessionId, token: &str) -> Result<(), ServerError> {
        let already = self
            .sessions
            .lock()
            .await
            .lookup(session)
            .is_some_and(|s| s.identity.is_some());
        if already {
            return Err(SessionError::AlreadyAuthenticated(session).into());
        }

        let identity = self.verifier.verify(token).await?;
        let reply = ServerEvent::AuthSuccess {
            user_id: identity.user_id,
            username: identity.username.clone(),
        };

        self.sessions.lock().await.authenticate(session, identity)?;
        self.send_to(session, &reply).await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // join-room / leave-room
    // -----------------------------------------------------------------------

    async fn on_join_room(&self, session: SessionId, code: RoomCode) -> Result<(), ServerError> {
        let (user_id, username, current) = {
            let sessions = self.sessions.lock().await;
            let (s, identity) = sessions.require_identity(session)?;
            (identity.user_id, identity.username.clone(), s.room.clone())
        };

        let (room, role) = resolve_role(self.store.as_ref(), &code, user_id).await?;

        if let Some(current) = current.filter(|c| c.code != code) {
            self.leave_current(session, user_id, &username, &current.code)
                .await;
        }

        let (members, rejoined) = {
            let mut sessions = self.sessions.lock().await;
            let mut rooms = self.rooms.lock().await;
            let rejoined = rooms.session_of(&code, user_id) == Some(session)
                && rooms.role_of(&code, user_id) == Some(role);
            sessions.attach_room(session, code.clone(), role)?;
            if let Some(displaced) = rooms.join(&code, user_id, session, role) {
                let stale = sessions
                    .lookup(displaced)
                    .and_then(|s| s.room.as_ref())
                    .is_some_and(|a| a.code == code);
                if stale {
                    sessions.detach_room(displaced);
                }
                tracing::info!(%session, %displaced, %user_id, room_code = %code, "member rejoined from new connection");
            }
            (member_views(&sessions, &rooms.members_of(&code)), rejoined)
        };

        tracing::info!(%session, %user_id, room_code = %code, ?role, rejoined, "member joined");

        let snapshot = ServerEvent::RoomState {
            room: room.snapshot(members),
            role,
        };
        self.send_to(session, &snapshot).await?;
        if rejoined {
            return Ok(());
        }

        let joined = ServerEvent::MemberJoined {
            user_id,
            username,
            role,
        };
        self.broadcast_to_room(&code, &joined, Some(session)).await?;
        Ok(())
    }

    async fn on_leave_room(&self, session: SessionId) -> Result<(), ServerError> {
        let member = self.member(session).await?;
        self.leave_current(session, member.user_id, &member.username, &member.code)
            .await;
        Ok(())
    }

    /// Detaches `session` from `code` and tells whoever is left.
    async fn leave_current(&self, session: SessionId, user_id: UserId, username: &str, code: &RoomCode) {
        let role = {
            let mut sessions = self.sessions.lock().await;
            let mut rooms = self.rooms.lock().await;
            sessions.detach_room(session);
            rooms.leave(code, user_id, session)
        };
        let Some(role) = role else {
            return;
        };
        tracing::info!(%session, %user_id, room_code = %code, "member left");
        let event = ServerEvent::MemberLeft {
            user_id,
            username: username.to_string(),
            role,
        };
        if let Err(e) = self.broadcast_to_room(code, &event, None).await {
            tracing::warn!(room_code = %code, error = %e, "member-left broadcast failed");
        }
    }

    // -----------------------------------------------------------------------
    // ready-toggle / game-start
    // -----------------------------------------------------------------------

    async fn on_ready_toggle(&self, session: SessionId) -> Result<(), ServerError> {
        let member = self.member(session).await?;
        let room = self.room(&member.code).await?;
        let slot = room
            .slot_of(member.user_id)
            .ok_or_else(|| RoomError::NotAuthorized("only players can toggle ready".into()))?;
        self.sync_role(session, &member, Role::Player).await;
        if room.status != RoomStatus::Waiting {
            return Err(RoomError::InvalidState(format!("room is {}", room.status)).into());
        }

        let patch = RoomPatch::ready(slot, !room.is_ready(slot));
        let room = self
            .store
            .transition(room.id, RoomStatus::Waiting, patch)
            .await?;

        tracing::debug!(room_code = %member.code, user_id = %member.user_id, ?slot, ready = room.is_ready(slot), "ready toggled");
        let event = ServerEvent::ReadyChanged {
            player1_ready: room.player1_ready,
            player2_ready: room.player2_ready,
        };
        self.broadcast_to_room(&member.code, &event, None).await?;
        Ok(())
    }

    async fn on_game_start(&self, session: SessionId) -> Result<(), ServerError> {
        let member = self.member(session).await?;
        let room = self.room(&member.code).await?;
        if room.host != member.user_id {
            return Err(RoomError::NotAuthorized("only the host can start the game".into()).into());
        }
        if room.status != RoomStatus::Waiting {
            return Err(RoomError::InvalidState(format!("room is {}", room.status)).into());
        }
        if !room.can_start() {
            return Err(RoomError::InvalidState("both players must be present and ready".into()).into());
        }

        let room = self
            .store
            .transition(room.id, RoomStatus::Waiting, RoomPatch::status(RoomStatus::Playing))
            .await?;

        tracing::info!(room_code = %member.code, "game started");
        let members = {
            let sessions = self.sessions.lock().await;
            let rooms = self.rooms.lock().await;
            member_views(&sessions, &rooms.members_of(&member.code))
        };
        let event = ServerEvent::GameStarted {
            room: room.snapshot(members),
        };
        self.broadcast_to_room(&member.code, &event, None).await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // chat
    // -----------------------------------------------------------------------

    async fn on_chat_message(&self, session: SessionId, message: String) -> Result<(), ServerError> {
        let member = self.member(session).await?;
        let room = self.room(&member.code).await?;
        let stored = self
            .store
            .insert_chat_message(room.id, member.user_id, &message)
            .await?;

        let event = ServerEvent::ChatMessage {
            id: stored.id,
            user_id: member.user_id,
            username: member.username,
            message: stored.text,
            sent_at: stored.sent_at,
        };
        self.broadcast_to_room(&member.code, &event, None).await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // relays
    // -----------------------------------------------------------------------

    async fn on_game_state(&self, session: SessionId, data: Value) -> Result<(), ServerError> {
        let member = self.member(session).await?;
        let event = ServerEvent::GameState {
            user_id: member.user_id,
            data,
        };
        self.broadcast_to_room(&member.code, &event, Some(session))
            .await?;
        Ok(())
    }

    async fn on_terminal_output(&self, session: SessionId, data: Value) -> Result<(), ServerError> {
        let member = self.member(session).await?;
        // The cached role is only a hint; a spectator may have taken slot two
        // since joining.
        if member.role != Role::Player {
            if !self.room(&member.code).await?.is_player(member.user_id) {
                return Err(RoomError::NotAuthorized("only players stream terminal output".into()).into());
            }
            self.sync_role(session, &member, Role::Player).await;
        }
        let event = ServerEvent::TerminalOutput {
            user_id: member.user_id,
            data,
        };
        self.broadcast_to_spectators(&member.code, &event).await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // game-end
    // -----------------------------------------------------------------------

    async fn on_game_end(&self, session: SessionId, data: Option<Value>) -> Result<(), ServerError> {
        let member = self.member(session).await?;
        let room = self.room(&member.code).await?;
        match room.status {
            RoomStatus::Waiting => {
                return Err(RoomError::InvalidState("game has not started".into()).into());
            }
            RoomStatus::Playing => {
                match self
                    .store
                    .transition(room.id, RoomStatus::Playing, RoomPatch::status(RoomStatus::Finished))
                    .await
                {
                    Ok(_) => tracing::info!(room_code = %member.code, user_id = %member.user_id, "game ended"),
                    // Finished concurrently by the other player or the request path.
                    Err(StoreError::Conflict {
                        actual: RoomStatus::Finished,
                        ..
                    }) => {}
                    Err(e) => return Err(e.into()),
                }
            }
            RoomStatus::Finished => {}
        }

        let event = ServerEvent::GameEnded {
            user_id: member.user_id,
            data,
        };
        self.broadcast_to_room(&member.code, &event, None).await?;
        Ok(())
    }
}
