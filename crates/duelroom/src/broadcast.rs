//! Fan-out of server events to live connections.
//!
//! Every function here encodes the event once and hands the same [`Frame`]
//! to each recipient's outbox. A closed outbox is skipped without error; the
//! liveness sweep removes it later.

use duelroom_protocol::{Codec, MemberView, Role, RoomCode, ServerEvent};
use duelroom_room::{RoomMembers, RoomStore};
use duelroom_session::{ConnectionRegistry, Frame, IdentityVerifier, SessionId};

use crate::{Engine, ServerError};

impl<V, S, C> Engine<V, S, C>
where
    V: IdentityVerifier,
    S: RoomStore,
    C: Codec,
{
    fn encode(&self, event: &ServerEvent) -> Result<Frame, ServerError> {
        Ok(Frame::from(self.codec.encode(event)?))
    }

    /// Sends `event` to one connection. Returns `false` if it is gone.
    pub async fn send_to(&self, session: SessionId, event: &ServerEvent) -> Result<bool, ServerError> {
        let frame = self.encode(event)?;
        let sessions = self.sessions.lock().await;
        Ok(sessions.lookup(session).is_some_and(|s| s.deliver(frame)))
    }

    /// Sends `event` to every live member of `code` except `exclude`.
    ///
    /// Returns the number of outboxes that accepted the frame.
    pub async fn broadcast_to_room(
        &self,
        code: &RoomCode,
        event: &ServerEvent,
        exclude: Option<SessionId>,
    ) -> Result<usize, ServerError> {
        let frame = self.encode(event)?;
        let sessions = self.sessions.lock().await;
        let members = self.rooms.lock().await.members_of(code);
        let delivered = deliver(
            &sessions,
            members.sessions().filter(|s| Some(*s) != exclude),
            &frame,
        );
        tracing::trace!(room_code = %code, delivered, "broadcast to room");
        Ok(delivered)
    }

    /// Sends `event` to the spectators of `code` only.
    pub async fn broadcast_to_spectators(
        &self,
        code: &RoomCode,
        event: &ServerEvent,
    ) -> Result<usize, ServerError> {
        let frame = self.encode(event)?;
        let sessions = self.sessions.lock().await;
        let members = self.rooms.lock().await.members_of(code);
        let delivered = deliver(
            &sessions,
            members.spectators.iter().map(|(_, s)| *s),
            &frame,
        );
        tracing::trace!(room_code = %code, delivered, "broadcast to spectators");
        Ok(delivered)
    }
}

fn deliver(
    sessions: &ConnectionRegistry,
    recipients: impl Iterator<Item = SessionId>,
    frame: &Frame,
) -> usize {
    recipients
        .filter_map(|id| sessions.lookup(id))
        .filter(|s| s.deliver(frame.clone()))
        .count()
}

/// Pairs each live member with the display name on their session.
pub(crate) fn member_views(sessions: &ConnectionRegistry, members: &RoomMembers) -> Vec<MemberView> {
    let players = members.players.iter().map(|m| (m, Role::Player));
    let spectators = members.spectators.iter().map(|m| (m, Role::Spectator));
    players
        .chain(spectators)
        .map(|(&(user_id, session), role)| MemberView {
            user_id,
            username: sessions
                .lookup(session)
                .map(|s| s.username().to_string())
                .unwrap_or_default(),
            role,
        })
        .collect()
}
