//! The live membership index: which sessions are in which room right now.
//!
//! The index is purely ephemeral. It never grants membership; a user only
//! enters it after [`resolve_role`] has found them in the durable room.
//! Everything in it can be rebuilt from the store plus the open sockets,
//! which is what the liveness sweep relies on when it prunes dead entries.

use std::collections::HashMap;

use duelroom_protocol::{Role, RoomCode, UserId};
use duelroom_session::SessionId;

use crate::{Room, RoomError, RoomStore};

/// Live members of one room, by role.
///
/// Created lazily on the first join, dropped when both maps empty out.
#[derive(Debug, Default, Clone)]
pub struct RoomState {
    players: HashMap<UserId, SessionId>,
    spectators: HashMap<UserId, SessionId>,
}

impl RoomState {
    pub fn is_empty(&self) -> bool {
        self.players.is_empty() && self.spectators.is_empty()
    }

    /// Total live members.
    pub fn len(&self) -> usize {
        self.players.len() + self.spectators.len()
    }

    fn map_mut(&mut self, role: Role) -> &mut HashMap<UserId, SessionId> {
        match role {
            Role::Player => &mut self.players,
            Role::Spectator => &mut self.spectators,
        }
    }

    fn remove_user(&mut self, user: UserId) -> Option<SessionId> {
        self.players
            .remove(&user)
            .or_else(|| self.spectators.remove(&user))
    }
}

/// A point-in-time copy of a room's members, safe to use after the index
/// lock is released.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RoomMembers {
    pub players: Vec<(UserId, SessionId)>,
    pub spectators: Vec<(UserId, SessionId)>,
}

impl RoomMembers {
    /// Every member's session, players first.
    pub fn sessions(&self) -> impl Iterator<Item = SessionId> + '_ {
        self.players
            .iter()
            .chain(self.spectators.iter())
            .map(|(_, s)| *s)
    }

    pub fn contains_user(&self, user: UserId) -> bool {
        self.players
            .iter()
            .chain(self.spectators.iter())
            .any(|(u, _)| *u == user)
    }

    pub fn len(&self) -> usize {
        self.players.len() + self.spectators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What [`MembershipIndex::retain_live`] pruned.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RetainReport {
    /// `(room, user, role)` for every entry removed.
    pub removed: Vec<(RoomCode, UserId, Role)>,
    /// Rooms whose state emptied out and was dropped.
    pub rooms_dropped: Vec<RoomCode>,
}

/// Room code to live [`RoomState`].
///
/// Like the connection registry this is a plain table with `&mut self`
/// mutators; the server keeps it behind its own mutex.
#[derive(Debug, Default)]
pub struct MembershipIndex {
    rooms: HashMap<RoomCode, RoomState>,
}

impl MembershipIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `user` in `code` as `role`, via `session`.
    ///
    /// A user holds one entry per room. If they were already present (in
    /// either role) the old entry is replaced, and when it belonged to a
    /// different session that session is returned so the caller can detach
    /// it.
    pub fn join(
        &mut self,
        code: &RoomCode,
        user: UserId,
        session: SessionId,
        role: Role,
    ) -> Option<SessionId> {
        let state = self.rooms.entry(code.clone()).or_default();
        let displaced = state.remove_user(user).filter(|old| *old != session);
        state.map_mut(role).insert(user, session);
        tracing::debug!(room = %code, %user, %session, ?role, "member joined");
        displaced
    }

    /// Removes `user` from `code`, but only if their entry still belongs to
    /// `session`. A newer connection that took over the entry is left alone.
    ///
    /// Returns the role the user held. Drops the room's state once empty.
    pub fn leave(&mut self, code: &RoomCode, user: UserId, session: SessionId) -> Option<Role> {
        let state = self.rooms.get_mut(code)?;
        let role = if state.players.get(&user) == Some(&session) {
            state.players.remove(&user);
            Role::Player
        } else if state.spectators.get(&user) == Some(&session) {
            state.spectators.remove(&user);
            Role::Spectator
        } else {
            return None;
        };
        if state.is_empty() {
            self.rooms.remove(code);
            tracing::debug!(room = %code, "room state dropped");
        }
        Some(role)
    }

    /// Snapshot of a room's members; empty if nobody is connected.
    pub fn members_of(&self, code: &RoomCode) -> RoomMembers {
        let Some(state) = self.rooms.get(code) else {
            return RoomMembers::default();
        };
        let mut players: Vec<_> = state.players.iter().map(|(u, s)| (*u, *s)).collect();
        let mut spectators: Vec<_> = state.spectators.iter().map(|(u, s)| (*u, *s)).collect();
        players.sort();
        spectators.sort();
        RoomMembers {
            players,
            spectators,
        }
    }

    /// The session currently holding `user`'s entry in `code`.
    pub fn session_of(&self, code: &RoomCode, user: UserId) -> Option<SessionId> {
        let state = self.rooms.get(code)?;
        state
            .players
            .get(&user)
            .or_else(|| state.spectators.get(&user))
            .copied()
    }

    pub fn role_of(&self, code: &RoomCode, user: UserId) -> Option<Role> {
        let state = self.rooms.get(code)?;
        if state.players.contains_key(&user) {
            Some(Role::Player)
        } else if state.spectators.contains_key(&user) {
            Some(Role::Spectator)
        } else {
            None
        }
    }

    /// Codes of every room with at least one live member.
    pub fn room_codes(&self) -> Vec<RoomCode> {
        let mut codes: Vec<_> = self.rooms.keys().cloned().collect();
        codes.sort();
        codes
    }

    pub fn contains_room(&self, code: &RoomCode) -> bool {
        self.rooms.contains_key(code)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Drops every entry whose session fails `is_live`, then every room
    /// left empty.
    pub fn retain_live(&mut self, mut is_live: impl FnMut(SessionId) -> bool) -> RetainReport {
        let mut report = RetainReport::default();
        for (code, state) in &mut self.rooms {
            for (role, map) in [
                (Role::Player, &mut state.players),
                (Role::Spectator, &mut state.spectators),
            ] {
                map.retain(|user, session| {
                    let keep = is_live(*session);
                    if !keep {
                        report.removed.push((code.clone(), *user, role));
                    }
                    keep
                });
            }
        }
        self.rooms.retain(|code, state| {
            if state.is_empty() {
                report.rooms_dropped.push(code.clone());
                false
            } else {
                true
            }
        });
        report
    }

    /// Empties the index. Used at shutdown.
    pub fn clear(&mut self) {
        self.rooms.clear();
    }
}

/// Decides in what capacity `user` may attach to `code`.
///
/// Players are whoever occupies a slot in the durable row; spectators are
/// whoever holds a durable spectator record. Anyone else is refused.
/// Returns the room alongside the role so callers can build a snapshot
/// without a second read.
///
/// # Errors
/// - [`RoomError::NotFound`]: no room with that code
/// - [`RoomError::NotAMember`]: the user is neither player nor spectator
/// - [`RoomError::Store`]: the store failed
pub async fn resolve_role<S: RoomStore>(
    store: &S,
    code: &RoomCode,
    user: UserId,
) -> Result<(Room, Role), RoomError> {
    let room = store
        .get_by_code(code)
        .await?
        .ok_or_else(|| RoomError::NotFound(code.clone()))?;
    if room.is_player(user) {
        return Ok((room, Role::Player));
    }
    let spectators = store.list_spectators(room.id).await?;
    if spectators.contains(&user) {
        return Ok((room, Role::Spectator));
    }
    Err(RoomError::NotAMember(user, code.clone()))
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryRoomStore, NewRoom, RoomPatch};

    fn code(s: &str) -> RoomCode {
        RoomCode::parse(s).unwrap()
    }

    fn sid(n: u64) -> SessionId {
        SessionId::new(n)
    }

    // =====================================================================
    // join() / leave()
    // =====================================================================

    #[test]
    fn test_join_creates_room_state_lazily() {
        let mut index = MembershipIndex::new();
        assert!(!index.contains_room(&code("AB12CD")));

        let displaced = index.join(&code("AB12CD"), UserId(1), sid(1), Role::Player);

        assert_eq!(displaced, None);
        assert_eq!(index.role_of(&code("AB12CD"), UserId(1)), Some(Role::Player));
        assert_eq!(index.room_count(), 1);
    }

    #[test]
    fn test_join_from_new_session_returns_displaced_session() {
        let mut index = MembershipIndex::new();
        index.join(&code("AB12CD"), UserId(1), sid(1), Role::Player);

        let displaced = index.join(&code("AB12CD"), UserId(1), sid(2), Role::Player);

        assert_eq!(displaced, Some(sid(1)));
        assert_eq!(
            index.members_of(&code("AB12CD")).players,
            vec![(UserId(1), sid(2))]
        );
    }

    #[test]
    fn test_join_same_session_is_idempotent() {
        let mut index = MembershipIndex::new();
        index.join(&code("AB12CD"), UserId(1), sid(1), Role::Player);
        let displaced = index.join(&code("AB12CD"), UserId(1), sid(1), Role::Player);
        assert_eq!(displaced, None);
        assert_eq!(index.members_of(&code("AB12CD")).len(), 1);
    }

    #[test]
    fn test_join_with_new_role_moves_user_between_maps() {
        let mut index = MembershipIndex::new();
        index.join(&code("AB12CD"), UserId(3), sid(3), Role::Spectator);
        index.join(&code("AB12CD"), UserId(3), sid(3), Role::Player);

        let members = index.members_of(&code("AB12CD"));
        assert_eq!(members.players, vec![(UserId(3), sid(3))]);
        assert!(members.spectators.is_empty());
    }

    #[test]
    fn test_session_of_tracks_latest_holder_in_either_role() {
        let mut index = MembershipIndex::new();
        index.join(&code("AB12CD"), UserId(3), sid(3), Role::Spectator);
        assert_eq!(index.session_of(&code("AB12CD"), UserId(3)), Some(sid(3)));

        index.join(&code("AB12CD"), UserId(3), sid(7), Role::Player);
        assert_eq!(index.session_of(&code("AB12CD"), UserId(3)), Some(sid(7)));
        assert_eq!(index.session_of(&code("AB12CD"), UserId(4)), None);
        assert_eq!(index.session_of(&code("QQQQQQ"), UserId(3)), None);
    }

    #[test]
    fn test_leave_last_member_drops_room_state() {
        let mut index = MembershipIndex::new();
        index.join(&code("XY99ZZ"), UserId(1), sid(1), Role::Spectator);

        let role = index.leave(&code("XY99ZZ"), UserId(1), sid(1));

        assert_eq!(role, Some(Role::Spectator));
        assert!(!index.contains_room(&code("XY99ZZ")));
    }

    #[test]
    fn test_leave_with_stale_session_keeps_newer_entry() {
        let mut index = MembershipIndex::new();
        index.join(&code("AB12CD"), UserId(1), sid(1), Role::Player);
        index.join(&code("AB12CD"), UserId(1), sid(2), Role::Player);

        assert_eq!(index.leave(&code("AB12CD"), UserId(1), sid(1)), None);
        assert_eq!(index.role_of(&code("AB12CD"), UserId(1)), Some(Role::Player));
    }

    #[test]
    fn test_leave_unknown_room_returns_none() {
        let mut index = MembershipIndex::new();
        assert_eq!(index.leave(&code("ZZZZZZ"), UserId(1), sid(1)), None);
    }

    #[test]
    fn test_rejoin_after_empty_starts_fresh() {
        let mut index = MembershipIndex::new();
        index.join(&code("XY99ZZ"), UserId(1), sid(1), Role::Player);
        index.join(&code("XY99ZZ"), UserId(2), sid(2), Role::Spectator);
        index.leave(&code("XY99ZZ"), UserId(1), sid(1));
        index.leave(&code("XY99ZZ"), UserId(2), sid(2));
        assert!(!index.contains_room(&code("XY99ZZ")));

        index.join(&code("XY99ZZ"), UserId(2), sid(5), Role::Spectator);

        let members = index.members_of(&code("XY99ZZ"));
        assert!(members.players.is_empty());
        assert_eq!(members.spectators, vec![(UserId(2), sid(5))]);
    }

    // =====================================================================
    // retain_live()
    // =====================================================================

    #[test]
    fn test_retain_live_prunes_dead_sessions_and_empty_rooms() {
        let mut index = MembershipIndex::new();
        index.join(&code("AB12CD"), UserId(1), sid(1), Role::Player);
        index.join(&code("AB12CD"), UserId(2), sid(2), Role::Spectator);
        index.join(&code("XY99ZZ"), UserId(3), sid(3), Role::Player);

        let report = index.retain_live(|s| s == sid(1));

        assert_eq!(report.removed.len(), 2);
        assert_eq!(report.rooms_dropped, vec![code("XY99ZZ")]);
        assert_eq!(index.room_codes(), vec![code("AB12CD")]);
        assert!(index.members_of(&code("AB12CD")).spectators.is_empty());
    }

    // =====================================================================
    // resolve_role()
    // =====================================================================

    async fn seeded() -> (MemoryRoomStore, Room) {
        let store = MemoryRoomStore::new();
        let room = store
            .create_room(NewRoom {
                code: code("AB12CD"),
                host: UserId(1),
                challenge_id: "two-sum".into(),
            })
            .await
            .unwrap();
        let room = store
            .update(
                room.id,
                RoomPatch {
                    player2: Some(Some(UserId(2))),
                    ..RoomPatch::default()
                },
            )
            .await
            .unwrap();
        store.upsert_spectator(room.id, UserId(3)).await.unwrap();
        (store, room)
    }

    #[tokio::test]
    async fn test_resolve_role_players_and_spectators() {
        let (store, _) = seeded().await;
        let c = code("AB12CD");

        assert_eq!(resolve_role(&store, &c, UserId(1)).await.unwrap().1, Role::Player);
        assert_eq!(resolve_role(&store, &c, UserId(2)).await.unwrap().1, Role::Player);
        assert_eq!(
            resolve_role(&store, &c, UserId(3)).await.unwrap().1,
            Role::Spectator
        );
    }

    #[tokio::test]
    async fn test_resolve_role_stranger_is_not_a_member() {
        let (store, _) = seeded().await;
        let result = resolve_role(&store, &code("AB12CD"), UserId(9)).await;
        assert!(matches!(result, Err(RoomError::NotAMember(UserId(9), _))));
    }

    #[tokio::test]
    async fn test_resolve_role_unknown_code_is_not_found() {
        let (store, _) = seeded().await;
        let result = resolve_role(&store, &code("QQQQQQ"), UserId(1)).await;
        assert!(matches!(result, Err(RoomError::NotFound(_))));
    }
}
