//! Request-path room operations.
//!
//! The real-time server never creates rooms or assigns slots; the web app
//! does that over plain request/response, writing the same store the
//! server reads. [`Lobby`] is that write side: every operation here talks
//! to the [`RoomStore`] only and knows nothing about live connections.
//!
//! It also owns the durable sweep: rooms whose host has logged out are
//! deleted (still waiting) or force-finished (already playing).

use std::sync::Arc;

use duelroom_protocol::{GameResult, ProviderSelection, RoomCode, RoomStatus, UserId};
use duelroom_session::IdentityVerifier;

use crate::{NewRoom, Room, RoomError, RoomPatch, RoomStore, Slot, StoreError, generate_room_code};

/// Default number of codes tried before giving up on `create_room`.
const DEFAULT_CODE_ATTEMPTS: usize = 8;

/// Configuration for [`Lobby`].
#[derive(Debug, Clone)]
pub struct LobbyConfig {
    /// How many freshly generated codes to try when the store reports a
    /// collision.
    pub code_attempts: usize,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            code_attempts: DEFAULT_CODE_ATTEMPTS,
        }
    }
}

impl LobbyConfig {
    pub fn with_code_attempts(mut self, attempts: usize) -> Self {
        self.code_attempts = attempts.max(1);
        self
    }
}

/// What [`Lobby::leave`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum LeaveOutcome {
    /// The host left a waiting room; it is gone.
    RoomDeleted,
    /// The second player left; slot two is open again.
    SlotFreed(Room),
    /// A spectator's record was dropped.
    SpectatorRemoved,
}

/// Result of one durable sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DurableSweepReport {
    /// Waiting rooms deleted because their host's login expired.
    pub deleted: Vec<RoomCode>,
    /// Playing rooms force-finished for the same reason.
    pub finished: Vec<RoomCode>,
}

/// The request-path facade over a [`RoomStore`].
pub struct Lobby<S: RoomStore, V: IdentityVerifier> {
    store: Arc<S>,
    verifier: Arc<V>,
    config: LobbyConfig,
}

impl<S: RoomStore, V: IdentityVerifier> Lobby<S, V> {
    pub fn new(store: Arc<S>, verifier: Arc<V>, config: LobbyConfig) -> Self {
        Self {
            store,
            verifier,
            config,
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    async fn room(&self, code: &RoomCode) -> Result<Room, RoomError> {
        self.store
            .get_by_code(code)
            .await?
            .ok_or_else(|| RoomError::NotFound(code.clone()))
    }

    /// Opens a new waiting room with `host` in slot one.
    ///
    /// # Errors
    /// [`StoreError::CodeTaken`] if every attempted code collided.
    pub async fn create_room(
        &self,
        host: UserId,
        challenge_id: impl Into<String>,
    ) -> Result<Room, RoomError> {
        let challenge_id = challenge_id.into();
        let mut last_err = None;
        for _ in 0..self.config.code_attempts.max(1) {
            let code = generate_room_code(&mut rand::rng());
            let new = NewRoom {
                code,
                host,
                challenge_id: challenge_id.clone(),
            };
            match self.store.create_room(new).await {
                Ok(room) => {
                    tracing::info!(room = %room.code, %host, challenge = %room.challenge_id, "room created");
                    return Ok(room);
                }
                Err(StoreError::CodeTaken(code)) => {
                    tracing::debug!(%code, "room code collision, retrying");
                    last_err = Some(StoreError::CodeTaken(code));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(last_err
            .unwrap_or_else(|| StoreError::Unavailable("no room code attempted".into()))
            .into())
    }

    /// Claims slot two for `user`.
    ///
    /// Joining as a player drops any spectator record the user held for
    /// this room. Re-joining a slot the user already holds is a no-op.
    ///
    /// # Errors
    /// - [`RoomError::InvalidState`]: room not waiting, or already full
    pub async fn join_as_player(&self, code: &RoomCode, user: UserId) -> Result<Room, RoomError> {
        let room = self.room(code).await?;
        if room.is_player(user) {
            return Ok(room);
        }
        if room.status != RoomStatus::Waiting {
            return Err(RoomError::InvalidState(format!("room {code} is {}", room.status)));
        }
        if room.player2.is_some() {
            return Err(RoomError::InvalidState(format!("room {code} is full")));
        }

        // Players and spectators stay disjoint even if a write fails: the
        // spectator record goes first and comes back if the slot claim fails.
        let was_spectator = self.store.list_spectators(room.id).await?.contains(&user);
        if was_spectator {
            self.store.delete_spectator(room.id, user).await?;
        }
        let patch = RoomPatch {
            player2: Some(Some(user)),
            ..RoomPatch::default()
        };
        match self.store.transition(room.id, RoomStatus::Waiting, patch).await {
            Ok(room) => {
                tracing::info!(room = %code, %user, "player joined");
                Ok(room)
            }
            Err(e) => {
                if was_spectator {
                    if let Err(restore) = self.store.upsert_spectator(room.id, user).await {
                        tracing::warn!(room = %code, %user, error = %restore, "spectator record lost");
                    }
                }
                Err(e.into())
            }
        }
    }

    /// Records `user` as a spectator.
    ///
    /// # Errors
    /// - [`RoomError::InvalidState`]: the user is a player, or the room
    ///   is finished
    pub async fn spectate(&self, code: &RoomCode, user: UserId) -> Result<Room, RoomError> {
        let room = self.room(code).await?;
        if room.is_player(user) {
            return Err(RoomError::InvalidState(format!(
                "user {user} is a player in room {code}"
            )));
        }
        if room.status.is_terminal() {
            return Err(RoomError::InvalidState(format!("room {code} is finished")));
        }
        self.store.upsert_spectator(room.id, user).await?;
        tracing::info!(room = %code, %user, "spectator added");
        Ok(room)
    }

    /// Sets the AI provider and model for the user's slot. Waiting only.
    pub async fn set_provider(
        &self,
        code: &RoomCode,
        user: UserId,
        selection: ProviderSelection,
    ) -> Result<Room, RoomError> {
        let room = self.room(code).await?;
        let slot = room
            .slot_of(user)
            .ok_or_else(|| RoomError::NotAMember(user, code.clone()))?;
        Ok(self
            .store
            .transition(room.id, RoomStatus::Waiting, RoomPatch::provider(slot, selection))
            .await?)
    }

    /// Adds one penalty to the user's slot. Playing only.
    pub async fn record_penalty(&self, code: &RoomCode, user: UserId) -> Result<Room, RoomError> {
        let room = self.room(code).await?;
        let slot = room
            .slot_of(user)
            .ok_or_else(|| RoomError::NotAMember(user, code.clone()))?;
        let patch = match slot {
            Slot::One => RoomPatch {
                player1_penalties: Some(room.player1_penalties.saturating_add(1)),
                ..RoomPatch::default()
            },
            Slot::Two => RoomPatch {
                player2_penalties: Some(room.player2_penalties.saturating_add(1)),
                ..RoomPatch::default()
            },
        };
        let room = self
            .store
            .transition(room.id, RoomStatus::Playing, patch)
            .await?;
        tracing::debug!(room = %code, %user, ?slot, "penalty recorded");
        Ok(room)
    }

    /// Removes `user` from the room's durable membership.
    ///
    /// - host, room waiting: the room and its spectator records are deleted
    /// - second player, room waiting: slot two, its ready flag and provider
    ///   are cleared
    /// - spectator: the record is dropped, whatever the status
    ///
    /// # Errors
    /// - [`RoomError::InvalidState`]: a player leaving after the start
    /// - [`RoomError::NotAMember`]: the user holds nothing here
    pub async fn leave(&self, code: &RoomCode, user: UserId) -> Result<LeaveOutcome, RoomError> {
        let room = self.room(code).await?;
        match room.slot_of(user) {
            Some(_) if room.status != RoomStatus::Waiting => Err(RoomError::InvalidState(
                format!("cannot leave room {code} while it is {}", room.status),
            )),
            Some(Slot::One) => {
                self.delete_with_spectators(&room).await?;
                tracing::info!(room = %code, %user, "host left, room deleted");
                Ok(LeaveOutcome::RoomDeleted)
            }
            Some(Slot::Two) => {
                let patch = RoomPatch {
                    player2: Some(None),
                    player2_ready: Some(false),
                    player2_provider: Some(None),
                    ..RoomPatch::default()
                };
                let room = self
                    .store
                    .transition(room.id, RoomStatus::Waiting, patch)
                    .await?;
                tracing::info!(room = %code, %user, "player left, slot freed");
                Ok(LeaveOutcome::SlotFreed(room))
            }
            None => {
                let spectators = self.store.list_spectators(room.id).await?;
                if !spectators.contains(&user) {
                    return Err(RoomError::NotAMember(user, code.clone()));
                }
                self.store.delete_spectator(room.id, user).await?;
                Ok(LeaveOutcome::SpectatorRemoved)
            }
        }
    }

    /// Finishes a playing room from the request path, storing `result`.
    ///
    /// Finishing an already finished room returns it unchanged.
    ///
    /// # Errors
    /// [`RoomError::InvalidState`] if the game never started.
    pub async fn finish(
        &self,
        code: &RoomCode,
        result: Option<GameResult>,
    ) -> Result<Room, RoomError> {
        let room = self.room(code).await?;
        match room.status {
            RoomStatus::Finished => Ok(room),
            RoomStatus::Waiting => Err(RoomError::InvalidState(format!(
                "room {code} has not started"
            ))),
            RoomStatus::Playing => {
                let patch = RoomPatch {
                    status: Some(RoomStatus::Finished),
                    result,
                    ..RoomPatch::default()
                };
                match self.store.transition(room.id, RoomStatus::Playing, patch).await {
                    Ok(room) => {
                        tracing::info!(room = %code, "room finished");
                        Ok(room)
                    }
                    // Someone else finished it first; their result stands.
                    Err(StoreError::Conflict {
                        actual: RoomStatus::Finished,
                        ..
                    }) => self.room(code).await,
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    /// Deletes or finishes every unfinished room whose host no longer holds
    /// a valid login session.
    pub async fn sweep_abandoned(&self) -> Result<DurableSweepReport, RoomError> {
        let mut report = DurableSweepReport::default();
        for room in self.store.list_unfinished().await? {
            if self.verifier.is_session_valid(room.host).await {
                continue;
            }
            match room.status {
                RoomStatus::Waiting => match self.delete_with_spectators(&room).await {
                    Ok(()) => report.deleted.push(room.code),
                    Err(RoomError::Store(StoreError::NotFound(_))) => {}
                    Err(e) => return Err(e),
                },
                RoomStatus::Playing => {
                    match self
                        .store
                        .transition(room.id, RoomStatus::Playing, RoomPatch::status(RoomStatus::Finished))
                        .await
                    {
                        Ok(_) => report.finished.push(room.code),
                        Err(StoreError::Conflict { .. } | StoreError::NotFound(_)) => {}
                        Err(e) => return Err(e.into()),
                    }
                }
                RoomStatus::Finished => {}
            }
        }
        if !report.deleted.is_empty() || !report.finished.is_empty() {
            tracing::info!(
                deleted = report.deleted.len(),
                finished = report.finished.len(),
                "abandoned rooms swept"
            );
        }
        Ok(report)
    }

    /// Open rooms, after sweeping out abandoned ones.
    pub async fn list_rooms(&self) -> Result<Vec<Room>, RoomError> {
        self.sweep_abandoned().await?;
        Ok(self.store.list_unfinished().await?)
    }

    async fn delete_with_spectators(&self, room: &Room) -> Result<(), RoomError> {
        for user in self.store.list_spectators(room.id).await? {
            self.store.delete_spectator(room.id, user).await?;
        }
        self.store.delete_room(room.id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use duelroom_session::{Identity, StaticVerifier};

    use super::*;
    use crate::MemoryRoomStore;

    fn lobby() -> (Lobby<MemoryRoomStore, StaticVerifier>, Arc<StaticVerifier>) {
        let verifier = Arc::new(
            StaticVerifier::new()
                .with_token("tok-1", Identity::new(UserId(1), "ada"))
                .with_token("tok-2", Identity::new(UserId(2), "bob")),
        );
        let lobby = Lobby::new(
            Arc::new(MemoryRoomStore::new()),
            Arc::clone(&verifier),
            LobbyConfig::default(),
        );
        (lobby, verifier)
    }

    #[tokio::test]
    async fn test_create_room_generates_unique_codes() {
        let (lobby, _) = lobby();
        let a = lobby.create_room(UserId(1), "two-sum").await.unwrap();
        let b = lobby.create_room(UserId(1), "two-sum").await.unwrap();
        assert_ne!(a.code, b.code);
        assert_eq!(a.player1, Some(UserId(1)));
    }

    #[tokio::test]
    async fn test_join_as_player_fills_slot_two_and_drops_spectator_record() {
        let (lobby, _) = lobby();
        let room = lobby.create_room(UserId(1), "two-sum").await.unwrap();
        lobby.spectate(&room.code, UserId(2)).await.unwrap();

        let room = lobby.join_as_player(&room.code, UserId(2)).await.unwrap();

        assert_eq!(room.player2, Some(UserId(2)));
        assert!(lobby.store().list_spectators(room.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_join_as_player_full_room_returns_invalid_state() {
        let (lobby, _) = lobby();
        let room = lobby.create_room(UserId(1), "two-sum").await.unwrap();
        lobby.join_as_player(&room.code, UserId(2)).await.unwrap();

        let result = lobby.join_as_player(&room.code, UserId(3)).await;

        assert!(matches!(result, Err(RoomError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_spectate_as_player_is_refused() {
        let (lobby, _) = lobby();
        let room = lobby.create_room(UserId(1), "two-sum").await.unwrap();
        let result = lobby.spectate(&room.code, UserId(1)).await;
        assert!(matches!(result, Err(RoomError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_leave_host_waiting_deletes_room() {
        let (lobby, _) = lobby();
        let room = lobby.create_room(UserId(1), "two-sum").await.unwrap();
        lobby.spectate(&room.code, UserId(3)).await.unwrap();

        let outcome = lobby.leave(&room.code, UserId(1)).await.unwrap();

        assert_eq!(outcome, LeaveOutcome::RoomDeleted);
        assert!(lobby.store().get_by_code(&room.code).await.unwrap().is_none());
        assert!(lobby.store().list_spectators(room.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_leave_player_two_frees_slot() {
        let (lobby, _) = lobby();
        let room = lobby.create_room(UserId(1), "two-sum").await.unwrap();
        lobby.join_as_player(&room.code, UserId(2)).await.unwrap();

        let outcome = lobby.leave(&room.code, UserId(2)).await.unwrap();

        let LeaveOutcome::SlotFreed(room) = outcome else {
            panic!("expected SlotFreed, got {outcome:?}");
        };
        assert_eq!(room.player2, None);
        assert!(!room.player2_ready);
    }

    #[tokio::test]
    async fn test_leave_stranger_returns_not_a_member() {
        let (lobby, _) = lobby();
        let room = lobby.create_room(UserId(1), "two-sum").await.unwrap();
        let result = lobby.leave(&room.code, UserId(9)).await;
        assert!(matches!(result, Err(RoomError::NotAMember(..))));
    }

    #[tokio::test]
    async fn test_record_penalty_requires_playing() {
        let (lobby, _) = lobby();
        let room = lobby.create_room(UserId(1), "two-sum").await.unwrap();

        let result = lobby.record_penalty(&room.code, UserId(1)).await;
        assert!(matches!(
            result,
            Err(RoomError::Store(StoreError::Conflict { .. }))
        ));

        lobby
            .store()
            .update(room.id, RoomPatch::status(RoomStatus::Playing))
            .await
            .unwrap();
        let room = lobby.record_penalty(&room.code, UserId(1)).await.unwrap();
        assert_eq!(room.player1_penalties, 1);
    }

    #[tokio::test]
    async fn test_finish_is_idempotent() {
        let (lobby, _) = lobby();
        let room = lobby.create_room(UserId(1), "two-sum").await.unwrap();
        lobby
            .store()
            .update(room.id, RoomPatch::status(RoomStatus::Playing))
            .await
            .unwrap();
        let result = GameResult {
            player1_score: 80,
            winner: Some(UserId(1)),
            ..GameResult::default()
        };

        let first = lobby.finish(&room.code, Some(result.clone())).await.unwrap();
        let second = lobby.finish(&room.code, None).await.unwrap();

        assert_eq!(first.status, RoomStatus::Finished);
        assert_eq!(second.result, Some(result));
    }

    #[tokio::test]
    async fn test_sweep_abandoned_deletes_waiting_and_finishes_playing() {
        let (lobby, verifier) = lobby();
        let waiting = lobby.create_room(UserId(1), "two-sum").await.unwrap();
        let playing = lobby.create_room(UserId(1), "fizzbuzz").await.unwrap();
        let healthy = lobby.create_room(UserId(2), "fizzbuzz").await.unwrap();
        lobby
            .store()
            .update(playing.id, RoomPatch::status(RoomStatus::Playing))
            .await
            .unwrap();

        verifier.expire(UserId(1));
        let report = lobby.sweep_abandoned().await.unwrap();

        assert_eq!(report.deleted, vec![waiting.code.clone()]);
        assert_eq!(report.finished, vec![playing.code.clone()]);
        let open = lobby.list_rooms().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].code, healthy.code);
    }
}
