//! The durable room store.
//!
//! The store is shared with the request/response web app, so every write
//! here may race a write from there. [`RoomStore::transition`] is the one
//! synchronized primitive: a compare-and-set on the room's status. Writes
//! that must not happen after the room has moved on (ready toggles, game
//! start, game end) go through it. Everything else is last-writer-wins.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use duelroom_protocol::{RoomCode, RoomId, RoomStatus, UserId};

use crate::{ChatMessage, NewRoom, Room, RoomPatch, StoreError};

/// Key-value access to rooms, spectator records and chat.
///
/// Implementations must make [`transition`](Self::transition) atomic with
/// respect to every other write on the same room.
pub trait RoomStore: Send + Sync + 'static {
    /// Looks a room up by its public code.
    fn get_by_code(
        &self,
        code: &RoomCode,
    ) -> impl Future<Output = Result<Option<Room>, StoreError>> + Send;

    /// Looks a room up by its numeric id.
    fn get_by_id(&self, id: RoomId)
    -> impl Future<Output = Result<Option<Room>, StoreError>> + Send;

    /// Inserts a new `Waiting` room with the host in slot one.
    ///
    /// # Errors
    /// [`StoreError::CodeTaken`] if the code is already in use.
    fn create_room(&self, new: NewRoom) -> impl Future<Output = Result<Room, StoreError>> + Send;

    /// Applies `patch` unconditionally. A status change in the patch must
    /// still be a legal lifecycle step.
    fn update(
        &self,
        id: RoomId,
        patch: RoomPatch,
    ) -> impl Future<Output = Result<Room, StoreError>> + Send;

    /// Applies `patch` only if the room is currently `expected`.
    ///
    /// # Errors
    /// - [`StoreError::Conflict`]: the room is in another status
    /// - [`StoreError::InvalidTransition`]: the patch's status is not
    ///   reachable from `expected`
    fn transition(
        &self,
        id: RoomId,
        expected: RoomStatus,
        patch: RoomPatch,
    ) -> impl Future<Output = Result<Room, StoreError>> + Send;

    /// Appends a chat line and returns it with its id and timestamp.
    fn insert_chat_message(
        &self,
        room_id: RoomId,
        user_id: UserId,
        text: &str,
    ) -> impl Future<Output = Result<ChatMessage, StoreError>> + Send;

    /// Chat history, oldest first.
    fn list_chat(
        &self,
        room_id: RoomId,
    ) -> impl Future<Output = Result<Vec<ChatMessage>, StoreError>> + Send;

    fn list_spectators(
        &self,
        room_id: RoomId,
    ) -> impl Future<Output = Result<Vec<UserId>, StoreError>> + Send;

    fn upsert_spectator(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn delete_spectator(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Deletes the room row and its chat. Spectator records are the
    /// caller's to clear.
    fn delete_room(&self, id: RoomId) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Every room not yet `Finished`.
    fn list_unfinished(&self) -> impl Future<Output = Result<Vec<Room>, StoreError>> + Send;
}

/// An in-process [`RoomStore`].
///
/// One mutex guards all tables, which makes every operation (and in
/// particular `transition`) trivially atomic. [`set_unavailable`] simulates
/// an unreachable backend.
///
/// [`set_unavailable`]: MemoryRoomStore::set_unavailable
#[derive(Debug, Default)]
pub struct MemoryRoomStore {
    inner: Mutex<MemoryInner>,
    unavailable: AtomicBool,
}

#[derive(Debug, Default)]
struct MemoryInner {
    rooms: BTreeMap<RoomId, Room>,
    codes: HashMap<RoomCode, RoomId>,
    spectators: BTreeSet<(RoomId, UserId)>,
    chat: Vec<ChatMessage>,
    next_room_id: u64,
    next_chat_id: u64,
}

impl MemoryRoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every operation fails with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryInner>, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }
        Ok(self.inner.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl MemoryInner {
    fn room_mut(&mut self, id: RoomId) -> Result<&mut Room, StoreError> {
        self.rooms.get_mut(&id).ok_or(StoreError::NotFound(id))
    }
}

fn check_step(from: RoomStatus, patch: &RoomPatch) -> Result<(), StoreError> {
    match patch.status {
        Some(to) if to != from && !from.can_transition_to(to) => {
            Err(StoreError::InvalidTransition { from, to })
        }
        _ => Ok(()),
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

impl RoomStore for MemoryRoomStore {
    async fn get_by_code(&self, code: &RoomCode) -> Result<Option<Room>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .codes
            .get(code)
            .and_then(|id| inner.rooms.get(id))
            .cloned())
    }

    async fn get_by_id(&self, id: RoomId) -> Result<Option<Room>, StoreError> {
        Ok(self.lock()?.rooms.get(&id).cloned())
    }

    async fn create_room(&self, new: NewRoom) -> Result<Room, StoreError> {
        let mut inner = self.lock()?;
        if inner.codes.contains_key(&new.code) {
            return Err(StoreError::CodeTaken(new.code));
        }
        inner.next_room_id += 1;
        let room = Room {
            id: RoomId(inner.next_room_id),
            code: new.code,
            host: new.host,
            challenge_id: new.challenge_id,
            status: RoomStatus::Waiting,
            player1: Some(new.host),
            player2: None,
            player1_ready: false,
            player2_ready: false,
            player1_provider: None,
            player2_provider: None,
            player1_penalties: 0,
            player2_penalties: 0,
            result: None,
        };
        inner.codes.insert(room.code.clone(), room.id);
        inner.rooms.insert(room.id, room.clone());
        Ok(room)
    }

    async fn update(&self, id: RoomId, patch: RoomPatch) -> Result<Room, StoreError> {
        let mut inner = self.lock()?;
        let room = inner.room_mut(id)?;
        check_step(room.status, &patch)?;
        patch.apply(room);
        Ok(room.clone())
    }

    async fn transition(
        &self,
        id: RoomId,
        expected: RoomStatus,
        patch: RoomPatch,
    ) -> Result<Room, StoreError> {
        let mut inner = self.lock()?;
        let room = inner.room_mut(id)?;
        if room.status != expected {
            return Err(StoreError::Conflict {
                room_id: id,
                expected,
                actual: room.status,
            });
        }
        check_step(expected, &patch)?;
        patch.apply(room);
        Ok(room.clone())
    }

    async fn insert_chat_message(
        &self,
        room_id: RoomId,
        user_id: UserId,
        text: &str,
    ) -> Result<ChatMessage, StoreError> {
        let mut inner = self.lock()?;
        if !inner.rooms.contains_key(&room_id) {
            return Err(StoreError::NotFound(room_id));
        }
        inner.next_chat_id += 1;
        let message = ChatMessage {
            id: inner.next_chat_id,
            room_id,
            user_id,
            text: text.to_string(),
            sent_at: now_millis(),
        };
        inner.chat.push(message.clone());
        Ok(message)
    }

    async fn list_chat(&self, room_id: RoomId) -> Result<Vec<ChatMessage>, StoreError> {
        Ok(self
            .lock()?
            .chat
            .iter()
            .filter(|m| m.room_id == room_id)
            .cloned()
            .collect())
    }

    async fn list_spectators(&self, room_id: RoomId) -> Result<Vec<UserId>, StoreError> {
        Ok(self
            .lock()?
            .spectators
            .iter()
            .filter(|(r, _)| *r == room_id)
            .map(|(_, u)| *u)
            .collect())
    }

    async fn upsert_spectator(&self, room_id: RoomId, user_id: UserId) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if !inner.rooms.contains_key(&room_id) {
            return Err(StoreError::NotFound(room_id));
        }
        inner.spectators.insert((room_id, user_id));
        Ok(())
    }

    async fn delete_spectator(&self, room_id: RoomId, user_id: UserId) -> Result<(), StoreError> {
        self.lock()?.spectators.remove(&(room_id, user_id));
        Ok(())
    }

    async fn delete_room(&self, id: RoomId) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let room = inner.rooms.remove(&id).ok_or(StoreError::NotFound(id))?;
        inner.codes.remove(&room.code);
        inner.chat.retain(|m| m.room_id != id);
        Ok(())
    }

    async fn list_unfinished(&self) -> Result<Vec<Room>, StoreError> {
        Ok(self
            .lock()?
            .rooms
            .values()
            .filter(|r| !r.status.is_terminal())
            .cloned()
            .collect())
    }
}
