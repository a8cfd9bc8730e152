//! End-to-end tests for the room layer: the request path (`Lobby`) writes
//! the durable store, the live path (`resolve_role` + `MembershipIndex`)
//! reads it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use duelroom_protocol::{Role, RoomCode, RoomId, RoomStatus, UserId};
use duelroom_room::{
    ChatMessage, Lobby, LobbyConfig, MemoryRoomStore, MembershipIndex, NewRoom, Room, RoomError,
    RoomPatch, RoomStore, Slot, StoreError, resolve_role,
};
use duelroom_session::{Identity, SessionId, StaticVerifier};

// =========================================================================
// Helpers
// =========================================================================

fn setup() -> (Lobby<MemoryRoomStore, StaticVerifier>, Arc<MemoryRoomStore>) {
    let store = Arc::new(MemoryRoomStore::new());
    let verifier = Arc::new(
        StaticVerifier::new()
            .with_token("tok-ada", Identity::new(UserId(1), "ada"))
            .with_token("tok-bob", Identity::new(UserId(2), "bob"))
            .with_token("tok-cy", Identity::new(UserId(3), "cy")),
    );
    let lobby = Lobby::new(Arc::clone(&store), verifier, LobbyConfig::default());
    (lobby, store)
}

/// A [`MemoryRoomStore`] whose `transition` can be made to fail while every
/// other operation keeps working.
#[derive(Default)]
struct FlakyTransitions {
    inner: MemoryRoomStore,
    fail: AtomicBool,
}

impl RoomStore for FlakyTransitions {
    async fn get_by_code(&self, code: &RoomCode) -> Result<Option<Room>, StoreError> {
        self.inner.get_by_code(code).await
    }

    async fn get_by_id(&self, id: RoomId) -> Result<Option<Room>, StoreError> {
        self.inner.get_by_id(id).await
    }

    async fn create_room(&self, new: NewRoom) -> Result<Room, StoreError> {
        self.inner.create_room(new).await
    }

    async fn update(&self, id: RoomId, patch: RoomPatch) -> Result<Room, StoreError> {
        self.inner.update(id, patch).await
    }

    async fn transition(
        &self,
        id: RoomId,
        expected: RoomStatus,
        patch: RoomPatch,
    ) -> Result<Room, StoreError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("transition refused".into()));
        }
        self.inner.transition(id, expected, patch).await
    }

    async fn insert_chat_message(
        &self,
        room_id: RoomId,
        user_id: UserId,
        text: &str,
    ) -> Result<ChatMessage, StoreError> {
        self.inner.insert_chat_message(room_id, user_id, text).await
    }

    async fn list_chat(&self, room_id: RoomId) -> Result<Vec<ChatMessage>, StoreError> {
        self.inner.list_chat(room_id).await
    }

    async fn list_spectators(&self, room_id: RoomId) -> Result<Vec<UserId>, StoreError> {
        self.inner.list_spectators(room_id).await
    }

    async fn upsert_spectator(&self, room_id: RoomId, user_id: UserId) -> Result<(), StoreError> {
        self.inner.upsert_spectator(room_id, user_id).await
    }

    async fn delete_spectator(&self, room_id: RoomId, user_id: UserId) -> Result<(), StoreError> {
        self.inner.delete_spectator(room_id, user_id).await
    }

    async fn delete_room(&self, id: RoomId) -> Result<(), StoreError> {
        self.inner.delete_room(id).await
    }

    async fn list_unfinished(&self) -> Result<Vec<Room>, StoreError> {
        self.inner.list_unfinished().await
    }
}

// =========================================================================
// Membership is granted by the durable room only
// =========================================================================

#[tokio::test]
async fn test_live_join_follows_durable_membership() {
    let (lobby, store) = setup();
    let room = lobby.create_room(UserId(1), "two-sum").await.unwrap();
    lobby.join_as_player(&room.code, UserId(2)).await.unwrap();
    lobby.spectate(&room.code, UserId(3)).await.unwrap();

    let mut index = MembershipIndex::new();
    for (n, user) in [UserId(1), UserId(2), UserId(3)].into_iter().enumerate() {
        let (_, role) = resolve_role(store.as_ref(), &room.code, user).await.unwrap();
        index.join(&room.code, user, SessionId::new(n as u64 + 1), role);
    }

    let members = index.members_of(&room.code);
    assert_eq!(members.players.len(), 2);
    assert_eq!(members.spectators.len(), 1);
    assert_eq!(index.role_of(&room.code, UserId(3)), Some(Role::Spectator));
}

#[tokio::test]
async fn test_stranger_cannot_enter_live_room() {
    let (lobby, store) = setup();
    let room = lobby.create_room(UserId(1), "two-sum").await.unwrap();

    let result = resolve_role(store.as_ref(), &room.code, UserId(42)).await;

    assert!(matches!(result, Err(RoomError::NotAMember(..))));
}

#[tokio::test]
async fn test_spectator_promoted_to_player_resolves_as_player() {
    let (lobby, store) = setup();
    let room = lobby.create_room(UserId(1), "two-sum").await.unwrap();
    lobby.spectate(&room.code, UserId(2)).await.unwrap();
    lobby.join_as_player(&room.code, UserId(2)).await.unwrap();

    let (room, role) = resolve_role(store.as_ref(), &room.code, UserId(2)).await.unwrap();

    assert_eq!(role, Role::Player);
    assert!(
        !store.list_spectators(room.id).await.unwrap().contains(&UserId(2)),
        "player and spectator sets must stay disjoint"
    );
}

// =========================================================================
// Lifecycle races between the two paths
// =========================================================================

#[tokio::test]
async fn test_ready_after_start_is_rejected_by_transition() {
    let (lobby, store) = setup();
    let room = lobby.create_room(UserId(1), "two-sum").await.unwrap();
    lobby.join_as_player(&room.code, UserId(2)).await.unwrap();
    store
        .transition(room.id, RoomStatus::Waiting, RoomPatch::status(RoomStatus::Playing))
        .await
        .unwrap();

    let result = store
        .transition(room.id, RoomStatus::Waiting, RoomPatch::ready(Slot::Two, true))
        .await;

    assert!(matches!(result, Err(StoreError::Conflict { .. })));
}

#[tokio::test]
async fn test_provider_locked_once_playing() {
    let (lobby, store) = setup();
    let room = lobby.create_room(UserId(1), "two-sum").await.unwrap();
    store
        .update(room.id, RoomPatch::status(RoomStatus::Playing))
        .await
        .unwrap();

    let result = lobby
        .set_provider(
            &room.code,
            UserId(1),
            duelroom_protocol::ProviderSelection {
                provider: "acme".into(),
                model: "m1".into(),
            },
        )
        .await;

    assert!(matches!(result, Err(RoomError::Store(StoreError::Conflict { .. }))));
}

#[tokio::test]
async fn test_deleted_room_is_not_found_for_live_join() {
    let (lobby, store) = setup();
    let room = lobby.create_room(UserId(1), "two-sum").await.unwrap();
    lobby.leave(&room.code, UserId(1)).await.unwrap();

    let result = resolve_role(store.as_ref(), &room.code, UserId(1)).await;

    assert!(matches!(result, Err(RoomError::NotFound(_))));
}

// =========================================================================
// Players and spectators stay disjoint across failed writes
// =========================================================================

#[tokio::test]
async fn test_failed_slot_claim_keeps_user_a_spectator_only() {
    let store = Arc::new(FlakyTransitions::default());
    let lobby = Lobby::new(
        Arc::clone(&store),
        Arc::new(StaticVerifier::new()),
        LobbyConfig::default(),
    );
    let room = lobby.create_room(UserId(1), "two-sum").await.unwrap();
    lobby.spectate(&room.code, UserId(2)).await.unwrap();

    store.fail.store(true, Ordering::SeqCst);
    let result = lobby.join_as_player(&room.code, UserId(2)).await;

    assert!(matches!(
        result,
        Err(RoomError::Store(StoreError::Unavailable(_)))
    ));
    let room = store.get_by_code(&room.code).await.unwrap().unwrap();
    assert_eq!(room.player2, None);
    assert_eq!(store.list_spectators(room.id).await.unwrap(), vec![UserId(2)]);
}

#[tokio::test]
async fn test_successful_slot_claim_drops_spectator_record() {
    let store = Arc::new(FlakyTransitions::default());
    let lobby = Lobby::new(
        Arc::clone(&store),
        Arc::new(StaticVerifier::new()),
        LobbyConfig::default(),
    );
    let room = lobby.create_room(UserId(1), "two-sum").await.unwrap();
    lobby.spectate(&room.code, UserId(2)).await.unwrap();

    let room = lobby.join_as_player(&room.code, UserId(2)).await.unwrap();

    assert_eq!(room.player2, Some(UserId(2)));
    assert!(store.list_spectators(room.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_slot_claim_against_unavailable_store_changes_nothing() {
    let (lobby, store) = setup();
    let room = lobby.create_room(UserId(1), "two-sum").await.unwrap();
    lobby.spectate(&room.code, UserId(3)).await.unwrap();

    store.set_unavailable(true);
    assert!(lobby.join_as_player(&room.code, UserId(3)).await.is_err());
    store.set_unavailable(false);

    let room = store.get_by_code(&room.code).await.unwrap().unwrap();
    assert_eq!(room.player2, None);
    assert_eq!(store.list_spectators(room.id).await.unwrap(), vec![UserId(3)]);
}
