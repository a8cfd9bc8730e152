//! The durable room record and the patches applied to it.

use duelroom_protocol::{
    GameResult, MemberView, ProviderSelection, RoomCode, RoomId, RoomSnapshot, RoomStatus, UserId,
};
use serde::{Deserialize, Serialize};

/// Which of the two player slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Slot {
    One,
    Two,
}

/// One scheduled two-player contest.
///
/// Invariants upheld by the [`Lobby`](crate::Lobby) and the server:
/// - `player1` is the host and is set for as long as the room exists
/// - `player2` is only ever set after `player1`
/// - `player1`, `player2` and the spectator set are pairwise disjoint
/// - slots, ready flags and providers only change while `Waiting`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub code: RoomCode,
    pub host: UserId,
    pub challenge_id: String,
    pub status: RoomStatus,
    pub player1: Option<UserId>,
    pub player2: Option<UserId>,
    pub player1_ready: bool,
    pub player2_ready: bool,
    pub player1_provider: Option<ProviderSelection>,
    pub player2_provider: Option<ProviderSelection>,
    pub player1_penalties: u32,
    pub player2_penalties: u32,
    pub result: Option<GameResult>,
}

impl Room {
    /// Which slot `user` occupies, if any.
    pub fn slot_of(&self, user: UserId) -> Option<Slot> {
        if self.player1 == Some(user) {
            Some(Slot::One)
        } else if self.player2 == Some(user) {
            Some(Slot::Two)
        } else {
            None
        }
    }

    /// Returns `true` if `user` occupies either slot.
    pub fn is_player(&self, user: UserId) -> bool {
        self.slot_of(user).is_some()
    }

    /// The ready flag of `slot`.
    pub fn is_ready(&self, slot: Slot) -> bool {
        match slot {
            Slot::One => self.player1_ready,
            Slot::Two => self.player2_ready,
        }
    }

    /// Both slots filled and both players ready.
    pub fn can_start(&self) -> bool {
        self.player1.is_some() && self.player2.is_some() && self.player1_ready && self.player2_ready
    }

    /// Builds the wire snapshot, pairing the durable row with the live
    /// member list.
    pub fn snapshot(&self, members: Vec<MemberView>) -> RoomSnapshot {
        RoomSnapshot {
            code: self.code.clone(),
            status: self.status,
            host: self.host,
            challenge_id: self.challenge_id.clone(),
            player1: self.player1,
            player2: self.player2,
            player1_ready: self.player1_ready,
            player2_ready: self.player2_ready,
            player1_provider: self.player1_provider.clone(),
            player2_provider: self.player2_provider.clone(),
            player1_penalties: self.player1_penalties,
            player2_penalties: self.player2_penalties,
            result: self.result.clone(),
            members,
        }
    }
}

/// What the store needs to create a room. The host takes slot one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRoom {
    pub code: RoomCode,
    pub host: UserId,
    pub challenge_id: String,
}

/// A partial update. `None` leaves a field alone; for nullable columns,
/// `Some(None)` clears them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomPatch {
    pub status: Option<RoomStatus>,
    pub player2: Option<Option<UserId>>,
    pub player1_ready: Option<bool>,
    pub player2_ready: Option<bool>,
    pub player1_provider: Option<Option<ProviderSelection>>,
    pub player2_provider: Option<Option<ProviderSelection>>,
    pub player1_penalties: Option<u32>,
    pub player2_penalties: Option<u32>,
    pub result: Option<GameResult>,
}

impl RoomPatch {
    /// A patch that only moves the status.
    pub fn status(status: RoomStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Sets the ready flag of `slot`.
    pub fn ready(slot: Slot, ready: bool) -> Self {
        match slot {
            Slot::One => Self {
                player1_ready: Some(ready),
                ..Self::default()
            },
            Slot::Two => Self {
                player2_ready: Some(ready),
                ..Self::default()
            },
        }
    }

    /// Sets the provider selection of `slot`.
    pub fn provider(slot: Slot, selection: ProviderSelection) -> Self {
        match slot {
            Slot::One => Self {
                player1_provider: Some(Some(selection)),
                ..Self::default()
            },
            Slot::Two => Self {
                player2_provider: Some(Some(selection)),
                ..Self::default()
            },
        }
    }

    /// Writes the patch onto `room`. Status legality is the store's call.
    pub fn apply(&self, room: &mut Room) {
        if let Some(status) = self.status {
            room.status = status;
        }
        if let Some(player2) = self.player2 {
            room.player2 = player2;
        }
        if let Some(ready) = self.player1_ready {
            room.player1_ready = ready;
        }
        if let Some(ready) = self.player2_ready {
            room.player2_ready = ready;
        }
        if let Some(provider) = &self.player1_provider {
            room.player1_provider = provider.clone();
        }
        if let Some(provider) = &self.player2_provider {
            room.player2_provider = provider.clone();
        }
        if let Some(n) = self.player1_penalties {
            room.player1_penalties = n;
        }
        if let Some(n) = self.player2_penalties {
            room.player2_penalties = n;
        }
        if let Some(result) = &self.result {
            room.result = Some(result.clone());
        }
    }
}

/// A stored chat line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: u64,
    pub room_id: RoomId,
    pub user_id: UserId,
    pub text: String,
    /// Unix time in milliseconds.
    pub sent_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room() -> Room {
        Room {
            id: RoomId(1),
            code: RoomCode::parse("AB12CD").unwrap(),
            host: UserId(1),
            challenge_id: "two-sum".into(),
            status: RoomStatus::Waiting,
            player1: Some(UserId(1)),
            player2: Some(UserId(2)),
            player1_ready: false,
            player2_ready: false,
            player1_provider: None,
            player2_provider: None,
            player1_penalties: 0,
            player2_penalties: 0,
            result: None,
        }
    }

    #[test]
    fn test_slot_of_identifies_players() {
        let r = room();
        assert_eq!(r.slot_of(UserId(1)), Some(Slot::One));
        assert_eq!(r.slot_of(UserId(2)), Some(Slot::Two));
        assert_eq!(r.slot_of(UserId(3)), None);
    }

    #[test]
    fn test_can_start_requires_both_slots_and_both_ready() {
        let mut r = room();
        assert!(!r.can_start());
        r.player1_ready = true;
        assert!(!r.can_start());
        r.player2_ready = true;
        assert!(r.can_start());
        r.player2 = None;
        assert!(!r.can_start());
    }

    #[test]
    fn test_patch_ready_touches_only_its_slot() {
        let mut r = room();
        r.player2_ready = true;
        RoomPatch::ready(Slot::One, true).apply(&mut r);
        assert!(r.player1_ready);
        assert!(r.player2_ready);
    }

    #[test]
    fn test_patch_can_clear_player2() {
        let mut r = room();
        let patch = RoomPatch {
            player2: Some(None),
            ..RoomPatch::default()
        };
        patch.apply(&mut r);
        assert_eq!(r.player2, None);
        assert_eq!(r.player1, Some(UserId(1)));
    }

    #[test]
    fn test_snapshot_copies_durable_fields() {
        let mut r = room();
        RoomPatch::provider(
            Slot::Two,
            ProviderSelection {
                provider: "acme".into(),
                model: "m2".into(),
            },
        )
        .apply(&mut r);
        let snap = r.snapshot(vec![]);
        assert_eq!(snap.code, r.code);
        assert_eq!(snap.player2_provider.unwrap().model, "m2");
        assert_eq!(snap.status, RoomStatus::Waiting);
    }
}
