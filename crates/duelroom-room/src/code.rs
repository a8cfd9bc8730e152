//! Public room code generation.

use duelroom_protocol::{ROOM_CODE_LEN, RoomCode};
use rand::Rng;

/// Characters used for generated codes. No `I`, `O`, `0` or `1`, so a code
/// read aloud or off a screen can't be misheard.
pub const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Draws a fresh code. Uniqueness is the store's job; see
/// [`Lobby::create_room`](crate::Lobby::create_room).
pub fn generate_room_code<R: Rng + ?Sized>(rng: &mut R) -> RoomCode {
    let raw: String = (0..ROOM_CODE_LEN)
        .map(|_| char::from(ROOM_CODE_ALPHABET[rng.random_range(0..ROOM_CODE_ALPHABET.len())]))
        .collect();
    RoomCode::parse(&raw).expect("alphabet is uppercase alphanumeric")
}
