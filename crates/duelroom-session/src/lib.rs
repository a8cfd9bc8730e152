//! Live connection sessions for duelroom.
//!
//! This crate answers "who is on the other end of this socket?":
//!
//! 1. **Verification**: resolving an opaque credential to a user
//!    ([`IdentityVerifier`] trait; the credential issuer is external)
//! 2. **Registry**: one [`Session`] per live connection
//!    ([`ConnectionRegistry`]), including which room it is attached to
//! 3. **Liveness**: a session is alive while its [`Outbox`] is open
//!
//! # How it fits in the stack
//!
//! ```text
//! Room layer (above)   ← membership index stores SessionIds
//!     ↕
//! Session layer (this crate)
//!     ↕
//! Protocol layer (below) ← UserId, RoomCode, Role
//! ```

#![allow(async_fn_in_trait)]

mod error;
mod registry;
mod session;
mod verifier;

pub use error::SessionError;
pub use registry::ConnectionRegistry;
pub use session::{Frame, Identity, Outbox, RoomAttachment, Session, SessionId};
pub use verifier::{IdentityVerifier, StaticVerifier};
