//! Identity verification hook.
//!
//! duelroom doesn't issue credentials; the web app's login flow does. The
//! server only needs two answers from it:
//!
//! - "whose credential is this?" when a connection sends `auth`
//! - "is this user's login session still alive?" when the durable sweep
//!   decides whether a room's host has abandoned it
//!
//! Both are captured by [`IdentityVerifier`]. Production wires in the real
//! session backend; tests and the development binary use
//! [`StaticVerifier`].

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Mutex, PoisonError};

use duelroom_protocol::UserId;

use crate::{Identity, SessionError};

/// Resolves opaque credentials to identities.
///
/// `Send + Sync + 'static` because one verifier is shared by every
/// connection task for the lifetime of the server, and the returned futures
/// are `Send` so handlers can run on any runtime thread.
///
/// # Example
///
/// ```rust
/// use duelroom_protocol::UserId;
/// use duelroom_session::{Identity, IdentityVerifier, SessionError};
///
/// /// Accepts "<id>:<name>" tokens. Development only.
/// struct DevVerifier;
///
/// impl IdentityVerifier for DevVerifier {
///     async fn verify(&self, credential: &str) -> Result<Identity, SessionError> {
///         let (id, name) = credential
///             .split_once(':')
///             .ok_or_else(|| SessionError::InvalidCredential("expected id:name".into()))?;
///         let id: u64 = id
///             .parse()
///             .map_err(|_| SessionError::InvalidCredential("id must be a number".into()))?;
///         Ok(Identity::new(UserId(id), name))
///     }
///
///     async fn is_session_valid(&self, _user_id: UserId) -> bool {
///         true
///     }
/// }
/// ```
pub trait IdentityVerifier: Send + Sync + 'static {
    /// Validates a credential and returns who it belongs to.
    ///
    /// # Errors
    /// [`SessionError::InvalidCredential`] when the credential is unknown,
    /// expired, or malformed.
    fn verify(
        &self,
        credential: &str,
    ) -> impl Future<Output = Result<Identity, SessionError>> + Send;

    /// Returns `true` if the user still holds a valid login session.
    fn is_session_valid(&self, user_id: UserId) -> impl Future<Output = bool> + Send;
}

/// An in-memory verifier backed by a token table.
///
/// Tokens are registered up front with [`StaticVerifier::insert`]; a user's
/// login session counts as valid until [`StaticVerifier::expire`] is called.
#[derive(Debug, Default)]
pub struct StaticVerifier {
    inner: Mutex<StaticInner>,
}

#[derive(Debug, Default)]
struct StaticInner {
    tokens: HashMap<String, Identity>,
    expired: HashSet<UserId>,
}

impl StaticVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with_token(self, token: impl Into<String>, identity: Identity) -> Self {
        self.insert(token, identity);
        self
    }

    /// Registers a token. Re-registering a user revives their session.
    pub fn insert(&self, token: impl Into<String>, identity: Identity) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.expired.remove(&identity.user_id);
        inner.tokens.insert(token.into(), identity);
    }

    /// Marks a user's login session as expired. Their tokens stop verifying.
    pub fn expire(&self, user_id: UserId) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.expired.insert(user_id);
    }
}

impl IdentityVerifier for StaticVerifier {
    async fn verify(&self, credential: &str) -> Result<Identity, SessionError> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match inner.tokens.get(credential) {
            Some(identity) if !inner.expired.contains(&identity.user_id) => Ok(identity.clone()),
            Some(_) => Err(SessionError::InvalidCredential("session expired".into())),
            None => Err(SessionError::InvalidCredential("unknown token".into())),
        }
    }

    async fn is_session_valid(&self, user_id: UserId) -> bool {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        !inner.expired.contains(&user_id) && inner.tokens.values().any(|i| i.user_id == user_id)
    }
}
