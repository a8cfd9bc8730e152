//! Error types for the session layer.

use crate::SessionId;

/// Errors that can occur while verifying identities or managing sessions.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The connection tried a room action before authenticating.
    #[error("not authenticated")]
    Unauthenticated,

    /// The [`IdentityVerifier`](crate::IdentityVerifier) rejected the
    /// credential.
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    /// The connection already carries an identity.
    #[error("session {0} is already authenticated")]
    AlreadyAuthenticated(SessionId),

    /// No session is registered under this id (it was removed by a
    /// disconnect or a sweep).
    #[error("session {0} not found")]
    NotFound(SessionId),
}
