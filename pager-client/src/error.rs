//! Error types for pager-client.

use thiserror::Error;

/// Errors surfaced to callers of [`crate::SessionManager`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The connection or the login handshake failed before the session
    /// was signed in.
    #[error("connection lost before the session was signed in")]
    ConnectionLost,

    /// The operation needs a signed-in session.
    #[error("not signed in")]
    NotSignedIn,

    /// The configured sign-in deadline passed.
    #[error("sign-in timed out")]
    Timeout,

    /// The session task is no longer running.
    #[error("session closed")]
    SessionClosed,
}
