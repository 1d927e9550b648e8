//! Error types for the companion core.

use crate::auth::GatewayError;

/// Top-level error type for the voice companion.
///
/// Classification failures never appear here: the classifier always degrades
/// to a neutral result instead of returning an error.
#[derive(Debug, thiserror::Error)]
pub enum CompanionError {
    /// Configuration file could not be read, parsed or written.
    #[error("config error: {0}")]
    Config(String),

    /// Login, registration or memory backend error.
    #[error("backend error: {0}")]
    Gateway(#[from] GatewayError),

    /// An operation that needs a logged-in identity was called without one.
    #[error("not logged in")]
    NotLoggedIn,

    /// Voice transport failed to start or stop a session.
    #[error("transport error: {0}")]
    Transport(String),

    /// Session state machine rejected the request.
    #[error("session error: {0}")]
    Session(String),

    /// Identity store could not be (de)serialised.
    #[error("identity store error: {0}")]
    Identity(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, CompanionError>;
