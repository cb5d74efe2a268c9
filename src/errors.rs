//! Error types shared across the service.
//!
//! Startup and plumbing code sticks to `Box<dyn Error>`; the enums here cover
//! the failures that callers need to tell apart.

use std::time::Duration;

use thiserror::Error;

/// Thread-safe boxed error, used where errors cross task boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why a session was refused at connection start.
///
/// The `Display` text is what the client sees, prefixed with `"Error: "`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Authentication token required.")]
    MissingToken,

    #[error("Token expired")]
    ExpiredToken,

    #[error("Invalid token")]
    InvalidToken,
}

/// Failures while minting a token.
#[derive(Error, Debug)]
pub enum TokenError {
    #[error("username must not be empty")]
    EmptySubject,

    #[error("token expiry is out of range")]
    ExpiryOutOfRange,

    #[error("failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

/// Failures inside a single generation request. Never surfaced to the client.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("retrieval failed: {0}")]
    Retrieval(BoxError),

    #[error("chat backend failed: {0}")]
    Backend(BoxError),

    #[error("chat backend timed out after {0:?}")]
    Timeout(Duration),
}
