//! Shared primitives for all Rust crates in Warden.

#![forbid(unsafe_code)]

/// Time sources injected into services.
pub mod clock;
/// Cryptographically secure randomness injected into services.
pub mod random;
/// Request metadata attached to security events.
pub mod request;

use thiserror::Error;

pub use clock::{Clock, ManualClock, SystemClock};
pub use random::{OsSecureRandom, SecureRandom};
pub use request::RequestContext;

/// Result type used across Warden crates.
pub type AppResult<T> = Result<T, AppError>;

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested role, request or configuration does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write operation conflicts with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A role id is already registered with different content.
    #[error("duplicate role: {0}")]
    DuplicateRole(String),

    /// A permission token is outside the registered vocabulary.
    #[error("invalid permission: {0}")]
    InvalidPermission(String),

    /// Caller failed a verification step.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Caller is blocked by authorization policy.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}
