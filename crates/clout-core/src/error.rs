//! Error taxonomy (§7).
//!
//! Recoverable kinds (`Unavailable`, `RateLimited`, `NotFound`) are meant to
//! be surfaced to callers as plain `Err` values. Invariant violations
//! inside the core are also `Err` values here — Rust has no notion of an
//! "abort the process" error — but callers that hit them should treat the
//! operation as having made no observable change (§7 "state left in the
//! pre-merge snapshot").

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("replay detected: {0}")]
    Replay(String),

    #[error("expired: {0}")]
    Expired(String),

    #[error("rate limited")]
    RateLimited,

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("fatal configuration error: {0}")]
    FatalConfig(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
