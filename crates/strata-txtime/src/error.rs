//! Error types for scheduler construction.
//!
//! Per-packet outcomes (admission rejects, expiry) are not errors: they are
//! drop counters, see [`crate::admission::RejectReason`].

use thiserror::Error;

use crate::clock::ClockId;

// ── Errors ──────────────────────────────────────────────────────────

/// Reasons a scheduler configuration is refused.
///
/// Returned synchronously from construction; a scheduler is never created
/// from a configuration that fails validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing txtime options, which are mandatory")]
    MissingOptions,
    #[error("missing mandatory txtime parameter `{0}`")]
    MissingField(&'static str),
    #[error("invalid clockid {0}")]
    InvalidClockId(i32),
    #[error("invalid clock name `{0}`")]
    InvalidClockName(String),
    #[error("clockid {0} is not supported")]
    UnsupportedClockId(i32),
    #[error("clock {0} is not available from this clock source")]
    ClockUnavailable(ClockId),
    #[error("delta must be positive, got {0} ns")]
    NegativeDelta(i64),
    #[error("unsupported config version {0}")]
    UnsupportedVersion(u32),
    #[error("invalid config TOML: {0}")]
    Parse(String),
}

/// Errors from the threaded runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("txtime runtime is shut down")]
    ShutDown,
}
