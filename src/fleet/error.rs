//! Error taxonomy and retry classification for fleet operations.
//!
//! Every variant except [`CookError::Config`] is local to one host (or one
//! input line) and is recovered by skipping or excluding that host. Nothing
//! here is allowed to abort a whole batch.
//!
//! # Retry Classification
//!
//! Dial failures are classified by message:
//!
//! 1. **Authentication failures (NOT retryable)**: wrong passwords, rejected
//!    keys, denied access. Retrying only risks locking the account.
//! 2. **Connection errors (retryable)**: refused, reset, timed out, unreachable.
//! 3. **Unknown errors**: retried unless they look like an SSH protocol error
//!    that carries no timeout/connect keyword.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while selecting, connecting to, or driving remote hosts.
#[derive(Debug, Error)]
pub enum CookError {
    #[error("tag '{tag}' does not exist")]
    UnknownTag { tag: String },

    #[error("failed to connect to {host}: {reason}")]
    Dial { host: String, reason: String },

    #[error("authentication to {host} failed: {reason}")]
    Auth { host: String, reason: String },

    #[error("failed to open shell on {host}: {reason}")]
    Shell { host: String, reason: String },

    #[error("session verification on {host} failed: {reason}")]
    Verification { host: String, reason: String },

    #[error("{host} did not finish within {timeout:?}, output is partial")]
    SentinelTimeout { host: String, timeout: Duration },

    #[error("failed to write to {host}: {reason}")]
    Write { host: String, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("incomplete arguments: {input}")]
    IncompleteArguments { input: String },

    #[error("empty command")]
    EmptyCommand,

    #[error("unrecognized command: {input}")]
    UnknownCommand { input: String },
}

impl CookError {
    /// Whether a failed dial attempt is worth repeating.
    pub fn is_retryable(&self) -> bool {
        match self {
            CookError::Dial { reason, .. } => is_retryable_error(reason),
            _ => false,
        }
    }
}

/// Authentication error patterns that indicate permanent failures.
const AUTH_ERRORS: &[&str] = &[
    "authentication failed",
    "permission denied",
    "publickey",
    "auth fail",
    "no authentication",
    "all authentication methods failed",
];

/// Connection error patterns that indicate transient failures.
const RETRYABLE_ERRORS: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection timed out",
    "timeout",
    "timed out",
    "network is unreachable",
    "no route to host",
    "host is down",
    "temporary failure",
    "resource temporarily unavailable",
    "handshake failed",
    "failed to connect",
    "broken pipe",
];

/// Determines if an error message describes a transient failure.
///
/// Authentication keywords are checked first and take precedence, so
/// "timeout during authentication failed" is NOT retryable.
pub(crate) fn is_retryable_error(error: &str) -> bool {
    let error_lower = error.to_lowercase();

    if AUTH_ERRORS.iter().any(|p| error_lower.contains(p)) {
        return false;
    }

    if RETRYABLE_ERRORS.iter().any(|p| error_lower.contains(p)) {
        return true;
    }

    !error_lower.contains("ssh") || error_lower.contains("connect")
}
