//! Error types for QKD sessions.

use entqkd_core::SessionStats;
use thiserror::Error;

/// Errors that can end a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration JSON did not parse.
    #[error("configuration parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// The two peers disagree about which rounds produced key bits.
    #[error("peers desynchronised ({reason}): alice has {alice_len} bits, bob has {bob_len}")]
    Desync {
        alice_len: usize,
        bob_len: usize,
        reason: String,
        stats: Box<SessionStats>,
    },

    /// Both keys agree but stopped short of the target.
    #[error("target key length {target} unreachable: stopped at {key_len} bits")]
    TargetUnreachable {
        key_len: usize,
        target: usize,
        stats: Box<SessionStats>,
    },

    /// The session was stopped before the keys were complete.
    #[error("session stopped at {key_len} bits")]
    Stopped {
        key_len: usize,
        stats: Box<SessionStats>,
    },
}

impl SessionError {
    /// Statistics gathered before the failure, if the session ran.
    pub fn stats(&self) -> Option<&SessionStats> {
        match self {
            SessionError::Desync { stats, .. }
            | SessionError::TargetUnreachable { stats, .. }
            | SessionError::Stopped { stats, .. } => Some(stats),
            SessionError::InvalidConfig(_) | SessionError::ConfigParse(_) => None,
        }
    }

    pub fn is_desync(&self) -> bool {
        matches!(self, SessionError::Desync { .. })
    }
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
