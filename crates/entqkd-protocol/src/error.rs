//! Error types for the protocol crate.

use thiserror::Error;

/// Failures inside a peer's quantum memory or the pair source.
///
/// All of these are round-level: the round is abandoned, not the session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QuantumError {
    /// A slot was requested while the previous round still owns it.
    #[error("qubit slot {0} is still in use")]
    SlotBusy(&'static str),

    /// An operation targeted an empty slot.
    #[error("qubit slot {0} is empty")]
    SlotEmpty(&'static str),

    /// Encoding was attempted twice on the same qubit.
    #[error("data qubit already encoded")]
    AlreadyEncoded,

    /// The Bell measurement needs an encoded data qubit.
    #[error("data qubit was never encoded")]
    NotEncoded,

    /// The entangled-pair source has shut down.
    #[error("entanglement source closed")]
    SourceClosed,

    /// The device reported a failed operation.
    #[error("quantum device fault: {0}")]
    Device(String),
}

/// Errors that can occur while running the protocol.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The classical connection is gone.
    #[error("classical connection closed")]
    ConnectionClosed,

    /// A frame could not be decoded.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// A frame could not be encoded.
    #[error("encoding error: {0}")]
    EncodingError(String),

    /// A message or pair belongs to a different round.
    #[error("round desynchronised: expected round {expected}, got {got} ({context})")]
    RoundMismatch {
        expected: u64,
        got: u64,
        context: &'static str,
    },

    /// A valid message arrived where the protocol does not allow it.
    #[error("unexpected {got} while waiting for {expected}")]
    UnexpectedMessage {
        expected: &'static str,
        got: &'static str,
    },

    /// Quantum resource failure.
    #[error("quantum resource error: {0}")]
    Quantum(#[from] QuantumError),

    /// Core type error (bad batch shape, etc.).
    #[error("core error: {0}")]
    Core(#[from] entqkd_core::CoreError),
}

impl ProtocolError {
    /// Whether this error ends the peer's participation in the session.
    ///
    /// Quantum failures and malformed frames are absorbed per round.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ProtocolError::Quantum(_) | ProtocolError::MalformedMessage(_)
        )
    }
}

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
