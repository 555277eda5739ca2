//! Error types for the QKD core.

use thiserror::Error;

/// Errors raised by the pure core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("encoding state must be in 0..=3, got {0}")]
    InvalidEncodingState(u8),

    #[error("measurement basis must be 0 or 1, got {0}")]
    InvalidBasis(u8),

    #[error("batch length mismatch: {states} encoding states, {bases} measurement bases")]
    BatchLengthMismatch { states: usize, bases: usize },

    #[error("sifted key length mismatch: alice={alice}, bob={bob}")]
    KeyLengthMismatch { alice: usize, bob: usize },

    #[error("round index mismatch: alice={alice}, bob={bob}")]
    RoundIndexMismatch { alice: u64, bob: u64 },
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
