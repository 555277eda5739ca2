//! Classical wire messages.
//!
//! Every frame on either classical channel is one [`ClassicalMessage`],
//! CBOR-encoded. The payload is a tagged enum, so a pacing token can never
//! be mistaken for a basis or a match decision.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use entqkd_core::{Basis, Corrections};

use crate::error::{ProtocolError, Result};

/// Current wire version, carried in every frame.
pub const PROTOCOL_VERSION: u8 = 0;

/// Upper bound on entries in a batched payload.
pub const MAX_BATCH_ENTRIES: usize = 1 << 16;

/// One classical frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassicalMessage {
    /// Wire version.
    pub version: u8,
    /// Round this message belongs to. For batch payloads, the index of the
    /// first round in the batch.
    pub round: u64,
    /// What the message says.
    pub payload: Payload,
}

impl ClassicalMessage {
    /// Build a message for the given round.
    pub fn new(round: u64, payload: Payload) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            round,
            payload,
        }
    }

    /// Encode to a CBOR frame.
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| ProtocolError::EncodingError(e.to_string()))?;
        Ok(Bytes::from(buf))
    }

    /// Decode a CBOR frame and check version and size limits.
    pub fn decode(frame: &[u8]) -> Result<Self> {
        let message: ClassicalMessage = ciborium::from_reader(frame)
            .map_err(|e| ProtocolError::MalformedMessage(e.to_string()))?;

        if message.version != PROTOCOL_VERSION {
            return Err(ProtocolError::MalformedMessage(format!(
                "unsupported wire version {}",
                message.version
            )));
        }
        message
            .payload
            .validate_limits()
            .map_err(|e| ProtocolError::MalformedMessage(e.into()))?;

        Ok(message)
    }
}

/// Message payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    /// Bob→Alice: round-start pacing token.
    Pacing,

    /// Alice→Bob: Bell-measurement corrections.
    Correction(Corrections),

    /// Bob→Alice: basis Bob measured in.
    Basis(Basis),

    /// Alice→Bob: whether the bases agreed.
    Match(bool),

    /// Bob→Alice: end-of-round acknowledgment.
    Ack,

    /// Either direction: the sender could not complete its part of the round.
    Abandon,

    /// Bob→Alice: bases for a whole batch, `None` where measurement failed.
    BasisBatch(Vec<Option<Basis>>),

    /// Alice→Bob: absolute indices of matched rounds in the batch.
    MatchBatch(Vec<u64>),
}

impl Payload {
    /// Short name for logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Pacing => "Pacing",
            Payload::Correction(_) => "Correction",
            Payload::Basis(_) => "Basis",
            Payload::Match(_) => "Match",
            Payload::Ack => "Ack",
            Payload::Abandon => "Abandon",
            Payload::BasisBatch(_) => "BasisBatch",
            Payload::MatchBatch(_) => "MatchBatch",
        }
    }

    /// Check that batched payloads respect size limits.
    pub fn validate_limits(&self) -> std::result::Result<(), &'static str> {
        match self {
            Payload::BasisBatch(bases) if bases.len() > MAX_BATCH_ENTRIES => {
                Err("too many bases in batch")
            }
            Payload::MatchBatch(indices) if indices.len() > MAX_BATCH_ENTRIES => {
                Err("too many match indices in batch")
            }
            _ => Ok(()),
        }
    }
}
