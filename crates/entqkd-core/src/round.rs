//! Round records.
//!
//! Each peer keeps its own view of a round, filling in only the fields it
//! can observe. The session merges the two views by index after both peers
//! have finished.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::types::{Basis, Corrections, EncodingState};

/// How a round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RoundStatus {
    /// Not finalised yet.
    #[default]
    Pending,
    /// Bases agreed; one key bit on each side.
    Matched,
    /// Bases disagreed (or the match decision was unreadable).
    Discarded,
    /// Allocation, encoding or measurement failed; no key bit.
    Failed,
}

impl RoundStatus {
    /// Whether the round is finalised.
    pub fn is_final(&self) -> bool {
        !matches!(self, RoundStatus::Pending)
    }
}

/// One attempted key-bit exchange.
///
/// Timestamps are offsets from the session epoch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Round {
    /// Sequence index (0-based).
    pub index: u64,
    /// Alice's encoding choice.
    pub encoding: Option<EncodingState>,
    /// Bob's measurement basis.
    pub measurement_basis: Option<Basis>,
    /// Bell-measurement corrections.
    pub corrections: Option<Corrections>,
    /// Bob's raw measurement outcome.
    pub outcome: Option<bool>,
    /// Final status.
    pub status: RoundStatus,
    /// When Alice's half of the pair arrived.
    pub alice_ready_at: Option<Duration>,
    /// When Bob's half of the pair arrived.
    pub bob_ready_at: Option<Duration>,
    /// When Alice sent the corrections.
    pub correction_sent_at: Option<Duration>,
    /// When Bob received the corrections.
    pub correction_received_at: Option<Duration>,
    /// When the round was finalised.
    pub completed_at: Option<Duration>,
    /// Fidelity of Bob's corrected qubit, if the substrate reports it.
    pub fidelity: Option<f64>,
}

impl Round {
    /// A fresh record for the given index.
    pub fn new(index: u64) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    /// Whether this round contributed a key bit.
    pub fn is_matched(&self) -> bool {
        self.status == RoundStatus::Matched
    }

    /// Key bit Alice contributed, if any.
    pub fn alice_bit(&self) -> Option<bool> {
        if self.is_matched() {
            self.encoding.map(|s| s.bit())
        } else {
            None
        }
    }

    /// Classical latency of the correction message.
    pub fn correction_latency(&self) -> Option<Duration> {
        match (self.correction_sent_at, self.correction_received_at) {
            (Some(sent), Some(received)) => Some(received.saturating_sub(sent)),
            _ => None,
        }
    }

    /// Signed difference between Bob's and Alice's entanglement-ready times,
    /// in nanoseconds.
    pub fn entanglement_skew_nanos(&self) -> Option<i64> {
        match (self.alice_ready_at, self.bob_ready_at) {
            (Some(a), Some(b)) => Some(b.as_nanos() as i64 - a.as_nanos() as i64),
            _ => None,
        }
    }

    /// Merge Alice's and Bob's views of the same round.
    ///
    /// Alice's view is authoritative for the encoding and send time, Bob's
    /// for the basis, outcome and receipt time. A round is matched only if
    /// both peers recorded it as matched; otherwise a failure on either side
    /// wins over a discard.
    pub fn merge(alice: &Round, bob: &Round) -> Result<Round> {
        if alice.index != bob.index {
            return Err(CoreError::RoundIndexMismatch {
                alice: alice.index,
                bob: bob.index,
            });
        }

        let status = match (alice.status, bob.status) {
            (RoundStatus::Matched, RoundStatus::Matched) => RoundStatus::Matched,
            (RoundStatus::Failed, _) | (_, RoundStatus::Failed) => RoundStatus::Failed,
            (RoundStatus::Pending, _) | (_, RoundStatus::Pending) => RoundStatus::Pending,
            _ => RoundStatus::Discarded,
        };

        Ok(Round {
            index: alice.index,
            encoding: alice.encoding,
            measurement_basis: bob.measurement_basis.or(alice.measurement_basis),
            corrections: alice.corrections.or(bob.corrections),
            outcome: bob.outcome,
            status,
            alice_ready_at: alice.alice_ready_at,
            bob_ready_at: bob.bob_ready_at,
            correction_sent_at: alice.correction_sent_at,
            correction_received_at: bob.correction_received_at,
            completed_at: match (alice.completed_at, bob.completed_at) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            },
            fidelity: bob.fidelity,
        })
    }
}
