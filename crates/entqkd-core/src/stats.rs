//! Session statistics.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::key::SiftedKey;
use crate::round::{Round, RoundStatus};

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Aggregate statistics for one QKD session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Configured key length.
    pub target_length: usize,
    /// Rounds attempted (one entangled pair each).
    pub entanglement_attempts: u64,
    /// Rounds whose bases agreed.
    pub matched_rounds: u64,
    /// Rounds whose bases disagreed.
    pub discarded_rounds: u64,
    /// Rounds abandoned after a local failure.
    pub failed_rounds: u64,
    /// Bob's correction receipt time minus Alice's send time, per round.
    pub latencies: Vec<Duration>,
    /// Bob's minus Alice's entanglement-ready time, per round, in nanoseconds.
    pub entanglement_skews: Vec<i64>,
    /// Fidelity samples reported by the substrate.
    pub fidelities: Vec<f64>,
    /// Positions where the two sifted keys disagree.
    pub bit_errors: Option<usize>,
    /// Quantum bit error rate over the target length.
    pub qber: Option<f64>,
    /// Total session duration.
    pub duration: Duration,
}

impl SessionStats {
    /// Collect per-round samples from merged round records.
    pub fn from_rounds(target_length: usize, rounds: &[Round], duration: Duration) -> Self {
        let mut stats = SessionStats {
            target_length,
            duration,
            ..Self::default()
        };

        for round in rounds {
            stats.entanglement_attempts += 1;
            match round.status {
                RoundStatus::Matched => stats.matched_rounds += 1,
                RoundStatus::Discarded => stats.discarded_rounds += 1,
                RoundStatus::Failed => stats.failed_rounds += 1,
                RoundStatus::Pending => {}
            }
            if let Some(latency) = round.correction_latency() {
                stats.latencies.push(latency);
            }
            if let Some(skew) = round.entanglement_skew_nanos() {
                stats.entanglement_skews.push(skew);
            }
            if let Some(fidelity) = round.fidelity {
                stats.fidelities.push(fidelity);
            }
        }

        stats
    }

    /// Compare the two sifted keys and fill in the error figures.
    ///
    /// QBER is errors divided by the target length. Keys of unequal length
    /// are left uncompared.
    pub fn record_key_comparison(&mut self, alice: &SiftedKey, bob: &SiftedKey) {
        if let Ok(errors) = alice.bit_errors(bob) {
            self.bit_errors = Some(errors);
            self.qber = Some(qber(errors, self.target_length));
        }
    }

    /// Fraction of attempts whose bases agreed.
    pub fn sifting_rate(&self) -> f64 {
        if self.entanglement_attempts == 0 {
            return 0.0;
        }
        self.matched_rounds as f64 / self.entanglement_attempts as f64
    }

    /// Mean correction latency.
    pub fn mean_latency(&self) -> Option<Duration> {
        if self.latencies.is_empty() {
            return None;
        }
        let total: u128 = self.latencies.iter().map(Duration::as_nanos).sum();
        let mean = total / self.latencies.len() as u128;
        Some(Duration::new(
            (mean / NANOS_PER_SEC) as u64,
            (mean % NANOS_PER_SEC) as u32,
        ))
    }

    /// Mean fidelity.
    pub fn mean_fidelity(&self) -> Option<f64> {
        if self.fidelities.is_empty() {
            return None;
        }
        Some(self.fidelities.iter().sum::<f64>() / self.fidelities.len() as f64)
    }
}

/// Errors over target length; zero for an empty target.
pub fn qber(errors: usize, target_length: usize) -> f64 {
    if target_length == 0 {
        0.0
    } else {
        errors as f64 / target_length as f64
    }
}
