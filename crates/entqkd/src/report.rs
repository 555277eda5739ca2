//! Session reports.

use serde::{Deserialize, Serialize};

use entqkd_core::{Round, SessionStats, SiftedKey};
use entqkd_protocol::Termination;

/// Outcome of a completed session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub alice_key: SiftedKey,
    pub bob_key: SiftedKey,
    /// Hex Blake3 fingerprint of Alice's key.
    pub alice_fingerprint: String,
    /// Hex Blake3 fingerprint of Bob's key.
    pub bob_fingerprint: String,
    /// Both peers' views merged by round index.
    pub rounds: Vec<Round>,
    pub stats: SessionStats,
    pub alice_termination: Termination,
    pub bob_termination: Termination,
}

impl SessionReport {
    /// Whether the two keys are bit-for-bit identical.
    pub fn keys_agree(&self) -> bool {
        self.alice_key == self.bob_key
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Indices of rounds that contributed key bits.
    pub fn matched_rounds(&self) -> impl Iterator<Item = u64> + '_ {
        self.rounds.iter().filter(|r| r.is_matched()).map(|r| r.index)
    }
}
