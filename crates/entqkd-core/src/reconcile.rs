//! Basis reconciliation ("sifting").

use crate::error::{CoreError, Result};
use crate::types::{Basis, EncodingState};

/// Whether an encoding basis and a measurement basis agree.
pub fn matches(encoding: Basis, measurement: Basis) -> bool {
    encoding == measurement
}

/// Whether Bob's measurement basis agrees with the basis of Alice's state.
pub fn state_matches(state: EncodingState, measurement: Basis) -> bool {
    matches(state.basis(), measurement)
}

/// Evaluate a whole backlog of rounds at once.
///
/// Returns the positions (into the input slices) of rounds whose bases
/// agree. A `None` basis marks a round Bob could not measure; it never
/// matches.
pub fn sift(states: &[EncodingState], bases: &[Option<Basis>]) -> Result<Vec<usize>> {
    if states.len() != bases.len() {
        return Err(CoreError::BatchLengthMismatch {
            states: states.len(),
            bases: bases.len(),
        });
    }

    Ok(states
        .iter()
        .zip(bases)
        .enumerate()
        .filter_map(|(i, (state, basis))| match basis {
            Some(b) if state_matches(*state, *b) => Some(i),
            _ => None,
        })
        .collect())
}
