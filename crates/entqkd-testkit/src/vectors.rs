//! Sifting vectors.
//!
//! Fixed encoding states and measurement bases with the rounds the
//! reconciliation rule must keep. Every implementation of the rule has to
//! agree on these.

use entqkd_core::{sift, Basis, EncodingState};

/// A sifting test vector.
#[derive(Debug, Clone)]
pub struct SiftVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Alice's states, 0..=3.
    pub states: &'static [u8],
    /// Bob's bases, 0 (standard) or 1 (conjugate). `None` is a failed
    /// measurement.
    pub bases: &'static [Option<u8>],
    /// Indices that must match.
    pub expected_matches: &'static [usize],
    /// Alice's key bits from the matched rounds.
    pub expected_key: &'static [bool],
}

impl SiftVector {
    pub fn encoding_states(&self) -> Vec<EncodingState> {
        self.states
            .iter()
            .filter_map(|&s| EncodingState::new(s).ok())
            .collect()
    }

    pub fn measurement_bases(&self) -> Vec<Option<Basis>> {
        self.bases
            .iter()
            .map(|b| b.and_then(|b| Basis::from_index(b).ok()))
            .collect()
    }
}

/// All sifting vectors.
pub fn all_vectors() -> Vec<SiftVector> {
    vec![
        SiftVector {
            name: "four-state scenario",
            states: &[0, 2, 1, 3],
            bases: &[Some(0), Some(1), Some(1), Some(0)],
            expected_matches: &[0, 1],
            expected_key: &[false, false],
        },
        SiftVector {
            name: "all bases agree",
            states: &[0, 1, 2, 3],
            bases: &[Some(0), Some(0), Some(1), Some(1)],
            expected_matches: &[0, 1, 2, 3],
            expected_key: &[false, true, false, true],
        },
        SiftVector {
            name: "all bases disagree",
            states: &[0, 1, 2, 3],
            bases: &[Some(1), Some(1), Some(0), Some(0)],
            expected_matches: &[],
            expected_key: &[],
        },
        SiftVector {
            name: "failed measurements never match",
            states: &[0, 3, 1],
            bases: &[None, Some(1), None],
            expected_matches: &[1],
            expected_key: &[true],
        },
        SiftVector {
            name: "empty batch",
            states: &[],
            bases: &[],
            expected_matches: &[],
            expected_key: &[],
        },
    ]
}

/// Check every vector against [`sift`]. Returns the names of failures.
pub fn verify_all_vectors() -> Vec<&'static str> {
    all_vectors()
        .into_iter()
        .filter(|v| {
            let states = v.encoding_states();
            let matched = sift(&states, &v.measurement_bases());
            let Ok(indices) = matched else {
                return true;
            };
            let key: Vec<bool> = indices.iter().map(|&i| states[i].bit()).collect();
            indices != v.expected_matches || key != v.expected_key
        })
        .map(|v| v.name)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_vectors_pass() {
        let failures = verify_all_vectors();
        assert!(failures.is_empty(), "failing vectors: {:?}", failures);
    }

    #[test]
    fn test_vectors_are_well_formed() {
        for vector in all_vectors() {
            assert_eq!(vector.states.len(), vector.bases.len(), "{}", vector.name);
            assert_eq!(
                vector.expected_matches.len(),
                vector.expected_key.len(),
                "{}",
                vector.name
            );
        }
    }
}
