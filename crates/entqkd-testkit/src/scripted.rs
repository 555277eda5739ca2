//! Scripted choice source.

use entqkd_core::{Basis, Chooser, CoreError, EncodingState};

/// A [`Chooser`] that replays fixed sequences, cycling when exhausted.
///
/// Give Alice and Bob clones of the same script to pin down both sides of
/// every round.
#[derive(Debug, Clone)]
pub struct ScriptedChooser {
    states: Vec<EncodingState>,
    bases: Vec<Basis>,
    next_state: usize,
    next_basis: usize,
}

impl ScriptedChooser {
    pub fn new(states: Vec<EncodingState>, bases: Vec<Basis>) -> Self {
        Self {
            states,
            bases,
            next_state: 0,
            next_basis: 0,
        }
    }

    /// Build from raw state values (0..=3) and basis indices (0 or 1).
    pub fn from_indices(states: &[u8], bases: &[u8]) -> Result<Self, CoreError> {
        let states = states
            .iter()
            .map(|&s| EncodingState::new(s))
            .collect::<Result<_, _>>()?;
        let bases = bases
            .iter()
            .map(|&b| Basis::from_index(b))
            .collect::<Result<_, _>>()?;
        Ok(Self::new(states, bases))
    }
}

impl Chooser for ScriptedChooser {
    fn encoding_state(&mut self) -> EncodingState {
        if self.states.is_empty() {
            return EncodingState::ALL[0];
        }
        let state = self.states[self.next_state % self.states.len()];
        self.next_state += 1;
        state
    }

    fn measurement_basis(&mut self) -> Basis {
        if self.bases.is_empty() {
            return Basis::Standard;
        }
        let basis = self.bases[self.next_basis % self.bases.len()];
        self.next_basis += 1;
        basis
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_cycles() {
        let mut chooser = ScriptedChooser::from_indices(&[0, 2, 1], &[1, 0]).unwrap();
        let states: Vec<u8> = (0..5).map(|_| chooser.encoding_state().value()).collect();
        assert_eq!(states, vec![0, 2, 1, 0, 2]);
        assert_eq!(chooser.measurement_basis(), Basis::Conjugate);
        assert_eq!(chooser.measurement_basis(), Basis::Standard);
        assert_eq!(chooser.measurement_basis(), Basis::Conjugate);
    }

    #[test]
    fn test_bad_indices() {
        assert!(ScriptedChooser::from_indices(&[4], &[0]).is_err());
        assert!(ScriptedChooser::from_indices(&[0], &[2]).is_err());
    }
}
