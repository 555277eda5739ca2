//! Random choices made by the peers.
//!
//! Each actor owns its own choice source so a session can be replayed from
//! seeds, or driven from a fixed script in tests.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::types::{Basis, EncodingState};

/// Source of the per-round random choices.
pub trait Chooser: Send {
    /// Alice's uniform choice over the four encoding states.
    fn encoding_state(&mut self) -> EncodingState;

    /// Bob's uniform choice of measurement basis.
    fn measurement_basis(&mut self) -> Basis;
}

/// A chooser backed by any `rand` generator.
#[derive(Debug, Clone)]
pub struct RngChooser<R> {
    rng: R,
}

impl<R: Rng + Send> RngChooser<R> {
    /// Wrap a generator.
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl RngChooser<StdRng> {
    /// Deterministic chooser from a seed.
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    /// Chooser seeded from OS entropy.
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }
}

impl<R: Rng + Send> Chooser for RngChooser<R> {
    fn encoding_state(&mut self) -> EncodingState {
        EncodingState::ALL[self.rng.gen_range(0..4)]
    }

    fn measurement_basis(&mut self) -> Basis {
        if self.rng.gen_bool(0.5) {
            Basis::Conjugate
        } else {
            Basis::Standard
        }
    }
}

impl<C: Chooser + ?Sized> Chooser for Box<C> {
    fn encoding_state(&mut self) -> EncodingState {
        (**self).encoding_state()
    }

    fn measurement_basis(&mut self) -> Basis {
        (**self).measurement_basis()
    }
}
