//! Proptest generators for property-based testing.

use proptest::prelude::*;

use entqkd::{SessionConfig, SessionMode, SessionSeeds};
use entqkd_core::{Basis, EncodingState};

/// Generate an encoding state.
pub fn encoding_state() -> impl Strategy<Value = EncodingState> {
    (0u8..4).prop_map(|v| EncodingState::ALL[v as usize])
}

/// Generate a measurement basis.
pub fn basis() -> impl Strategy<Value = Basis> {
    prop_oneof![Just(Basis::Standard), Just(Basis::Conjugate)]
}

/// Generate equal-length state and basis vectors, with some failed
/// measurements.
pub fn sift_batch(max_len: usize) -> impl Strategy<Value = (Vec<EncodingState>, Vec<Option<Basis>>)> {
    prop::collection::vec((encoding_state(), prop::option::weighted(0.9, basis())), 0..=max_len)
        .prop_map(|rounds| rounds.into_iter().unzip::<_, _, Vec<_>, Vec<_>>())
}

/// Generate session seeds.
pub fn session_seeds() -> impl Strategy<Value = SessionSeeds> {
    any::<u64>().prop_map(SessionSeeds::from_master)
}

/// Generate a session mode.
pub fn session_mode() -> impl Strategy<Value = SessionMode> {
    prop_oneof![
        Just(SessionMode::Interactive),
        (1.0f64..4.0).prop_map(|oversubscription| SessionMode::Batched { oversubscription }),
    ]
}

/// Generate a small, noiseless, valid session configuration.
pub fn small_config() -> impl Strategy<Value = SessionConfig> {
    (1usize..=12, session_mode(), 0u64..40).prop_map(|(target_length, mode, classical_ns)| {
        SessionConfig {
            target_length,
            mode,
            classical_delay_ns: Some(classical_ns),
            ..SessionConfig::default()
        }
    })
}
