//! Sifting vectors and reconciliation properties.

use proptest::prelude::*;

use entqkd_core::{sift, state_matches};
use entqkd_testkit::generators::sift_batch;
use entqkd_testkit::{all_vectors, verify_all_vectors};

#[test]
fn test_sifting_vectors() {
    assert!(verify_all_vectors().is_empty());
}

#[test]
fn test_four_state_scenario_keeps_first_two_rounds() {
    let vector = all_vectors()
        .into_iter()
        .find(|v| v.name == "four-state scenario")
        .unwrap();

    let matched = sift(&vector.encoding_states(), &vector.measurement_bases()).unwrap();
    assert_eq!(matched, vec![0, 1]);
}

proptest! {
    #[test]
    fn prop_sift_keeps_exactly_the_agreeing_rounds((states, bases) in sift_batch(64)) {
        let matched = sift(&states, &bases).unwrap();

        let expected: Vec<usize> = states
            .iter()
            .zip(&bases)
            .enumerate()
            .filter(|(_, (state, basis))| basis.map_or(false, |b| state_matches(**state, b)))
            .map(|(i, _)| i)
            .collect();
        prop_assert_eq!(matched, expected);
    }

    #[test]
    fn prop_sift_result_is_ascending((states, bases) in sift_batch(64)) {
        let matched = sift(&states, &bases).unwrap();
        prop_assert!(matched.windows(2).all(|w| w[0] < w[1]));
    }
}
