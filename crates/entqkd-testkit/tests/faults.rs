//! Channel faults and substrate failures.

use entqkd::protocol::messages::Payload;
use entqkd::{Fault, RoundStatus, SessionError, Termination};
use entqkd_testkit::{init_tracing, SessionFixture};

#[tokio::test(start_paused = true)]
async fn test_lost_positive_decision_desynchronises() {
    init_tracing();

    let err = SessionFixture::new(8)
        .run_with_faults(
            21,
            vec![Fault::truncate_at(|m| m.payload == Payload::Match(true))],
            vec![],
        )
        .await
        .unwrap_err();

    assert!(err.is_desync(), "expected desync, got {err:?}");
    match err {
        SessionError::Desync {
            alice_len, bob_len, ..
        } => assert_eq!(alice_len, bob_len + 1),
        other => panic!("expected Desync, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_corrupt_positive_decision_desynchronises() {
    init_tracing();

    let err = SessionFixture::new(8)
        .run_with_faults(
            22,
            vec![Fault::corrupt_once(|m| m.payload == Payload::Match(true))],
            vec![],
        )
        .await
        .unwrap_err();

    match err {
        SessionError::Desync {
            alice_len, bob_len, ..
        } => assert!(alice_len > bob_len),
        other => panic!("expected Desync, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_corrupt_negative_decision_is_absorbed() {
    let report = SessionFixture::new(16)
        .run_with_faults(
            23,
            vec![Fault::corrupt_once(|m| m.payload == Payload::Match(false))],
            vec![],
        )
        .await
        .unwrap();

    assert_eq!(report.alice_key.len(), 16);
    assert!(report.keys_agree());
}

#[tokio::test(start_paused = true)]
async fn test_corrupt_basis_is_discarded_on_both_sides() {
    let report = SessionFixture::new(16)
        .run_with_faults(
            24,
            vec![],
            vec![Fault::corrupt_once(|m| matches!(m.payload, Payload::Basis(_)))],
        )
        .await
        .unwrap();

    assert!(report.keys_agree());
    assert_eq!(report.rounds[0].status, RoundStatus::Discarded);
}

#[tokio::test(start_paused = true)]
async fn test_corrupt_pacing_is_skipped() {
    init_tracing();

    let report = SessionFixture::new(16)
        .run_with_faults(
            24,
            vec![],
            vec![Fault::corrupt_once(|m| m.payload == Payload::Pacing)],
        )
        .await
        .unwrap();

    assert_eq!(report.alice_key.len(), 16);
    assert!(report.keys_agree());
    assert_ne!(report.rounds[0].status, RoundStatus::Failed);
    assert_eq!(report.alice_termination, Termination::TargetReached);
}

#[tokio::test(start_paused = true)]
async fn test_corrupt_pacing_in_an_abandoned_round() {
    init_tracing();

    // Alice's third Bell measurement fails, so round 2 carries no basis and
    // the corrupted pacing token must not stand in for its Ack.
    let report = SessionFixture::new(16)
        .run_flaky_with_faults(
            32,
            3,
            0,
            vec![],
            vec![Fault::corrupt_once(|m| m.round == 2 && m.payload == Payload::Pacing)],
        )
        .await
        .unwrap();

    assert_eq!(report.alice_key.len(), 16);
    assert!(report.keys_agree());
    assert_eq!(report.rounds[2].status, RoundStatus::Failed);
    assert_eq!(report.alice_termination, Termination::TargetReached);
    assert_eq!(report.bob_termination, Termination::TargetReached);
}

#[tokio::test(start_paused = true)]
async fn test_corrupt_abandon_is_answered_with_abandon() {
    let report = SessionFixture::new(16)
        .run_flaky_with_faults(
            34,
            3,
            0,
            vec![Fault::corrupt_once(|m| m.payload == Payload::Abandon)],
            vec![],
        )
        .await
        .unwrap();

    assert_eq!(report.alice_key.len(), 16);
    assert!(report.keys_agree());
    assert_eq!(report.rounds[2].status, RoundStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_corrupt_pacing_in_a_batch() {
    let report = SessionFixture::batched(16, 2.0)
        .run_with_faults(
            33,
            vec![],
            vec![Fault::corrupt_once(|m| m.round == 1 && m.payload == Payload::Pacing)],
        )
        .await
        .unwrap();

    assert_eq!(report.alice_key.len(), 16);
    assert!(report.keys_agree());
}

#[tokio::test(start_paused = true)]
async fn test_corrupt_corrections_fail_the_round() {
    let report = SessionFixture::new(16)
        .run_with_faults(
            25,
            vec![Fault::corrupt_once(|m| matches!(m.payload, Payload::Correction(_)))],
            vec![],
        )
        .await
        .unwrap();

    assert!(report.keys_agree());
    assert_eq!(report.rounds[0].status, RoundStatus::Failed);
    assert_eq!(report.stats.failed_rounds, 1);
}

#[tokio::test(start_paused = true)]
async fn test_connection_lost_mid_session() {
    let err = SessionFixture::new(16)
        .run_with_faults(
            26,
            vec![],
            vec![Fault::truncate_at(|m| m.round == 5 && m.payload == Payload::Ack)],
        )
        .await
        .unwrap_err();

    // Both peers saw rounds 0..=5 through; the keys agree but are short.
    match err {
        SessionError::TargetUnreachable { key_len, stats, .. } => {
            assert!(key_len <= 6);
            assert!(stats.entanglement_attempts >= 6);
        }
        other => panic!("expected TargetUnreachable, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_failed_bell_measurements_are_skipped() {
    init_tracing();

    let report = SessionFixture::new(16).run_flaky(27, 4, 0).await.unwrap();

    assert_eq!(report.alice_key.len(), 16);
    assert!(report.keys_agree());
    assert!(report.stats.failed_rounds > 0);
    for round in report.rounds.iter().filter(|r| r.status == RoundStatus::Failed) {
        assert_eq!(round.corrections, None);
        assert_eq!(round.outcome, None);
    }
}

#[tokio::test(start_paused = true)]
async fn test_failed_measurements_are_skipped() {
    let report = SessionFixture::new(16).run_flaky(28, 0, 3).await.unwrap();

    assert_eq!(report.alice_key.len(), 16);
    assert!(report.keys_agree());
    assert!(report.stats.failed_rounds > 0);
    assert_eq!(report.alice_termination, Termination::TargetReached);
}

#[tokio::test(start_paused = true)]
async fn test_failures_in_batched_mode() {
    let report = SessionFixture::batched(16, 2.0)
        .run_flaky(29, 5, 3)
        .await
        .unwrap();

    assert_eq!(report.alice_key.len(), 16);
    assert!(report.keys_agree());
    assert!(report.stats.failed_rounds > 0);
}
