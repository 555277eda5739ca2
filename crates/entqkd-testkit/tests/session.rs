//! End-to-end sessions on the reference substrate.

use std::time::Duration;

use proptest::prelude::*;

use entqkd::protocol::sim::{self, SimConfig, SimTiming};
use entqkd::{
    MemoryLink, Peer, RngChooser, RoundStatus, SessionError, SessionEvent, SessionOrchestrator,
    SessionReport, SessionSeeds, Termination,
};
use entqkd_testkit::generators::{session_seeds, small_config};
use entqkd_testkit::{init_tracing, SessionFixture};

fn assert_complete(report: &SessionReport, target: usize) {
    assert_eq!(report.alice_key.len(), target);
    assert_eq!(report.bob_key.len(), target);
    assert!(report.keys_agree());
    assert_eq!(report.alice_fingerprint, report.bob_fingerprint);
    assert_eq!(report.alice_termination, Termination::TargetReached);
    assert_eq!(report.bob_termination, Termination::TargetReached);
}

#[tokio::test(start_paused = true)]
async fn test_interactive_session_produces_identical_keys() {
    init_tracing();

    let report = SessionFixture::new(32).run(1).await.unwrap();

    assert_complete(&report, 32);
    assert_eq!(report.stats.bit_errors, Some(0));
    assert_eq!(report.stats.qber, Some(0.0));
    assert_eq!(report.stats.matched_rounds, 32);
    assert_eq!(report.matched_rounds().count(), 32);
    assert!(report.stats.entanglement_attempts >= 32);
    assert_eq!(report.rounds.len() as u64, report.stats.entanglement_attempts);
}

#[tokio::test(start_paused = true)]
async fn test_batched_session_produces_identical_keys() {
    init_tracing();

    let report = SessionFixture::batched(32, 3.0).run(2).await.unwrap();

    assert_complete(&report, 32);
    assert_eq!(report.stats.qber, Some(0.0));
}

#[tokio::test(start_paused = true)]
async fn test_rounds_are_numbered_in_order() {
    let report = SessionFixture::new(8).run(3).await.unwrap();

    for (i, round) in report.rounds.iter().enumerate() {
        assert_eq!(round.index, i as u64);
        assert!(round.status.is_final());
    }
}

#[tokio::test(start_paused = true)]
async fn test_matched_rounds_agree_on_basis() {
    let report = SessionFixture::new(24).run(4).await.unwrap();

    for round in &report.rounds {
        let (Some(state), Some(basis)) = (round.encoding, round.measurement_basis) else {
            continue;
        };
        let agree = state.basis() == basis;
        assert_eq!(round.status == RoundStatus::Matched, agree, "round {}", round.index);
        if agree {
            assert_eq!(round.outcome, Some(state.bit()));
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_sifting_rate_is_about_one_half() {
    let report = SessionFixture::new(200).run(5).await.unwrap();

    let rate = report.stats.sifting_rate();
    assert!((0.4..=0.6).contains(&rate), "sifting rate {rate}");
}

#[tokio::test(start_paused = true)]
async fn test_same_seed_gives_same_key() {
    let first = SessionFixture::new(16).run(6).await.unwrap();
    let second = SessionFixture::new(16).run(6).await.unwrap();

    assert_eq!(first.alice_key, second.alice_key);
    assert_eq!(first.rounds, second.rounds);
}

/// Runs a session where Bob's pair half takes `bob_delay` to arrive and
/// classical frames take `classical`.
async fn run_with_timing(bob_delay: Duration, classical: Duration) -> SessionReport {
    let orchestrator = SessionOrchestrator::new(entqkd::SessionConfig::with_target(16)).unwrap();
    let seeds = SessionSeeds::from_master(7);
    let (alice_node, bob_node, source) = sim::build(SimConfig::ideal(
        SimTiming {
            source_period: Duration::from_nanos(50),
            alice_delay: Duration::from_nanos(10),
            bob_delay,
            preparation_time: Duration::ZERO,
        },
        seeds.substrate,
    ));
    let (alice_link, bob_link) = MemoryLink::pair(classical, classical);

    let alice = orchestrator.alice(alice_node, alice_link, RngChooser::seeded(seeds.alice));
    let bob = orchestrator.bob(bob_node, bob_link, RngChooser::seeded(seeds.bob));
    orchestrator
        .run(alice.run(), bob.run(), source.run())
        .await
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_arrival_order_does_not_change_the_key() {
    init_tracing();

    // Pair half first: it is buffered long before the corrections arrive.
    let entanglement_first = run_with_timing(Duration::from_nanos(10), Duration::from_nanos(40)).await;
    // Corrections first: Bob's half is still in flight when they land.
    let corrections_first = run_with_timing(Duration::from_nanos(200), Duration::from_nanos(3)).await;

    assert_complete(&entanglement_first, 16);
    assert_complete(&corrections_first, 16);
    assert_eq!(entanglement_first.alice_key, corrections_first.alice_key);
    assert_eq!(
        entanglement_first.matched_rounds().collect::<Vec<_>>(),
        corrections_first.matched_rounds().collect::<Vec<_>>()
    );

    let received_before_ready = corrections_first
        .rounds
        .iter()
        .filter(|r| r.correction_received_at < r.bob_ready_at)
        .count();
    assert_eq!(received_before_ready, corrections_first.rounds.len());

    let ready_before_received = entanglement_first
        .rounds
        .iter()
        .filter(|r| r.bob_ready_at < r.correction_received_at)
        .count();
    assert_eq!(ready_before_received, entanglement_first.rounds.len());
}

#[tokio::test(start_paused = true)]
async fn test_closed_link_ends_a_peer_before_its_next_round() {
    let orchestrator = SessionFixture::new(8).orchestrator();

    let sim = orchestrator.simulate(SessionSeeds::from_master(30));
    drop(sim.bob_link);
    let alice = orchestrator.alice(sim.alice_node, sim.alice_link, RngChooser::seeded(sim.seeds.alice));
    let report = alice.run().await;
    assert_eq!(report.termination, Termination::ConnectionClosed);
    assert_eq!(report.attempts, 0);

    let sim = orchestrator.simulate(SessionSeeds::from_master(31));
    drop(sim.alice_link);
    let bob = orchestrator.bob(sim.bob_node, sim.bob_link, RngChooser::seeded(sim.seeds.bob));
    let report = bob.run().await;
    assert_eq!(report.termination, Termination::ConnectionClosed);
    assert_eq!(report.attempts, 0);
}

#[tokio::test(start_paused = true)]
async fn test_round_budget_exhausted() {
    let err = SessionFixture::new(64)
        .with_max_rounds(10)
        .run(8)
        .await
        .unwrap_err();

    match err {
        SessionError::TargetUnreachable {
            key_len,
            target,
            stats,
        } => {
            assert!(key_len <= 10);
            assert_eq!(target, 64);
            assert_eq!(stats.entanglement_attempts, 10);
        }
        other => panic!("expected TargetUnreachable, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_deadline_stops_session() {
    init_tracing();

    let err = SessionFixture::new(10_000)
        .with_deadline_ns(2_000)
        .run(9)
        .await
        .unwrap_err();

    match err {
        SessionError::Stopped { key_len, stats } => {
            assert!(key_len < 10_000);
            assert!(stats.entanglement_attempts > 0);
        }
        other => panic!("expected Stopped, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_stop_before_start() {
    let orchestrator = SessionFixture::new(8).orchestrator();
    let stop = orchestrator.stop_handle();
    stop.stop();
    assert!(stop.is_stopped());

    let err = orchestrator
        .run_simulated(SessionSeeds::from_master(10))
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::Stopped { key_len: 0, .. }));
}

#[tokio::test(start_paused = true)]
async fn test_events_report_progress() {
    let orchestrator = SessionFixture::new(8).orchestrator();
    let mut events = orchestrator.subscribe();

    let report = orchestrator
        .run_simulated(SessionSeeds::from_master(11))
        .await
        .unwrap();

    let mut alice_matched = 0;
    let mut finished = Vec::new();
    while let Ok(event) = events.try_recv() {
        match event {
            SessionEvent::RoundMatched {
                peer: Peer::Alice, ..
            } => alice_matched += 1,
            SessionEvent::PeerFinished {
                peer,
                key_len,
                termination,
            } => {
                assert_eq!(key_len, 8);
                assert_eq!(termination, Termination::TargetReached);
                finished.push(peer);
            }
            _ => {}
        }
    }

    assert_eq!(alice_matched, report.alice_key.len());
    finished.sort_by_key(|peer| peer.as_str());
    assert_eq!(finished, vec![Peer::Alice, Peer::Bob]);
}

#[tokio::test(start_paused = true)]
async fn test_report_json_round_trip() {
    let report = SessionFixture::new(8).run(12).await.unwrap();

    let json = report.to_json().unwrap();
    let parsed = SessionReport::from_json(&json).unwrap();

    assert_eq!(parsed.alice_key, report.alice_key);
    assert_eq!(parsed.alice_fingerprint, report.alice_fingerprint);
    assert_eq!(parsed.rounds.len(), report.rounds.len());
    assert_eq!(parsed.stats.entanglement_attempts, report.stats.entanglement_attempts);
}

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_noiseless_sessions_reach_the_target(config in small_config(), seeds in session_seeds()) {
        let target = config.target_length;
        let report = paused_runtime()
            .block_on(async move {
                SessionOrchestrator::new(config)?.run_simulated(seeds).await
            })
            .unwrap();

        prop_assert_eq!(report.alice_key.len(), target);
        prop_assert!(report.keys_agree());
        prop_assert_eq!(report.stats.bit_errors, Some(0));
    }
}
