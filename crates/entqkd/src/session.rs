//! The session orchestrator.
//!
//! Runs Alice, Bob and the substrate driver concurrently on one task, then
//! reconciles the two peers' reports into a [`SessionReport`] or a
//! [`SessionError`].

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;

use entqkd_core::{Chooser, Round, RngChooser, SessionStats};
use entqkd_protocol::clock;
use entqkd_protocol::sim::{self, PairSource, SimConfig, SimNode};
use entqkd_protocol::{
    ActorContext, AliceActor, BobActor, ClassicalLink, EventSink, MemoryLink, Peer, PeerReport,
    QuantumResource, SessionEvent, Termination,
};

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::report::SessionReport;

/// Capacity of the event channel; slow subscribers lag rather than block.
const EVENT_CAPACITY: usize = 1024;

/// Seeds for one reproducible simulated session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSeeds {
    /// Alice's encoding choices.
    pub alice: u64,
    /// Bob's basis choices.
    pub bob: u64,
    /// Bell outcomes, noise and off-basis measurement outcomes.
    pub substrate: u64,
}

impl SessionSeeds {
    /// Derive all three seeds from one.
    pub fn from_master(master: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(master);
        Self {
            alice: rng.gen(),
            bob: rng.gen(),
            substrate: rng.gen(),
        }
    }
}

/// Raises the stop signal for a running session.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    /// Ask both peers to stop at their next wait point.
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }
}

/// The reference substrate, wired from a config but not yet running.
///
/// Fields are public so tests can install link faults or swap choosers
/// before handing the pieces to the orchestrator.
pub struct SimulatedSession {
    pub alice_node: SimNode,
    pub bob_node: SimNode,
    pub alice_link: MemoryLink,
    pub bob_link: MemoryLink,
    pub source: PairSource,
    pub seeds: SessionSeeds,
}

/// Runs one QKD session.
pub struct SessionOrchestrator {
    config: SessionConfig,
    events: broadcast::Sender<SessionEvent>,
    stop: Arc<watch::Sender<bool>>,
    epoch: Instant,
}

impl SessionOrchestrator {
    /// Create an orchestrator for a validated configuration.
    pub fn new(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (stop, _) = watch::channel(false);
        Ok(Self {
            config,
            events,
            stop: Arc::new(stop),
            epoch: Instant::now(),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Receive session events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            tx: Arc::clone(&self.stop),
        }
    }

    fn context(&self, peer: Peer) -> ActorContext {
        ActorContext {
            target: self.config.target_length,
            max_rounds: self.config.max_rounds(),
            mode: self.config.mode,
            epoch: self.epoch,
            events: EventSink::new(peer, self.events.clone()),
            stop: self.stop.subscribe(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Actors
    // ─────────────────────────────────────────────────────────────────────────

    /// Build Alice for this session.
    pub fn alice<Q, L, C>(&self, quantum: Q, link: L, chooser: C) -> AliceActor<Q, L, C>
    where
        Q: QuantumResource,
        L: ClassicalLink,
        C: Chooser,
    {
        AliceActor::new(quantum, link, chooser, self.context(Peer::Alice))
    }

    /// Build Bob for this session.
    pub fn bob<Q, L, C>(&self, quantum: Q, link: L, chooser: C) -> BobActor<Q, L, C>
    where
        Q: QuantumResource,
        L: ClassicalLink,
        C: Chooser,
    {
        BobActor::new(quantum, link, chooser, self.context(Peer::Bob))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Running
    // ─────────────────────────────────────────────────────────────────────────

    /// Run both peers and the substrate driver to completion.
    ///
    /// `alice` and `bob` are the actors' `run()` futures. The driver is
    /// polled alongside them and dropped once both peers have finished.
    pub async fn run<A, B, D>(&self, alice: A, bob: B, driver: D) -> Result<SessionReport>
    where
        A: Future<Output = PeerReport>,
        B: Future<Output = PeerReport>,
        D: Future<Output = ()>,
    {
        let started = Instant::now();
        let deadline = self.config.deadline();
        tracing::info!(
            target_length = self.config.target_length,
            mode = ?self.config.mode,
            "session starting"
        );

        let peers = async { tokio::join!(alice, bob) };
        let timer = async move {
            match deadline {
                Some(after) => clock::sleep(after).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(peers, driver, timer);

        let mut driver_done = false;
        let mut timer_done = false;
        let (alice, bob) = loop {
            tokio::select! {
                reports = &mut peers => break reports,
                _ = &mut driver, if !driver_done => driver_done = true,
                _ = &mut timer, if !timer_done => {
                    timer_done = true;
                    tracing::warn!(?deadline, "session deadline reached, stopping");
                    self.stop.send_replace(true);
                }
            }
        };

        reconcile(self.config.target_length, alice, bob, clock::since(started))
    }

    /// Wire the reference substrate from the config.
    pub fn simulate(&self, seeds: SessionSeeds) -> SimulatedSession {
        let (alice_node, bob_node, source) = sim::build(SimConfig {
            timing: self.config.sim_timing(),
            depolar_rate: self.config.depolar_rate,
            seed: seeds.substrate,
        });
        let delay = self.config.classical_delay();
        let (alice_link, bob_link) = MemoryLink::pair(delay, delay);

        SimulatedSession {
            alice_node,
            bob_node,
            alice_link,
            bob_link,
            source,
            seeds,
        }
    }

    /// Run a wired simulation with seeded choosers.
    pub async fn run_simulation(&self, sim: SimulatedSession) -> Result<SessionReport> {
        let alice = self.alice(
            sim.alice_node,
            sim.alice_link,
            RngChooser::seeded(sim.seeds.alice),
        );
        let bob = self.bob(sim.bob_node, sim.bob_link, RngChooser::seeded(sim.seeds.bob));
        self.run(alice.run(), bob.run(), sim.source.run()).await
    }

    /// Run a session on the reference substrate.
    pub async fn run_simulated(&self, seeds: SessionSeeds) -> Result<SessionReport> {
        self.run_simulation(self.simulate(seeds)).await
    }
}

/// Turn the two peer reports into a session outcome.
pub fn reconcile(
    target: usize,
    alice: PeerReport,
    bob: PeerReport,
    duration: Duration,
) -> Result<SessionReport> {
    let (rounds, merge_error) = merge_rounds(&alice.rounds, &bob.rounds);

    let mut stats = SessionStats::from_rounds(target, &rounds, duration);
    stats.entanglement_attempts = bob.attempts.max(alice.attempts);
    stats.record_key_comparison(&alice.key, &bob.key);

    let alice_len = alice.key.len();
    let bob_len = bob.key.len();
    let desync = |reason: String, stats: SessionStats| {
        tracing::warn!(alice_len, bob_len, %reason, "session desynchronised");
        SessionError::Desync {
            alice_len,
            bob_len,
            reason,
            stats: Box::new(stats),
        }
    };

    if alice_len != bob_len {
        return Err(desync("sifted key lengths differ".into(), stats));
    }
    if confirmed(&alice.rounds) != confirmed(&bob.rounds) {
        return Err(desync("confirmed rounds differ".into(), stats));
    }
    for report in [&alice, &bob] {
        if let Termination::Faulted(reason) = &report.termination {
            return Err(desync(format!("{} faulted: {reason}", report.peer), stats));
        }
    }
    if let Some(reason) = merge_error {
        return Err(desync(reason, stats));
    }

    if alice_len < target {
        let stopped = [&alice.termination, &bob.termination]
            .into_iter()
            .any(|t| *t == Termination::Stopped);
        return Err(if stopped {
            SessionError::Stopped {
                key_len: alice_len,
                stats: Box::new(stats),
            }
        } else {
            SessionError::TargetUnreachable {
                key_len: alice_len,
                target,
                stats: Box::new(stats),
            }
        });
    }

    tracing::info!(
        key_len = alice_len,
        attempts = stats.entanglement_attempts,
        qber = ?stats.qber,
        duration = ?stats.duration,
        "session complete"
    );

    Ok(SessionReport {
        alice_fingerprint: alice.key.fingerprint().to_hex(),
        bob_fingerprint: bob.key.fingerprint().to_hex(),
        alice_key: alice.key,
        bob_key: bob.key,
        rounds,
        stats,
        alice_termination: alice.termination,
        bob_termination: bob.termination,
    })
}

/// Merge the common prefix of both views; rounds only one peer finished are
/// kept as that peer saw them.
fn merge_rounds(alice: &[Round], bob: &[Round]) -> (Vec<Round>, Option<String>) {
    let mut merged = Vec::with_capacity(alice.len().max(bob.len()));
    let mut error = None;

    for (a, b) in alice.iter().zip(bob) {
        match Round::merge(a, b) {
            Ok(round) => merged.push(round),
            Err(err) => {
                error.get_or_insert_with(|| err.to_string());
                merged.push(a.clone());
            }
        }
    }
    let common = merged.len();
    merged.extend(alice.iter().skip(common).cloned());
    merged.extend(bob.iter().skip(common).cloned());

    (merged, error)
}

fn confirmed(rounds: &[Round]) -> BTreeSet<u64> {
    rounds
        .iter()
        .filter(|r| r.is_matched())
        .map(|r| r.index)
        .collect()
}
