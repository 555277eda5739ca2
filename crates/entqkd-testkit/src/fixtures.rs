//! Test fixtures and helpers.
//!
//! Common setup code for simulated sessions.

use entqkd::{
    Fault, Result, SessionConfig, SessionMode, SessionOrchestrator, SessionReport, SessionSeeds,
    SimulatedSession,
};

use entqkd_core::RngChooser;

use crate::flaky::FlakyQuantum;
use crate::scripted::ScriptedChooser;

/// Install a test-writer tracing subscriber once. Honours `RUST_LOG`.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// A session configuration plus helpers to run it on the reference
/// substrate.
#[derive(Debug, Clone)]
pub struct SessionFixture {
    pub config: SessionConfig,
}

impl SessionFixture {
    /// Interactive, noiseless session with default timing.
    pub fn new(target_length: usize) -> Self {
        Self {
            config: SessionConfig::with_target(target_length),
        }
    }

    /// Batched session with the given oversubscription.
    pub fn batched(target_length: usize, oversubscription: f64) -> Self {
        Self::new(target_length).with_mode(SessionMode::Batched { oversubscription })
    }

    pub fn with_mode(mut self, mode: SessionMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn with_classical_delay_ns(mut self, ns: u64) -> Self {
        self.config.classical_delay_ns = Some(ns);
        self
    }

    pub fn with_depolar_rate(mut self, rate: f64) -> Self {
        self.config.depolar_rate = rate;
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: u64) -> Self {
        self.config.max_rounds = Some(max_rounds);
        self
    }

    pub fn with_deadline_ns(mut self, ns: u64) -> Self {
        self.config.deadline_ns = Some(ns);
        self
    }

    pub fn orchestrator(&self) -> SessionOrchestrator {
        SessionOrchestrator::new(self.config.clone()).expect("fixture config is valid")
    }

    /// Run with seeded random choices.
    pub async fn run(&self, seed: u64) -> Result<SessionReport> {
        self.orchestrator()
            .run_simulated(SessionSeeds::from_master(seed))
            .await
    }

    /// Run with faults installed on Alice's and Bob's outgoing channels.
    pub async fn run_with_faults(
        &self,
        seed: u64,
        alice_faults: Vec<Fault>,
        bob_faults: Vec<Fault>,
    ) -> Result<SessionReport> {
        let orchestrator = self.orchestrator();
        let sim = orchestrator.simulate(SessionSeeds::from_master(seed));
        for fault in alice_faults {
            sim.alice_link.inject(fault);
        }
        for fault in bob_faults {
            sim.bob_link.inject(fault);
        }
        orchestrator.run_simulation(sim).await
    }

    /// Run with both peers following the same script.
    pub async fn run_scripted(&self, seed: u64, script: ScriptedChooser) -> Result<SessionReport> {
        let orchestrator = self.orchestrator();
        let SimulatedSession {
            alice_node,
            bob_node,
            alice_link,
            bob_link,
            source,
            ..
        } = orchestrator.simulate(SessionSeeds::from_master(seed));

        let alice = orchestrator.alice(alice_node, alice_link, script.clone());
        let bob = orchestrator.bob(bob_node, bob_link, script);
        orchestrator
            .run(alice.run(), bob.run(), source.run())
            .await
    }

    /// Run with Alice's Bell measurement failing every `alice_bell_every`
    /// rounds and Bob's measurement every `bob_measure_every` rounds.
    pub async fn run_flaky(
        &self,
        seed: u64,
        alice_bell_every: u64,
        bob_measure_every: u64,
    ) -> Result<SessionReport> {
        self.run_flaky_with_faults(seed, alice_bell_every, bob_measure_every, vec![], vec![])
            .await
    }

    /// [`run_flaky`](Self::run_flaky) with faults on both outgoing channels.
    pub async fn run_flaky_with_faults(
        &self,
        seed: u64,
        alice_bell_every: u64,
        bob_measure_every: u64,
        alice_faults: Vec<Fault>,
        bob_faults: Vec<Fault>,
    ) -> Result<SessionReport> {
        let orchestrator = self.orchestrator();
        let sim = orchestrator.simulate(SessionSeeds::from_master(seed));
        for fault in alice_faults {
            sim.alice_link.inject(fault);
        }
        for fault in bob_faults {
            sim.bob_link.inject(fault);
        }

        let alice = orchestrator.alice(
            FlakyQuantum::new(sim.alice_node).fail_bell_every(alice_bell_every),
            sim.alice_link,
            RngChooser::seeded(sim.seeds.alice),
        );
        let bob = orchestrator.bob(
            FlakyQuantum::new(sim.bob_node).fail_measure_every(bob_measure_every),
            sim.bob_link,
            RngChooser::seeded(sim.seeds.bob),
        );
        orchestrator
            .run(alice.run(), bob.run(), sim.source.run())
            .await
    }
}
