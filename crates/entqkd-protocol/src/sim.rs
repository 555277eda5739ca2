//! Reference substrate: Pauli-frame qubit simulator and entangled-pair source.
//!
//! Every qubit the protocol handles is a BB84 eigenstate, and every
//! operation applied after encoding is a Pauli. Tracking the Pauli frame of
//! each teleported state is therefore exact; no amplitudes are needed.
//!
//! Bob's pair half stays unresolved until Alice's Bell measurement has fixed
//! the frame. Measuring it earlier yields a uniformly random outcome, as a
//! real half of a Bell pair would.
//!
//! All durations here are simulated time and run on [`clock`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio::time::Instant;

use entqkd_core::{Basis, Corrections, EncodeOp, Pauli};

use crate::clock;
use crate::error::QuantumError;
use crate::quantum::{Entanglement, Measurement, QuantumResource, Result};

/// Timing of the entangling link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimTiming {
    /// Interval between pair emissions at the source.
    pub source_period: Duration,
    /// Source-to-Alice propagation delay.
    pub alice_delay: Duration,
    /// Source-to-Bob propagation delay.
    pub bob_delay: Duration,
    /// Time to allocate and initialise a data qubit.
    pub preparation_time: Duration,
}

/// Substrate parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimConfig {
    pub timing: SimTiming,
    /// Depolarizing rate of Bob's memory, in Hz. Zero is noiseless.
    pub depolar_rate: f64,
    /// Seed for Bell outcomes, noise and off-basis outcomes.
    pub seed: u64,
}

impl SimConfig {
    /// Noiseless substrate with the given timing.
    pub fn ideal(timing: SimTiming, seed: u64) -> Self {
        Self {
            timing,
            depolar_rate: 0.0,
            seed,
        }
    }
}

/// A BB84 eigenstate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Bb84 {
    basis: Basis,
    bit: bool,
}

impl Bb84 {
    fn prepared(op: EncodeOp) -> Self {
        let (basis, bit) = match op {
            EncodeOp::Identity => (Basis::Standard, false),
            EncodeOp::BitFlip => (Basis::Standard, true),
            EncodeOp::Hadamard => (Basis::Conjugate, false),
            EncodeOp::BitFlipHadamard => (Basis::Conjugate, true),
        };
        Self { basis, bit }
    }

    /// Apply a Pauli frame. X flips Z-eigenstates, Z flips X-eigenstates;
    /// global phases are dropped.
    fn with_frame(self, frame: Frame) -> Self {
        let flip = match self.basis {
            Basis::Standard => frame.x,
            Basis::Conjugate => frame.z,
        };
        Self {
            basis: self.basis,
            bit: self.bit ^ flip,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Frame {
    x: bool,
    z: bool,
}

impl Frame {
    fn apply(&mut self, pauli: Pauli) {
        match pauli {
            Pauli::X => self.x ^= true,
            Pauli::Z => self.z ^= true,
        }
    }

    fn compose(self, other: Frame) -> Frame {
        Frame {
            x: self.x ^ other.x,
            z: self.z ^ other.z,
        }
    }
}

/// Outcome of Alice's Bell measurement, keyed by pair.
#[derive(Debug, Clone, Copy)]
struct Teleported {
    original: Bb84,
    frame: Frame,
}

struct Shared {
    rng: StdRng,
    depolar_rate: f64,
    teleported: HashMap<u64, Teleported>,
}

impl Shared {
    /// Sample a depolarizing error for a qubit stored for `dwell`.
    fn depolarize(&mut self, dwell: Duration) -> Frame {
        if self.depolar_rate <= 0.0 {
            return Frame::default();
        }
        let p = 1.0 - (-self.depolar_rate * dwell.as_secs_f64()).exp();
        if !self.rng.gen_bool(p.clamp(0.0, 1.0)) {
            return Frame::default();
        }
        match self.rng.gen_range(0..3) {
            0 => Frame { x: true, z: false },
            1 => Frame { x: true, z: true },
            _ => Frame { x: false, z: true },
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum DataSlot {
    Empty,
    Allocated,
    Encoded(Bb84),
}

#[derive(Debug, Clone, Copy)]
struct PairHalf {
    pair: u64,
    arrived_at: Instant,
    frame: Frame,
}

struct Slots {
    data: DataSlot,
    comm: Option<PairHalf>,
}

#[derive(Debug)]
struct Delivery {
    pair: u64,
}

/// One peer's quantum memory in the simulator.
pub struct SimNode {
    role: &'static str,
    shared: Arc<Mutex<Shared>>,
    ready: tokio::sync::Mutex<mpsc::Receiver<Delivery>>,
    slots: Mutex<Slots>,
    preparation_time: Duration,
}

impl SimNode {
    fn new(
        role: &'static str,
        shared: Arc<Mutex<Shared>>,
        ready: mpsc::Receiver<Delivery>,
        preparation_time: Duration,
    ) -> Self {
        Self {
            role,
            shared,
            ready: tokio::sync::Mutex::new(ready),
            slots: Mutex::new(Slots {
                data: DataSlot::Empty,
                comm: None,
            }),
            preparation_time,
        }
    }
}

#[async_trait]
impl QuantumResource for SimNode {
    async fn next_entanglement(&self) -> Result<Entanglement> {
        let occupied = self.slots.lock().unwrap().comm.is_some();
        if occupied {
            return Err(QuantumError::SlotBusy("communication"));
        }

        let delivery = self
            .ready
            .lock()
            .await
            .recv()
            .await
            .ok_or(QuantumError::SourceClosed)?;

        let arrived_at = Instant::now();
        self.slots.lock().unwrap().comm = Some(PairHalf {
            pair: delivery.pair,
            arrived_at,
            frame: Frame::default(),
        });
        tracing::trace!(node = self.role, pair = delivery.pair, "pair half stored");

        Ok(Entanglement {
            pair: delivery.pair,
            arrived_at,
        })
    }

    async fn prepare_qubit(&self) -> Result<()> {
        let free = matches!(self.slots.lock().unwrap().data, DataSlot::Empty);
        if !free {
            return Err(QuantumError::SlotBusy("data"));
        }
        clock::sleep(self.preparation_time).await;

        let mut slots = self.slots.lock().unwrap();
        match slots.data {
            DataSlot::Empty => {
                slots.data = DataSlot::Allocated;
                Ok(())
            }
            _ => Err(QuantumError::SlotBusy("data")),
        }
    }

    fn encode(&self, op: EncodeOp) -> Result<()> {
        let mut slots = self.slots.lock().unwrap();
        match slots.data {
            DataSlot::Allocated => {
                slots.data = DataSlot::Encoded(Bb84::prepared(op));
                Ok(())
            }
            DataSlot::Empty => Err(QuantumError::SlotEmpty("data")),
            DataSlot::Encoded(_) => Err(QuantumError::AlreadyEncoded),
        }
    }

    fn bell_measure(&self) -> Result<Corrections> {
        let mut slots = self.slots.lock().unwrap();
        let original = match slots.data {
            DataSlot::Encoded(state) => state,
            DataSlot::Allocated => return Err(QuantumError::NotEncoded),
            DataSlot::Empty => return Err(QuantumError::SlotEmpty("data")),
        };
        let half = slots.comm.ok_or(QuantumError::SlotEmpty("communication"))?;
        slots.data = DataSlot::Empty;
        slots.comm = None;
        drop(slots);

        let mut shared = self.shared.lock().unwrap();
        let corrections = Corrections::from_bits([shared.rng.gen(), shared.rng.gen()]);
        // Bob's half now holds X^m1 Z^m0 applied to Alice's state.
        let frame = Frame {
            x: corrections.bit_flip,
            z: corrections.phase_flip,
        }
        .compose(half.frame);
        shared
            .teleported
            .insert(half.pair, Teleported { original, frame });

        Ok(corrections)
    }

    fn apply_correction(&self, pauli: Pauli) -> Result<()> {
        let mut slots = self.slots.lock().unwrap();
        let half = slots
            .comm
            .as_mut()
            .ok_or(QuantumError::SlotEmpty("communication"))?;
        half.frame.apply(pauli);
        Ok(())
    }

    fn measure(&self, basis: Basis) -> Result<Measurement> {
        let half = self
            .slots
            .lock()
            .unwrap()
            .comm
            .take()
            .ok_or(QuantumError::SlotEmpty("communication"))?;

        let mut shared = self.shared.lock().unwrap();
        let Some(teleported) = shared.teleported.remove(&half.pair) else {
            // Still maximally entangled with nothing: a coin flip.
            return Ok(Measurement {
                outcome: shared.rng.gen(),
                fidelity: None,
            });
        };

        let noise = shared.depolarize(clock::since(half.arrived_at));
        let state = teleported
            .original
            .with_frame(teleported.frame.compose(half.frame).compose(noise));
        let fidelity = if state == teleported.original { 1.0 } else { 0.0 };

        let outcome = if state.basis == basis {
            state.bit
        } else {
            shared.rng.gen()
        };

        Ok(Measurement {
            outcome,
            fidelity: Some(fidelity),
        })
    }

    fn release(&self) {
        let half = {
            let mut slots = self.slots.lock().unwrap();
            slots.data = DataSlot::Empty;
            slots.comm.take()
        };
        if let Some(half) = half {
            self.shared.lock().unwrap().teleported.remove(&half.pair);
        }
    }
}

/// Entangled-pair source on a fixed clock.
///
/// Emits pair `n` no earlier than `n * source_period` after start, and
/// delivers each half after its propagation delay. A peer holds at most one
/// undelivered half; the source waits for it to be taken before emitting
/// again.
pub struct PairSource {
    timing: SimTiming,
    alice: mpsc::Sender<Delivery>,
    bob: mpsc::Sender<Delivery>,
}

impl PairSource {
    /// Run until either peer's memory has gone away.
    pub async fn run(self) {
        let mut tick = Instant::now();
        for pair in 0u64.. {
            tokio::time::sleep_until(tick).await;
            let emitted = Instant::now();

            let (to_alice, to_bob) = tokio::join!(
                deliver(&self.alice, pair, clock::after(emitted, self.timing.alice_delay)),
                deliver(&self.bob, pair, clock::after(emitted, self.timing.bob_delay)),
            );
            if to_alice.is_err() || to_bob.is_err() {
                tracing::debug!(pair, "pair source stopping: peer gone");
                break;
            }

            tick = clock::after(tick, self.timing.source_period).max(Instant::now());
        }
    }
}

async fn deliver(
    tx: &mpsc::Sender<Delivery>,
    pair: u64,
    at: Instant,
) -> std::result::Result<(), ()> {
    tokio::time::sleep_until(at).await;
    tx.send(Delivery { pair }).await.map_err(|_| ())
}

/// Build Alice's node, Bob's node and the source driving them.
pub fn build(config: SimConfig) -> (SimNode, SimNode, PairSource) {
    let shared = Arc::new(Mutex::new(Shared {
        rng: StdRng::seed_from_u64(config.seed),
        depolar_rate: config.depolar_rate,
        teleported: HashMap::new(),
    }));

    let (alice_tx, alice_rx) = mpsc::channel(1);
    let (bob_tx, bob_rx) = mpsc::channel(1);
    let prep = config.timing.preparation_time;

    (
        SimNode::new("alice", Arc::clone(&shared), alice_rx, prep),
        SimNode::new("bob", shared, bob_rx, prep),
        PairSource {
            timing: config.timing,
            alice: alice_tx,
            bob: bob_tx,
        },
    )
}
