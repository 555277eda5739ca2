//! Quantum resource abstraction.
//!
//! The protocol never sees quantum states. It sees a per-round "entanglement
//! ready" signal, a handful of black-box operations on its local qubit slots,
//! and classical measurement outcomes.

use async_trait::async_trait;
use tokio::time::Instant;

use entqkd_core::{Basis, Corrections, EncodeOp, Pauli};

use crate::error::QuantumError;

/// Result type for quantum operations.
pub type Result<T> = std::result::Result<T, QuantumError>;

/// Notification that this peer's half of an entangled pair has arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entanglement {
    /// Sequence number of the pair at the source.
    pub pair: u64,
    /// When the half was placed in the communication slot.
    pub arrived_at: Instant,
}

/// Outcome of a single-qubit measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    /// Raw outcome bit.
    pub outcome: bool,
    /// Fidelity of the measured qubit to the state Alice teleported, when
    /// the substrate can tell.
    pub fidelity: Option<f64>,
}

/// A peer's view of the shared quantum resource.
///
/// Each peer owns a communication slot (receives pair halves) and Alice
/// additionally owns a data slot (the qubit she teleports). A slot belongs
/// to the current round until the round's measurement or [`release`] frees
/// it.
///
/// [`release`]: QuantumResource::release
#[async_trait]
pub trait QuantumResource: Send + Sync {
    /// Wait for the next pair half. Fires once per round.
    async fn next_entanglement(&self) -> Result<Entanglement>;

    /// Allocate a fresh |0> data qubit. Completes when the qubit is usable.
    async fn prepare_qubit(&self) -> Result<()>;

    /// Apply an encoding operation to the data qubit.
    fn encode(&self, op: EncodeOp) -> Result<()>;

    /// Bell measurement over the data qubit and the pair half.
    ///
    /// Consumes both qubits and returns the two correction bits.
    fn bell_measure(&self) -> Result<Corrections>;

    /// Apply a Pauli correction to the pair half.
    fn apply_correction(&self, pauli: Pauli) -> Result<()>;

    /// Measure the pair half in the given basis, consuming it.
    fn measure(&self, basis: Basis) -> Result<Measurement>;

    /// Discard whatever the slots hold.
    fn release(&self);
}
