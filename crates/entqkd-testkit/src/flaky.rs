//! A quantum resource wrapper that fails chosen operations.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use entqkd_core::{Basis, Corrections, EncodeOp, Pauli};
use entqkd_protocol::quantum::{self, Entanglement, Measurement, QuantumResource};
use entqkd_protocol::QuantumError;

/// Wraps a substrate and fails every n-th Bell measurement or measurement.
///
/// Counts start at one, so `fail_measure_every(3)` fails the third, sixth,
/// ninth measurement and so on. A period of zero never fails.
#[derive(Debug)]
pub struct FlakyQuantum<Q> {
    inner: Q,
    bell_period: u64,
    measure_period: u64,
    bell_calls: AtomicU64,
    measure_calls: AtomicU64,
}

impl<Q> FlakyQuantum<Q> {
    pub fn new(inner: Q) -> Self {
        Self {
            inner,
            bell_period: 0,
            measure_period: 0,
            bell_calls: AtomicU64::new(0),
            measure_calls: AtomicU64::new(0),
        }
    }

    pub fn fail_bell_every(mut self, period: u64) -> Self {
        self.bell_period = period;
        self
    }

    pub fn fail_measure_every(mut self, period: u64) -> Self {
        self.measure_period = period;
        self
    }

    fn trips(counter: &AtomicU64, period: u64) -> bool {
        let call = counter.fetch_add(1, Ordering::Relaxed) + 1;
        period != 0 && call % period == 0
    }
}

#[async_trait]
impl<Q: QuantumResource> QuantumResource for FlakyQuantum<Q> {
    async fn next_entanglement(&self) -> quantum::Result<Entanglement> {
        self.inner.next_entanglement().await
    }

    async fn prepare_qubit(&self) -> quantum::Result<()> {
        self.inner.prepare_qubit().await
    }

    fn encode(&self, op: EncodeOp) -> quantum::Result<()> {
        self.inner.encode(op)
    }

    fn bell_measure(&self) -> quantum::Result<Corrections> {
        if Self::trips(&self.bell_calls, self.bell_period) {
            return Err(QuantumError::Device("bell measurement failed".into()));
        }
        self.inner.bell_measure()
    }

    fn apply_correction(&self, pauli: Pauli) -> quantum::Result<()> {
        self.inner.apply_correction(pauli)
    }

    fn measure(&self, basis: Basis) -> quantum::Result<Measurement> {
        if Self::trips(&self.measure_calls, self.measure_period) {
            return Err(QuantumError::Device("detector did not click".into()));
        }
        self.inner.measure(basis)
    }

    fn release(&self) {
        self.inner.release()
    }
}
