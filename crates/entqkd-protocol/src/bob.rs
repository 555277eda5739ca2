//! Bob: receives teleported qubits, measures them and keeps matched bits.
//!
//! Per round:
//!
//! 1. Send a pacing token.
//! 2. Wait for the pair half and Alice's corrections, in either order.
//! 3. Once both are in, apply the corrections (phase flip, then bit flip),
//!    pick a basis, measure, and send the basis.
//! 4. Read Alice's decision, keep the outcome if it matched, and Ack.
//!
//! A round without a measurement (Alice abandoned it, or the corrections or
//! measurement failed here) sends `Abandon` in place of the basis.
//!
//! In batched mode the bases go out together after the last round of the
//! batch, and one Ack closes the batch.

use tokio::time::Instant;

use entqkd_core::{Basis, Chooser, Corrections, Round, RoundStatus, SiftedKey};

use crate::actor::{check_round, send, unexpected, ActorContext, Halt, PeerReport, SessionMode, Termination};
use crate::error::{ProtocolError, Result};
use crate::link::ClassicalLink;
use crate::messages::{ClassicalMessage, Payload};
use crate::quantum::{self, Entanglement, Measurement, QuantumResource};
use crate::select::{Arrival, DualWait};

/// What Alice said about a round's qubit.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Instruction {
    Correct(Corrections),
    /// Alice could not teleport.
    Abandon,
    /// The frame did not decode.
    Unreadable(String),
}

type RoundArrival = Arrival<quantum::Result<Entanglement>, Result<ClassicalMessage>>;

/// The two inputs of a round, gathered in arrival order.
#[derive(Debug, Default)]
struct RoundInputs {
    pair: Option<Entanglement>,
    instruction: Option<(Instruction, Instant)>,
}

impl RoundInputs {
    /// Record one arrival. `at` is when it was observed.
    fn accept(&mut self, index: u64, arrival: RoundArrival, at: Instant) -> std::result::Result<(), Halt> {
        match arrival {
            Arrival::Left(entangled) => {
                let entanglement = entangled?;
                if entanglement.pair != index {
                    return Err(ProtocolError::RoundMismatch {
                        expected: index,
                        got: entanglement.pair,
                        context: "entangled pair",
                    }
                    .into());
                }
                self.pair = Some(entanglement);
            }
            Arrival::Right(received) => {
                let instruction = match received {
                    Ok(message) => {
                        check_round(&message, index, "corrections")?;
                        match message.payload {
                            Payload::Correction(corrections) => Instruction::Correct(corrections),
                            Payload::Abandon => Instruction::Abandon,
                            other => return Err(unexpected("Correction", &other).into()),
                        }
                    }
                    Err(ProtocolError::MalformedMessage(reason)) => Instruction::Unreadable(reason),
                    Err(err) => return Err(err.into()),
                };
                self.instruction = Some((instruction, at));
            }
        }
        Ok(())
    }

    /// Both inputs, once both have arrived.
    fn take(&mut self) -> Option<(Entanglement, Instruction, Instant)> {
        if self.pair.is_none() || self.instruction.is_none() {
            return None;
        }
        let pair = self.pair.take()?;
        let (instruction, at) = self.instruction.take()?;
        Some((pair, instruction, at))
    }
}

/// How the quantum half of a round went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Measured(Basis),
    /// Bob's own correction or measurement failed.
    LocalFailure,
    /// Alice sent `Abandon`.
    PeerAbandoned,
}

/// Bob's protocol state machine.
pub struct BobActor<Q, L, C> {
    quantum: Q,
    link: L,
    chooser: C,
    ctx: ActorContext,
    key: SiftedKey,
    rounds: Vec<Round>,
    attempts: u64,
    failed: u64,
}

impl<Q, L, C> BobActor<Q, L, C>
where
    Q: QuantumResource,
    L: ClassicalLink,
    C: Chooser,
{
    pub fn new(quantum: Q, link: L, chooser: C, ctx: ActorContext) -> Self {
        Self {
            key: SiftedKey::with_capacity(ctx.target),
            quantum,
            link,
            chooser,
            ctx,
            rounds: Vec::new(),
            attempts: 0,
            failed: 0,
        }
    }

    /// Run rounds until the key is complete or the session ends.
    pub async fn run(mut self) -> PeerReport {
        let termination = match self.drive().await {
            Ok(termination) => termination,
            Err(halt) => halt.termination(),
        };

        tracing::info!(
            key_len = self.key.len(),
            attempts = self.attempts,
            failed = self.failed,
            ?termination,
            "bob finished"
        );
        self.ctx
            .events
            .finished(self.key.len(), termination.clone());

        PeerReport {
            peer: self.ctx.events.peer(),
            key: self.key,
            rounds: self.rounds,
            attempts: self.attempts,
            failed: self.failed,
            termination,
        }
    }

    async fn drive(&mut self) -> std::result::Result<Termination, Halt> {
        loop {
            if self.key.len() >= self.ctx.target {
                return Ok(Termination::TargetReached);
            }
            let budget_left = self.ctx.max_rounds.saturating_sub(self.attempts);
            let size = self
                .ctx
                .mode
                .batch_size(self.ctx.target - self.key.len(), budget_left);
            if size == 0 {
                return Ok(Termination::RoundBudgetExhausted);
            }
            if !self.link.is_connected() {
                return Err(ProtocolError::ConnectionClosed.into());
            }
            self.ctx.checkpoint()?;

            match self.ctx.mode {
                SessionMode::Interactive => self.interactive_round().await?,
                SessionMode::Batched { .. } => self.batch(size).await?,
            }
        }
    }

    /// Pace the round, receive the qubit and its corrections, and measure.
    async fn receive_qubit(&mut self, index: u64) -> std::result::Result<(Round, Outcome), Halt> {
        self.attempts += 1;
        self.ctx.events.round_started(index);
        send(&self.link, index, Payload::Pacing).await?;

        let mut round = Round::new(index);
        let mut inputs = RoundInputs::default();
        let mut wait = DualWait::new(self.quantum.next_entanglement(), self.link.recv());
        let (entanglement, instruction, received_at) = loop {
            if let Some(complete) = inputs.take() {
                break complete;
            }
            match wait.next().await {
                Some(arrival) => inputs.accept(index, arrival, Instant::now())?,
                // Each side fires once, so both are in before this.
                None => return Err(ProtocolError::ConnectionClosed.into()),
            }
        };
        drop(wait);
        self.ctx.checkpoint()?;

        round.bob_ready_at = Some(self.ctx.offset(entanglement.arrived_at));
        round.correction_received_at = Some(self.ctx.offset(received_at));

        let outcome = match instruction {
            Instruction::Correct(corrections) => {
                round.corrections = Some(corrections);
                let basis = self.chooser.measurement_basis();
                match self.correct_and_measure(corrections, basis) {
                    Ok(measurement) => {
                        round.measurement_basis = Some(basis);
                        round.outcome = Some(measurement.outcome);
                        round.fidelity = measurement.fidelity;
                        tracing::debug!(round = index, %basis, "bob measured");
                        Outcome::Measured(basis)
                    }
                    Err(err) => {
                        tracing::warn!(round = index, error = %err, "bob measurement failed");
                        self.abandon(&mut round, err.to_string());
                        Outcome::LocalFailure
                    }
                }
            }
            Instruction::Abandon => {
                tracing::debug!(round = index, "alice abandoned round");
                self.abandon(&mut round, "alice abandoned round");
                Outcome::PeerAbandoned
            }
            Instruction::Unreadable(reason) => {
                tracing::warn!(round = index, %reason, "unreadable corrections");
                self.abandon(&mut round, format!("unreadable corrections: {reason}"));
                Outcome::LocalFailure
            }
        };

        Ok((round, outcome))
    }

    fn correct_and_measure(
        &self,
        corrections: Corrections,
        basis: Basis,
    ) -> quantum::Result<Measurement> {
        for pauli in corrections.paulis() {
            self.quantum.apply_correction(pauli)?;
        }
        self.quantum.measure(basis)
    }

    fn abandon(&mut self, round: &mut Round, reason: impl Into<String>) {
        self.quantum.release();
        round.status = RoundStatus::Failed;
        self.ctx.events.round_failed(round.index, reason);
    }

    async fn interactive_round(&mut self) -> std::result::Result<(), Halt> {
        let index = self.attempts;
        let (mut round, outcome) = self.receive_qubit(index).await?;

        match outcome {
            Outcome::Measured(basis) => {
                send(&self.link, index, Payload::Basis(basis)).await?;
                let decision = self.await_match(index).await?;
                self.settle(&mut round, decision == Some(true));
            }
            // Alice reads a reply for every round, even one she abandoned.
            Outcome::LocalFailure | Outcome::PeerAbandoned => {
                send(&self.link, index, Payload::Abandon).await?
            }
        }

        self.finish(round);
        send(&self.link, index, Payload::Ack).await?;
        Ok(())
    }

    async fn batch(&mut self, size: u64) -> std::result::Result<(), Halt> {
        let base = self.attempts;
        tracing::debug!(base, size, "bob starting batch");

        let mut pending = Vec::with_capacity(size as usize);
        let mut bases = Vec::with_capacity(size as usize);
        for index in base..base + size {
            let (round, outcome) = self.receive_qubit(index).await?;
            bases.push(match outcome {
                Outcome::Measured(basis) => Some(basis),
                _ => None,
            });
            pending.push(round);
        }
        send(&self.link, base, Payload::BasisBatch(bases)).await?;

        let mut is_match = vec![false; pending.len()];
        for index in self.await_match_batch(base, size).await? {
            is_match[(index - base) as usize] = true;
        }
        for (i, mut round) in pending.into_iter().enumerate() {
            if round.status != RoundStatus::Failed {
                self.settle(&mut round, is_match[i]);
            }
            self.finish(round);
        }

        send(&self.link, base, Payload::Ack).await?;
        Ok(())
    }

    fn settle(&mut self, round: &mut Round, matched: bool) {
        match round.outcome {
            Some(bit) if matched && self.key.len() < self.ctx.target => {
                self.key.push(bit);
                round.status = RoundStatus::Matched;
            }
            _ => round.status = RoundStatus::Discarded,
        }
    }

    fn finish(&mut self, mut round: Round) {
        round.completed_at = Some(self.ctx.now());
        match round.status {
            RoundStatus::Matched => {
                tracing::debug!(round = round.index, key_len = self.key.len(), "bob matched");
                self.ctx.events.round_matched(round.index, self.key.len());
            }
            RoundStatus::Discarded => self.ctx.events.round_discarded(round.index),
            RoundStatus::Failed => self.failed += 1,
            RoundStatus::Pending => {}
        }
        self.rounds.push(round);
    }

    /// Alice's decision, or `None` if the frame was unreadable.
    async fn await_match(&mut self, index: u64) -> std::result::Result<Option<bool>, Halt> {
        let received = self.link.recv().await;

        match received {
            Ok(message) => {
                check_round(&message, index, "match")?;
                match message.payload {
                    Payload::Match(matched) => Ok(Some(matched)),
                    other => Err(unexpected("Match", &other).into()),
                }
            }
            Err(ProtocolError::MalformedMessage(reason)) => {
                tracing::warn!(round = index, %reason, "unreadable match decision, discarding");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Matched round indices for a batch; empty if the frame was unreadable.
    async fn await_match_batch(&mut self, base: u64, size: u64) -> std::result::Result<Vec<u64>, Halt> {
        let received = self.link.recv().await;

        let message = match received {
            Ok(message) => message,
            Err(ProtocolError::MalformedMessage(reason)) => {
                tracing::warn!(base, %reason, "unreadable match batch, discarding batch");
                return Ok(Vec::new());
            }
            Err(err) => return Err(err.into()),
        };
        check_round(&message, base, "match batch")?;

        let indices = match message.payload {
            Payload::MatchBatch(indices) => indices,
            other => return Err(unexpected("MatchBatch", &other).into()),
        };

        let mut previous = None;
        for &index in &indices {
            let in_batch = (base..base + size).contains(&index);
            let ascending = previous.map_or(true, |p| index > p);
            if !in_batch || !ascending {
                return Err(ProtocolError::RoundMismatch {
                    expected: base,
                    got: index,
                    context: "match batch entry",
                }
                .into());
            }
            previous = Some(index);
        }

        Ok(indices)
    }
}
