//! Alice: prepares and teleports qubits, then decides which rounds match.
//!
//! Per round:
//!
//! 1. Draw an encoding state, allocate and encode a data qubit, and wait for
//!    the round's pair half. The two waits race.
//! 2. Bell-measure and send the corrections (or `Abandon` if the qubit could
//!    not be prepared).
//! 3. Consume Bob's pacing token, read his basis and reply with the match
//!    decision. A matched bit is committed as soon as the decision is sent.
//!    Bob answers an abandoned round with `Abandon`, which gets no reply.
//! 4. Wait for Bob's end-of-round Ack before starting the next round.
//!
//! In batched mode steps 3 and 4 happen once per batch.
//!
//! Bob's frames arrive in a fixed order (pacing, basis or abandon, Ack), and
//! Alice reads exactly one frame per step. An unreadable frame takes the
//! place of whichever frame was due.

use entqkd_core::{reconcile, sift, Basis, Chooser, EncodingState, Round, RoundStatus, SiftedKey};

use crate::actor::{check_round, send, unexpected, ActorContext, Halt, PeerReport, SessionMode, Termination};
use crate::error::{ProtocolError, QuantumError};
use crate::link::ClassicalLink;
use crate::messages::Payload;
use crate::quantum::QuantumResource;
use crate::select::DualWait;

/// Bob's answer to a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BasisReply {
    Basis(Basis),
    /// Bob could not measure.
    Abandoned,
    /// The frame did not decode.
    Unreadable,
}

/// Alice's protocol state machine.
pub struct AliceActor<Q, L, C> {
    quantum: Q,
    link: L,
    chooser: C,
    ctx: ActorContext,
    key: SiftedKey,
    rounds: Vec<Round>,
    attempts: u64,
    failed: u64,
}

impl<Q, L, C> AliceActor<Q, L, C>
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
    ///
    /// Consumes the actor; its quantum memory and link endpoint are dropped
    /// on return, which the peer observes as a closed connection.
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
            "alice finished"
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

    async fn drive(&mut self) -> Result<Termination, Halt> {
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

    /// Prepare, entangle and teleport one qubit.
    ///
    /// Sends the corrections, or `Abandon` when preparation or the Bell
    /// measurement failed; in that case the returned round is `Failed`.
    async fn teleport(&mut self, index: u64) -> Result<Round, Halt> {
        self.attempts += 1;
        self.ctx.events.round_started(index);

        let state = self.chooser.encoding_state();
        let mut round = Round::new(index);
        round.encoding = Some(state);

        let quantum = &self.quantum;
        let prepare = async move {
            quantum.prepare_qubit().await?;
            quantum.encode(state.operation())
        };
        let (prepared, entangled) = DualWait::new(prepare, quantum.next_entanglement())
            .both()
            .await
            .ok_or(QuantumError::SourceClosed)?;
        self.ctx.checkpoint()?;

        let entanglement = entangled?;
        if entanglement.pair != index {
            return Err(ProtocolError::RoundMismatch {
                expected: index,
                got: entanglement.pair,
                context: "entangled pair",
            }
            .into());
        }
        round.alice_ready_at = Some(self.ctx.offset(entanglement.arrived_at));

        match prepared.and_then(|()| self.quantum.bell_measure()) {
            Ok(corrections) => {
                round.corrections = Some(corrections);
                round.correction_sent_at = Some(self.ctx.now());
                send(&self.link, index, Payload::Correction(corrections)).await?;
                tracing::debug!(round = index, %state, "corrections sent");
            }
            Err(err) => {
                tracing::warn!(round = index, error = %err, "alice abandoned round");
                self.quantum.release();
                round.status = RoundStatus::Failed;
                self.ctx.events.round_failed(index, err.to_string());
                send(&self.link, index, Payload::Abandon).await?;
            }
        }

        Ok(round)
    }

    async fn interactive_round(&mut self) -> Result<(), Halt> {
        let index = self.attempts;
        let mut round = self.teleport(index).await?;
        self.await_pacing(index).await?;

        match (round.status, self.await_basis(index).await?) {
            // Bob never saw corrections for this round, so he cannot have measured.
            (RoundStatus::Failed, BasisReply::Basis(basis)) => {
                return Err(unexpected("Abandon", &Payload::Basis(basis)).into());
            }
            (RoundStatus::Failed, _) => {}
            (_, BasisReply::Basis(basis)) => {
                round.measurement_basis = Some(basis);
                let matched = round
                    .encoding
                    .map_or(false, |state| reconcile::state_matches(state, basis));
                send(&self.link, index, Payload::Match(matched)).await?;
                self.settle(&mut round, matched);
            }
            (_, BasisReply::Unreadable) => {
                send(&self.link, index, Payload::Match(false)).await?;
                round.status = RoundStatus::Discarded;
            }
            (_, BasisReply::Abandoned) => {
                round.status = RoundStatus::Failed;
                self.ctx.events.round_failed(index, "bob abandoned round");
            }
        }

        self.finish(round);
        self.await_ack(index).await
    }

    async fn batch(&mut self, size: u64) -> Result<(), Halt> {
        let base = self.attempts;
        tracing::debug!(base, size, "alice starting batch");

        let mut pending = Vec::with_capacity(size as usize);
        for index in base..base + size {
            pending.push(self.teleport(index).await?);
        }
        for index in base..base + size {
            self.await_pacing(index).await?;
        }

        let reply = self.await_basis_batch(base, size).await?;
        let bases: Vec<Option<Basis>> = match reply {
            Some(bases) => bases
                .into_iter()
                .zip(&pending)
                .map(|(basis, round)| match round.status {
                    RoundStatus::Failed => None,
                    _ => basis,
                })
                .collect(),
            None => vec![None; pending.len()],
        };
        let states: Vec<EncodingState> = pending.iter().filter_map(|r| r.encoding).collect();

        let matched = sift(&states, &bases).map_err(ProtocolError::from)?;
        let indices = matched.iter().map(|&i| base + i as u64).collect();
        send(&self.link, base, Payload::MatchBatch(indices)).await?;

        let mut is_match = vec![false; pending.len()];
        for i in matched {
            is_match[i] = true;
        }
        for (i, mut round) in pending.into_iter().enumerate() {
            if round.status != RoundStatus::Failed {
                round.measurement_basis = bases[i];
                self.settle(&mut round, is_match[i]);
            }
            self.finish(round);
        }

        self.await_ack(base).await
    }

    /// Commit or discard a round whose match decision has been sent.
    fn settle(&mut self, round: &mut Round, matched: bool) {
        match round.encoding {
            Some(state) if matched && self.key.len() < self.ctx.target => {
                self.key.push(state.bit());
                round.status = RoundStatus::Matched;
            }
            _ => round.status = RoundStatus::Discarded,
        }
    }

    fn finish(&mut self, mut round: Round) {
        round.completed_at = Some(self.ctx.now());
        match round.status {
            RoundStatus::Matched => {
                tracing::debug!(round = round.index, key_len = self.key.len(), "alice matched");
                self.ctx.events.round_matched(round.index, self.key.len());
            }
            RoundStatus::Discarded => self.ctx.events.round_discarded(round.index),
            RoundStatus::Failed => self.failed += 1,
            RoundStatus::Pending => {}
        }
        self.rounds.push(round);
    }

    /// Consume Bob's pacing token for `index`.
    async fn await_pacing(&mut self, index: u64) -> Result<(), Halt> {
        match self.link.recv().await {
            Ok(message) => {
                check_round(&message, index, "pacing")?;
                match message.payload {
                    Payload::Pacing => Ok(()),
                    other => Err(unexpected("Pacing", &other).into()),
                }
            }
            Err(ProtocolError::MalformedMessage(reason)) => {
                tracing::warn!(round = index, %reason, "unreadable pacing token");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn await_basis(&mut self, index: u64) -> Result<BasisReply, Halt> {
        let message = match self.link.recv().await {
            Ok(message) => message,
            Err(ProtocolError::MalformedMessage(reason)) => {
                tracing::warn!(round = index, %reason, "unreadable basis, treating as no match");
                return Ok(BasisReply::Unreadable);
            }
            Err(err) => return Err(err.into()),
        };
        check_round(&message, index, "basis")?;

        match message.payload {
            Payload::Basis(basis) => Ok(BasisReply::Basis(basis)),
            Payload::Abandon => Ok(BasisReply::Abandoned),
            other => Err(unexpected("Basis", &other).into()),
        }
    }

    /// Returns `None` when the batch frame was unreadable.
    async fn await_basis_batch(
        &mut self,
        base: u64,
        size: u64,
    ) -> Result<Option<Vec<Option<Basis>>>, Halt> {
        let message = match self.link.recv().await {
            Ok(message) => message,
            Err(ProtocolError::MalformedMessage(reason)) => {
                tracing::warn!(base, %reason, "unreadable basis batch, matching nothing");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        check_round(&message, base, "basis batch")?;

        match message.payload {
            Payload::BasisBatch(bases) if bases.len() as u64 == size => Ok(Some(bases)),
            Payload::BasisBatch(bases) => Err(ProtocolError::from(
                entqkd_core::CoreError::BatchLengthMismatch {
                    states: size as usize,
                    bases: bases.len(),
                },
            )
            .into()),
            other => Err(unexpected("BasisBatch", &other).into()),
        }
    }

    async fn await_ack(&mut self, index: u64) -> Result<(), Halt> {
        match self.link.recv().await {
            Ok(message) => {
                check_round(&message, index, "ack")?;
                match message.payload {
                    Payload::Ack => Ok(()),
                    other => Err(unexpected("Ack", &other).into()),
                }
            }
            // The Ack is the only frame still due in this round.
            Err(ProtocolError::MalformedMessage(reason)) => {
                tracing::warn!(round = index, %reason, "unreadable ack");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}
