//! Plumbing shared by the two peer actors.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;

use entqkd_core::{Round, SiftedKey};

use crate::clock;
use crate::error::{ProtocolError, QuantumError};
use crate::events::{EventSink, Peer};
use crate::link::ClassicalLink;
use crate::messages::{ClassicalMessage, Payload};

/// How rounds are grouped for sifting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionMode {
    /// Bases are exchanged and sifted once per round.
    Interactive,
    /// Bases are exchanged once per batch of
    /// `ceil(remaining * oversubscription)` rounds.
    Batched { oversubscription: f64 },
}

impl Default for SessionMode {
    fn default() -> Self {
        SessionMode::Interactive
    }
}

impl SessionMode {
    /// Default oversubscription for batched sessions.
    pub const DEFAULT_OVERSUBSCRIPTION: f64 = 3.0;

    pub fn batched() -> Self {
        SessionMode::Batched {
            oversubscription: Self::DEFAULT_OVERSUBSCRIPTION,
        }
    }

    /// Rounds in the next batch, given the bits still missing and the rounds
    /// left in the budget.
    pub fn batch_size(&self, remaining: usize, budget_left: u64) -> u64 {
        let wanted = match self {
            SessionMode::Interactive => 1,
            SessionMode::Batched { oversubscription } => {
                (remaining as f64 * oversubscription).ceil() as u64
            }
        };
        wanted
            .min(budget_left)
            .min(crate::messages::MAX_BATCH_ENTRIES as u64)
    }
}

/// Why a peer stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// The key reached the target length.
    TargetReached,
    /// The classical link or the pair source went away.
    ConnectionClosed,
    /// The stop signal was observed.
    Stopped,
    /// The round budget ran out first.
    RoundBudgetExhausted,
    /// A protocol violation (wrong round, unexpected message).
    Faulted(String),
}

impl Termination {
    pub fn is_fault(&self) -> bool {
        matches!(self, Termination::Faulted(_))
    }
}

/// What one peer hands back when it stops.
#[derive(Debug, Clone)]
pub struct PeerReport {
    pub peer: Peer,
    pub key: SiftedKey,
    /// This peer's view of every round it finished.
    pub rounds: Vec<Round>,
    /// Rounds started, including one cut short by termination.
    pub attempts: u64,
    pub failed: u64,
    pub termination: Termination,
}

/// Settings and channels handed to each actor.
#[derive(Debug, Clone)]
pub struct ActorContext {
    pub target: usize,
    pub max_rounds: u64,
    pub mode: SessionMode,
    /// Timestamps in round records are simulated offsets from here.
    pub epoch: Instant,
    pub events: EventSink,
    pub stop: watch::Receiver<bool>,
}

impl ActorContext {
    pub(crate) fn offset(&self, at: Instant) -> Duration {
        clock::between(self.epoch, at)
    }

    pub(crate) fn now(&self) -> Duration {
        self.offset(Instant::now())
    }

    /// Called between rounds and after each round's quantum wait.
    pub(crate) fn checkpoint(&self) -> Result<(), Halt> {
        if *self.stop.borrow() {
            Err(Halt::Stopped)
        } else {
            Ok(())
        }
    }
}

/// Reason an actor's loop ends early.
#[derive(Debug)]
pub(crate) enum Halt {
    Stopped,
    Error(ProtocolError),
}

impl From<ProtocolError> for Halt {
    fn from(err: ProtocolError) -> Self {
        Halt::Error(err)
    }
}

impl From<QuantumError> for Halt {
    fn from(err: QuantumError) -> Self {
        Halt::Error(err.into())
    }
}

impl Halt {
    pub(crate) fn termination(self) -> Termination {
        match self {
            Halt::Stopped => Termination::Stopped,
            Halt::Error(ProtocolError::ConnectionClosed)
            | Halt::Error(ProtocolError::Quantum(QuantumError::SourceClosed)) => {
                Termination::ConnectionClosed
            }
            Halt::Error(err) => Termination::Faulted(err.to_string()),
        }
    }
}

/// Fail unless `message` belongs to round `expected`.
pub(crate) fn check_round(
    message: &ClassicalMessage,
    expected: u64,
    context: &'static str,
) -> Result<(), ProtocolError> {
    if message.round == expected {
        Ok(())
    } else {
        Err(ProtocolError::RoundMismatch {
            expected,
            got: message.round,
            context,
        })
    }
}

pub(crate) fn unexpected(expected: &'static str, got: &Payload) -> ProtocolError {
    ProtocolError::UnexpectedMessage {
        expected,
        got: got.kind(),
    }
}

pub(crate) async fn send<L: ClassicalLink + ?Sized>(
    link: &L,
    round: u64,
    payload: Payload,
) -> Result<(), ProtocolError> {
    link.send(ClassicalMessage::new(round, payload)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_size() {
        let mode = SessionMode::batched();
        assert_eq!(mode.batch_size(4, 1000), 12);
        assert_eq!(mode.batch_size(4, 5), 5);
        assert_eq!(SessionMode::Interactive.batch_size(4, 1000), 1);

        let exact = SessionMode::Batched {
            oversubscription: 1.5,
        };
        assert_eq!(exact.batch_size(3, 1000), 5);
    }

    #[test]
    fn test_halt_termination() {
        assert_eq!(
            Halt::from(ProtocolError::ConnectionClosed).termination(),
            Termination::ConnectionClosed
        );
        assert_eq!(
            Halt::from(QuantumError::SourceClosed).termination(),
            Termination::ConnectionClosed
        );
        assert!(Halt::from(ProtocolError::RoundMismatch {
            expected: 1,
            got: 2,
            context: "pair"
        })
        .termination()
        .is_fault());
        assert_eq!(Halt::Stopped.termination(), Termination::Stopped);
    }

    #[test]
    fn test_check_round() {
        let msg = ClassicalMessage::new(4, Payload::Ack);
        assert!(check_round(&msg, 4, "ack").is_ok());
        assert!(matches!(
            check_round(&msg, 5, "ack"),
            Err(ProtocolError::RoundMismatch {
                expected: 5,
                got: 4,
                ..
            })
        ));
    }

    proptest::proptest! {
        #[test]
        fn prop_batch_size_covers_the_remainder_within_budget(
            remaining in 1usize..512,
            budget_left in 0u64..4096,
            oversubscription in 1.0f64..8.0,
        ) {
            let size = SessionMode::Batched { oversubscription }.batch_size(remaining, budget_left);
            proptest::prop_assert!(size <= budget_left);
            proptest::prop_assert!(size <= crate::messages::MAX_BATCH_ENTRIES as u64);
            if budget_left >= remaining as u64 && remaining <= crate::messages::MAX_BATCH_ENTRIES {
                proptest::prop_assert!(size >= remaining as u64);
            }
        }
    }
}
