//! Session events.
//!
//! Actors publish typed events on a broadcast channel. Nobody has to listen;
//! a send with no subscribers is not an error.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::actor::Termination;

/// Which peer an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Peer {
    Alice,
    Bob,
}

impl Peer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Peer::Alice => "alice",
            Peer::Bob => "bob",
        }
    }
}

impl std::fmt::Display for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something observable happened in a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionEvent {
    RoundStarted {
        peer: Peer,
        round: u64,
    },
    RoundMatched {
        peer: Peer,
        round: u64,
        /// Key length after this round's bit was appended.
        key_len: usize,
    },
    RoundDiscarded {
        peer: Peer,
        round: u64,
    },
    RoundFailed {
        peer: Peer,
        round: u64,
        reason: String,
    },
    PeerFinished {
        peer: Peer,
        key_len: usize,
        termination: Termination,
    },
}

impl SessionEvent {
    pub fn peer(&self) -> Peer {
        match self {
            SessionEvent::RoundStarted { peer, .. }
            | SessionEvent::RoundMatched { peer, .. }
            | SessionEvent::RoundDiscarded { peer, .. }
            | SessionEvent::RoundFailed { peer, .. }
            | SessionEvent::PeerFinished { peer, .. } => *peer,
        }
    }
}

/// A peer's handle on the event channel.
#[derive(Debug, Clone)]
pub struct EventSink {
    peer: Peer,
    tx: broadcast::Sender<SessionEvent>,
}

impl EventSink {
    pub fn new(peer: Peer, tx: broadcast::Sender<SessionEvent>) -> Self {
        Self { peer, tx }
    }

    pub fn peer(&self) -> Peer {
        self.peer
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }

    pub fn round_started(&self, round: u64) {
        self.emit(SessionEvent::RoundStarted {
            peer: self.peer,
            round,
        });
    }

    pub fn round_matched(&self, round: u64, key_len: usize) {
        self.emit(SessionEvent::RoundMatched {
            peer: self.peer,
            round,
            key_len,
        });
    }

    pub fn round_discarded(&self, round: u64) {
        self.emit(SessionEvent::RoundDiscarded {
            peer: self.peer,
            round,
        });
    }

    pub fn round_failed(&self, round: u64, reason: impl Into<String>) {
        self.emit(SessionEvent::RoundFailed {
            peer: self.peer,
            round,
            reason: reason.into(),
        });
    }

    pub fn finished(&self, key_len: usize, termination: Termination) {
        self.emit(SessionEvent::PeerFinished {
            peer: self.peer,
            key_len,
            termination,
        });
    }
}
