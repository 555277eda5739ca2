//! # entqkd
//!
//! Entanglement-based quantum key distribution between two peers, Alice and
//! Bob, over a shared entangled-pair source and a pair of classical
//! channels.
//!
//! ## Overview
//!
//! A session runs rounds until both peers hold a sifted key of the target
//! length:
//!
//! - **Teleport**: Alice encodes a random BB84 state and teleports it over a
//!   fresh entangled pair, sending the Bell corrections to Bob
//! - **Measure**: Bob applies the corrections and measures in a random basis
//! - **Sift**: the bit is kept only if the bases agree
//!
//! The orchestrator then checks that both keys have the same length and the
//! same confirmed rounds, and reports QBER, latencies and attempt counts.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use entqkd::{SessionConfig, SessionOrchestrator, SessionSeeds};
//!
//! async fn example() -> entqkd::Result<()> {
//!     let orchestrator = SessionOrchestrator::new(SessionConfig::with_target(64))?;
//!     let report = orchestrator
//!         .run_simulated(SessionSeeds::from_master(1))
//!         .await?;
//!     println!("key {} qber {:?}", report.alice_fingerprint, report.stats.qber);
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `entqkd::core` - Pure types (Round, SiftedKey, SessionStats, sift)
//! - `entqkd::protocol` - Actors, wire messages, substrate traits

pub mod config;
pub mod error;
pub mod report;
pub mod session;

pub use entqkd_core as core;
pub use entqkd_protocol as protocol;

pub use config::SessionConfig;
pub use error::{Result, SessionError};
pub use report::SessionReport;
pub use session::{reconcile, SessionOrchestrator, SessionSeeds, SimulatedSession, StopHandle};

pub use entqkd_core::{
    Basis, Chooser, EncodingState, KeyFingerprint, RngChooser, Round, RoundStatus, SessionStats,
    SiftedKey,
};
pub use entqkd_protocol::{
    ClassicalLink, Fault, MemoryLink, Peer, QuantumResource, SessionEvent, SessionMode,
    Termination,
};
