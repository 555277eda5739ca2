//! # entqkd core
//!
//! Pure primitives for entanglement-based QKD: bases, encoding states,
//! correction bits, round records, sifted keys and session statistics.
//!
//! This crate contains no I/O, no timers and no channels. Everything here is
//! plain computation that both peers and the session share.
//!
//! ## Key Types
//!
//! - [`EncodingState`] - Alice's four-valued state choice
//! - [`Basis`] - Standard (Z) or conjugate (X) basis
//! - [`Corrections`] - The two Bell-measurement bits sent to Bob
//! - [`Round`] - One attempted key-bit exchange
//! - [`SiftedKey`] - Append-only key material
//! - [`SessionStats`] - Attempt counts, latencies, fidelity and QBER
//!
//! ## Reconciliation
//!
//! [`matches`] decides a single round; [`sift`] evaluates a backlog.

pub mod choice;
pub mod error;
pub mod key;
pub mod reconcile;
pub mod round;
pub mod stats;
pub mod types;

pub use choice::{Chooser, RngChooser};
pub use error::{CoreError, Result};
pub use key::{KeyFingerprint, SiftedKey};
pub use reconcile::{matches, sift, state_matches};
pub use round::{Round, RoundStatus};
pub use stats::{qber, SessionStats};
pub use types::{Basis, Corrections, EncodeOp, EncodingState, Pauli};
