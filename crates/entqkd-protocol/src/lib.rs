//! # entqkd protocol
//!
//! The two-party QKD protocol: Alice and Bob state machines, the classical
//! wire contract between them, and the traits behind which the quantum
//! resource and classical link live.
//!
//! ## Overview
//!
//! Each round Alice teleports one BB84 state to Bob over a freshly delivered
//! entangled pair. Bob corrects, measures in a random basis, and the two
//! keep the bit only if the bases agree.
//!
//! ## Message Flow
//!
//! ```text
//! Alice                               Bob
//!   |<------- Pacing ------------------|
//!   |  (pair half)          (pair half)|
//!   |-------- Correction ------------->|
//!   |<------- Basis -------------------|
//!   |-------- Match ------------------>|
//!   |<------- Ack ---------------------|
//! ```
//!
//! A pair half and a classical message may arrive in either order; both
//! actors wait on the two with [`DualWait`].
//!
//! ## Substrate
//!
//! [`ClassicalLink`] and [`QuantumResource`] are the seams to the outside.
//! [`link::memory::MemoryLink`] and [`sim`] provide an in-memory reference
//! substrate. Their delays are simulated nanoseconds, run on tokio's clock
//! through [`clock`].

pub mod actor;
pub mod alice;
pub mod bob;
pub mod clock;
pub mod error;
pub mod events;
pub mod link;
pub mod messages;
pub mod quantum;
pub mod select;
pub mod sim;

pub use actor::{ActorContext, PeerReport, SessionMode, Termination};
pub use alice::AliceActor;
pub use bob::BobActor;
pub use error::{ProtocolError, QuantumError, Result};
pub use events::{EventSink, Peer, SessionEvent};
pub use link::memory::{Fault, MemoryLink};
pub use link::ClassicalLink;
pub use messages::{ClassicalMessage, Payload, PROTOCOL_VERSION};
pub use quantum::{Entanglement, Measurement, QuantumResource};
pub use select::{Arrival, DualWait, WaitProgress};
pub use sim::{PairSource, SimConfig, SimNode, SimTiming};
