//! # entqkd testkit
//!
//! Testing utilities for entqkd.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Sifting vectors**: Fixed states and bases with the rounds that must match
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: Simulated sessions on the reference substrate
//! - **Scripted choices**: A chooser that replays fixed states and bases
//! - **Flaky substrate**: A quantum resource wrapper that fails on a schedule
//!
//! ## Sifting Vectors
//!
//! ```rust
//! use entqkd_testkit::vectors::verify_all_vectors;
//!
//! assert!(verify_all_vectors().is_empty());
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use entqkd_testkit::generators::sift_batch;
//!
//! proptest! {
//!     #[test]
//!     fn sift_is_bounded((states, bases) in sift_batch(64)) {
//!         let matched = entqkd_core::sift(&states, &bases).unwrap();
//!         prop_assert!(matched.len() <= states.len());
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use entqkd_testkit::fixtures::SessionFixture;
//!
//! # async fn example() {
//! let report = SessionFixture::new(16).run(7).await.unwrap();
//! assert!(report.keys_agree());
//! # }
//! ```

pub mod fixtures;
pub mod flaky;
pub mod generators;
pub mod scripted;
pub mod vectors;

pub use fixtures::{init_tracing, SessionFixture};
pub use flaky::FlakyQuantum;
pub use scripted::ScriptedChooser;
pub use vectors::{all_vectors, verify_all_vectors, SiftVector};
