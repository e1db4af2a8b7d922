//! Nullable infrastructure for deterministic testing.
//!
//! Every external dependency of the identification core (clock, database,
//! challenge delivery, proof checking) is abstracted behind a trait. This crate
//! provides test-friendly implementations that:
//! - return deterministic values
//! - can be controlled programmatically
//! - never touch the filesystem or network
//!
//! Usage: swap real implementations for nullables in tests.

pub mod checker;
pub mod clock;
pub mod delivery;
pub mod store;

pub use checker::NullProofChecker;
pub use clock::NullClock;
pub use delivery::NullDelivery;
pub use store::{NullDatabase, NullTxn};
