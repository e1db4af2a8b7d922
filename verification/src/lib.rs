//! Verification strategies and the verification state machine.
//!
//! - [`StrategyCatalog`] resolves a strategy key against tenant settings and
//!   reports the attempt budget and lifetime that apply.
//! - [`VerificationEngine`] prepares verifications (delegating the out-of-band
//!   send or redirect to a [`ChallengeDelivery`]), counts attempts, and records
//!   outcomes.
//! - [`status`] derives a verification's status from its stored fields and the
//!   current time. Status is never stored.
//!
//! Proofs the engine cannot check itself (passwords, TOTP, passkey assertions,
//! provider callbacks, wallet signatures) are judged by a [`ProofChecker`]; only
//! the pass/fail outcome enters the state machine.

pub mod catalog;
pub mod delivery;
pub mod engine;
pub mod error;
pub mod proof;
pub mod secret;
pub mod status;

pub use catalog::{StrategyCatalog, StrategyLimits};
pub use delivery::{Challenge, ChallengeDelivery, DeliveryError};
pub use engine::{PrepareRequest, VerificationEngine};
pub use error::VerificationError;
pub use proof::{CheckError, Proof, ProofChecker};
pub use status::{status, VerificationStatus};
