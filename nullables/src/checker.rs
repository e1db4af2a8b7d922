//! Nullable proof checker: programmable accept list.

use ident_types::Verification;
use ident_verification::{CheckError, Proof, ProofChecker};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Accepts exactly the proofs it was told to accept.
#[derive(Default)]
pub struct NullProofChecker {
    accepted: Mutex<Vec<Proof>>,
    calls: AtomicUsize,
    unavailable: AtomicBool,
}

impl NullProofChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept(&self, proof: Proof) {
        if let Ok(mut accepted) = self.accepted.lock() {
            accepted.push(proof);
        }
    }

    /// Simulate an outage of the backing service.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// How many times the checker was consulted.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ProofChecker for NullProofChecker {
    fn check(&self, _verification: &Verification, proof: &Proof) -> Result<bool, CheckError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CheckError("null checker configured as unavailable".into()));
        }
        let accepted = self
            .accepted
            .lock()
            .map_err(|_| CheckError("accept list poisoned".into()))?;
        Ok(accepted.iter().any(|p| p == proof))
    }
}
