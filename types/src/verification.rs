//! The Verification entity: one proof-of-ownership attempt.
//!
//! Status is deliberately absent. It is derived from the stored fields and the
//! current time by `ident_verification::status`.

use serde::{Deserialize, Serialize};

use crate::{IdentificationId, Strategy, TenantId, Timestamp, VerificationId};

/// Terminal (or hand-off) outcome recorded by an attempt.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationOutcome {
    #[default]
    Pending,
    Verified,
    /// Sign-in found no account; the proof may be carried into a sign-up.
    Transferable,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub id: VerificationId,
    pub tenant_id: TenantId,
    pub strategy: Strategy,
    pub identification_id: Option<IdentificationId>,
    pub attempts: u32,
    pub expire_at: Timestamp,
    pub verified_at_client_id: Option<String>,
    pub external_authorization_url: Option<String>,
    pub nonce: Option<String>,
    /// SHA-256 (hex) of the generated code or link token.
    #[serde(default, skip_serializing)]
    pub secret_hash: Option<String>,
    pub outcome: VerificationOutcome,
    pub last_error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
