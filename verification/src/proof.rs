//! Client-supplied proofs and the external checker for proofs the engine
//! cannot judge itself.

use ident_types::{Strategy, Verification};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Proof {
    /// Email or SMS one-time code.
    Code(String),
    LinkToken {
        token: String,
        client_id: Option<String>,
    },
    Password(String),
    Totp(String),
    BackupCode(String),
    OAuthCallback {
        state: String,
        authorization_code: String,
    },
    SamlResponse {
        relay_state: String,
        response: String,
    },
    PasskeyAssertion(String),
    Web3Signature(String),
}

impl Proof {
    /// Whether this proof has the shape `strategy` expects.
    pub fn fits(&self, strategy: &Strategy) -> bool {
        matches!(
            (self, strategy),
            (Self::Code(_), Strategy::EmailCode | Strategy::PhoneCode)
                | (Self::LinkToken { .. }, Strategy::EmailLink)
                | (Self::Password(_), Strategy::Password)
                | (Self::Totp(_), Strategy::Totp)
                | (Self::BackupCode(_), Strategy::BackupCode)
                | (Self::OAuthCallback { .. }, Strategy::OAuth(_))
                | (Self::SamlResponse { .. }, Strategy::Saml)
                | (Self::PasskeyAssertion(_), Strategy::Passkey)
                | (Self::Web3Signature(_), Strategy::Web3Signature)
        )
    }

    /// The state/relay value echoed back by redirect flows.
    pub fn echoed_state(&self) -> Option<&str> {
        match self {
            Self::OAuthCallback { state, .. } => Some(state),
            Self::SamlResponse { relay_state, .. } => Some(relay_state),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
#[error("proof check unavailable: {0}")]
pub struct CheckError(pub String);

/// Judges proofs backed by secrets or ceremonies outside this core: password
/// hashes, TOTP secrets, backup codes, WebAuthn assertions, provider token
/// exchanges, wallet signatures.
pub trait ProofChecker: Send + Sync {
    /// `Ok(false)` is a wrong proof; `Err` is an infrastructure failure.
    fn check(&self, verification: &Verification, proof: &Proof) -> Result<bool, CheckError>;
}
