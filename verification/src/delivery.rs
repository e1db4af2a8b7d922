//! Out-of-band challenge delivery (email, SMS, redirects).

use ident_types::TenantId;
use thiserror::Error;

/// What a preparable strategy needs sent or built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Challenge {
    EmailCode {
        to: String,
        code: String,
    },
    SmsCode {
        to: String,
        code: String,
    },
    EmailLink {
        to: String,
        token: String,
        redirect_url: Option<String>,
    },
    OAuthRedirect {
        provider: String,
        state: String,
        redirect_url: Option<String>,
    },
    SamlRedirect {
        relay_state: String,
        redirect_url: Option<String>,
    },
    /// A WebAuthn challenge the client signs.
    Passkey {
        challenge: String,
    },
    /// A message the wallet signs.
    Web3Nonce {
        address: String,
        nonce: String,
    },
}

#[derive(Debug, Error)]
#[error("challenge delivery failed: {0}")]
pub struct DeliveryError(pub String);

pub trait ChallengeDelivery: Send + Sync {
    /// Send or build the challenge. Redirect strategies return the external
    /// authorization URL to store on the verification.
    fn deliver(&self, tenant: &TenantId, challenge: &Challenge) -> Result<Option<String>, DeliveryError>;
}
