//! Nullable delivery: record challenges instead of sending them.

use ident_types::TenantId;
use ident_verification::{Challenge, ChallengeDelivery, DeliveryError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Records every challenge so tests can read back the code or token a user
/// would have received.
#[derive(Default)]
pub struct NullDelivery {
    sent: Mutex<Vec<Challenge>>,
    failing: AtomicBool,
}

impl NullDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent delivery fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// All challenges "sent" so far.
    pub fn sent(&self) -> Vec<Challenge> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// The most recent code sent to `to` by email or SMS.
    pub fn last_code_for(&self, to: &str) -> Option<String> {
        self.sent().into_iter().rev().find_map(|c| match c {
            Challenge::EmailCode { to: dest, code } | Challenge::SmsCode { to: dest, code }
                if dest == to =>
            {
                Some(code)
            }
            _ => None,
        })
    }

    /// The most recent link token sent to `to`.
    pub fn last_link_token_for(&self, to: &str) -> Option<String> {
        self.sent().into_iter().rev().find_map(|c| match c {
            Challenge::EmailLink { to: dest, token, .. } if dest == to => Some(token),
            _ => None,
        })
    }
}

impl ChallengeDelivery for NullDelivery {
    fn deliver(&self, _tenant: &TenantId, challenge: &Challenge) -> Result<Option<String>, DeliveryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DeliveryError("null delivery configured to fail".into()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(challenge.clone());
        }
        Ok(match challenge {
            Challenge::OAuthRedirect { provider, state, .. } => {
                Some(format!("https://{provider}.oauth.test/authorize?state={state}"))
            }
            Challenge::SamlRedirect { relay_state, .. } => {
                Some(format!("https://idp.saml.test/sso?RelayState={relay_state}"))
            }
            _ => None,
        })
    }
}
