//! Verification engine: prepare, attempt, and record outcomes.
//!
//! The engine owns every write to a verification row. It never touches the
//! identification side of the link; `IdentityRegistry::attach_verification`
//! does that for both sides at once.

use std::sync::Arc;

use ident_store::VerificationStore;
use ident_types::{
    IdentificationId, Strategy, TenantId, Timestamp, Verification, VerificationId,
    VerificationOutcome,
};

use crate::secret::{generate_code, generate_nonce, generate_token, hash_secret, secret_matches};
use crate::{
    status, Challenge, ChallengeDelivery, Proof, ProofChecker, StrategyLimits, VerificationError,
    VerificationStatus,
};

pub const ERR_CODE_INCORRECT: &str = "form_code_incorrect";
pub const ERR_PASSWORD_INCORRECT: &str = "form_password_incorrect";
pub const ERR_PROOF_INVALID: &str = "verification_proof_invalid";

/// Everything `prepare` needs besides the transaction and the clock.
#[derive(Clone, Debug)]
pub struct PrepareRequest {
    pub tenant_id: TenantId,
    pub strategy: Strategy,
    /// Email address, phone number or wallet address the challenge targets.
    pub destination: Option<String>,
    /// Where redirect and link flows send the user back to.
    pub redirect_url: Option<String>,
    pub limits: StrategyLimits,
}

pub struct VerificationEngine {
    delivery: Arc<dyn ChallengeDelivery>,
    checker: Arc<dyn ProofChecker>,
}

impl VerificationEngine {
    pub fn new(delivery: Arc<dyn ChallengeDelivery>, checker: Arc<dyn ProofChecker>) -> Self {
        Self { delivery, checker }
    }

    fn blank(
        tenant_id: TenantId,
        strategy: Strategy,
        limits: StrategyLimits,
        now: Timestamp,
    ) -> Result<Verification, VerificationError> {
        let id = VerificationId::generate().map_err(|e| VerificationError::Unexpected(e.to_string()))?;
        Ok(Verification {
            id,
            tenant_id,
            strategy,
            identification_id: None,
            attempts: 0,
            expire_at: now.plus_secs(limits.ttl_secs),
            verified_at_client_id: None,
            external_authorization_url: None,
            nonce: None,
            secret_hash: None,
            outcome: VerificationOutcome::Pending,
            last_error: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Create a verification for a preparable strategy and hand its challenge to
    /// delivery.
    ///
    /// A delivery failure returns `Unexpected` and writes nothing.
    pub fn prepare<T: VerificationStore + ?Sized>(
        &self,
        tx: &mut T,
        req: PrepareRequest,
        now: Timestamp,
    ) -> Result<Verification, VerificationError> {
        if !req.strategy.capabilities().preparable {
            return Err(VerificationError::InvalidParameter(format!(
                "strategy `{}` cannot be prepared",
                req.strategy
            )));
        }
        let destination = || {
            req.destination.clone().ok_or_else(|| {
                VerificationError::InvalidParameter(format!(
                    "strategy `{}` needs a destination",
                    req.strategy
                ))
            })
        };

        let mut verification = Self::blank(req.tenant_id.clone(), req.strategy.clone(), req.limits, now)?;
        let challenge = match &req.strategy {
            Strategy::EmailCode => {
                let code = generate_code()?;
                verification.secret_hash = Some(hash_secret(&code));
                Challenge::EmailCode {
                    to: destination()?,
                    code,
                }
            }
            Strategy::PhoneCode => {
                let code = generate_code()?;
                verification.secret_hash = Some(hash_secret(&code));
                Challenge::SmsCode {
                    to: destination()?,
                    code,
                }
            }
            Strategy::EmailLink => {
                let token = generate_token()?;
                verification.secret_hash = Some(hash_secret(&token));
                Challenge::EmailLink {
                    to: destination()?,
                    token,
                    redirect_url: req.redirect_url.clone(),
                }
            }
            Strategy::OAuth(provider) => {
                let state = generate_nonce()?;
                verification.nonce = Some(state.clone());
                Challenge::OAuthRedirect {
                    provider: provider.clone(),
                    state,
                    redirect_url: req.redirect_url.clone(),
                }
            }
            Strategy::Saml => {
                let relay_state = generate_nonce()?;
                verification.nonce = Some(relay_state.clone());
                Challenge::SamlRedirect {
                    relay_state,
                    redirect_url: req.redirect_url.clone(),
                }
            }
            Strategy::Passkey => {
                let challenge = generate_nonce()?;
                verification.nonce = Some(challenge.clone());
                Challenge::Passkey { challenge }
            }
            Strategy::Web3Signature => {
                let nonce = generate_nonce()?;
                verification.nonce = Some(nonce.clone());
                Challenge::Web3Nonce {
                    address: destination()?,
                    nonce,
                }
            }
            Strategy::Password | Strategy::Totp | Strategy::BackupCode | Strategy::Admin => {
                return Err(VerificationError::InvalidParameter(format!(
                    "strategy `{}` cannot be prepared",
                    req.strategy
                )));
            }
        };

        let url = self.delivery.deliver(&req.tenant_id, &challenge).map_err(|e| {
            tracing::warn!(
                tenant = %req.tenant_id,
                strategy = %req.strategy,
                error = %e,
                "challenge delivery failed"
            );
            VerificationError::Unexpected(e.to_string())
        })?;
        verification.external_authorization_url = url;

        tx.put_verification(&verification)?;
        tracing::debug!(
            tenant = %verification.tenant_id,
            verification = %verification.id,
            strategy = %verification.strategy,
            expire_at = %verification.expire_at,
            "verification prepared"
        );
        Ok(verification)
    }

    /// Create a verification for a strategy that is attempted without a prior
    /// challenge (password, TOTP, backup code).
    pub fn start<T: VerificationStore + ?Sized>(
        &self,
        tx: &mut T,
        tenant_id: &TenantId,
        strategy: Strategy,
        limits: StrategyLimits,
        now: Timestamp,
    ) -> Result<Verification, VerificationError> {
        let caps = strategy.capabilities();
        if !caps.attemptable || caps.preparable {
            return Err(VerificationError::InvalidParameter(format!(
                "strategy `{strategy}` must be prepared, not started"
            )));
        }
        let verification = Self::blank(tenant_id.clone(), strategy, limits, now)?;
        tx.put_verification(&verification)?;
        Ok(verification)
    }

    /// Record a verification whose proof was completed elsewhere (admin action,
    /// finished provider callback).
    pub fn issue_verified<T: VerificationStore + ?Sized>(
        &self,
        tx: &mut T,
        tenant_id: &TenantId,
        strategy: Strategy,
        limits: StrategyLimits,
        now: Timestamp,
    ) -> Result<Verification, VerificationError> {
        let mut verification = Self::blank(tenant_id.clone(), strategy, limits, now)?;
        verification.outcome = VerificationOutcome::Verified;
        tx.put_verification(&verification)?;
        tracing::debug!(
            tenant = %verification.tenant_id,
            verification = %verification.id,
            strategy = %verification.strategy,
            "verification issued as verified"
        );
        Ok(verification)
    }

    /// Check a proof against a verification.
    ///
    /// - already verified (or transferable): no-op success, nothing written
    /// - expired: `Expired`, nothing written
    /// - attempts exhausted: `Failed`, the checker is not consulted
    /// - wrong proof: attempt counted and written, recoverable error returned
    /// - checker unavailable: `Unexpected`, nothing written
    pub fn attempt<T: VerificationStore + ?Sized>(
        &self,
        tx: &mut T,
        verification: &Verification,
        proof: &Proof,
        limits: StrategyLimits,
        now: Timestamp,
    ) -> Result<Verification, VerificationError> {
        let strategy = &verification.strategy;
        if !strategy.capabilities().attemptable {
            return Err(VerificationError::InvalidParameter(format!(
                "strategy `{strategy}` cannot be attempted"
            )));
        }
        if !proof.fits(strategy) {
            return Err(VerificationError::InvalidParameter(format!(
                "proof does not match strategy `{strategy}`"
            )));
        }

        match status(verification, limits, now) {
            VerificationStatus::Verified | VerificationStatus::Transferable => {
                return Ok(verification.clone());
            }
            VerificationStatus::Expired => return Err(VerificationError::Expired),
            VerificationStatus::Failed => return Err(VerificationError::Failed),
            VerificationStatus::Unverified => {}
        }

        let matched = self.proof_matches(verification, proof)?;
        let mut updated = verification.clone();
        updated.updated_at = now;

        if matched {
            updated.outcome = VerificationOutcome::Verified;
            updated.last_error = None;
            if let Proof::LinkToken { client_id, .. } = proof {
                updated.verified_at_client_id = client_id.clone();
            }
            tx.put_verification(&updated)?;
            tracing::debug!(
                tenant = %updated.tenant_id,
                verification = %updated.id,
                strategy = %updated.strategy,
                attempts = updated.attempts,
                "verification attempt succeeded"
            );
            return Ok(updated);
        }

        updated.attempts = updated.attempts.saturating_add(1);
        let remaining = limits.max_attempts.saturating_sub(updated.attempts);
        let (err, code) = match strategy {
            Strategy::EmailCode | Strategy::PhoneCode | Strategy::Totp | Strategy::BackupCode => {
                (VerificationError::InvalidCode { remaining }, ERR_CODE_INCORRECT)
            }
            Strategy::Password => (VerificationError::InvalidPassword { remaining }, ERR_PASSWORD_INCORRECT),
            _ => (VerificationError::InvalidProof { remaining }, ERR_PROOF_INVALID),
        };
        updated.last_error = Some(code.to_string());
        tx.put_verification(&updated)?;
        tracing::debug!(
            tenant = %updated.tenant_id,
            verification = %updated.id,
            strategy = %updated.strategy,
            attempts = updated.attempts,
            remaining,
            "verification attempt rejected"
        );
        Err(err)
    }

    fn proof_matches(&self, verification: &Verification, proof: &Proof) -> Result<bool, VerificationError> {
        if verification.strategy.uses_generated_secret() {
            let candidate = match proof {
                Proof::Code(code) => code.as_str(),
                Proof::LinkToken { token, .. } => token.as_str(),
                _ => return Ok(false),
            };
            return Ok(verification
                .secret_hash
                .as_deref()
                .is_some_and(|hash| secret_matches(candidate, hash)));
        }
        // Redirect flows must echo the state we issued before the provider is asked.
        if let Some(state) = proof.echoed_state() {
            if verification.nonce.as_deref() != Some(state) {
                return Ok(false);
            }
        }
        self.checker.check(verification, proof).map_err(|e| {
            tracing::warn!(
                tenant = %verification.tenant_id,
                verification = %verification.id,
                error = %e,
                "proof checker unavailable"
            );
            VerificationError::Unexpected(e.to_string())
        })
    }

    /// Mark an unverified verification as transferable for the sign-in to
    /// sign-up hand-off.
    pub fn mark_transferable<T: VerificationStore + ?Sized>(
        &self,
        tx: &mut T,
        verification: &Verification,
        limits: StrategyLimits,
        now: Timestamp,
    ) -> Result<Verification, VerificationError> {
        let current = status(verification, limits, now);
        if current != VerificationStatus::Unverified {
            return Err(VerificationError::InvalidParameter(format!(
                "cannot hand off a {current:?} verification"
            )));
        }
        let mut updated = verification.clone();
        updated.outcome = VerificationOutcome::Transferable;
        updated.updated_at = now;
        tx.put_verification(&updated)?;
        Ok(updated)
    }

    /// Set the verification side of the identification link.
    pub fn bind<T: VerificationStore + ?Sized>(
        &self,
        tx: &mut T,
        verification: &Verification,
        identification: Option<&IdentificationId>,
        now: Timestamp,
    ) -> Result<Verification, VerificationError> {
        let mut updated = verification.clone();
        updated.identification_id = identification.cloned();
        updated.updated_at = now;
        tx.put_verification(&updated)?;
        Ok(updated)
    }
}
