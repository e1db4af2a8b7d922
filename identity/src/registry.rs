//! Identification lifecycle: create, link, finalize, delete.
//!
//! Every operation takes the caller's transaction and leaves committing to the
//! caller (usually through [`transact`](crate::transact)). Operations reload the
//! identification they are handed, so a stale copy from an earlier step never
//! overwrites newer state.
//!
//! Uniqueness of claimed slots is left to the storage unique index. A write
//! that collides, here or at commit time because a concurrent transaction won,
//! surfaces as [`IdentityError::Conflict`].

use std::sync::Arc;

use ident_store::{StoreError, WriteTxn};
use ident_types::{
    Clock, ExternalAccount, ExternalAccountId, Identification, IdentificationId,
    IdentificationStatus, IdentificationType, IdentityEvent, Strategy, TenantId, TenantSettings,
    User, UserId, Verification, VerificationId,
};
use ident_verification::{
    status, ChallengeDelivery, PrepareRequest, Proof, ProofChecker, StrategyCatalog,
    VerificationEngine, VerificationStatus,
};
use serde::Serialize;

use crate::coordinator::PrimaryIdentifierCoordinator;
use crate::guard::{
    canonicalize, validate, InvariantGuard, Mutation, SecondFactorDefaultRule, Violation,
};
use crate::outbox::emit;
use crate::IdentityError;

/// Input to [`IdentityRegistry::create_identification`].
#[derive(Clone, Debug)]
pub struct NewIdentification {
    pub tenant_id: TenantId,
    pub user_id: Option<UserId>,
    pub kind: IdentificationType,
    pub identifier: Option<String>,
    /// Computed from `identifier` when absent.
    pub canonical_identifier: Option<String>,
    pub status: IdentificationStatus,
}

impl NewIdentification {
    pub fn new(tenant_id: TenantId, kind: IdentificationType, identifier: impl Into<String>) -> Self {
        Self {
            tenant_id,
            user_id: None,
            kind,
            identifier: Some(identifier.into()),
            canonical_identifier: None,
            status: IdentificationStatus::NotSet,
        }
    }

    pub fn for_user(mut self, user: UserId) -> Self {
        self.user_id = Some(user);
        self
    }

    pub fn reserved(mut self) -> Self {
        self.status = IdentificationStatus::Reserved;
        self
    }
}

/// A provider account the caller has already authenticated.
#[derive(Clone, Debug)]
pub struct ExternalAccountLink {
    pub tenant_id: TenantId,
    /// `OAuth(provider)` or `Saml`.
    pub kind: IdentificationType,
    pub provider_user_id: String,
    pub email_address: Option<String>,
    /// Whether the provider vouches for `email_address`.
    pub email_verified: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeletedObject {
    pub object: String,
    pub id: IdentificationId,
    pub deleted: bool,
}

pub struct IdentityRegistry {
    engine: VerificationEngine,
    clock: Arc<dyn Clock>,
}

impl IdentityRegistry {
    pub fn new(
        delivery: Arc<dyn ChallengeDelivery>,
        checker: Arc<dyn ProofChecker>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            engine: VerificationEngine::new(delivery, checker),
            clock,
        }
    }

    /// Insert a new identification.
    ///
    /// The row is written first and duplicates are detected afterwards: a
    /// claimed row with the same canonical form, or a unique index violation on
    /// the write itself, is a `Conflict`. Usernames created for a user are
    /// verified immediately and become the user's username.
    pub fn create_identification<T: WriteTxn>(
        &self,
        tx: &mut T,
        settings: &TenantSettings,
        new: NewIdentification,
    ) -> Result<Identification, IdentityError> {
        validate(&new.kind, new.identifier.as_deref())?;
        let auto_verified = new.kind == IdentificationType::Username && new.user_id.is_some();
        let status = match new.status {
            IdentificationStatus::Verified if !auto_verified => {
                return Err(IdentityError::InvalidParameter(
                    "identifications become verified through a verification".into(),
                ));
            }
            _ if auto_verified => IdentificationStatus::Verified,
            other => other,
        };

        let identifier = new
            .identifier
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty());
        let canonical = new.canonical_identifier.or_else(|| {
            identifier
                .as_deref()
                .map(|raw| canonicalize(&new.kind, raw, &settings.email_canonicalization))
        });
        let now = self.clock.now();
        let ident = Identification {
            id: IdentificationId::generate()?,
            tenant_id: new.tenant_id,
            user_id: new.user_id,
            kind: new.kind,
            identifier,
            canonical_identifier: canonical,
            verification_id: None,
            status,
            reserved_for_second_factor: false,
            default_second_factor: false,
            external_account_id: None,
            parent_identifications: Vec::new(),
            exclusive_reservation: settings.reserved_identifiers_are_unique,
            created_at: now,
            updated_at: now,
        };

        tx.insert_identification(&ident)?;
        Self::detect_claimed_duplicate(tx, &ident)?;
        emit(
            tx,
            IdentityEvent::IdentificationCreated {
                tenant_id: ident.tenant_id.clone(),
                identification_id: ident.id.clone(),
                kind: ident.kind.clone(),
            },
        )?;
        tracing::debug!(
            tenant = %ident.tenant_id,
            identification = %ident.id,
            kind = %ident.kind,
            status = ?ident.status,
            "identification created"
        );
        if ident.is_verified() {
            self.on_newly_verified(tx, &ident)?;
        }
        Ok(ident)
    }

    fn detect_claimed_duplicate<T: WriteTxn>(tx: &T, ident: &Identification) -> Result<(), IdentityError> {
        let Some(canonical) = ident.canonical_identifier.as_deref() else {
            return Ok(());
        };
        let rows = tx.find_by_canonical(&ident.tenant_id, &ident.kind, canonical)?;
        if let Some(holder) = rows.iter().find(|r| r.id != ident.id && r.unique_key().is_some()) {
            tracing::warn!(
                tenant = %ident.tenant_id,
                kind = %ident.kind,
                holder = %holder.id,
                "identifier already claimed"
            );
            return Err(IdentityError::Conflict(format!(
                "{} `{canonical}` is already taken",
                ident.kind
            )));
        }
        Ok(())
    }

    /// Link `verification` and `ident` in both directions.
    ///
    /// The verification side is written first, then the identification is
    /// pointed at it and its status derived from the verification's, and only
    /// then is the verification it replaces deleted.
    pub fn attach_verification<T: WriteTxn>(
        &self,
        tx: &mut T,
        settings: &TenantSettings,
        ident: &Identification,
        verification: &Verification,
    ) -> Result<Identification, IdentityError> {
        if verification.tenant_id != ident.tenant_id {
            return Err(IdentityError::InvalidParameter(
                "verification belongs to another tenant".into(),
            ));
        }
        let current = tx.get_identification(&ident.tenant_id, &ident.id)?;
        let now = self.clock.now();
        let limits = StrategyCatalog::limits(&verification.strategy, settings);
        let verified = status(verification, limits, now) == VerificationStatus::Verified;
        if current.is_verified() && !verified {
            return Err(IdentityError::InvalidParameter(
                "identification is already verified".into(),
            ));
        }

        self.engine.bind(tx, verification, Some(&current.id), now)?;

        let previous = current.verification_id.clone();
        let newly_verified = verified && !current.is_verified();
        let mut updated = current;
        updated.verification_id = Some(verification.id.clone());
        if newly_verified {
            updated.status = IdentificationStatus::Verified;
        }
        updated.updated_at = now;
        tx.update_identification(&updated)?;

        if let Some(stale) = previous.filter(|p| *p != verification.id) {
            Self::delete_verification_if_present(tx, &updated.tenant_id, &stale)?;
        }
        tracing::debug!(
            tenant = %updated.tenant_id,
            identification = %updated.id,
            verification = %verification.id,
            strategy = %verification.strategy,
            "verification attached"
        );
        if newly_verified {
            self.on_newly_verified(tx, &updated)?;
        }
        Ok(updated)
    }

    /// Mark the identification verified once its verification is.
    ///
    /// Fails with `InvariantViolation` while the verification is incomplete.
    /// Calling it again on a verified identification only re-runs primary
    /// assignment, which is idempotent.
    pub fn finalize_verification<T: WriteTxn>(
        &self,
        tx: &mut T,
        settings: &TenantSettings,
        ident: &Identification,
    ) -> Result<Identification, IdentityError> {
        let current = tx.get_identification(&ident.tenant_id, &ident.id)?;
        let verification_id = current
            .verification_id
            .clone()
            .ok_or(Violation::VerificationIncomplete)?;
        let verification = tx.get_verification(&current.tenant_id, &verification_id)?;
        let now = self.clock.now();
        let limits = StrategyCatalog::limits(&verification.strategy, settings);
        if status(&verification, limits, now) != VerificationStatus::Verified {
            tracing::warn!(
                tenant = %current.tenant_id,
                identification = %current.id,
                verification = %verification.id,
                "finalize on incomplete verification"
            );
            return Err(Violation::VerificationIncomplete.into());
        }

        if current.is_verified() {
            PrimaryIdentifierCoordinator::on_verified(tx, &current)?;
            return Ok(current);
        }
        let mut updated = current;
        updated.status = IdentificationStatus::Verified;
        updated.updated_at = now;
        tx.update_identification(&updated)?;
        self.on_newly_verified(tx, &updated)?;
        Ok(updated)
    }

    fn on_newly_verified<T: WriteTxn>(&self, tx: &mut T, ident: &Identification) -> Result<(), IdentityError> {
        emit(
            tx,
            IdentityEvent::IdentificationVerified {
                tenant_id: ident.tenant_id.clone(),
                identification_id: ident.id.clone(),
                kind: ident.kind.clone(),
            },
        )?;
        if let (IdentificationType::EmailAddress, Some(address)) = (&ident.kind, &ident.identifier) {
            emit(
                tx,
                IdentityEvent::EmailAddressVerified {
                    tenant_id: ident.tenant_id.clone(),
                    identification_id: ident.id.clone(),
                    email_address: address.clone(),
                },
            )?;
        }
        tracing::info!(
            tenant = %ident.tenant_id,
            identification = %ident.id,
            kind = %ident.kind,
            "identification verified"
        );
        PrimaryIdentifierCoordinator::on_verified(tx, ident)
    }

    /// Remove an identification with its verification and external account.
    pub fn delete<T: WriteTxn>(
        &self,
        tx: &mut T,
        settings: &TenantSettings,
        user: &UserId,
        ident: &Identification,
    ) -> Result<DeletedObject, IdentityError> {
        let target = Self::load_owned(tx, user, ident)?;
        let current = Self::guard_context(tx, &target)?;
        InvariantGuard::evaluate(settings, &current, Mutation::Delete(&target))?;

        self.remove(tx, &target)?;
        if target.default_second_factor {
            self.promote_default_second_factor(tx, &current, &target)?;
        }
        PrimaryIdentifierCoordinator::on_removed(tx, &target)?;
        tracing::info!(
            tenant = %target.tenant_id,
            identification = %target.id,
            kind = %target.kind,
            "identification deleted"
        );
        Ok(DeletedObject {
            object: target.kind.wire_name(),
            id: target.id,
            deleted: true,
        })
    }

    fn remove<T: WriteTxn>(&self, tx: &mut T, target: &Identification) -> Result<(), IdentityError> {
        tx.delete_identification(&target.tenant_id, &target.id)?;
        if let Some(verification) = &target.verification_id {
            Self::delete_verification_if_present(tx, &target.tenant_id, verification)?;
        }
        if let Some(account) = &target.external_account_id {
            Self::delete_external_account_if_present(tx, &target.tenant_id, account)?;
        }
        emit(
            tx,
            IdentityEvent::IdentificationDeleted {
                tenant_id: target.tenant_id.clone(),
                identification_id: target.id.clone(),
                kind: target.kind.clone(),
            },
        )
    }

    /// Start a verification for `ident` with the strategy named by `strategy_key`
    /// and send its challenge through delivery.
    ///
    /// Only strategies that prove ownership of the identification's type and
    /// issue a challenge qualify; admin verifications go through
    /// [`IdentityRegistry::admin_verify`].
    pub fn prepare_verification<T: WriteTxn>(
        &self,
        tx: &mut T,
        settings: &TenantSettings,
        ident: &Identification,
        strategy_key: &str,
        redirect_url: Option<String>,
    ) -> Result<Verification, IdentityError> {
        let target = tx.get_identification(&ident.tenant_id, &ident.id)?;
        if target.is_verified() {
            return Err(IdentityError::InvalidParameter(
                "identification is already verified".into(),
            ));
        }
        let strategy = StrategyCatalog::get_for(strategy_key, settings, &target.kind)?;
        if !strategy.capabilities().preparable {
            return Err(IdentityError::InvalidParameter(format!(
                "strategy `{strategy}` cannot be prepared"
            )));
        }
        let limits = StrategyCatalog::limits(&strategy, settings);
        let verification = self.engine.prepare(
            tx,
            PrepareRequest {
                tenant_id: target.tenant_id.clone(),
                strategy,
                destination: target.identifier.clone(),
                redirect_url,
                limits,
            },
            self.clock.now(),
        )?;
        self.attach_verification(tx, settings, &target, &verification)?;
        Ok(tx.get_verification(&target.tenant_id, &verification.id)?)
    }

    /// Submit a proof against the identification's current verification,
    /// finalizing on success.
    ///
    /// A wrong proof is returned as a recoverable `Verification` error after
    /// the attempt has been recorded; the caller should commit.
    pub fn attempt_verification<T: WriteTxn>(
        &self,
        tx: &mut T,
        settings: &TenantSettings,
        ident: &Identification,
        proof: &Proof,
    ) -> Result<Identification, IdentityError> {
        let target = tx.get_identification(&ident.tenant_id, &ident.id)?;
        let verification_id = target.verification_id.clone().ok_or_else(|| {
            IdentityError::InvalidParameter("no verification in progress".into())
        })?;
        let verification = tx.get_verification(&target.tenant_id, &verification_id)?;
        if !StrategyCatalog::is_enabled(&verification.strategy, settings) {
            return Err(IdentityError::InvalidParameter(format!(
                "strategy `{}` is not enabled",
                verification.strategy
            )));
        }
        let limits = StrategyCatalog::limits(&verification.strategy, settings);
        let now = self.clock.now();

        let attempted = self.engine.attempt(tx, &verification, proof, limits, now)?;
        if status(&attempted, limits, now) == VerificationStatus::Verified {
            return self.finalize_verification(tx, settings, &target);
        }
        Ok(target)
    }

    /// Hold an unclaimed identification for a pending sign-up.
    pub fn reserve<T: WriteTxn>(
        &self,
        tx: &mut T,
        settings: &TenantSettings,
        ident: &Identification,
    ) -> Result<Identification, IdentityError> {
        let current = tx.get_identification(&ident.tenant_id, &ident.id)?;
        if current.user_id.is_some() {
            return Err(IdentityError::InvalidParameter(
                "identification is already claimed".into(),
            ));
        }
        match current.status {
            IdentificationStatus::Reserved => return Ok(current),
            IdentificationStatus::Verified => {
                return Err(IdentityError::InvalidParameter(
                    "identification is already verified".into(),
                ));
            }
            IdentificationStatus::NotSet => {}
        }
        let mut updated = current;
        updated.status = IdentificationStatus::Reserved;
        updated.exclusive_reservation = settings.reserved_identifiers_are_unique;
        updated.updated_at = self.clock.now();
        tx.update_identification(&updated)?;
        tracing::debug!(
            tenant = %updated.tenant_id,
            identification = %updated.id,
            exclusive = updated.exclusive_reservation,
            "identification reserved"
        );
        Ok(updated)
    }

    /// Hand an unclaimed identification to `user`.
    pub fn claim<T: WriteTxn>(
        &self,
        tx: &mut T,
        settings: &TenantSettings,
        ident: &Identification,
        user: &UserId,
    ) -> Result<Identification, IdentityError> {
        let current = tx.get_identification(&ident.tenant_id, &ident.id)?;
        if let Some(owner) = current.user_id.clone() {
            if &owner == user {
                return Ok(current);
            }
            return Err(IdentityError::Conflict(
                "identification belongs to another user".into(),
            ));
        }
        tx.get_user(&current.tenant_id, user)?;

        let now = self.clock.now();
        let verified_by_proof = match &current.verification_id {
            Some(id) => {
                let verification = tx.get_verification(&current.tenant_id, id)?;
                let limits = StrategyCatalog::limits(&verification.strategy, settings);
                status(&verification, limits, now) == VerificationStatus::Verified
            }
            None => false,
        };
        let was_verified = current.is_verified();
        let mut updated = current;
        updated.user_id = Some(user.clone());
        updated.status = if was_verified
            || verified_by_proof
            || updated.kind == IdentificationType::Username
        {
            IdentificationStatus::Verified
        } else {
            IdentificationStatus::NotSet
        };
        updated.updated_at = now;
        tx.update_identification(&updated)?;
        tracing::debug!(
            tenant = %updated.tenant_id,
            identification = %updated.id,
            user = %user,
            "identification claimed"
        );

        if was_verified {
            PrimaryIdentifierCoordinator::on_verified(tx, &updated)?;
        } else if updated.is_verified() {
            self.on_newly_verified(tx, &updated)?;
        }
        Ok(updated)
    }

    /// Clear the verification of one of `user`'s identifications.
    pub fn unverify<T: WriteTxn>(
        &self,
        tx: &mut T,
        settings: &TenantSettings,
        user: &UserId,
        ident: &Identification,
    ) -> Result<Identification, IdentityError> {
        let target = Self::load_owned(tx, user, ident)?;
        let current = Self::guard_context(tx, &target)?;
        InvariantGuard::evaluate(settings, &current, Mutation::Unverify(&target))?;
        if !target.is_verified() && target.verification_id.is_none() {
            return Ok(target);
        }

        let mut updated = target.clone();
        let stale = updated.verification_id.take();
        updated.status = IdentificationStatus::NotSet;
        updated.reserved_for_second_factor = false;
        updated.default_second_factor = false;
        updated.updated_at = self.clock.now();
        tx.update_identification(&updated)?;
        if let Some(stale) = stale {
            Self::delete_verification_if_present(tx, &updated.tenant_id, &stale)?;
        }
        emit(
            tx,
            IdentityEvent::IdentificationUnverified {
                tenant_id: updated.tenant_id.clone(),
                identification_id: updated.id.clone(),
            },
        )?;
        tracing::info!(
            tenant = %updated.tenant_id,
            identification = %updated.id,
            "identification unverified"
        );

        if target.default_second_factor {
            self.promote_default_second_factor(tx, &current, &target)?;
        }
        PrimaryIdentifierCoordinator::on_removed(tx, &target)?;
        Ok(updated)
    }

    /// Make `ident` the primary of its type. `primary = false` is always
    /// rejected: a primary is replaced, never unset.
    pub fn set_primary<T: WriteTxn>(
        &self,
        tx: &mut T,
        settings: &TenantSettings,
        user: &UserId,
        ident: &Identification,
        primary: bool,
    ) -> Result<User, IdentityError> {
        let target = Self::load_owned(tx, user, ident)?;
        let current = Self::guard_context(tx, &target)?;
        InvariantGuard::evaluate(
            settings,
            &current,
            Mutation::SetPrimary {
                target: &target,
                primary,
            },
        )?;
        PrimaryIdentifierCoordinator::assign(tx, &target)
    }

    /// Reserve a verified phone for second-factor challenges. The first
    /// reservation becomes the default.
    pub fn reserve_for_second_factor<T: WriteTxn>(
        &self,
        tx: &mut T,
        settings: &TenantSettings,
        user: &UserId,
        ident: &Identification,
    ) -> Result<Identification, IdentityError> {
        if !settings.second_factors.phone_code {
            return Err(IdentityError::InvalidParameter(
                "phone code second factor is not enabled".into(),
            ));
        }
        let target = Self::load_owned(tx, user, ident)?;
        let current = Self::guard_context(tx, &target)?;
        InvariantGuard::evaluate(settings, &current, Mutation::ReserveSecondFactor(&target))?;
        if target.reserved_for_second_factor {
            return Ok(target);
        }

        let mut updated = target;
        updated.reserved_for_second_factor = true;
        updated.default_second_factor = SecondFactorDefaultRule::becomes_default(&current, &updated);
        updated.updated_at = self.clock.now();
        tx.update_identification(&updated)?;
        tracing::debug!(
            tenant = %updated.tenant_id,
            identification = %updated.id,
            default = updated.default_second_factor,
            "phone reserved for second factor"
        );
        if updated.default_second_factor {
            emit(
                tx,
                IdentityEvent::DefaultSecondFactorChanged {
                    tenant_id: updated.tenant_id.clone(),
                    user_id: user.clone(),
                    identification_id: Some(updated.id.clone()),
                },
            )?;
        }
        Ok(updated)
    }

    /// Stop using a phone as second factor, handing the default on if it held it.
    pub fn release_second_factor<T: WriteTxn>(
        &self,
        tx: &mut T,
        user: &UserId,
        ident: &Identification,
    ) -> Result<Identification, IdentityError> {
        let target = Self::load_owned(tx, user, ident)?;
        if !target.reserved_for_second_factor {
            return Ok(target);
        }
        let current = Self::guard_context(tx, &target)?;
        let mut updated = target.clone();
        updated.reserved_for_second_factor = false;
        updated.default_second_factor = false;
        updated.updated_at = self.clock.now();
        tx.update_identification(&updated)?;
        if target.default_second_factor {
            self.promote_default_second_factor(tx, &current, &target)?;
        }
        Ok(updated)
    }

    /// Move the default second-factor flag to `ident`.
    pub fn set_default_second_factor<T: WriteTxn>(
        &self,
        tx: &mut T,
        settings: &TenantSettings,
        user: &UserId,
        ident: &Identification,
    ) -> Result<Identification, IdentityError> {
        let target = Self::load_owned(tx, user, ident)?;
        let current = Self::guard_context(tx, &target)?;
        InvariantGuard::evaluate(settings, &current, Mutation::SetDefaultSecondFactor(&target))?;
        if target.default_second_factor {
            return Ok(target);
        }
        let now = self.clock.now();
        for previous in current
            .iter()
            .filter(|i| i.id != target.id && i.default_second_factor)
        {
            let mut cleared = previous.clone();
            cleared.default_second_factor = false;
            cleared.updated_at = now;
            tx.update_identification(&cleared)?;
        }
        let mut updated = target;
        updated.default_second_factor = true;
        updated.updated_at = now;
        tx.update_identification(&updated)?;
        emit(
            tx,
            IdentityEvent::DefaultSecondFactorChanged {
                tenant_id: updated.tenant_id.clone(),
                user_id: user.clone(),
                identification_id: Some(updated.id.clone()),
            },
        )?;
        Ok(updated)
    }

    fn promote_default_second_factor<T: WriteTxn>(
        &self,
        tx: &mut T,
        current: &[Identification],
        leaving: &Identification,
    ) -> Result<(), IdentityError> {
        let Some(user_id) = leaving.user_id.clone() else {
            return Ok(());
        };
        let successor = SecondFactorDefaultRule::successor(current, leaving).cloned();
        if let Some(mut next) = successor.clone() {
            next.default_second_factor = true;
            next.updated_at = self.clock.now();
            tx.update_identification(&next)?;
        }
        emit(
            tx,
            IdentityEvent::DefaultSecondFactorChanged {
                tenant_id: leaving.tenant_id.clone(),
                user_id,
                identification_id: successor.map(|s| s.id),
            },
        )
    }

    /// Connect an authenticated OAuth or SAML account to `user`.
    ///
    /// Creates the provider identification, verified by a provider
    /// verification, and its external account row. A verified provider email
    /// is created or adopted as a child of the provider identification, unless
    /// another user already holds it, in which case it is left unlinked. New
    /// rows are written before stale rows for the same subject are removed.
    pub fn connect_external_account<T: WriteTxn>(
        &self,
        tx: &mut T,
        settings: &TenantSettings,
        user: &UserId,
        link: ExternalAccountLink,
    ) -> Result<Identification, IdentityError> {
        if !link.kind.is_external() {
            return Err(IdentityError::InvalidParameter(format!(
                "{} is not an external account type",
                link.kind
            )));
        }
        let (strategy, provider) = match &link.kind {
            IdentificationType::OAuth(p) => (Strategy::OAuth(p.clone()), p.clone()),
            _ => (Strategy::Saml, "saml".to_string()),
        };
        if !StrategyCatalog::is_enabled(&strategy, settings) {
            return Err(IdentityError::InvalidParameter(format!(
                "strategy `{strategy}` is not enabled"
            )));
        }
        validate(&link.kind, Some(&link.provider_user_id))?;
        let tenant = link.tenant_id.clone();
        tx.get_user(&tenant, user)?;

        let canonical = canonicalize(
            &link.kind,
            &link.provider_user_id,
            &settings.email_canonicalization,
        );
        let existing = tx.find_by_canonical(&tenant, &link.kind, &canonical)?;
        if let Some(connected) = existing.iter().find(|i| i.belongs_to(user) && i.is_verified()) {
            tracing::debug!(
                tenant = %tenant,
                identification = %connected.id,
                "external account already connected"
            );
            return Ok(connected.clone());
        }

        let ident = self.create_identification(
            tx,
            settings,
            NewIdentification {
                tenant_id: tenant.clone(),
                user_id: Some(user.clone()),
                kind: link.kind.clone(),
                identifier: Some(link.provider_user_id.clone()),
                canonical_identifier: Some(canonical.clone()),
                status: IdentificationStatus::NotSet,
            },
        )?;
        let now = self.clock.now();
        let limits = StrategyCatalog::limits(&strategy, settings);
        let verification = self.engine.issue_verified(tx, &tenant, strategy.clone(), limits, now)?;
        let mut ident = self.attach_verification(tx, settings, &ident, &verification)?;

        let account = ExternalAccount {
            id: ExternalAccountId::generate()?,
            tenant_id: tenant.clone(),
            user_id: Some(user.clone()),
            identification_id: ident.id.clone(),
            provider: provider.clone(),
            provider_user_id: link.provider_user_id.clone(),
            email_address: link.email_address.clone(),
            created_at: now,
        };
        tx.insert_external_account(&account)?;
        ident.external_account_id = Some(account.id.clone());
        tx.update_identification(&ident)?;

        for stale in existing
            .iter()
            .filter(|i| !i.is_verified() && (i.user_id.is_none() || i.belongs_to(user)))
        {
            if !tx.children_of(&tenant, &stale.id)?.is_empty() {
                continue;
            }
            self.remove(tx, stale)?;
        }
        for orphan in tx.find_external_accounts(&tenant, &provider, &link.provider_user_id)? {
            if orphan.id == account.id {
                continue;
            }
            match tx.get_identification(&tenant, &orphan.identification_id) {
                Err(StoreError::NotFound(_)) => tx.delete_external_account(&tenant, &orphan.id)?,
                Err(e) => return Err(e.into()),
                Ok(_) => {}
            }
        }

        if link.email_verified {
            if let Some(email) = link.email_address.as_deref() {
                self.link_provider_email(tx, settings, user, &ident, &strategy, email)?;
            }
        }
        tracing::info!(
            tenant = %tenant,
            identification = %ident.id,
            provider = %provider,
            "external account connected"
        );
        Ok(ident)
    }

    fn link_provider_email<T: WriteTxn>(
        &self,
        tx: &mut T,
        settings: &TenantSettings,
        user: &UserId,
        parent: &Identification,
        strategy: &Strategy,
        email: &str,
    ) -> Result<(), IdentityError> {
        if validate(&IdentificationType::EmailAddress, Some(email)).is_err() {
            tracing::warn!(
                tenant = %parent.tenant_id,
                identification = %parent.id,
                "provider reported a malformed email address"
            );
            return Ok(());
        }
        let canonical = canonicalize(
            &IdentificationType::EmailAddress,
            email,
            &settings.email_canonicalization,
        );
        let rows =
            tx.find_by_canonical(&parent.tenant_id, &IdentificationType::EmailAddress, &canonical)?;
        if let Some(holder) = rows
            .iter()
            .find(|i| !i.belongs_to(user) && i.unique_key().is_some())
        {
            tracing::warn!(
                tenant = %parent.tenant_id,
                identification = %parent.id,
                holder = %holder.id,
                "provider email is claimed by another user; not linked"
            );
            return Ok(());
        }
        let own = rows.into_iter().find(|i| i.belongs_to(user));
        let mut child = match own {
            Some(row) if row.is_verified() => return Ok(()),
            Some(row) => row,
            None => self.create_identification(
                tx,
                settings,
                NewIdentification::new(parent.tenant_id.clone(), IdentificationType::EmailAddress, email)
                    .for_user(user.clone()),
            )?,
        };

        let now = self.clock.now();
        child.parent_identifications.push(parent.id.clone());
        child.updated_at = now;
        tx.update_identification(&child)?;
        let limits = StrategyCatalog::limits(strategy, settings);
        let verification = self
            .engine
            .issue_verified(tx, &parent.tenant_id, strategy.clone(), limits, now)?;
        self.attach_verification(tx, settings, &child, &verification)?;
        Ok(())
    }

    /// Verify an identification on an administrator's say-so.
    pub fn admin_verify<T: WriteTxn>(
        &self,
        tx: &mut T,
        settings: &TenantSettings,
        ident: &Identification,
    ) -> Result<Identification, IdentityError> {
        let current = tx.get_identification(&ident.tenant_id, &ident.id)?;
        if current.is_verified() {
            return Ok(current);
        }
        let limits = StrategyCatalog::limits(&Strategy::Admin, settings);
        let verification = self.engine.issue_verified(
            tx,
            &current.tenant_id,
            Strategy::Admin,
            limits,
            self.clock.now(),
        )?;
        let attached = self.attach_verification(tx, settings, &current, &verification)?;
        self.finalize_verification(tx, settings, &attached)
    }

    fn load_owned<T: WriteTxn>(
        tx: &T,
        user: &UserId,
        ident: &Identification,
    ) -> Result<Identification, IdentityError> {
        let current = tx.get_identification(&ident.tenant_id, &ident.id)?;
        if !current.belongs_to(user) {
            return Err(IdentityError::NotFound(format!(
                "identification {} for user {user}",
                ident.id
            )));
        }
        Ok(current)
    }

    /// The owner's identifications plus every row listing `target` as parent.
    fn guard_context<T: WriteTxn>(tx: &T, target: &Identification) -> Result<Vec<Identification>, IdentityError> {
        let mut rows = match &target.user_id {
            Some(user) => tx.identifications_for_user(&target.tenant_id, user)?,
            None => vec![target.clone()],
        };
        for child in tx.children_of(&target.tenant_id, &target.id)? {
            if !rows.iter().any(|r| r.id == child.id) {
                rows.push(child);
            }
        }
        Ok(rows)
    }

    fn delete_verification_if_present<T: WriteTxn>(
        tx: &mut T,
        tenant: &TenantId,
        id: &VerificationId,
    ) -> Result<(), IdentityError> {
        match tx.delete_verification(tenant, id) {
            Ok(()) | Err(StoreError::NotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn delete_external_account_if_present<T: WriteTxn>(
        tx: &mut T,
        tenant: &TenantId,
        id: &ExternalAccountId,
    ) -> Result<(), IdentityError> {
        match tx.delete_external_account(tenant, id) {
            Ok(()) | Err(StoreError::NotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
