//! Invariant guard: tenant-wide consistency rules over a user's identifications.
//!
//! Every call site passes the intended [`Mutation`] together with the user's
//! current identifications and receives either `Ok(())` or a [`Violation`]
//! carrying a reason code. Evaluation is pure: nothing is read from or written
//! to storage here.

pub mod canonical;
pub mod rules;

use ident_types::{Identification, IdentificationType, TenantSettings};
use serde::Serialize;
use thiserror::Error;

pub use canonical::{canonicalize, validate};
pub use rules::{
    LinkedChildRule, MinimumVerifiedRule, PrimaryAssignmentRule, SecondFactorDefaultRule,
};

/// Why a mutation was refused.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Violation {
    #[error("primary can only be changed by marking another identification primary")]
    PrimaryUnsetRejected,

    #[error("{kind} identifications have no primary pointer")]
    PrimaryNotSupported { kind: IdentificationType },

    #[error("only a verified identification can be primary")]
    PrimaryRequiresVerified,

    #[error("the last verified {kind} is required")]
    LastRequiredVerified { kind: IdentificationType },

    #[error("at least one verified identification is required")]
    LastVerifiedIdentification,

    #[error("identification is linked as parent of {children} other identification(s)")]
    ParentOfLinkedChildren { children: usize },

    #[error("identification was verified through a parent and cannot be unverified directly")]
    LinkedChildUnverify,

    #[error("only phone numbers can be used as a second factor")]
    SecondFactorRequiresPhone,

    #[error("only a verified phone number can be used as a second factor")]
    SecondFactorRequiresVerified,

    #[error("phone number is not reserved for second factor")]
    SecondFactorNotReserved,

    #[error("verification is not complete")]
    VerificationIncomplete,
}

impl Violation {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::PrimaryUnsetRejected => "primary_unset_not_allowed",
            Self::PrimaryNotSupported { .. } => "primary_not_supported",
            Self::PrimaryRequiresVerified => "primary_requires_verified",
            Self::LastRequiredVerified { .. } => "last_required_identification",
            Self::LastVerifiedIdentification => "last_verified_identification",
            Self::ParentOfLinkedChildren { .. } => "identification_has_linked_children",
            Self::LinkedChildUnverify => "identification_linked_to_parent",
            Self::SecondFactorRequiresPhone => "second_factor_requires_phone",
            Self::SecondFactorRequiresVerified => "second_factor_requires_verified",
            Self::SecondFactorNotReserved => "second_factor_not_reserved",
            Self::VerificationIncomplete => "verification_incomplete",
        }
    }
}

/// A change a caller wants to make to one identification.
#[derive(Clone, Copy, Debug)]
pub enum Mutation<'a> {
    SetPrimary {
        target: &'a Identification,
        primary: bool,
    },
    Unverify(&'a Identification),
    Delete(&'a Identification),
    ReserveSecondFactor(&'a Identification),
    SetDefaultSecondFactor(&'a Identification),
}

impl<'a> Mutation<'a> {
    pub fn target(&self) -> &'a Identification {
        match *self {
            Self::SetPrimary { target, .. } => target,
            Self::Unverify(t)
            | Self::Delete(t)
            | Self::ReserveSecondFactor(t)
            | Self::SetDefaultSecondFactor(t) => t,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::SetPrimary { .. } => "set_primary",
            Self::Unverify(_) => "unverify",
            Self::Delete(_) => "delete",
            Self::ReserveSecondFactor(_) => "reserve_second_factor",
            Self::SetDefaultSecondFactor(_) => "set_default_second_factor",
        }
    }
}

pub struct InvariantGuard;

impl InvariantGuard {
    /// Evaluate every rule that applies to `mutation`.
    ///
    /// `current` holds the user's identifications plus any row that lists the
    /// target as a parent.
    pub fn evaluate(
        settings: &TenantSettings,
        current: &[Identification],
        mutation: Mutation<'_>,
    ) -> Result<(), Violation> {
        let result = match mutation {
            Mutation::SetPrimary { target, primary } => PrimaryAssignmentRule::check(target, primary),
            Mutation::Unverify(target) => {
                if !target.parent_identifications.is_empty() {
                    return Self::reject(mutation, Violation::LinkedChildUnverify);
                }
                LinkedChildRule::check(current, target)
                    .and_then(|()| MinimumVerifiedRule::check(settings, current, target))
            }
            Mutation::Delete(target) => LinkedChildRule::check(current, target)
                .and_then(|()| MinimumVerifiedRule::check(settings, current, target)),
            Mutation::ReserveSecondFactor(target) => SecondFactorDefaultRule::check_reservation(target),
            Mutation::SetDefaultSecondFactor(target) => SecondFactorDefaultRule::check_default(target),
        };
        result.or_else(|v| Self::reject(mutation, v))
    }

    fn reject(mutation: Mutation<'_>, violation: Violation) -> Result<(), Violation> {
        let target = mutation.target();
        tracing::warn!(
            tenant = %target.tenant_id,
            identification = %target.id,
            mutation = mutation.name(),
            reason = violation.reason_code(),
            "invariant guard rejected mutation"
        );
        Err(violation)
    }
}
