//! Individual policy rules evaluated by [`InvariantGuard`](super::InvariantGuard).

use ident_types::{Identification, IdentificationType, TenantSettings};

use super::Violation;

/// A primary pointer references only a verified identification of matching
/// type, and is changed only by pointing it somewhere else.
pub struct PrimaryAssignmentRule;

impl PrimaryAssignmentRule {
    pub fn check(target: &Identification, primary: bool) -> Result<(), Violation> {
        if !primary {
            return Err(Violation::PrimaryUnsetRejected);
        }
        if !target.kind.has_primary_pointer() {
            return Err(Violation::PrimaryNotSupported {
                kind: target.kind.clone(),
            });
        }
        if !target.is_verified() {
            return Err(Violation::PrimaryRequiresVerified);
        }
        Ok(())
    }
}

/// Removing a verified identification must not leave the user without a
/// required verified type, or without any verified identification when the
/// tenant mandates one.
pub struct MinimumVerifiedRule;

impl MinimumVerifiedRule {
    pub fn check(
        settings: &TenantSettings,
        current: &[Identification],
        target: &Identification,
    ) -> Result<(), Violation> {
        if !target.is_verified() {
            return Ok(());
        }
        let remaining = || {
            current
                .iter()
                .filter(|i| i.id != target.id && i.is_verified() && i.user_id == target.user_id)
        };

        if settings.required_verified_types().contains(&target.kind)
            && !remaining().any(|i| i.kind == target.kind)
        {
            return Err(Violation::LastRequiredVerified {
                kind: target.kind.clone(),
            });
        }
        if settings.require_verified_identifier && remaining().next().is_none() {
            return Err(Violation::LastVerifiedIdentification);
        }
        Ok(())
    }
}

/// An identification other rows list as their parent cannot be removed or
/// unverified until those children are gone.
pub struct LinkedChildRule;

impl LinkedChildRule {
    pub fn check(current: &[Identification], target: &Identification) -> Result<(), Violation> {
        let children = current.iter().filter(|i| i.has_parent(&target.id)).count();
        if children > 0 {
            return Err(Violation::ParentOfLinkedChildren { children });
        }
        Ok(())
    }
}

/// At most one verified, reserved phone per user carries the default
/// second-factor flag.
pub struct SecondFactorDefaultRule;

impl SecondFactorDefaultRule {
    pub fn check_reservation(target: &Identification) -> Result<(), Violation> {
        if target.kind != IdentificationType::PhoneNumber {
            return Err(Violation::SecondFactorRequiresPhone);
        }
        if !target.is_verified() {
            return Err(Violation::SecondFactorRequiresVerified);
        }
        Ok(())
    }

    pub fn check_default(target: &Identification) -> Result<(), Violation> {
        Self::check_reservation(target)?;
        if !target.reserved_for_second_factor {
            return Err(Violation::SecondFactorNotReserved);
        }
        Ok(())
    }

    /// Whether reserving `target` should also make it the default: only when
    /// no other phone of the user holds the flag.
    pub fn becomes_default(current: &[Identification], target: &Identification) -> bool {
        !current
            .iter()
            .any(|i| i.id != target.id && i.kind == IdentificationType::PhoneNumber && i.default_second_factor)
    }

    /// The phone that should inherit the default after `leaving` gives it up:
    /// the oldest remaining verified reservation.
    pub fn successor<'a>(
        current: &'a [Identification],
        leaving: &Identification,
    ) -> Option<&'a Identification> {
        current
            .iter()
            .filter(|i| {
                i.id != leaving.id
                    && i.kind == IdentificationType::PhoneNumber
                    && i.reserved_for_second_factor
                    && i.is_verified()
            })
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
    }
}
