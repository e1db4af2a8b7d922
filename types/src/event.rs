//! Identity-changed notifications written to the transactional outbox.
//!
//! Delivery to subscribers happens outside this core, at least once.

use serde::{Deserialize, Serialize};

use crate::{IdentificationId, IdentificationType, TenantId, UserId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum IdentityEvent {
    IdentificationCreated {
        tenant_id: TenantId,
        identification_id: IdentificationId,
        kind: IdentificationType,
    },
    IdentificationVerified {
        tenant_id: TenantId,
        identification_id: IdentificationId,
        kind: IdentificationType,
    },
    IdentificationUnverified {
        tenant_id: TenantId,
        identification_id: IdentificationId,
    },
    IdentificationDeleted {
        tenant_id: TenantId,
        identification_id: IdentificationId,
        kind: IdentificationType,
    },
    PrimaryChanged {
        tenant_id: TenantId,
        user_id: UserId,
        kind: IdentificationType,
        identification_id: Option<IdentificationId>,
    },
    /// Signal for invitation and suggestion matching.
    EmailAddressVerified {
        tenant_id: TenantId,
        identification_id: IdentificationId,
        email_address: String,
    },
    DefaultSecondFactorChanged {
        tenant_id: TenantId,
        user_id: UserId,
        identification_id: Option<IdentificationId>,
    },
}

impl IdentityEvent {
    pub fn tenant_id(&self) -> &TenantId {
        match self {
            Self::IdentificationCreated { tenant_id, .. }
            | Self::IdentificationVerified { tenant_id, .. }
            | Self::IdentificationUnverified { tenant_id, .. }
            | Self::IdentificationDeleted { tenant_id, .. }
            | Self::PrimaryChanged { tenant_id, .. }
            | Self::EmailAddressVerified { tenant_id, .. }
            | Self::DefaultSecondFactorChanged { tenant_id, .. } => tenant_id,
        }
    }

    /// Dotted event name used by subscribers.
    pub fn name(&self) -> &'static str {
        match self {
            Self::IdentificationCreated { .. } => "identification.created",
            Self::IdentificationVerified { .. } => "identification.verified",
            Self::IdentificationUnverified { .. } => "identification.unverified",
            Self::IdentificationDeleted { .. } => "identification.deleted",
            Self::PrimaryChanged { .. } => "user.primary_changed",
            Self::EmailAddressVerified { .. } => "email_address.verified",
            Self::DefaultSecondFactorChanged { .. } => "second_factor.default_changed",
        }
    }
}
