//! The slice of the User record this core reads and writes.

use serde::{Deserialize, Serialize};

use crate::{IdentificationId, IdentificationType, TenantId, UserId};

/// Primary pointers are weak lookups into Identification, never ownership.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub tenant_id: TenantId,
    pub primary_email_address_id: Option<IdentificationId>,
    pub primary_phone_number_id: Option<IdentificationId>,
    pub primary_web3_wallet_id: Option<IdentificationId>,
    pub username_id: Option<IdentificationId>,
}

impl User {
    pub fn new(id: UserId, tenant_id: TenantId) -> Self {
        Self {
            id,
            tenant_id,
            primary_email_address_id: None,
            primary_phone_number_id: None,
            primary_web3_wallet_id: None,
            username_id: None,
        }
    }

    /// The primary pointer slot for `kind`, if the type has one.
    pub fn primary_for(&self, kind: &IdentificationType) -> Option<&IdentificationId> {
        match kind {
            IdentificationType::EmailAddress => self.primary_email_address_id.as_ref(),
            IdentificationType::PhoneNumber => self.primary_phone_number_id.as_ref(),
            IdentificationType::Web3Wallet => self.primary_web3_wallet_id.as_ref(),
            _ => None,
        }
    }

    /// Set the primary pointer for `kind`. Returns `false` when the type has no pointer.
    pub fn set_primary_for(&mut self, kind: &IdentificationType, id: Option<IdentificationId>) -> bool {
        match kind {
            IdentificationType::EmailAddress => self.primary_email_address_id = id,
            IdentificationType::PhoneNumber => self.primary_phone_number_id = id,
            IdentificationType::Web3Wallet => self.primary_web3_wallet_id = id,
            _ => return false,
        }
        true
    }

    /// Every pointer the user holds, paired with the type it must reference.
    pub fn pointers(&self) -> Vec<(IdentificationType, &IdentificationId)> {
        let mut out = Vec::new();
        if let Some(id) = &self.primary_email_address_id {
            out.push((IdentificationType::EmailAddress, id));
        }
        if let Some(id) = &self.primary_phone_number_id {
            out.push((IdentificationType::PhoneNumber, id));
        }
        if let Some(id) = &self.primary_web3_wallet_id {
            out.push((IdentificationType::Web3Wallet, id));
        }
        if let Some(id) = &self.username_id {
            out.push((IdentificationType::Username, id));
        }
        out
    }
}
