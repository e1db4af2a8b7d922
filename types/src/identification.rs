//! The Identification entity: an addressable, possibly unclaimed credential slot.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{ExternalAccountId, IdentificationId, TenantId, Timestamp, TypesError, UserId, VerificationId};

/// What kind of identifier an identification holds.
///
/// Serialized as its wire name (`email_address`, `oauth_google`, ...).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum IdentificationType {
    EmailAddress,
    PhoneNumber,
    Username,
    Web3Wallet,
    /// An OAuth provider account, e.g. `oauth_google`.
    OAuth(String),
    Saml,
    Passkey,
}

impl IdentificationType {
    /// Types a user keeps a primary pointer for.
    pub fn has_primary_pointer(&self) -> bool {
        matches!(self, Self::EmailAddress | Self::PhoneNumber | Self::Web3Wallet)
    }

    /// Types backed by an external account row.
    pub fn is_external(&self) -> bool {
        matches!(self, Self::OAuth(_) | Self::Saml)
    }

    /// Passkeys are the only identifications without a literal identifier.
    pub fn requires_identifier(&self) -> bool {
        !matches!(self, Self::Passkey)
    }

    pub fn wire_name(&self) -> String {
        match self {
            Self::EmailAddress => "email_address".into(),
            Self::PhoneNumber => "phone_number".into(),
            Self::Username => "username".into(),
            Self::Web3Wallet => "web3_wallet".into(),
            Self::OAuth(provider) => format!("oauth_{provider}"),
            Self::Saml => "saml".into(),
            Self::Passkey => "passkey".into(),
        }
    }
}

impl fmt::Display for IdentificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.wire_name())
    }
}

impl FromStr for IdentificationType {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email_address" => Ok(Self::EmailAddress),
            "phone_number" => Ok(Self::PhoneNumber),
            "username" => Ok(Self::Username),
            "web3_wallet" => Ok(Self::Web3Wallet),
            "saml" => Ok(Self::Saml),
            "passkey" => Ok(Self::Passkey),
            other => match other.strip_prefix("oauth_") {
                Some(provider) if !provider.is_empty() => Ok(Self::OAuth(provider.to_string())),
                _ => Err(TypesError::UnknownIdentificationType(other.to_string())),
            },
        }
    }
}

impl TryFrom<String> for IdentificationType {
    type Error = TypesError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<IdentificationType> for String {
    fn from(t: IdentificationType) -> Self {
        t.wire_name()
    }
}

/// Stored ownership status of an identification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentificationStatus {
    /// No completed proof of ownership.
    NotSet,
    /// Ownership proven.
    Verified,
    /// Held for a pending sign-up or claim.
    Reserved,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identification {
    pub id: IdentificationId,
    pub tenant_id: TenantId,
    pub user_id: Option<UserId>,
    #[serde(rename = "type")]
    pub kind: IdentificationType,
    pub identifier: Option<String>,
    pub canonical_identifier: Option<String>,
    pub verification_id: Option<VerificationId>,
    pub status: IdentificationStatus,
    pub reserved_for_second_factor: bool,
    pub default_second_factor: bool,
    pub external_account_id: Option<ExternalAccountId>,
    /// Identifications this one inherited its verification from.
    pub parent_identifications: Vec<IdentificationId>,
    /// Whether a `reserved` status claims the uniqueness slot.
    pub exclusive_reservation: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Identification {
    pub fn is_verified(&self) -> bool {
        self.status == IdentificationStatus::Verified
    }

    pub fn belongs_to(&self, user: &UserId) -> bool {
        self.user_id.as_ref() == Some(user)
    }

    /// The `(tenant, type, canonical)` key this row claims in the storage
    /// unique index, if any.
    pub fn unique_key(&self) -> Option<(TenantId, IdentificationType, String)> {
        let claims = match self.status {
            IdentificationStatus::Verified => true,
            IdentificationStatus::Reserved => self.exclusive_reservation,
            IdentificationStatus::NotSet => false,
        };
        if !claims {
            return None;
        }
        self.canonical_identifier
            .as_ref()
            .map(|c| (self.tenant_id.clone(), self.kind.clone(), c.clone()))
    }

    pub fn has_parent(&self, parent: &IdentificationId) -> bool {
        self.parent_identifications.iter().any(|p| p == parent)
    }
}
