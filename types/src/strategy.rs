//! Verification strategy tags.
//!
//! The set of strategies is closed. Each variant statically declares which
//! capabilities it has: **preparable** strategies produce a verification plus an
//! out-of-band challenge (code, link, redirect, WebAuthn challenge), and
//! **attemptable** strategies validate a client-supplied proof.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{IdentificationType, TypesError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    pub preparable: bool,
    pub attemptable: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Strategy {
    Password,
    EmailCode,
    PhoneCode,
    EmailLink,
    OAuth(String),
    Saml,
    Passkey,
    Totp,
    BackupCode,
    Web3Signature,
    /// Set directly by an administrator; never prepared or attempted.
    Admin,
}

impl Strategy {
    pub fn capabilities(&self) -> Capabilities {
        match self {
            Self::EmailCode
            | Self::PhoneCode
            | Self::EmailLink
            | Self::OAuth(_)
            | Self::Saml
            | Self::Passkey
            | Self::Web3Signature => Capabilities {
                preparable: true,
                attemptable: true,
            },
            Self::Password | Self::Totp | Self::BackupCode => Capabilities {
                preparable: false,
                attemptable: true,
            },
            Self::Admin => Capabilities {
                preparable: false,
                attemptable: false,
            },
        }
    }

    /// Whether this strategy can prove ownership of an identification of `kind`.
    pub fn verifies(&self, kind: &IdentificationType) -> bool {
        match (self, kind) {
            (Self::EmailCode | Self::EmailLink, IdentificationType::EmailAddress) => true,
            (Self::PhoneCode, IdentificationType::PhoneNumber) => true,
            (Self::OAuth(p), IdentificationType::OAuth(q)) => p == q,
            (Self::Saml, IdentificationType::Saml) => true,
            (Self::Passkey, IdentificationType::Passkey) => true,
            (Self::Web3Signature, IdentificationType::Web3Wallet) => true,
            // Account secrets prove access to the account, not ownership of an identifier.
            (Self::Password | Self::Totp | Self::BackupCode, _) => false,
            (Self::Admin, _) => true,
            _ => false,
        }
    }

    /// Strategies whose proof is a one-time secret the engine generated itself.
    pub fn uses_generated_secret(&self) -> bool {
        matches!(self, Self::EmailCode | Self::PhoneCode | Self::EmailLink)
    }

    pub fn key(&self) -> String {
        match self {
            Self::Password => "password".into(),
            Self::EmailCode => "email_code".into(),
            Self::PhoneCode => "phone_code".into(),
            Self::EmailLink => "email_link".into(),
            Self::OAuth(provider) => format!("oauth_{provider}"),
            Self::Saml => "saml".into(),
            Self::Passkey => "passkey".into(),
            Self::Totp => "totp".into(),
            Self::BackupCode => "backup_code".into(),
            Self::Web3Signature => "web3_signature".into(),
            Self::Admin => "admin".into(),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl FromStr for Strategy {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "password" => Ok(Self::Password),
            "email_code" => Ok(Self::EmailCode),
            "phone_code" => Ok(Self::PhoneCode),
            "email_link" => Ok(Self::EmailLink),
            "saml" => Ok(Self::Saml),
            "passkey" => Ok(Self::Passkey),
            "totp" => Ok(Self::Totp),
            "backup_code" => Ok(Self::BackupCode),
            "web3_signature" => Ok(Self::Web3Signature),
            "admin" => Ok(Self::Admin),
            other => match other.strip_prefix("oauth_") {
                Some(provider) if !provider.is_empty() => Ok(Self::OAuth(provider.to_string())),
                _ => Err(TypesError::UnknownStrategy(other.to_string())),
            },
        }
    }
}

impl TryFrom<String> for Strategy {
    type Error = TypesError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Strategy> for String {
    fn from(s: Strategy) -> Self {
        s.key()
    }
}
