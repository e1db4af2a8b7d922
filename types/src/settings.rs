//! Per-tenant settings consumed by the identification core.
//!
//! Loaded from TOML via [`TenantSettings::from_toml_str`] or built
//! programmatically (e.g. for tests). Every field has a serde default so a
//! tenant document only needs to name what differs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{IdentificationType, TypesError};

/// Settings for one user attribute (email address, phone number, ...).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub required: bool,
    /// Must be verified before sign-up completes.
    #[serde(default)]
    pub verify_at_sign_up: bool,
    #[serde(default)]
    pub used_for_first_factor: bool,
    #[serde(default)]
    pub used_for_second_factor: bool,
    /// Strategy keys allowed to verify this attribute.
    #[serde(default)]
    pub verifications: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes {
    #[serde(default)]
    pub email_address: AttributeSettings,
    #[serde(default)]
    pub phone_number: AttributeSettings,
    #[serde(default)]
    pub username: AttributeSettings,
    #[serde(default)]
    pub web3_wallet: AttributeSettings,
    #[serde(default)]
    pub passkey: AttributeSettings,
    #[serde(default)]
    pub password: AttributeSettings,
}

impl Attributes {
    /// Identifier attributes with the identification type they store.
    pub fn identifier_attributes(&self) -> [(IdentificationType, &AttributeSettings); 5] {
        [
            (IdentificationType::EmailAddress, &self.email_address),
            (IdentificationType::PhoneNumber, &self.phone_number),
            (IdentificationType::Username, &self.username),
            (IdentificationType::Web3Wallet, &self.web3_wallet),
            (IdentificationType::Passkey, &self.passkey),
        ]
    }

    pub fn for_type(&self, kind: &IdentificationType) -> Option<&AttributeSettings> {
        match kind {
            IdentificationType::EmailAddress => Some(&self.email_address),
            IdentificationType::PhoneNumber => Some(&self.phone_number),
            IdentificationType::Username => Some(&self.username),
            IdentificationType::Web3Wallet => Some(&self.web3_wallet),
            IdentificationType::Passkey => Some(&self.passkey),
            IdentificationType::OAuth(_) | IdentificationType::Saml => None,
        }
    }
}

/// Second-factor strategies enabled for the tenant.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondFactorSettings {
    #[serde(default)]
    pub totp: bool,
    #[serde(default)]
    pub backup_code: bool,
    #[serde(default)]
    pub phone_code: bool,
}

/// Email domains whose local parts are normalized before uniqueness checks.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailCanonicalization {
    /// Domains where `j.doe@` and `jdoe@` are the same mailbox.
    #[serde(default)]
    pub strip_dots_domains: Vec<String>,
    /// Domains where `jdoe+tag@` is delivered to `jdoe@`.
    #[serde(default)]
    pub strip_plus_domains: Vec<String>,
}

/// Tenant override of a strategy's attempt budget or lifetime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyLimitsOverride {
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantSettings {
    /// Enabled OAuth providers (`google`, `github`, ...).
    #[serde(default)]
    pub oauth_providers: Vec<String>,

    #[serde(default)]
    pub saml_enabled: bool,

    /// Every user must keep at least one verified identification.
    #[serde(default)]
    pub require_verified_identifier: bool,

    /// Reserved identifications claim the uniqueness slot like verified ones.
    #[serde(default = "default_true")]
    pub reserved_identifiers_are_unique: bool,

    #[serde(default)]
    pub attributes: Attributes,

    #[serde(default)]
    pub second_factors: SecondFactorSettings,

    #[serde(default)]
    pub email_canonicalization: EmailCanonicalization,

    /// Keyed by strategy key (`email_code`, `oauth_google`, ...).
    #[serde(default)]
    pub strategy_limits: BTreeMap<String, StrategyLimitsOverride>,
}

fn default_true() -> bool {
    true
}

impl Default for TenantSettings {
    fn default() -> Self {
        Self {
            attributes: Attributes::default(),
            oauth_providers: Vec::new(),
            saml_enabled: false,
            second_factors: SecondFactorSettings::default(),
            require_verified_identifier: false,
            reserved_identifiers_are_unique: default_true(),
            email_canonicalization: EmailCanonicalization::default(),
            strategy_limits: BTreeMap::new(),
        }
    }
}

impl TenantSettings {
    /// Parse settings from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, TypesError> {
        toml::from_str(s).map_err(|e| TypesError::Config(e.to_string()))
    }

    /// Load settings from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, TypesError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| TypesError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Serialize the settings to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, TypesError> {
        toml::to_string_pretty(self).map_err(|e| TypesError::Config(e.to_string()))
    }

    /// Types that must keep a verified identification: every attribute marked
    /// both required and verify-at-sign-up.
    ///
    /// Applies to all users, including those who signed up before the rule
    /// was configured.
    pub fn required_verified_types(&self) -> Vec<IdentificationType> {
        self.attributes
            .identifier_attributes()
            .into_iter()
            .filter(|(_, a)| a.enabled && a.required && a.verify_at_sign_up)
            .map(|(kind, _)| kind)
            .collect()
    }

    /// Settings suitable for local development: email + phone codes, usernames,
    /// passwords, and one OAuth provider.
    pub fn dev_default() -> Self {
        let code_attr = |strategies: &[&str]| AttributeSettings {
            enabled: true,
            required: false,
            verify_at_sign_up: true,
            used_for_first_factor: true,
            used_for_second_factor: false,
            verifications: strategies.iter().map(|s| s.to_string()).collect(),
        };
        Self {
            attributes: Attributes {
                email_address: code_attr(&["email_code", "email_link"]),
                phone_number: AttributeSettings {
                    used_for_second_factor: true,
                    ..code_attr(&["phone_code"])
                },
                username: AttributeSettings {
                    enabled: true,
                    used_for_first_factor: true,
                    ..AttributeSettings::default()
                },
                web3_wallet: code_attr(&["web3_signature"]),
                passkey: AttributeSettings {
                    enabled: true,
                    used_for_first_factor: true,
                    verifications: vec!["passkey".into()],
                    ..AttributeSettings::default()
                },
                password: AttributeSettings {
                    enabled: true,
                    used_for_first_factor: true,
                    ..AttributeSettings::default()
                },
            },
            oauth_providers: vec!["google".into()],
            second_factors: SecondFactorSettings {
                totp: true,
                backup_code: true,
                phone_code: true,
            },
            ..Self::default()
        }
    }
}
