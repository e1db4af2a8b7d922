//! Strategy catalog: key lookup, tenant enablement, and per-strategy limits.

use ident_types::{IdentificationType, Strategy, TenantSettings};

use crate::VerificationError;

/// Attempt budget and lifetime of a verification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StrategyLimits {
    pub max_attempts: u32,
    pub ttl_secs: u64,
}

impl StrategyLimits {
    pub const fn new(max_attempts: u32, ttl_secs: u64) -> Self {
        Self {
            max_attempts,
            ttl_secs,
        }
    }

    /// Built-in limits before tenant overrides.
    pub fn defaults_for(strategy: &Strategy) -> Self {
        match strategy {
            Strategy::EmailCode | Strategy::PhoneCode | Strategy::EmailLink => Self::new(3, 600),
            Strategy::Password => Self::new(100, 600),
            Strategy::OAuth(_) | Strategy::Saml | Strategy::Admin => Self::new(1, 600),
            Strategy::Passkey => Self::new(3, 300),
            Strategy::Totp | Strategy::BackupCode => Self::new(5, 300),
            Strategy::Web3Signature => Self::new(3, 600),
        }
    }
}

/// Resolves strategy keys against a tenant's settings.
pub struct StrategyCatalog;

impl StrategyCatalog {
    /// Look up a strategy by key. Unknown keys and strategies the tenant has not
    /// enabled are rejected before any verification is touched.
    pub fn get(key: &str, settings: &TenantSettings) -> Result<Strategy, VerificationError> {
        let strategy: Strategy = key
            .parse()
            .map_err(|_| VerificationError::InvalidParameter(format!("unknown strategy `{key}`")))?;
        if !Self::is_enabled(&strategy, settings) {
            return Err(VerificationError::InvalidParameter(format!(
                "strategy `{key}` is not enabled"
            )));
        }
        Ok(strategy)
    }

    /// Like [`StrategyCatalog::get`], additionally requiring that the strategy
    /// can verify identifications of `kind`.
    pub fn get_for(
        key: &str,
        settings: &TenantSettings,
        kind: &IdentificationType,
    ) -> Result<Strategy, VerificationError> {
        let strategy = Self::get(key, settings)?;
        if !strategy.verifies(kind) {
            return Err(VerificationError::InvalidParameter(format!(
                "strategy `{key}` cannot verify {kind}"
            )));
        }
        Ok(strategy)
    }

    pub fn is_enabled(strategy: &Strategy, settings: &TenantSettings) -> bool {
        let attrs = &settings.attributes;
        let lists = |verifications: &[String]| verifications.iter().any(|k| *k == strategy.key());
        match strategy {
            Strategy::Password => attrs.password.enabled,
            Strategy::EmailCode | Strategy::EmailLink => {
                attrs.email_address.enabled && lists(&attrs.email_address.verifications)
            }
            Strategy::PhoneCode => {
                (attrs.phone_number.enabled && lists(&attrs.phone_number.verifications))
                    || settings.second_factors.phone_code
            }
            Strategy::OAuth(provider) => settings.oauth_providers.iter().any(|p| p == provider),
            Strategy::Saml => settings.saml_enabled,
            Strategy::Passkey => attrs.passkey.enabled,
            Strategy::Totp => settings.second_factors.totp,
            Strategy::BackupCode => settings.second_factors.backup_code,
            Strategy::Web3Signature => {
                attrs.web3_wallet.enabled && lists(&attrs.web3_wallet.verifications)
            }
            Strategy::Admin => true,
        }
    }

    /// Every strategy the tenant has enabled.
    pub fn enabled_strategies(settings: &TenantSettings) -> Vec<Strategy> {
        let mut all = vec![
            Strategy::Password,
            Strategy::EmailCode,
            Strategy::PhoneCode,
            Strategy::EmailLink,
            Strategy::Saml,
            Strategy::Passkey,
            Strategy::Totp,
            Strategy::BackupCode,
            Strategy::Web3Signature,
            Strategy::Admin,
        ];
        all.extend(settings.oauth_providers.iter().cloned().map(Strategy::OAuth));
        all.retain(|s| Self::is_enabled(s, settings));
        all
    }

    /// Limits for `strategy`, with the tenant's overrides applied.
    pub fn limits(strategy: &Strategy, settings: &TenantSettings) -> StrategyLimits {
        let mut limits = StrategyLimits::defaults_for(strategy);
        if let Some(over) = settings.strategy_limits.get(&strategy.key()) {
            if let Some(max) = over.max_attempts {
                limits.max_attempts = max.max(1);
            }
            if let Some(ttl) = over.ttl_secs {
                limits.ttl_secs = ttl;
            }
        }
        limits
    }
}
