//! Per-tenant settings lookup.
//!
//! A TOML document holds one `[tenants.<tenant id>]` table per tenant:
//!
//! ```toml
//! [tenants.ins_acme]
//! require_verified_identifier = true
//! oauth_providers = ["google"]
//!
//! [tenants.ins_acme.attributes.email_address]
//! enabled = true
//! required = true
//! verify_at_sign_up = true
//! verifications = ["email_code"]
//! ```

use std::collections::BTreeMap;

use ident_types::{TenantId, TenantSettings, TypesError};
use serde::{Deserialize, Serialize};

use crate::IdentityError;

pub trait SettingsResolver: Send + Sync {
    fn resolve(&self, tenant: &TenantId) -> Result<TenantSettings, IdentityError>;
}

/// Settings for a fixed set of tenants, loaded once.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticSettingsResolver {
    #[serde(default)]
    tenants: BTreeMap<String, TenantSettings>,
}

impl StaticSettingsResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tenant(mut self, tenant: &TenantId, settings: TenantSettings) -> Self {
        self.tenants.insert(tenant.as_str().to_string(), settings);
        self
    }

    pub fn from_toml_str(s: &str) -> Result<Self, TypesError> {
        toml::from_str(s).map_err(|e| TypesError::Config(e.to_string()))
    }

    pub fn from_toml_file(path: &str) -> Result<Self, TypesError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| TypesError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    pub fn tenant_count(&self) -> usize {
        self.tenants.len()
    }
}

impl SettingsResolver for StaticSettingsResolver {
    fn resolve(&self, tenant: &TenantId) -> Result<TenantSettings, IdentityError> {
        self.tenants
            .get(tenant.as_str())
            .cloned()
            .ok_or_else(|| IdentityError::NotFound(format!("settings for tenant {tenant}")))
    }
}
