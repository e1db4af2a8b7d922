//! External (OAuth / SAML) account rows owned by a provider identification.

use serde::{Deserialize, Serialize};

use crate::{ExternalAccountId, IdentificationId, TenantId, Timestamp, UserId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalAccount {
    pub id: ExternalAccountId,
    pub tenant_id: TenantId,
    pub user_id: Option<UserId>,
    pub identification_id: IdentificationId,
    /// `google`, `github`, ... or `saml`.
    pub provider: String,
    /// Subject id on the provider side.
    pub provider_user_id: String,
    pub email_address: Option<String>,
    pub created_at: Timestamp,
}
