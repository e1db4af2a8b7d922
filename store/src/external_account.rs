//! External account storage trait.

use crate::StoreError;
use ident_types::{ExternalAccount, ExternalAccountId, TenantId};

pub trait ExternalAccountStore {
    /// Insert a new row. Subject uniqueness is carried by the owning provider
    /// identification's slot, so stale rows for the same subject may coexist
    /// until the caller deletes them.
    fn insert_external_account(&mut self, account: &ExternalAccount) -> Result<(), StoreError>;

    fn get_external_account(
        &self,
        tenant: &TenantId,
        id: &ExternalAccountId,
    ) -> Result<ExternalAccount, StoreError>;

    fn find_external_accounts(
        &self,
        tenant: &TenantId,
        provider: &str,
        provider_user_id: &str,
    ) -> Result<Vec<ExternalAccount>, StoreError>;

    fn delete_external_account(
        &mut self,
        tenant: &TenantId,
        id: &ExternalAccountId,
    ) -> Result<(), StoreError>;
}
