//! Verification storage trait.

use crate::StoreError;
use ident_types::{TenantId, Verification, VerificationId};

pub trait VerificationStore {
    /// Insert or overwrite a verification row.
    fn put_verification(&mut self, verification: &Verification) -> Result<(), StoreError>;

    fn get_verification(
        &self,
        tenant: &TenantId,
        id: &VerificationId,
    ) -> Result<Verification, StoreError>;

    fn delete_verification(
        &mut self,
        tenant: &TenantId,
        id: &VerificationId,
    ) -> Result<(), StoreError>;
}
