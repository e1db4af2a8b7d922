//! Identification storage trait.

use crate::StoreError;
use ident_types::{Identification, IdentificationId, IdentificationType, TenantId, UserId};

pub trait IdentificationStore {
    /// Insert a new row. Fails with `UniqueViolation` if the row claims a
    /// uniqueness slot that another row already holds.
    fn insert_identification(&mut self, ident: &Identification) -> Result<(), StoreError>;

    /// Overwrite an existing row, with the same unique-index check as insert.
    fn update_identification(&mut self, ident: &Identification) -> Result<(), StoreError>;

    fn get_identification(
        &self,
        tenant: &TenantId,
        id: &IdentificationId,
    ) -> Result<Identification, StoreError>;

    fn identifications_for_user(
        &self,
        tenant: &TenantId,
        user: &UserId,
    ) -> Result<Vec<Identification>, StoreError>;

    /// All rows (claimed or not) with this canonical form.
    fn find_by_canonical(
        &self,
        tenant: &TenantId,
        kind: &IdentificationType,
        canonical: &str,
    ) -> Result<Vec<Identification>, StoreError>;

    /// Rows that list `parent` in their parent set.
    fn children_of(
        &self,
        tenant: &TenantId,
        parent: &IdentificationId,
    ) -> Result<Vec<Identification>, StoreError>;

    fn delete_identification(
        &mut self,
        tenant: &TenantId,
        id: &IdentificationId,
    ) -> Result<(), StoreError>;
}
