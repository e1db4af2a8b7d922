//! Keeps a user's primary pointers pointing at verified identifications.
//!
//! Runs as the last step of the mutation that triggered it, inside the same
//! transaction, and records every pointer change in the outbox.

use ident_store::WriteTxn;
use ident_types::{Identification, IdentificationId, IdentificationType, IdentityEvent, User};

use crate::outbox::emit;
use crate::IdentityError;

pub struct PrimaryIdentifierCoordinator;

impl PrimaryIdentifierCoordinator {
    /// Assign `ident` as primary for its type when the owner has none.
    pub fn on_verified<T: WriteTxn>(tx: &mut T, ident: &Identification) -> Result<(), IdentityError> {
        let Some(user_id) = &ident.user_id else {
            return Ok(());
        };
        if !ident.is_verified() || !Self::has_pointer(&ident.kind) {
            return Ok(());
        }
        let mut user = tx.get_user(&ident.tenant_id, user_id)?;
        if Self::pointer(&user, &ident.kind).is_some() {
            return Ok(());
        }
        Self::write_pointer(tx, &mut user, ident.kind.clone(), Some(ident))
    }

    /// `ident` was deleted or unverified: clear any pointer to it and promote
    /// the oldest remaining verified identification of the same type.
    pub fn on_removed<T: WriteTxn>(tx: &mut T, ident: &Identification) -> Result<(), IdentityError> {
        let Some(user_id) = &ident.user_id else {
            return Ok(());
        };
        if !Self::has_pointer(&ident.kind) {
            return Ok(());
        }
        let mut user = tx.get_user(&ident.tenant_id, user_id)?;
        if Self::pointer(&user, &ident.kind) != Some(&ident.id) {
            return Ok(());
        }
        let remaining = tx.identifications_for_user(&ident.tenant_id, user_id)?;
        let replacement = remaining
            .iter()
            .filter(|i| i.id != ident.id && i.kind == ident.kind && i.is_verified())
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Self::write_pointer(tx, &mut user, ident.kind.clone(), replacement)
    }

    /// Point the owner's primary for `ident`'s type at `ident`. The caller has
    /// already checked the assignment with the invariant guard.
    pub fn assign<T: WriteTxn>(tx: &mut T, ident: &Identification) -> Result<User, IdentityError> {
        let user_id = ident
            .user_id
            .as_ref()
            .ok_or_else(|| IdentityError::InvalidParameter("identification has no user".into()))?;
        let mut user = tx.get_user(&ident.tenant_id, user_id)?;
        if Self::pointer(&user, &ident.kind) != Some(&ident.id) {
            Self::write_pointer(tx, &mut user, ident.kind.clone(), Some(ident))?;
        }
        Ok(user)
    }

    fn has_pointer(kind: &IdentificationType) -> bool {
        kind.has_primary_pointer() || *kind == IdentificationType::Username
    }

    fn pointer<'u>(user: &'u User, kind: &IdentificationType) -> Option<&'u IdentificationId> {
        match kind {
            IdentificationType::Username => user.username_id.as_ref(),
            other => user.primary_for(other),
        }
    }

    fn write_pointer<T: WriteTxn>(
        tx: &mut T,
        user: &mut User,
        kind: IdentificationType,
        target: Option<&Identification>,
    ) -> Result<(), IdentityError> {
        let id = target.map(|i| i.id.clone());
        if kind == IdentificationType::Username {
            user.username_id = id.clone();
        } else {
            user.set_primary_for(&kind, id.clone());
        }
        tx.put_user(user)?;
        tracing::debug!(
            tenant = %user.tenant_id,
            user = %user.id,
            kind = %kind,
            identification = ?id,
            "primary identification changed"
        );
        emit(
            tx,
            IdentityEvent::PrimaryChanged {
                tenant_id: user.tenant_id.clone(),
                user_id: user.id.clone(),
                kind,
                identification_id: id,
            },
        )
    }
}
