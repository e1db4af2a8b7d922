//! Nullable store: thread-safe in-memory database for testing.
//!
//! Each transaction works on a private snapshot and keeps a log of its writes.
//! Unique indexes are checked on every write against the snapshot, and again
//! when the log is replayed onto the committed tables at commit time, so a
//! transaction that lost a race to a concurrent one fails with
//! `StoreError::UniqueViolation` exactly like a SQL backend would.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use ident_store::{
    Database, EventOutbox, ExternalAccountStore, IdentificationStore, StoreError, UserStore,
    VerificationStore, WriteTxn, IDENTIFICATION_UNIQUE_INDEX,
};
use ident_types::{
    ExternalAccount, ExternalAccountId, Identification, IdentificationId, IdentificationType,
    IdentityEvent, TenantId, User, UserId, Verification, VerificationId,
};

#[derive(Clone, Debug, Default)]
struct Tables {
    identifications: BTreeMap<IdentificationId, Identification>,
    verifications: BTreeMap<VerificationId, Verification>,
    external_accounts: BTreeMap<ExternalAccountId, ExternalAccount>,
    users: BTreeMap<UserId, User>,
}

#[derive(Clone, Debug)]
enum Op {
    InsertIdentification(Identification),
    UpdateIdentification(Identification),
    DeleteIdentification(IdentificationId),
    PutVerification(Verification),
    DeleteVerification(VerificationId),
    InsertExternalAccount(ExternalAccount),
    DeleteExternalAccount(ExternalAccountId),
    PutUser(User),
}

impl Tables {
    fn check_identification_unique(&self, row: &Identification) -> Result<(), StoreError> {
        let Some(key) = row.unique_key() else {
            return Ok(());
        };
        let clash = self
            .identifications
            .values()
            .any(|other| other.id != row.id && other.unique_key().as_ref() == Some(&key));
        if clash {
            return Err(StoreError::UniqueViolation {
                constraint: IDENTIFICATION_UNIQUE_INDEX.to_string(),
                detail: format!("({}, {}, {})", key.0, key.1, key.2),
            });
        }
        Ok(())
    }

    fn apply(&mut self, op: &Op) -> Result<(), StoreError> {
        match op {
            Op::InsertIdentification(row) => {
                if self.identifications.contains_key(&row.id) {
                    return Err(StoreError::Backend(format!("duplicate primary key {}", row.id)));
                }
                self.check_identification_unique(row)?;
                self.identifications.insert(row.id.clone(), row.clone());
            }
            Op::UpdateIdentification(row) => {
                if !self.identifications.contains_key(&row.id) {
                    return Err(StoreError::NotFound(row.id.to_string()));
                }
                self.check_identification_unique(row)?;
                self.identifications.insert(row.id.clone(), row.clone());
            }
            Op::DeleteIdentification(id) => {
                self.identifications.remove(id);
            }
            Op::PutVerification(row) => {
                self.verifications.insert(row.id.clone(), row.clone());
            }
            Op::DeleteVerification(id) => {
                self.verifications.remove(id);
            }
            Op::InsertExternalAccount(row) => {
                if self.external_accounts.contains_key(&row.id) {
                    return Err(StoreError::Backend(format!("duplicate primary key {}", row.id)));
                }
                self.external_accounts.insert(row.id.clone(), row.clone());
            }
            Op::DeleteExternalAccount(id) => {
                self.external_accounts.remove(id);
            }
            Op::PutUser(user) => {
                self.users.insert(user.id.clone(), user.clone());
            }
        }
        Ok(())
    }
}

#[derive(Default)]
struct Shared {
    tables: Tables,
    events: Vec<IdentityEvent>,
}

/// An in-memory database handing out snapshot transactions.
#[derive(Clone, Default)]
pub struct NullDatabase {
    shared: Arc<Mutex<Shared>>,
}

impl NullDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Shared>, StoreError> {
        self.shared
            .lock()
            .map_err(|_| StoreError::Backend("null database lock poisoned".into()))
    }

    /// Insert a user row outside any transaction.
    pub fn seed_user(&self, user: User) -> Result<(), StoreError> {
        self.lock()?.tables.users.insert(user.id.clone(), user);
        Ok(())
    }

    /// Events committed so far, in commit order.
    pub fn committed_events(&self) -> Vec<IdentityEvent> {
        self.lock().map(|s| s.events.clone()).unwrap_or_default()
    }

    pub fn committed_identification(&self, id: &IdentificationId) -> Option<Identification> {
        self.lock().ok()?.tables.identifications.get(id).cloned()
    }

    pub fn committed_verification(&self, id: &VerificationId) -> Option<Verification> {
        self.lock().ok()?.tables.verifications.get(id).cloned()
    }

    pub fn committed_user(&self, id: &UserId) -> Option<User> {
        self.lock().ok()?.tables.users.get(id).cloned()
    }

    pub fn verification_count(&self) -> usize {
        self.lock().map(|s| s.tables.verifications.len()).unwrap_or(0)
    }

    pub fn external_account_count(&self) -> usize {
        self.lock().map(|s| s.tables.external_accounts.len()).unwrap_or(0)
    }
}

impl Database for NullDatabase {
    type Txn = NullTxn;

    fn begin(&self) -> Result<NullTxn, StoreError> {
        let view = self.lock()?.tables.clone();
        Ok(NullTxn {
            shared: self.shared.clone(),
            view,
            log: Vec::new(),
            events: Vec::new(),
        })
    }
}

/// A snapshot transaction. Dropping it discards every write.
pub struct NullTxn {
    shared: Arc<Mutex<Shared>>,
    view: Tables,
    log: Vec<Op>,
    events: Vec<IdentityEvent>,
}

impl NullTxn {
    fn write(&mut self, op: Op) -> Result<(), StoreError> {
        self.view.apply(&op)?;
        self.log.push(op);
        Ok(())
    }

    /// Events emitted so far in this transaction.
    pub fn pending_events(&self) -> &[IdentityEvent] {
        &self.events
    }
}

impl WriteTxn for NullTxn {
    fn commit(self) -> Result<(), StoreError> {
        let mut shared = self
            .shared
            .lock()
            .map_err(|_| StoreError::Backend("null database lock poisoned".into()))?;
        let mut next = shared.tables.clone();
        for op in &self.log {
            if let Err(e) = next.apply(op) {
                tracing::debug!(error = %e, "null transaction lost a commit race");
                return Err(e);
            }
        }
        shared.tables = next;
        shared.events.extend(self.events);
        Ok(())
    }
}

impl IdentificationStore for NullTxn {
    fn insert_identification(&mut self, ident: &Identification) -> Result<(), StoreError> {
        self.write(Op::InsertIdentification(ident.clone()))
    }

    fn update_identification(&mut self, ident: &Identification) -> Result<(), StoreError> {
        self.write(Op::UpdateIdentification(ident.clone()))
    }

    fn get_identification(
        &self,
        tenant: &TenantId,
        id: &IdentificationId,
    ) -> Result<Identification, StoreError> {
        self.view
            .identifications
            .get(id)
            .filter(|i| &i.tenant_id == tenant)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn identifications_for_user(
        &self,
        tenant: &TenantId,
        user: &UserId,
    ) -> Result<Vec<Identification>, StoreError> {
        let mut rows: Vec<Identification> = self
            .view
            .identifications
            .values()
            .filter(|i| &i.tenant_id == tenant && i.belongs_to(user))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(rows)
    }

    fn find_by_canonical(
        &self,
        tenant: &TenantId,
        kind: &IdentificationType,
        canonical: &str,
    ) -> Result<Vec<Identification>, StoreError> {
        Ok(self
            .view
            .identifications
            .values()
            .filter(|i| {
                &i.tenant_id == tenant
                    && &i.kind == kind
                    && i.canonical_identifier.as_deref() == Some(canonical)
            })
            .cloned()
            .collect())
    }

    fn children_of(
        &self,
        tenant: &TenantId,
        parent: &IdentificationId,
    ) -> Result<Vec<Identification>, StoreError> {
        Ok(self
            .view
            .identifications
            .values()
            .filter(|i| &i.tenant_id == tenant && i.has_parent(parent))
            .cloned()
            .collect())
    }

    fn delete_identification(
        &mut self,
        tenant: &TenantId,
        id: &IdentificationId,
    ) -> Result<(), StoreError> {
        self.get_identification(tenant, id)?;
        self.write(Op::DeleteIdentification(id.clone()))
    }
}

impl VerificationStore for NullTxn {
    fn put_verification(&mut self, verification: &Verification) -> Result<(), StoreError> {
        self.write(Op::PutVerification(verification.clone()))
    }

    fn get_verification(
        &self,
        tenant: &TenantId,
        id: &VerificationId,
    ) -> Result<Verification, StoreError> {
        self.view
            .verifications
            .get(id)
            .filter(|v| &v.tenant_id == tenant)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn delete_verification(
        &mut self,
        tenant: &TenantId,
        id: &VerificationId,
    ) -> Result<(), StoreError> {
        self.get_verification(tenant, id)?;
        self.write(Op::DeleteVerification(id.clone()))
    }
}

impl ExternalAccountStore for NullTxn {
    fn insert_external_account(&mut self, account: &ExternalAccount) -> Result<(), StoreError> {
        self.write(Op::InsertExternalAccount(account.clone()))
    }

    fn get_external_account(
        &self,
        tenant: &TenantId,
        id: &ExternalAccountId,
    ) -> Result<ExternalAccount, StoreError> {
        self.view
            .external_accounts
            .get(id)
            .filter(|a| &a.tenant_id == tenant)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn find_external_accounts(
        &self,
        tenant: &TenantId,
        provider: &str,
        provider_user_id: &str,
    ) -> Result<Vec<ExternalAccount>, StoreError> {
        Ok(self
            .view
            .external_accounts
            .values()
            .filter(|a| {
                &a.tenant_id == tenant && a.provider == provider && a.provider_user_id == provider_user_id
            })
            .cloned()
            .collect())
    }

    fn delete_external_account(
        &mut self,
        tenant: &TenantId,
        id: &ExternalAccountId,
    ) -> Result<(), StoreError> {
        self.get_external_account(tenant, id)?;
        self.write(Op::DeleteExternalAccount(id.clone()))
    }
}

impl UserStore for NullTxn {
    fn get_user(&self, tenant: &TenantId, id: &UserId) -> Result<User, StoreError> {
        self.view
            .users
            .get(id)
            .filter(|u| &u.tenant_id == tenant)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn put_user(&mut self, user: &User) -> Result<(), StoreError> {
        self.write(Op::PutUser(user.clone()))
    }
}

impl EventOutbox for NullTxn {
    fn emit(&mut self, event: IdentityEvent) -> Result<(), StoreError> {
        self.events.push(event);
        Ok(())
    }
}
