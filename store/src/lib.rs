//! Abstract storage traits for the identification core.
//!
//! Every storage backend (a SQL database in production, the in-memory database in
//! `ident-nullables` for tests) implements these traits. The rest of the
//! codebase depends only on the traits.
//!
//! All reads and writes go through a [`WriteTxn`]. Backends must enforce the
//! `(tenant, type, canonical_identifier)` unique index themselves and report a
//! violation as [`StoreError::UniqueViolation`], both on the offending write and,
//! if a concurrent transaction won the race, on [`WriteTxn::commit`].

pub mod error;
pub mod external_account;
pub mod identification;
pub mod outbox;
pub mod user;
pub mod verification;

pub use error::StoreError;
pub use external_account::ExternalAccountStore;
pub use identification::IdentificationStore;
pub use outbox::EventOutbox;
pub use user::UserStore;
pub use verification::VerificationStore;

/// Name of the unique index over claimed identification slots.
pub const IDENTIFICATION_UNIQUE_INDEX: &str = "identifications_tenant_type_canonical_key";

/// A writable transaction spanning every store the core touches.
///
/// Dropping a transaction without calling [`WriteTxn::commit`] rolls it back.
pub trait WriteTxn:
    IdentificationStore + VerificationStore + ExternalAccountStore + UserStore + EventOutbox
{
    fn commit(self) -> Result<(), StoreError>;
}

/// A database that hands out transactions.
pub trait Database {
    type Txn: WriteTxn;

    fn begin(&self) -> Result<Self::Txn, StoreError>;
}
