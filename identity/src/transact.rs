//! Transaction runner.

use ident_store::{Database, WriteTxn};

use crate::IdentityError;

/// Run `f` inside one transaction.
///
/// Commits when `f` succeeds, and also when it fails with a wrong proof so the
/// incremented attempt counter persists. Every other error rolls back. A
/// commit that loses a uniqueness race surfaces as `Conflict`.
pub fn transact<D, F, R>(db: &D, f: F) -> Result<R, IdentityError>
where
    D: Database,
    F: FnOnce(&mut D::Txn) -> Result<R, IdentityError>,
{
    let mut tx = db.begin()?;
    match f(&mut tx) {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(err) if err.commits_transaction() => {
            tx.commit()?;
            Err(err)
        }
        Err(err) => {
            tracing::debug!(error = %err, code = err.code(), "rolling back transaction");
            drop(tx);
            Err(err)
        }
    }
}
