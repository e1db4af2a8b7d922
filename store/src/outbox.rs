//! Transactional event outbox.
//!
//! Events are written inside the transaction that caused them, so a rollback
//! discards them together with the state change.

use crate::StoreError;
use ident_types::IdentityEvent;

pub trait EventOutbox {
    fn emit(&mut self, event: IdentityEvent) -> Result<(), StoreError>;
}
