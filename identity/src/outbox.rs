use ident_store::EventOutbox;
use ident_types::IdentityEvent;

use crate::IdentityError;

/// Queue `event` in the transaction's outbox.
pub(crate) fn emit<T: EventOutbox + ?Sized>(tx: &mut T, event: IdentityEvent) -> Result<(), IdentityError> {
    if tracing::enabled!(tracing::Level::TRACE) {
        if let Ok(payload) = serde_json::to_string(&event) {
            tracing::trace!(tenant = %event.tenant_id(), event = event.name(), %payload, "event queued");
        }
    }
    tx.emit(event)?;
    Ok(())
}
