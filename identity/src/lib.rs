//! Identification lifecycle and cross-cutting identity invariants.
//!
//! - [`IdentityRegistry`] creates, links, finalizes and deletes identifications,
//!   driving the verification engine inside the caller's transaction.
//! - [`InvariantGuard`] evaluates tenant policy (primary assignment, minimum
//!   verified, linked children, second-factor default) for a requested
//!   [`Mutation`].
//! - [`PrimaryIdentifierCoordinator`] keeps primary pointers on verified rows.
//! - [`transact`] runs a closure in one transaction, committing recoverable
//!   attempt failures and rolling back everything else.

pub mod coordinator;
pub mod error;
pub mod guard;
mod outbox;
pub mod registry;
pub mod settings;
pub mod transact;

pub use coordinator::PrimaryIdentifierCoordinator;
pub use error::IdentityError;
pub use guard::{canonicalize, InvariantGuard, Mutation, Violation};
pub use registry::{DeletedObject, ExternalAccountLink, IdentityRegistry, NewIdentification};
pub use settings::{SettingsResolver, StaticSettingsResolver};
pub use transact::transact;
