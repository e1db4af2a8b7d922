//! Fundamental types for the identification and verification core.
//!
//! This crate defines the types shared across every other crate in the workspace:
//! prefixed ids, timestamps, the Identification / Verification / ExternalAccount /
//! User entities, strategy tags, tenant settings and identity events.

pub mod error;
pub mod event;
pub mod external_account;
pub mod ids;
pub mod identification;
pub mod settings;
pub mod strategy;
pub mod time;
pub mod user;
pub mod verification;

pub use error::TypesError;
pub use event::IdentityEvent;
pub use external_account::ExternalAccount;
pub use ids::{ExternalAccountId, IdentificationId, TenantId, UserId, VerificationId};
pub use identification::{Identification, IdentificationStatus, IdentificationType};
pub use settings::{
    AttributeSettings, Attributes, EmailCanonicalization, SecondFactorSettings,
    StrategyLimitsOverride, TenantSettings,
};
pub use strategy::{Capabilities, Strategy};
pub use time::{Clock, SystemClock, Timestamp};
pub use user::User;
pub use verification::{Verification, VerificationOutcome};
