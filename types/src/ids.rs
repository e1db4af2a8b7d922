//! Prefixed string identifiers.
//!
//! Every entity id is an opaque string carrying a short type prefix
//! (`idn_`, `ver_`, ...) followed by 32 hex characters of OS randomness.
//! Ids are never parsed for meaning; the prefix only helps humans reading logs.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::TypesError;

/// Fill a buffer from the OS random source and hex-encode it.
pub fn random_hex(len: usize) -> Result<String, TypesError> {
    let mut buf = vec![0u8; len];
    getrandom::getrandom(&mut buf).map_err(|e| TypesError::Entropy(e.to_string()))?;
    Ok(hex::encode(buf))
}

macro_rules! prefixed_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            /// Wrap an existing raw id.
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            /// Generate a fresh random id.
            pub fn generate() -> Result<Self, TypesError> {
                Ok(Self(format!("{}{}", Self::PREFIX, random_hex(16)?)))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }
    };
}

prefixed_id!(
    /// An isolated customer environment.
    TenantId,
    "ins_"
);
prefixed_id!(UserId, "user_");
prefixed_id!(IdentificationId, "idn_");
prefixed_id!(VerificationId, "ver_");
prefixed_id!(ExternalAccountId, "eac_");
