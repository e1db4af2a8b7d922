use ident_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VerificationError {
    /// Unknown strategy, strategy disabled for the tenant, strategy lacking the
    /// needed capability, or a proof of the wrong shape.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("incorrect code, {remaining} attempts remaining")]
    InvalidCode { remaining: u32 },

    #[error("incorrect password, {remaining} attempts remaining")]
    InvalidPassword { remaining: u32 },

    #[error("proof rejected, {remaining} attempts remaining")]
    InvalidProof { remaining: u32 },

    #[error("verification has expired")]
    Expired,

    #[error("verification failed: too many attempts")]
    Failed,

    /// Infrastructure failure (delivery, external checker, entropy). No attempt
    /// is recorded; the enclosing transaction must roll back.
    #[error("unexpected error: {0}")]
    Unexpected(String),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl VerificationError {
    /// A wrong proof: the incremented attempt counter has been written and the
    /// transaction should commit so it persists.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InvalidCode { .. } | Self::InvalidPassword { .. } | Self::InvalidProof { .. }
        )
    }
}
