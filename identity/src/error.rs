use ident_store::StoreError;
use ident_types::TypesError;
use ident_verification::VerificationError;
use thiserror::Error;

use crate::guard::Violation;

#[derive(Debug, Error)]
pub enum IdentityError {
    /// Malformed identifier.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A claimed slot with the same canonical form already exists.
    #[error("identifier already exists: {0}")]
    Conflict(String),

    #[error("mutation breaks invariant: {0}")]
    InvariantViolation(Violation),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A verification attempt was rejected, expired or exhausted.
    #[error(transparent)]
    Verification(VerificationError),

    /// Infrastructure failure. The transaction must roll back.
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl IdentityError {
    /// HTTP status class a caller should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::InvalidParameter(_) | Self::Verification(_) => 422,
            Self::Conflict(_) => 409,
            Self::InvariantViolation(_) => 400,
            Self::NotFound(_) => 404,
            Self::Unexpected(_) => 500,
        }
    }

    /// Whether the enclosing transaction should still commit. True only for a
    /// wrong proof, so the incremented attempt counter persists.
    pub fn commits_transaction(&self) -> bool {
        matches!(self, Self::Verification(e) if e.is_recoverable())
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "form_param_format_invalid",
            Self::Conflict(_) => "form_identifier_exists",
            Self::InvariantViolation(v) => v.reason_code(),
            Self::NotFound(_) => "resource_not_found",
            Self::InvalidParameter(_) => "form_param_value_invalid",
            Self::Verification(VerificationError::InvalidCode { .. }) => "form_code_incorrect",
            Self::Verification(VerificationError::InvalidPassword { .. }) => "form_password_incorrect",
            Self::Verification(VerificationError::Expired) => "verification_expired",
            Self::Verification(VerificationError::Failed) => "verification_failed",
            Self::Verification(_) => "verification_proof_invalid",
            Self::Unexpected(_) => "internal_error",
        }
    }
}

impl From<Violation> for IdentityError {
    fn from(v: Violation) -> Self {
        Self::InvariantViolation(v)
    }
}

impl From<StoreError> for IdentityError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UniqueViolation { constraint, detail } => {
                tracing::warn!(%constraint, %detail, "unique constraint rejected write");
                Self::Conflict(detail)
            }
            StoreError::NotFound(what) => Self::NotFound(what),
            other => {
                tracing::error!(error = %other, "storage failure");
                Self::Unexpected(other.to_string())
            }
        }
    }
}

impl From<VerificationError> for IdentityError {
    fn from(e: VerificationError) -> Self {
        match e {
            VerificationError::InvalidParameter(msg) => Self::InvalidParameter(msg),
            VerificationError::Store(store) => store.into(),
            VerificationError::Unexpected(msg) => {
                tracing::error!(error = %msg, "verification infrastructure failure");
                Self::Unexpected(msg)
            }
            other => Self::Verification(other),
        }
    }
}

impl From<TypesError> for IdentityError {
    fn from(e: TypesError) -> Self {
        match e {
            TypesError::UnknownStrategy(_) | TypesError::UnknownIdentificationType(_) => {
                Self::InvalidParameter(e.to_string())
            }
            TypesError::Config(_) | TypesError::Entropy(_) => Self::Unexpected(e.to_string()),
        }
    }
}
