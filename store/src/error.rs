use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key not found: {0}")]
    NotFound(String),

    /// A unique index rejected the write. Distinguishable so callers can map it
    /// to a conflict rather than an infrastructure failure.
    #[error("unique constraint {constraint} violated: {detail}")]
    UniqueViolation { constraint: String, detail: String },

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation { .. })
    }
}
