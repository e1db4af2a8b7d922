//! Error type for parsing and constructing fundamental types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TypesError {
    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("unknown identification type: {0}")]
    UnknownIdentificationType(String),

    #[error("invalid settings: {0}")]
    Config(String),

    #[error("random source unavailable: {0}")]
    Entropy(String),
}
