//! Shared utilities for the identification core.

pub mod logging;

pub use logging::{init_tracing, LogFormat, LogFormatError};
