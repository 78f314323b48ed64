//! # memtype utilities
//!
//! Shared helpers for the memtype workspace. For now that is the logging
//! setup used by the CLI, built on `tracing`.

pub mod logging;

pub use logging::{init_logging, init_logging_with_level, LogFormat, LogLevel, LoggingError, LoggingGuard};
pub use tracing::{debug, error, info, trace, warn};
