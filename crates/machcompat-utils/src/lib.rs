//! # machcompat Utilities
//!
//! Shared helpers for the machcompat workspace. At the moment that is the
//! logging setup built on `tracing`.

pub mod logging;

pub use logging::{
    init_logging, init_logging_with_level, init_with_config, LogConfig, LogFormat, LogLevel, LoggingError,
    LoggingGuard,
};
pub use tracing::{debug, error, info, trace, warn};
