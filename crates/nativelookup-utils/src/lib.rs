//! # nativelookup Utilities
//!
//! Logging setup shared by the nativelookup command-line tool and by host
//! programs embedding `nativelookup-core`.
//!
//! The core crate only emits `tracing` events; installing a subscriber is left
//! to the process, and this crate is the standard way to do it.

pub mod logging;

pub use logging::{
    init_logging, init_logging_to_file, init_logging_with_format, init_logging_with_level, LogFormat, LogLevel,
    LoggingError,
};
pub use tracing::{debug, error, info, trace, warn};
