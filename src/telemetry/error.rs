//! Defines structured error types for reading cgroup accounting counters.
//!
//! A [`StatParseError`] never reaches the caller of a telemetry read: the
//! reader logs it as a warning and leaves the affected field unset.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatParseError {
    #[error("counter '{key}' could not be read: {source}")]
    Runtime {
        key: String,
        #[source]
        source: crate::runtime::Error,
    },

    #[error("counter '{key}' is empty")]
    Empty { key: String },

    #[error("counter '{key}' needs {len} bytes, buffer holds {capacity}")]
    Truncated {
        key: String,
        len: usize,
        capacity: usize,
    },

    #[error("invalid value for '{key}': '{value}'")]
    InvalidValue { key: String, value: String },
}
