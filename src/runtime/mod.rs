//! The container runtime capability this crate is layered on.
//!
//! The rest of the crate only talks to a runtime through the two traits in
//! this module:
//!
//! - [`Runtime`]: process-wide operations: enumerating the containers
//!   defined under a search path and configuring the runtime's own logging.
//! - [`RuntimeContainer`]: one runtime-side container object: config items,
//!   start/stop/attach, status, cgroup accounting counters, addresses, and the
//!   runtime's own reference count.
//!
//! [`lxc::LxcRuntime`] is the concrete backend used by the process-wide
//! administrator.

mod error;
#[cfg(test)]
pub(crate) mod fake;
pub mod lxc;

use std::fmt::Debug;
use std::path::{Path, PathBuf};

pub use error::{Error, Result};

/// Logging setup handed to [`Runtime::init_logging`].
///
/// Backends apply what they can express. The LXC CLI backend only uses
/// `file`, `level` and `quiet`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Identifier of the log stream.
    pub name: String,
    /// Directory the runtime keeps its log in.
    pub lxcpath: PathBuf,
    /// Log file the runtime writes to.
    pub file: PathBuf,
    /// Severity filter, a level name or number.
    pub level: String,
    /// Prefix put in front of every log line.
    pub prefix: String,
    /// Suppress mirroring log output to stderr.
    pub quiet: bool,
}

/// A runtime-side container object.
///
/// Objects returned by [`Runtime::list_defined_containers`] start with a
/// runtime reference count of one. [`RuntimeContainer::get`] and
/// [`RuntimeContainer::put`] adjust that count.
pub trait RuntimeContainer: Debug + Send + Sync {
    /// Name the runtime knows the container by.
    fn name(&self) -> &str;

    /// Sets a configuration item, applied the next time the container starts.
    fn set_config_item(&self, key: &str, value: &str) -> Result<()>;

    /// Reads a configuration item from the running container.
    fn running_config_item(&self, key: &str) -> Option<String>;

    /// Starts the container. A non-empty `argv` replaces the default init.
    fn start(&self, argv: &[String]) -> Result<()>;

    /// Runs `argv` inside the running container and returns its pid.
    fn attach(&self, argv: &[String]) -> Result<u32>;

    /// Requests a clean shutdown, waiting `timeout` seconds (`-1` waits forever).
    fn shutdown(&self, timeout: i32) -> Result<()>;

    /// Pid of the container's init process, if running.
    fn init_pid(&self) -> Option<u32>;

    fn is_running(&self) -> bool;

    /// Current status token, e.g. `RUNNING`.
    fn state(&self) -> Option<String>;

    /// Copies the cgroup accounting counter `key` into `buf`.
    ///
    /// Returns the full length of the value, which exceeds `buf.len()` when the
    /// copy was truncated.
    fn cgroup_item(&self, key: &str, buf: &mut [u8]) -> Result<usize>;

    /// Addresses assigned to the container's interfaces.
    fn ips(&self) -> Vec<String>;

    /// Takes an additional runtime reference.
    fn get(&self);

    /// Drops a runtime reference; returns `true` when it was the last one.
    fn put(&self) -> bool;
}

/// Process-wide runtime operations.
pub trait Runtime: Send + Sync {
    /// Version string of the runtime.
    fn version(&self) -> String;

    /// Enumerates every container defined under `path`.
    fn list_defined_containers(&self, path: &Path) -> Vec<Box<dyn RuntimeContainer>>;

    /// Configures the runtime's logging sink.
    fn init_logging(&self, config: LogConfig) -> Result<()>;
}
