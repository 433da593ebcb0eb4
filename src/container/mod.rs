//! Container handles and the types around them.
//!
//! - [`ContainerName`]: validated container identity.
//! - [`ContainerState`]: lifecycle state derived from the runtime's status token.
//! - [`ContainerConfig`]: the construction document applied to a new handle.
//! - [`ContainerHandle`]: one container: lifecycle, telemetry, config and log access.
//! - [`RefCounted`]: the explicit retain/release contract handles are shared under.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

mod config;
mod error;
mod handle;
mod state;

pub use config::{ConfigItem, ContainerConfig};
pub use error::{Error, Result};
pub use handle::{ContainerHandle, ContainerReport, INFINITE, shutdown_timeout};
pub use state::ContainerState;

/// Name of a container's persisted configuration file, under `<path>/<name>/`.
pub const CONFIG_FILE_NAME: &str = "config";

/// Name of the runtime log file, under the log directory.
pub const LOG_FILE_NAME: &str = "lxclogging.log";

/// Upper bound on the bytes returned by a configuration or log read.
pub const MAX_READ_SIZE: u64 = 32 * (1 << 10);

/// The maximum allowed length for a [`ContainerName`].
const CONTAINER_NAME_MAX_LEN: usize = 255;

/// A validated container name.
///
/// # Examples
///
/// ```
/// # use process_containers::container::ContainerName;
/// let name = ContainerName::new("web-frontend").unwrap();
/// assert_eq!(name.as_ref(), "web-frontend");
/// assert!(ContainerName::new("../escape").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerName(Arc<str>);

impl ContainerName {
    /// Creates a new `ContainerName` from the given raw name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidContainerName`] if the name is empty, longer than
    /// [`CONTAINER_NAME_MAX_LEN`], contains a `/` or a NUL byte, or is `.` / `..`.
    pub fn new(src: impl AsRef<str>) -> Result<Self> {
        let src = src.as_ref();
        if src.is_empty()
            || src.len() > CONTAINER_NAME_MAX_LEN
            || src.contains(['/', '\0'])
            || src == "."
            || src == ".."
        {
            return Err(Error::InvalidContainerName(src.to_owned()));
        }

        Ok(Self(src.into()))
    }
}

impl AsRef<str> for ContainerName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ContainerName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of [`RefCounted::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// A reference was dropped; the object is still alive.
    Released,
    /// The last reference was dropped and the object was destroyed by this call.
    Destroyed,
}

/// Explicit reference counting for objects shared with an external owner.
pub trait RefCounted {
    /// Takes an additional reference.
    fn add_ref(&self);

    /// Drops a reference.
    fn release(&self) -> Release;
}
