use serde::Deserialize;

use super::{Error, Result};
use crate::error::ResultOkLogExt;

/// Construction document of a container handle.
///
/// ```json
/// {
///   "console": "1MB",
///   "items": [{ "key": "lxc.cgroup2.memory.max", "value": "512M" }],
///   "attach": false
/// }
/// ```
///
/// `attach` is only honoured by debug builds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Console ring buffer size (`"0"` disables console logging, otherwise e.g.
    /// `"1MB"` or `"auto"`).
    pub console: String,
    /// Raw runtime config overrides, applied in order.
    pub items: Vec<ConfigItem>,
    /// Run the command through attach instead of as the container's init.
    #[cfg(debug_assertions)]
    pub attach: bool,
}

/// A raw runtime configuration override.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConfigItem {
    pub key: String,
    pub value: String,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            console: String::from("0"),
            items: Vec::new(),
            #[cfg(debug_assertions)]
            attach: false,
        }
    }
}

impl ContainerConfig {
    /// Parses a construction document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the document is not valid JSON of this shape.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(Error::Config)
    }

    /// Parses a construction document, falling back to the defaults.
    ///
    /// Blank text yields the defaults silently; a malformed document is logged
    /// as an error first.
    pub fn parse(text: &str) -> Self {
        if text.trim().is_empty() {
            return Self::default();
        }
        Self::from_json(text).ok_log().unwrap_or_default()
    }

    /// Whether console output should be logged to a file.
    pub fn console_enabled(&self) -> bool {
        self.console != "0"
    }
}
