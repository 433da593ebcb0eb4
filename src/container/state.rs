use std::fmt;

use serde::Serialize;

/// Lifecycle state of a container.
///
/// Never stored: every query re-derives it from the runtime's status token via
/// [`ContainerState::from_status`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContainerState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Aborting,
    /// The runtime reported no status, or one that is not mapped.
    #[default]
    Unknown,
}

impl ContainerState {
    /// Maps a runtime status token onto a lifecycle state.
    ///
    /// `STOPPING` is reported as [`ContainerState::Stopped`], the same as
    /// `STOPPED`; [`ContainerState::Stopping`] is never produced here.
    ///
    /// # Examples
    ///
    /// ```
    /// # use process_containers::container::ContainerState;
    /// assert_eq!(ContainerState::from_status("RUNNING"), Some(ContainerState::Running));
    /// assert_eq!(ContainerState::from_status("STOPPING"), Some(ContainerState::Stopped));
    /// assert_eq!(ContainerState::from_status("FROZEN"), None);
    /// ```
    pub fn from_status(status: &str) -> Option<Self> {
        match status {
            "STOPPED" => Some(Self::Stopped),
            "STARTING" => Some(Self::Starting),
            "RUNNING" => Some(Self::Running),
            "ABORTING" => Some(Self::Aborting),
            // Coalesced into Stopped for compatibility, see test_stopping_is_reported_as_stopped.
            "STOPPING" => Some(Self::Stopped),
            _ => None,
        }
    }

    /// Whether a process id reported alongside this state is meaningful.
    pub fn has_pid(self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => f.write_str("STOPPED"),
            Self::Starting => f.write_str("STARTING"),
            Self::Running => f.write_str("RUNNING"),
            Self::Stopping => f.write_str("STOPPING"),
            Self::Aborting => f.write_str("ABORTING"),
            Self::Unknown => f.write_str("UNKNOWN"),
        }
    }
}
