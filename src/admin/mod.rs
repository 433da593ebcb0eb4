//! The process-wide container administrator.
//!
//! [`ContainerAdministrator::instance`] hands out the shared administrator,
//! backed by [`LxcRuntime`]. Tests and embedders that need isolation build
//! their own with [`ContainerAdministrator::new`].

mod iter;
mod logging;

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};

pub use iter::ContainerIterator;
pub use logging::{LogLevel, UnknownLogLevel};

use crate::container::{ContainerHandle, ContainerName, RefCounted, Release};
use crate::error::ResultOkLogExt;
use crate::runtime::Runtime;
use crate::runtime::lxc::LxcRuntime;

/// Discovers containers across search paths and tracks the live ones.
pub struct ContainerAdministrator {
    runtime: Arc<dyn Runtime>,
    /// Live handles by name. Covers the whole discovery sequence.
    containers: Mutex<HashMap<ContainerName, Weak<ContainerHandle>>>,
}

impl fmt::Debug for ContainerAdministrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerAdministrator")
            .field("containers", &self.containers)
            .finish_non_exhaustive()
    }
}

impl ContainerAdministrator {
    pub fn new(runtime: Arc<dyn Runtime>) -> Self {
        log::trace!("Container runtime version: {}", runtime.version());
        Self {
            runtime,
            containers: Mutex::new(HashMap::new()),
        }
    }

    /// The process-wide administrator, created on first use.
    pub fn instance() -> &'static Self {
        static INSTANCE: OnceLock<ContainerAdministrator> = OnceLock::new();
        INSTANCE.get_or_init(|| Self::new(Arc::new(LxcRuntime::new())))
    }

    /// Looks up the container `name` under `search_paths`, in order.
    ///
    /// The first path defining the container wins and a new handle is built
    /// from `configuration`, logging into `log_path`. Every other container
    /// the runtime enumerates along the way is released straight back to it.
    ///
    /// Returns `None` if no path defines the container.
    pub fn container<P: AsRef<Path>>(
        &self,
        name: &str,
        search_paths: &[P],
        log_path: impl AsRef<Path>,
        configuration: &str,
    ) -> Option<Arc<ContainerHandle>> {
        let name = ContainerName::new(name).ok_warn()?;
        let mut containers = self
            .containers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        for path in search_paths {
            let path = path.as_ref();
            let mut found = None;
            for container in self.runtime.list_defined_containers(path) {
                if found.is_none() && container.name() == name.as_ref() {
                    found = Some(container);
                } else {
                    container.put();
                }
            }

            if let Some(container) = found {
                let handle = Arc::new(ContainerHandle::new(
                    name.clone(),
                    container,
                    log_path.as_ref(),
                    configuration,
                    path,
                ));
                containers.retain(|_, entry| entry.strong_count() > 0);
                containers.insert(name, Arc::downgrade(&handle));
                return Some(handle);
            }
        }

        log::trace!("Container [{}] not found", name);
        None
    }

    /// Configures the runtime's own logging.
    ///
    /// `options` is the severity filter, passed through as is. `NONE`, in any
    /// case, leaves logging unconfigured.
    pub fn logging(&self, log_path: impl AsRef<Path>, log_id: &str, options: &str) {
        if logging::is_disabled(options) {
            log::trace!("Runtime logging for {} disabled", log_id);
            return;
        }

        let config = logging::log_config(log_path.as_ref(), log_id, options);
        self.runtime.init_logging(config).ok_log();
    }

    /// Snapshot of the live containers.
    pub fn containers(&self) -> ContainerIterator {
        let containers = self
            .containers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        ContainerIterator::new(
            containers
                .values()
                .filter_map(Weak::upgrade)
                .filter(|handle| !handle.is_destroyed())
                .collect(),
        )
    }
}

/// The administrator lives as long as the process.
impl RefCounted for ContainerAdministrator {
    fn add_ref(&self) {}

    fn release(&self) -> Release {
        Release::Released
    }
}
