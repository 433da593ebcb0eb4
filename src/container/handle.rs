use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;

use super::{
    CONFIG_FILE_NAME, ContainerConfig, ContainerName, ContainerState, Error, LOG_FILE_NAME,
    MAX_READ_SIZE, RefCounted, Release,
};
use crate::error::ResultOkLogExt;
use crate::fsutil;
use crate::runtime::{self, RuntimeContainer};
use crate::telemetry::{self, CpuInfo, MemoryInfo};

/// Timeout value for [`ContainerHandle::stop`] that waits without limit.
pub const INFINITE: u32 = u32::MAX;

const CONSOLE_LOG_FILE_NAME: &str = "console.log";

/// Converts a stop timeout in milliseconds into the runtime's whole seconds.
///
/// [`INFINITE`] maps to `-1`.
///
/// # Examples
///
/// ```
/// # use process_containers::container::{shutdown_timeout, INFINITE};
/// assert_eq!(shutdown_timeout(INFINITE), -1);
/// assert_eq!(shutdown_timeout(2_500), 2);
/// assert_eq!(shutdown_timeout(999), 0);
/// ```
pub fn shutdown_timeout(timeout_ms: u32) -> i32 {
    if timeout_ms == INFINITE {
        -1
    } else {
        i32::try_from(timeout_ms / 1000).unwrap_or(i32::MAX)
    }
}

/// One container, backed by a runtime container object.
///
/// A handle is created with a reference count of one and is shared under the
/// [`RefCounted`] contract: every [`RefCounted::add_ref`] also retains the
/// runtime object, every [`RefCounted::release`] also releases it, and the
/// release that brings the count to zero must be the one that releases the
/// runtime's last reference as well.
#[derive(Debug)]
pub struct ContainerHandle {
    name: ContainerName,
    pid: AtomicU32,
    lxcpath: PathBuf,
    logpath: PathBuf,
    refs: AtomicU32,
    /// Serializes configuration and log file reads.
    file_lock: Mutex<()>,
    container: Box<dyn RuntimeContainer>,
    #[cfg(debug_assertions)]
    attach: bool,
}

/// Serializable snapshot of a container's state and telemetry.
#[derive(Debug, Clone, Serialize)]
pub struct ContainerReport {
    pub name: String,
    pub state: ContainerState,
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub memory: MemoryInfo,
    pub cpu: CpuInfo,
    pub networks: Vec<String>,
    pub ips: Vec<IpAddr>,
}

impl ContainerHandle {
    /// Wraps a runtime container object.
    ///
    /// `configuration` is a [`ContainerConfig`] document; it is applied to the
    /// runtime object right away. A malformed document is logged and the
    /// defaults are used instead.
    ///
    /// # Arguments
    ///
    /// * `name` - The container's name.
    /// * `container` - The runtime object, holding one runtime reference that
    ///   the handle takes over.
    /// * `logpath` - Directory for the runtime and console log files.
    /// * `configuration` - The construction document.
    /// * `lxcpath` - The search path the container was found under.
    pub fn new(
        name: ContainerName,
        container: Box<dyn RuntimeContainer>,
        logpath: impl Into<PathBuf>,
        configuration: &str,
        lxcpath: impl Into<PathBuf>,
    ) -> Self {
        let config = ContainerConfig::parse(configuration);
        let handle = Self {
            name,
            pid: AtomicU32::new(0),
            lxcpath: lxcpath.into(),
            logpath: logpath.into(),
            refs: AtomicU32::new(1),
            file_lock: Mutex::new(()),
            container,
            #[cfg(debug_assertions)]
            attach: config.attach,
        };
        handle.apply_config(&config);
        handle
    }

    fn apply_config(&self, config: &ContainerConfig) {
        let path = std::env::var("PATH").unwrap_or_default();
        self.set_config_item("lxc.environment", &format!("PATH={path}"));

        if config.console_enabled() {
            // The runtime does not create missing log directories itself.
            std::fs::create_dir_all(&self.logpath)
                .map_err(|source| Error::LogDirectory {
                    path: self.logpath.clone(),
                    source,
                })
                .ok_warn();

            let logfile = self.logpath.join(CONSOLE_LOG_FILE_NAME);
            self.set_config_item("lxc.console.size", &config.console);
            self.set_config_item("lxc.console.logfile", &logfile.to_string_lossy());
        }

        for item in &config.items {
            self.set_config_item(&item.key, &item.value);
        }
    }

    fn set_config_item(&self, key: &str, value: &str) {
        self.container
            .set_config_item(key, value)
            .map_err(|source| Error::ConfigItem {
                name: self.id().to_owned(),
                key: key.to_owned(),
                source,
            })
            .ok_warn();
    }

    pub fn id(&self) -> &str {
        self.name.as_ref()
    }

    pub fn name(&self) -> &ContainerName {
        &self.name
    }

    /// Last known pid of the container's init process.
    ///
    /// Only meaningful after a successful [`ContainerHandle::start`], while the
    /// container is starting or running.
    pub fn pid(&self) -> u32 {
        self.pid.load(Ordering::Acquire)
    }

    /// Starts the container running `command` with `params`.
    ///
    /// Returns `false` if the runtime could not start it.
    pub fn start<S: AsRef<str>>(&self, command: &str, params: &[S]) -> bool {
        let argv = build_argv(command, params);

        match self.launch(&argv) {
            Ok(pid) => {
                self.pid.store(pid, Ordering::Release);
                log::trace!(
                    "Container [{}] was started successfully! pid={}",
                    self.name,
                    pid
                );
                true
            }
            Err(err) => {
                log::trace!("Container [{}] could not be started: {}", self.name, err);
                false
            }
        }
    }

    /// Starts the container and returns the pid of the command's process.
    #[cfg(debug_assertions)]
    fn launch(&self, argv: &[String]) -> runtime::Result<u32> {
        if !self.attach {
            return self.start_init(argv);
        }

        self.container.start(&[])?;
        self.container.attach(argv).inspect_err(|_| {
            self.container.shutdown(0).ok_warn();
        })
    }

    #[cfg(not(debug_assertions))]
    fn launch(&self, argv: &[String]) -> runtime::Result<u32> {
        self.start_init(argv)
    }

    fn start_init(&self, argv: &[String]) -> runtime::Result<u32> {
        self.container.start(argv)?;
        Ok(self.container.init_pid().unwrap_or_default())
    }

    /// Stops the container, waiting up to `timeout_ms` milliseconds.
    ///
    /// Succeeds immediately if the container is not running. Pass [`INFINITE`]
    /// to wait without limit.
    pub fn stop(&self, timeout_ms: u32) -> bool {
        if !self.container.is_running() {
            return true;
        }

        log::trace!("Container name [{}] Stop activated", self.name);
        self.container
            .shutdown(shutdown_timeout(timeout_ms))
            .ok_warn()
            .is_some()
    }

    /// Current lifecycle state, as reported by the runtime.
    ///
    /// Returns [`ContainerState::Unknown`] and logs an error if the runtime's
    /// status is missing or unmapped.
    pub fn state(&self) -> ContainerState {
        match self
            .container
            .state()
            .as_deref()
            .and_then(ContainerState::from_status)
        {
            Some(state) => state,
            None => {
                log::error!("Failed to get status of {} container!", self.name);
                ContainerState::default()
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.container.is_running()
    }

    pub fn memory(&self) -> MemoryInfo {
        telemetry::read_memory(self.container.as_ref())
    }

    pub fn cpu(&self) -> CpuInfo {
        telemetry::read_cpu(self.container.as_ref())
    }

    /// The persisted configuration file, capped at [`MAX_READ_SIZE`] bytes.
    ///
    /// Returns an empty string, with a warning, if it cannot be read.
    pub fn configuration(&self) -> String {
        let path = self.lxcpath.join(self.id()).join(CONFIG_FILE_NAME);
        let _guard = self.file_lock.lock().unwrap_or_else(PoisonError::into_inner);

        fsutil::read_head(&path, MAX_READ_SIZE)
            .map_err(|source| Error::Read {
                what: "configuration",
                name: self.id().to_owned(),
                source,
            })
            .ok_warn()
            .unwrap_or_default()
    }

    /// The most recent [`MAX_READ_SIZE`] bytes of the runtime log.
    ///
    /// Returns an empty string if there is no log to read.
    pub fn log(&self) -> String {
        let path = self.logpath.join(LOG_FILE_NAME);
        let _guard = self.file_lock.lock().unwrap_or_else(PoisonError::into_inner);

        match fsutil::read_tail(&path, MAX_READ_SIZE) {
            Ok(log) => log,
            Err(err) => {
                log::debug!("No log for container {}: {}", self.name, err);
                String::new()
            }
        }
    }

    /// Appends the host-side interface names of the container's networks.
    ///
    /// Veth networks report their host peer, all others their link. Stops at
    /// the first network index the runtime knows nothing about.
    pub fn networks(&self, out: &mut Vec<String>) {
        for index in 0usize.. {
            let Some(kind) = self
                .container
                .running_config_item(&format!("lxc.net.{index}.type"))
            else {
                break;
            };

            let key = if kind == "veth" {
                format!("lxc.net.{index}.veth.pair")
            } else {
                format!("lxc.net.{index}.link")
            };

            let Some(ifname) = self.container.running_config_item(&key) else {
                break;
            };
            out.push(ifname);
        }
    }

    /// Appends the addresses assigned to the container.
    pub fn ips(&self, out: &mut Vec<IpAddr>) {
        for raw in self.container.ips() {
            match raw.parse::<IpAddr>() {
                Ok(ip) => out.push(ip),
                Err(err) => log::warn!(
                    "Ignoring address `{}` of container {}: {}",
                    raw,
                    self.name,
                    err
                ),
            }
        }
    }

    /// Collects state and telemetry into one document.
    pub fn report(&self) -> ContainerReport {
        let state = self.state();
        let mut networks = Vec::new();
        self.networks(&mut networks);
        let mut ips = Vec::new();
        self.ips(&mut ips);

        ContainerReport {
            name: self.id().to_owned(),
            state,
            running: self.is_running(),
            pid: state.has_pid().then(|| self.pid()),
            memory: self.memory(),
            cpu: self.cpu(),
            networks,
            ips,
        }
    }

    pub fn lxcpath(&self) -> &Path {
        &self.lxcpath
    }

    pub fn logpath(&self) -> &Path {
        &self.logpath
    }

    /// Whether the last reference was released.
    pub(crate) fn is_destroyed(&self) -> bool {
        self.refs.load(Ordering::Acquire) == 0
    }
}

impl RefCounted for ContainerHandle {
    fn add_ref(&self) {
        self.refs.fetch_add(1, Ordering::AcqRel);
        self.container.get();
    }

    fn release(&self) -> Release {
        let Ok(previous) = self
            .refs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        else {
            log::error!("Container [{}] released after it was destroyed", self.name);
            return Release::Released;
        };
        let runtime_released = self.container.put();

        if previous == 1 {
            debug_assert!(
                runtime_released,
                "runtime still holds container {}",
                self.name
            );
            log::trace!("Container [{}] released", self.name);
            Release::Destroyed
        } else {
            Release::Released
        }
    }
}

/// Builds `[command, params...]` for the runtime.
fn build_argv<S: AsRef<str>>(command: &str, params: &[S]) -> Vec<String> {
    let expected = params.len() + 1;
    let mut argv = Vec::with_capacity(expected);
    argv.push(command.to_owned());
    argv.extend(params.iter().map(|param| param.as_ref().to_owned()));
    debug_assert_eq!(argv.len(), expected);
    argv
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::runtime::fake::{FAKE_PID, FakeContainer, FakeState};

    fn handle_with(
        configuration: &str,
        logpath: &Path,
        lxcpath: &Path,
    ) -> (ContainerHandle, Arc<FakeState>) {
        let state = FakeState::new("web");
        let handle = ContainerHandle::new(
            ContainerName::new("web").unwrap(),
            Box::new(FakeContainer(Arc::clone(&state))),
            logpath,
            configuration,
            lxcpath,
        );
        (handle, state)
    }

    fn handle(configuration: &str) -> (ContainerHandle, Arc<FakeState>) {
        handle_with(
            configuration,
            Path::new("/definitely/does/not/exist/log"),
            Path::new("/definitely/does/not/exist/lxc"),
        )
    }

    #[test]
    fn test_build_argv() {
        assert_eq!(
            build_argv("/bin/app", &["--port", "80"]),
            vec!["/bin/app", "--port", "80"]
        );
        assert_eq!(build_argv::<&str>("/bin/app", &[]), vec!["/bin/app"]);
    }

    #[test]
    fn test_shutdown_timeout() {
        assert_eq!(shutdown_timeout(INFINITE), -1);
        assert_eq!(shutdown_timeout(0), 0);
        assert_eq!(shutdown_timeout(999), 0);
        assert_eq!(shutdown_timeout(1000), 1);
        assert_eq!(shutdown_timeout(2500), 2);
        assert_eq!(shutdown_timeout(INFINITE - 1), 4_294_967);
    }

    #[test]
    fn test_new_applies_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let logpath = dir.path().join("nested").join("logs");
        let (_handle, state) = handle_with(
            r#"{"console": "1MB", "items": [
                {"key": "lxc.start.auto", "value": "1"},
                {"key": "lxc.start.auto", "value": "0"}
            ]}"#,
            &logpath,
            dir.path(),
        );

        assert!(logpath.is_dir());
        let config = state.config();
        let keys: Vec<&str> = config.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "lxc.environment",
                "lxc.console.size",
                "lxc.console.logfile",
                "lxc.start.auto",
                "lxc.start.auto",
            ]
        );
        assert!(config[0].1.starts_with("PATH="));
        assert_eq!(config[1].1, "1MB");
        assert_eq!(
            config[2].1,
            logpath.join(CONSOLE_LOG_FILE_NAME).to_string_lossy()
        );
        assert_eq!(config[3].1, "1");
        assert_eq!(config[4].1, "0");
    }

    #[test]
    fn test_new_without_console_logging() {
        let (_handle, state) = handle("not json at all");
        let config = state.config();
        assert_eq!(config.len(), 1);
        assert_eq!(config[0].0, "lxc.environment");
    }

    #[test]
    fn test_start_passes_command_and_reads_pid() {
        let (handle, state) = handle("");
        assert_eq!(handle.pid(), 0);

        assert!(handle.start("/bin/app", &["--port", "80"]));
        assert_eq!(
            state.started.lock().unwrap().clone(),
            Some(vec![
                String::from("/bin/app"),
                String::from("--port"),
                String::from("80"),
            ])
        );
        assert_eq!(handle.pid(), FAKE_PID);
        assert_eq!(handle.state(), ContainerState::Running);
        assert!(handle.is_running());
    }

    #[test]
    fn test_start_failure() {
        let (handle, state) = handle("");
        state
            .fail_start
            .store(true, std::sync::atomic::Ordering::Release);

        assert!(!handle.start::<&str>("/bin/app", &[]));
        assert_eq!(handle.pid(), 0);
    }

    #[cfg(debug_assertions)]
    #[test]
    fn test_start_through_attach() {
        let (handle, state) = handle(r#"{"attach": true}"#);

        assert!(handle.start("/bin/app", &["-v"]));
        assert_eq!(state.started.lock().unwrap().clone(), Some(Vec::new()));
        assert_eq!(
            state.attached.lock().unwrap().clone(),
            Some(vec![String::from("/bin/app"), String::from("-v")])
        );
        assert_eq!(handle.pid(), FAKE_PID + 1);
    }

    #[test]
    fn test_stop_when_not_running() {
        let (handle, state) = handle("");
        state.set_status(Some("STOPPED"));

        assert!(handle.stop(INFINITE));
        assert!(state.shutdowns.lock().unwrap().is_empty());
    }

    #[test]
    fn test_stop_converts_timeout() {
        let (handle, state) = handle("");

        state.set_status(Some("RUNNING"));
        assert!(handle.stop(INFINITE));
        state.set_status(Some("RUNNING"));
        assert!(handle.stop(2500));

        assert_eq!(state.shutdowns.lock().unwrap().clone(), vec![-1, 2]);
        assert_eq!(handle.state(), ContainerState::Stopped);
    }

    #[test]
    fn test_state_unmapped_status_is_unknown() {
        let (handle, state) = handle("");

        state.set_status(None);
        assert_eq!(handle.state(), ContainerState::Unknown);
        state.set_status(Some("FROZEN"));
        assert_eq!(handle.state(), ContainerState::Unknown);
        state.set_status(Some("STOPPING"));
        assert_eq!(handle.state(), ContainerState::Stopped);
    }

    #[test]
    fn test_configuration_reads_persisted_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("web")).unwrap();
        std::fs::write(
            dir.path().join("web").join(CONFIG_FILE_NAME),
            "lxc.uts.name = web\n",
        )
        .unwrap();
        let (handle, _) = handle_with("", dir.path(), dir.path());

        assert_eq!(handle.configuration(), "lxc.uts.name = web\n");
    }

    #[test]
    fn test_configuration_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("web")).unwrap();
        let content = "x".repeat(MAX_READ_SIZE as usize + 10);
        std::fs::write(dir.path().join("web").join(CONFIG_FILE_NAME), &content).unwrap();
        let (handle, _) = handle_with("", dir.path(), dir.path());

        assert_eq!(handle.configuration().len(), MAX_READ_SIZE as usize);
    }

    #[test]
    fn test_configuration_missing_file() {
        let (handle, _) = handle("");
        assert_eq!(handle.configuration(), "");
    }

    #[test]
    fn test_log_returns_tail_of_large_file() {
        let dir = tempfile::tempdir().unwrap();
        let head = "h".repeat(100);
        let tail: String = (0..MAX_READ_SIZE as usize)
            .map(|i| char::from(b'a' + (i % 26) as u8))
            .collect();
        std::fs::write(dir.path().join(LOG_FILE_NAME), format!("{head}{tail}")).unwrap();
        let (handle, _) = handle_with("", dir.path(), dir.path());

        let log = handle.log();
        assert_eq!(log.len(), MAX_READ_SIZE as usize);
        assert_eq!(log, tail);
    }

    #[test]
    fn test_log_tail_never_splits_a_character() {
        let dir = tempfile::tempdir().unwrap();
        // 33000 bytes; the 32 KiB tail starts inside a character.
        std::fs::write(dir.path().join(LOG_FILE_NAME), "€".repeat(11000)).unwrap();
        let (handle, _) = handle_with("", dir.path(), dir.path());

        let log = handle.log();
        assert!(log.len() <= MAX_READ_SIZE as usize);
        assert_eq!(log, "€".repeat(10922));
    }

    #[test]
    fn test_configuration_head_never_splits_a_character() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("web")).unwrap();
        std::fs::write(
            dir.path().join("web").join(CONFIG_FILE_NAME),
            "€".repeat(11000),
        )
        .unwrap();
        let (handle, _) = handle_with("", dir.path(), dir.path());

        let configuration = handle.configuration();
        assert!(configuration.len() <= MAX_READ_SIZE as usize);
        assert_eq!(configuration, "€".repeat(10922));
    }

    #[test]
    fn test_log_returns_small_file_whole() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(LOG_FILE_NAME), "line 1\nline 2\n").unwrap();
        let (handle, _) = handle_with("", dir.path(), dir.path());

        assert_eq!(handle.log(), "line 1\nline 2\n");
    }

    #[test]
    fn test_log_missing_file() {
        let (handle, _) = handle("");
        assert_eq!(handle.log(), "");
    }

    #[test]
    fn test_concurrent_log_reads() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(LOG_FILE_NAME), "shared log\n").unwrap();
        let (handle, _) = handle_with("", dir.path(), dir.path());
        let handle = Arc::new(handle);

        let readers: Vec<_> = (0..8)
            .map(|_| {
                let handle = Arc::clone(&handle);
                std::thread::spawn(move || handle.log())
            })
            .collect();
        for reader in readers {
            assert_eq!(reader.join().unwrap(), "shared log\n");
        }
    }

    #[test]
    fn test_networks() {
        let (handle, state) = handle("");
        state.set_running_config("lxc.net.0.type", "veth");
        state.set_running_config("lxc.net.0.veth.pair", "vethA1B2");
        state.set_running_config("lxc.net.1.type", "macvlan");
        state.set_running_config("lxc.net.1.link", "eth0");
        state.set_running_config("lxc.net.2.type", "veth");
        state.set_running_config("lxc.net.3.type", "veth");
        state.set_running_config("lxc.net.3.veth.pair", "unreachable");

        let mut networks = vec![String::from("existing")];
        handle.networks(&mut networks);
        assert_eq!(networks, vec!["existing", "vethA1B2", "eth0"]);
    }

    #[test]
    fn test_networks_none() {
        let (handle, _) = handle("");
        let mut networks = Vec::new();
        handle.networks(&mut networks);
        assert!(networks.is_empty());
    }

    #[test]
    fn test_ips_skips_invalid_addresses() {
        let (handle, state) = handle("");
        *state.ips.lock().unwrap() = vec![
            String::from("10.0.3.15"),
            String::from("garbage"),
            String::from("fe80::1"),
        ];

        let mut ips = Vec::new();
        handle.ips(&mut ips);
        assert_eq!(
            ips,
            vec![
                "10.0.3.15".parse::<IpAddr>().unwrap(),
                "fe80::1".parse::<IpAddr>().unwrap(),
            ]
        );
    }

    #[test]
    fn test_release_destroys_exactly_once() {
        let (handle, state) = handle("");
        handle.add_ref();
        handle.add_ref();
        assert_eq!(state.refs(), 3);

        assert_eq!(handle.release(), Release::Released);
        assert_eq!(handle.release(), Release::Released);
        assert!(!handle.is_destroyed());
        assert_eq!(handle.release(), Release::Destroyed);
        assert!(handle.is_destroyed());
        assert_eq!(state.refs(), 0);
    }

    #[test]
    fn test_release_after_destroyed_is_ignored() {
        let (handle, state) = handle("");
        assert_eq!(handle.release(), Release::Destroyed);

        assert_eq!(handle.release(), Release::Released);
        assert_eq!(handle.release(), Release::Released);
        assert!(handle.is_destroyed());
        assert_eq!(state.refs(), 0);
    }

    #[test]
    fn test_report() {
        let (handle, state) = handle("");
        assert!(handle.start::<&str>("/bin/app", &[]));
        state.set_cgroup(telemetry::MEMORY_USAGE, "4096\n");

        let report = handle.report();
        assert_eq!(report.name, "web");
        assert_eq!(report.state, ContainerState::Running);
        assert_eq!(report.pid, Some(FAKE_PID));
        assert_eq!(report.memory.total, Some(4096));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["state"], "RUNNING");
        assert_eq!(json["memory"]["total"], 4096);
        assert!(json["memory"].get("kernel").is_none());
    }
}
