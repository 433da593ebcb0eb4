//! LXC backend driving the `lxc-*` tool suite.
//!
//! Containers are discovered through the LXC on-disk layout: every directory
//! under a search path that holds a `config` file is a defined container.
//! Everything else (start, stop, status, cgroup counters, addresses) goes
//! through `lxc-start`, `lxc-stop`, `lxc-info`, `lxc-attach` and `lxc-cgroup`.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use super::{Error, LogConfig, Result, Runtime, RuntimeContainer};
use crate::admin::LogLevel;
use crate::container::CONFIG_FILE_NAME;

type SharedLogging = Arc<RwLock<Option<LogConfig>>>;

/// [`Runtime`] implementation backed by the LXC command line tools.
#[derive(Debug, Default)]
pub struct LxcRuntime {
    tool_dir: Option<PathBuf>,
    logging: SharedLogging,
}

impl LxcRuntime {
    /// Uses the `lxc-*` tools found on `PATH`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses the `lxc-*` tools installed in `dir`.
    pub fn with_tool_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            tool_dir: Some(dir.into()),
            logging: SharedLogging::default(),
        }
    }
}

impl Runtime for LxcRuntime {
    fn version(&self) -> String {
        let mut cmd = Command::new(tool(self.tool_dir.as_deref(), "info"));
        cmd.arg("--version");
        match run(cmd) {
            Ok(version) => version.trim().to_owned(),
            Err(err) => {
                log::debug!("failed to query LXC version: {}", err);
                String::from("unknown")
            }
        }
    }

    fn list_defined_containers(&self, path: &Path) -> Vec<Box<dyn RuntimeContainer>> {
        let entries = match fs::read_dir(path) {
            Ok(entries) => entries,
            Err(err) => {
                log::debug!("failed to read search path `{}`: {}", path.display(), err);
                return Vec::new();
            }
        };

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().join(CONFIG_FILE_NAME).is_file())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        names.sort();

        names
            .into_iter()
            .map(|name| {
                Box::new(LxcContainer::new(
                    name,
                    path.to_path_buf(),
                    self.tool_dir.clone(),
                    Arc::clone(&self.logging),
                )) as Box<dyn RuntimeContainer>
            })
            .collect()
    }

    /// Only `file`, `level` and `quiet` reach the `lxc-*` tools, as `-o`, `-l`
    /// and `-q`. The tools have no flags for `name`, `prefix` or `lxcpath`.
    fn init_logging(&self, config: LogConfig) -> Result<()> {
        if let Some(dir) = config.file.parent() {
            fs::create_dir_all(dir).map_err(|source| Error::LogDirectory {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        *self.logging.write().unwrap_or_else(PoisonError::into_inner) = Some(config);
        Ok(())
    }
}

/// One container defined under an LXC search path.
#[derive(Debug)]
pub struct LxcContainer {
    name: String,
    lxcpath: PathBuf,
    tool_dir: Option<PathBuf>,
    logging: SharedLogging,
    /// Config items handed to `lxc-start` as `--define` overrides.
    overrides: Mutex<Vec<(String, String)>>,
    attached: Mutex<Vec<Child>>,
    refs: AtomicUsize,
}

impl LxcContainer {
    fn new(
        name: String,
        lxcpath: PathBuf,
        tool_dir: Option<PathBuf>,
        logging: SharedLogging,
    ) -> Self {
        Self {
            name,
            lxcpath,
            tool_dir,
            logging,
            overrides: Mutex::default(),
            attached: Mutex::default(),
            refs: AtomicUsize::new(1),
        }
    }

    /// Builds an invocation of `lxc-<tool_name>` targeting this container.
    fn command(&self, tool_name: &str) -> Command {
        let mut cmd = Command::new(tool(self.tool_dir.as_deref(), tool_name));
        cmd.arg("-P").arg(&self.lxcpath).arg("-n").arg(&self.name);
        if let Some(log) = self
            .logging
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            let priority = log
                .level
                .parse::<LogLevel>()
                .map(|level| level.as_str().to_owned())
                .unwrap_or_else(|_| log.level.clone());
            cmd.arg("-o").arg(&log.file).arg("-l").arg(priority);
            if log.quiet {
                cmd.arg("-q");
            }
        }
        cmd
    }

    fn info(&self, args: &[&str]) -> Option<String> {
        let mut cmd = self.command("info");
        cmd.args(args);
        match run(cmd) {
            Ok(output) => Some(output),
            Err(err) => {
                log::trace!("lxc-info {:?} failed for `{}`: {}", args, self.name, err);
                None
            }
        }
    }

    /// `lxc-start` with every config override, in the order they were set.
    fn start_command(&self, argv: &[String]) -> Command {
        let mut cmd = self.command("start");
        for (key, value) in self
            .overrides
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
        {
            cmd.arg("-s").arg(format!("{key}={value}"));
        }
        if !argv.is_empty() {
            cmd.arg("--").args(argv);
        }
        cmd
    }

    fn reap_attached(&self) {
        self.attached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain_mut(|child| !matches!(child.try_wait(), Ok(Some(_))));
    }
}

impl RuntimeContainer for LxcContainer {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_config_item(&self, key: &str, value: &str) -> Result<()> {
        self.overrides
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((key.to_owned(), value.to_owned()));
        Ok(())
    }

    fn running_config_item(&self, key: &str) -> Option<String> {
        let output = self.info(&["-c", key])?;
        find_config_item(&output, key)
    }

    fn start(&self, argv: &[String]) -> Result<()> {
        run_detached(self.start_command(argv))
    }

    fn attach(&self, argv: &[String]) -> Result<u32> {
        let mut cmd = self.command("attach");
        cmd.arg("--")
            .args(argv)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        let child = cmd.spawn().map_err(|source| Error::Spawn {
            program: cmd.get_program().to_string_lossy().into_owned(),
            source,
        })?;
        let pid = child.id();
        self.attached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(child);
        Ok(pid)
    }

    fn shutdown(&self, timeout: i32) -> Result<()> {
        let mut cmd = self.command("stop");
        cmd.arg("-t").arg(timeout.to_string());
        let result = run_detached(cmd);
        self.reap_attached();
        result
    }

    fn init_pid(&self) -> Option<u32> {
        self.info(&["-p", "-H"])?.trim().parse().ok()
    }

    fn is_running(&self) -> bool {
        self.state().is_some_and(|state| state != "STOPPED")
    }

    fn state(&self) -> Option<String> {
        let output = self.info(&["-s", "-H"])?;
        let state = output.trim();
        (!state.is_empty()).then(|| state.to_owned())
    }

    fn cgroup_item(&self, key: &str, buf: &mut [u8]) -> Result<usize> {
        let mut cmd = self.command("cgroup");
        cmd.arg(key);
        let value = run(cmd)?;
        let bytes = value.as_bytes();
        let n = bytes.len().min(buf.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        Ok(bytes.len())
    }

    fn ips(&self) -> Vec<String> {
        self.info(&["-i", "-H"])
            .map(|output| {
                output
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn get(&self) {
        self.refs.fetch_add(1, Ordering::AcqRel);
    }

    fn put(&self) -> bool {
        let Ok(previous) =
            self.refs
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        else {
            log::error!("LXC container `{}` put after its last reference", self.name);
            return false;
        };

        let last = previous == 1;
        if last {
            self.reap_attached();
        }
        last
    }
}

fn tool(tool_dir: Option<&Path>, name: &str) -> PathBuf {
    let program = format!("lxc-{name}");
    match tool_dir {
        Some(dir) => dir.join(program),
        None => PathBuf::from(program),
    }
}

/// Runs `cmd` to completion and returns its stdout.
fn run(mut cmd: Command) -> Result<String> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    log::trace!("running {:?}", cmd);
    let output = cmd
        .stdin(Stdio::null())
        .output()
        .map_err(|source| Error::Spawn {
            program: program.clone(),
            source,
        })?;
    if !output.status.success() {
        return Err(Error::Command {
            program,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Runs `cmd` with detached stdio; `lxc-start` leaves a daemon behind that
/// would otherwise keep captured pipes open.
fn run_detached(mut cmd: Command) -> Result<()> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    log::trace!("running {:?}", cmd);
    let status = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|source| Error::Spawn {
            program: program.clone(),
            source,
        })?;
    if !status.success() {
        return Err(Error::Command {
            program,
            status,
            stderr: String::new(),
        });
    }
    Ok(())
}

/// Finds the last `key = value` line for `key` in LXC config syntax.
fn find_config_item(text: &str, key: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .filter(|(k, _)| k.trim() == key)
        .map(|(_, v)| v.trim().to_owned())
        .last()
}
