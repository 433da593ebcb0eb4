//! Environment and command line settings of the `process-containers` binary.

use std::ffi::OsString;
use std::path::PathBuf;
use std::str::FromStr;

use crate::container::INFINITE;

const DEFAULT_SEARCH_PATH: &str = "/var/lib/lxc";
const DEFAULT_LOG_PATH: &str = "/tmp/procon/";
const DEFAULT_LOG_LEVEL: &str = "NONE";
const DEFAULT_CONTAINER_CONFIG: &str = "{}";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("environment variable `{name}` is not valid unicode")]
    NotUnicode { name: &'static str },
    #[error("environment variable `{name}` has invalid value {value:?}: {source}")]
    InvalidNumber {
        name: &'static str,
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("usage: process-containers <name> <info|start|stop|log|config> [command args..]")]
    Usage,
    #[error("unknown action {0:?}")]
    UnknownAction(String),
    #[error("action `start` requires a command")]
    MissingCommand,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Process-wide settings, read from `PROCON_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Directories searched for container definitions, in order.
    pub search_paths: Vec<PathBuf>,
    pub log_path: PathBuf,
    /// Runtime log severity, or `NONE`.
    pub log_level: String,
    /// Construction document applied to the container handle.
    pub container_config: String,
    pub stop_timeout_ms: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            search_paths: vec![PathBuf::from(DEFAULT_SEARCH_PATH)],
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
            log_level: String::from(DEFAULT_LOG_LEVEL),
            container_config: String::from(DEFAULT_CONTAINER_CONFIG),
            stop_timeout_ms: INFINITE,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var_os(name))
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<OsString>) -> Result<Self> {
        let mut settings = Self::default();

        if let Some(paths) = lookup("PROCON_SEARCH_PATHS") {
            let paths: Vec<PathBuf> = std::env::split_paths(&paths)
                .filter(|path| !path.as_os_str().is_empty())
                .collect();
            if !paths.is_empty() {
                settings.search_paths = paths;
            }
        }
        if let Some(path) = lookup("PROCON_LOG_PATH") {
            settings.log_path = PathBuf::from(path);
        }
        if let Some(level) = string_var(&lookup, "PROCON_LOG_LEVEL")? {
            settings.log_level = level;
        }
        if let Some(config) = string_var(&lookup, "PROCON_CONTAINER_CONFIG")? {
            settings.container_config = config;
        }
        if let Some(timeout) = string_var(&lookup, "PROCON_STOP_TIMEOUT_MS")? {
            settings.stop_timeout_ms =
                u32::from_str(timeout.trim()).map_err(|source| Error::InvalidNumber {
                    name: "PROCON_STOP_TIMEOUT_MS",
                    value: timeout,
                    source,
                })?;
        }

        Ok(settings)
    }
}

fn string_var(
    lookup: &impl Fn(&str) -> Option<OsString>,
    name: &'static str,
) -> Result<Option<String>> {
    lookup(name)
        .map(|value| value.into_string().map_err(|_| Error::NotUnicode { name }))
        .transpose()
}

/// What the binary was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Info,
    Start { command: String, args: Vec<String> },
    Stop,
    Log,
    Config,
}

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub name: String,
    pub action: Action,
}

impl Invocation {
    /// Parses `<name> <action> [command args..]`, program name excluded.
    pub fn parse<I>(args: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut args = args.into_iter().map(Into::into);
        let name = args.next().ok_or(Error::Usage)?;
        let action = args.next().ok_or(Error::Usage)?;

        let action = match action.as_str() {
            "info" => Action::Info,
            "start" => {
                let command = args.next().ok_or(Error::MissingCommand)?;
                Action::Start {
                    command,
                    args: args.collect(),
                }
            }
            "stop" => Action::Stop,
            "log" => Action::Log,
            "config" => Action::Config,
            _ => return Err(Error::UnknownAction(action)),
        };

        Ok(Self { name, action })
    }
}
