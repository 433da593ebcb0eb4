use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::container::LOG_FILE_NAME;
use crate::runtime::LogConfig;

/// Log option value that leaves runtime logging unconfigured.
const DISABLED: &str = "NONE";

/// Severity filter understood by the runtime's logging.
///
/// Parsed case-insensitively from a level name or its number, `0` being
/// [`LogLevel::Trace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Notice,
    Warn,
    Error,
    Crit,
    Alert,
    Fatal,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown log level: {0:?}")]
pub struct UnknownLogLevel(String);

impl LogLevel {
    const ALL: [Self; 9] = [
        Self::Trace,
        Self::Debug,
        Self::Info,
        Self::Notice,
        Self::Warn,
        Self::Error,
        Self::Crit,
        Self::Alert,
        Self::Fatal,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Notice => "NOTICE",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Crit => "CRIT",
            Self::Alert => "ALERT",
            Self::Fatal => "FATAL",
        }
    }
}

impl FromStr for LogLevel {
    type Err = UnknownLogLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(n) = s.parse::<usize>() {
            return Self::ALL
                .get(n)
                .copied()
                .ok_or_else(|| UnknownLogLevel(s.to_owned()));
        }

        Self::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownLogLevel(s.to_owned()))
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a log option value leaves runtime logging unconfigured.
pub(crate) fn is_disabled(options: &str) -> bool {
    options.len() == DISABLED.len() && options.eq_ignore_ascii_case(DISABLED)
}

/// Builds the runtime's logging setup.
///
/// The level is passed through verbatim; an unrecognised one is only warned
/// about since the runtime decides what it accepts.
pub(crate) fn log_config(log_path: &Path, log_id: &str, options: &str) -> LogConfig {
    if let Err(err) = options.parse::<LogLevel>() {
        log::warn!("Runtime logging for {}: {}", log_id, err);
    }

    LogConfig {
        name: log_id.to_owned(),
        lxcpath: log_path.to_path_buf(),
        file: log_path.join(LOG_FILE_NAME),
        level: options.to_owned(),
        prefix: log_id.to_owned(),
        quiet: false,
    }
}
