use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid container name: {0:?}")]
    InvalidContainerName(String),
    #[error("parsing container configuration failed: {0}")]
    Config(#[from] serde_json::Error),
    #[error("failed to create log directory `{path}`: {source}")]
    LogDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to set config item `{key}` of container {name}: {source}")]
    ConfigItem {
        name: String,
        key: String,
        #[source]
        source: crate::runtime::Error,
    },
    #[error("failed to read {what} of container {name}: {source}")]
    Read {
        what: &'static str,
        name: String,
        #[source]
        source: crate::fsutil::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
