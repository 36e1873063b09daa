use std::io;
use std::path::PathBuf;

/// Errors produced by the storage interface itself.
#[derive(Debug, thiserror::Error)]
pub enum DsiError {
    #[error("reading config {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("parsing config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("serializing config: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("no async runtime: {0}")]
    NoRuntime(String),

    #[error("unsupported command: {0}")]
    UnsupportedCommand(&'static str),
}
