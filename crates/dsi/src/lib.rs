//! POSIX storage interface for a data-movement transport.
//!
//! [`PosixDsi`] is what a transport talks to: it starts windowed sends and
//! receives, runs checksum commands, and applies the configured receive
//! checks (space quota, path rewriting).

mod command;
mod config;
mod dsi;
mod error;
mod preflight;

pub use command::Command;
pub use config::{
    ChecksumConfig, DsiConfig, ENV_CKSUM_EXT_ADLER32, ENV_CKSUM_EXT_MD5, ENV_PATH_REWRITE,
    ENV_SPACE_QUOTA_URL,
};
pub use dsi::PosixDsi;
pub use error::DsiError;
#[cfg(target_os = "linux")]
pub use preflight::XattrSpaceUsage;
pub use preflight::{
    DEFAULT_SPACE_GROUP, PathRewrite, SpaceAttributes, SpaceQuotaCheck, SpaceUsage, space_token,
};
