//! Storage interface configuration.
//!
//! Stored as TOML. Every field has a default, so an empty file is a valid
//! configuration. The GridFTP deployment variables are honoured on top of
//! the file:
//!
//! | Variable | Field |
//! |---|---|
//! | `GRIDFTP_CKSUM_EXT_MD5` | `checksum.helpers.md5` |
//! | `GRIDFTP_CKSUM_EXT_ADLER32` | `checksum.helpers.adler32` |
//! | `GRIDFTP_APPEND_XROOTD_CGI` | `path_rewrite_helper` |
//! | `XROOTD_CNSURL` | `space_quota_url` |

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use storlink_checksum::{ChecksumSettings, DEFAULT_CHUNK_LIMIT, ExternalHelper};
use storlink_protocol::ChecksumAlgorithm;
use storlink_transfer::{DEFAULT_BLOCK_SIZE, DEFAULT_CONCURRENCY};

use crate::DsiError;

pub const ENV_CKSUM_EXT_MD5: &str = "GRIDFTP_CKSUM_EXT_MD5";
pub const ENV_CKSUM_EXT_ADLER32: &str = "GRIDFTP_CKSUM_EXT_ADLER32";
pub const ENV_PATH_REWRITE: &str = "GRIDFTP_APPEND_XROOTD_CGI";
pub const ENV_SPACE_QUOTA_URL: &str = "XROOTD_CNSURL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DsiConfig {
    /// I/O unit used by local transports.
    #[serde(default = "default_block_size")]
    pub block_size: usize,

    /// Operations kept in flight by local transports.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default)]
    pub checksum: ChecksumConfig,

    /// Command whose output replaces the path opened by a receive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_rewrite_helper: Option<String>,

    /// Base URL whose `xroot.space` attribute reports space-token usage.
    /// Receives are quota-checked only when this is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space_quota_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumConfig {
    /// Largest chunk digested per step.
    #[serde(default = "default_chunk_limit")]
    pub chunk_limit: usize,

    #[serde(default = "default_mark_interval_secs")]
    pub mark_interval_secs: u64,

    #[serde(default = "default_max_stall_retries")]
    pub max_stall_retries: u32,

    #[serde(default = "default_stall_backoff_ms")]
    pub stall_backoff_ms: u64,

    /// Algorithm name -> helper command line.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub helpers: BTreeMap<String, String>,
}

fn default_block_size() -> usize {
    DEFAULT_BLOCK_SIZE
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_chunk_limit() -> usize {
    DEFAULT_CHUNK_LIMIT
}

fn default_mark_interval_secs() -> u64 {
    5
}

fn default_max_stall_retries() -> u32 {
    5
}

fn default_stall_backoff_ms() -> u64 {
    2000
}

impl Default for ChecksumConfig {
    fn default() -> Self {
        Self {
            chunk_limit: default_chunk_limit(),
            mark_interval_secs: default_mark_interval_secs(),
            max_stall_retries: default_max_stall_retries(),
            stall_backoff_ms: default_stall_backoff_ms(),
            helpers: BTreeMap::new(),
        }
    }
}

impl Default for DsiConfig {
    fn default() -> Self {
        Self {
            block_size: default_block_size(),
            concurrency: default_concurrency(),
            checksum: ChecksumConfig::default(),
            path_rewrite_helper: None,
            space_quota_url: None,
        }
    }
}

impl DsiConfig {
    pub fn from_toml(text: &str) -> Result<Self, DsiError> {
        let config: DsiConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, DsiError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reads `path`, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self, DsiError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(DsiError::ConfigRead {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Applies overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Applies overrides from `lookup`. Blank values are ignored.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(command) = get(ENV_CKSUM_EXT_MD5) {
            self.checksum.helpers.insert("md5".into(), command);
        }
        if let Some(command) = get(ENV_CKSUM_EXT_ADLER32) {
            self.checksum.helpers.insert("adler32".into(), command);
        }
        if let Some(command) = get(ENV_PATH_REWRITE) {
            self.path_rewrite_helper = Some(command);
        }
        if let Some(url) = get(ENV_SPACE_QUOTA_URL) {
            self.space_quota_url = Some(url);
        }
    }

    pub fn validate(&self) -> Result<(), DsiError> {
        if self.block_size == 0 {
            return Err(DsiError::InvalidConfig("block_size must be positive".into()));
        }
        if self.concurrency == 0 {
            return Err(DsiError::InvalidConfig("concurrency must be positive".into()));
        }
        if self.checksum.chunk_limit == 0 {
            return Err(DsiError::InvalidConfig(
                "checksum.chunk_limit must be positive".into(),
            ));
        }
        self.checksum_helpers().map(|_| ())
    }

    pub fn checksum_settings(&self) -> ChecksumSettings {
        ChecksumSettings {
            chunk_limit: self.checksum.chunk_limit,
            mark_interval: Duration::from_secs(self.checksum.mark_interval_secs),
            max_stall_retries: self.checksum.max_stall_retries,
            stall_backoff: Duration::from_millis(self.checksum.stall_backoff_ms),
        }
    }

    /// Parsed helper table. Unknown algorithm names and blank commands are
    /// configuration errors.
    pub fn checksum_helpers(&self) -> Result<Vec<(ChecksumAlgorithm, ExternalHelper)>, DsiError> {
        self.checksum
            .helpers
            .iter()
            .map(|(name, command)| {
                let algorithm = name
                    .parse::<ChecksumAlgorithm>()
                    .map_err(|e| DsiError::InvalidConfig(e.to_string()))?;
                let helper = ExternalHelper::parse(command).ok_or_else(|| {
                    DsiError::InvalidConfig(format!("empty helper command for {name}"))
                })?;
                Ok((algorithm, helper))
            })
            .collect()
    }

    pub fn path_rewrite(&self) -> Option<ExternalHelper> {
        self.path_rewrite_helper
            .as_deref()
            .and_then(ExternalHelper::parse)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let config = DsiConfig::from_toml("").unwrap();
        assert_eq!(config, DsiConfig::default());
        assert_eq!(config.block_size, 256 * 1024);
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.checksum.chunk_limit, 4 * 1024 * 1024);
        assert_eq!(
            config.checksum_settings(),
            ChecksumSettings {
                chunk_limit: 4 * 1024 * 1024,
                mark_interval: Duration::from_secs(5),
                max_stall_retries: 5,
                stall_backoff: Duration::from_millis(2000),
            }
        );
    }

    #[test]
    fn parses_nested_tables() {
        let config = DsiConfig::from_toml(
            r#"
            block_size = 65536
            path_rewrite_helper = "/usr/bin/xrd-cgi --append"

            [checksum]
            mark_interval_secs = 1
            helpers = { adler32 = "/usr/bin/xrdadler32" }
            "#,
        )
        .unwrap();

        assert_eq!(config.block_size, 65536);
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.checksum.mark_interval_secs, 1);
        assert_eq!(config.checksum.max_stall_retries, 5);
        let helpers = config.checksum_helpers().unwrap();
        assert_eq!(helpers.len(), 1);
        assert_eq!(helpers[0].0, ChecksumAlgorithm::Adler32);
        assert_eq!(helpers[0].1.program(), "/usr/bin/xrdadler32");
        assert_eq!(
            config.path_rewrite().unwrap().command_line(),
            "/usr/bin/xrd-cgi --append"
        );
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(
            DsiConfig::from_toml("concurrency = 0"),
            Err(DsiError::InvalidConfig(_))
        ));
        assert!(matches!(
            DsiConfig::from_toml("[checksum.helpers]\ncrc64 = \"x\""),
            Err(DsiError::InvalidConfig(_))
        ));
        assert!(matches!(
            DsiConfig::from_toml("block_size = \"big\""),
            Err(DsiError::ConfigParse(_))
        ));
    }

    #[test]
    fn env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_CKSUM_EXT_MD5, "/opt/md5helper -q"),
            (ENV_CKSUM_EXT_ADLER32, "   "),
            (ENV_PATH_REWRITE, "/opt/rewrite"),
            (ENV_SPACE_QUOTA_URL, "/xrootd/cns"),
        ]
        .into_iter()
        .collect();

        let mut config = DsiConfig::default();
        config
            .checksum
            .helpers
            .insert("adler32".into(), "/from/file".into());
        config.apply_env_with(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.checksum.helpers["md5"], "/opt/md5helper -q");
        assert_eq!(config.checksum.helpers["adler32"], "/from/file");
        assert_eq!(config.path_rewrite_helper.as_deref(), Some("/opt/rewrite"));
        assert_eq!(config.space_quota_url.as_deref(), Some("/xrootd/cns"));
    }

    #[test]
    fn round_trips_through_toml() {
        let mut config = DsiConfig::default();
        config.checksum.helpers.insert("md5".into(), "md5sum".into());
        let text = config.to_toml().unwrap();
        assert_eq!(DsiConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = DsiConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, DsiConfig::default());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dsi.toml");
        std::fs::write(&path, "concurrency = 8\n").unwrap();
        assert_eq!(DsiConfig::load(&path).unwrap().concurrency, 8);
    }
}
