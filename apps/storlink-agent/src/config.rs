//! Agent configuration loading.
//!
//! The file is TOML in the [`DsiConfig`] layout:
//! - Linux: `~/.config/storlink/agent.toml`
//! - Windows: `%APPDATA%/storlink/agent.toml`

use std::path::{Path, PathBuf};

use anyhow::Context;
use storlink_dsi::DsiConfig;

/// Loads `explicit` or the platform config file, then applies environment
/// overrides. A missing file yields the defaults.
pub fn load(explicit: Option<&Path>) -> anyhow::Result<DsiConfig> {
    let path = explicit.map_or_else(config_path, Path::to_path_buf);
    let mut config = DsiConfig::load(&path)
        .with_context(|| format!("loading configuration from {}", path.display()))?;
    config.apply_env();
    config.validate().context("checking environment overrides")?;
    tracing::debug!(path = %path.display(), "configuration read");
    Ok(config)
}

/// Returns the platform-specific configuration file path.
fn config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("storlink").join("agent.toml")
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("storlink")
            .join("agent.toml")
    }
}
