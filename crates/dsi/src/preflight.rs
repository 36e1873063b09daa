//! Receive pre-flight checks: space-token quota and path rewriting.

use storlink_checksum::ExternalHelper;
use storlink_transfer::{Admission, Preflight};
use tracing::{debug, warn};

/// Space group used when the path names no token.
pub const DEFAULT_SPACE_GROUP: &str = "public";

/// The space token named by the path's query (`/path?spacetoken=TOKEN`),
/// or [`DEFAULT_SPACE_GROUP`].
pub fn space_token(path: &str) -> &str {
    path.split_once('?')
        .and_then(|(_, query)| query.split('&').next())
        .and_then(|param| param.split_once('='))
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_SPACE_GROUP)
}

/// Usage figures for one space group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpaceAttributes {
    pub used: u64,
    pub quota: u64,
}

impl SpaceAttributes {
    /// Parses an `&`-separated `key=value` list, reading `oss.used` and
    /// `oss.quota`. Missing or malformed figures count as zero.
    pub fn parse(attributes: &str) -> Self {
        let mut space = Self::default();
        for pair in attributes.split('&') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            let value = value.trim().parse().unwrap_or(0);
            match key.trim() {
                "oss.used" => space.used = value,
                "oss.quota" => space.quota = value,
                _ => {}
            }
        }
        space
    }

    pub fn is_exceeded(&self) -> bool {
        self.used > self.quota
    }
}

/// Source of space-group attribute strings.
pub trait SpaceUsage: Send + Sync {
    /// Raw attributes for `group`; `None` when the backend has none.
    fn space_attributes(&self, group: &str) -> Option<String>;
}

/// Denies receives into a space group whose usage exceeds its quota.
pub struct SpaceQuotaCheck<U> {
    usage: U,
}

impl<U: SpaceUsage> SpaceQuotaCheck<U> {
    pub fn new(usage: U) -> Self {
        Self { usage }
    }
}

impl<U: SpaceUsage> Preflight for SpaceQuotaCheck<U> {
    fn admit(&self, path: &str) -> Admission {
        let group = space_token(path);
        let Some(attributes) = self.usage.space_attributes(group) else {
            debug!(group, "no space attributes, skipping quota check");
            return Admission::Allow;
        };
        let space = SpaceAttributes::parse(&attributes);
        if space.is_exceeded() {
            warn!(path, group, used = space.used, quota = space.quota, "space quota exceeded");
            Admission::Deny(format!("quota exceeded for space token {group}"))
        } else {
            Admission::Allow
        }
    }
}

/// Reads the `xroot.space` extended attribute of
/// `<base_url>/?oss.cgroup=<group>`.
#[cfg(target_os = "linux")]
pub struct XattrSpaceUsage {
    base_url: String,
}

#[cfg(target_os = "linux")]
impl XattrSpaceUsage {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[cfg(target_os = "linux")]
impl SpaceUsage for XattrSpaceUsage {
    fn space_attributes(&self, group: &str) -> Option<String> {
        use std::ffi::CString;

        let target = CString::new(format!("{}/?oss.cgroup={group}", self.base_url)).ok()?;
        let name = CString::new("xroot.space").ok()?;
        let mut buf = vec![0u8; 1024];
        // SAFETY: both strings are NUL-terminated and `buf` is writable for
        // `buf.len()` bytes.
        let n = unsafe {
            libc::getxattr(
                target.as_ptr(),
                name.as_ptr(),
                buf.as_mut_ptr().cast(),
                buf.len(),
            )
        };
        if n <= 0 {
            return None;
        }
        buf.truncate(n as usize);
        Some(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// Opens the first output token of a helper run against the requested
/// path. Falls back to the requested path when the helper fails.
pub struct PathRewrite {
    helper: ExternalHelper,
}

impl PathRewrite {
    pub fn new(helper: ExternalHelper) -> Self {
        Self { helper }
    }
}

impl Preflight for PathRewrite {
    fn admit(&self, path: &str) -> Admission {
        match self.helper.run(path) {
            Ok(target) => Admission::Redirect(target),
            Err(error) => {
                warn!(path, %error, "path rewrite failed, using the requested path");
                Admission::Allow
            }
        }
    }
}
