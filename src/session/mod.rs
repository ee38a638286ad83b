//! Session cache for cookie-based provider logins.
//!
//! The cookie jar of a provider is persisted between process invocations so
//! that a later run can replay it and skip the login form entirely. The blob
//! lives under the system temporary directory and carries no format version:
//! a stale session is detected by the provider's probe, not by this cache.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, SET_COOKIE};
use serde::{Deserialize, Serialize};

/// Session data for a provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    /// Session cookies (name -> value).
    #[serde(default)]
    pub cookies: BTreeMap<String, String>,

    /// When the session was captured (Unix timestamp).
    #[serde(default)]
    pub captured_at: Option<i64>,
}

impl SessionData {
    /// Create a new empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a cookie.
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Format cookies as a Cookie header value.
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Fold the `Set-Cookie` headers of a response into the jar.
    ///
    /// Attributes (`Path`, `Expires`, ...) are dropped. A cookie set to an
    /// empty value is removed, which is how backends clear a session.
    pub fn absorb_set_cookies(&mut self, headers: &HeaderMap) {
        for raw in headers.get_all(SET_COOKIE) {
            let Ok(raw) = raw.to_str() else {
                continue;
            };
            let pair = raw.split(';').next().unwrap_or_default();
            let Some((name, value)) = pair.split_once('=') else {
                continue;
            };
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            let value = value.trim();
            if value.is_empty() {
                self.cookies.remove(name);
            } else {
                self.cookies.insert(name.to_string(), value.to_string());
            }
        }
    }
}

/// Cache for session data, stored locally under the temporary directory.
#[derive(Debug, Clone)]
pub struct SessionCache {
    cache_dir: PathBuf,
}

impl SessionCache {
    /// Create a session cache in the system temporary directory.
    pub fn new() -> Self {
        Self {
            cache_dir: std::env::temp_dir(),
        }
    }

    /// Create a session cache at a custom location.
    pub fn with_path(cache_dir: impl AsRef<Path>) -> Result<Self> {
        let cache_dir = cache_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&cache_dir)
            .with_context(|| format!("Failed to create session cache dir: {cache_dir:?}"))?;
        Ok(Self { cache_dir })
    }

    /// Location of the blob for `key`.
    pub fn session_file(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!(".{key}.cookie"))
    }

    /// Load session data for a provider.
    pub fn get(&self, key: &str) -> Result<Option<SessionData>> {
        let path = self.session_file(key);
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read session file: {path:?}"))?;

        let session: SessionData = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse session file: {path:?}"))?;

        Ok(Some(session))
    }

    /// Save session data for a provider.
    pub fn set(&self, key: &str, session: &SessionData) -> Result<()> {
        let path = self.session_file(key);
        let content =
            serde_json::to_string_pretty(session).context("Failed to serialize session")?;

        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write session file: {path:?}"))?;

        Ok(())
    }

    /// Delete session data for a provider.
    pub fn delete(&self, key: &str) -> Result<()> {
        let path = self.session_file(key);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to delete session file: {path:?}"))?;
        }
        Ok(())
    }
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new()
    }
}
