// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the session layer.
#[derive(Debug, Clone, clap::Args)]
pub struct SessionConfig {
    /// Base URL of the platform API.
    #[arg(long, default_value = "http://127.0.0.1:3000", env = "SESSIONWARD_BASE_URL")]
    pub base_url: String,

    /// Directory holding the persisted session. Defaults to the user state dir.
    #[arg(long, env = "SESSIONWARD_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Login endpoint path.
    #[arg(long, default_value = "/api/auth/login", env = "SESSIONWARD_LOGIN_PATH")]
    pub login_path: String,

    /// Refresh endpoint path.
    #[arg(long, default_value = "/api/auth/refresh", env = "SESSIONWARD_REFRESH_PATH")]
    pub refresh_path: String,

    /// Logout endpoint path.
    #[arg(long, default_value = "/api/auth/logout", env = "SESSIONWARD_LOGOUT_PATH")]
    pub logout_path: String,

    /// Identity (current user) endpoint path.
    #[arg(long, default_value = "/api/auth/me", env = "SESSIONWARD_IDENTITY_PATH")]
    pub identity_path: String,

    /// Timeout for ordinary requests in milliseconds.
    #[arg(long, default_value_t = 30000, env = "SESSIONWARD_REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: u64,

    /// Timeout for the refresh call in milliseconds. Expiry counts as a failed refresh.
    #[arg(long, default_value_t = 10000, env = "SESSIONWARD_REFRESH_TIMEOUT_MS")]
    pub refresh_timeout_ms: u64,

    /// Seconds before `exp` at which an access token counts as expired.
    #[arg(long, default_value_t = 300, env = "SESSIONWARD_EXPIRY_SKEW_SECS")]
    pub expiry_skew_secs: u64,

    /// Refresh before sending when the access token is inside the skew window.
    #[arg(
        long,
        default_value_t = true,
        action = clap::ArgAction::Set,
        env = "SESSIONWARD_PROACTIVE_REFRESH"
    )]
    pub proactive_refresh: bool,

    /// Login entry point used as the forced-logout redirect target.
    #[arg(long, default_value = "/login", env = "SESSIONWARD_LOGIN_REDIRECT")]
    pub login_redirect: String,

    /// Delay before re-checking identity after starting from a cached profile.
    #[arg(long, default_value_t = 5000, env = "SESSIONWARD_REVALIDATE_DELAY_MS")]
    pub revalidate_delay_ms: u64,

    /// TTL of cached GET responses in milliseconds. 0 disables the cache.
    #[arg(long, default_value_t = 60000, env = "SESSIONWARD_CACHE_TTL_MS")]
    pub cache_ttl_ms: u64,
}

impl SessionConfig {
    /// Config pointing at `base_url` with every other field at its default.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            state_dir: None,
            login_path: "/api/auth/login".to_owned(),
            refresh_path: "/api/auth/refresh".to_owned(),
            logout_path: "/api/auth/logout".to_owned(),
            identity_path: "/api/auth/me".to_owned(),
            request_timeout_ms: 30000,
            refresh_timeout_ms: 10000,
            expiry_skew_secs: 300,
            proactive_refresh: true,
            login_redirect: "/login".to_owned(),
            revalidate_delay_ms: 5000,
            cache_ttl_ms: 60000,
        }
    }

    /// Base URL without a trailing slash.
    pub fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base(), path)
    }

    /// Resolved state directory.
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(default_state_dir)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh_timeout_ms)
    }

    pub fn expiry_skew(&self) -> Duration {
        Duration::from_secs(self.expiry_skew_secs)
    }

    pub fn revalidate_delay(&self) -> Duration {
        Duration::from_millis(self.revalidate_delay_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }
}

/// Resolve the default state directory.
///
/// Checks `$XDG_STATE_HOME/sessionward`, then `$HOME/.local/state/sessionward`.
pub fn default_state_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("sessionward");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local/state/sessionward");
    }
    PathBuf::from(".sessionward")
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
