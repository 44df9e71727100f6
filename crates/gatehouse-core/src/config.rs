//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which selects the backend host, the path prefix its routes are mounted
//! under, and which credential model (bearer token or HttpOnly cookie) the
//! client expects.
//!
//! Configuration is stored at `~/.config/gatehouse/config.json`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "gatehouse";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Backend host used when neither the config file nor the environment names one.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Prefix the backend mounts its versioned routes under.
pub const DEFAULT_API_PREFIX: &str = "/api/v1";

/// The backend's `FRONTEND_URL` defaults to `http://localhost:5173`, so the
/// loopback listener takes the same port.
pub const DEFAULT_CALLBACK_PORT: u16 = 5173;

/// How the backend authenticates requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Opaque token sent in an `Authorization: Bearer` header.
    Bearer,
    /// HttpOnly cookie set by the backend and replayed from the cookie jar.
    #[default]
    Cookie,
}

impl AuthMode {
    /// Whether the username/password form is offered.
    pub fn supports_password_login(&self) -> bool {
        matches!(self, AuthMode::Cookie)
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMode::Bearer => write!(f, "bearer"),
            AuthMode::Cookie => write!(f, "cookie"),
        }
    }
}

impl FromStr for AuthMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bearer" | "token" | "jwt" => Ok(AuthMode::Bearer),
            "cookie" => Ok(AuthMode::Cookie),
            other => Err(format!("unknown auth mode '{}' (expected bearer or cookie)", other)),
        }
    }
}

/// Backend paths, already joined with the configured prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub current_user: String,
    pub authorize: String,
    pub callback: String,
    pub cookie_login: String,
    pub cookie_logout: String,
    pub protected: String,
}

impl Endpoints {
    pub fn with_prefix(prefix: &str) -> Self {
        let prefix = normalize_prefix(prefix);
        let join = |path: &str| format!("{}{}", prefix, path);
        Self {
            current_user: join("/users/me"),
            authorize: join("/auth/google/authorize"),
            callback: join("/auth/google/callback"),
            cookie_login: join("/auth/cookie/login"),
            cookie_logout: join("/auth/cookie/logout"),
            protected: join("/authenticated-route"),
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::with_prefix(DEFAULT_API_PREFIX)
    }
}

/// Strip trailing slashes and make sure a non-empty prefix starts with one.
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_url: Option<String>,
    pub api_prefix: Option<String>,
    pub auth_mode: AuthMode,
    pub callback_port: u16,
    pub last_username: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: None,
            api_prefix: None,
            auth_mode: AuthMode::default(),
            callback_port: DEFAULT_CALLBACK_PORT,
            last_username: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Resolve the backend base URL: explicit override (flag or
    /// `GATEHOUSE_API_URL`), then the config file, then the default.
    pub fn api_url(&self, override_url: Option<&str>) -> String {
        let url = override_url
            .filter(|u| !u.trim().is_empty())
            .or(self.api_url.as_deref())
            .unwrap_or(DEFAULT_API_URL);
        url.trim().trim_end_matches('/').to_string()
    }

    pub fn endpoints(&self) -> Endpoints {
        Endpoints::with_prefix(self.api_prefix.as_deref().unwrap_or(DEFAULT_API_PREFIX))
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_default_prefix() {
        let endpoints = Endpoints::default();
        assert_eq!(endpoints.current_user, "/api/v1/users/me");
        assert_eq!(endpoints.authorize, "/api/v1/auth/google/authorize");
        assert_eq!(endpoints.cookie_logout, "/api/v1/auth/cookie/logout");
        assert_eq!(endpoints.protected, "/api/v1/authenticated-route");
    }

    #[test]
    fn test_endpoints_prefix_normalization() {
        assert_eq!(Endpoints::with_prefix("").current_user, "/users/me");
        assert_eq!(Endpoints::with_prefix("/").current_user, "/users/me");
        assert_eq!(Endpoints::with_prefix("api/v2/").callback, "/api/v2/auth/google/callback");
    }

    #[test]
    fn test_auth_mode_parse() {
        assert_eq!("bearer".parse::<AuthMode>(), Ok(AuthMode::Bearer));
        assert_eq!("JWT".parse::<AuthMode>(), Ok(AuthMode::Bearer));
        assert_eq!(" Cookie ".parse::<AuthMode>(), Ok(AuthMode::Cookie));
        assert!("session".parse::<AuthMode>().is_err());
        assert_eq!(AuthMode::Bearer.to_string(), "bearer");
    }

    #[test]
    fn test_api_url_resolution_order() {
        let mut config = Config::default();
        assert_eq!(config.api_url(None), DEFAULT_API_URL);

        config.api_url = Some("https://api.example.com/".to_string());
        assert_eq!(config.api_url(None), "https://api.example.com");
        assert_eq!(config.api_url(Some("http://127.0.0.1:9000")), "http://127.0.0.1:9000");
        // Blank override falls through to the file value
        assert_eq!(config.api_url(Some("  ")), "https://api.example.com");
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config.auth_mode, AuthMode::Cookie);
        assert_eq!(config.callback_port, DEFAULT_CALLBACK_PORT);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"auth_mode":"bearer","api_prefix":""}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.auth_mode, AuthMode::Bearer);
        assert_eq!(config.callback_port, DEFAULT_CALLBACK_PORT);
        assert_eq!(config.endpoints().current_user, "/users/me");
    }

    #[test]
    fn test_save_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            last_username: Some("user@example.com".to_string()),
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.last_username.as_deref(), Some("user@example.com"));
    }
}
