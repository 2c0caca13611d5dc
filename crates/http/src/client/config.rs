//! Client configuration

use super::error::ClientError;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Layered client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// API origin; normalized to end in `/api`
    pub base_url: String,
    /// Upper bound for a single request, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Route the application is sent to when the session expires
    #[serde(default = "default_login_route")]
    pub login_route: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Persist the session in this file instead of memory
    #[serde(default)]
    pub session_file: Option<PathBuf>,
    /// Keep the refresh token in the server's HTTP-only cookie only
    #[serde(default)]
    pub cookie_refresh: bool,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

const fn default_timeout_secs() -> u64 {
    15
}

fn default_login_route() -> String {
    "/login".to_string()
}

fn default_user_agent() -> String {
    concat!("almoner-client/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            login_route: default_login_route(),
            user_agent: default_user_agent(),
            session_file: None,
            cookie_refresh: false,
        }
    }
}

impl ClientConfig {
    /// Load defaults, then `path` if given, then `ALMONER__*` environment
    /// variables
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_layered(path, environment())
    }

    fn load_layered(path: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        builder.add_source(env).build()?.try_deserialize()
    }

    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn environment() -> Environment {
    Environment::with_prefix("ALMONER")
        .separator("__")
        .try_parsing(true)
}

/// Normalize an API origin so it always ends in `/api` without a trailing slash
pub fn normalize_base_url(raw: &str) -> Result<String, ClientError> {
    let trimmed = raw.trim().trim_end_matches('/');
    Url::parse(trimmed)
        .map_err(|e| ClientError::Configuration(format!("invalid base_url `{raw}`: {e}")))?;

    if trimmed.ends_with("/api") {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("{trimmed}/api"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout(), Duration::from_secs(15));
        assert_eq!(config.login_route, "/login");
        assert!(config.user_agent.starts_with("almoner-client/"));
        assert!(config.session_file.is_none());
        assert!(!config.cookie_refresh);
    }

    #[test]
    fn base_url_gets_api_suffix() {
        assert_eq!(
            normalize_base_url("https://example.org").unwrap(),
            "https://example.org/api"
        );
        assert_eq!(
            normalize_base_url("https://example.org/").unwrap(),
            "https://example.org/api"
        );
        assert_eq!(
            normalize_base_url("https://example.org/api/").unwrap(),
            "https://example.org/api"
        );
        assert_eq!(
            normalize_base_url("http://127.0.0.1:8000/api").unwrap(),
            "http://127.0.0.1:8000/api"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(matches!(
            normalize_base_url("not a url"),
            Err(ClientError::Configuration(_))
        ));
    }

    #[test]
    fn load_from_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("almoner.toml");
        std::fs::write(
            &path,
            "base_url = \"https://admin.example.org\"\ntimeout_secs = 5\ncookie_refresh = true\n",
        )
        .unwrap();

        let config = ClientConfig::load(Some(&path)).unwrap();
        assert_eq!(config.base_url, "https://admin.example.org");
        assert_eq!(config.timeout_secs, 5);
        assert!(config.cookie_refresh);
        assert_eq!(config.login_route, "/login");
    }

    #[test]
    fn environment_overrides_file_and_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("almoner.toml");
        std::fs::write(
            &path,
            "base_url = \"https://admin.example.org\"\ntimeout_secs = 5\n",
        )
        .unwrap();

        let vars = config::Map::from_iter([
            ("ALMONER__TIMEOUT_SECS".to_string(), "42".to_string()),
            ("ALMONER__LOGIN_ROUTE".to_string(), "/admin/login".to_string()),
            ("OTHER__TIMEOUT_SECS".to_string(), "7".to_string()),
        ]);
        let config = ClientConfig::load_layered(Some(&path), environment().source(Some(vars)))
            .unwrap();

        assert_eq!(config.timeout_secs, 42);
        assert_eq!(config.login_route, "/admin/login");
        assert_eq!(config.base_url, "https://admin.example.org");
        assert!(!config.cookie_refresh);
    }
}
