//! CLI configuration utilities

use almoner_http::ClientConfig;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Command line values that take precedence over every configuration source
#[derive(Debug, Default)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// Resolve the data directory: explicit flag/env, then the platform data dir
pub fn data_dir(explicit: Option<PathBuf>) -> PathBuf {
    explicit.unwrap_or_else(|| {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("almoner")
    })
}

/// Load the client configuration and apply command line overrides.
///
/// The session is always persisted; it defaults to `<data_dir>/session.json`.
pub fn load_client_config(
    path: Option<&Path>,
    data_dir: &Path,
    overrides: Overrides,
) -> Result<ClientConfig> {
    let mut config = ClientConfig::load(path).with_context(|| match path {
        Some(path) => format!("Failed to load configuration from {}", path.display()),
        None => "Failed to load configuration".to_string(),
    })?;

    if let Some(base_url) = overrides.base_url {
        config.base_url = base_url;
    }
    if let Some(timeout_secs) = overrides.timeout_secs {
        config.timeout_secs = timeout_secs;
    }
    if config.session_file.is_none() {
        config.session_file = Some(session_file_path(data_dir));
    }

    Ok(config)
}

fn session_file_path(data_dir: &Path) -> PathBuf {
    data_dir.join("session.json")
}
