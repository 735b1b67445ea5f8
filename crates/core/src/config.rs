//! Client configuration loaded from `~/.config/tourbook/config.toml`.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Directory under the user's config dir holding all client state.
pub const CONFIG_DIR: &str = "tourbook";

const CONFIG_FILE: &str = "config.toml";
const SESSION_FILE: &str = "session.json";

const DEFAULT_CONFIG: &str = r#"# TourBook client configuration.
# Every key is optional; TOURBOOK_* environment variables override this file
# (use a double underscore for nesting, e.g. TOURBOOK_API__BASE_URL).

[api]
base_url = "http://localhost:8000"
timeout_secs = 15

[api.endpoints]
login = "/api/v1/auth/login/"
current_user = "/api/v1/auth/me/"
register = "/api/v1/auth/register/"
profile = "/api/v1/auth/profile/"
tours = "/api/v1/tours/"
bookings = "/api/v1/bookings/"
cancellations = "/api/v1/bookings/cancellations/"
custom_packages = "/api/v1/tours/custom-packages/"
"#;

/// Top-level client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// REST API settings.
    pub api: ApiConfig,
    /// Location of the persisted session file. Defaults to the config dir.
    pub session_path: Option<PathBuf>,
}

/// REST API connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    /// Scheme and host of the API, without a trailing path.
    pub base_url: String,
    /// Per-request timeout in seconds. `0` disables the timeout.
    pub timeout_secs: u64,
    /// Endpoint paths relative to `base_url`.
    pub endpoints: Endpoints,
}

/// Endpoint paths for every API operation the client performs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Endpoints {
    pub login: String,
    pub current_user: String,
    pub register: String,
    pub profile: String,
    /// Collection path; tour detail is `{tours}{id}/`.
    pub tours: String,
    pub bookings: String,
    pub cancellations: String,
    pub custom_packages: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 15,
            endpoints: Endpoints::default(),
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            login: "/api/v1/auth/login/".to_string(),
            current_user: "/api/v1/auth/me/".to_string(),
            register: "/api/v1/auth/register/".to_string(),
            profile: "/api/v1/auth/profile/".to_string(),
            tours: "/api/v1/tours/".to_string(),
            bookings: "/api/v1/bookings/".to_string(),
            cancellations: "/api/v1/bookings/cancellations/".to_string(),
            custom_packages: "/api/v1/tours/custom-packages/".to_string(),
        }
    }
}

impl ApiConfig {
    /// Request timeout, if one is configured.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    /// Join an endpoint path onto the base URL.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl AppConfig {
    /// Load configuration from the default file plus environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    /// Load configuration from `path` (optional) plus environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix("TOURBOOK")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("failed to read config {}", path.display()))?;

        settings
            .try_deserialize()
            .with_context(|| format!("failed to parse config {}", path.display()))
    }

    /// Resolved path of the persisted session file.
    pub fn session_file(&self) -> PathBuf {
        self.session_path
            .clone()
            .unwrap_or_else(|| config_root().join(SESSION_FILE))
    }
}

/// Root directory for client configuration and state.
pub fn config_root() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR)
}

/// Default config file location.
pub fn config_path() -> PathBuf {
    config_root().join(CONFIG_FILE)
}

/// Write the default config file when none exists yet.
pub fn ensure_default_config() -> Result<()> {
    write_default_config(&config_path())
}

fn write_default_config(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }
    fs::write(path, DEFAULT_CONFIG)
        .with_context(|| format!("failed to write default config {}", path.display()))?;
    info!(path = %path.display(), "wrote default configuration");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_file_matches_builtin_defaults() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nested").join(CONFIG_FILE);
        write_default_config(&path)?;
        assert!(path.is_file());

        let loaded = AppConfig::load_from(&path)?;
        assert_eq!(loaded.api, ApiConfig::default());
        assert_eq!(loaded.session_path, None);
        Ok(())
    }

    #[test]
    fn missing_file_falls_back_to_defaults() -> Result<()> {
        let dir = tempdir()?;
        let loaded = AppConfig::load_from(&dir.path().join("absent.toml"))?;
        assert_eq!(loaded.api.endpoints.login, "/api/v1/auth/login/");
        assert_eq!(loaded.api.timeout(), Some(Duration::from_secs(15)));
        Ok(())
    }

    #[test]
    fn file_overrides_selected_keys() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join(CONFIG_FILE);
        fs::write(
            &path,
            r#"
session_path = "/tmp/tourbook-session.json"

[api]
base_url = "https://tours.example.com/"
timeout_secs = 0

[api.endpoints]
current_user = "/api/me/"
"#,
        )?;

        let loaded = AppConfig::load_from(&path)?;
        assert_eq!(loaded.api.base_url, "https://tours.example.com/");
        assert_eq!(loaded.api.timeout(), None);
        assert_eq!(loaded.api.endpoints.current_user, "/api/me/");
        assert_eq!(loaded.api.endpoints.tours, "/api/v1/tours/");
        assert_eq!(
            loaded.session_file(),
            PathBuf::from("/tmp/tourbook-session.json")
        );
        assert_eq!(
            loaded.api.url(&loaded.api.endpoints.current_user),
            "https://tours.example.com/api/me/"
        );
        Ok(())
    }

    #[test]
    fn existing_file_is_not_overwritten() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "[api]\ntimeout_secs = 3\n")?;
        write_default_config(&path)?;
        assert_eq!(fs::read_to_string(&path)?, "[api]\ntimeout_secs = 3\n");
        Ok(())
    }
}
