//! Process-wide configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.leadable/
//!   config.yaml   (mode 0600: holds the OAuth client secret)
//! ```
//!
//! # API pattern
//!
//! Every function that touches disk has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const GOOGLE_AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_SCOPES: &str =
    "https://www.googleapis.com/auth/spreadsheets https://www.googleapis.com/auth/drive.readonly";

/// Settings shared by every sync in the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub graph_api_base: String,
    pub sheets_api_base: String,
    pub drive_api_base: String,
    /// Upper bound on any single HTTP call.
    pub request_timeout_secs: u64,
    /// Fixed delay after a recoverable cycle failure.
    pub backoff_secs: u64,
    /// How long `stop` waits for a task before aborting it.
    pub stop_grace_ms: u64,
    /// Page cap when following lead pagination.
    pub max_lead_pages: u32,
    pub oauth: OAuthConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            graph_api_base: "https://graph.facebook.com/v20.0".to_string(),
            sheets_api_base: "https://sheets.googleapis.com/v4".to_string(),
            drive_api_base: "https://www.googleapis.com/drive/v3".to_string(),
            request_timeout_secs: 30,
            backoff_secs: 300,
            stop_grace_ms: 1_000,
            max_lead_pages: 10,
            oauth: OAuthConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

/// Google OAuth client registration. Only the consent URL is built here;
/// exchanging the code for a token happens outside the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: "http://localhost:8000/callback".to_string(),
        }
    }
}

impl OAuthConfig {
    /// Consent URL requesting spreadsheet read/write and drive read scopes.
    pub fn authorization_url(&self) -> String {
        format!(
            "{GOOGLE_AUTH_ENDPOINT}?client_id={}&redirect_uri={}&scope={}&response_type=code&access_type=offline",
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(GOOGLE_SCOPES),
        )
    }
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// `<home>/.leadable/`
pub fn leadable_root(home: &Path) -> PathBuf {
    home.join(".leadable")
}

/// `<home>/.leadable/config.yaml`: pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    leadable_root(home).join("config.yaml")
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// Load the config, falling back to defaults when the file is absent.
///
/// Returns `ConfigError::Parse` (with path) if the YAML is malformed.
pub fn load_at(home: &Path) -> Result<AppConfig, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = std::fs::read_to_string(&path)?;
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<AppConfig, ConfigError> {
    load_at(&home()?)
}

/// Atomically save the config.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    let root = leadable_root(home);
    if !root.exists() {
        std::fs::create_dir_all(&root)?;
        set_dir_permissions(&root)?;
    }
    let path = config_path_at(home);
    let tmp_path = path.with_file_name("config.yaml.tmp");

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// `save_at` convenience wrapper.
pub fn save(config: &AppConfig) -> Result<(), ConfigError> {
    save_at(&home()?, config)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
