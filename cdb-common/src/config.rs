//! Configuration loading and data folder resolution
//!
//! Config file resolution follows this priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable `CDB_SYNC_CONFIG`
//! 3. Platform config directory (`<config_dir>/cdb-sync/config.toml`)
//! 4. Compiled defaults (fallback)
//!
//! A handful of environment variables override individual values on top of
//! whatever file was loaded.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "CDB_SYNC_CONFIG";
/// Environment override for the database file
pub const DATABASE_ENV_VAR: &str = "CDB_SYNC_DATABASE";
/// Environment override for the sync-back toggle
pub const SYNC_BACK_ENV_VAR: &str = "CDB_SYNC_BACK";

/// Namespace URI of the legacy schema version documents are produced under
pub const DEFAULT_NAMESPACE_URI: &str = "http://www.cultuurdatabank.com/XMLSchema/CdbXSD/3.3/FINAL";

/// Top-level bridge configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// SQLite database holding the aggregate store, media objects and labels
    pub database_path: Option<PathBuf>,
    pub legacy: LegacyConfig,
    pub media: MediaConfig,
    pub import: ImportConfig,
    pub sync_back: SyncBackConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Legacy system endpoints and credentials
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyConfig {
    /// URL template for event documents, `{id}` is replaced by the identifier
    pub event_url_template: String,
    /// URL template for actor documents, `{id}` is replaced by the identifier
    pub actor_url_template: String,
    /// Namespace URI attached to every fetched document
    pub namespace_uri: String,
    /// Base URL of the legacy write API used by sync-back
    pub write_base_url: String,
    /// Application credentials used when a message carries none of its own
    pub consumer_key: Option<String>,
    pub consumer_secret: Option<String>,
    /// Timeout for every remote call (fetch and write-back)
    pub request_timeout_secs: u64,
}

impl Default for LegacyConfig {
    fn default() -> Self {
        Self {
            event_url_template: "http://localhost:8080/api/v3/event/{id}".to_string(),
            actor_url_template: "http://localhost:8080/api/v3/actor/{id}".to_string(),
            namespace_uri: DEFAULT_NAMESPACE_URI.to_string(),
            write_base_url: "http://localhost:8080/api/v3".to_string(),
            consumer_key: None,
            consumer_secret: None,
            request_timeout_secs: 30,
        }
    }
}

/// Media import defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Used when a legacy media entry has no description
    pub default_description: String,
    /// Used when a legacy media entry has no copyright holder
    pub default_copyright_holder: String,
    /// Optional regex with a named `uuid` group; a matching source URI keeps
    /// the captured UUID as its identity
    pub identifier_pattern: Option<String>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            default_description: "no description".to_string(),
            default_copyright_holder: "no copyright".to_string(),
            identifier_pattern: None,
        }
    }
}

/// Import tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Upper bound on save attempts when writes keep conflicting
    pub save_max_attempts: u32,
    /// Minimum interval between two fetches against the legacy system
    pub fetch_min_interval_ms: u64,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            save_max_attempts: 50,
            fetch_min_interval_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncBackConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:5740".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is not set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration using the documented priority order, then apply
    /// environment overrides and validate.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let mut config = match resolve_config_path(cli_path)? {
            Some(path) => {
                tracing::info!(path = %path.display(), "Loading configuration file");
                Self::from_file(&path)?
            }
            None => {
                tracing::warn!("No configuration file found, using compiled defaults");
                Self::default()
            }
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Apply `CDB_SYNC_DATABASE` and `CDB_SYNC_BACK`
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var(DATABASE_ENV_VAR) {
            if !path.trim().is_empty() {
                self.database_path = Some(PathBuf::from(path));
            }
        }

        if let Ok(value) = std::env::var(SYNC_BACK_ENV_VAR) {
            self.sync_back.enabled = parse_bool(&value).ok_or_else(|| {
                Error::Config(format!("{} must be true/false, got '{}'", SYNC_BACK_ENV_VAR, value))
            })?;
        }

        Ok(())
    }

    /// Reject values that would make every operation fail later
    pub fn validate(&self) -> Result<()> {
        for (name, template) in [
            ("legacy.event_url_template", &self.legacy.event_url_template),
            ("legacy.actor_url_template", &self.legacy.actor_url_template),
        ] {
            if !template.contains("{id}") {
                return Err(Error::Config(format!(
                    "{} must contain an {{id}} placeholder: '{}'",
                    name, template
                )));
            }
        }

        if self.legacy.namespace_uri.trim().is_empty() {
            return Err(Error::Config("legacy.namespace_uri must not be empty".to_string()));
        }

        if self.legacy.consumer_key.is_some() != self.legacy.consumer_secret.is_some() {
            return Err(Error::Config(
                "legacy.consumer_key and legacy.consumer_secret must be set together".to_string(),
            ));
        }

        if self.legacy.request_timeout_secs == 0 {
            return Err(Error::Config("legacy.request_timeout_secs must be > 0".to_string()));
        }

        if self.import.save_max_attempts == 0 {
            return Err(Error::Config("import.save_max_attempts must be > 0".to_string()));
        }

        Ok(())
    }

    /// Database file, falling back to `<data dir>/cdb-sync/bridge.db`
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| get_default_data_folder().join("bridge.db"))
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Find the config file to load, if any
///
/// An explicitly named file (CLI or env) must exist; the platform default is
/// optional.
pub fn resolve_config_path(cli_path: Option<&Path>) -> Result<Option<PathBuf>> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_path {
        return existing(path.to_path_buf()).map(Some);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return existing(PathBuf::from(path)).map(Some);
        }
    }

    // Priority 3: platform config directory
    let platform = dirs::config_dir().map(|d| d.join("cdb-sync").join("config.toml"));
    Ok(platform.filter(|p| p.exists()))
}

fn existing(path: PathBuf) -> Result<PathBuf> {
    if path.exists() {
        Ok(path)
    } else {
        Err(Error::Config(format!("Config file not found: {}", path.display())))
    }
}

/// Get OS-dependent default data folder
fn get_default_data_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/cdb-sync (or /var/lib/cdb-sync for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("cdb-sync"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/cdb-sync"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("cdb-sync"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/cdb-sync"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("cdb-sync"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\cdb-sync"))
    } else {
        PathBuf::from("./cdb-sync-data")
    }
}
