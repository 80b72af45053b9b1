//! CLI configuration
//!
//! A TOML file describes both sides of the sync:
//!
//! ```toml
//! [target]
//! database_url = "postgres://relsync@localhost/directory"
//!
//! [external]
//! driver = "mysql"
//! host = "hr-db.internal"
//! database = "hr"
//! username = "reader"
//! table = "relationships"
//! role_field = "relation"
//! subject_field = "parent_id"
//! object_field = "child_id"
//! setup_sql = "SET NAMES utf8"
//!
//! [local]
//! subject = "user_idnumber"
//! object = "user_idnumber"
//! role = "shortname"
//! ```
//!
//! Secrets are better kept out of the file: environment variables override
//! the matching settings after the file is read.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use relsync_connector_database::ExternalSourceConfig;
use relsync_core::RelSyncError;
use relsync_directory::LocalMappingConfig;
use relsync_engine::SyncConfig;

/// Default config file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "relsync.toml";

/// Target store connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// PostgreSQL URL of the target store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    4
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub target: TargetConfig,

    pub external: ExternalSourceConfig,

    pub local: LocalMappingConfig,
}

impl CliConfig {
    /// Load `path` and apply overrides from the process environment.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with(path, |key| std::env::var(key))
    }

    /// Load `path` and apply overrides from a custom variable reader.
    pub fn load_with<F>(path: &Path, reader: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_with(&text, reader)
    }

    /// Parse TOML text, then apply overrides from `reader`.
    ///
    /// This allows tests to supply variables without mutating process-global
    /// environment state.
    pub fn from_toml_with<F>(text: &str, reader: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let mut config: CliConfig = toml::from_str(text)?;
        config.apply_overrides(reader)?;
        config.external.normalized().validate()?;
        config.local.validate()?;
        Ok(config)
    }

    fn apply_overrides<F>(&mut self, reader: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        if let Ok(url) = reader("RELSYNC_DATABASE_URL").or_else(|_| reader("DATABASE_URL")) {
            self.target.database_url = Some(url);
        }

        if let Ok(value) = reader("RELSYNC_MAX_CONNECTIONS") {
            self.target.max_connections = value.parse::<u32>().map_err(|e| {
                ConfigError::InvalidValue("RELSYNC_MAX_CONNECTIONS".into(), e.to_string())
            })?;
        }

        if let Ok(url) = reader("RELSYNC_EXTERNAL_URL") {
            self.external.url = Some(url);
        }

        if let Ok(password) = reader("RELSYNC_EXTERNAL_PASSWORD") {
            self.external.password = Some(password);
        }

        if let Ok(value) = reader("RELSYNC_EXTERNAL_DEBUG") {
            self.external.debug = value.parse::<bool>().map_err(|e| {
                ConfigError::InvalidValue("RELSYNC_EXTERNAL_DEBUG".into(), e.to_string())
            })?;
        }

        if let Ok(component) = reader("RELSYNC_COMPONENT") {
            self.local.component = component;
        }

        Ok(())
    }

    /// The target store URL; required by every command that touches it.
    pub fn database_url(&self) -> Result<&str, ConfigError> {
        self.target
            .database_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".into()))
    }

    pub fn sync_config(&self, dry_run: bool) -> SyncConfig {
        let mut config = SyncConfig::new(self.external.clone(), self.local.clone());
        config.dry_run = dry_run;
        config
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    MissingVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Invalid(#[from] RelSyncError),
}
