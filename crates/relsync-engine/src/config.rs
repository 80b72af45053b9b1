//! Sync configuration

use serde::{Deserialize, Serialize};

use relsync_connector_database::ExternalSourceConfig;
use relsync_core::RelSyncResult;
use relsync_directory::LocalMappingConfig;

/// Everything needed to build both data ports of a sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// The external relationship table.
    pub external: ExternalSourceConfig,

    /// How the target store side is mapped.
    pub local: LocalMappingConfig,

    /// Compute the changes without applying them.
    #[serde(default)]
    pub dry_run: bool,
}

impl SyncConfig {
    pub fn new(external: ExternalSourceConfig, local: LocalMappingConfig) -> Self {
        Self {
            external,
            local,
            dry_run: false,
        }
    }

    pub fn validate(&self) -> RelSyncResult<()> {
        self.external.normalized().validate()?;
        self.local.validate()
    }

    /// Copy with secrets masked, for logging.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        config.external = self.external.redacted();
        config
    }
}
