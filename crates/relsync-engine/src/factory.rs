//! Data port factory

use std::sync::Arc;
use tracing::info;

use relsync_connector_database::ExternalDataPort;
use relsync_core::{DataPort, PortKind, RelSyncResult};
use relsync_directory::{DirectoryStore, FieldFactory, InternalDataPort};

use crate::config::SyncConfig;

/// Builds data ports by kind tag.
pub struct PortFactory {
    fields: FieldFactory,
}

impl PortFactory {
    pub fn new(directory: Arc<dyn DirectoryStore>) -> Self {
        Self {
            fields: FieldFactory::new(directory),
        }
    }

    pub fn fields(&self) -> &FieldFactory {
        &self.fields
    }

    /// Build the port for `kind`: `EXTERNAL`, or `INTERNAL` (alias `MOODLE`).
    ///
    /// The external port connects immediately, so connection failures
    /// surface here.
    pub async fn create(&self, kind: &str, config: &SyncConfig) -> RelSyncResult<Arc<dyn DataPort>> {
        let port: Arc<dyn DataPort> = match PortKind::parse(kind)? {
            PortKind::External => Arc::new(ExternalDataPort::connect(config.external.clone()).await?),
            PortKind::Internal => Arc::new(InternalDataPort::new(&config.local, &self.fields).await?),
        };
        info!(kind = %port.kind(), "Data port created");
        Ok(port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relsync_connector_database::ExternalSourceConfig;
    use relsync_core::RelSyncError;
    use relsync_directory::{LocalMappingConfig, MemoryDirectory};

    fn config() -> SyncConfig {
        SyncConfig::new(
            ExternalSourceConfig::sqlite(":memory:", "links")
                .with_setup_sql("CREATE TABLE links (role TEXT, subject TEXT, object TEXT)"),
            LocalMappingConfig::new("user_email", "user_email"),
        )
    }

    fn factory() -> PortFactory {
        PortFactory::new(Arc::new(MemoryDirectory::new()))
    }

    #[tokio::test]
    async fn test_creates_each_kind() {
        let factory = factory();

        let external = factory.create("external", &config()).await.unwrap();
        assert_eq!(external.kind(), PortKind::External);
        assert!(external.as_writer().is_none());
        external.shutdown().await;

        let internal = factory.create("INTERNAL", &config()).await.unwrap();
        assert_eq!(internal.kind(), PortKind::Internal);
        assert!(internal.as_writer().is_some());

        let legacy = factory.create("moodle", &config()).await.unwrap();
        assert_eq!(legacy.kind(), PortKind::Internal);
    }

    #[tokio::test]
    async fn test_unknown_kind() {
        let err = factory().create("ldap", &config()).await.err().unwrap();
        assert!(matches!(err, RelSyncError::UnknownPortType { .. }));
    }
}
