use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use relsync_core::RelSyncResult;

use crate::store::{DirectoryStore, ProfileFieldRecord};

/// Cached catalog of mappable profile fields, keyed by synthetic id `f<id>`.
///
/// Loaded on first use and shared by every profile mapping built from the
/// same factory. Call [`ProfileFieldCatalog::invalidate`] after profile
/// fields change in the store.
pub struct ProfileFieldCatalog {
    store: Arc<dyn DirectoryStore>,
    fields: RwLock<Option<Arc<BTreeMap<String, ProfileFieldRecord>>>>,
}

impl ProfileFieldCatalog {
    pub fn new(store: Arc<dyn DirectoryStore>) -> Self {
        Self {
            store,
            fields: RwLock::new(None),
        }
    }

    /// The catalog, loading it if needed.
    pub async fn fields(&self) -> RelSyncResult<Arc<BTreeMap<String, ProfileFieldRecord>>> {
        if let Some(fields) = self.fields.read().await.as_ref() {
            return Ok(Arc::clone(fields));
        }
        self.refresh().await
    }

    /// Reload the catalog from the store.
    pub async fn refresh(&self) -> RelSyncResult<Arc<BTreeMap<String, ProfileFieldRecord>>> {
        let records = self.store.profile_fields().await?;
        let fields: BTreeMap<_, _> = records
            .into_iter()
            .map(|record| (record.synthetic_id(), record))
            .collect();
        debug!(count = fields.len(), "Loaded profile field catalog");

        let fields = Arc::new(fields);
        *self.fields.write().await = Some(Arc::clone(&fields));
        Ok(fields)
    }

    pub async fn invalidate(&self) {
        *self.fields.write().await = None;
    }

    pub async fn get(&self, synthetic_id: &str) -> RelSyncResult<Option<ProfileFieldRecord>> {
        Ok(self.fields().await?.get(synthetic_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryDirectory;

    #[tokio::test]
    async fn test_catalog_is_cached_until_invalidated() {
        let directory = Arc::new(
            MemoryDirectory::new()
                .with_profile_field(3, "staffno", "Staff number")
                .with_profile_field(5, "badge", "Badge"),
        );
        let catalog = ProfileFieldCatalog::new(directory.clone());

        let fields = catalog.fields().await.unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields["f3"].name, "Staff number");
        assert!(catalog.get("f5").await.unwrap().is_some());
        assert!(catalog.get("f9").await.unwrap().is_none());
        assert_eq!(directory.profile_field_reads(), 1);

        catalog.invalidate().await;
        catalog.fields().await.unwrap();
        assert_eq!(directory.profile_field_reads(), 2);
    }
}
