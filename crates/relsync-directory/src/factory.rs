//! Field mapping factory
//!
//! Mapping names have the form `<kind>_<field>`, for example `user_email`
//! or `profile_f3`. The name is split on its last underscore.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use relsync_core::{normalize_name, RelSyncError, RelSyncResult};

use crate::field::{
    FieldDescriptor, FieldKind, IdentityField, ProfileField, ProfileFieldCatalog, UserField,
};
use crate::store::DirectoryStore;

/// Builds field mappings against one directory store.
pub struct FieldFactory {
    store: Arc<dyn DirectoryStore>,
    catalog: Arc<ProfileFieldCatalog>,
}

impl FieldFactory {
    pub fn new(store: Arc<dyn DirectoryStore>) -> Self {
        let catalog = Arc::new(ProfileFieldCatalog::new(Arc::clone(&store)));
        Self { store, catalog }
    }

    pub fn store(&self) -> &Arc<dyn DirectoryStore> {
        &self.store
    }

    /// Split a mapping name into its kind and field identifier.
    pub fn parse_name(name: &str) -> RelSyncResult<(FieldKind, String)> {
        let name = normalize_name(name);
        let Some((prefix, field_id)) = name.rsplit_once('_') else {
            return Err(RelSyncError::configuration(format!(
                "field mapping '{name}' must have the form <kind>_<field>"
            )));
        };

        let kind = FieldKind::parse(prefix).ok_or_else(|| RelSyncError::unknown_field_class(prefix))?;
        Ok((kind, field_id.to_string()))
    }

    /// Build the mapping named `name`.
    pub async fn create(&self, name: &str) -> RelSyncResult<Box<dyn IdentityField>> {
        let (kind, field_id) = Self::parse_name(name)?;
        debug!(kind = %kind, field = %field_id, "Creating field mapping");
        self.instantiate(kind, Some(&field_id)).await
    }

    async fn instantiate(
        &self,
        kind: FieldKind,
        field_id: Option<&str>,
    ) -> RelSyncResult<Box<dyn IdentityField>> {
        let field: Box<dyn IdentityField> = match kind {
            FieldKind::User => Box::new(UserField::new(field_id, Arc::clone(&self.store))),
            FieldKind::Profile => Box::new(
                ProfileField::new(field_id, Arc::clone(&self.store), Arc::clone(&self.catalog))
                    .await?,
            ),
        };
        Ok(field)
    }

    /// Every mappable field of every kind.
    pub async fn list_all_mappable_fields(
        &self,
    ) -> RelSyncResult<BTreeMap<FieldKind, BTreeMap<String, FieldDescriptor>>> {
        let mut all = BTreeMap::new();
        for kind in FieldKind::ALL {
            let fields = async {
                self.instantiate(kind, None)
                    .await?
                    .list_mappable_fields()
                    .await
            }
            .await
            .map_err(|e| RelSyncError::aggregation(kind.as_str(), e))?;
            all.insert(kind, fields);
        }
        Ok(all)
    }

    /// Mappable fields flattened for configuration forms:
    /// `"<kind>_<field>" => "[KIND] <name>"`.
    pub async fn list_mappable_fields_for_config(&self) -> RelSyncResult<BTreeMap<String, String>> {
        let all = self.list_all_mappable_fields().await?;
        Ok(all
            .into_iter()
            .flat_map(|(kind, fields)| {
                fields.into_values().map(move |field| {
                    (
                        format!("{}_{}", kind.as_str(), field.id),
                        format!("[{}] {}", kind.label(), field.name),
                    )
                })
            })
            .collect())
    }
}
