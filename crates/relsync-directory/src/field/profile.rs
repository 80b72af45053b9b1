use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

use relsync_core::{IdentityKey, RelSyncResult};

use super::{single_match, FieldDescriptor, FieldKind, IdentityField, ProfileFieldCatalog};
use crate::store::{DirectoryStore, ProfileFieldRecord};

/// Mapping onto a custom profile field.
///
/// Only text fields that are both unique and required can be mapped; they
/// are addressed by their synthetic id `f<id>`.
pub struct ProfileField {
    field: Option<ProfileFieldRecord>,
    store: Arc<dyn DirectoryStore>,
    catalog: Arc<ProfileFieldCatalog>,
}

impl std::fmt::Debug for ProfileField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileField")
            .field("field", &self.field)
            .finish()
    }
}

impl ProfileField {
    /// Select the field with synthetic id `field_id`; an id missing from the
    /// catalog leaves the mapping unconfigured.
    pub async fn new(
        field_id: Option<&str>,
        store: Arc<dyn DirectoryStore>,
        catalog: Arc<ProfileFieldCatalog>,
    ) -> RelSyncResult<Self> {
        let field = match field_id {
            Some(id) => {
                let field = catalog.get(id).await?;
                if field.is_none() {
                    warn!(field = %id, "Unknown or unmappable profile field");
                }
                field
            }
            None => None,
        };

        Ok(Self {
            field,
            store,
            catalog,
        })
    }

    pub fn record(&self) -> Option<&ProfileFieldRecord> {
        self.field.as_ref()
    }
}

#[async_trait]
impl IdentityField for ProfileField {
    fn kind(&self) -> FieldKind {
        FieldKind::Profile
    }

    fn field_name(&self) -> Option<&str> {
        self.field.as_ref().map(|f| f.shortname.as_str())
    }

    async fn equivalent_identity_key(&self, value: &str) -> Option<IdentityKey> {
        let field = self.field.as_ref()?;
        if value.trim().is_empty() {
            return None;
        }
        let matches = self.store.find_users_by_profile_value(field.id, value).await;
        single_match(FieldKind::Profile, &field.shortname, value, matches)
    }

    async fn mapped_value_for(&self, key: IdentityKey) -> Option<String> {
        let field = self.field.as_ref()?;
        match self.store.profile_value(key, field.id).await {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                warn!(user = %key, field = %field.shortname, error = %e, "Failed to read profile value");
                None
            }
        }
    }

    async fn list_mappable_fields(&self) -> RelSyncResult<BTreeMap<String, FieldDescriptor>> {
        let fields = self.catalog.fields().await?;
        Ok(fields
            .iter()
            .map(|(id, record)| {
                (
                    id.clone(),
                    FieldDescriptor {
                        id: id.clone(),
                        name: record.name.clone(),
                        description: record.description.clone(),
                    },
                )
            })
            .collect())
    }
}
