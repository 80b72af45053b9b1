use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

use relsync_core::{IdentityKey, RelSyncResult};

use super::{single_match, FieldDescriptor, FieldKind, IdentityField};
use crate::store::{DirectoryStore, UserColumn};

/// Mapping onto one of the user table's identity columns.
pub struct UserField {
    column: Option<UserColumn>,
    store: Arc<dyn DirectoryStore>,
}

impl std::fmt::Debug for UserField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserField")
            .field("column", &self.column)
            .finish()
    }
}

impl UserField {
    /// Select the column named `field_id`; an unknown name leaves the
    /// mapping unconfigured.
    pub fn new(field_id: Option<&str>, store: Arc<dyn DirectoryStore>) -> Self {
        let column = field_id.and_then(|id| {
            let column = UserColumn::parse(id);
            if column.is_none() {
                warn!(field = %id, "Unknown user column");
            }
            column
        });
        Self { column, store }
    }
}

#[async_trait]
impl IdentityField for UserField {
    fn kind(&self) -> FieldKind {
        FieldKind::User
    }

    fn field_name(&self) -> Option<&str> {
        self.column.map(UserColumn::as_str)
    }

    async fn equivalent_identity_key(&self, value: &str) -> Option<IdentityKey> {
        let column = self.column?;
        if value.trim().is_empty() {
            return None;
        }
        let matches = self.store.find_users_by_column(column, value).await;
        single_match(FieldKind::User, column.as_str(), value, matches)
    }

    async fn mapped_value_for(&self, key: IdentityKey) -> Option<String> {
        let column = self.column?;
        match self.store.user_column_value(key, column).await {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                warn!(user = %key, column = %column, error = %e, "Failed to read user column");
                None
            }
        }
    }

    async fn list_mappable_fields(&self) -> RelSyncResult<BTreeMap<String, FieldDescriptor>> {
        Ok(UserColumn::ALL
            .into_iter()
            .map(|column| {
                (
                    column.as_str().to_string(),
                    FieldDescriptor {
                        id: column.as_str().to_string(),
                        name: column.as_str().to_string(),
                        description: column.description().to_string(),
                    },
                )
            })
            .collect())
    }
}
