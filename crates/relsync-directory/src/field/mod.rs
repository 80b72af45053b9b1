//! Identity field mappings
//!
//! A field mapping tells the internal data port how an external identifying
//! value (an email, an employee number) maps onto a user in the target
//! store. Each [`FieldKind`] has one implementation; new kinds are added by
//! extending the enum and [`crate::FieldFactory`].

mod catalog;
mod profile;
mod user;

pub use catalog::ProfileFieldCatalog;
pub use profile::ProfileField;
pub use user::UserField;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use relsync_core::{IdentityKey, RelSyncResult};

/// The available kinds of field mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// A column of the user table.
    User,
    /// A custom profile field.
    Profile,
}

impl FieldKind {
    pub const ALL: [FieldKind; 2] = [FieldKind::User, FieldKind::Profile];

    /// Prefix used in mapping names, e.g. `user` in `user_email`.
    pub fn as_str(self) -> &'static str {
        match self {
            FieldKind::User => "user",
            FieldKind::Profile => "profile",
        }
    }

    /// Uppercase label used in field listings.
    pub fn label(self) -> &'static str {
        match self {
            FieldKind::User => "USER",
            FieldKind::Profile => "PROFILE",
        }
    }

    pub fn parse(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == prefix)
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A mappable field as shown to administrators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
}

/// Translation between raw identifying values and identity keys.
#[async_trait]
pub trait IdentityField: Send + Sync + fmt::Debug {
    fn kind(&self) -> FieldKind;

    /// Selected field, or `None` when the mapping is unconfigured.
    fn field_name(&self) -> Option<&str>;

    /// The user whose field equals `value`, if exactly one does.
    async fn equivalent_identity_key(&self, value: &str) -> Option<IdentityKey>;

    /// The field value of `key`, if the user has one.
    async fn mapped_value_for(&self, key: IdentityKey) -> Option<String>;

    /// Every field this kind can map, keyed by field identifier.
    async fn list_mappable_fields(&self) -> RelSyncResult<BTreeMap<String, FieldDescriptor>>;
}

/// Pick the single match of a lookup, logging misses and ambiguity.
pub(crate) fn single_match(
    kind: FieldKind,
    field: &str,
    value: &str,
    matches: RelSyncResult<Vec<IdentityKey>>,
) -> Option<IdentityKey> {
    match matches {
        Ok(keys) if keys.len() == 1 => keys.into_iter().next(),
        Ok(keys) if keys.is_empty() => {
            tracing::debug!(kind = %kind, field = %field, value = %value, "No user matches value");
            None
        }
        Ok(keys) => {
            tracing::warn!(
                kind = %kind,
                field = %field,
                value = %value,
                matches = keys.len(),
                "Value matches several users, treating as unresolved"
            );
            None
        }
        Err(e) => {
            tracing::warn!(kind = %kind, field = %field, value = %value, error = %e, "Identity lookup failed");
            None
        }
    }
}
