//! Relationship data model
//!
//! Both data ports describe their relationships with the same shapes so the
//! engine can diff them by key.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::ids::{ContextId, IdentityKey, RoleId};

/// Component tag written on every assignment this tool creates.
pub const DEFAULT_COMPONENT: &str = "relsync";

/// Separator between the parts of a relationship key.
pub const KEY_SEPARATOR: char = '|';

/// Which end of a relationship a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// The user who holds the role.
    Subject,
    /// The user whose scope the role is held in.
    Object,
}

impl Side {
    /// Lowercase name used in logs and reports.
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Subject => "subject",
            Side::Object => "object",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single column value read from a data store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    /// Render the value as text, or `None` for NULL.
    pub fn as_text(&self) -> Option<String> {
        match self {
            FieldValue::Null => None,
            FieldValue::Boolean(b) => Some(b.to_string()),
            FieldValue::Integer(i) => Some(i.to_string()),
            FieldValue::Float(f) => Some(f.to_string()),
            FieldValue::Text(s) => Some(s.clone()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(FieldValue::Null, Into::into)
    }
}

/// Where an assignment in the target store came from.
///
/// Carries everything needed to remove the assignment again.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Provenance {
    pub role_id: RoleId,
    pub subject: IdentityKey,
    pub object: IdentityKey,
    pub context_id: ContextId,
    /// Component that created the assignment.
    pub component: String,
}

/// One relationship as seen by a data port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipRow {
    /// Uniqueness key of the row within its port.
    pub key: String,
    /// Raw column values, keyed by lowercase column name.
    pub values: BTreeMap<String, FieldValue>,
    /// Set only for relationships read from the target store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
}

impl RelationshipRow {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            values: BTreeMap::new(),
            provenance: None,
        }
    }

    /// Builder: add a column value.
    #[must_use]
    pub fn with_value(mut self, column: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.values.insert(column.into(), value.into());
        self
    }

    /// Builder: attach provenance.
    #[must_use]
    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = Some(provenance);
        self
    }

    pub fn value(&self, column: &str) -> Option<&FieldValue> {
        self.values.get(column)
    }

    /// Column value rendered as text; missing and NULL columns give `None`.
    pub fn text(&self, column: &str) -> Option<String> {
        self.values.get(column).and_then(FieldValue::as_text)
    }
}

/// Relationships keyed by their uniqueness key.
pub type RelationshipSet = BTreeMap<String, RelationshipRow>;

/// A role definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Set by ports that can assign the role.
    pub id: Option<RoleId>,
    /// Value of the configured role field.
    pub name: String,
}

/// Roles keyed by normalized name.
pub type RoleCatalog = BTreeMap<String, Role>;

/// Build a catalog from roles; later duplicates of a normalized name win.
pub fn role_catalog(roles: impl IntoIterator<Item = Role>) -> RoleCatalog {
    roles
        .into_iter()
        .map(|role| (normalize_name(&role.name), role))
        .collect()
}

/// Normalize a role or field name: trimmed and lowercased.
pub fn normalize_name(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Build the diff key `role|subject|object`.
///
/// Unresolved parts are passed as empty strings so that such keys can never
/// collide with a key read from the target store.
pub fn relationship_key(role: &str, subject: &str, object: &str) -> String {
    format!("{role}{KEY_SEPARATOR}{subject}{KEY_SEPARATOR}{object}")
}
