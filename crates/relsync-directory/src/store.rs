//! Target store access
//!
//! [`DirectoryStore`] is the narrow set of reads and writes the internal data
//! port needs from the identity store. Two implementations ship with this
//! crate: [`crate::PgDirectory`] and [`crate::MemoryDirectory`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

use relsync_core::{ContextId, IdentityKey, Provenance, RelSyncResult, RoleId};

/// Identity columns of the user table that can be used as a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserColumn {
    Id,
    IdNumber,
    Email,
    Username,
}

impl UserColumn {
    pub const ALL: [UserColumn; 4] = [
        UserColumn::Id,
        UserColumn::IdNumber,
        UserColumn::Email,
        UserColumn::Username,
    ];

    /// Column name in the user table.
    pub fn as_str(self) -> &'static str {
        match self {
            UserColumn::Id => "id",
            UserColumn::IdNumber => "idnumber",
            UserColumn::Email => "email",
            UserColumn::Username => "username",
        }
    }

    /// Human-readable description shown when listing mappable fields.
    pub fn description(self) -> &'static str {
        match self {
            UserColumn::Id => "ID column of the user table",
            UserColumn::IdNumber => "ID number column of the user table",
            UserColumn::Email => "Email column of the user table",
            UserColumn::Username => "Username column of the user table",
        }
    }

    /// Look up a column by name, case-insensitively.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim().to_lowercase();
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

impl fmt::Display for UserColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A custom profile field definition.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ProfileFieldRecord {
    pub id: i64,
    pub shortname: String,
    pub name: String,
    pub description: String,
}

impl ProfileFieldRecord {
    /// Synthetic identifier used in mapping names, `f<id>`.
    pub fn synthetic_id(&self) -> String {
        format!("f{}", self.id)
    }
}

/// A role definition.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct RoleRecord {
    pub id: i64,
    pub shortname: String,
    pub name: String,
}

impl RoleRecord {
    pub fn role_id(&self) -> RoleId {
        RoleId::new(self.id)
    }
}

/// An assignment read back from the store, with its role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentRecord {
    pub role: RoleRecord,
    pub provenance: Provenance,
}

/// Restricts an assignment read to a user.
///
/// An assignment matches when its subject equals `subject` OR its object
/// equals `object`. With neither set every assignment matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssignmentFilter {
    pub subject: Option<IdentityKey>,
    pub object: Option<IdentityKey>,
}

impl AssignmentFilter {
    pub fn matches(&self, subject: IdentityKey, object: IdentityKey) -> bool {
        if self.subject.is_none() && self.object.is_none() {
            return true;
        }
        self.subject == Some(subject) || self.object == Some(object)
    }
}

/// Reads and writes against the identity store.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    /// Users whose `column` equals `value`.
    async fn find_users_by_column(
        &self,
        column: UserColumn,
        value: &str,
    ) -> RelSyncResult<Vec<IdentityKey>>;

    /// Value of `column` for a user, `None` if the user does not exist.
    async fn user_column_value(
        &self,
        user: IdentityKey,
        column: UserColumn,
    ) -> RelSyncResult<Option<String>>;

    /// Profile fields that are text, unique and required, in display order.
    async fn profile_fields(&self) -> RelSyncResult<Vec<ProfileFieldRecord>>;

    /// Users whose value for profile field `field_id` equals `value`.
    async fn find_users_by_profile_value(
        &self,
        field_id: i64,
        value: &str,
    ) -> RelSyncResult<Vec<IdentityKey>>;

    async fn profile_value(&self, user: IdentityKey, field_id: i64)
        -> RelSyncResult<Option<String>>;

    async fn roles(&self) -> RelSyncResult<Vec<RoleRecord>>;

    /// Assignments created by `component` in user scopes.
    async fn assignments(
        &self,
        component: &str,
        filter: AssignmentFilter,
    ) -> RelSyncResult<Vec<AssignmentRecord>>;

    /// Scope of a user, created on first use.
    async fn user_context(&self, user: IdentityKey) -> RelSyncResult<ContextId>;

    /// Insert an assignment. Returns `false` if it already existed.
    async fn insert_assignment(&self, assignment: &Provenance) -> RelSyncResult<bool>;

    /// Delete an assignment. Returns `false` if it did not exist.
    async fn delete_assignment(&self, assignment: &Provenance) -> RelSyncResult<bool>;

    /// Try to take the advisory lock `key` without waiting.
    async fn try_lock(&self, key: i32) -> RelSyncResult<bool>;

    async fn unlock(&self, key: i32) -> RelSyncResult<()>;
}
