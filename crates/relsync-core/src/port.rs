//! Data port capability traits
//!
//! A data port is one side of a sync: the external source of truth or the
//! target store. Both sides are read through [`DataPort`]; only the target
//! store additionally implements [`RelationshipWriter`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{RelSyncError, RelSyncResult};
use crate::ids::{IdentityKey, RoleId};
use crate::model::{Provenance, RelationshipSet, RoleCatalog, Side};

/// The kinds of data port the factory can build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PortKind {
    External,
    Internal,
}

impl PortKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PortKind::External => "EXTERNAL",
            PortKind::Internal => "INTERNAL",
        }
    }

    /// Parse a port tag, case-insensitively.
    ///
    /// `MOODLE` is accepted as a legacy alias of `INTERNAL`.
    pub fn parse(tag: &str) -> RelSyncResult<Self> {
        match tag.trim().to_ascii_uppercase().as_str() {
            "EXTERNAL" => Ok(PortKind::External),
            "INTERNAL" | "MOODLE" => Ok(PortKind::Internal),
            _ => Err(RelSyncError::unknown_port_type(tag)),
        }
    }
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read access to one side of a sync.
#[async_trait]
pub trait DataPort: Send + Sync {
    fn kind(&self) -> PortKind;

    /// Read every relationship where the subject matches `subject_filter`
    /// OR the object matches `object_filter`.
    ///
    /// A missing filter contributes no condition; with both missing the
    /// whole relationship set is returned.
    async fn relationships_in_scope(
        &self,
        subject_filter: Option<&str>,
        object_filter: Option<&str>,
    ) -> RelSyncResult<RelationshipSet>;

    /// Translate a raw field value into the target store's identity key.
    ///
    /// Returns `None` when the value cannot be resolved to exactly one user.
    async fn equivalent_identity_key(&self, value: &str, side: Side) -> Option<IdentityKey>;

    /// Inverse of [`DataPort::equivalent_identity_key`]: the mapped field
    /// value of a user, or `None`.
    async fn mapped_value_for(&self, key: IdentityKey, side: Side) -> Option<String>;

    /// All roles known to this side, keyed by normalized name.
    async fn all_roles(&self) -> RelSyncResult<RoleCatalog>;

    /// Name of the row value holding the role.
    fn role_field_name(&self) -> &str;

    /// Name of the row value holding the subject, as read by
    /// [`DataPort::relationships_in_scope`].
    fn subject_field_name(&self) -> &str;

    /// Name of the row value holding the object.
    fn object_field_name(&self) -> &str;

    /// Release held resources. Idempotent and never fails.
    async fn shutdown(&self);

    /// Write access, for ports that support it.
    fn as_writer(&self) -> Option<&dyn RelationshipWriter> {
        None
    }
}

/// Write access to the target store.
#[async_trait]
pub trait RelationshipWriter: DataPort {
    /// Component tag stamped on assignments created through this writer.
    fn component(&self) -> &str;

    /// Create the assignment of `role` to `subject` in the scope of `object`.
    ///
    /// Creating an assignment that already exists succeeds without a change.
    async fn assign(
        &self,
        role: RoleId,
        subject: IdentityKey,
        object: IdentityKey,
    ) -> RelSyncResult<Provenance>;

    /// Remove an assignment previously read or created.
    async fn unassign(&self, assignment: &Provenance) -> RelSyncResult<()>;

    /// Try to take the run lock. `Ok(false)` means another run holds it.
    async fn try_lock_run(&self) -> RelSyncResult<bool>;

    async fn unlock_run(&self) -> RelSyncResult<()>;
}
