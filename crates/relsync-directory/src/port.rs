//! Internal data port
//!
//! The target store side of a sync. Reads the relationships owned by this
//! tool's component, translates identities through the configured field
//! mappings and writes assignments.
//!
//! Rows returned by [`DataPort::relationships_in_scope`] carry the role
//! value under the role field name, plus `role_id`, `subject_id`,
//! `object_id`, `context_id` and `component`. Subject and object are
//! identity keys, so the subject and object field names are the key columns
//! rather than the mapped user fields.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use relsync_core::{
    normalize_name, relationship_key, role_catalog, DataPort, IdentityKey, PortKind, Provenance,
    RelSyncError, RelSyncResult, RelationshipRow, RelationshipSet, RelationshipWriter, Role,
    RoleCatalog, RoleId, Side,
};

use crate::config::{LocalMappingConfig, RoleField};
use crate::factory::FieldFactory;
use crate::field::IdentityField;
use crate::store::{AssignmentFilter, DirectoryStore};

const SUBJECT_COLUMN: &str = "subject_id";
const OBJECT_COLUMN: &str = "object_id";

/// Derive the advisory lock key for a component tag.
pub fn run_lock_key(component: &str) -> i32 {
    let digest = Sha256::digest(component.as_bytes());
    i32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

fn parse_filter(filter: Option<&str>, side: Side) -> RelSyncResult<Option<IdentityKey>> {
    match filter.map(str::trim).filter(|f| !f.is_empty()) {
        None => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|_| {
            RelSyncError::data_access(format!("{side} filter '{raw}' is not an identity key"))
        }),
    }
}

/// Data port over the target directory store.
pub struct InternalDataPort {
    store: Arc<dyn DirectoryStore>,
    subject: Box<dyn IdentityField>,
    object: Box<dyn IdentityField>,
    role_field: RoleField,
    component: String,
    lock_key: i32,
}

impl std::fmt::Debug for InternalDataPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InternalDataPort")
            .field("subject", &self.subject)
            .field("object", &self.object)
            .field("role_field", &self.role_field)
            .field("component", &self.component)
            .finish()
    }
}

impl InternalDataPort {
    /// Build the port from the local mapping configuration.
    ///
    /// Fails when a mapping name is malformed or does not select a field.
    pub async fn new(config: &LocalMappingConfig, factory: &FieldFactory) -> RelSyncResult<Self> {
        config.validate()?;
        let role_field = config.role_field()?;

        let subject = factory.create(&config.subject).await?;
        let object = factory.create(&config.object).await?;

        for (side, name, field) in [
            (Side::Subject, &config.subject, &subject),
            (Side::Object, &config.object, &object),
        ] {
            if field.field_name().is_none() {
                return Err(RelSyncError::configuration(format!(
                    "local {side} mapping '{name}' does not select a mappable field"
                )));
            }
        }

        let component = config.component.trim().to_string();
        debug!(
            subject = ?subject.field_name(),
            object = ?object.field_name(),
            role_field = %role_field,
            component = %component,
            "Internal data port configured"
        );

        Ok(Self {
            store: Arc::clone(factory.store()),
            subject,
            object,
            role_field,
            lock_key: run_lock_key(&component),
            component,
        })
    }

    fn field(&self, side: Side) -> &dyn IdentityField {
        match side {
            Side::Subject => self.subject.as_ref(),
            Side::Object => self.object.as_ref(),
        }
    }
}

#[async_trait]
impl DataPort for InternalDataPort {
    fn kind(&self) -> PortKind {
        PortKind::Internal
    }

    #[instrument(skip(self), fields(component = %self.component))]
    async fn relationships_in_scope(
        &self,
        subject_filter: Option<&str>,
        object_filter: Option<&str>,
    ) -> RelSyncResult<RelationshipSet> {
        let filter = AssignmentFilter {
            subject: parse_filter(subject_filter, Side::Subject)?,
            object: parse_filter(object_filter, Side::Object)?,
        };

        let records = self.store.assignments(&self.component, filter).await?;

        let mut relationships = RelationshipSet::new();
        for record in records {
            let role_value = self.role_field.value_of(&record.role);
            let p = &record.provenance;
            let key = relationship_key(
                &normalize_name(&role_value),
                &p.subject.to_string(),
                &p.object.to_string(),
            );

            let row = RelationshipRow::new(key.clone())
                .with_value(self.role_field.as_str(), role_value)
                .with_value("role_id", p.role_id.value())
                .with_value(SUBJECT_COLUMN, p.subject.value())
                .with_value(OBJECT_COLUMN, p.object.value())
                .with_value("context_id", p.context_id.value())
                .with_value("component", p.component.clone())
                .with_provenance(record.provenance);
            relationships.insert(key, row);
        }

        Ok(relationships)
    }

    async fn equivalent_identity_key(&self, value: &str, side: Side) -> Option<IdentityKey> {
        self.field(side).equivalent_identity_key(value).await
    }

    async fn mapped_value_for(&self, key: IdentityKey, side: Side) -> Option<String> {
        self.field(side).mapped_value_for(key).await
    }

    async fn all_roles(&self) -> RelSyncResult<RoleCatalog> {
        let records = self.store.roles().await.map_err(RelSyncError::role_fetch)?;
        Ok(role_catalog(records.iter().map(|record| Role {
            id: Some(record.role_id()),
            name: self.role_field.value_of(record),
        })))
    }

    fn role_field_name(&self) -> &str {
        self.role_field.as_str()
    }

    fn subject_field_name(&self) -> &str {
        SUBJECT_COLUMN
    }

    fn object_field_name(&self) -> &str {
        OBJECT_COLUMN
    }

    async fn shutdown(&self) {
        debug!(component = %self.component, "Internal data port shut down");
    }

    fn as_writer(&self) -> Option<&dyn RelationshipWriter> {
        Some(self)
    }
}

#[async_trait]
impl RelationshipWriter for InternalDataPort {
    fn component(&self) -> &str {
        &self.component
    }

    async fn assign(
        &self,
        role: RoleId,
        subject: IdentityKey,
        object: IdentityKey,
    ) -> RelSyncResult<Provenance> {
        let key = format!("{role}|{subject}|{object}");
        let context_id = self
            .store
            .user_context(object)
            .await
            .map_err(|e| RelSyncError::assignment(&key, e))?;

        let assignment = Provenance {
            role_id: role,
            subject,
            object,
            context_id,
            component: self.component.clone(),
        };

        let created = self
            .store
            .insert_assignment(&assignment)
            .await
            .map_err(|e| RelSyncError::assignment(&key, e))?;
        if !created {
            debug!(key = %key, "Assignment already present");
        }

        Ok(assignment)
    }

    async fn unassign(&self, assignment: &Provenance) -> RelSyncResult<()> {
        let key = format!(
            "{}|{}|{}",
            assignment.role_id, assignment.subject, assignment.object
        );
        let removed = self
            .store
            .delete_assignment(assignment)
            .await
            .map_err(|e| RelSyncError::unassignment(&key, e))?;
        if !removed {
            debug!(key = %key, "Assignment already absent");
        }
        Ok(())
    }

    async fn try_lock_run(&self) -> RelSyncResult<bool> {
        let acquired = self.store.try_lock(self.lock_key).await?;
        if acquired {
            info!(component = %self.component, "Run lock acquired");
        }
        Ok(acquired)
    }

    async fn unlock_run(&self) -> RelSyncResult<()> {
        self.store.unlock(self.lock_key).await
    }
}
