//! Sync engine
//!
//! One run reconciles the target store against the external source:
//!
//! 1. Scope: optionally restrict both sides to one user.
//! 2. Read the external rows; an empty result ends the run without changes.
//! 3. Read the existing relationships owned by this component.
//! 4. For each external row, resolve role, subject and object. Rows already
//!    present are struck from the existing set; rows that resolve fully are
//!    assigned; the rest are skipped with a warning.
//! 5. Whatever is left of the existing set was not seen in the source and is
//!    removed, provided this component created it.
//!
//! Every step is awaited in order; a run never overlaps its own writes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use relsync_core::{
    normalize_name, relationship_key, DataPort, IdentityKey, RelSyncError, RelSyncResult,
    RelationshipWriter, Side,
};

use crate::report::{RunStatus, SkipReason, SyncEvent, SyncReport};

/// Identity lookups already answered during the current run, misses included.
#[derive(Default)]
struct IdentityCache {
    resolved: HashMap<String, Option<IdentityKey>>,
}

impl IdentityCache {
    async fn resolve(
        &mut self,
        port: &dyn DataPort,
        value: Option<&str>,
        side: Side,
    ) -> Option<IdentityKey> {
        let value = value?;
        if let Some(cached) = self.resolved.get(value) {
            return *cached;
        }
        let key = port.equivalent_identity_key(value, side).await;
        self.resolved.insert(value.to_string(), key);
        key
    }
}

enum Outcome {
    Reconciled,
    NothingToDo,
}

/// Reconciles relationships from an external port into an internal port.
pub struct SyncEngine {
    external: Arc<dyn DataPort>,
    internal: Arc<dyn DataPort>,
    dry_run: bool,
}

impl SyncEngine {
    /// Create an engine. The internal port must support writes.
    pub fn new(external: Arc<dyn DataPort>, internal: Arc<dyn DataPort>) -> RelSyncResult<Self> {
        if internal.as_writer().is_none() {
            return Err(RelSyncError::unsupported(format!(
                "writes on the {} port",
                internal.kind()
            )));
        }
        Ok(Self {
            external,
            internal,
            dry_run: false,
        })
    }

    /// Compute changes without applying them.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    fn writer(&self) -> RelSyncResult<&dyn RelationshipWriter> {
        self.internal
            .as_writer()
            .ok_or_else(|| RelSyncError::unsupported("writes on the internal port"))
    }

    /// Run one sync, for every relationship or only those of `user`.
    ///
    /// Never returns an error: failures end up in the report's status. Both
    /// ports are shut down when the run ends, however it ends, so the engine
    /// is consumed. Build a new one with fresh ports for the next run.
    #[instrument(skip(self), fields(dry_run = self.dry_run))]
    pub async fn sync(self, user: Option<IdentityKey>, verbose: bool) -> SyncReport {
        let mut report = SyncReport::start(user, self.dry_run);
        info!(run_id = %report.run_id, user = ?user, "Starting relationship sync");

        let status = match self.writer() {
            Ok(writer) => self.locked_run(writer, user, verbose, &mut report).await,
            Err(e) => Err(e),
        };

        self.external.shutdown().await;
        self.internal.shutdown().await;

        match status {
            Ok(status) => report.finish(status),
            Err(e) => {
                error!(run_id = %report.run_id, error = %e, code = e.error_code(), "Relationship sync failed");
                report.fail(&e);
            }
        }

        info!(run_id = %report.run_id, "{}", report.summary());
        report
    }

    async fn locked_run(
        &self,
        writer: &dyn RelationshipWriter,
        user: Option<IdentityKey>,
        verbose: bool,
        report: &mut SyncReport,
    ) -> RelSyncResult<RunStatus> {
        if !writer.try_lock_run().await? {
            warn!(component = %writer.component(), "Another sync run holds the lock, giving up");
            return Ok(RunStatus::Locked);
        }

        let outcome = self.reconcile(writer, user, verbose, report).await;

        if let Err(e) = writer.unlock_run().await {
            warn!(error = %e, "Failed to release the run lock");
        }

        Ok(match outcome? {
            Outcome::Reconciled => RunStatus::Completed,
            Outcome::NothingToDo => RunStatus::NothingToDo,
        })
    }

    async fn reconcile(
        &self,
        writer: &dyn RelationshipWriter,
        user: Option<IdentityKey>,
        verbose: bool,
        report: &mut SyncReport,
    ) -> RelSyncResult<Outcome> {
        let internal = self.internal.as_ref();
        let external = self.external.as_ref();

        let (subject_filter, object_filter) = match user {
            Some(user) => {
                let subject = internal.mapped_value_for(user, Side::Subject).await;
                let object = internal.mapped_value_for(user, Side::Object).await;
                if subject.is_none() && object.is_none() {
                    warn!(user = %user, "User has no value for either mapped field, nothing to sync");
                    report.record(SyncEvent::UserNotMapped { user });
                    return Ok(Outcome::NothingToDo);
                }
                (subject, object)
            }
            None => (None, None),
        };

        let external_rows = external
            .relationships_in_scope(subject_filter.as_deref(), object_filter.as_deref())
            .await?;
        report.record(SyncEvent::ExternalRowsRead {
            count: external_rows.len(),
        });
        if verbose {
            info!("{} entries in the external table", external_rows.len());
        }

        if external_rows.is_empty() {
            warn!("External source returned no relationships in scope, leaving the target store untouched");
            report.record(SyncEvent::EmptySource);
            return Ok(Outcome::NothingToDo);
        }

        let user_filter = user.map(|u| u.to_string());
        let mut existing = internal
            .relationships_in_scope(user_filter.as_deref(), user_filter.as_deref())
            .await?;
        report.record(SyncEvent::ExistingAssignmentsRead {
            count: existing.len(),
        });
        if verbose {
            info!("{} role assignment entries found", existing.len());
        }

        let roles = internal.all_roles().await?;
        report.record(SyncEvent::RolesRead { count: roles.len() });
        if verbose {
            info!("{} role entries found", roles.len());
        }

        let role_field = external.role_field_name().to_string();
        let subject_field = external.subject_field_name().to_string();
        let object_field = external.object_field_name().to_string();

        let mut subjects = IdentityCache::default();
        let mut objects = IdentityCache::default();
        let mut seen: HashSet<String> = HashSet::new();

        for row in external_rows.values() {
            let role_name = row.text(&role_field).map(|r| normalize_name(&r)).unwrap_or_default();
            let subject_raw = row.text(&subject_field);
            let object_raw = row.text(&object_field);

            let subject = subjects.resolve(internal, subject_raw.as_deref(), Side::Subject).await;
            let object = objects.resolve(internal, object_raw.as_deref(), Side::Object).await;

            let key = relationship_key(
                &role_name,
                &subject.map(|k| k.to_string()).unwrap_or_default(),
                &object.map(|k| k.to_string()).unwrap_or_default(),
            );

            if verbose {
                info!(row = %row.key, key = %key, "Processing external relationship");
            } else {
                debug!(row = %row.key, key = %key, "Processing external relationship");
            }

            if seen.contains(&key) {
                warn!(key = %key, row = %row.key, "Duplicate relationship in the external source");
                report.record(SyncEvent::AlreadyPresent { key });
                continue;
            }
            if existing.remove(&key).is_some() {
                debug!(key = %key, "Relationship already present");
                seen.insert(key.clone());
                report.record(SyncEvent::AlreadyPresent { key });
                continue;
            }

            let Some(role_id) = roles.get(&role_name).and_then(|role| role.id) else {
                warn!(role = %role_name, row = %row.key, "Unknown role, skipping");
                report.record(SyncEvent::Skipped {
                    key: row.key.clone(),
                    reason: SkipReason::UnknownRole { role: role_name },
                });
                continue;
            };
            let Some(subject) = subject else {
                let value = subject_raw.unwrap_or_default();
                warn!(value = %value, row = %row.key, "Unknown subject, skipping");
                report.record(SyncEvent::Skipped {
                    key: row.key.clone(),
                    reason: SkipReason::UnknownSubject { value },
                });
                continue;
            };
            let Some(object) = object else {
                let value = object_raw.unwrap_or_default();
                warn!(value = %value, row = %row.key, "Unknown object, skipping");
                report.record(SyncEvent::Skipped {
                    key: row.key.clone(),
                    reason: SkipReason::UnknownObject { value },
                });
                continue;
            };

            seen.insert(key.clone());
            if self.dry_run {
                info!(key = %key, "Would assign");
                report.record(SyncEvent::WouldAssign { key });
                continue;
            }

            match writer.assign(role_id, subject, object).await {
                Ok(_) => {
                    info!(key = %key, "Assigning");
                    report.record(SyncEvent::Assigned { key });
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Assignment failed");
                    report.record(SyncEvent::AssignFailed {
                        key,
                        error: e.to_string(),
                    });
                }
            }
        }

        if !existing.is_empty() {
            info!(count = existing.len(), "Deleting relationships no longer in the external source");
        }

        for (key, row) in existing {
            let Some(provenance) = row.provenance else {
                debug!(key = %key, "Relationship without provenance, leaving in place");
                continue;
            };
            if provenance.component != writer.component() {
                debug!(key = %key, component = %provenance.component, "Not created by this component, leaving in place");
                continue;
            }

            if self.dry_run {
                info!(key = %key, "Would unassign");
                report.record(SyncEvent::WouldUnassign { key });
                continue;
            }

            match writer.unassign(&provenance).await {
                Ok(()) => {
                    info!(key = %key, "Unassigning");
                    report.record(SyncEvent::Unassigned { key });
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Unassignment failed");
                    report.record(SyncEvent::UnassignFailed {
                        key,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(Outcome::Reconciled)
    }
}
