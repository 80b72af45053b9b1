//! Run reports
//!
//! Every run produces a [`SyncReport`] listing what happened in order,
//! independent of how verbose the log output is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use relsync_core::{IdentityKey, RelSyncError};

/// Why an external row was not applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// The role is not defined in the target store.
    UnknownRole { role: String },
    /// The subject value did not resolve to exactly one user.
    UnknownSubject { value: String },
    /// The object value did not resolve to exactly one user.
    UnknownObject { value: String },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::UnknownRole { role } => write!(f, "unknown role '{role}'"),
            SkipReason::UnknownSubject { value } => write!(f, "unknown subject '{value}'"),
            SkipReason::UnknownObject { value } => write!(f, "unknown object '{value}'"),
        }
    }
}

/// One step of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    /// The targeted user has no value for either mapping.
    UserNotMapped { user: IdentityKey },
    ExternalRowsRead { count: usize },
    /// The external source had no rows in scope; nothing was changed.
    EmptySource,
    ExistingAssignmentsRead { count: usize },
    RolesRead { count: usize },
    /// The relationship already exists, or the row repeats an earlier one.
    AlreadyPresent { key: String },
    Skipped {
        key: String,
        #[serde(flatten)]
        reason: SkipReason,
    },
    Assigned { key: String },
    AssignFailed { key: String, error: String },
    Unassigned { key: String },
    UnassignFailed { key: String, error: String },
    /// Dry run: the relationship would have been created.
    WouldAssign { key: String },
    /// Dry run: the relationship would have been removed.
    WouldUnassign { key: String },
}

/// Final state of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    /// The run ended early with nothing to reconcile.
    NothingToDo,
    /// Another run holds the run lock.
    Locked,
    Failed {
        code: String,
        message: String,
        exit_code: i32,
    },
}

impl RunStatus {
    /// Process exit code for this status.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunStatus::Running | RunStatus::Completed | RunStatus::NothingToDo => 0,
            RunStatus::Locked => 3,
            RunStatus::Failed { exit_code, .. } => *exit_code,
        }
    }
}

/// Summary counts of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatistics {
    pub external_rows: usize,
    pub existing: usize,
    pub already_present: usize,
    pub assigned: usize,
    pub unassigned: usize,
    pub skipped: usize,
    pub failed: usize,
    pub planned: usize,
}

/// Outcome of one sync run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    /// The single user the run was scoped to, if any.
    pub user: Option<IdentityKey>,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub events: Vec<SyncEvent>,
}

impl SyncReport {
    pub fn start(user: Option<IdentityKey>, dry_run: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            user,
            dry_run,
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Running,
            events: Vec::new(),
        }
    }

    pub fn record(&mut self, event: SyncEvent) {
        self.events.push(event);
    }

    pub fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: &RelSyncError) {
        self.finish(RunStatus::Failed {
            code: error.error_code().to_string(),
            message: error.to_string(),
            exit_code: error.exit_code(),
        });
    }

    pub fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }

    pub fn statistics(&self) -> SyncStatistics {
        let mut stats = SyncStatistics::default();
        for event in &self.events {
            match event {
                SyncEvent::ExternalRowsRead { count } => stats.external_rows = *count,
                SyncEvent::ExistingAssignmentsRead { count } => stats.existing = *count,
                SyncEvent::AlreadyPresent { .. } => stats.already_present += 1,
                SyncEvent::Assigned { .. } => stats.assigned += 1,
                SyncEvent::Unassigned { .. } => stats.unassigned += 1,
                SyncEvent::Skipped { .. } => stats.skipped += 1,
                SyncEvent::AssignFailed { .. } | SyncEvent::UnassignFailed { .. } => {
                    stats.failed += 1;
                }
                SyncEvent::WouldAssign { .. } | SyncEvent::WouldUnassign { .. } => {
                    stats.planned += 1;
                }
                SyncEvent::UserNotMapped { .. }
                | SyncEvent::EmptySource
                | SyncEvent::RolesRead { .. } => {}
            }
        }
        stats
    }

    /// Skipped rows with their reasons.
    pub fn skipped(&self) -> impl Iterator<Item = (&str, &SkipReason)> {
        self.events.iter().filter_map(|event| match event {
            SyncEvent::Skipped { key, reason } => Some((key.as_str(), reason)),
            _ => None,
        })
    }

    /// One-line human summary.
    pub fn summary(&self) -> String {
        let stats = self.statistics();
        let status = match &self.status {
            RunStatus::Running => "running".to_string(),
            RunStatus::Completed => "completed".to_string(),
            RunStatus::NothingToDo => "nothing to do".to_string(),
            RunStatus::Locked => "locked by another run".to_string(),
            RunStatus::Failed { message, .. } => format!("failed: {message}"),
        };
        format!(
            "run {} {status}: {} external rows, {} assigned, {} unassigned, {} unchanged, {} skipped, {} failed{}",
            self.run_id,
            stats.external_rows,
            stats.assigned,
            stats.unassigned,
            stats.already_present,
            stats.skipped,
            stats.failed,
            if self.dry_run {
                format!(", {} planned (dry run)", stats.planned)
            } else {
                String::new()
            }
        )
    }
}
