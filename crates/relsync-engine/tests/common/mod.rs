//! Shared fixtures for sync engine tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use relsync_core::{
    normalize_name, role_catalog, DataPort, IdentityKey, PortKind, RelSyncError, RelSyncResult,
    RelationshipRow, RelationshipSet, Role, RoleCatalog, Side,
};
use relsync_directory::{FieldFactory, InternalDataPort, LocalMappingConfig, MemoryDirectory};
use relsync_engine::SyncEngine;

/// External port serving a fixed list of `(role, subject, object)` rows.
pub struct StaticSource {
    rows: Mutex<Vec<(String, String, String)>>,
    fail_reads: AtomicBool,
    shutdown_calls: AtomicUsize,
    read_calls: AtomicUsize,
    filters: Mutex<Vec<(Option<String>, Option<String>)>>,
}

impl StaticSource {
    pub fn new(rows: &[(&str, &str, &str)]) -> Self {
        Self {
            rows: Mutex::new(
                rows.iter()
                    .map(|(r, s, o)| (r.to_string(), s.to_string(), o.to_string()))
                    .collect(),
            ),
            fail_reads: AtomicBool::new(false),
            shutdown_calls: AtomicUsize::new(0),
            read_calls: AtomicUsize::new(0),
            filters: Mutex::new(Vec::new()),
        }
    }

    pub fn with_read_error(self) -> Self {
        self.fail_reads.store(true, Ordering::SeqCst);
        self
    }

    pub fn set_rows(&self, rows: &[(&str, &str, &str)]) {
        *self.rows.lock().unwrap() = rows
            .iter()
            .map(|(r, s, o)| (r.to_string(), s.to_string(), o.to_string()))
            .collect();
    }

    pub fn shutdown_calls(&self) -> usize {
        self.shutdown_calls.load(Ordering::SeqCst)
    }

    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    pub fn last_filters(&self) -> Option<(Option<String>, Option<String>)> {
        self.filters.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl DataPort for StaticSource {
    fn kind(&self) -> PortKind {
        PortKind::External
    }

    async fn relationships_in_scope(
        &self,
        subject_filter: Option<&str>,
        object_filter: Option<&str>,
    ) -> RelSyncResult<RelationshipSet> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        self.filters.lock().unwrap().push((
            subject_filter.map(str::to_string),
            object_filter.map(str::to_string),
        ));
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(RelSyncError::data_access("external table is gone"));
        }

        let unfiltered = subject_filter.is_none() && object_filter.is_none();
        let rows = self.rows.lock().unwrap().clone();
        Ok(rows
            .into_iter()
            .filter(|(_, s, o)| {
                unfiltered || subject_filter == Some(s.as_str()) || object_filter == Some(o.as_str())
            })
            .map(|(r, s, o)| {
                let key = format!("{r}|{s}|{o}");
                let row = RelationshipRow::new(key.clone())
                    .with_value("role", r)
                    .with_value("subject", s)
                    .with_value("object", o);
                (key, row)
            })
            .collect())
    }

    async fn equivalent_identity_key(&self, _value: &str, _side: Side) -> Option<IdentityKey> {
        None
    }

    async fn mapped_value_for(&self, _key: IdentityKey, _side: Side) -> Option<String> {
        None
    }

    async fn all_roles(&self) -> RelSyncResult<RoleCatalog> {
        let rows = self.rows.lock().unwrap().clone();
        Ok(role_catalog(rows.into_iter().map(|(r, _, _)| Role {
            id: None,
            name: normalize_name(&r),
        })))
    }

    fn role_field_name(&self) -> &str {
        "role"
    }

    fn subject_field_name(&self) -> &str {
        "subject"
    }

    fn object_field_name(&self) -> &str {
        "object"
    }

    async fn shutdown(&self) {
        self.shutdown_calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Users alice(10), bob(20), carol(30), dave(40) mapped by username;
/// roles mentor(5), tutor(6), parent(7).
pub fn directory() -> MemoryDirectory {
    MemoryDirectory::new()
        .with_user(10, "E10", "alice@x", "alice")
        .with_user(20, "E20", "bob@x", "bob")
        .with_user(30, "E30", "carol@x", "carol")
        .with_user(40, "E40", "dave@x", "dave")
        .with_role(5, "mentor", "Mentor")
        .with_role(6, "tutor", "Tutor")
        .with_role(7, "parent", "Parent")
}

pub async fn internal_port(directory: Arc<MemoryDirectory>) -> Arc<InternalDataPort> {
    let factory = FieldFactory::new(directory);
    let config = LocalMappingConfig::new("user_username", "user_username");
    Arc::new(InternalDataPort::new(&config, &factory).await.unwrap())
}

pub async fn engine(source: Arc<StaticSource>, directory: Arc<MemoryDirectory>) -> SyncEngine {
    SyncEngine::new(source, internal_port(directory).await).unwrap()
}

/// Keys `role_id|subject|object` of every stored assignment of `component`.
pub async fn owned(directory: &MemoryDirectory, component: &str) -> Vec<String> {
    let mut keys: Vec<String> = directory
        .all_assignments()
        .await
        .into_iter()
        .filter(|a| a.component == component)
        .map(|a| format!("{}|{}|{}", a.role_id, a.subject, a.object))
        .collect();
    keys.sort();
    keys
}
