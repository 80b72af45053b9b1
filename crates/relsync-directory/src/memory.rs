//! In-memory directory store.
//!
//! Holds users, roles, profile data and assignments in process memory. Used
//! for tests and dry local runs; it honours the same semantics as the
//! PostgreSQL store, including idempotent inserts and the run lock.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

use relsync_core::{ContextId, IdentityKey, Provenance, RelSyncError, RelSyncResult};

use crate::store::{
    AssignmentFilter, AssignmentRecord, DirectoryStore, ProfileFieldRecord, RoleRecord, UserColumn,
};

#[derive(Debug, Clone)]
struct UserRecord {
    id: IdentityKey,
    idnumber: String,
    email: String,
    username: String,
}

impl UserRecord {
    fn column(&self, column: UserColumn) -> String {
        match column {
            UserColumn::Id => self.id.to_string(),
            UserColumn::IdNumber => self.idnumber.clone(),
            UserColumn::Email => self.email.clone(),
            UserColumn::Username => self.username.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    users: BTreeMap<IdentityKey, UserRecord>,
    roles: Vec<RoleRecord>,
    profile_fields: Vec<ProfileFieldRecord>,
    profile_data: BTreeMap<(IdentityKey, i64), String>,
    contexts: BTreeMap<IdentityKey, ContextId>,
    assignments: Vec<Provenance>,
    locks: BTreeSet<i32>,
}

/// Failure switches for exercising error paths.
#[derive(Debug, Default)]
pub struct MemoryFaults {
    pub fail_assignment_reads: AtomicBool,
    pub fail_role_reads: AtomicBool,
    pub fail_profile_reads: AtomicBool,
    pub fail_inserts: AtomicBool,
    pub fail_deletes: AtomicBool,
}

/// Directory store kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    state: RwLock<MemoryState>,
    faults: MemoryFaults,
    profile_field_reads: AtomicUsize,
}

fn injected(what: &str) -> RelSyncError {
    RelSyncError::data_access(format!("injected failure reading {what}"))
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add a user.
    #[must_use]
    pub fn with_user(mut self, id: i64, idnumber: &str, email: &str, username: &str) -> Self {
        let id = IdentityKey::new(id);
        self.state.get_mut().users.insert(
            id,
            UserRecord {
                id,
                idnumber: idnumber.to_string(),
                email: email.to_string(),
                username: username.to_string(),
            },
        );
        self
    }

    /// Builder: add a role.
    #[must_use]
    pub fn with_role(mut self, id: i64, shortname: &str, name: &str) -> Self {
        self.state.get_mut().roles.push(RoleRecord {
            id,
            shortname: shortname.to_string(),
            name: name.to_string(),
        });
        self
    }

    /// Builder: add a mappable profile field.
    #[must_use]
    pub fn with_profile_field(mut self, id: i64, shortname: &str, name: &str) -> Self {
        self.state.get_mut().profile_fields.push(ProfileFieldRecord {
            id,
            shortname: shortname.to_string(),
            name: name.to_string(),
            description: String::new(),
        });
        self
    }

    /// Builder: set a user's value for a profile field.
    #[must_use]
    pub fn with_profile_value(mut self, user: i64, field_id: i64, value: &str) -> Self {
        self.state
            .get_mut()
            .profile_data
            .insert((IdentityKey::new(user), field_id), value.to_string());
        self
    }

    /// Builder: add an existing assignment.
    #[must_use]
    pub fn with_assignment(mut self, role_id: i64, subject: i64, object: i64, component: &str) -> Self {
        let state = self.state.get_mut();
        let object = IdentityKey::new(object);
        let context_id = Self::context_for(state, object);
        state.assignments.push(Provenance {
            role_id: role_id.into(),
            subject: IdentityKey::new(subject),
            object,
            context_id,
            component: component.to_string(),
        });
        self
    }

    pub fn faults(&self) -> &MemoryFaults {
        &self.faults
    }

    /// Number of times the profile field catalog was read.
    pub fn profile_field_reads(&self) -> usize {
        self.profile_field_reads.load(Ordering::SeqCst)
    }

    /// Snapshot of every stored assignment.
    pub async fn all_assignments(&self) -> Vec<Provenance> {
        self.state.read().await.assignments.clone()
    }

    /// Context of a user, if one was created.
    pub async fn context_of(&self, user: IdentityKey) -> Option<ContextId> {
        self.state.read().await.contexts.get(&user).copied()
    }

    pub async fn is_locked(&self, key: i32) -> bool {
        self.state.read().await.locks.contains(&key)
    }

    fn context_for(state: &mut MemoryState, user: IdentityKey) -> ContextId {
        let next = ContextId::new(1000 + state.contexts.len() as i64);
        *state.contexts.entry(user).or_insert(next)
    }

    fn check(&self, flag: &AtomicBool, what: &str) -> RelSyncResult<()> {
        if flag.load(Ordering::SeqCst) {
            Err(injected(what))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DirectoryStore for MemoryDirectory {
    async fn find_users_by_column(
        &self,
        column: UserColumn,
        value: &str,
    ) -> RelSyncResult<Vec<IdentityKey>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .filter(|user| user.column(column) == value)
            .map(|user| user.id)
            .collect())
    }

    async fn user_column_value(
        &self,
        user: IdentityKey,
        column: UserColumn,
    ) -> RelSyncResult<Option<String>> {
        let state = self.state.read().await;
        Ok(state.users.get(&user).map(|u| u.column(column)))
    }

    async fn profile_fields(&self) -> RelSyncResult<Vec<ProfileFieldRecord>> {
        self.check(&self.faults.fail_profile_reads, "profile fields")?;
        self.profile_field_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.read().await.profile_fields.clone())
    }

    async fn find_users_by_profile_value(
        &self,
        field_id: i64,
        value: &str,
    ) -> RelSyncResult<Vec<IdentityKey>> {
        self.check(&self.faults.fail_profile_reads, "profile data")?;
        let state = self.state.read().await;
        Ok(state
            .profile_data
            .iter()
            .filter(|((_, field), data)| *field == field_id && data.as_str() == value)
            .map(|((user, _), _)| *user)
            .collect())
    }

    async fn profile_value(
        &self,
        user: IdentityKey,
        field_id: i64,
    ) -> RelSyncResult<Option<String>> {
        self.check(&self.faults.fail_profile_reads, "profile data")?;
        let state = self.state.read().await;
        Ok(state.profile_data.get(&(user, field_id)).cloned())
    }

    async fn roles(&self) -> RelSyncResult<Vec<RoleRecord>> {
        self.check(&self.faults.fail_role_reads, "roles")?;
        Ok(self.state.read().await.roles.clone())
    }

    async fn assignments(
        &self,
        component: &str,
        filter: AssignmentFilter,
    ) -> RelSyncResult<Vec<AssignmentRecord>> {
        self.check(&self.faults.fail_assignment_reads, "role assignments")?;
        let state = self.state.read().await;

        let records = state
            .assignments
            .iter()
            .filter(|a| a.component == component)
            .filter(|a| filter.matches(a.subject, a.object))
            .filter(|a| state.users.contains_key(&a.subject) && state.users.contains_key(&a.object))
            .filter_map(|a| {
                state
                    .roles
                    .iter()
                    .find(|r| r.role_id() == a.role_id)
                    .map(|role| AssignmentRecord {
                        role: role.clone(),
                        provenance: a.clone(),
                    })
            })
            .collect();

        Ok(records)
    }

    async fn user_context(&self, user: IdentityKey) -> RelSyncResult<ContextId> {
        let mut state = self.state.write().await;
        Ok(Self::context_for(&mut state, user))
    }

    async fn insert_assignment(&self, assignment: &Provenance) -> RelSyncResult<bool> {
        if self.faults.fail_inserts.load(Ordering::SeqCst) {
            return Err(RelSyncError::data_access("injected failure writing role assignment"));
        }
        let mut state = self.state.write().await;
        if state.assignments.contains(assignment) {
            return Ok(false);
        }
        state.assignments.push(assignment.clone());
        Ok(true)
    }

    async fn delete_assignment(&self, assignment: &Provenance) -> RelSyncResult<bool> {
        if self.faults.fail_deletes.load(Ordering::SeqCst) {
            return Err(RelSyncError::data_access("injected failure deleting role assignment"));
        }
        let mut state = self.state.write().await;
        let before = state.assignments.len();
        state.assignments.retain(|a| a != assignment);
        Ok(state.assignments.len() < before)
    }

    async fn try_lock(&self, key: i32) -> RelSyncResult<bool> {
        Ok(self.state.write().await.locks.insert(key))
    }

    async fn unlock(&self, key: i32) -> RelSyncResult<()> {
        self.state.write().await.locks.remove(&key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relsync_core::RoleId;

    fn directory() -> MemoryDirectory {
        MemoryDirectory::new()
            .with_user(10, "E10", "alice@x", "alice")
            .with_user(20, "E20", "bob@x", "bob")
            .with_role(3, "mentor", "Mentor")
    }

    #[tokio::test]
    async fn test_insert_is_idempotent() {
        let dir = directory();
        let context_id = dir.user_context(IdentityKey::new(20)).await.unwrap();
        let assignment = Provenance {
            role_id: RoleId::new(3),
            subject: IdentityKey::new(10),
            object: IdentityKey::new(20),
            context_id,
            component: "relsync".to_string(),
        };

        assert!(dir.insert_assignment(&assignment).await.unwrap());
        assert!(!dir.insert_assignment(&assignment).await.unwrap());
        assert_eq!(dir.all_assignments().await.len(), 1);

        assert!(dir.delete_assignment(&assignment).await.unwrap());
        assert!(!dir.delete_assignment(&assignment).await.unwrap());
    }

    #[tokio::test]
    async fn test_user_context_is_stable() {
        let dir = directory();
        let first = dir.user_context(IdentityKey::new(20)).await.unwrap();
        let second = dir.user_context(IdentityKey::new(20)).await.unwrap();
        let other = dir.user_context(IdentityKey::new(10)).await.unwrap();

        assert_eq!(first, second);
        assert_ne!(first, other);
    }

    #[tokio::test]
    async fn test_assignments_filter_by_component() {
        let dir = directory()
            .with_assignment(3, 10, 20, "relsync")
            .with_assignment(3, 20, 10, "manual");

        let ours = dir
            .assignments("relsync", AssignmentFilter::default())
            .await
            .unwrap();
        assert_eq!(ours.len(), 1);
        assert_eq!(ours[0].role.shortname, "mentor");
        assert_eq!(ours[0].provenance.subject, IdentityKey::new(10));
    }

    #[tokio::test]
    async fn test_lock_is_exclusive() {
        let dir = directory();
        assert!(dir.try_lock(7).await.unwrap());
        assert!(!dir.try_lock(7).await.unwrap());
        dir.unlock(7).await.unwrap();
        assert!(dir.try_lock(7).await.unwrap());
    }

    #[tokio::test]
    async fn test_injected_faults() {
        let dir = directory();
        dir.faults().fail_role_reads.store(true, Ordering::SeqCst);
        assert!(dir.roles().await.is_err());
    }
}
