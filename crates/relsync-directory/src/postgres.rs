//! PostgreSQL-backed directory store.
//!
//! Expected schema:
//!
//! ```sql
//! CREATE TABLE users (
//!     id BIGINT PRIMARY KEY,
//!     idnumber TEXT NOT NULL DEFAULT '',
//!     email TEXT NOT NULL DEFAULT '',
//!     username TEXT NOT NULL
//! );
//! CREATE TABLE roles (
//!     id BIGINT PRIMARY KEY,
//!     shortname TEXT NOT NULL UNIQUE,
//!     name TEXT NOT NULL DEFAULT ''
//! );
//! CREATE TABLE contexts (
//!     id BIGSERIAL PRIMARY KEY,
//!     context_level INTEGER NOT NULL,
//!     instance_id BIGINT NOT NULL,
//!     UNIQUE (context_level, instance_id)
//! );
//! CREATE TABLE role_assignments (
//!     id BIGSERIAL PRIMARY KEY,
//!     role_id BIGINT NOT NULL REFERENCES roles (id),
//!     user_id BIGINT NOT NULL REFERENCES users (id),
//!     context_id BIGINT NOT NULL REFERENCES contexts (id),
//!     component TEXT NOT NULL DEFAULT '',
//!     modified_at TIMESTAMPTZ NOT NULL DEFAULT now(),
//!     UNIQUE (role_id, user_id, context_id, component)
//! );
//! CREATE TABLE user_info_field (
//!     id BIGINT PRIMARY KEY,
//!     shortname TEXT NOT NULL,
//!     name TEXT NOT NULL,
//!     description TEXT,
//!     datatype TEXT NOT NULL,
//!     forceunique BOOLEAN NOT NULL DEFAULT FALSE,
//!     required BOOLEAN NOT NULL DEFAULT FALSE,
//!     sortorder INTEGER NOT NULL DEFAULT 0
//! );
//! CREATE TABLE user_info_data (
//!     user_id BIGINT NOT NULL REFERENCES users (id),
//!     field_id BIGINT NOT NULL REFERENCES user_info_field (id),
//!     data TEXT NOT NULL,
//!     PRIMARY KEY (user_id, field_id)
//! );
//! ```

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Postgres};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use relsync_core::{ContextId, IdentityKey, Provenance, RelSyncError, RelSyncResult, RoleId};

use crate::store::{
    AssignmentFilter, AssignmentRecord, DirectoryStore, ProfileFieldRecord, RoleRecord, UserColumn,
};

/// Context level of per-user scopes.
pub const USER_CONTEXT_LEVEL: i32 = 30;

/// Advisory lock namespace for sync runs.
const RUN_LOCK_NAMESPACE: i32 = 7301;

#[derive(Debug, FromRow)]
struct AssignmentRow {
    role_id: i64,
    shortname: String,
    name: String,
    subject_id: i64,
    object_id: i64,
    context_id: i64,
    component: String,
}

impl From<AssignmentRow> for AssignmentRecord {
    fn from(row: AssignmentRow) -> Self {
        AssignmentRecord {
            role: RoleRecord {
                id: row.role_id,
                shortname: row.shortname,
                name: row.name,
            },
            provenance: Provenance {
                role_id: RoleId::new(row.role_id),
                subject: IdentityKey::new(row.subject_id),
                object: IdentityKey::new(row.object_id),
                context_id: ContextId::new(row.context_id),
                component: row.component,
            },
        }
    }
}

fn read_error(what: &str, err: sqlx::Error) -> RelSyncError {
    RelSyncError::data_access_with_source(format!("Failed to read {what}"), err)
}

fn write_error(what: &str, err: sqlx::Error) -> RelSyncError {
    RelSyncError::data_access_with_source(format!("Failed to write {what}"), err)
}

fn identity_keys(rows: Vec<(i64,)>) -> Vec<IdentityKey> {
    rows.into_iter().map(|(id,)| IdentityKey::new(id)).collect()
}

/// Directory store over a PostgreSQL pool.
pub struct PgDirectory {
    pool: PgPool,
    /// Connection holding the run lock; advisory locks are session scoped.
    lock_connection: Mutex<Option<PoolConnection<Postgres>>>,
}

impl PgDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_connection: Mutex::new(None),
        }
    }

    /// Connect to the store at `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> RelSyncResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(2))
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await
            .map_err(|e| {
                RelSyncError::connection_with_source("Failed to connect to the target store", e)
            })?;

        info!("Target store connection pool established");
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl DirectoryStore for PgDirectory {
    async fn find_users_by_column(
        &self,
        column: UserColumn,
        value: &str,
    ) -> RelSyncResult<Vec<IdentityKey>> {
        let sql = format!(
            "SELECT id FROM users WHERE CAST({} AS TEXT) = $1 ORDER BY id",
            column.as_str()
        );
        let rows: Vec<(i64,)> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| read_error("users", e))?;

        Ok(identity_keys(rows))
    }

    async fn user_column_value(
        &self,
        user: IdentityKey,
        column: UserColumn,
    ) -> RelSyncResult<Option<String>> {
        let sql = format!(
            "SELECT CAST({} AS TEXT) FROM users WHERE id = $1",
            column.as_str()
        );
        let row: Option<(Option<String>,)> = sqlx::query_as(&sql)
            .bind(user.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| read_error("users", e))?;

        Ok(row.and_then(|(value,)| value))
    }

    async fn profile_fields(&self) -> RelSyncResult<Vec<ProfileFieldRecord>> {
        sqlx::query_as(
            r#"
            SELECT id, shortname, name, COALESCE(description, '') AS description
            FROM user_info_field
            WHERE datatype = 'text' AND forceunique AND required
            ORDER BY sortorder, id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| read_error("profile fields", e))
    }

    async fn find_users_by_profile_value(
        &self,
        field_id: i64,
        value: &str,
    ) -> RelSyncResult<Vec<IdentityKey>> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            "SELECT user_id FROM user_info_data WHERE field_id = $1 AND data = $2 ORDER BY user_id",
        )
        .bind(field_id)
        .bind(value)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| read_error("profile data", e))?;

        Ok(identity_keys(rows))
    }

    async fn profile_value(
        &self,
        user: IdentityKey,
        field_id: i64,
    ) -> RelSyncResult<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT data FROM user_info_data WHERE user_id = $1 AND field_id = $2")
                .bind(user.value())
                .bind(field_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| read_error("profile data", e))?;

        Ok(row.map(|(data,)| data))
    }

    async fn roles(&self) -> RelSyncResult<Vec<RoleRecord>> {
        sqlx::query_as("SELECT id, shortname, name FROM roles ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| read_error("roles", e))
    }

    #[instrument(skip(self))]
    async fn assignments(
        &self,
        component: &str,
        filter: AssignmentFilter,
    ) -> RelSyncResult<Vec<AssignmentRecord>> {
        let rows: Vec<AssignmentRow> = sqlx::query_as(
            r#"
            SELECT ra.role_id, r.shortname, r.name,
                   s.id AS subject_id, o.id AS object_id,
                   ra.context_id, ra.component
            FROM role_assignments ra
            JOIN roles r ON r.id = ra.role_id
            JOIN contexts c ON c.id = ra.context_id AND c.context_level = $2
            JOIN users s ON s.id = ra.user_id
            JOIN users o ON o.id = c.instance_id
            WHERE ra.component = $1
              AND (($3::BIGINT IS NULL AND $4::BIGINT IS NULL) OR s.id = $3 OR o.id = $4)
            ORDER BY ra.id
            "#,
        )
        .bind(component)
        .bind(USER_CONTEXT_LEVEL)
        .bind(filter.subject.map(IdentityKey::value))
        .bind(filter.object.map(IdentityKey::value))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| read_error("role assignments", e))?;

        Ok(rows.into_iter().map(AssignmentRecord::from).collect())
    }

    async fn user_context(&self, user: IdentityKey) -> RelSyncResult<ContextId> {
        sqlx::query(
            r#"
            INSERT INTO contexts (context_level, instance_id) VALUES ($1, $2)
            ON CONFLICT (context_level, instance_id) DO NOTHING
            "#,
        )
        .bind(USER_CONTEXT_LEVEL)
        .bind(user.value())
        .execute(&self.pool)
        .await
        .map_err(|e| write_error("user context", e))?;

        let (id,): (i64,) =
            sqlx::query_as("SELECT id FROM contexts WHERE context_level = $1 AND instance_id = $2")
                .bind(USER_CONTEXT_LEVEL)
                .bind(user.value())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| read_error("user context", e))?;

        Ok(ContextId::new(id))
    }

    async fn insert_assignment(&self, assignment: &Provenance) -> RelSyncResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO role_assignments (role_id, user_id, context_id, component, modified_at)
            VALUES ($1, $2, $3, $4, now())
            ON CONFLICT (role_id, user_id, context_id, component) DO NOTHING
            "#,
        )
        .bind(assignment.role_id.value())
        .bind(assignment.subject.value())
        .bind(assignment.context_id.value())
        .bind(&assignment.component)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error("role assignment", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_assignment(&self, assignment: &Provenance) -> RelSyncResult<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM role_assignments
            WHERE role_id = $1 AND user_id = $2 AND context_id = $3 AND component = $4
            "#,
        )
        .bind(assignment.role_id.value())
        .bind(assignment.subject.value())
        .bind(assignment.context_id.value())
        .bind(&assignment.component)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error("role assignment", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn try_lock(&self, key: i32) -> RelSyncResult<bool> {
        let mut held = self.lock_connection.lock().await;
        if held.is_some() {
            return Ok(false);
        }

        let mut conn = self.pool.acquire().await.map_err(|e| {
            RelSyncError::connection_with_source("Failed to acquire a lock connection", e)
        })?;

        let (acquired,): (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1, $2)")
            .bind(RUN_LOCK_NAMESPACE)
            .bind(key)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| read_error("run lock", e))?;

        if acquired {
            debug!(lock_key = key, "Acquired run lock");
            *held = Some(conn);
        } else {
            debug!(lock_key = key, "Run lock already held by another process");
        }

        Ok(acquired)
    }

    async fn unlock(&self, key: i32) -> RelSyncResult<()> {
        let Some(mut conn) = self.lock_connection.lock().await.take() else {
            return Ok(());
        };

        sqlx::query("SELECT pg_advisory_unlock($1, $2)")
            .bind(RUN_LOCK_NAMESPACE)
            .bind(key)
            .execute(&mut *conn)
            .await
            .map_err(|e| write_error("run lock", e))?;

        debug!(lock_key = key, "Released run lock");
        Ok(())
    }
}
