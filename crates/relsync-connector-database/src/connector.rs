//! External relationship source
//!
//! Reads relationships from a single table in an external relational
//! database. Postgres, MySQL and SQLite sources share one code path over a
//! [`SourcePool`]. The port is read-only and performs no identity
//! translation.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use relsync_core::{
    role_catalog, DataPort, IdentityKey, PortKind, RelSyncError, RelSyncResult, RelationshipSet,
    Role, RoleCatalog, Side,
};

use crate::config::{DatabaseDriver, ExternalSourceConfig};
use crate::pool::{SourcePool, KEY_COLUMN};

/// Data port over the external relationship table.
pub struct ExternalDataPort {
    /// Normalized configuration.
    config: ExternalSourceConfig,

    /// Display name for this port instance.
    display_name: String,

    /// Connection pool (lazily initialized).
    pool: Arc<RwLock<Option<SourcePool>>>,

    /// Whether the port has been shut down.
    disposed: Arc<RwLock<bool>>,
}

impl std::fmt::Debug for ExternalDataPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalDataPort")
            .field("config", &self.config.redacted())
            .field("display_name", &self.display_name)
            .finish()
    }
}

impl ExternalDataPort {
    /// Create a port without connecting yet.
    pub fn new(config: ExternalSourceConfig) -> RelSyncResult<Self> {
        let config = config.normalized();
        config.validate()?;

        let display_name = if config.driver == DatabaseDriver::Sqlite {
            format!("sqlite: {}/{}", config.database, config.table)
        } else {
            format!(
                "{}: {}@{}/{}.{}",
                config.driver.as_str(),
                config.username,
                config.host,
                config.database,
                config.table
            )
        };

        Ok(Self {
            config,
            display_name,
            pool: Arc::new(RwLock::new(None)),
            disposed: Arc::new(RwLock::new(false)),
        })
    }

    /// Create a port and connect immediately, running the setup statement.
    pub async fn connect(config: ExternalSourceConfig) -> RelSyncResult<Self> {
        let port = Self::new(config)?;
        port.get_pool().await?;
        Ok(port)
    }

    /// Create a port over an existing pool. The setup statement is not run.
    ///
    /// The pool must match the configured driver.
    pub fn with_pool(
        config: ExternalSourceConfig,
        pool: impl Into<SourcePool>,
    ) -> RelSyncResult<Self> {
        let pool = pool.into();
        let mut port = Self::new(config)?;
        if pool.driver() != port.config.driver {
            return Err(RelSyncError::configuration(format!(
                "{} pool given for a {} source",
                pool.driver().as_str(),
                port.config.driver.as_str()
            )));
        }
        port.pool = Arc::new(RwLock::new(Some(pool)));
        Ok(port)
    }

    /// Get a connection pool, creating one if necessary.
    async fn get_pool(&self) -> RelSyncResult<SourcePool> {
        if *self.disposed.read().await {
            return Err(RelSyncError::connection(
                "external data port has been shut down",
            ));
        }

        {
            let pool_guard = self.pool.read().await;
            if let Some(ref pool) = *pool_guard {
                return Ok(pool.clone());
            }
        }

        let pool = self.create_pool().await?;

        {
            let mut pool_guard = self.pool.write().await;
            *pool_guard = Some(pool.clone());
        }

        Ok(pool)
    }

    /// Create a new connection pool and run the setup statement on it.
    async fn create_pool(&self) -> RelSyncResult<SourcePool> {
        let url = self.config.connection_url();

        debug!(driver = %self.config.driver.as_str(), source = %self.display_name, "Creating external connection pool");

        let pool = SourcePool::connect(self.config.driver, &url, &self.config.connection)
            .await
            .map_err(|e| {
                RelSyncError::connection_with_source(
                    format!("Failed to connect to external source {}", self.display_name),
                    e,
                )
            })?;

        if let Some(setup) = self
            .config
            .setup_sql
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            self.log_statement(setup, &[]);
            pool.execute(setup).await.map_err(|e| {
                RelSyncError::connection_with_source("External setup statement failed", e)
            })?;
        }

        info!(
            driver = %self.config.driver.as_str(),
            source = %self.display_name,
            "External connection pool established"
        );

        Ok(pool)
    }

    fn log_statement(&self, sql: &str, params: &[String]) {
        if self.config.debug {
            debug!(sql = %sql, params = ?params, "External statement");
        }
    }

    fn column(&self, name: &str) -> String {
        self.config.driver.quote_identifier(name)
    }

    /// Build the scoped relationship query.
    ///
    /// Returns the SQL and the values to bind, in order.
    pub fn scope_query(
        &self,
        subject_filter: Option<&str>,
        object_filter: Option<&str>,
    ) -> (String, Vec<String>) {
        let driver = self.config.driver;
        let part = |field: &str| format!("COALESCE({}, '')", driver.text_cast(&self.column(field)));
        let key = driver.concat(&[
            part(&self.config.role_field),
            "'|'".to_string(),
            part(&self.config.subject_field),
            "'|'".to_string(),
            part(&self.config.object_field),
        ]);

        let mut sql = format!(
            "SELECT {key} AS {KEY_COLUMN}, t.* FROM {} t",
            driver.quote_table(&self.config.table)
        );

        let mut params = Vec::new();
        let mut clauses = Vec::new();
        for (field, filter) in [
            (&self.config.object_field, object_filter),
            (&self.config.subject_field, subject_filter),
        ] {
            if let Some(value) = filter.filter(|v| !v.is_empty()) {
                params.push(value.to_string());
                clauses.push(format!(
                    "{} = {}",
                    driver.text_cast(&self.column(field)),
                    driver.placeholder(params.len())
                ));
            }
        }

        if !clauses.is_empty() {
            sql.push_str(&format!(" WHERE ({})", clauses.join(" OR ")));
        }

        (sql, params)
    }

    /// Build the distinct role name query.
    pub fn roles_query(&self) -> String {
        let driver = self.config.driver;
        format!(
            "SELECT DISTINCT {} AS role_name FROM {} t",
            driver.text_cast(&self.column(&self.config.role_field)),
            driver.quote_table(&self.config.table)
        )
    }
}

#[async_trait]
impl DataPort for ExternalDataPort {
    fn kind(&self) -> PortKind {
        PortKind::External
    }

    #[instrument(skip(self), fields(source = %self.display_name))]
    async fn relationships_in_scope(
        &self,
        subject_filter: Option<&str>,
        object_filter: Option<&str>,
    ) -> RelSyncResult<RelationshipSet> {
        let pool = self.get_pool().await?;
        let (sql, params) = self.scope_query(subject_filter, object_filter);
        self.log_statement(&sql, &params);

        let rows = pool.fetch_relationships(&sql, &params).await.map_err(|e| {
            RelSyncError::data_access_with_source(
                format!("Failed to read relationships from {}", self.config.table),
                e,
            )
        })?;

        let mut relationships = RelationshipSet::new();
        let count = rows.len();
        for relationship in rows {
            if relationships.contains_key(&relationship.key) {
                debug!(key = %relationship.key, "Duplicate external relationship, keeping last");
            }
            relationships.insert(relationship.key.clone(), relationship);
        }

        debug!(rows = count, distinct = relationships.len(), "External relationships read");
        Ok(relationships)
    }

    async fn equivalent_identity_key(&self, value: &str, side: Side) -> Option<IdentityKey> {
        debug!(value = %value, side = %side, "External source does not translate identities");
        None
    }

    async fn mapped_value_for(&self, key: IdentityKey, side: Side) -> Option<String> {
        debug!(key = %key, side = %side, "External source does not translate identities");
        None
    }

    #[instrument(skip(self), fields(source = %self.display_name))]
    async fn all_roles(&self) -> RelSyncResult<RoleCatalog> {
        let pool = self.get_pool().await?;
        let sql = self.roles_query();
        self.log_statement(&sql, &[]);

        let names = pool
            .fetch_texts(&sql, "role_name")
            .await
            .map_err(RelSyncError::role_fetch)?;

        let roles = names
            .into_iter()
            .flatten()
            .map(|name| Role { id: None, name });

        Ok(role_catalog(roles))
    }

    fn role_field_name(&self) -> &str {
        &self.config.role_field
    }

    fn subject_field_name(&self) -> &str {
        &self.config.subject_field
    }

    fn object_field_name(&self) -> &str {
        &self.config.object_field
    }

    async fn shutdown(&self) {
        let mut disposed = self.disposed.write().await;
        if *disposed {
            return;
        }
        *disposed = true;

        let mut pool_guard = self.pool.write().await;
        if let Some(pool) = pool_guard.take() {
            pool.close().await;
        }

        info!(source = %self.display_name, "External data port shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(driver: DatabaseDriver) -> ExternalDataPort {
        let config = ExternalSourceConfig::new(driver, "db", "hr", "sync", "links")
            .with_fields("Role", "Mentor", "Student");
        ExternalDataPort::new(config).unwrap()
    }

    #[test]
    fn test_fields_are_normalized() {
        let port = port(DatabaseDriver::Postgres);
        assert_eq!(port.role_field_name(), "role");
        assert_eq!(port.subject_field_name(), "mentor");
        assert_eq!(port.object_field_name(), "student");
        assert_eq!(port.kind(), PortKind::External);
    }

    #[test]
    fn test_unfiltered_query_has_no_where_clause() {
        let (sql, params) = port(DatabaseDriver::Postgres).scope_query(None, None);
        assert!(sql.starts_with("SELECT COALESCE(CAST(\"role\" AS TEXT), '') || '|' ||"));
        assert!(sql.ends_with("FROM \"links\" t"));
        assert!(!sql.contains("WHERE"));
        assert!(params.is_empty());
    }

    #[test]
    fn test_both_filters_are_or_joined() {
        let (sql, params) = port(DatabaseDriver::Postgres).scope_query(Some("a@x"), Some("b@x"));
        assert!(sql.ends_with(
            "WHERE (CAST(\"student\" AS TEXT) = $1 OR CAST(\"mentor\" AS TEXT) = $2)"
        ));
        assert_eq!(params, vec!["b@x".to_string(), "a@x".to_string()]);
    }

    #[test]
    fn test_single_filter_applies_alone() {
        let (sql, params) = port(DatabaseDriver::Mysql).scope_query(Some("a@x"), None);
        assert!(sql.ends_with("WHERE (CAST(`mentor` AS CHAR) = ?)"));
        assert!(sql.contains("CONCAT("));
        assert_eq!(params, vec!["a@x".to_string()]);

        let (sql, _) = port(DatabaseDriver::Sqlite).scope_query(None, Some(""));
        assert!(!sql.contains("WHERE"));
    }

    #[test]
    fn test_roles_query() {
        let sql = port(DatabaseDriver::Sqlite).roles_query();
        assert_eq!(
            sql,
            "SELECT DISTINCT CAST(\"role\" AS TEXT) AS role_name FROM \"links\" t"
        );
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = ExternalSourceConfig::new(DatabaseDriver::Postgres, "db", "hr", "sync", "links")
            .with_password("hunter2");
        let port = ExternalDataPort::new(config).unwrap();
        let rendered = format!("{port:?}");
        assert!(!rendered.contains("hunter2"));
    }
}
