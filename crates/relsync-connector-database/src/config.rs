//! External source configuration
//!
//! Connection details for the external relationship table, plus the names of
//! the columns holding the role, subject and object of each relationship.

use serde::{Deserialize, Serialize};

use relsync_core::{normalize_name, RelSyncError, RelSyncResult};

/// Database driver type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    #[default]
    Postgres,
    #[serde(alias = "mariadb")]
    Mysql,
    Sqlite,
}

impl DatabaseDriver {
    /// Get the default port for this driver.
    #[must_use]
    pub fn default_port(&self) -> u16 {
        match self {
            DatabaseDriver::Postgres => 5432,
            DatabaseDriver::Mysql => 3306,
            DatabaseDriver::Sqlite => 0,
        }
    }

    /// Get the driver identifier string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseDriver::Postgres => "postgres",
            DatabaseDriver::Mysql => "mysql",
            DatabaseDriver::Sqlite => "sqlite",
        }
    }

    /// Quote a single identifier for this dialect.
    #[must_use]
    pub fn quote_identifier(&self, identifier: &str) -> String {
        match self {
            DatabaseDriver::Mysql => format!("`{}`", identifier.replace('`', "``")),
            DatabaseDriver::Postgres | DatabaseDriver::Sqlite => {
                format!("\"{}\"", identifier.replace('"', "\"\""))
            }
        }
    }

    /// Quote a possibly schema-qualified table name.
    #[must_use]
    pub fn quote_table(&self, table: &str) -> String {
        table
            .split('.')
            .map(|part| self.quote_identifier(part))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Positional bind placeholder; `index` starts at 1.
    #[must_use]
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            DatabaseDriver::Postgres => format!("${index}"),
            DatabaseDriver::Mysql | DatabaseDriver::Sqlite => "?".to_string(),
        }
    }

    /// Cast an expression to text.
    #[must_use]
    pub fn text_cast(&self, expression: &str) -> String {
        match self {
            DatabaseDriver::Mysql => format!("CAST({expression} AS CHAR)"),
            DatabaseDriver::Postgres | DatabaseDriver::Sqlite => {
                format!("CAST({expression} AS TEXT)")
            }
        }
    }

    /// String concatenation of the given expressions.
    #[must_use]
    pub fn concat(&self, parts: &[String]) -> String {
        match self {
            DatabaseDriver::Mysql => format!("CONCAT({})", parts.join(", ")),
            DatabaseDriver::Postgres | DatabaseDriver::Sqlite => parts.join(" || "),
        }
    }
}

/// Pool and timeout settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Connection timeout in seconds.
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,

    /// Connection pool size.
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

fn default_connection_timeout() -> u64 {
    30
}

fn default_pool_size() -> u32 {
    2
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connection_timeout_secs: default_connection_timeout(),
            pool_size: default_pool_size(),
        }
    }
}

/// Configuration for the external relationship source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalSourceConfig {
    /// Database driver type.
    #[serde(default)]
    pub driver: DatabaseDriver,

    /// Full connection URL. Takes precedence over the discrete fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Database server hostname. For SQLite, unused.
    #[serde(default)]
    pub host: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Database name. For SQLite, the file path or `:memory:`.
    #[serde(default)]
    pub database: String,

    #[serde(default)]
    pub username: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Statement executed once right after connecting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup_sql: Option<String>,

    /// Log every statement sent to the source at debug level.
    #[serde(default)]
    pub debug: bool,

    /// Connection settings (timeouts, pool size).
    #[serde(default)]
    pub connection: ConnectionSettings,

    /// Table holding the relationships.
    pub table: String,

    /// Column holding the role name.
    #[serde(default = "default_role_field")]
    pub role_field: String,

    /// Column holding the subject's identifying value.
    #[serde(default = "default_subject_field")]
    pub subject_field: String,

    /// Column holding the object's identifying value.
    #[serde(default = "default_object_field")]
    pub object_field: String,
}

fn default_role_field() -> String {
    "role".to_string()
}

fn default_subject_field() -> String {
    "subject".to_string()
}

fn default_object_field() -> String {
    "object".to_string()
}

fn is_valid_identifier(identifier: &str) -> bool {
    !identifier.is_empty()
        && identifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl ExternalSourceConfig {
    /// Create a new config with required fields and default column names.
    pub fn new(
        driver: DatabaseDriver,
        host: impl Into<String>,
        database: impl Into<String>,
        username: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            driver,
            url: None,
            host: host.into(),
            port: None,
            database: database.into(),
            username: username.into(),
            password: None,
            setup_sql: None,
            debug: false,
            connection: ConnectionSettings::default(),
            table: table.into(),
            role_field: default_role_field(),
            subject_field: default_subject_field(),
            object_field: default_object_field(),
        }
    }

    /// Config for a SQLite database file (or `:memory:`).
    pub fn sqlite(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self::new(DatabaseDriver::Sqlite, "", database, "", table)
    }

    /// Set password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the role, subject and object column names.
    pub fn with_fields(
        mut self,
        role: impl Into<String>,
        subject: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        self.role_field = role.into();
        self.subject_field = subject.into();
        self.object_field = object.into();
        self
    }

    /// Set the setup statement.
    pub fn with_setup_sql(mut self, sql: impl Into<String>) -> Self {
        self.setup_sql = Some(sql.into());
        self
    }

    /// Enable statement logging.
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Get the effective port (default if not specified).
    #[must_use]
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.driver.default_port())
    }

    /// Copy with column names trimmed and lowercased.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let mut config = self.clone();
        config.role_field = normalize_name(&self.role_field);
        config.subject_field = normalize_name(&self.subject_field);
        config.object_field = normalize_name(&self.object_field);
        config.table = self.table.trim().to_string();
        config
    }

    /// Build the connection URL for `SQLx`.
    #[must_use]
    pub fn connection_url(&self) -> String {
        if let Some(url) = self.url.as_deref().filter(|u| !u.trim().is_empty()) {
            return url.trim().to_string();
        }

        match self.driver {
            DatabaseDriver::Sqlite => {
                if self.database.is_empty() || self.database == ":memory:" {
                    "sqlite::memory:".to_string()
                } else {
                    format!("sqlite://{}?mode=rwc", self.database)
                }
            }
            DatabaseDriver::Postgres | DatabaseDriver::Mysql => {
                let password = self.password.as_deref().unwrap_or("");
                format!(
                    "{}://{}:{}@{}:{}/{}",
                    self.driver.as_str(),
                    urlencoding::encode(&self.username),
                    urlencoding::encode(password),
                    self.host,
                    self.effective_port(),
                    self.database
                )
            }
        }
    }

    /// Check that the config can be used to build queries and connect.
    pub fn validate(&self) -> RelSyncResult<()> {
        let has_url = self.url.as_deref().is_some_and(|u| !u.trim().is_empty());

        if !has_url && self.driver != DatabaseDriver::Sqlite {
            if self.host.trim().is_empty() {
                return Err(RelSyncError::configuration("external host is required"));
            }
            if self.database.trim().is_empty() {
                return Err(RelSyncError::configuration("external database is required"));
            }
        }

        let table = self.table.trim();
        if table.is_empty() || !table.split('.').all(is_valid_identifier) {
            return Err(RelSyncError::configuration(format!(
                "external table '{}' is not a valid table name",
                self.table
            )));
        }

        for (label, field) in [
            ("role field", &self.role_field),
            ("subject field", &self.subject_field),
            ("object field", &self.object_field),
        ] {
            if !is_valid_identifier(&normalize_name(field)) {
                return Err(RelSyncError::configuration(format!(
                    "external {label} '{field}' is not a valid column name"
                )));
            }
        }

        Ok(())
    }

    /// Copy with the password masked, for logging.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.password.is_some() {
            config.password = Some("***REDACTED***".to_string());
        }
        if config.url.is_some() {
            config.url = Some("***REDACTED***".to_string());
        }
        config
    }
}
