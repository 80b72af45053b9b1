//! Driver-typed connection pools
//!
//! Each driver keeps its own row type so columns are decoded one at a time:
//! a column of a type nothing here understands (timestamps, UUIDs, numerics)
//! reads as null instead of failing the whole row.

use sqlx::mysql::{MySql, MySqlPool};
use sqlx::pool::PoolOptions;
use sqlx::postgres::{PgPool, Postgres};
use sqlx::sqlite::{Sqlite, SqlitePool};
use sqlx::{Column, ColumnIndex, Database, Decode, Row, Type};
use std::time::Duration;

use relsync_core::{FieldValue, RelationshipRow};

use crate::config::{ConnectionSettings, DatabaseDriver};

/// Alias of the synthesized uniqueness key column.
pub(crate) const KEY_COLUMN: &str = "relsync_key";

/// A pool for one of the supported source databases.
#[derive(Debug, Clone)]
pub enum SourcePool {
    Postgres(PgPool),
    Mysql(MySqlPool),
    Sqlite(SqlitePool),
}

/// Run `$body` against whichever pool `$pool` holds, bound as `$p`.
macro_rules! with_pool {
    ($pool:expr, |$p:ident| $body:expr) => {
        match $pool {
            SourcePool::Postgres($p) => $body,
            SourcePool::Mysql($p) => $body,
            SourcePool::Sqlite($p) => $body,
        }
    };
}

fn pool_options<DB: Database>(settings: &ConnectionSettings, in_memory: bool) -> PoolOptions<DB> {
    let options = PoolOptions::<DB>::new()
        .acquire_timeout(Duration::from_secs(settings.connection_timeout_secs));

    // An in-memory SQLite database lives and dies with its one connection.
    if in_memory {
        options
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        options.max_connections(settings.pool_size.max(1))
    }
}

impl SourcePool {
    /// Connect with the pool type of `driver`.
    pub async fn connect(
        driver: DatabaseDriver,
        url: &str,
        settings: &ConnectionSettings,
    ) -> Result<Self, sqlx::Error> {
        let in_memory = url.starts_with("sqlite::memory:");
        Ok(match driver {
            DatabaseDriver::Postgres => {
                SourcePool::Postgres(pool_options::<Postgres>(settings, false).connect(url).await?)
            }
            DatabaseDriver::Mysql => {
                SourcePool::Mysql(pool_options::<MySql>(settings, false).connect(url).await?)
            }
            DatabaseDriver::Sqlite => {
                SourcePool::Sqlite(pool_options::<Sqlite>(settings, in_memory).connect(url).await?)
            }
        })
    }

    pub fn driver(&self) -> DatabaseDriver {
        match self {
            SourcePool::Postgres(_) => DatabaseDriver::Postgres,
            SourcePool::Mysql(_) => DatabaseDriver::Mysql,
            SourcePool::Sqlite(_) => DatabaseDriver::Sqlite,
        }
    }

    pub(crate) async fn execute(&self, sql: &str) -> Result<(), sqlx::Error> {
        with_pool!(self, |p| sqlx::query(sql).execute(p).await.map(|_| ()))
    }

    /// Run the scope query and decode every row.
    pub(crate) async fn fetch_relationships(
        &self,
        sql: &str,
        params: &[String],
    ) -> Result<Vec<RelationshipRow>, sqlx::Error> {
        with_pool!(self, |p| {
            let mut query = sqlx::query(sql);
            for param in params {
                query = query.bind(param.clone());
            }
            query
                .fetch_all(p)
                .await
                .map(|rows| rows.iter().map(|row| row_to_relationship(row)).collect())
        })
    }

    /// Run a query and read one text column from every row.
    pub(crate) async fn fetch_texts(
        &self,
        sql: &str,
        column: &str,
    ) -> Result<Vec<Option<String>>, sqlx::Error> {
        with_pool!(self, |p| {
            sqlx::query(sql).fetch_all(p).await.map(|rows| {
                rows.iter()
                    .map(|row| row.try_get::<Option<String>, _>(column).ok().flatten())
                    .collect()
            })
        })
    }

    pub(crate) async fn close(&self) {
        with_pool!(self, |p| p.close().await)
    }
}

impl From<PgPool> for SourcePool {
    fn from(pool: PgPool) -> Self {
        SourcePool::Postgres(pool)
    }
}

impl From<MySqlPool> for SourcePool {
    fn from(pool: MySqlPool) -> Self {
        SourcePool::Mysql(pool)
    }
}

impl From<SqlitePool> for SourcePool {
    fn from(pool: SqlitePool) -> Self {
        SourcePool::Sqlite(pool)
    }
}

/// Decode one column, trying the types a relationship table plausibly holds.
fn decode_column<'r, R>(row: &'r R, index: usize) -> FieldValue
where
    R: Row,
    usize: ColumnIndex<R>,
    Option<String>: Decode<'r, R::Database> + Type<R::Database>,
    Option<i64>: Decode<'r, R::Database> + Type<R::Database>,
    Option<i32>: Decode<'r, R::Database> + Type<R::Database>,
    Option<f64>: Decode<'r, R::Database> + Type<R::Database>,
    Option<bool>: Decode<'r, R::Database> + Type<R::Database>,
{
    if let Ok(val) = row.try_get::<Option<String>, _>(index) {
        FieldValue::from(val)
    } else if let Ok(val) = row.try_get::<Option<i64>, _>(index) {
        FieldValue::from(val)
    } else if let Ok(val) = row.try_get::<Option<i32>, _>(index) {
        val.map_or(FieldValue::Null, |v| FieldValue::Integer(i64::from(v)))
    } else if let Ok(val) = row.try_get::<Option<f64>, _>(index) {
        val.map_or(FieldValue::Null, FieldValue::Float)
    } else if let Ok(val) = row.try_get::<Option<bool>, _>(index) {
        FieldValue::from(val)
    } else {
        // Not needed for matching
        FieldValue::Null
    }
}

/// Convert a SQL row to a relationship row keyed by [`KEY_COLUMN`].
fn row_to_relationship<'r, R>(row: &'r R) -> RelationshipRow
where
    R: Row,
    usize: ColumnIndex<R>,
    Option<String>: Decode<'r, R::Database> + Type<R::Database>,
    Option<i64>: Decode<'r, R::Database> + Type<R::Database>,
    Option<i32>: Decode<'r, R::Database> + Type<R::Database>,
    Option<f64>: Decode<'r, R::Database> + Type<R::Database>,
    Option<bool>: Decode<'r, R::Database> + Type<R::Database>,
{
    let mut relationship = RelationshipRow::new(String::new());

    for (index, column) in row.columns().iter().enumerate() {
        let name = column.name().to_lowercase();
        let value = decode_column(row, index);
        if name == KEY_COLUMN {
            relationship.key = value.as_text().unwrap_or_default();
        } else {
            relationship.values.insert(name, value);
        }
    }

    relationship
}
