//! # Database Connector
//!
//! External relationship source backed by a relational database.
//!
//! The source is a single table with one row per relationship: a role
//! column, a subject column and an object column. Postgres, MySQL and
//! SQLite are supported, each through its own `SQLx` pool type.
//!
//! ## Example
//!
//! ```ignore
//! use relsync_connector_database::{DatabaseDriver, ExternalDataPort, ExternalSourceConfig};
//! use relsync_core::DataPort;
//!
//! let config = ExternalSourceConfig::new(
//!     DatabaseDriver::Postgres,
//!     "db.example.com",
//!     "hr",
//!     "sync",
//!     "mentor_links",
//! )
//! .with_password("secret")
//! .with_fields("role", "mentor_email", "student_email");
//!
//! let port = ExternalDataPort::connect(config).await?;
//! let rows = port.relationships_in_scope(None, None).await?;
//! port.shutdown().await;
//! ```

pub mod config;
pub mod connector;
pub mod pool;

// Re-exports
pub use config::{ConnectionSettings, DatabaseDriver, ExternalSourceConfig};
pub use connector::ExternalDataPort;
pub use pool::SourcePool;
