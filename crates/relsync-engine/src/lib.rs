//! # relsync-engine
//!
//! Reconciles role relationships from an external source into the target
//! identity store.
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use relsync_directory::PgDirectory;
//! use relsync_engine::{PortFactory, SyncConfig, SyncEngine};
//!
//! let directory = Arc::new(PgDirectory::connect(&database_url, 4).await?);
//! let factory = PortFactory::new(directory);
//! let external = factory.create("EXTERNAL", &config).await?;
//! let internal = factory.create("INTERNAL", &config).await?;
//!
//! let report = SyncEngine::new(external, internal)?
//!     .with_dry_run(config.dry_run)
//!     .sync(None, true)
//!     .await;
//! std::process::exit(report.exit_code());
//! ```

pub mod config;
pub mod engine;
pub mod factory;
pub mod report;

pub use config::SyncConfig;
pub use engine::SyncEngine;
pub use factory::PortFactory;
pub use report::{RunStatus, SkipReason, SyncEvent, SyncReport, SyncStatistics};
