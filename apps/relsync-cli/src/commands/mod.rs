//! CLI command implementations

pub mod fields;
pub mod sync;

use std::sync::Arc;

use relsync_directory::PgDirectory;

use crate::config::CliConfig;
use crate::error::CliResult;

/// Connect to the target store named in `config`.
async fn connect_directory(config: &CliConfig) -> CliResult<Arc<PgDirectory>> {
    let directory =
        PgDirectory::connect(config.database_url()?, config.target.max_connections).await?;
    Ok(Arc::new(directory))
}
