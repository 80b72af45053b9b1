//! Log output setup

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "info,sqlx=warn,relsync_engine=debug,relsync_directory=debug,relsync_connector_database=debug"
    } else {
        "info,sqlx=warn"
    }
}

/// Install the global subscriber. Logs go to stderr so report output on
/// stdout stays machine-readable.
pub fn init(verbose: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose))),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_raises_engine_crates() {
        assert!(!default_filter(false).contains("debug"));
        assert!(default_filter(true).contains("relsync_engine=debug"));
    }
}
