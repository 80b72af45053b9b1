//! CLI error types and exit codes

use thiserror::Error;

use relsync_core::RelSyncError;

use crate::config::ConfigError;

/// Exit codes for the CLI
/// - 0: Success, or nothing to do
/// - 1: Configuration or connection error
/// - 2: Read failure on either side
/// - 3: Another run holds the lock
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sync(#[from] RelSyncError),

    #[error("Sync run failed ({code}): {message}")]
    RunFailed {
        code: String,
        message: String,
        exit_code: i32,
    },

    #[error("Another sync run is in progress")]
    Locked,

    #[error("Failed to write output: {0}")]
    Output(String),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) => 1,
            CliError::Sync(e) => e.exit_code(),
            CliError::RunFailed { exit_code, .. } => *exit_code,
            CliError::Locked => 3,
            CliError::Output(_) => 1,
        }
    }

    pub fn print(&self) {
        eprintln!("Error: {self}");
        if let Some(suggestion) = self.suggestion() {
            eprintln!("\nSuggestion: {suggestion}");
        }
    }

    fn suggestion(&self) -> Option<&'static str> {
        match self {
            CliError::Sync(RelSyncError::UnknownFieldClass { .. }) => {
                Some("Run 'relsync fields' to list the valid field selectors.")
            }
            CliError::Locked => Some("Wait for the running sync to finish and try again."),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Output(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_config() {
        let err = CliError::Config(ConfigError::MissingVar("DATABASE_URL".to_string()));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_exit_code_follows_sync_error() {
        assert_eq!(
            CliError::Sync(RelSyncError::connection("refused")).exit_code(),
            1
        );
        assert_eq!(
            CliError::Sync(RelSyncError::data_access("table gone")).exit_code(),
            2
        );
        assert_eq!(
            CliError::Sync(RelSyncError::unknown_field_class("group")).exit_code(),
            1
        );
    }

    #[test]
    fn test_exit_code_run_failed() {
        let err = CliError::RunFailed {
            code: "ROLE_FETCH_ERROR".to_string(),
            message: "boom".to_string(),
            exit_code: 2,
        };
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_locked() {
        assert_eq!(CliError::Locked.exit_code(), 3);
    }

    #[test]
    fn test_suggestion_for_unknown_field_class() {
        let err = CliError::Sync(RelSyncError::unknown_field_class("group"));
        assert!(err.suggestion().is_some());
        assert!(CliError::Output("x".to_string()).suggestion().is_none());
    }
}
