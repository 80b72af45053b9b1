//! Relationship sync error types
//!
//! Run-level failures (connection, configuration, reads) abort a run.
//! Per-row failures (assignment, unassignment) are reported and skipped.

use thiserror::Error;

/// Boxed error used as the optional cause of a failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by data ports, field mappings and the sync engine.
#[derive(Debug, Error)]
pub enum RelSyncError {
    /// Configuration is missing or invalid.
    #[error("invalid configuration: {message}")]
    Configuration { message: String },

    /// Connecting to a data store failed.
    #[error("connection failed: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Reading from a data store failed.
    #[error("data access failed: {message}")]
    DataAccess {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The role catalog could not be read.
    #[error("failed to fetch roles: {message}")]
    RoleFetch {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// A field mapping name referred to a kind that does not exist.
    #[error("unknown field mapping class: {class}")]
    UnknownFieldClass { class: String },

    /// Listing the mappable fields of one of the field kinds failed.
    #[error("failed to list mappable fields of kind '{kind}': {message}")]
    Aggregation {
        kind: String,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The requested data port kind is not known.
    #[error("unknown data port type '{kind}' (expected EXTERNAL or INTERNAL)")]
    UnknownPortType { kind: String },

    /// Creating a single relationship failed.
    #[error("failed to assign {key}: {message}")]
    Assignment {
        key: String,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Removing a single relationship failed.
    #[error("failed to unassign {key}: {message}")]
    Unassignment {
        key: String,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The port does not offer the requested capability.
    #[error("data port does not support {capability}")]
    Unsupported { capability: String },
}

impl RelSyncError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        RelSyncError::Configuration {
            message: message.into(),
        }
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        RelSyncError::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection error with its underlying cause.
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        RelSyncError::Connection {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a data access error.
    pub fn data_access(message: impl Into<String>) -> Self {
        RelSyncError::DataAccess {
            message: message.into(),
            source: None,
        }
    }

    /// Create a data access error with its underlying cause.
    pub fn data_access_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        RelSyncError::DataAccess {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a role fetch error wrapping the failure that caused it.
    pub fn role_fetch(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        RelSyncError::RoleFetch {
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an unknown field class error.
    pub fn unknown_field_class(class: impl Into<String>) -> Self {
        RelSyncError::UnknownFieldClass {
            class: class.into(),
        }
    }

    /// Create an aggregation error for the given field kind.
    pub fn aggregation(
        kind: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        RelSyncError::Aggregation {
            kind: kind.into(),
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an unknown port type error.
    pub fn unknown_port_type(kind: impl Into<String>) -> Self {
        RelSyncError::UnknownPortType { kind: kind.into() }
    }

    /// Create an assignment error for the given relationship key.
    pub fn assignment(
        key: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        RelSyncError::Assignment {
            key: key.into(),
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an unassignment error for the given relationship key.
    pub fn unassignment(
        key: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        RelSyncError::Unassignment {
            key: key.into(),
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an unsupported capability error.
    pub fn unsupported(capability: impl Into<String>) -> Self {
        RelSyncError::Unsupported {
            capability: capability.into(),
        }
    }

    /// Check whether this error aborts a whole run.
    ///
    /// Only per-row write failures let the run continue.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            RelSyncError::Assignment { .. } | RelSyncError::Unassignment { .. }
        )
    }

    /// Process exit code for a run that ended with this error.
    ///
    /// Connection and configuration problems map to 1, read failures to 2.
    pub fn exit_code(&self) -> i32 {
        match self {
            RelSyncError::Configuration { .. }
            | RelSyncError::Connection { .. }
            | RelSyncError::UnknownFieldClass { .. }
            | RelSyncError::UnknownPortType { .. }
            | RelSyncError::Unsupported { .. } => 1,
            RelSyncError::DataAccess { .. }
            | RelSyncError::RoleFetch { .. }
            | RelSyncError::Aggregation { .. }
            | RelSyncError::Assignment { .. }
            | RelSyncError::Unassignment { .. } => 2,
        }
    }

    /// Get a machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            RelSyncError::Configuration { .. } => "CONFIGURATION_ERROR",
            RelSyncError::Connection { .. } => "CONNECTION_ERROR",
            RelSyncError::DataAccess { .. } => "DATA_ACCESS_ERROR",
            RelSyncError::RoleFetch { .. } => "ROLE_FETCH_ERROR",
            RelSyncError::UnknownFieldClass { .. } => "UNKNOWN_FIELD_CLASS",
            RelSyncError::Aggregation { .. } => "AGGREGATION_ERROR",
            RelSyncError::UnknownPortType { .. } => "UNKNOWN_PORT_TYPE",
            RelSyncError::Assignment { .. } => "ASSIGNMENT_ERROR",
            RelSyncError::Unassignment { .. } => "UNASSIGNMENT_ERROR",
            RelSyncError::Unsupported { .. } => "UNSUPPORTED",
        }
    }
}

/// Result type for relationship sync operations.
pub type RelSyncResult<T> = Result<T, RelSyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_split_connect_and_read_failures() {
        assert_eq!(RelSyncError::connection("refused").exit_code(), 1);
        assert_eq!(RelSyncError::configuration("no table").exit_code(), 1);
        assert_eq!(RelSyncError::data_access("bad column").exit_code(), 2);
        assert_eq!(
            RelSyncError::role_fetch(RelSyncError::data_access("x")).exit_code(),
            2
        );
    }

    #[test]
    fn test_row_level_errors_are_not_fatal() {
        let err = RelSyncError::assignment("mentor|10|20", RelSyncError::data_access("boom"));
        assert!(!err.is_fatal());
        assert_eq!(err.error_code(), "ASSIGNMENT_ERROR");
        assert!(err.to_string().contains("mentor|10|20"));

        assert!(RelSyncError::connection("down").is_fatal());
    }

    #[test]
    fn test_source_is_preserved() {
        use std::error::Error as _;

        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = RelSyncError::connection_with_source("cannot reach source", io);
        assert!(err.source().is_some());
    }
}
