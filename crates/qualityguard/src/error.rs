//! Error types for qualityguard.
//!
//! Most of the sync layer never lets these escape: an unreachable service is
//! recovered locally. They surface from explicit store operations, from
//! configuration loading, and from the service and push-channel adapters
//! that the sync client catches.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for qualityguard operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the local database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Service Errors ===
    /// The measurement service could not be reached.
    #[error("measurement service unreachable at {endpoint}: {message}")]
    Unreachable {
        /// Endpoint that was called.
        endpoint: String,
        /// Description of the transport failure.
        message: String,
    },

    /// The measurement service answered with a non-success status.
    #[error("measurement service returned {status} for {endpoint}")]
    ServiceStatus {
        /// Endpoint that was called.
        endpoint: String,
        /// HTTP status code.
        status: u16,
    },

    /// The service answered but did not accept the write.
    #[error("measurement service rejected {operation}")]
    Rejected {
        /// Operation that was refused.
        operation: String,
    },

    /// The push channel failed to open or broke.
    #[error("push channel error: {0}")]
    PushChannel(String),

    // === Domain Errors ===
    /// A measurement violates its own tolerance definition.
    #[error("invalid measurement '{id}': {reason}")]
    InvalidMeasurement {
        /// Identifier of the measurement.
        id: String,
        /// Why it is invalid.
        reason: String,
    },

    /// An input file could not be interpreted.
    #[error("invalid input at line {line}: {message}")]
    InvalidInput {
        /// 1-based line number of the offending entry.
        line: usize,
        /// What was wrong with it.
        message: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for qualityguard operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create an unreachable-service error.
    #[must_use]
    pub fn unreachable(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unreachable {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create a push channel error.
    #[must_use]
    pub fn push_channel(message: impl Into<String>) -> Self {
        Self::PushChannel(message.into())
    }

    /// Create an invalid measurement error.
    #[must_use]
    pub fn invalid_measurement(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidMeasurement {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid input error.
    #[must_use]
    pub fn invalid_input(line: usize, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            line,
            message: message.into(),
        }
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this error means the service was not reachable or refused
    /// the call, i.e. the caller should fall back to local data.
    #[must_use]
    pub fn is_service_failure(&self) -> bool {
        matches!(
            self,
            Self::Unreachable { .. }
                | Self::ServiceStatus { .. }
                | Self::Rejected { .. }
                | Self::PushChannel(_)
        )
    }

    /// Check if this error came from the local store.
    #[must_use]
    pub fn is_storage_error(&self) -> bool {
        matches!(
            self,
            Self::DatabaseOpen { .. } | Self::DatabaseQuery(_) | Self::DatabaseMigration { .. }
        )
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let endpoint = err
            .url()
            .map_or_else(|| "<unknown>".to_string(), ToString::to_string);
        if let Some(status) = err.status() {
            Self::ServiceStatus {
                endpoint,
                status: status.as_u16(),
            }
        } else {
            Self::Unreachable {
                endpoint,
                message: err.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreachable_display() {
        let err = Error::unreachable("http://localhost:5000/api/health", "connection refused");
        let msg = err.to_string();
        assert!(msg.contains("/api/health"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn test_service_status_display() {
        let err = Error::ServiceStatus {
            endpoint: "/ml/predict".to_string(),
            status: 503,
        };
        assert_eq!(
            err.to_string(),
            "measurement service returned 503 for /ml/predict"
        );
    }

    #[test]
    fn test_is_service_failure() {
        assert!(Error::unreachable("x", "y").is_service_failure());
        assert!(Error::push_channel("closed").is_service_failure());
        assert!(Error::ServiceStatus {
            endpoint: "x".to_string(),
            status: 500
        }
        .is_service_failure());
        assert!(Error::Rejected {
            operation: "save".to_string()
        }
        .is_service_failure());
        assert!(!Error::internal("bug").is_service_failure());
    }

    #[test]
    fn test_is_storage_error() {
        let err = Error::DatabaseMigration {
            message: "version mismatch".to_string(),
        };
        assert!(err.is_storage_error());
        assert!(!Error::push_channel("x").is_storage_error());
    }

    #[test]
    fn test_invalid_measurement_display() {
        let err = Error::invalid_measurement("DIM001", "upper limit below nominal");
        let msg = err.to_string();
        assert!(msg.contains("DIM001"));
        assert!(msg.contains("upper limit below nominal"));
    }

    #[test]
    fn test_invalid_input_display() {
        let err = Error::invalid_input(3, "not a number: abc");
        assert_eq!(err.to_string(), "invalid input at line 3: not a number: abc");
    }

    #[test]
    fn test_internal_error() {
        let err = Error::internal("something went wrong");
        assert_eq!(err.to_string(), "internal error: something went wrong");
    }

    #[test]
    fn test_push_channel_error() {
        let err = Error::push_channel("connection reset");
        assert_eq!(err.to_string(), "push channel error: connection reset");
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_rusqlite_error() {
        let result = rusqlite::Connection::open_with_flags(
            "/nonexistent/path/db.sqlite",
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        );
        if let Err(sqlite_err) = result {
            let err: Error = sqlite_err.into();
            assert!(matches!(err, Error::DatabaseQuery(_)));
            assert!(err.is_storage_error());
        }
    }

    #[test]
    fn test_from_json_error() {
        let json_result: std::result::Result<i32, serde_json::Error> =
            serde_json::from_str("not valid json");
        if let Err(json_err) = json_result {
            let err: Error = json_err.into();
            assert!(matches!(err, Error::Json(_)));
        }
    }

    #[test]
    fn test_config_validation_error_display() {
        let err = Error::ConfigValidation {
            message: "interval_ms must be greater than 0".to_string(),
        };
        assert!(err.to_string().contains("interval_ms"));
    }

    #[test]
    fn test_directory_create_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = Error::DirectoryCreate {
            path: PathBuf::from("/root/forbidden"),
            source: io_err,
        };
        assert!(err.to_string().contains("/root/forbidden"));
    }
}
