use std::fmt;
use std::process::ExitCode;

use crate::models::RequestError;
use crate::services::{ConfigError, MigrationError, StorageError};

/// Application-level error type
#[derive(Debug)]
pub enum AppError {
    /// Environment configuration is missing or invalid
    Config(ConfigError),
    /// Command-line flags do not form a valid request
    Request(RequestError),
    /// The store client could not be set up
    Storage(StorageError),
    /// The run ended early
    Migration(MigrationError),
}

impl AppError {
    /// Short machine-readable code, used as a log field
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::Request(_) => "INVALID_REQUEST",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Migration(MigrationError::Listing(_)) => "LISTING_FAILED",
            Self::Migration(MigrationError::CopyFailed { .. }) => "COPY_FAILED",
        }
    }

    /// Process exit code; every error is a plain failure
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::FAILURE
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "Configuration error: {e}"),
            Self::Request(e) => write!(f, "Invalid arguments: {e}"),
            Self::Storage(e) => write!(f, "Storage error: {e}"),
            Self::Migration(e) => write!(f, "Migration failed: {e}"),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Request(e) => Some(e),
            Self::Storage(e) => Some(e),
            Self::Migration(e) => Some(e),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl From<RequestError> for AppError {
    fn from(err: RequestError) -> Self {
        Self::Request(err)
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

impl From<MigrationError> for AppError {
    fn from(err: MigrationError) -> Self {
        Self::Migration(err)
    }
}
