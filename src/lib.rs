//! prefix-migrate - bulk key-prefix migration for S3-compatible buckets
//!
//! Lists every object under a source prefix, copies each one to the same
//! relative path under a target prefix, optionally deletes the original, and
//! writes a JSON audit report of the run.

pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use cli::Cli;
pub use config::Config;
pub use error::AppError;

pub use models::{
    ActionRecord, CopyFailurePolicy, MigrationOptions, MigrationRequest, ProgressMode,
    RequestError, RunReport, RunStats,
};

// Object storage exports for integration tests
pub use services::{
    ConfigError, InMemoryStorage, ObjectList, ObjectMetadata, ObjectStorageBackend, S3Config,
    S3ObjectStorage, StorageError,
};

pub use services::{
    CompletedRun, MigrationError, MigrationOutcome, PrefixMigrator, ProgressReporter, ReportError,
    ReportWriter, execute_migration,
};
