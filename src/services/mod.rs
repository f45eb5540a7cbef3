pub mod conflict;
pub mod enumerator;
pub mod key_mapper;
pub mod memory_storage;
pub mod migration_run;
pub mod object_storage;
pub mod prefix_migration;
pub mod progress;
pub mod report_writer;
pub mod s3_storage;

pub use conflict::{ConflictResolver, Probe, Resolution};
pub use enumerator::{KeyPager, PrefixEnumerator};
pub use key_mapper::{KeyMapper, KeyMapping};
pub use memory_storage::{CallLog, InMemoryStorage};
pub use migration_run::{CompletedRun, execute_migration};
pub use object_storage::{
    ConfigError, ObjectList, ObjectMetadata, ObjectStorageBackend, RetryClass, S3Config,
    StorageError, validate_bucket_name,
};
pub use prefix_migration::{MigrationError, MigrationOutcome, PrefixMigrator};
pub use progress::{ProgressReporter, summary_line};
pub use report_writer::{ReportError, ReportWriter};
pub use s3_storage::{S3ObjectStorage, SlowDownGovernor};
