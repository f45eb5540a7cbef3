use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::request::MigrationRequest;

/// Maximum number of action records kept in a report
pub const MAX_SAMPLES: usize = 200;

/// One audited action, serialized with an `action` tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionRecord {
    Copied { source: String, target: String },
    Skipped { source: String, target: String },
    /// A copy that dry-run mode suppressed
    DryRun { source: String, target: String },
    Deleted { source: String },
    DeleteFailed { source: String, error: String },
    CopyFailed { source: String, target: String, error: String },
}

impl ActionRecord {
    #[must_use]
    pub fn source(&self) -> &str {
        match self {
            Self::Copied { source, .. }
            | Self::Skipped { source, .. }
            | Self::DryRun { source, .. }
            | Self::Deleted { source }
            | Self::DeleteFailed { source, .. }
            | Self::CopyFailed { source, .. } => source,
        }
    }
}

/// Result of deleting the original after a successful copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    Failed(String),
}

/// Terminal state of one key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    /// Target existed and overwrite was off
    Skipped,
    /// Would have been copied
    DryRun,
    /// Copied; `delete` is set when the original was to be removed
    Copied { delete: Option<DeleteOutcome> },
    CopyFailed { error: String },
}

/// Counters for a run, folded once per key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub processed: u64,
    pub copied: u64,
    pub skipped: u64,
    #[serde(rename = "deleted")]
    pub deleted_count: u64,
    pub failed: u64,
    pub elapsed_seconds: f64,
    pub rate_per_second: f64,
}

impl RunStats {
    /// Fold one terminal outcome into the counters
    pub fn record(&mut self, outcome: &KeyOutcome) {
        self.processed += 1;
        match outcome {
            KeyOutcome::Skipped => self.skipped += 1,
            KeyOutcome::DryRun => {}
            KeyOutcome::Copied { delete } => {
                self.copied += 1;
                match delete {
                    Some(DeleteOutcome::Deleted) => self.deleted_count += 1,
                    Some(DeleteOutcome::Failed(_)) => self.failed += 1,
                    None => {}
                }
            }
            KeyOutcome::CopyFailed { .. } => self.failed += 1,
        }
    }

    /// Stamp elapsed time and the derived rate
    pub fn finish(&mut self, elapsed: Duration) {
        self.elapsed_seconds = elapsed.as_secs_f64();
        self.rate_per_second = rate_per_second(self.processed, self.elapsed_seconds);
    }
}

/// `processed / elapsed`, or `processed` when no time has elapsed
#[must_use]
pub fn rate_per_second(processed: u64, elapsed_seconds: f64) -> f64 {
    if elapsed_seconds > 0.0 {
        processed as f64 / elapsed_seconds
    } else {
        processed as f64
    }
}

/// First [`MAX_SAMPLES`] action records in encounter order
#[derive(Debug, Clone, Default)]
pub struct SampleLog {
    records: Vec<ActionRecord>,
}

impl SampleLog {
    /// Append unless the log is full
    pub fn push(&mut self, record: ActionRecord) {
        if self.records.len() < MAX_SAMPLES {
            self.records.push(record);
        }
    }

    #[must_use]
    pub fn into_records(self) -> Vec<ActionRecord> {
        self.records
    }
}

/// Effective options echoed into the report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportOptions {
    pub delete: bool,
    pub overwrite: bool,
    pub spinner: bool,
    pub progress_only: bool,
    pub limit: Option<u64>,
}

/// The persisted audit artifact of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub timestamp: DateTime<Utc>,
    pub bucket: String,
    pub source: String,
    pub target: String,
    pub dry: bool,
    pub options: ReportOptions,
    pub stats: RunStats,
    pub samples: Vec<ActionRecord>,
}

impl RunReport {
    #[must_use]
    pub fn new(
        request: &MigrationRequest,
        stats: RunStats,
        mut samples: Vec<ActionRecord>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        samples.truncate(MAX_SAMPLES);
        Self {
            timestamp,
            bucket: request.bucket.clone(),
            source: request.source.clone(),
            target: request.target.clone(),
            dry: request.dry_run,
            options: ReportOptions {
                delete: request.delete_original,
                overwrite: request.overwrite,
                spinner: request.spinner,
                progress_only: request.progress_only,
                limit: request.limit,
            },
            stats,
            samples,
        }
    }
}
