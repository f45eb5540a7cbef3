//! One full run as the binary performs it: migrate, report, summarize

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use super::object_storage::ObjectStorageBackend;
use super::prefix_migration::{MigrationError, PrefixMigrator};
use super::progress::{ProgressReporter, summary_line};
use super::report_writer::ReportWriter;
use crate::config::Config;
use crate::models::{MigrationRequest, RunReport};

/// What a finished run left behind
#[derive(Debug, Clone)]
pub struct CompletedRun {
    pub report: RunReport,
    /// `None` when the report could not be written
    pub report_path: Option<PathBuf>,
    pub no_objects: bool,
}

/// Run `request` against `storage`, then write the report and print the summary
///
/// A report that cannot be written is logged and the run still succeeds.
///
/// # Errors
///
/// Returns the `MigrationError` that ended the run; no report is written
/// in that case.
pub async fn execute_migration(
    storage: Arc<dyn ObjectStorageBackend>,
    config: &Config,
    request: MigrationRequest,
) -> Result<CompletedRun, MigrationError> {
    let mut reporter = ProgressReporter::new(request.progress_mode, request.progress_only);
    let migrator = PrefixMigrator::new(storage, request);
    let outcome = migrator.run(&mut reporter).await?;
    let request = migrator.request();

    if outcome.no_objects {
        reporter.summary(&format!("No objects found under {}/", request.source));
    }

    let report = RunReport::new(request, outcome.stats, outcome.samples, Utc::now());
    let writer = ReportWriter::new(&config.project_root, &config.report_dir);
    let report_path = match writer.write(&report, request.report_path.as_deref()).await {
        Ok(path) => {
            reporter.summary(&format!("Report: {}", path.display()));
            Some(path)
        }
        Err(e) => {
            warn!(error = %e, "Failed to write migration report");
            None
        }
    };

    reporter.summary(&summary_line(&report.stats, request.dry_run));

    Ok(CompletedRun {
        report,
        report_path,
        no_objects: outcome.no_objects,
    })
}
