//! Persists the run report as pretty JSON

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;

use crate::models::RunReport;

/// Extension that marks an explicit report path as a file
const REPORT_EXTENSION: &str = "json";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write report to {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Resolves report locations and writes reports there
#[derive(Debug, Clone)]
pub struct ReportWriter {
    project_root: PathBuf,
    default_dir: PathBuf,
}

impl ReportWriter {
    /// Relative paths, `default_dir` included, resolve against `project_root`
    pub fn new(project_root: impl Into<PathBuf>, default_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            default_dir: default_dir.into(),
        }
    }

    /// Where a report taken at `timestamp` goes
    ///
    /// A `.json` path is the file itself. Anything else names a directory
    /// that receives a timestamped file; no value uses the default
    /// directory.
    #[must_use]
    pub fn resolve_path(&self, report_path: Option<&str>, timestamp: DateTime<Utc>) -> PathBuf {
        let requested = report_path.map_or_else(|| self.default_dir.clone(), PathBuf::from);
        let requested = self.absolutize(&requested);

        if is_report_file(&requested) {
            requested
        } else {
            requested.join(report_file_name(timestamp))
        }
    }

    /// Write `report`, creating parent directories as needed
    ///
    /// # Errors
    ///
    /// Returns `ReportError` if serialization or any filesystem step fails.
    pub async fn write(
        &self,
        report: &RunReport,
        report_path: Option<&str>,
    ) -> Result<PathBuf, ReportError> {
        let path = self.resolve_path(report_path, report.timestamp);
        let body = serde_json::to_vec_pretty(report)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ReportError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        tokio::fs::write(&path, body)
            .await
            .map_err(|source| ReportError::Io {
                path: path.clone(),
                source,
            })?;

        info!(
            path = %path.display(),
            samples = report.samples.len(),
            "Wrote migration report"
        );
        Ok(path)
    }

    fn absolutize(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }
}

fn is_report_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(REPORT_EXTENSION))
}

fn report_file_name(timestamp: DateTime<Utc>) -> String {
    format!(
        "prefix-migration-{}.{REPORT_EXTENSION}",
        timestamp.format("%Y%m%d-%H%M%S")
    )
}
