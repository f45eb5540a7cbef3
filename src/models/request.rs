use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::validate_bucket_name;

/// How progress is displayed while the migration runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressMode {
    /// Percentage bar; needs a counting pass first
    Bar,
    /// Rotating glyph with elapsed time and rate, no total
    Spinner,
    /// Nothing but the final summary line
    Silent,
}

/// What happens when a copy fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CopyFailurePolicy {
    /// Record a `copy_failed` sample, count it as failed and move on
    #[default]
    Record,
    /// Stop the run with an error
    Abort,
}

/// Raw flags as given on the command line
#[derive(Debug, Clone, Default)]
pub struct MigrationOptions {
    pub source: Option<String>,
    pub target: Option<String>,
    pub bucket: Option<String>,
    pub dry_run: bool,
    pub overwrite: bool,
    pub delete_original: bool,
    pub progress_only: bool,
    pub spinner: bool,
    pub summary_only: bool,
    pub limit: Option<u64>,
    pub report_path: Option<String>,
    pub fail_fast: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("--source is required and cannot be empty")]
    MissingSource,
    #[error("--target is required and cannot be empty")]
    MissingTarget,
    #[error("no bucket given: pass --bucket or set S3_BUCKET")]
    MissingBucket,
    #[error("{0}")]
    InvalidBucket(String),
    /// Target equal to the source, or one nested inside the other
    #[error("--source '{source_prefix}' and --target '{target_prefix}' overlap")]
    OverlappingPrefixes {
        source_prefix: String,
        target_prefix: String,
    },
}

/// A validated, normalized migration request
///
/// Built once by [`MigrationRequest::from_options`] and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRequest {
    pub bucket: String,
    /// Source prefix without trailing slash
    pub source: String,
    /// Target prefix without trailing slash
    pub target: String,
    pub dry_run: bool,
    pub overwrite: bool,
    pub delete_original: bool,
    /// `None` means no limit
    pub limit: Option<u64>,
    pub progress_mode: ProgressMode,
    /// Suppresses per-item narration
    pub progress_only: bool,
    /// Spinner flag after normalization
    pub spinner: bool,
    pub report_path: Option<String>,
    pub copy_failure_policy: CopyFailurePolicy,
}

impl MigrationRequest {
    /// Validate and normalize command-line flags
    ///
    /// `default_bucket` comes from the environment and is used when the
    /// options carry no bucket. `summary_only` forces `progress_only` on and
    /// the spinner off; every other flag passes through. A zero limit means
    /// no limit.
    ///
    /// # Errors
    ///
    /// Returns a `RequestError` naming the first missing or invalid value.
    /// The resolved bucket must follow the 3-63 character rule, and the
    /// prefixes must not overlap: copies written inside the source would be
    /// listed again, and a prefix mapped onto itself is deleted after the copy.
    pub fn from_options(
        options: MigrationOptions,
        default_bucket: Option<&str>,
    ) -> Result<Self, RequestError> {
        let source = normalize_prefix(options.source.as_deref()).ok_or(RequestError::MissingSource)?;
        let target = normalize_prefix(options.target.as_deref()).ok_or(RequestError::MissingTarget)?;
        if prefixes_overlap(&source, &target) {
            return Err(RequestError::OverlappingPrefixes {
                source_prefix: source,
                target_prefix: target,
            });
        }

        let bucket = options
            .bucket
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .or_else(|| default_bucket.map(str::trim).filter(|b| !b.is_empty()))
            .map(String::from)
            .ok_or(RequestError::MissingBucket)?;
        validate_bucket_name(&bucket).map_err(|e| RequestError::InvalidBucket(e.to_string()))?;

        let (progress_only, spinner) = if options.summary_only {
            (true, false)
        } else {
            (options.progress_only, options.spinner)
        };

        let progress_mode = if options.summary_only {
            ProgressMode::Silent
        } else if spinner {
            ProgressMode::Spinner
        } else {
            ProgressMode::Bar
        };

        let copy_failure_policy = if options.fail_fast {
            CopyFailurePolicy::Abort
        } else {
            CopyFailurePolicy::Record
        };

        Ok(Self {
            bucket,
            source,
            target,
            dry_run: options.dry_run,
            overwrite: options.overwrite,
            delete_original: options.delete_original,
            limit: options.limit.filter(|&l| l > 0),
            progress_mode,
            progress_only,
            spinner,
            report_path: options.report_path.filter(|p| !p.trim().is_empty()),
            copy_failure_policy,
        })
    }

    /// True once `processed` keys have used up the limit
    #[must_use]
    pub fn limit_reached(&self, processed: u64) -> bool {
        self.limit.is_some_and(|limit| processed >= limit)
    }
}

/// Same prefix, or one sits under the other at a `/` boundary
fn prefixes_overlap(source: &str, target: &str) -> bool {
    let source = format!("{source}/");
    let target = format!("{target}/");
    source.starts_with(&target) || target.starts_with(&source)
}

/// Trim whitespace and trailing slashes; `None` if nothing is left
fn normalize_prefix(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
