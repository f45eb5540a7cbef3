//! Command-line flags

use clap::Parser;

use crate::models::MigrationOptions;

/// Move every object under one key prefix of a bucket to another prefix
///
/// Source and target are validated after parsing so that an empty value
/// fails the same way as a missing one.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "prefix-migrate", version)]
#[command(about = "Copy (and optionally move) every object under an S3 key prefix to another prefix")]
pub struct Cli {
    /// Report what would happen without copying or deleting anything
    #[arg(long)]
    pub dry: bool,

    /// Source prefix, e.g. `media/photos`
    #[arg(long)]
    pub source: Option<String>,

    /// Target prefix, e.g. `archive/photos`
    #[arg(long)]
    pub target: Option<String>,

    /// Bucket name (default: S3_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Delete each original after a successful copy
    #[arg(long)]
    pub delete_original: bool,

    /// Copy even when the target key already exists
    #[arg(long)]
    pub overwrite: bool,

    /// Only show progress, no per-object lines
    #[arg(long)]
    pub progress_only: bool,

    /// Show a spinner instead of a progress bar (skips the counting pass)
    #[arg(long)]
    pub spinner: bool,

    /// Stop after this many objects (0 means no limit)
    #[arg(long)]
    pub limit: Option<u64>,

    /// Report file (`.json`) or directory, relative to the project root
    #[arg(long)]
    pub report_path: Option<String>,

    /// Print only the final summary; implies --progress-only, disables --spinner
    #[arg(long)]
    pub summary_only: bool,

    /// Abort the run on the first failed copy instead of recording it
    #[arg(long)]
    pub fail_fast: bool,
}

impl Cli {
    #[must_use]
    pub fn into_options(self) -> MigrationOptions {
        MigrationOptions {
            source: self.source,
            target: self.target,
            bucket: self.bucket,
            dry_run: self.dry,
            overwrite: self.overwrite,
            delete_original: self.delete_original,
            progress_only: self.progress_only,
            spinner: self.spinner,
            summary_only: self.summary_only,
            limit: self.limit,
            report_path: self.report_path,
            fail_fast: self.fail_fast,
        }
    }
}
