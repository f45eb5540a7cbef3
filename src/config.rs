use std::env;
use std::path::PathBuf;

use crate::services::ConfigError;

/// Default report directory, relative to the project root
pub const DEFAULT_REPORT_DIR: &str = "storage/migration-reports";

/// Application configuration loaded from environment variables
///
/// Store settings live in [`crate::services::S3Config`]; this covers where
/// the tool writes its own artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Base for relative report paths (`MIGRATE_PROJECT_ROOT`, default: cwd)
    pub project_root: PathBuf,
    /// Report directory when no `--report-path` is given (`MIGRATE_REPORT_DIR`)
    pub report_dir: PathBuf,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let project_root = match env::var("MIGRATE_PROJECT_ROOT") {
            Ok(root) if !root.trim().is_empty() => PathBuf::from(root.trim()),
            _ => env::current_dir().map_err(|e| ConfigError::InvalidValue {
                variable: "MIGRATE_PROJECT_ROOT".to_string(),
                message: format!("not set and the current directory is unavailable: {e}"),
            })?,
        };

        let report_dir = env::var("MIGRATE_REPORT_DIR")
            .ok()
            .filter(|dir| !dir.trim().is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_REPORT_DIR), PathBuf::from);

        Ok(Self {
            project_root,
            report_dir,
        })
    }
}
