//! Object Storage Service
//!
//! The store boundary used by the prefix migration: the four calls the
//! executor makes against a bucket, the errors they return, and the
//! environment-driven configuration of the S3 client behind them.

use std::env;
use std::str::FromStr;

use async_trait::async_trait;
use thiserror::Error;

const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_MAX_BACKOFF_SECS: u64 = 30;
/// S3 never returns more than this many keys per page
const MAX_LIST_PAGE_SIZE: i32 = 1000;

const MAX_RETRIES_CEILING: u32 = 10;
const RETRY_MAX_BACKOFF_CEILING_SECS: u64 = 300;

/// Failure text that marks a throttled request
const THROTTLE_MARKERS: &[&str] = &["503", "SlowDown", "ServiceUnavailable"];
/// Failure text that marks a request worth repeating
const TRANSIENT_MARKERS: &[&str] = &[
    "500",
    "InternalError",
    "timeout",
    "Timeout",
    "connection",
    "Connection",
];

// ============================================================================
// Errors
// ============================================================================

/// Invalid or inconsistent environment configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {variable}: {message}")]
    InvalidValue { variable: String, message: String },

    #[error("Invalid configuration: {0}")]
    ValidationFailed(String),
}

/// Failures of a single store call
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("connection to object store failed: {0}")]
    ConnectionError(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("bucket not found: {0}")]
    BucketNotFound(String),

    #[error("listing failed: {0}")]
    ListFailed(String),

    #[error("copy failed: {0}")]
    CopyFailed(String),

    #[error("delete failed: {0}")]
    DeleteFailed(String),

    /// 503 SlowDown and friends
    #[error("throttled by object store: {0}")]
    RateLimited(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("object store error: {0}")]
    Internal(String),
}

/// How the retry loop should treat a failed call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Worth repeating after a backoff
    Transient,
    /// Worth repeating after the shared slow-down pause
    Throttled,
    /// Repeating cannot help
    Permanent,
}

impl StorageError {
    #[must_use]
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::RateLimited(_) => RetryClass::Throttled,
            Self::ConnectionError(_) => RetryClass::Transient,
            Self::ListFailed(detail)
            | Self::CopyFailed(detail)
            | Self::DeleteFailed(detail)
            | Self::Internal(detail) => retry_class_of(detail),
            Self::NotFound(_) | Self::AccessDenied(_) | Self::BucketNotFound(_) | Self::Config(_) => {
                RetryClass::Permanent
            }
        }
    }
}

fn retry_class_of(detail: &str) -> RetryClass {
    if mentions_any(detail, THROTTLE_MARKERS) {
        RetryClass::Throttled
    } else if mentions_any(detail, TRANSIENT_MARKERS) {
        RetryClass::Transient
    } else {
        RetryClass::Permanent
    }
}

fn mentions_any(detail: &str, markers: &[&str]) -> bool {
    markers.iter().any(|marker| detail.contains(marker))
}

/// Turn the text of a failed store call into the matching `StorageError`
///
/// Throttling, missing buckets and access denials get their own variants;
/// anything else is wrapped by `fallback`.
pub(crate) fn classify_failure(
    operation: &str,
    detail: String,
    fallback: fn(String) -> StorageError,
) -> StorageError {
    if mentions_any(&detail, THROTTLE_MARKERS) {
        StorageError::RateLimited(format!("{operation}: {detail}"))
    } else if detail.contains("NoSuchBucket") {
        StorageError::BucketNotFound(detail)
    } else if detail.contains("AccessDenied") {
        StorageError::AccessDenied(detail)
    } else {
        fallback(detail)
    }
}

// ============================================================================
// Store boundary
// ============================================================================

/// Result of an existence probe for a present key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub key: String,
    pub size: u64,
}

/// One page of a prefix listing
#[derive(Debug, Clone, Default)]
pub struct ObjectList {
    /// Keys in store order
    pub keys: Vec<String>,
    /// Token for the next page
    pub continuation_token: Option<String>,
    pub is_truncated: bool,
}

impl ObjectList {
    /// True when another page can be requested with the returned token
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.is_truncated && self.continuation_token.is_some()
    }
}

/// The calls a migration makes against a bucket
///
/// `S3ObjectStorage` talks to S3-compatible services; `InMemoryStorage`
/// backs the tests.
#[async_trait]
pub trait ObjectStorageBackend: Send + Sync {
    /// One page of keys under `prefix`, starting after `continuation_token`
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<&str>,
    ) -> Result<ObjectList, StorageError>;

    /// `Ok(None)` when the key is absent; errors mean the probe itself failed
    async fn head_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<ObjectMetadata>, StorageError>;

    /// Server-side copy within `bucket`
    async fn copy_object(
        &self,
        bucket: &str,
        source_key: &str,
        target_key: &str,
    ) -> Result<(), StorageError>;

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError>;
}

// ============================================================================
// S3Config
// ============================================================================

/// S3 client settings
///
/// # Environment Variables
///
/// - `S3_ENDPOINT`: custom endpoint for MinIO, R2 and similar
/// - `S3_BUCKET`: bucket used when `--bucket` is not given
/// - `S3_REGION`: defaults to `us-east-1`
/// - `S3_ACCESS_KEY_ID` / `S3_SECRET_ACCESS_KEY`: static credentials; both
///   or neither. Without them the default AWS credential chain is used.
/// - `S3_USE_PATH_STYLE`: `true`/`false`, `1`/`0` or `yes`/`no`
/// - `S3_MAX_RETRIES`: retries per call, default 3, at most 10
/// - `S3_RETRY_MAX_BACKOFF`: backoff cap in seconds, default 30, at most 300
/// - `S3_LIST_PAGE_SIZE`: keys per listing page, 1 to 1000
#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint: Option<String>,
    pub bucket: Option<String>,
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// `http://endpoint/bucket/key` instead of `http://bucket.endpoint/key`
    pub use_path_style: bool,
    pub max_retries: u32,
    pub retry_max_backoff_secs: u64,
    pub list_page_size: i32,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: None,
            bucket: None,
            region: DEFAULT_REGION.to_string(),
            access_key_id: None,
            secret_access_key: None,
            use_path_style: false,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_max_backoff_secs: DEFAULT_RETRY_MAX_BACKOFF_SECS,
            list_page_size: MAX_LIST_PAGE_SIZE,
        }
    }
}

impl S3Config {
    /// Load and validate settings from the environment
    ///
    /// Unset and blank variables fall back to their defaults.
    ///
    /// # Errors
    ///
    /// `ConfigError::InvalidValue` for unparsable values and
    /// `ConfigError::ValidationFailed` for inconsistent ones.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            endpoint: env_value("S3_ENDPOINT"),
            bucket: env_value("S3_BUCKET"),
            region: env_value("S3_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
            access_key_id: env_value("S3_ACCESS_KEY_ID"),
            secret_access_key: env_value("S3_SECRET_ACCESS_KEY"),
            use_path_style: env_flag("S3_USE_PATH_STYLE")?,
            max_retries: env_parse("S3_MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
            retry_max_backoff_secs: env_parse(
                "S3_RETRY_MAX_BACKOFF",
                DEFAULT_RETRY_MAX_BACKOFF_SECS,
            )?,
            list_page_size: env_parse("S3_LIST_PAGE_SIZE", MAX_LIST_PAGE_SIZE)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// `bucket` is only a default and is checked once the request resolves
    /// it, so a malformed `S3_BUCKET` does not block an explicit `--bucket`.
    ///
    /// # Errors
    ///
    /// `ConfigError::ValidationFailed` naming the first broken rule.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure(!self.region.is_empty(), "S3_REGION cannot be empty")?;
        ensure(
            self.access_key_id.is_some() || self.secret_access_key.is_none(),
            "S3_ACCESS_KEY_ID is required when S3_SECRET_ACCESS_KEY is set",
        )?;
        ensure(
            self.secret_access_key.is_some() || self.access_key_id.is_none(),
            "S3_SECRET_ACCESS_KEY is required when S3_ACCESS_KEY_ID is set",
        )?;
        ensure(
            self.endpoint
                .as_deref()
                .is_none_or(|url| url.starts_with("http://") || url.starts_with("https://")),
            "S3_ENDPOINT must start with http:// or https://",
        )?;
        ensure(
            self.max_retries <= MAX_RETRIES_CEILING,
            "S3_MAX_RETRIES must be at most 10",
        )?;
        ensure(
            self.retry_max_backoff_secs <= RETRY_MAX_BACKOFF_CEILING_SECS,
            "S3_RETRY_MAX_BACKOFF must be at most 300 seconds",
        )?;
        ensure(
            (1..=MAX_LIST_PAGE_SIZE).contains(&self.list_page_size),
            "S3_LIST_PAGE_SIZE must be between 1 and 1000",
        )
    }

    #[must_use]
    pub fn has_static_credentials(&self) -> bool {
        self.access_key_id.is_some() && self.secret_access_key.is_some()
    }

    #[must_use]
    pub fn has_custom_endpoint(&self) -> bool {
        self.endpoint.is_some()
    }
}

/// Bucket names must be 3 to 63 characters long
///
/// # Errors
///
/// `ConfigError::ValidationFailed` describing the violation.
pub fn validate_bucket_name(bucket: &str) -> Result<(), ConfigError> {
    match bucket.len() {
        0 => Err(ConfigError::ValidationFailed(
            "bucket name cannot be empty".to_string(),
        )),
        1..=2 => Err(ConfigError::ValidationFailed(format!(
            "bucket name '{bucket}' is shorter than 3 characters"
        ))),
        3..=63 => Ok(()),
        _ => Err(ConfigError::ValidationFailed(format!(
            "bucket name '{bucket}' is longer than 63 characters"
        ))),
    }
}

fn ensure(holds: bool, rule: &str) -> Result<(), ConfigError> {
    if holds {
        Ok(())
    } else {
        Err(ConfigError::ValidationFailed(rule.to_string()))
    }
}

/// Trimmed value of `name`; `None` when unset or blank
fn env_value(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_parse<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env_value(name) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            variable: name.to_string(),
            message: format!("expected a whole number, got '{raw}'"),
        }),
    }
}

fn env_flag(name: &str) -> Result<bool, ConfigError> {
    let Some(raw) = env_value(name) else {
        return Ok(false);
    };
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            variable: name.to_string(),
            message: format!("expected true/false, 1/0 or yes/no, got '{raw}'"),
        }),
    }
}

#[cfg(test)]
#[path = "object_storage_tests.rs"]
mod tests;
