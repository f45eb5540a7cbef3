//! S3-compatible implementation of the store boundary
//!
//! Every call goes through a retry loop. Transient failures are repeated
//! with jittered exponential backoff; 503 SlowDown responses raise a pause
//! shared by later calls until the store recovers.

use std::fmt::{Debug, Display};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::operation::RequestId;
use aws_sdk_s3::types::MetadataDirective;
use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, error, warn};

use super::object_storage::{
    ObjectList, ObjectMetadata, ObjectStorageBackend, RetryClass, S3Config, StorageError,
    classify_failure,
};

const BACKOFF_BASE_MS: u64 = 100;
const SLOWDOWN_BASE_MS: u64 = 1_000;
const SLOWDOWN_CAP_MS: u64 = 30_000;
/// The slow-down pause doubles per strike up to `2^MAX_SLOWDOWN_LEVEL`
const MAX_SLOWDOWN_LEVEL: u32 = 5;

/// Pause applied after 503 SlowDown responses
///
/// Each consecutive throttle doubles the pause; each success halves it.
#[derive(Debug, Default)]
pub struct SlowDownGovernor {
    strikes: AtomicU32,
    level: AtomicU32,
}

impl SlowDownGovernor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn throttled(&self) {
        let strikes = self.strikes.fetch_add(1, Ordering::SeqCst) + 1;
        self.level
            .store(strikes.min(MAX_SLOWDOWN_LEVEL), Ordering::SeqCst);
    }

    pub fn succeeded(&self) {
        self.strikes.store(0, Ordering::SeqCst);
        // Err only means the level was already zero
        let _ = self
            .level
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |level| level.checked_sub(1));
    }

    #[must_use]
    pub fn pause(&self) -> Duration {
        let level = self.level.load(Ordering::SeqCst);
        Duration::from_millis((SLOWDOWN_BASE_MS << level).min(SLOWDOWN_CAP_MS))
    }
}

/// `min(100ms * 2^(attempt-1), cap)` plus up to 25% jitter
fn backoff(attempt: u32, cap_secs: u64) -> Duration {
    let exponent = attempt.saturating_sub(1).min(20);
    let delay_ms = (BACKOFF_BASE_MS << exponent).min(cap_secs.saturating_mul(1000));
    let jitter_ms = rand::thread_rng().gen_range(0..=delay_ms / 4);
    Duration::from_millis(delay_ms + jitter_ms)
}

/// Request id embedded in a failure message, for log correlation
fn request_id_of(error: &StorageError) -> Option<String> {
    let text = error.to_string();
    ["request id: ", "RequestId: ", "request-id: "]
        .iter()
        .find_map(|marker| {
            let start = text.find(marker)? + marker.len();
            let id: String = text[start..]
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || *c == '-')
                .collect();
            (!id.is_empty()).then_some(id)
        })
}

/// Network-level failures that never reached the service
fn transport_failure<E, R>(operation: &str, err: &SdkError<E, R>) -> Option<StorageError>
where
    E: std::error::Error + 'static,
    R: Debug,
{
    match err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            Some(StorageError::ConnectionError(format!(
                "{operation}: {}",
                DisplayErrorContext(err)
            )))
        }
        _ => None,
    }
}

/// Describe a service error as `Code: message (request id: ...)` and classify it
fn service_failure<E>(
    operation: &str,
    service: &E,
    fallback: fn(String) -> StorageError,
) -> StorageError
where
    E: ProvideErrorMetadata + RequestId + Display,
{
    let mut detail = match (service.code(), service.message()) {
        (Some(code), Some(message)) => format!("{code}: {message}"),
        (Some(code), None) => code.to_string(),
        _ => service.to_string(),
    };
    if let Some(id) = service.request_id() {
        detail.push_str(&format!(" (request id: {id})"));
    }
    classify_failure(operation, detail, fallback)
}

/// S3-compatible object storage
pub struct S3ObjectStorage {
    client: S3Client,
    config: S3Config,
    governor: SlowDownGovernor,
}

impl S3ObjectStorage {
    /// Build a client from `config`; nothing is sent to the store yet
    ///
    /// # Errors
    ///
    /// `StorageError::Config` when `config` does not validate.
    pub async fn new(config: S3Config) -> Result<Self, StorageError> {
        config.validate()?;

        let region = Region::new(config.region.clone());
        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(region.clone())
            .force_path_style(config.use_path_style);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        builder = match (&config.access_key_id, &config.secret_access_key) {
            (Some(id), Some(secret)) => builder.credentials_provider(Credentials::new(
                id,
                secret,
                None,
                None,
                "prefix-migrate-env",
            )),
            _ => {
                // IAM roles, AWS_* variables, shared profiles
                let shared = aws_config::defaults(BehaviorVersion::latest())
                    .region(region)
                    .load()
                    .await;
                match shared.credentials_provider() {
                    Some(provider) => builder.credentials_provider(provider.clone()),
                    None => builder,
                }
            }
        };

        Ok(Self {
            client: S3Client::from_conf(builder.build()),
            config,
            governor: SlowDownGovernor::new(),
        })
    }

    #[must_use]
    pub fn config(&self) -> &S3Config {
        &self.config
    }

    /// `x-amz-copy-source` value: `bucket/key` with every key segment
    /// percent-encoded and the `/` separators kept
    #[must_use]
    pub fn copy_source(bucket: &str, key: &str) -> String {
        let encoded: Vec<_> = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!("{bucket}/{}", encoded.join("/"))
    }

    /// Run `call` until it succeeds, fails permanently, or runs out of
    /// attempts (`max_retries + 1`)
    async fn with_retry<T, F, Fut>(
        &self,
        operation: &'static str,
        mut call: F,
    ) -> Result<T, StorageError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StorageError>>,
    {
        let attempts = self.config.max_retries + 1;
        let mut attempt = 1;

        loop {
            let failure = match call().await {
                Ok(value) => {
                    self.governor.succeeded();
                    if attempt > 1 {
                        debug!(operation, attempt, "S3 call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(failure) => failure,
            };

            let class = failure.retry_class();
            let request_id = request_id_of(&failure);
            let request_id = request_id.as_deref().unwrap_or("-");

            if class == RetryClass::Permanent || attempt >= attempts {
                error!(
                    operation,
                    attempt,
                    attempts,
                    request_id,
                    error = %failure,
                    "S3 call failed"
                );
                return Err(failure);
            }

            let pause = if class == RetryClass::Throttled {
                self.governor.throttled();
                self.governor.pause()
            } else {
                backoff(attempt, self.config.retry_max_backoff_secs)
            };
            warn!(
                operation,
                attempt,
                attempts,
                request_id,
                ?class,
                ?pause,
                error = %failure,
                "S3 call failed, retrying"
            );
            sleep(pause).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl ObjectStorageBackend for S3ObjectStorage {
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<&str>,
    ) -> Result<ObjectList, StorageError> {
        debug!(bucket, prefix, ?continuation_token, "Listing objects");

        self.with_retry("list_objects", || async move {
            let sent = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .max_keys(self.config.list_page_size)
                .set_continuation_token(continuation_token.map(str::to_string))
                .send()
                .await;

            match sent {
                Ok(page) => Ok(ObjectList {
                    keys: page
                        .contents()
                        .iter()
                        .filter_map(|object| object.key())
                        .map(str::to_string)
                        .collect(),
                    continuation_token: page.next_continuation_token().map(str::to_string),
                    is_truncated: page.is_truncated().unwrap_or(false),
                }),
                Err(err) => Err(transport_failure("list_objects", &err).unwrap_or_else(|| {
                    service_failure(
                        "list_objects",
                        &err.into_service_error(),
                        StorageError::ListFailed,
                    )
                })),
            }
        })
        .await
    }

    async fn head_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<ObjectMetadata>, StorageError> {
        debug!(bucket, key, "Probing object");

        self.with_retry("head_object", || async move {
            match self.client.head_object().bucket(bucket).key(key).send().await {
                Ok(head) => Ok(Some(ObjectMetadata {
                    key: key.to_string(),
                    size: head
                        .content_length()
                        .and_then(|len| u64::try_from(len).ok())
                        .unwrap_or(0),
                })),
                Err(err) => {
                    if let Some(failure) = transport_failure("head_object", &err) {
                        return Err(failure);
                    }
                    let service = err.into_service_error();
                    if service.is_not_found() {
                        Ok(None)
                    } else {
                        Err(service_failure("head_object", &service, StorageError::Internal))
                    }
                }
            }
        })
        .await
    }

    async fn copy_object(
        &self,
        bucket: &str,
        source_key: &str,
        target_key: &str,
    ) -> Result<(), StorageError> {
        let copy_source = Self::copy_source(bucket, source_key);
        let copy_source = copy_source.as_str();
        debug!(bucket, source = source_key, target = target_key, "Copying object");

        self.with_retry("copy_object", || async move {
            let sent = self
                .client
                .copy_object()
                .bucket(bucket)
                .copy_source(copy_source)
                .key(target_key)
                .metadata_directive(MetadataDirective::Copy)
                .send()
                .await;

            let Err(err) = sent else {
                return Ok(());
            };
            if let Some(failure) = transport_failure("copy_object", &err) {
                return Err(failure);
            }
            let service = err.into_service_error();
            if service.is_object_not_in_active_tier_error() {
                return Err(StorageError::NotFound(format!(
                    "{source_key} is archived and cannot be copied"
                )));
            }
            match service_failure("copy_object", &service, StorageError::CopyFailed) {
                StorageError::CopyFailed(detail) if detail.contains("NoSuchKey") => Err(
                    StorageError::NotFound(format!("copy source {source_key} is missing")),
                ),
                failure => Err(failure),
            }
        })
        .await
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        debug!(bucket, key, "Deleting object");

        self.with_retry("delete_object", || async move {
            match self.client.delete_object().bucket(bucket).key(key).send().await {
                Ok(_) => Ok(()),
                Err(err) => Err(transport_failure("delete_object", &err).unwrap_or_else(|| {
                    service_failure(
                        "delete_object",
                        &err.into_service_error(),
                        StorageError::DeleteFailed,
                    )
                })),
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_source_encodes_segments_but_keeps_separators() {
        assert_eq!(
            S3ObjectStorage::copy_source("media", "photos/2024/a b+c.jpg"),
            "media/photos/2024/a%20b%2Bc.jpg"
        );
        assert_eq!(S3ObjectStorage::copy_source("media", "plain"), "media/plain");
    }

    #[test]
    fn test_governor_starts_at_base_pause() {
        assert_eq!(SlowDownGovernor::new().pause(), Duration::from_secs(1));
    }

    #[test]
    fn test_governor_backs_off_and_recovers() {
        let governor = SlowDownGovernor::new();

        governor.throttled();
        let first = governor.pause();
        governor.throttled();
        let second = governor.pause();
        assert!(second > first);

        governor.succeeded();
        assert!(governor.pause() < second);

        // Strikes were reset, so the next throttle starts at 2x again
        governor.throttled();
        assert_eq!(governor.pause(), Duration::from_secs(2));
    }

    #[test]
    fn test_governor_pause_is_capped() {
        let governor = SlowDownGovernor::new();
        for _ in 0..20 {
            governor.throttled();
        }
        assert!(governor.pause() <= Duration::from_millis(SLOWDOWN_CAP_MS));

        for _ in 0..20 {
            governor.succeeded();
        }
        assert_eq!(governor.pause(), Duration::from_secs(1));
    }

    #[test]
    fn test_backoff_grows_within_jitter_and_cap() {
        for attempt in 1..=4u32 {
            let base = BACKOFF_BASE_MS << (attempt - 1);
            let delay = backoff(attempt, 30).as_millis() as u64;
            assert!((base..=base + base / 4).contains(&delay), "attempt {attempt}: {delay}");
        }

        let capped = backoff(30, 1).as_millis() as u64;
        assert!((1000..=1250).contains(&capped));
    }

    #[test]
    fn test_request_id_patterns() {
        let error = StorageError::CopyFailed("AccessDenied: no (request id: ABC123DEF456)".into());
        assert_eq!(request_id_of(&error).as_deref(), Some("ABC123DEF456"));

        let error = StorageError::DeleteFailed("Error RequestId: XYZ-789-ABC".into());
        assert_eq!(request_id_of(&error).as_deref(), Some("XYZ-789-ABC"));

        let error = StorageError::Internal("no identifier here".into());
        assert!(request_id_of(&error).is_none());

        let error = StorageError::CopyFailed("request id: ".into());
        assert!(request_id_of(&error).is_none());
    }
}
