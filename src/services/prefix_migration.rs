//! Prefix Migration Service
//!
//! Moves every object under one key prefix of a bucket to the same relative
//! path under another prefix. Keys are handled strictly one at a time:
//! existence probe, copy, then the optional delete of the original, before
//! the next key is listed.
//!
//! A key ends in exactly one of these states:
//!
//! ```text
//! Pending -> Evaluated{Skip | Proceed}
//!         -> DryRun | Copied | CopyFailed
//!         -> (delete_original) Deleted | DeleteFailed
//! ```
//!
//! Delete failures are recorded and the run continues. Copy failures follow
//! the request's [`CopyFailurePolicy`].

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{error, info, warn};

use super::conflict::{ConflictResolver, Resolution};
use super::enumerator::PrefixEnumerator;
use super::key_mapper::{KeyMapper, KeyMapping};
use super::object_storage::{ObjectStorageBackend, StorageError};
use super::progress::ProgressReporter;
use crate::models::{
    ActionRecord, CopyFailurePolicy, DeleteOutcome, KeyOutcome, MigrationRequest, RunStats,
    SampleLog,
};

/// Errors that end a migration run early
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Listing the source prefix failed
    #[error("Listing failed: {0}")]
    Listing(#[from] StorageError),

    /// A copy failed under the abort policy
    #[error("Copy {source_key} -> {target_key} failed: {error}")]
    CopyFailed {
        source_key: String,
        target_key: String,
        #[source]
        error: StorageError,
    },
}

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct MigrationOutcome {
    pub stats: RunStats,
    pub samples: Vec<ActionRecord>,
    /// Nothing was found under the source prefix
    pub no_objects: bool,
}

/// Drives one migration request against a store
pub struct PrefixMigrator {
    storage: Arc<dyn ObjectStorageBackend>,
    request: MigrationRequest,
}

impl PrefixMigrator {
    pub fn new(storage: Arc<dyn ObjectStorageBackend>, request: MigrationRequest) -> Self {
        Self { storage, request }
    }

    #[must_use]
    pub fn request(&self) -> &MigrationRequest {
        &self.request
    }

    /// Run the migration to completion, the limit, or the first fatal error
    ///
    /// In bar mode the prefix is counted first with its own traversal; an
    /// empty count ends the run without a processing pass.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Listing` when a listing page cannot be
    /// fetched, and `MigrationError::CopyFailed` when a copy fails under
    /// [`CopyFailurePolicy::Abort`].
    pub async fn run(
        &self,
        reporter: &mut ProgressReporter,
    ) -> Result<MigrationOutcome, MigrationError> {
        let started = Instant::now();
        let request = &self.request;

        info!(
            bucket = %request.bucket,
            source = %request.source,
            target = %request.target,
            dry_run = request.dry_run,
            overwrite = request.overwrite,
            delete_original = request.delete_original,
            limit = ?request.limit,
            "Starting prefix migration"
        );

        let enumerator = PrefixEnumerator::new(
            Arc::clone(&self.storage),
            &request.bucket,
            &request.source,
            request.limit,
        );

        let total = if reporter.needs_total() {
            let total = enumerator.count().await?;
            if total == 0 {
                info!(source = %request.source, "No objects found under source prefix");
                let mut stats = RunStats::default();
                stats.finish(started.elapsed());
                return Ok(MigrationOutcome {
                    stats,
                    samples: Vec::new(),
                    no_objects: true,
                });
            }
            Some(total)
        } else {
            None
        };

        reporter.start(total);
        let result = self.process(&enumerator, reporter).await;
        reporter.finish();

        let (mut stats, samples) = result?;
        stats.finish(started.elapsed());

        info!(
            processed = stats.processed,
            copied = stats.copied,
            skipped = stats.skipped,
            deleted = stats.deleted_count,
            failed = stats.failed,
            elapsed_seconds = stats.elapsed_seconds,
            rate_per_second = stats.rate_per_second,
            "Prefix migration finished"
        );

        Ok(MigrationOutcome {
            no_objects: stats.processed == 0,
            stats,
            samples: samples.into_records(),
        })
    }

    async fn process(
        &self,
        enumerator: &PrefixEnumerator,
        reporter: &ProgressReporter,
    ) -> Result<(RunStats, SampleLog), MigrationError> {
        let mapper = KeyMapper::new(&self.request.source, &self.request.target);
        let resolver = ConflictResolver::new(
            Arc::clone(&self.storage),
            &self.request.bucket,
            self.request.overwrite,
        );

        let mut stats = RunStats::default();
        let mut samples = SampleLog::default();
        let mut keys = enumerator.keys();

        while let Some(key) = keys.next_key().await? {
            let Some(mapping) = mapper.map(&key) else {
                continue;
            };

            let outcome = self
                .migrate_key(&mapping, &resolver, reporter, &mut samples)
                .await?;
            stats.record(&outcome);
            reporter.advance(&stats);

            if self.request.limit_reached(stats.processed) {
                info!(limit = ?self.request.limit, "Limit reached, stopping");
                break;
            }
        }

        Ok((stats, samples))
    }

    async fn migrate_key(
        &self,
        mapping: &KeyMapping,
        resolver: &ConflictResolver,
        reporter: &ProgressReporter,
        samples: &mut SampleLog,
    ) -> Result<KeyOutcome, MigrationError> {
        let KeyMapping {
            source_key,
            target_key,
        } = mapping;
        reporter.narrate(&format!("Found: {source_key} → {target_key}"));

        if resolver.resolve(target_key).await == Resolution::Skip {
            reporter.narrate(&format!("Skipping existing target: {target_key}"));
            samples.push(ActionRecord::Skipped {
                source: source_key.clone(),
                target: target_key.clone(),
            });
            return Ok(KeyOutcome::Skipped);
        }

        if self.request.dry_run {
            reporter.narrate(&format!("[dry] Would copy {source_key} → {target_key}"));
            samples.push(ActionRecord::DryRun {
                source: source_key.clone(),
                target: target_key.clone(),
            });
            return Ok(KeyOutcome::DryRun);
        }

        reporter.narrate("Copying...");
        if let Err(e) = self
            .storage
            .copy_object(&self.request.bucket, source_key, target_key)
            .await
        {
            return match self.request.copy_failure_policy {
                CopyFailurePolicy::Record => {
                    warn!(source = %source_key, target = %target_key, error = %e, "Copy failed");
                    reporter.narrate(&format!("Copy failed: {e}"));
                    samples.push(ActionRecord::CopyFailed {
                        source: source_key.clone(),
                        target: target_key.clone(),
                        error: e.to_string(),
                    });
                    Ok(KeyOutcome::CopyFailed {
                        error: e.to_string(),
                    })
                }
                CopyFailurePolicy::Abort => {
                    error!(source = %source_key, target = %target_key, error = %e, "Copy failed, aborting run");
                    Err(MigrationError::CopyFailed {
                        source_key: source_key.clone(),
                        target_key: target_key.clone(),
                        error: e,
                    })
                }
            };
        }
        samples.push(ActionRecord::Copied {
            source: source_key.clone(),
            target: target_key.clone(),
        });

        let delete = if self.request.delete_original {
            Some(self.delete_original(source_key, reporter, samples).await)
        } else {
            None
        };
        Ok(KeyOutcome::Copied { delete })
    }

    async fn delete_original(
        &self,
        source_key: &str,
        reporter: &ProgressReporter,
        samples: &mut SampleLog,
    ) -> DeleteOutcome {
        reporter.narrate("Deleting original...");
        match self
            .storage
            .delete_object(&self.request.bucket, source_key)
            .await
        {
            Ok(()) => {
                samples.push(ActionRecord::Deleted {
                    source: source_key.to_string(),
                });
                DeleteOutcome::Deleted
            }
            Err(e) => {
                warn!(source = %source_key, error = %e, "Failed to delete original after copy");
                reporter.narrate(&format!("Delete failed: {e}"));
                samples.push(ActionRecord::DeleteFailed {
                    source: source_key.to_string(),
                    error: e.to_string(),
                });
                DeleteOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MigrationOptions, ProgressMode};
    use crate::services::memory_storage::InMemoryStorage;

    fn request(configure: impl FnOnce(&mut MigrationOptions)) -> MigrationRequest {
        let mut options = MigrationOptions {
            source: Some("src".into()),
            target: Some("dst".into()),
            bucket: Some("media".into()),
            summary_only: true,
            ..MigrationOptions::default()
        };
        configure(&mut options);
        MigrationRequest::from_options(options, None).unwrap()
    }

    fn store(keys: &[&str]) -> Arc<InMemoryStorage> {
        let store = InMemoryStorage::with_page_size(2);
        for key in keys {
            store.put("media", key, key.as_bytes().to_vec());
        }
        Arc::new(store)
    }

    async fn run(
        store: &Arc<InMemoryStorage>,
        request: MigrationRequest,
    ) -> Result<MigrationOutcome, MigrationError> {
        let mut reporter = ProgressReporter::silent();
        PrefixMigrator::new(store.clone(), request)
            .run(&mut reporter)
            .await
    }

    #[tokio::test]
    async fn test_copies_every_key_and_keeps_originals() {
        let store = store(&["src/a", "src/b", "src/c"]);
        let outcome = run(&store, request(|_| {})).await.unwrap();

        assert_eq!(outcome.stats.processed, 3);
        assert_eq!(outcome.stats.copied, 3);
        assert!(!outcome.no_objects);
        assert_eq!(store.get("media", "dst/b").unwrap(), b"src/b".to_vec());
        assert!(store.contains("media", "src/b"));
    }

    #[tokio::test]
    async fn test_copy_failure_is_recorded_by_default() {
        let store = store(&["src/a", "src/b"]);
        store.fail_copy("src/a");

        let outcome = run(&store, request(|o| o.delete_original = true))
            .await
            .unwrap();

        assert_eq!(outcome.stats.processed, 2);
        assert_eq!(outcome.stats.copied, 1);
        assert_eq!(outcome.stats.failed, 1);
        assert_eq!(outcome.stats.deleted_count, 1);
        assert!(matches!(
            &outcome.samples[0],
            ActionRecord::CopyFailed { source, .. } if source == "src/a"
        ));
        // Original of a failed copy is never deleted
        assert!(store.contains("media", "src/a"));
        assert!(!store.contains("media", "src/b"));
    }

    #[tokio::test]
    async fn test_copy_failure_aborts_with_fail_fast() {
        let store = store(&["src/a", "src/b"]);
        store.fail_copy("src/a");

        let err = run(&store, request(|o| o.fail_fast = true))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            MigrationError::CopyFailed { ref source_key, .. } if source_key == "src/a"
        ));
        assert!(!store.contains("media", "dst/b"));
    }

    #[tokio::test]
    async fn test_listing_failure_is_fatal() {
        let store = store(&["src/a"]);
        store.fail_list();
        let err = run(&store, request(|_| {})).await.unwrap_err();
        assert!(matches!(err, MigrationError::Listing(_)));
    }

    #[tokio::test]
    async fn test_limit_caps_decisions() {
        let store = store(&["src/a", "src/b", "src/c", "src/d", "src/e"]);
        let outcome = run(&store, request(|o| o.limit = Some(3))).await.unwrap();

        assert_eq!(outcome.stats.processed, 3);
        assert_eq!(store.calls().heads.len(), 3);
        assert_eq!(store.calls().copies.len(), 3);
        assert!(!store.contains("media", "dst/d"));
    }

    #[tokio::test]
    async fn test_bar_mode_short_circuits_on_empty_prefix() {
        let store = store(&["other/a"]);
        let request = request(|o| o.summary_only = false);
        assert_eq!(request.progress_mode, ProgressMode::Bar);

        let mut reporter = ProgressReporter::new(ProgressMode::Bar, true);
        let outcome = PrefixMigrator::new(store.clone(), request)
            .run(&mut reporter)
            .await
            .unwrap();

        assert!(outcome.no_objects);
        assert_eq!(outcome.stats.processed, 0);
        // Only the counting pass listed; nothing was probed
        assert_eq!(store.calls().lists, 1);
        assert_eq!(store.calls().heads.len(), 0);
    }

    #[tokio::test]
    async fn test_bar_mode_counts_then_processes_from_the_start() {
        let store = store(&["src/a", "src/b", "src/c"]);
        let mut reporter = ProgressReporter::new(ProgressMode::Bar, true);
        let outcome = PrefixMigrator::new(store.clone(), request(|o| o.summary_only = false))
            .run(&mut reporter)
            .await
            .unwrap();

        assert_eq!(outcome.stats.copied, 3);
        // Two pages for the count, two more for the processing pass
        assert_eq!(store.calls().lists, 4);
    }

    #[tokio::test]
    async fn test_dry_run_records_intent_only() {
        let store = store(&["src/a", "src/b"]);
        store.put("media", "dst/b", b"old".to_vec());

        let outcome = run(
            &store,
            request(|o| {
                o.dry_run = true;
                o.delete_original = true;
            }),
        )
        .await
        .unwrap();

        assert_eq!(outcome.stats.processed, 2);
        assert_eq!(outcome.stats.skipped, 1);
        assert_eq!(outcome.stats.copied, 0);
        assert_eq!(outcome.stats.deleted_count, 0);
        assert_eq!(store.calls().copies.len(), 0);
        assert_eq!(store.calls().deletes.len(), 0);
        assert_eq!(
            outcome.samples,
            vec![
                ActionRecord::DryRun {
                    source: "src/a".into(),
                    target: "dst/a".into()
                },
                ActionRecord::Skipped {
                    source: "src/b".into(),
                    target: "dst/b".into()
                },
            ]
        );
    }
}
