//! In-memory object storage
//!
//! An `ObjectStorageBackend` over an ordered map. Listing is lexicographic
//! and paginated like S3, failures can be injected per key, and every call
//! is recorded so tests can assert exactly which keys were touched.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::object_storage::{ObjectList, ObjectMetadata, ObjectStorageBackend, StorageError};

/// Same page size S3 uses by default
const DEFAULT_PAGE_SIZE: usize = 1000;

/// Keys whose operations should fail
#[derive(Debug, Default)]
struct FailurePlan {
    head: HashSet<String>,
    copy: HashSet<String>,
    delete: HashSet<String>,
    list: bool,
}

/// Every call made against the store, in order
#[derive(Debug, Default, Clone)]
pub struct CallLog {
    /// Number of `list_objects` calls
    pub lists: usize,
    /// Keys passed to `head_object`
    pub heads: Vec<String>,
    /// `(source, target)` pairs passed to `copy_object`
    pub copies: Vec<(String, String)>,
    /// Keys passed to `delete_object`
    pub deletes: Vec<String>,
}

/// Ordered in-memory store keyed by `(bucket, key)`
#[derive(Debug)]
pub struct InMemoryStorage {
    objects: Mutex<BTreeMap<(String, String), Vec<u8>>>,
    failures: Mutex<FailurePlan>,
    calls: Mutex<CallLog>,
    page_size: usize,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Store whose listing pages hold at most `page_size` keys
    #[must_use]
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            failures: Mutex::new(FailurePlan::default()),
            calls: Mutex::new(CallLog::default()),
            page_size: page_size.max(1),
        }
    }

    pub fn put(&self, bucket: &str, key: &str, data: impl Into<Vec<u8>>) {
        lock(&self.objects).insert((bucket.to_string(), key.to_string()), data.into());
    }

    #[must_use]
    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        lock(&self.objects).contains_key(&(bucket.to_string(), key.to_string()))
    }

    #[must_use]
    pub fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        lock(&self.objects)
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// All keys of a bucket in lexicographic order
    #[must_use]
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        lock(&self.objects)
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, key)| key.clone())
            .collect()
    }

    /// Make existence probes of `key` fail with a transient error
    pub fn fail_head(&self, key: &str) {
        lock(&self.failures).head.insert(key.to_string());
    }

    /// Make copies from `source_key` fail
    pub fn fail_copy(&self, source_key: &str) {
        lock(&self.failures).copy.insert(source_key.to_string());
    }

    /// Make deletes of `key` fail
    pub fn fail_delete(&self, key: &str) {
        lock(&self.failures).delete.insert(key.to_string());
    }

    /// Make every listing call fail
    pub fn fail_list(&self) {
        lock(&self.failures).list = true;
    }

    /// Snapshot of the calls made so far
    #[must_use]
    pub fn calls(&self) -> CallLog {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl ObjectStorageBackend for InMemoryStorage {
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<&str>,
    ) -> Result<ObjectList, StorageError> {
        lock(&self.calls).lists += 1;

        if lock(&self.failures).list {
            return Err(StorageError::ListFailed(format!(
                "injected listing failure for {bucket}/{prefix}"
            )));
        }

        // The token is the last key of the previous page
        let mut matching = lock(&self.objects)
            .keys()
            .filter(|(b, key)| {
                b == bucket
                    && key.starts_with(prefix)
                    && continuation_token.is_none_or(|after| key.as_str() > after)
            })
            .map(|(_, key)| key.clone())
            .take(self.page_size + 1)
            .collect::<Vec<_>>();

        let is_truncated = matching.len() > self.page_size;
        matching.truncate(self.page_size);
        let continuation_token = if is_truncated {
            matching.last().cloned()
        } else {
            None
        };

        Ok(ObjectList {
            keys: matching,
            continuation_token,
            is_truncated,
        })
    }

    async fn head_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<ObjectMetadata>, StorageError> {
        lock(&self.calls).heads.push(key.to_string());

        if lock(&self.failures).head.contains(key) {
            return Err(StorageError::ConnectionError(format!(
                "injected probe failure for {key}"
            )));
        }

        Ok(self.get(bucket, key).map(|data| ObjectMetadata {
            key: key.to_string(),
            size: data.len() as u64,
        }))
    }

    async fn copy_object(
        &self,
        bucket: &str,
        source_key: &str,
        target_key: &str,
    ) -> Result<(), StorageError> {
        lock(&self.calls)
            .copies
            .push((source_key.to_string(), target_key.to_string()));

        if lock(&self.failures).copy.contains(source_key) {
            return Err(StorageError::CopyFailed(format!(
                "injected copy failure for {source_key}"
            )));
        }

        let data = self
            .get(bucket, source_key)
            .ok_or_else(|| StorageError::NotFound(format!("Source object not found: {source_key}")))?;
        self.put(bucket, target_key, data);
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        lock(&self.calls).deletes.push(key.to_string());

        if lock(&self.failures).delete.contains(key) {
            return Err(StorageError::DeleteFailed(format!(
                "injected delete failure for {key}"
            )));
        }

        lock(&self.objects).remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }
}
