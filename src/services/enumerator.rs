//! Prefix enumeration
//!
//! Keys under a source prefix come from a [`KeyPager`], a cursor over the
//! store's paginated listing. Every traversal builds its own pager, so the
//! counting pass used for the progress bar never shares state with the
//! processing pass.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::debug;

use super::object_storage::{ObjectStorageBackend, StorageError};

/// Produces independent traversals of one prefix
#[derive(Clone)]
pub struct PrefixEnumerator {
    storage: Arc<dyn ObjectStorageBackend>,
    bucket: String,
    prefix: String,
    limit: Option<u64>,
}

impl PrefixEnumerator {
    /// `source` is the prefix without trailing slash; listing uses `source/`
    pub fn new(
        storage: Arc<dyn ObjectStorageBackend>,
        bucket: &str,
        source: &str,
        limit: Option<u64>,
    ) -> Self {
        Self {
            storage,
            bucket: bucket.to_string(),
            prefix: format!("{source}/"),
            limit,
        }
    }

    /// A fresh traversal from the first page
    #[must_use]
    pub fn keys(&self) -> KeyPager {
        KeyPager {
            storage: Arc::clone(&self.storage),
            bucket: self.bucket.clone(),
            prefix: self.prefix.clone(),
            limit: self.limit,
            buffer: VecDeque::new(),
            continuation_token: None,
            exhausted: false,
            yielded: 0,
            pages: 0,
        }
    }

    /// Count keys with a traversal of its own, capped at the limit
    ///
    /// # Errors
    ///
    /// Propagates listing failures.
    pub async fn count(&self) -> Result<u64, StorageError> {
        let mut pager = self.keys();
        while pager.next_key().await?.is_some() {}

        debug!(
            prefix = %self.prefix,
            total = pager.yielded(),
            pages = pager.pages(),
            "Counted keys under prefix"
        );
        Ok(pager.yielded())
    }
}

/// Cursor over the keys of one prefix, fetching pages lazily
pub struct KeyPager {
    storage: Arc<dyn ObjectStorageBackend>,
    bucket: String,
    prefix: String,
    limit: Option<u64>,
    buffer: VecDeque<String>,
    continuation_token: Option<String>,
    exhausted: bool,
    yielded: u64,
    pages: u64,
}

impl KeyPager {
    /// Next key under the prefix, or `None` once the listing or the limit
    /// is exhausted
    ///
    /// Keys outside `prefix` are dropped; no page is requested after the
    /// limit is reached.
    ///
    /// # Errors
    ///
    /// Propagates listing failures.
    pub async fn next_key(&mut self) -> Result<Option<String>, StorageError> {
        loop {
            if self.limit.is_some_and(|limit| self.yielded >= limit) {
                return Ok(None);
            }

            if let Some(key) = self.buffer.pop_front() {
                if !key.starts_with(&self.prefix) {
                    debug!(key = %key, prefix = %self.prefix, "Discarding key outside prefix");
                    continue;
                }
                self.yielded += 1;
                return Ok(Some(key));
            }

            if self.exhausted {
                return Ok(None);
            }

            self.fetch_page().await?;
        }
    }

    async fn fetch_page(&mut self) -> Result<(), StorageError> {
        let page = self
            .storage
            .list_objects(&self.bucket, &self.prefix, self.continuation_token.as_deref())
            .await?;
        self.pages += 1;

        debug!(
            prefix = %self.prefix,
            page = self.pages,
            keys = page.keys.len(),
            truncated = page.is_truncated,
            "Fetched listing page"
        );

        self.exhausted = !page.has_more();
        self.continuation_token = page.continuation_token;
        self.buffer.extend(page.keys);
        Ok(())
    }

    /// Keys yielded so far
    #[must_use]
    pub fn yielded(&self) -> u64 {
        self.yielded
    }

    /// Listing pages fetched so far
    #[must_use]
    pub fn pages(&self) -> u64 {
        self.pages
    }
}
