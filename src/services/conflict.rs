//! Conflict resolution for target keys

use std::sync::Arc;

use tracing::{debug, warn};

use super::object_storage::ObjectStorageBackend;

/// Outcome of an existence probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    Exists,
    Missing,
    /// The probe itself failed; carries the reason
    Failed(String),
}

/// Whether a key should be copied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Skip,
    Proceed,
}

/// Decides skip vs. proceed from the target's existence
///
/// Runs the same way in dry runs so skip counts stay meaningful.
pub struct ConflictResolver {
    storage: Arc<dyn ObjectStorageBackend>,
    bucket: String,
    overwrite: bool,
}

impl ConflictResolver {
    pub fn new(storage: Arc<dyn ObjectStorageBackend>, bucket: &str, overwrite: bool) -> Self {
        Self {
            storage,
            bucket: bucket.to_string(),
            overwrite,
        }
    }

    /// Probe `target_key` without turning failures into errors
    pub async fn probe(&self, target_key: &str) -> Probe {
        match self.storage.head_object(&self.bucket, target_key).await {
            Ok(Some(_)) => Probe::Exists,
            Ok(None) => Probe::Missing,
            Err(e) => Probe::Failed(e.to_string()),
        }
    }

    /// Skip an existing target unless overwriting; a failed probe counts
    /// as missing.
    pub async fn resolve(&self, target_key: &str) -> Resolution {
        let probe = self.probe(target_key).await;
        let exists = match probe {
            Probe::Exists => true,
            Probe::Missing => false,
            Probe::Failed(reason) => {
                warn!(
                    key = %target_key,
                    error = %reason,
                    "Existence probe failed, treating target as missing"
                );
                false
            }
        };

        let resolution = if exists && !self.overwrite {
            Resolution::Skip
        } else {
            Resolution::Proceed
        };
        debug!(key = %target_key, exists, ?resolution, "Resolved target conflict");
        resolution
    }
}
