//! Source-key to target-key mapping

/// A source key and the key it moves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMapping {
    pub source_key: String,
    pub target_key: String,
}

/// Rewrites keys under `source/` to the same relative path under `target/`
#[derive(Debug, Clone)]
pub struct KeyMapper {
    source_prefix: String,
    target: String,
}

impl KeyMapper {
    /// `source` and `target` are prefixes without trailing slash
    #[must_use]
    pub fn new(source: &str, target: &str) -> Self {
        Self {
            source_prefix: format!("{source}/"),
            target: target.to_string(),
        }
    }

    /// `target + "/" + key[len(source) + 1..]`
    ///
    /// `None` when the key is not under the source prefix.
    #[must_use]
    pub fn map(&self, source_key: &str) -> Option<KeyMapping> {
        let relative = source_key.strip_prefix(&self.source_prefix)?;
        Some(KeyMapping {
            source_key: source_key.to_string(),
            target_key: format!("{}/{}", self.target, relative),
        })
    }
}
