//! Durable topic fingerprint history
//!
//! Append-only JSON store of every topic accepted for publication.
//! Loaded once at gate construction; rewritten in full on append (entry
//! count is a few per day, so the full rewrite is cheap).

use atelier_core::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One published topic: its embedding plus the text it came from.
/// Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicFingerprint {
    /// Headline label, for duplicate reports
    pub topic: String,
    /// The exact text that was embedded
    pub text: String,
    pub vector: Vec<f32>,
    pub accepted_at: DateTime<Utc>,
    #[serde(default)]
    pub post_ref: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct HistoryFile {
    fingerprints: Vec<TopicFingerprint>,
}

/// File-backed fingerprint store
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all fingerprints; a missing file is an empty history
    pub fn load(&self) -> Result<Vec<TopicFingerprint>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        let file: HistoryFile = serde_json::from_str(&content)?;
        Ok(file.fingerprints)
    }

    /// Persist the full fingerprint list
    pub fn write(&self, fingerprints: &[TopicFingerprint]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = HistoryFile {
            fingerprints: fingerprints.to_vec(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("topic_history.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("topic_history.json"));

        let fingerprints = vec![TopicFingerprint {
            topic: "Model ships".to_string(),
            text: "Model ships | A new model".to_string(),
            vector: vec![0.1, 0.2, 0.3],
            accepted_at: Utc::now(),
            post_ref: "post-1".to_string(),
        }];
        store.write(&fingerprints).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, fingerprints);
    }
}
