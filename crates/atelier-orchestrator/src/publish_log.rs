//! Append-only publish log
//!
//! One entry per published brief. The strategist reads the most recent
//! content types from here to keep output varied across runs.

use atelier_core::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One published brief
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishLogEntry {
    pub post_ref: String,
    pub url: String,
    pub topic: String,
    pub brief_title: String,
    pub document_title: String,
    pub content_type: String,
    pub design_name: String,
    pub world_mood: String,
    pub run_id: String,
    pub published_at: DateTime<Utc>,
    pub status: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PublishLogFile {
    posts: Vec<PublishLogEntry>,
    total_posts: usize,
}

/// File-backed publish log
pub struct PublishLog {
    path: PathBuf,
}

impl PublishLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries, oldest first; a missing file is an empty log
    pub fn load(&self) -> Result<Vec<PublishLogEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        let file: PublishLogFile = serde_json::from_str(&content)?;
        Ok(file.posts)
    }

    /// Append one entry
    pub fn append(&self, entry: PublishLogEntry) -> Result<()> {
        let mut posts = self.load()?;
        posts.push(entry);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = PublishLogFile {
            total_posts: posts.len(),
            posts,
        };
        std::fs::write(&self.path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }

    /// Content types of the last `n` published briefs, for variety
    pub fn recent_content_types(&self, n: usize) -> Result<Vec<String>> {
        let posts = self.load()?;
        Ok(posts
            .iter()
            .rev()
            .take(n)
            .map(|p| p.content_type.clone())
            .collect())
    }
}
