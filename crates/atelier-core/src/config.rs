//! Configuration management for Atelier
//!
//! This module provides the immutable per-run configuration: debate and
//! validation bounds, dedup policy, backend endpoints, storage paths, and
//! brand identity. Loaded once from `.atelier/config.toml` at run start
//! and passed by reference to every component; never mutated mid-run.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::Result;

/// Pipeline-level Atelier configuration
///
/// Loaded from `.atelier/config.toml` in the base directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Run mode recorded in every trace
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Debate engine bounds
    #[serde(default)]
    pub debate: DebateConfig,

    /// Semantic dedup policy
    #[serde(default)]
    pub dedup: DedupConfig,

    /// Final validation policy
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Model backend endpoints, tried in order
    #[serde(default)]
    pub backends: BackendsConfig,

    /// Run controls
    #[serde(default)]
    pub controls: Controls,

    /// Brand identity fixed inputs
    #[serde(default)]
    pub brand: BrandConfig,

    /// Storage locations, relative to the base directory
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Bounds for preparer/reviewer debates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateConfig {
    /// Maximum critique/revise rounds per debate
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Minimum reviewer score (1-10) required alongside approval
    #[serde(default = "default_pass_score")]
    pub pass_score: u8,
}

/// Semantic dedup policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Cosine similarity at or above this is a duplicate
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Topic regeneration attempts before the run aborts
    #[serde(default = "default_max_topic_attempts")]
    pub max_topic_attempts: u32,
}

/// Final validation policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Weighted checklist score (0-100) required to publish
    #[serde(default = "default_publish_threshold")]
    pub publish_threshold: f32,

    /// Synthesis regeneration attempts before the run aborts
    #[serde(default = "default_max_validation_attempts")]
    pub max_attempts: u32,
}

/// A single chat-completion endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendEndpoint {
    /// Model identifier sent to the API
    pub model: String,

    /// Base URL of the OpenAI-compatible API
    pub base_url: String,

    /// Environment variable holding the API key
    pub api_key_env: String,
}

/// Model backends: primary tried first, secondary on failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendsConfig {
    #[serde(default = "default_primary_backend")]
    pub primary: BackendEndpoint,

    #[serde(default = "default_secondary_backend")]
    pub secondary: BackendEndpoint,

    /// Embedding endpoint for the dedup gate
    #[serde(default = "default_embedding_backend")]
    pub embedding: BackendEndpoint,

    /// Upper bound on any single capability call
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Run controls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Controls {
    /// When false, runs complete without the publish transition
    #[serde(default = "default_publish_enabled")]
    pub publish_enabled: bool,
}

/// Brand identity injected as fixed input into content phases
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandConfig {
    #[serde(default = "default_author")]
    pub author: String,

    #[serde(default = "default_assistant")]
    pub assistant: String,

    /// Thematic filter every topic must connect to
    #[serde(default = "default_anchor_filter")]
    pub anchor_filter: String,
}

/// Storage locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_traces_dir")]
    pub traces_dir: PathBuf,

    /// Append-only log of published briefs
    #[serde(default = "default_publish_log")]
    pub publish_log: PathBuf,

    /// Append-only topic fingerprint history for the dedup gate
    #[serde(default = "default_topic_history")]
    pub topic_history: PathBuf,
}

// Default value providers
fn default_mode() -> String {
    "autonomous".to_string()
}

fn default_max_rounds() -> u32 {
    3
}

fn default_pass_score() -> u8 {
    7
}

fn default_similarity_threshold() -> f32 {
    0.70
}

fn default_max_topic_attempts() -> u32 {
    3
}

fn default_publish_threshold() -> f32 {
    80.0
}

fn default_max_validation_attempts() -> u32 {
    2
}

fn default_primary_backend() -> BackendEndpoint {
    BackendEndpoint {
        model: "gpt-4o".to_string(),
        base_url: "https://api.openai.com/v1".to_string(),
        api_key_env: "OPENAI_API_KEY".to_string(),
    }
}

fn default_secondary_backend() -> BackendEndpoint {
    BackendEndpoint {
        model: "gemini-2.0-flash".to_string(),
        base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
        api_key_env: "GEMINI_API_KEY".to_string(),
    }
}

fn default_embedding_backend() -> BackendEndpoint {
    BackendEndpoint {
        model: "text-embedding-3-small".to_string(),
        base_url: "https://api.openai.com/v1".to_string(),
        api_key_env: "OPENAI_API_KEY".to_string(),
    }
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_publish_enabled() -> bool {
    true
}

fn default_author() -> String {
    "Atelier Editorial".to_string()
}

fn default_assistant() -> String {
    "Orion Cael".to_string()
}

fn default_anchor_filter() -> String {
    "AI thought leadership".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_traces_dir() -> PathBuf {
    PathBuf::from("traces")
}

fn default_publish_log() -> PathBuf {
    PathBuf::from("publish_log.json")
}

fn default_topic_history() -> PathBuf {
    PathBuf::from("topic_history.json")
}

impl PipelineConfig {
    /// Load configuration from `.atelier/config.toml` or use defaults
    pub fn load_or_default(base_dir: &Path) -> Result<Self> {
        let config_path = base_dir.join(".atelier/config.toml");

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Ok(toml::from_str(&content).map_err(|e| {
                crate::AtelierError::Config(format!("failed to parse config file: {}", e))
            })?)
        } else {
            Ok(Self::default())
        }
    }

    /// Write default configuration to `.atelier/config.toml`
    pub fn write_default(base_dir: &Path) -> Result<PathBuf> {
        let config_dir = base_dir.join(".atelier");
        std::fs::create_dir_all(&config_dir)?;

        let config_path = config_dir.join("config.toml");
        let config = Self::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| crate::AtelierError::Config(format!("failed to serialize config: {}", e)))?;
        std::fs::write(&config_path, content)?;
        Ok(config_path)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            debate: DebateConfig::default(),
            dedup: DedupConfig::default(),
            validation: ValidationConfig::default(),
            backends: BackendsConfig::default(),
            controls: Controls::default(),
            brand: BrandConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Default for DebateConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            pass_score: default_pass_score(),
        }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            max_topic_attempts: default_max_topic_attempts(),
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            publish_threshold: default_publish_threshold(),
            max_attempts: default_max_validation_attempts(),
        }
    }
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            primary: default_primary_backend(),
            secondary: default_secondary_backend(),
            embedding: default_embedding_backend(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            publish_enabled: default_publish_enabled(),
        }
    }
}

impl Default for BrandConfig {
    fn default() -> Self {
        Self {
            author: default_author(),
            assistant: default_assistant(),
            anchor_filter: default_anchor_filter(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            traces_dir: default_traces_dir(),
            publish_log: default_publish_log(),
            topic_history: default_topic_history(),
        }
    }
}
