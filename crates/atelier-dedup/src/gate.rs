//! Semantic dedup gate: prevents publishing the same topic twice
//!
//! Candidate topics are embedded and compared by cosine similarity
//! against every stored fingerprint. At or above the threshold the
//! candidate is a duplicate and the discovery phase must request a new
//! one. Fingerprints are recorded only after a topic is accepted into a
//! published run; rejected and aborted runs never pollute history.
//!
//! The history is cross-run shared state. One async mutex serializes
//! `check` against `record`, so two overlapping runs cannot both pass
//! the gate with the same not-yet-recorded candidate.

use atelier_agent::EmbeddingBackend;
use atelier_core::{Result, TopicCandidate};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::history::{HistoryStore, TopicFingerprint};

/// Similarity verdict for one candidate
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityVerdict {
    pub too_similar: bool,
    pub max_similarity: f32,
    /// Closest stored topic, when history is non-empty
    pub matched_topic: Option<String>,
}

/// Embedding-similarity gate over the published-topic history
pub struct DedupGate {
    backend: Arc<dyn EmbeddingBackend>,
    threshold: f32,
    store: HistoryStore,
    history: Mutex<Vec<TopicFingerprint>>,
}

impl DedupGate {
    /// Construct the gate, loading history from `history_path`
    pub fn load(
        backend: Arc<dyn EmbeddingBackend>,
        threshold: f32,
        history_path: impl Into<PathBuf>,
    ) -> Result<Self> {
        let store = HistoryStore::new(history_path);
        let history = store.load()?;
        tracing::debug!(
            fingerprints = history.len(),
            threshold,
            "dedup gate loaded"
        );
        Ok(Self {
            backend,
            threshold,
            store,
            history: Mutex::new(history),
        })
    }

    /// Full similarity verdict for a candidate
    pub async fn check(&self, candidate: &TopicCandidate) -> Result<SimilarityVerdict> {
        let history = self.history.lock().await;

        if history.is_empty() {
            tracing::info!("no published topics yet, candidate is unique");
            return Ok(SimilarityVerdict {
                too_similar: false,
                max_similarity: 0.0,
                matched_topic: None,
            });
        }

        let vector = self.backend.embed(&candidate.fingerprint_text()).await?;

        let mut max_similarity = 0.0_f32;
        let mut matched_topic = None;
        for fingerprint in history.iter() {
            if fingerprint.vector.is_empty() {
                continue;
            }
            let similarity = cosine_similarity(&vector, &fingerprint.vector);
            if similarity > max_similarity {
                max_similarity = similarity;
                matched_topic = Some(fingerprint.topic.clone());
            }
        }

        let too_similar = max_similarity >= self.threshold;
        if too_similar {
            tracing::warn!(
                headline = %candidate.headline,
                similarity = max_similarity,
                matched = matched_topic.as_deref().unwrap_or("?"),
                "duplicate topic blocked"
            );
        } else {
            tracing::info!(
                headline = %candidate.headline,
                max_similarity,
                "candidate is unique"
            );
        }

        Ok(SimilarityVerdict {
            too_similar,
            max_similarity,
            matched_topic,
        })
    }

    /// Boolean membership view of [`check`](Self::check)
    pub async fn is_too_similar(&self, candidate: &TopicCandidate) -> Result<bool> {
        Ok(self.check(candidate).await?.too_similar)
    }

    /// Record a topic accepted for publication. Only call after the run's
    /// topic is finalized and published.
    pub async fn record(&self, candidate: &TopicCandidate, post_ref: &str) -> Result<()> {
        let mut history = self.history.lock().await;

        let text = candidate.fingerprint_text();
        let vector = self.backend.embed(&text).await?;

        history.push(TopicFingerprint {
            topic: candidate.headline.clone(),
            text,
            vector,
            accepted_at: Utc::now(),
            post_ref: post_ref.to_string(),
        });
        self.store.write(&history)?;

        tracing::info!(headline = %candidate.headline, "topic fingerprint recorded");
        Ok(())
    }

    /// Embed any historical entries that are missing vectors (entries
    /// imported from a publish log predating the gate)
    pub async fn backfill(&self) -> Result<usize> {
        let mut history = self.history.lock().await;

        let mut added = 0;
        for fingerprint in history.iter_mut() {
            if fingerprint.vector.is_empty() && !fingerprint.text.is_empty() {
                fingerprint.vector = self.backend.embed(&fingerprint.text).await?;
                added += 1;
            }
        }
        if added > 0 {
            self.store.write(&history)?;
            tracing::info!(added, "backfilled fingerprint embeddings");
        }
        Ok(added)
    }

    /// Stored fingerprint count
    pub async fn len(&self) -> usize {
        self.history.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.history.lock().await.is_empty()
    }

    /// Topics in acceptance order, newest last
    pub async fn topics(&self) -> Vec<String> {
        self.history
            .lock()
            .await
            .iter()
            .map(|f| f.topic.clone())
            .collect()
    }
}

/// Cosine similarity between two vectors. Mismatched dimensions compare
/// over the shorter prefix; zero magnitude yields 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}
