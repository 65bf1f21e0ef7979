//! # atelier-dedup
//!
//! Semantic deduplication for Atelier: prevents publishing on the same
//! topic twice by comparing embedding vectors against the history of
//! every topic previously accepted for publication.

#![allow(dead_code)]

mod gate;
mod history;

pub use gate::{cosine_similarity, DedupGate, SimilarityVerdict};
pub use history::{HistoryStore, TopicFingerprint};
