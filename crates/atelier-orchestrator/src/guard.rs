//! Reusable ethical/tone guard
//!
//! One guard capability invoked at multiple named checkpoints instead of
//! re-implemented per phase. Each checkpoint gets its own phase record,
//! so the defense-in-depth layers stay independently inspectable.

use atelier_core::{AgentOutput, Critique, Result};
use std::sync::Arc;

use crate::AgentCapability;

/// The non-negotiable content guardrail. Embedded in the writer,
/// editor, and guard system prompts, and enforced at the named
/// checkpoints.
pub const GUARDRAIL: &str =
    "CORE ETHICAL GUARDRAIL (non-negotiable): be honest and factual, but \
     frame everything with empathy. Never attack individuals. Critique \
     ideas and approaches, not people. If a statement could harm someone's \
     reputation or wellbeing, reframe it constructively or omit it.";

/// Named checkpoints where the guard runs
pub mod checkpoint {
    /// Brief-level neutrality and tone check before visuals
    pub const NEUTRALITY: &str = "NeutralityCheck";
    /// Post-copy check immediately before publishing
    pub const PUBLISH_GATE: &str = "PublishGate";
}

/// Wraps the guard capability for checkpoint invocations
pub struct GuardGate {
    guard: Arc<dyn AgentCapability>,
}

impl GuardGate {
    pub fn new(guard: Arc<dyn AgentCapability>) -> Self {
        Self { guard }
    }

    pub fn agent(&self) -> &Arc<dyn AgentCapability> {
        &self.guard
    }

    /// Review work against the guardrail at a named checkpoint
    pub async fn review(&self, checkpoint: &str, work: &AgentOutput) -> Result<Critique> {
        let rubric = format!(
            "Checkpoint '{}'. Enforce the guardrail strictly: {} Approve only \
             if the work passes in full.",
            checkpoint, GUARDRAIL
        );
        let critique = self.guard.critique(work, &rubric).await?;

        if critique.approved {
            tracing::info!(checkpoint, score = critique.score, "guard checkpoint passed");
        } else {
            tracing::warn!(
                checkpoint,
                score = critique.score,
                violations = critique.demands.len(),
                "guard checkpoint rejected work"
            );
        }
        Ok(critique)
    }
}
