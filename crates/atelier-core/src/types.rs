//! Core type definitions for the Atelier pipeline
//!
//! Every agent role produces a tagged output variant with an explicit
//! schema. Shape validation happens at the capability-adapter boundary,
//! so downstream phases can assume well-formed input.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Run mode flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    #[default]
    Autonomous,
    Manual,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Autonomous => write!(f, "autonomous"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

impl std::str::FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "autonomous" => Ok(Self::Autonomous),
            "manual" => Ok(Self::Manual),
            _ => Err(format!("Invalid run mode: {}", s)),
        }
    }
}

/// Terminal and in-flight run status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    /// All phases ran and the artifact was published
    Published,
    /// All requested phases ran without publishing (dry-run / no-publish)
    Completed,
    /// Strategist vetoed output for this cycle
    Silenced,
    /// Policy or failure abort with reason
    Aborted(String),
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// One end-to-end pipeline execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub run_id: String,
    pub mode: RunMode,
    pub started_at: DateTime<Utc>,
    pub status: RunStatus,
    pub elapsed_seconds: f64,
}

impl Run {
    /// Start a new run with a fresh identifier
    pub fn begin(mode: RunMode) -> Self {
        let started_at = Utc::now();
        let run_id = format!(
            "run_{}_{}",
            started_at.format("%Y%m%d_%H%M%S"),
            &Uuid::new_v4().to_string()[..8]
        );
        Self {
            run_id,
            mode,
            started_at,
            status: RunStatus::Running,
            elapsed_seconds: 0.0,
        }
    }

    /// Finalize the run with a terminal status
    pub fn finish(&mut self, status: RunStatus) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.elapsed_seconds = (Utc::now() - self.started_at).num_milliseconds() as f64 / 1000.0;
    }
}

/// World mood bands derived from the sentiment score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mood {
    ExtremeSad,
    Anxious,
    Normal,
    Optimistic,
    Euphoric,
}

impl Mood {
    /// Map a -100..=100 sentiment score to its mood band
    pub fn from_score(score: i32) -> Self {
        match score {
            i32::MIN..=-60 => Self::ExtremeSad,
            -59..=-20 => Self::Anxious,
            -19..=20 => Self::Normal,
            21..=60 => Self::Optimistic,
            _ => Self::Euphoric,
        }
    }
}

impl std::fmt::Display for Mood {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExtremeSad => write!(f, "extreme_sad"),
            Self::Anxious => write!(f, "anxious"),
            Self::Normal => write!(f, "normal"),
            Self::Optimistic => write!(f, "optimistic"),
            Self::Euphoric => write!(f, "euphoric"),
        }
    }
}

/// Global sentiment assessment that drives all downstream agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldPulse {
    /// Sentiment score, -100 (tragedy) to 100 (euphoria)
    pub sentiment_score: i32,
    pub mood: Mood,
    #[serde(default)]
    pub trending: Vec<String>,
    #[serde(default)]
    pub ai_news: Vec<String>,
    pub summary: String,
}

/// Content strategy: what kind of piece to produce this cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentStrategy {
    pub content_type: String,
    pub topic_direction: String,
    pub page_count: u32,
    /// Explicit veto: when true nothing is published this cycle
    #[serde(default)]
    pub silent: bool,
    pub rationale: String,
}

/// A candidate story to build the brief around
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicCandidate {
    pub headline: String,
    pub summary: String,
    #[serde(default)]
    pub impact_areas: Vec<String>,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub key_quote: String,
}

impl TopicCandidate {
    /// Rich text representation for embedding. Combining headline,
    /// summary and entities catches same-topic stories with different
    /// headlines.
    pub fn fingerprint_text(&self) -> String {
        let quote: String = self.key_quote.chars().take(100).collect();
        [
            self.headline.as_str(),
            self.summary.as_str(),
            &self.impact_areas.join(", "),
            self.source.as_str(),
            &quote,
        ]
        .iter()
        .filter(|p| !p.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join(" | ")
    }
}

/// Visual identity for one brief
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignSpec {
    pub design_name: String,
    pub theme: String,
    pub primary_color: String,
    pub accent_color: String,
    /// How the palette matches the current world mood
    pub mood_alignment: String,
    pub image_brief: String,
}

/// Analyst lenses, each with a dedicated preparer/reviewer pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalystLens {
    Historical,
    Economic,
    Social,
    Future,
}

impl AnalystLens {
    pub fn all() -> [AnalystLens; 4] {
        [Self::Historical, Self::Economic, Self::Social, Self::Future]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Historical => "historical",
            Self::Economic => "economic",
            Self::Social => "social",
            Self::Future => "future",
        }
    }

    /// Lens challenged by this one at the round table
    pub fn round_table_target(&self) -> AnalystLens {
        match self {
            Self::Economic => Self::Historical,
            Self::Historical => Self::Future,
            Self::Future => Self::Social,
            Self::Social => Self::Economic,
        }
    }
}

impl std::fmt::Display for AnalystLens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One analyst's take on the topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Perspective {
    pub lens: AnalystLens,
    pub thesis: String,
    #[serde(default)]
    pub evidence: Vec<String>,
    #[serde(default)]
    pub implications: Vec<String>,
    #[serde(default)]
    pub pull_quote: String,
}

/// Per-lens feedback from the editor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LensFeedback {
    pub lens: AnalystLens,
    pub score: u8,
    pub notes: String,
}

/// Editor-in-chief review across all perspectives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorialReview {
    pub quality_score: u8,
    pub ready_for_synthesis: bool,
    #[serde(default)]
    pub lens_feedback: Vec<LensFeedback>,
}

/// One slide of the finished brief. One point, one insight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BriefPage {
    pub page_type: String,
    pub title: String,
    pub point: String,
    pub insight: String,
    #[serde(default)]
    pub key_stat: String,
    #[serde(default)]
    pub quote: String,
}

/// The synthesized slide deck content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBrief {
    pub brief_title: String,
    pub pages: Vec<BriefPage>,
}

/// Per-page visual directive for the renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualDirective {
    pub page_number: u32,
    pub visual_type: String,
    pub description: String,
}

/// Visual production plan consumed by the rendering collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualPlan {
    pub pages: Vec<VisualDirective>,
}

/// Post-render layout audit of a single page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageAudit {
    pub page_number: u32,
    pub estimated_fill_pct: f32,
    pub passes: bool,
    #[serde(default)]
    pub issues: Vec<String>,
}

/// Whole-deck layout audit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutAudit {
    pub approved: bool,
    pub verdict: String,
    #[serde(default)]
    pub pages: Vec<PageAudit>,
}

/// One checklist rule outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleCheck {
    pub id: u32,
    pub passed: bool,
    pub reasoning: String,
}

/// Final weighted-checklist validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Weighted score, 0-100
    pub total_score: f32,
    pub approved: bool,
    #[serde(default)]
    pub rules_checked: Vec<RuleCheck>,
    #[serde(default)]
    pub critical_failures: Vec<String>,
    #[serde(default)]
    pub fix_instructions: Vec<String>,
    pub verdict: String,
}

/// Post copy for the publishing collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostCopy {
    pub post_text: String,
    #[serde(default)]
    pub document_title: String,
    #[serde(default)]
    pub hashtags: Vec<String>,
}

impl PostCopy {
    /// Document title, falling back to the brief title when the agent
    /// omitted one.
    pub fn resolved_title(&self, brief_title: &str) -> String {
        if self.document_title.trim().is_empty() {
            brief_title.to_string()
        } else {
            self.document_title.clone()
        }
    }
}

/// Reviewer verdict on a unit of work
///
/// Approval and score are independent: a reviewer may approve below the
/// pass bar or withhold approval above it. The debate engine requires
/// both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Critique {
    /// 1-10
    pub score: u8,
    pub approved: bool,
    #[serde(default)]
    pub demands: Vec<String>,
    #[serde(default)]
    pub strengths: Vec<String>,
}

impl Critique {
    /// Reject out-of-range scores at the adapter boundary
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !(1..=10).contains(&self.score) {
            return Err(format!("critique score {} outside 1-10", self.score));
        }
        Ok(())
    }
}

/// Tagged output variant, one per agent role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentOutput {
    Pulse(WorldPulse),
    Strategy(ContentStrategy),
    Topic(TopicCandidate),
    Design(DesignSpec),
    Perspective(Perspective),
    Editorial(EditorialReview),
    Brief(ContentBrief),
    Visuals(VisualPlan),
    Audit(LayoutAudit),
    Validation(ValidationReport),
    Post(PostCopy),
}

impl AgentOutput {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Pulse(_) => "pulse",
            Self::Strategy(_) => "strategy",
            Self::Topic(_) => "topic",
            Self::Design(_) => "design",
            Self::Perspective(_) => "perspective",
            Self::Editorial(_) => "editorial",
            Self::Brief(_) => "brief",
            Self::Visuals(_) => "visuals",
            Self::Audit(_) => "audit",
            Self::Validation(_) => "validation",
            Self::Post(_) => "post",
        }
    }

    pub fn as_pulse(&self) -> Option<&WorldPulse> {
        match self {
            Self::Pulse(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_strategy(&self) -> Option<&ContentStrategy> {
        match self {
            Self::Strategy(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_topic(&self) -> Option<&TopicCandidate> {
        match self {
            Self::Topic(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_design(&self) -> Option<&DesignSpec> {
        match self {
            Self::Design(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_perspective(&self) -> Option<&Perspective> {
        match self {
            Self::Perspective(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_editorial(&self) -> Option<&EditorialReview> {
        match self {
            Self::Editorial(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_brief(&self) -> Option<&ContentBrief> {
        match self {
            Self::Brief(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_visuals(&self) -> Option<&VisualPlan> {
        match self {
            Self::Visuals(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_audit(&self) -> Option<&LayoutAudit> {
        match self {
            Self::Audit(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_validation(&self) -> Option<&ValidationReport> {
        match self {
            Self::Validation(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_post(&self) -> Option<&PostCopy> {
        match self {
            Self::Post(p) => Some(p),
            _ => None,
        }
    }
}

/// A single fallback/retry event raised inside a capability call,
/// attached to the surrounding phase record for debugging
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityEvent {
    pub backend: String,
    pub detail: String,
}

/// Opaque handle to a rendered artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactHandle {
    pub path: PathBuf,
}

/// Receipt returned by the publishing collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub post_ref: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mood_boundaries() {
        assert_eq!(Mood::from_score(-100), Mood::ExtremeSad);
        assert_eq!(Mood::from_score(-60), Mood::ExtremeSad);
        assert_eq!(Mood::from_score(-59), Mood::Anxious);
        assert_eq!(Mood::from_score(-20), Mood::Anxious);
        assert_eq!(Mood::from_score(-19), Mood::Normal);
        assert_eq!(Mood::from_score(0), Mood::Normal);
        assert_eq!(Mood::from_score(20), Mood::Normal);
        assert_eq!(Mood::from_score(21), Mood::Optimistic);
        assert_eq!(Mood::from_score(60), Mood::Optimistic);
        assert_eq!(Mood::from_score(61), Mood::Euphoric);
        assert_eq!(Mood::from_score(100), Mood::Euphoric);
    }

    #[test]
    fn test_run_lifecycle() {
        let mut run = Run::begin(RunMode::Autonomous);
        assert!(run.run_id.starts_with("run_"));
        assert_eq!(run.status, RunStatus::Running);
        assert!(!run.status.is_terminal());

        run.finish(RunStatus::Published);
        assert!(run.status.is_terminal());
    }

    #[test]
    fn test_fingerprint_text_skips_empty_parts() {
        let topic = TopicCandidate {
            headline: "Model release".to_string(),
            summary: "A new frontier model".to_string(),
            impact_areas: vec![],
            source: String::new(),
            key_quote: String::new(),
        };
        assert_eq!(topic.fingerprint_text(), "Model release | A new frontier model");
    }

    #[test]
    fn test_critique_score_range() {
        let mut critique = Critique {
            score: 7,
            approved: true,
            demands: vec![],
            strengths: vec![],
        };
        assert!(critique.validate().is_ok());

        critique.score = 0;
        assert!(critique.validate().is_err());

        critique.score = 11;
        assert!(critique.validate().is_err());
    }

    #[test]
    fn test_output_accessors() {
        let output = AgentOutput::Strategy(ContentStrategy {
            content_type: "Breaking News Analysis".to_string(),
            topic_direction: "top AI story".to_string(),
            page_count: 8,
            silent: false,
            rationale: "normal news cycle".to_string(),
        });
        assert_eq!(output.kind(), "strategy");
        assert!(output.as_strategy().is_some());
        assert!(output.as_brief().is_none());
    }

    #[test]
    fn test_output_serde_tag() {
        let output = AgentOutput::Topic(TopicCandidate {
            headline: "h".to_string(),
            summary: "s".to_string(),
            impact_areas: vec!["labor".to_string()],
            source: "wire".to_string(),
            key_quote: "q".to_string(),
        });
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["kind"], "topic");
        let back: AgentOutput = serde_json::from_value(json).unwrap();
        assert_eq!(back, output);
    }

    #[test]
    fn test_post_copy_title_fallback() {
        let post = PostCopy {
            post_text: "text".to_string(),
            document_title: String::new(),
            hashtags: vec![],
        };
        assert_eq!(post.resolved_title("Brief Title"), "Brief Title");

        let post = PostCopy {
            document_title: "Named".to_string(),
            ..post
        };
        assert_eq!(post.resolved_title("Brief Title"), "Named");
    }

    #[test]
    fn test_round_table_targets_form_cycle() {
        let mut seen = std::collections::HashSet::new();
        let mut lens = AnalystLens::Economic;
        for _ in 0..4 {
            lens = lens.round_table_target();
            seen.insert(lens);
        }
        assert_eq!(seen.len(), 4);
    }
}
