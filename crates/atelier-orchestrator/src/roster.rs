//! The agent roster: one capability per pipeline role
//!
//! Construction from configuration wires every role to the same
//! primary→secondary backend fallback chain. Tests build the roster
//! directly from scripted capabilities.

use atelier_agent::{AgentRole, FallbackChain, HttpChatBackend, ModelBackend, RoleAgent};
use atelier_core::{AnalystLens, PipelineConfig};
use std::sync::Arc;
use std::time::Duration;

use crate::checklist;
use crate::guard::GUARDRAIL;
use crate::AgentCapability;

/// A preparer/reviewer pair for one analyst lens
pub struct AnalystPair {
    pub lens: AnalystLens,
    pub preparer: Arc<dyn AgentCapability>,
    pub reviewer: Arc<dyn AgentCapability>,
}

/// Every agent the orchestrator drives
pub struct AgentRoster {
    pub world_pulse: Arc<dyn AgentCapability>,
    pub strategist: Arc<dyn AgentCapability>,
    pub scout: Arc<dyn AgentCapability>,
    pub designer: Arc<dyn AgentCapability>,
    pub design_reviewer: Arc<dyn AgentCapability>,
    pub analysts: Vec<AnalystPair>,
    pub writer: Arc<dyn AgentCapability>,
    pub copy_reviewer: Arc<dyn AgentCapability>,
    pub editor: Arc<dyn AgentCapability>,
    pub guard: Arc<dyn AgentCapability>,
    pub visual_planner: Arc<dyn AgentCapability>,
    pub auditor: Arc<dyn AgentCapability>,
    pub validator: Arc<dyn AgentCapability>,
    pub publicist: Arc<dyn AgentCapability>,
}

impl AgentRoster {
    /// Build the full roster over the configured backend chain
    pub fn from_config(config: &PipelineConfig) -> Self {
        let primary: Arc<dyn ModelBackend> =
            Arc::new(HttpChatBackend::new(config.backends.primary.clone()));
        let secondary: Arc<dyn ModelBackend> =
            Arc::new(HttpChatBackend::new(config.backends.secondary.clone()));
        let timeout = Duration::from_secs(config.backends.request_timeout_secs);

        let chain = || {
            FallbackChain::new(
                vec![Arc::clone(&primary), Arc::clone(&secondary)],
                timeout,
            )
        };

        let agent = |name: &str, codename: &str, role, system: String, instruction: String| {
            Arc::new(RoleAgent::new(name, codename, role, system, instruction, chain()))
                as Arc<dyn AgentCapability>
        };

        let analysts = [
            (
                AnalystLens::Historical,
                "Historian",
                "Clio",
                "Theron",
                "financial and technological history",
            ),
            (
                AnalystLens::Economic,
                "Economist",
                "Aurelia",
                "Callisto",
                "markets, capital flows, and unit economics",
            ),
            (
                AnalystLens::Social,
                "Sociologist",
                "Sage",
                "Liora",
                "social dynamics, labor, and institutions",
            ),
            (
                AnalystLens::Future,
                "Futurist",
                "Nova",
                "Orion",
                "scenarios and second-order consequences",
            ),
        ]
        .into_iter()
        .map(|(lens, name, p_code, r_code, domain)| AnalystPair {
            lens,
            preparer: agent(
                name,
                p_code,
                AgentRole::Analyst(lens),
                format!(
                    "You are a senior analyst specializing in {}. You write with \
                     the depth of someone who has briefed boards for twenty years. \
                     Output JSON: thesis, evidence (array of concrete data points \
                     with dates and names), implications (array), pull_quote.",
                    domain
                ),
                format!("Analyze the story from the {} perspective.", lens),
            ),
            reviewer: agent(
                &format!("{} Reviewer", name),
                r_code,
                AgentRole::Reviewer,
                format!(
                    "You are a demanding senior reviewer of {} analysis. Judge \
                     depth, specificity, originality, tone, and actionability. \
                     Approve only work you would put in front of a board.",
                    domain
                ),
                String::new(),
            ),
        })
        .collect();

        Self {
            world_pulse: agent(
                "WorldPulseScanner",
                "Aria",
                AgentRole::WorldPulse,
                "You are a global intelligence analyst scanning the world's \
                 information landscape. You are calibrated: most days are normal; \
                 only flag extremes when genuinely extreme. Output JSON: \
                 sentiment_score (-100..100), trending (array), ai_news (array), \
                 summary."
                    .to_string(),
                "Assess the current global sentiment and the AI news cycle.".to_string(),
            ),
            strategist: agent(
                "ContentStrategist",
                "Marcus",
                AgentRole::Strategist,
                "You choose what kind of piece to publish today based on world \
                 sentiment and recent output. When sentiment is extreme enough \
                 that publishing would be tone-deaf, set silent to true. Output \
                 JSON: content_type, topic_direction, page_count, silent, \
                 rationale."
                    .to_string(),
                "Choose today's content type and direction.".to_string(),
            ),
            scout: agent(
                "NewsScout",
                "Sable",
                AgentRole::Scout,
                "You hunt for the single best story of the day. Never repeat a \
                 topic you are told to exclude. Output JSON: headline, summary, \
                 impact_areas (array), source, key_quote."
                    .to_string(),
                "Find the best topic for today's piece.".to_string(),
            ),
            designer: agent(
                "DesignDirector",
                "Vesper",
                AgentRole::Designer,
                "You create one-off visual identities with the standards of a \
                 luxury house. The palette must match the scanned world mood. \
                 Output JSON: design_name, theme, primary_color, accent_color, \
                 mood_alignment, image_brief."
                    .to_string(),
                "Create the visual identity for this brief.".to_string(),
            ),
            design_reviewer: agent(
                "Design Reviewer",
                "Onyx",
                AgentRole::Reviewer,
                "You are an art director judging design concepts against the \
                 highest bar. Reject palettes that fight the current world mood."
                    .to_string(),
                String::new(),
            ),
            analysts,
            writer: agent(
                "ContentWriter",
                "Quill",
                AgentRole::Writer,
                format!(
                    "You synthesize analyst perspectives into a slide-deck brief. \
                     Each page: exactly ONE point and ONE supporting insight with \
                     a concrete number, name, or date. {} Output JSON: \
                     brief_title, pages (array of page_type, title, point, \
                     insight, key_stat, quote).",
                    GUARDRAIL
                ),
                "Synthesize the perspectives into the brief.".to_string(),
            ),
            copy_reviewer: agent(
                "Copy Reviewer",
                "Sterling",
                AgentRole::Reviewer,
                "You review copy with the standards of a luxury editorial \
                 campaign. Every word must earn its place. Reject any page \
                 carrying more than one point."
                    .to_string(),
                String::new(),
            ),
            editor: agent(
                "EditorInChief",
                "Paramount",
                AgentRole::Editor,
                format!(
                    "You are the editor-in-chief reviewing all analyst \
                     perspectives before synthesis. {} Output JSON: \
                     quality_score (1-10), ready_for_synthesis, lens_feedback \
                     (array of lens, score, notes).",
                    GUARDRAIL
                ),
                "Review all perspectives for coherence and quality.".to_string(),
            ),
            guard: agent(
                "NeutralityGuard",
                "Justice",
                AgentRole::Reviewer,
                format!(
                    "You enforce the content guardrail with no exceptions. {}",
                    GUARDRAIL
                ),
                String::new(),
            ),
            visual_planner: agent(
                "VisualPlanner",
                "Prism",
                AgentRole::VisualPlanner,
                "You plan one visual per page: image, infographic, or data viz, \
                 consistent with the design identity. Output JSON: pages (array \
                 of page_number, visual_type, description)."
                    .to_string(),
                "Plan the visuals for every page of the brief.".to_string(),
            ),
            auditor: agent(
                "ScreenAuditor",
                "Ratio",
                AgentRole::Auditor,
                "You audit page layouts. A premium page is 55-65% filled with \
                 content and visuals; never more than 45% empty, never more than \
                 70% filled. Output JSON: approved, verdict, pages (array of \
                 page_number, estimated_fill_pct, passes, issues)."
                    .to_string(),
                "Audit the rendered deck for fill and balance.".to_string(),
            ),
            validator: agent(
                "FinalValidator",
                "Sentinel",
                AgentRole::Validator,
                format!(
                    "You are the final quality gate before publication. Check \
                     every rule; let nothing slide.\n\nMASTER CHECKLIST:\n{}\n\n\
                     Score = (sum of passed weights / {}) * 100. Threshold: \
                     {}%. Below threshold: reject with specific failures and \
                     fix_instructions. Output JSON: total_score (0-100), \
                     approved, rules_checked (array of id, passed, reasoning), \
                     critical_failures (array), fix_instructions (array), \
                     verdict.",
                    checklist::checklist_prompt(),
                    checklist::total_weight(),
                    config.validation.publish_threshold,
                ),
                "Validate the complete output against the master checklist.".to_string(),
            ),
            publicist: agent(
                "PostStrategist",
                "Herald",
                AgentRole::Publicist,
                "You craft the announcement post and a catchy document title for \
                 the finished brief. Output JSON: post_text, document_title, \
                 hashtags (array)."
                    .to_string(),
                "Craft the post and document title.".to_string(),
            ),
        }
    }

    /// Analyst pair for a lens
    pub fn analyst(&self, lens: AnalystLens) -> Option<&AnalystPair> {
        self.analysts.iter().find(|p| p.lens == lens)
    }
}
