//! Agent capability contract and its backend-driven implementation
//!
//! An [`AgentCapability`] produces role-shaped output, critiques another
//! agent's work, or revises its own. [`RoleAgent`] implements the
//! contract over a [`FallbackChain`]: the raw completion is parsed and
//! validated here, at the adapter boundary, so downstream phases can
//! assume well-formed input.

use crate::backend::FallbackChain;
use async_trait::async_trait;
use atelier_core::{
    AgentOutput, AnalystLens, AtelierError, CapabilityEvent, ContentBrief, Critique, LayoutAudit,
    Mood, Perspective, Result, TopicCandidate, ValidationReport, WorldPulse,
};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Longest serialized context forwarded to a backend
const MAX_CONTEXT_CHARS: usize = 15_000;

/// Which output variant an agent is contracted to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentRole {
    WorldPulse,
    Strategist,
    Scout,
    Designer,
    Analyst(AnalystLens),
    Writer,
    Editor,
    VisualPlanner,
    Auditor,
    Validator,
    Publicist,
    /// Reviewers and guards only critique; they produce nothing
    Reviewer,
}

impl AgentRole {
    fn produces(&self) -> bool {
        !matches!(self, Self::Reviewer)
    }
}

/// A role-specific unit of generative work
#[async_trait]
pub trait AgentCapability: Send + Sync {
    fn name(&self) -> &str;

    /// Persona codename recorded in the trace
    fn codename(&self) -> &str;

    /// Backend/model identifier recorded in the trace
    fn model(&self) -> String;

    /// Produce role-shaped output from fixed and variable inputs
    async fn produce(
        &self,
        fixed: &Map<String, Value>,
        variable: &Map<String, Value>,
    ) -> Result<AgentOutput>;

    /// Review another agent's work against a rubric
    async fn critique(&self, work: &AgentOutput, rubric: &str) -> Result<Critique>;

    /// Revise own work to address specific demands
    async fn revise(&self, work: &AgentOutput, demands: &[String]) -> Result<AgentOutput>;

    /// Fallback/retry events accumulated since the last drain, for the
    /// surrounding phase record
    fn drain_events(&self) -> Vec<CapabilityEvent> {
        Vec::new()
    }
}

/// Backend-driven capability for one named role
pub struct RoleAgent {
    name: String,
    codename: String,
    role: AgentRole,
    system_prompt: String,
    produce_instruction: String,
    chain: FallbackChain,
}

impl RoleAgent {
    pub fn new(
        name: impl Into<String>,
        codename: impl Into<String>,
        role: AgentRole,
        system_prompt: impl Into<String>,
        produce_instruction: impl Into<String>,
        chain: FallbackChain,
    ) -> Self {
        Self {
            name: name.into(),
            codename: codename.into(),
            role,
            system_prompt: system_prompt.into(),
            produce_instruction: produce_instruction.into(),
            chain,
        }
    }

    async fn think(&self, task: &str, context: &Value) -> Result<Value> {
        let mut user_prompt = format!("TASK: {}", task);
        if !context.is_null() {
            let serialized = serde_json::to_string_pretty(context)?;
            let clipped: String = serialized.chars().take(MAX_CONTEXT_CHARS).collect();
            user_prompt.push_str(&format!("\n\nCONTEXT:\n{}", clipped));
        }
        user_prompt.push_str("\n\nRespond with valid JSON only.");

        let text = self.chain.complete(&self.system_prompt, &user_prompt).await?;
        parse_json_payload(&text).ok_or_else(|| {
            AtelierError::Capability(format!("agent {} returned malformed JSON", self.name))
        })
    }

    fn parse_output(&self, payload: Value) -> Result<AgentOutput> {
        match self.role {
            AgentRole::WorldPulse => {
                let pulse: PulsePayload = self.deserialize(payload, "world pulse")?;
                let score = pulse.sentiment_score.clamp(-100, 100);
                Ok(AgentOutput::Pulse(WorldPulse {
                    sentiment_score: score,
                    mood: Mood::from_score(score),
                    trending: pulse.trending,
                    ai_news: pulse.ai_news,
                    summary: pulse.summary,
                }))
            }
            AgentRole::Strategist => Ok(AgentOutput::Strategy(
                self.deserialize(payload, "content strategy")?,
            )),
            AgentRole::Scout => {
                let topic: TopicCandidate = self.deserialize(payload, "topic candidate")?;
                if topic.headline.trim().is_empty() {
                    return Err(self.malformed("topic candidate", "empty headline"));
                }
                Ok(AgentOutput::Topic(topic))
            }
            AgentRole::Designer => Ok(AgentOutput::Design(self.deserialize(payload, "design")?)),
            AgentRole::Analyst(lens) => {
                let p: PerspectivePayload = self.deserialize(payload, "perspective")?;
                Ok(AgentOutput::Perspective(Perspective {
                    lens,
                    thesis: p.thesis,
                    evidence: p.evidence,
                    implications: p.implications,
                    pull_quote: p.pull_quote,
                }))
            }
            AgentRole::Writer => {
                let brief: ContentBrief = self.deserialize(payload, "content brief")?;
                if brief.pages.is_empty() {
                    return Err(self.malformed("content brief", "no pages"));
                }
                Ok(AgentOutput::Brief(brief))
            }
            AgentRole::Editor => Ok(AgentOutput::Editorial(
                self.deserialize(payload, "editorial review")?,
            )),
            AgentRole::VisualPlanner => Ok(AgentOutput::Visuals(
                self.deserialize(payload, "visual plan")?,
            )),
            AgentRole::Auditor => {
                let audit: LayoutAudit = self.deserialize(payload, "layout audit")?;
                Ok(AgentOutput::Audit(audit))
            }
            AgentRole::Validator => {
                let report: ValidationReport = self.deserialize(payload, "validation report")?;
                if !(0.0..=100.0).contains(&report.total_score) {
                    return Err(self.malformed(
                        "validation report",
                        &format!("total_score {} outside 0-100", report.total_score),
                    ));
                }
                Ok(AgentOutput::Validation(report))
            }
            AgentRole::Publicist => Ok(AgentOutput::Post(self.deserialize(payload, "post copy")?)),
            AgentRole::Reviewer => Err(AtelierError::Capability(format!(
                "agent {} is a reviewer and produces no structured output",
                self.name
            ))),
        }
    }

    fn deserialize<T: serde::de::DeserializeOwned>(&self, payload: Value, what: &str) -> Result<T> {
        serde_json::from_value(payload).map_err(|e| self.malformed(what, &e.to_string()))
    }

    fn malformed(&self, what: &str, detail: &str) -> AtelierError {
        AtelierError::Capability(format!(
            "agent {} returned malformed {}: {}",
            self.name, what, detail
        ))
    }
}

#[async_trait]
impl AgentCapability for RoleAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn codename(&self) -> &str {
        &self.codename
    }

    fn model(&self) -> String {
        self.chain.primary_id()
    }

    async fn produce(
        &self,
        fixed: &Map<String, Value>,
        variable: &Map<String, Value>,
    ) -> Result<AgentOutput> {
        if !self.role.produces() {
            return Err(AtelierError::Capability(format!(
                "agent {} is a reviewer and cannot produce",
                self.name
            )));
        }

        let context = serde_json::json!({
            "fixed_inputs": fixed,
            "inputs_from_other_agents": variable,
        });
        let payload = self.think(&self.produce_instruction, &context).await?;
        self.parse_output(payload)
    }

    async fn critique(&self, work: &AgentOutput, rubric: &str) -> Result<Critique> {
        let task = format!(
            "Critically review the work below. Be demanding and specific. {} \
             Return JSON with: score (1-10), approved (boolean, your conscious \
             sign-off independent of the score), demands (array of specific \
             changes), strengths (array).",
            rubric
        );
        let context = serde_json::json!({ "work_to_review": work });
        let payload = self.think(&task, &context).await?;

        let critique: Critique = self.deserialize(payload, "critique")?;
        critique
            .validate()
            .map_err(|e| self.malformed("critique", &e))?;
        Ok(critique)
    }

    async fn revise(&self, work: &AgentOutput, demands: &[String]) -> Result<AgentOutput> {
        let task = "Revise your work to address every demand raised. Keep what the \
                    review praised, fix what it faulted, and return the complete \
                    revised work in your usual output shape.";
        let context = serde_json::json!({
            "your_original_work": work,
            "demands": demands,
        });
        let payload = self.think(task, &context).await?;
        self.parse_output(payload)
    }

    fn drain_events(&self) -> Vec<CapabilityEvent> {
        self.chain.drain_events()
    }
}

/// Pulse payload before mood derivation
#[derive(Deserialize)]
struct PulsePayload {
    sentiment_score: i32,
    #[serde(default)]
    trending: Vec<String>,
    #[serde(default)]
    ai_news: Vec<String>,
    summary: String,
}

/// Perspective payload before lens assignment
#[derive(Deserialize)]
struct PerspectivePayload {
    thesis: String,
    #[serde(default)]
    evidence: Vec<String>,
    #[serde(default)]
    implications: Vec<String>,
    #[serde(default)]
    pull_quote: String,
}

/// Extract a JSON object from completion text. Strips markdown code
/// fences (some backends wrap JSON despite json-mode) and unwraps a
/// top-level single-element array.
pub fn parse_json_payload(text: &str) -> Option<Value> {
    let parsed = serde_json::from_str::<Value>(text.trim()).ok().or_else(|| {
        let stripped: String = text
            .lines()
            .filter(|line| !line.trim_start().starts_with("```"))
            .collect::<Vec<_>>()
            .join("\n");
        serde_json::from_str(stripped.trim()).ok()
    })?;

    match parsed {
        Value::Array(mut items) if !items.is_empty() => Some(items.remove(0)),
        Value::Array(_) => None,
        other => Some(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ModelBackend;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct ScriptedBackend {
        responses: Mutex<VecDeque<String>>,
    }

    impl ScriptedBackend {
        fn new(responses: &[&str]) -> Arc<dyn ModelBackend> {
            Arc::new(Self {
                responses: Mutex::new(responses.iter().map(|s| s.to_string()).collect()),
            })
        }
    }

    #[async_trait]
    impl ModelBackend for ScriptedBackend {
        fn id(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| AtelierError::Capability("script exhausted".to_string()))
        }
    }

    fn agent_with(role: AgentRole, responses: &[&str]) -> RoleAgent {
        let chain = FallbackChain::new(
            vec![ScriptedBackend::new(responses)],
            Duration::from_secs(5),
        );
        RoleAgent::new("Test Agent", "Echo", role, "system", "do the task", chain)
    }

    #[tokio::test]
    async fn test_scout_produce_parses_topic() {
        let agent = agent_with(
            AgentRole::Scout,
            &[r#"{"headline": "Model ships", "summary": "A new model", "impact_areas": ["labor"], "source": "wire", "key_quote": "big"}"#],
        );
        let output = agent
            .produce(&Map::new(), &Map::new())
            .await
            .unwrap();
        assert_eq!(output.kind(), "topic");
        assert_eq!(output.as_topic().unwrap().headline, "Model ships");
    }

    #[tokio::test]
    async fn test_code_fenced_json_is_accepted() {
        let agent = agent_with(
            AgentRole::Scout,
            &["```json\n{\"headline\": \"h\", \"summary\": \"s\"}\n```"],
        );
        let output = agent.produce(&Map::new(), &Map::new()).await.unwrap();
        assert_eq!(output.as_topic().unwrap().headline, "h");
    }

    #[tokio::test]
    async fn test_array_payload_takes_first_element() {
        let agent = agent_with(
            AgentRole::Scout,
            &[r#"[{"headline": "first", "summary": "s"}, {"headline": "second", "summary": "s"}]"#],
        );
        let output = agent.produce(&Map::new(), &Map::new()).await.unwrap();
        assert_eq!(output.as_topic().unwrap().headline, "first");
    }

    #[tokio::test]
    async fn test_pulse_mood_derived_from_score() {
        let agent = agent_with(
            AgentRole::WorldPulse,
            &[r#"{"sentiment_score": -45, "summary": "tense markets"}"#],
        );
        let output = agent.produce(&Map::new(), &Map::new()).await.unwrap();
        let pulse = output.as_pulse().unwrap();
        assert_eq!(pulse.mood, Mood::Anxious);
    }

    #[tokio::test]
    async fn test_pulse_score_clamped() {
        let agent = agent_with(
            AgentRole::WorldPulse,
            &[r#"{"sentiment_score": -250, "summary": "doom"}"#],
        );
        let output = agent.produce(&Map::new(), &Map::new()).await.unwrap();
        assert_eq!(output.as_pulse().unwrap().sentiment_score, -100);
    }

    #[tokio::test]
    async fn test_analyst_lens_assigned_at_boundary() {
        let agent = agent_with(
            AgentRole::Analyst(AnalystLens::Economic),
            &[r#"{"thesis": "capex supercycle", "evidence": ["x"], "implications": ["y"]}"#],
        );
        let output = agent.produce(&Map::new(), &Map::new()).await.unwrap();
        assert_eq!(output.as_perspective().unwrap().lens, AnalystLens::Economic);
    }

    #[tokio::test]
    async fn test_empty_brief_rejected() {
        let agent = agent_with(
            AgentRole::Writer,
            &[r#"{"brief_title": "t", "pages": []}"#],
        );
        let err = agent.produce(&Map::new(), &Map::new()).await.unwrap_err();
        assert!(matches!(err, AtelierError::Capability(_)));
    }

    #[tokio::test]
    async fn test_reviewer_cannot_produce() {
        let agent = agent_with(AgentRole::Reviewer, &["{}"]);
        let err = agent.produce(&Map::new(), &Map::new()).await.unwrap_err();
        assert!(matches!(err, AtelierError::Capability(_)));
    }

    #[tokio::test]
    async fn test_critique_parses_and_validates() {
        let agent = agent_with(
            AgentRole::Reviewer,
            &[r#"{"score": 6, "approved": false, "demands": ["add data"], "strengths": ["tone"]}"#],
        );
        let work = AgentOutput::Topic(TopicCandidate {
            headline: "h".to_string(),
            summary: "s".to_string(),
            impact_areas: vec![],
            source: String::new(),
            key_quote: String::new(),
        });
        let critique = agent.critique(&work, "Demand depth.").await.unwrap();
        assert_eq!(critique.score, 6);
        assert!(!critique.approved);
        assert_eq!(critique.demands.len(), 1);
    }

    #[tokio::test]
    async fn test_out_of_range_critique_score_rejected() {
        let agent = agent_with(
            AgentRole::Reviewer,
            &[r#"{"score": 12, "approved": true, "demands": []}"#],
        );
        let work = AgentOutput::Topic(TopicCandidate {
            headline: "h".to_string(),
            summary: "s".to_string(),
            impact_areas: vec![],
            source: String::new(),
            key_quote: String::new(),
        });
        let err = agent.critique(&work, "").await.unwrap_err();
        assert!(matches!(err, AtelierError::Capability(_)));
    }

    #[tokio::test]
    async fn test_malformed_json_is_capability_error() {
        let agent = agent_with(AgentRole::Scout, &["this is not json"]);
        let err = agent.produce(&Map::new(), &Map::new()).await.unwrap_err();
        assert!(matches!(err, AtelierError::Capability(_)));
    }

    #[tokio::test]
    async fn test_revise_returns_role_output() {
        let agent = agent_with(
            AgentRole::Scout,
            &[r#"{"headline": "revised", "summary": "s"}"#],
        );
        let work = AgentOutput::Topic(TopicCandidate {
            headline: "original".to_string(),
            summary: "s".to_string(),
            impact_areas: vec![],
            source: String::new(),
            key_quote: String::new(),
        });
        let revised = agent
            .revise(&work, &["sharper headline".to_string()])
            .await
            .unwrap();
        assert_eq!(revised.as_topic().unwrap().headline, "revised");
    }
}
