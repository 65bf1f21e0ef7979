//! End-to-end pipeline tests with scripted capabilities
//!
//! Exercises the orchestrator against the full phase sequence: happy
//! path, silence veto, topic exhaustion, validation regeneration,
//! no-publish, and dry-run.

use async_trait::async_trait;
use atelier_agent::EmbeddingBackend;
use atelier_core::{
    AgentOutput, AnalystLens, AtelierError, BriefPage, ContentBrief, ContentStrategy, Critique,
    DesignSpec, EditorialReview, LayoutAudit, LensFeedback, Mood, PageAudit, Perspective,
    PipelineConfig, PostCopy, Result, RuleCheck, RunStatus, TopicCandidate, ValidationReport,
    VisualDirective, VisualPlan, WorldPulse,
};
use atelier_dedup::{DedupGate, HistoryStore, TopicFingerprint};
use atelier_orchestrator::{
    AgentCapability, AgentRoster, AnalystPair, JsonDeckRenderer, LocalPublisher, Orchestrator,
    PublishLog, RunOptions,
};
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

// ── Scripted capability ─────────────────────────────────────────────

struct StubAgent {
    name: String,
    codename: String,
    outputs: Mutex<VecDeque<AgentOutput>>,
    last_output: Mutex<Option<AgentOutput>>,
    critiques: Mutex<VecDeque<Critique>>,
    produce_fixed_inputs: Mutex<Vec<Map<String, Value>>>,
}

impl StubAgent {
    fn new(name: &str, outputs: Vec<AgentOutput>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            codename: format!("{}-stub", name),
            outputs: Mutex::new(outputs.into()),
            last_output: Mutex::new(None),
            critiques: Mutex::new(VecDeque::new()),
            produce_fixed_inputs: Mutex::new(Vec::new()),
        })
    }

    fn reviewer(name: &str) -> Arc<Self> {
        Self::new(name, vec![])
    }

    fn produce_calls(&self) -> Vec<Map<String, Value>> {
        self.produce_fixed_inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentCapability for StubAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn codename(&self) -> &str {
        &self.codename
    }

    fn model(&self) -> String {
        "stub".to_string()
    }

    async fn produce(
        &self,
        fixed: &Map<String, Value>,
        _variable: &Map<String, Value>,
    ) -> Result<AgentOutput> {
        self.produce_fixed_inputs.lock().unwrap().push(fixed.clone());

        let mut outputs = self.outputs.lock().unwrap();
        let output = match outputs.pop_front() {
            Some(output) => output,
            None => self
                .last_output
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| AtelierError::Capability(format!("{} has no output", self.name)))?,
        };
        *self.last_output.lock().unwrap() = Some(output.clone());
        Ok(output)
    }

    async fn critique(&self, _work: &AgentOutput, _rubric: &str) -> Result<Critique> {
        Ok(self
            .critiques
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Critique {
                score: 9,
                approved: true,
                demands: vec![],
                strengths: vec!["clear".to_string()],
            }))
    }

    async fn revise(&self, work: &AgentOutput, _demands: &[String]) -> Result<AgentOutput> {
        Ok(work.clone())
    }
}

// ── Deterministic embedding: every text maps to the same vector ─────

struct ConstEmbedding;

#[async_trait]
impl EmbeddingBackend for ConstEmbedding {
    fn id(&self) -> &str {
        "const-embedding"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0, 0.0, 0.0])
    }
}

// ── Output builders ─────────────────────────────────────────────────

fn pulse() -> AgentOutput {
    AgentOutput::Pulse(WorldPulse {
        sentiment_score: 5,
        mood: Mood::Normal,
        trending: vec!["agents".to_string()],
        ai_news: vec!["frontier model ships".to_string()],
        summary: "calm cycle".to_string(),
    })
}

fn strategy(silent: bool) -> AgentOutput {
    AgentOutput::Strategy(ContentStrategy {
        content_type: "Deep Dive".to_string(),
        topic_direction: "agentic tooling".to_string(),
        page_count: 3,
        silent,
        rationale: "steady news cycle".to_string(),
    })
}

fn topic(headline: &str) -> AgentOutput {
    AgentOutput::Topic(TopicCandidate {
        headline: headline.to_string(),
        summary: "what it means for operators".to_string(),
        impact_areas: vec!["labor".to_string()],
        source: "wire".to_string(),
        key_quote: "the toolchain became the team".to_string(),
    })
}

fn design() -> AgentOutput {
    AgentOutput::Design(DesignSpec {
        design_name: "Quiet Authority".to_string(),
        theme: "editorial minimal".to_string(),
        primary_color: "#1a1a2e".to_string(),
        accent_color: "#c9a227".to_string(),
        mood_alignment: "calm over a neutral cycle".to_string(),
        image_brief: "muted abstracts".to_string(),
    })
}

fn perspective(lens: AnalystLens) -> AgentOutput {
    AgentOutput::Perspective(Perspective {
        lens,
        thesis: format!("{} thesis", lens),
        evidence: vec!["1999 precedent".to_string()],
        implications: vec!["margin shift".to_string()],
        pull_quote: "history rhymes".to_string(),
    })
}

fn editorial() -> AgentOutput {
    AgentOutput::Editorial(EditorialReview {
        quality_score: 9,
        ready_for_synthesis: true,
        lens_feedback: AnalystLens::all()
            .into_iter()
            .map(|lens| LensFeedback {
                lens,
                score: 9,
                notes: "solid".to_string(),
            })
            .collect(),
    })
}

fn brief() -> AgentOutput {
    AgentOutput::Brief(ContentBrief {
        brief_title: "The Agent Economy".to_string(),
        pages: vec![
            BriefPage {
                page_type: "cover".to_string(),
                title: "The Agent Economy".to_string(),
                point: "Agents change the unit economics of work".to_string(),
                insight: "One operator ships what a team shipped".to_string(),
                key_stat: "10x".to_string(),
                quote: "The toolchain became the team".to_string(),
            },
            BriefPage {
                page_type: "analysis".to_string(),
                title: "Where the margin goes".to_string(),
                point: "Coordination cost collapses first".to_string(),
                insight: "Headcount follows coordination cost".to_string(),
                key_stat: "40%".to_string(),
                quote: "Meetings were the product".to_string(),
            },
        ],
    })
}

fn visuals() -> AgentOutput {
    AgentOutput::Visuals(VisualPlan {
        pages: vec![VisualDirective {
            page_number: 1,
            visual_type: "image".to_string(),
            description: "muted skyline".to_string(),
        }],
    })
}

fn audit() -> AgentOutput {
    AgentOutput::Audit(LayoutAudit {
        approved: true,
        verdict: "balanced".to_string(),
        pages: vec![PageAudit {
            page_number: 1,
            estimated_fill_pct: 60.0,
            passes: true,
            issues: vec![],
        }],
    })
}

fn validation(score: f32) -> AgentOutput {
    AgentOutput::Validation(ValidationReport {
        total_score: score,
        approved: score >= 80.0,
        rules_checked: vec![RuleCheck {
            id: 1,
            passed: score >= 80.0,
            reasoning: "visuals present".to_string(),
        }],
        critical_failures: if score >= 80.0 {
            vec![]
        } else {
            vec!["pages overloaded".to_string()]
        },
        fix_instructions: if score >= 80.0 {
            vec![]
        } else {
            vec!["one point per page".to_string()]
        },
        verdict: "checked".to_string(),
    })
}

fn post() -> AgentOutput {
    AgentOutput::Post(PostCopy {
        post_text: "A new brief on the agent economy is out.".to_string(),
        document_title: String::new(),
        hashtags: vec!["#ai".to_string()],
    })
}

// ── Fixture assembly ────────────────────────────────────────────────

struct Fixture {
    roster: AgentRoster,
    writer: Arc<StubAgent>,
    scout: Arc<StubAgent>,
}

fn fixture(silent: bool, scout_topics: Vec<&str>, validation_scores: Vec<f32>) -> Fixture {
    let writer = StubAgent::new("ContentWriter", vec![brief()]);
    let scout = StubAgent::new("NewsScout", scout_topics.iter().map(|h| topic(h)).collect());

    let analysts = AnalystLens::all()
        .into_iter()
        .map(|lens| AnalystPair {
            lens,
            preparer: StubAgent::new(&format!("{}-analyst", lens), vec![perspective(lens)])
                as Arc<dyn AgentCapability>,
            reviewer: StubAgent::reviewer(&format!("{}-reviewer", lens)) as Arc<dyn AgentCapability>,
        })
        .collect();

    let roster = AgentRoster {
        world_pulse: StubAgent::new("WorldPulseScanner", vec![pulse()]),
        strategist: StubAgent::new("ContentStrategist", vec![strategy(silent)]),
        scout: Arc::clone(&scout) as Arc<dyn AgentCapability>,
        designer: StubAgent::new("DesignDirector", vec![design()]),
        design_reviewer: StubAgent::reviewer("DesignReviewer"),
        analysts,
        writer: Arc::clone(&writer) as Arc<dyn AgentCapability>,
        copy_reviewer: StubAgent::reviewer("CopyReviewer"),
        editor: StubAgent::new("EditorInChief", vec![editorial()]),
        guard: StubAgent::reviewer("NeutralityGuard"),
        visual_planner: StubAgent::new("VisualPlanner", vec![visuals()]),
        auditor: StubAgent::new("ScreenAuditor", vec![audit()]),
        validator: StubAgent::new(
            "FinalValidator",
            validation_scores.into_iter().map(validation).collect(),
        ),
        publicist: StubAgent::new("PostStrategist", vec![post()]),
    };

    Fixture {
        roster,
        writer,
        scout,
    }
}

fn orchestrator_in(dir: &Path, roster: AgentRoster, options: RunOptions) -> Orchestrator {
    let config = PipelineConfig::default();
    let dedup = Arc::new(
        DedupGate::load(
            Arc::new(ConstEmbedding),
            config.dedup.similarity_threshold,
            dir.join("topic_history.json"),
        )
        .unwrap(),
    );
    let renderer = Arc::new(JsonDeckRenderer::new(dir.join("output")));
    let publish_log = PublishLog::new(dir.join("publish_log.json"));

    Orchestrator::new(
        config,
        roster,
        dedup,
        renderer,
        Arc::new(LocalPublisher),
        publish_log,
        options,
    )
}

fn assert_no_forward_references(trace: &atelier_trace::Trace) {
    for (i, record) in trace.phases.iter().enumerate() {
        for (key, var) in &record.inputs.variable {
            let earlier = trace.phases[..i]
                .iter()
                .any(|p| p.phase == var.source_phase);
            assert!(
                earlier,
                "phase {} input {} references {} which is not earlier in the trace",
                record.phase, key, var.source_phase
            );
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_full_run_publishes() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = fixture(false, vec!["Agents eat the org chart"], vec![95.0]);

    let report = orchestrator_in(dir.path(), fixture.roster, RunOptions::default())
        .run(&dir.path().join("traces"))
        .await
        .unwrap();

    assert_eq!(report.run.status, RunStatus::Published);
    assert!(report.receipt.is_some());
    assert!(report.artifact.as_ref().unwrap().path.exists());
    assert!(report.trace_path.exists());

    let trace = &report.trace;
    let expected_phases = [
        "WorldPulse",
        "ContentStrategy",
        "TopicDiscovery",
        "DesignDNA",
        "Analyst_historical",
        "Analyst_economic",
        "Analyst_social",
        "Analyst_future",
        "RoundTable",
        "Editorial",
        "ContentSynthesis",
        "NeutralityCheck",
        "VisualPlanning",
        "Render",
        "ScreenAudit",
        "FinalValidation",
        "PostCopy",
        "PublishGate",
        "Publish",
    ];
    for name in expected_phases {
        assert!(trace.phase(name).is_some(), "missing phase {}", name);
    }
    assert_eq!(trace.total_agent_calls, expected_phases.len());

    // Design + 4 analysts + round table + synthesis
    assert_eq!(trace.total_debates, 7);
    for debate in &trace.debates {
        assert!(debate.total_rounds <= 3);
    }

    assert_no_forward_references(trace);

    // Fingerprint recorded and publish log appended only after publish
    let history = HistoryStore::new(dir.path().join("topic_history.json"))
        .load()
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].topic, "Agents eat the org chart");

    let log = PublishLog::new(dir.path().join("publish_log.json"));
    let posts = log.load().unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].content_type, "Deep Dive");
    assert_eq!(posts[0].run_id, report.run.run_id);

    // Final output carries what a publish retry would need
    assert_eq!(
        trace.final_output["headline"],
        "Agents eat the org chart"
    );
    assert!(trace.final_output["artifact_path"].is_string());
}

#[tokio::test]
async fn test_silence_veto_short_circuits_run() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = fixture(true, vec!["unused"], vec![95.0]);

    let report = orchestrator_in(dir.path(), fixture.roster, RunOptions::default())
        .run(&dir.path().join("traces"))
        .await
        .unwrap();

    assert_eq!(report.run.status, RunStatus::Silenced);
    assert!(report.artifact.is_none());
    assert!(report.receipt.is_none());

    let phases: Vec<&str> = report.trace.phases.iter().map(|p| p.phase.as_str()).collect();
    assert_eq!(phases, vec!["WorldPulse", "ContentStrategy"]);
}

#[tokio::test]
async fn test_topic_exhaustion_aborts_with_sealed_trace() {
    let dir = tempfile::tempdir().unwrap();

    // Seed history so every candidate (constant embedding) is a duplicate
    HistoryStore::new(dir.path().join("topic_history.json"))
        .write(&[TopicFingerprint {
            topic: "Prior story".to_string(),
            text: "Prior story | covered last week".to_string(),
            vector: vec![1.0, 0.0, 0.0],
            accepted_at: Utc::now(),
            post_ref: "post-0".to_string(),
        }])
        .unwrap();

    let fixture = fixture(
        false,
        vec!["Candidate one", "Candidate two", "Candidate three"],
        vec![95.0],
    );

    let report = orchestrator_in(dir.path(), fixture.roster, RunOptions::default())
        .run(&dir.path().join("traces"))
        .await
        .unwrap();

    assert_eq!(
        report.run.status,
        RunStatus::Aborted("topic_exhausted".to_string())
    );

    // One discovery phase per attempt, then nothing further
    let phases: Vec<&str> = report.trace.phases.iter().map(|p| p.phase.as_str()).collect();
    assert_eq!(
        phases,
        vec![
            "WorldPulse",
            "ContentStrategy",
            "TopicDiscovery",
            "TopicDiscovery_attempt2",
            "TopicDiscovery_attempt3",
        ]
    );

    // Rejected candidates never pollute history
    let history = HistoryStore::new(dir.path().join("topic_history.json"))
        .load()
        .unwrap();
    assert_eq!(history.len(), 1);

    // Later attempts carry the excluded topics with provenance
    let retry = report.trace.phase("TopicDiscovery_attempt2").unwrap();
    assert_eq!(
        retry.inputs.variable["excluded_topics"].source_phase,
        "TopicDiscovery"
    );
}

#[tokio::test]
async fn test_validation_regeneration_then_publish() {
    // Scenario: 72% on attempt 1 (threshold 80, max attempts 2),
    // 85% on attempt 2 -> publish with attempt-2 output
    let dir = tempfile::tempdir().unwrap();
    let fixture = fixture(false, vec!["Agents eat the org chart"], vec![72.0, 85.0]);
    let writer = Arc::clone(&fixture.writer);

    let report = orchestrator_in(dir.path(), fixture.roster, RunOptions::default())
        .run(&dir.path().join("traces"))
        .await
        .unwrap();

    assert_eq!(report.run.status, RunStatus::Published);

    let trace = &report.trace;
    for name in [
        "ContentSynthesis",
        "FinalValidation",
        "ContentSynthesis_attempt2",
        "NeutralityCheck_attempt2",
        "VisualPlanning_attempt2",
        "Render_attempt2",
        "ScreenAudit_attempt2",
        "FinalValidation_attempt2",
    ] {
        assert!(trace.phase(name).is_some(), "missing phase {}", name);
    }

    // The regenerated synthesis received the validator's demands as
    // additional fixed input
    let synthesis_calls = writer.produce_calls();
    assert_eq!(synthesis_calls.len(), 2);
    assert!(!synthesis_calls[0].contains_key("fix_instructions"));
    assert!(synthesis_calls[1].contains_key("fix_instructions"));
    assert_eq!(
        trace.phase("ContentSynthesis_attempt2").unwrap().inputs.fixed["fix_instructions"].value,
        serde_json::json!(["one point per page"]),
    );

    assert_no_forward_references(trace);
}

#[tokio::test]
async fn test_validation_exhaustion_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = fixture(false, vec!["Agents eat the org chart"], vec![72.0, 74.0]);

    let report = orchestrator_in(dir.path(), fixture.roster, RunOptions::default())
        .run(&dir.path().join("traces"))
        .await
        .unwrap();

    assert_eq!(
        report.run.status,
        RunStatus::Aborted("validation_failed".to_string())
    );
    assert!(report.receipt.is_none());

    // Exactly max_attempts validations, then the run stopped
    assert!(report.trace.phase("FinalValidation").is_some());
    assert!(report.trace.phase("FinalValidation_attempt2").is_some());
    assert!(report.trace.phase("FinalValidation_attempt3").is_none());
    assert!(report.trace.phase("PostCopy").is_none());
}

#[tokio::test]
async fn test_no_publish_mode_skips_publish_transition() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = fixture(false, vec!["Agents eat the org chart"], vec![95.0]);

    let options = RunOptions {
        dry_run_phases: None,
        publish: false,
    };
    let report = orchestrator_in(dir.path(), fixture.roster, options)
        .run(&dir.path().join("traces"))
        .await
        .unwrap();

    assert_eq!(report.run.status, RunStatus::Completed);
    assert!(report.receipt.is_none());

    // Copy and gate run; the publish transition does not
    assert!(report.trace.phase("PostCopy").is_some());
    assert!(report.trace.phase("PublishGate").is_some());
    assert!(report.trace.phase("Publish").is_none());

    // Nothing recorded as published
    assert!(HistoryStore::new(dir.path().join("topic_history.json"))
        .load()
        .unwrap()
        .is_empty());
    assert!(PublishLog::new(dir.path().join("publish_log.json"))
        .load()
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_dry_run_stops_after_phase_budget() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = fixture(false, vec!["Agents eat the org chart"], vec![95.0]);
    let scout = Arc::clone(&fixture.scout);

    let options = RunOptions {
        dry_run_phases: Some(2),
        publish: true,
    };
    let report = orchestrator_in(dir.path(), fixture.roster, options)
        .run(&dir.path().join("traces"))
        .await
        .unwrap();

    assert_eq!(report.run.status, RunStatus::Completed);
    let phases: Vec<&str> = report.trace.phases.iter().map(|p| p.phase.as_str()).collect();
    assert_eq!(phases, vec!["WorldPulse", "ContentStrategy"]);

    // The scout never ran
    assert!(scout.produce_calls().is_empty());
}
