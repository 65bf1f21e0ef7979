//! The phase orchestrator
//!
//! Drives the pure state machine through the full pipeline: every phase
//! is bracketed by tracer begin/end, debated phases bracket the whole
//! argue() call, the four analyst debates run as concurrent tasks joined
//! before the round table, and the run always finalizes with a sealed
//! trace, aborts included.

use atelier_core::{
    AgentOutput, AnalystLens, ArtifactHandle, AtelierError, ContentBrief, LayoutAudit,
    PipelineConfig, PostCopy, PublishReceipt, Result, Run, RunMode, RunStatus, TopicCandidate,
    WorldPulse,
};
use atelier_dedup::DedupGate;
use atelier_trace::{PhaseStart, RunTracer, Trace, VarRef};
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;

use crate::collaborators::{Publisher, Renderer};
use crate::debate::{DebateEngine, DebateOutcome};
use crate::guard::{checkpoint, GuardGate, GUARDRAIL};
use crate::publish_log::{PublishLog, PublishLogEntry};
use crate::roster::AgentRoster;
use crate::state_machine::{
    advance, Event, State, ABORT_TOPIC_EXHAUSTED, ABORT_VALIDATION_FAILED,
};
use crate::store::ResultStore;
use crate::AgentCapability;

/// Canonical phase names. Re-executed phases get an `_attemptN` suffix
/// so every trace record stays unique.
pub mod phase {
    use atelier_core::AnalystLens;

    pub const WORLD_PULSE: &str = "WorldPulse";
    pub const CONTENT_STRATEGY: &str = "ContentStrategy";
    pub const TOPIC_DISCOVERY: &str = "TopicDiscovery";
    pub const DESIGN: &str = "DesignDNA";
    pub const ROUND_TABLE: &str = "RoundTable";
    pub const EDITORIAL: &str = "Editorial";
    pub const SYNTHESIS: &str = "ContentSynthesis";
    pub const VISUAL_PLANNING: &str = "VisualPlanning";
    pub const RENDER: &str = "Render";
    pub const SCREEN_AUDIT: &str = "ScreenAudit";
    pub const FINAL_VALIDATION: &str = "FinalValidation";
    pub const POST_COPY: &str = "PostCopy";
    pub const PUBLISH: &str = "Publish";

    pub fn analyst(lens: AnalystLens) -> String {
        format!("Analyst_{}", lens)
    }

    pub fn attempt(base: &str, attempt: u32) -> String {
        if attempt <= 1 {
            base.to_string()
        } else {
            format!("{}_attempt{}", base, attempt)
        }
    }
}

const DESIGN_RUBRIC: &str = "Judge sentiment match, color psychology, proportions, \
    typographic hierarchy, and freshness. Reject palettes that fight the world mood.";
const ANALYSIS_RUBRIC: &str = "Judge depth, specificity, originality, premium tone, \
    and actionability. Demand concrete data points, dates, and names.";
const COPY_RUBRIC: &str = "Judge each page: exactly one point, one concrete insight, \
    premium tone. Reject any page carrying a list where a single statement belongs.";
const ROUND_TABLE_RUBRIC: &str = "You are reading a fellow analyst's work. Challenge \
    it from your own lens: what did they miss, where are they wrong, what needs \
    deeper analysis? Acknowledge what they got right.";

/// Caller-selected run behavior
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Execute only the first N phases, never publishing
    pub dry_run_phases: Option<u32>,
    /// When false, run all phases but skip the publish transition
    pub publish: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run_phases: None,
            publish: true,
        }
    }
}

/// Everything a finished run hands back to the caller
#[derive(Debug)]
pub struct RunReport {
    pub run: Run,
    pub trace: Trace,
    pub trace_path: PathBuf,
    pub artifact: Option<ArtifactHandle>,
    pub receipt: Option<PublishReceipt>,
}

/// Mutable per-run context threaded through the phases
#[derive(Default)]
struct RunContext {
    phases_executed: u32,
    pulse: Option<WorldPulse>,
    strategy: Option<atelier_core::ContentStrategy>,
    excluded_topics: Vec<String>,
    topic: Option<TopicCandidate>,
    topic_phase: String,
    design: Option<atelier_core::DesignSpec>,
    perspectives: Vec<(AnalystLens, String, atelier_core::Perspective)>,
    brief: Option<ContentBrief>,
    brief_phase: String,
    visuals: Option<atelier_core::VisualPlan>,
    visuals_phase: String,
    render_phase: String,
    artifact: Option<ArtifactHandle>,
    audit: Option<LayoutAudit>,
    audit_phase: String,
    fix_instructions: Vec<String>,
    last_validation_score: f32,
    debate_rounds: BTreeMap<String, u32>,
    post: Option<PostCopy>,
    post_phase: String,
    receipt: Option<PublishReceipt>,
}

impl RunContext {
    fn require<'a, T>(value: &'a Option<T>, what: &str) -> Result<&'a T> {
        value
            .as_ref()
            .ok_or_else(|| AtelierError::Lifecycle(format!("{} missing from run context", what)))
    }
}

/// Owns one run end to end: agents, tracer, dedup gate, collaborators
pub struct Orchestrator {
    config: PipelineConfig,
    roster: AgentRoster,
    tracer: Arc<RunTracer>,
    dedup: Arc<DedupGate>,
    renderer: Arc<dyn Renderer>,
    publisher: Arc<dyn Publisher>,
    publish_log: PublishLog,
    debate: DebateEngine,
    guard_gate: GuardGate,
    store: ResultStore,
    run: Run,
    options: RunOptions,
    ctx: RunContext,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: PipelineConfig,
        roster: AgentRoster,
        dedup: Arc<DedupGate>,
        renderer: Arc<dyn Renderer>,
        publisher: Arc<dyn Publisher>,
        publish_log: PublishLog,
        options: RunOptions,
    ) -> Self {
        let mode: RunMode = config.mode.parse().unwrap_or_default();
        let run = Run::begin(mode);
        let tracer = Arc::new(RunTracer::new(run.run_id.clone(), config.mode.clone()));
        let debate = DebateEngine::new(&config.debate);
        let guard_gate = GuardGate::new(Arc::clone(&roster.guard));

        Self {
            config,
            roster,
            tracer,
            dedup,
            renderer,
            publisher,
            publish_log,
            debate,
            guard_gate,
            store: ResultStore::new(),
            run,
            options,
            ctx: RunContext::default(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run.run_id
    }

    /// Execute the full pipeline. Always seals and saves the trace,
    /// aborts included; only lifecycle violations escape unsealed.
    pub async fn run(mut self, traces_dir: &std::path::Path) -> Result<RunReport> {
        tracing::info!(run_id = %self.run.run_id, mode = %self.config.mode, "starting run");

        let outcome = self.drive().await;
        let status = match outcome {
            Ok(status) => status,
            Err(e @ AtelierError::Lifecycle(_)) => return Err(e),
            Err(e) => {
                tracing::error!(error = %e, "run aborted");
                RunStatus::Aborted(e.abort_reason())
            }
        };

        self.run.finish(status.clone());
        self.tracer.record_final(self.final_output(&status))?;
        let trace = self.tracer.seal()?;
        let trace_path = trace.save(traces_dir)?;

        tracing::info!(
            run_id = %self.run.run_id,
            status = ?self.run.status,
            elapsed_seconds = self.run.elapsed_seconds,
            agent_calls = trace.total_agent_calls,
            debates = trace.total_debates,
            "run finished"
        );

        Ok(RunReport {
            run: self.run,
            trace,
            trace_path,
            artifact: self.ctx.artifact,
            receipt: self.ctx.receipt,
        })
    }

    async fn drive(&mut self) -> Result<RunStatus> {
        let mut state = State::initial();

        loop {
            if let Some(limit) = self.options.dry_run_phases {
                if !state.is_terminal() && self.ctx.phases_executed >= limit {
                    tracing::info!(limit, "dry-run phase budget reached");
                    return Ok(RunStatus::Completed);
                }
            }

            let event = match &state {
                State::Scanning => {
                    self.phase_world_pulse().await?;
                    Event::PulseReady
                }
                State::Strategizing => {
                    if self.phase_strategy().await? {
                        Event::SilenceVeto
                    } else {
                        Event::StrategyReady
                    }
                }
                State::Discovering { attempt } => {
                    let attempt = *attempt;
                    if self.phase_topic_discovery(attempt).await? {
                        Event::TopicAccepted
                    } else {
                        Event::TopicRejected {
                            max_attempts: self.config.dedup.max_topic_attempts,
                        }
                    }
                }
                State::Designing => {
                    self.phase_design().await?;
                    Event::DesignApproved
                }
                State::Analyzing => {
                    self.phase_analysts().await?;
                    Event::AnalysesComplete
                }
                State::RoundTable => {
                    self.phase_round_table().await?;
                    Event::ChallengesResolved
                }
                State::Editorial => {
                    self.phase_editorial().await?;
                    Event::EditorialCleared
                }
                State::Synthesizing { attempt } => {
                    let attempt = *attempt;
                    self.phase_synthesis(attempt).await?;
                    Event::BriefReady
                }
                State::EthicsReview { attempt } => {
                    let attempt = *attempt;
                    self.phase_ethics_gate(attempt).await?;
                    Event::GuardCleared
                }
                State::Visuals { attempt } => {
                    let attempt = *attempt;
                    self.phase_visual_planning(attempt).await?;
                    Event::VisualsReady
                }
                State::Rendering { attempt } => {
                    let attempt = *attempt;
                    self.phase_render(attempt).await?;
                    Event::ArtifactRendered
                }
                State::Auditing { attempt } => {
                    let attempt = *attempt;
                    self.phase_audit(attempt).await?;
                    Event::AuditComplete
                }
                State::Validating { attempt } => {
                    let attempt = *attempt;
                    if self.phase_validation(attempt).await? {
                        Event::ValidationPassed
                    } else {
                        Event::ValidationBelowBar {
                            max_attempts: self.config.validation.max_attempts,
                        }
                    }
                }
                State::Publishing => {
                    self.ctx.phases_executed += 1;
                    self.phase_post_copy().await?;
                    self.phase_publish_gate().await?;

                    let publish_allowed = self.options.publish
                        && self.config.controls.publish_enabled
                        && self.options.dry_run_phases.is_none();
                    if !publish_allowed {
                        tracing::info!("publishing disabled; stopping before the publish transition");
                        return Ok(RunStatus::Completed);
                    }

                    self.phase_publish().await?;
                    Event::PublishComplete
                }
                State::Published => return Ok(RunStatus::Published),
                State::Silenced => return Ok(RunStatus::Silenced),
                State::Aborted { reason } => return Err(self.abort_error(reason)),
            };

            state = advance(state, event);
        }
    }

    fn abort_error(&self, reason: &str) -> AtelierError {
        match reason {
            ABORT_TOPIC_EXHAUSTED => AtelierError::TopicExhausted {
                attempts: self.config.dedup.max_topic_attempts,
            },
            ABORT_VALIDATION_FAILED => AtelierError::ValidationRejected {
                score: self.ctx.last_validation_score,
                attempts: self.config.validation.max_attempts,
            },
            other => AtelierError::Other(other.to_string()),
        }
    }

    // ── Phase 0: world pulse ────────────────────────────────────────

    async fn phase_world_pulse(&mut self) -> Result<()> {
        self.ctx.phases_executed += 1;
        let agent = Arc::clone(&self.roster.world_pulse);

        let mut fixed = BTreeMap::new();
        fixed.insert(
            "calibration".to_string(),
            json!("most days are normal; flag extremes only when genuinely extreme"),
        );

        let output = run_agent_phase(
            &self.tracer,
            phase::WORLD_PULSE,
            agent.as_ref(),
            fixed,
            BTreeMap::new(),
        )
        .await?;

        let pulse = expect_output(&output, AgentOutput::as_pulse, "pulse")?.clone();
        tracing::info!(mood = %pulse.mood, score = pulse.sentiment_score, "world pulse scanned");

        self.store
            .insert(phase::WORLD_PULSE, agent.name(), agent.codename(), output)?;
        self.ctx.pulse = Some(pulse);
        Ok(())
    }

    // ── Phase 1: content strategy (+ silence veto) ──────────────────

    async fn phase_strategy(&mut self) -> Result<bool> {
        self.ctx.phases_executed += 1;
        let agent = Arc::clone(&self.roster.strategist);
        let pulse = RunContext::require(&self.ctx.pulse, "world pulse")?;

        let mut fixed = BTreeMap::new();
        fixed.insert(
            "anchor_filter".to_string(),
            json!(self.config.brand.anchor_filter),
        );
        fixed.insert(
            "recent_content_types".to_string(),
            json!(self.publish_log.recent_content_types(3)?),
        );

        let mut variable = BTreeMap::new();
        variable.insert(
            "world_pulse".to_string(),
            self.store
                .var_ref(phase::WORLD_PULSE, serde_json::to_value(pulse)?)?,
        );

        let output = run_agent_phase(
            &self.tracer,
            phase::CONTENT_STRATEGY,
            agent.as_ref(),
            fixed,
            variable,
        )
        .await?;

        let strategy = expect_output(&output, AgentOutput::as_strategy, "strategy")?.clone();
        let silent = strategy.silent;
        if silent {
            tracing::warn!("strategist vetoed output for this cycle");
        } else {
            tracing::info!(
                content_type = %strategy.content_type,
                pages = strategy.page_count,
                "strategy chosen"
            );
        }

        self.store.insert(
            phase::CONTENT_STRATEGY,
            agent.name(),
            agent.codename(),
            output,
        )?;
        self.ctx.strategy = Some(strategy);
        Ok(silent)
    }

    // ── Phase 2: topic discovery + dedup ────────────────────────────

    /// Returns true when the candidate cleared the dedup gate
    async fn phase_topic_discovery(&mut self, attempt: u32) -> Result<bool> {
        self.ctx.phases_executed += 1;
        let agent = Arc::clone(&self.roster.scout);
        let strategy = RunContext::require(&self.ctx.strategy, "strategy")?;
        let pulse = RunContext::require(&self.ctx.pulse, "world pulse")?;
        let name = phase::attempt(phase::TOPIC_DISCOVERY, attempt);

        let mut fixed = BTreeMap::new();
        fixed.insert(
            "anchor_filter".to_string(),
            json!(self.config.brand.anchor_filter),
        );

        let mut variable = BTreeMap::new();
        variable.insert(
            "content_type".to_string(),
            self.store
                .var_ref(phase::CONTENT_STRATEGY, json!(strategy.content_type))?,
        );
        variable.insert(
            "topic_direction".to_string(),
            self.store
                .var_ref(phase::CONTENT_STRATEGY, json!(strategy.topic_direction))?,
        );
        variable.insert(
            "world_mood".to_string(),
            self.store
                .var_ref(phase::WORLD_PULSE, json!(pulse.mood.to_string()))?,
        );
        if attempt > 1 {
            let previous = phase::attempt(phase::TOPIC_DISCOVERY, attempt - 1);
            variable.insert(
                "excluded_topics".to_string(),
                self.store
                    .var_ref(&previous, json!(self.ctx.excluded_topics))?,
            );
        }

        let output =
            run_agent_phase(&self.tracer, &name, agent.as_ref(), fixed, variable).await?;
        let candidate = expect_output(&output, AgentOutput::as_topic, "topic")?.clone();
        self.store
            .insert(name.as_str(), agent.name(), agent.codename(), output)?;

        let verdict = self.dedup.check(&candidate).await?;
        if verdict.too_similar {
            tracing::warn!(
                attempt,
                headline = %candidate.headline,
                similarity = verdict.max_similarity,
                "candidate blocked by dedup gate"
            );
            self.ctx.excluded_topics.push(candidate.headline);
            return Ok(false);
        }

        tracing::info!(attempt, headline = %candidate.headline, "topic accepted");
        self.ctx.topic = Some(candidate);
        self.ctx.topic_phase = name;
        Ok(true)
    }

    // ── Phase 3: design identity + debate ───────────────────────────

    async fn phase_design(&mut self) -> Result<()> {
        self.ctx.phases_executed += 1;
        let preparer = Arc::clone(&self.roster.designer);
        let reviewer = Arc::clone(&self.roster.design_reviewer);
        let pulse = RunContext::require(&self.ctx.pulse, "world pulse")?;
        let strategy = RunContext::require(&self.ctx.strategy, "strategy")?;
        let topic = RunContext::require(&self.ctx.topic, "topic")?;

        let mut variable = BTreeMap::new();
        variable.insert(
            "world_pulse".to_string(),
            self.store
                .var_ref(phase::WORLD_PULSE, serde_json::to_value(pulse)?)?,
        );
        variable.insert(
            "content_type".to_string(),
            self.store
                .var_ref(phase::CONTENT_STRATEGY, json!(strategy.content_type))?,
        );
        variable.insert(
            "topic".to_string(),
            self.store
                .var_ref(&self.ctx.topic_phase, json!(topic.headline))?,
        );

        let outcome = run_debated_phase(
            &self.tracer,
            phase::DESIGN,
            preparer.as_ref(),
            reviewer.as_ref(),
            self.debate,
            BTreeMap::new(),
            variable,
            DESIGN_RUBRIC,
        )
        .await?;

        let design = expect_output(&outcome.work, AgentOutput::as_design, "design")?.clone();
        tracing::info!(
            design = %design.design_name,
            theme = %design.theme,
            rounds = outcome.rounds_executed,
            "design settled"
        );

        self.ctx
            .debate_rounds
            .insert(phase::DESIGN.to_string(), outcome.rounds_executed);
        self.store.insert(
            phase::DESIGN,
            preparer.name(),
            preparer.codename(),
            outcome.work,
        )?;
        self.ctx.design = Some(design);
        Ok(())
    }

    // ── Phase 4: analyst pairs, concurrent debates ──────────────────

    async fn phase_analysts(&mut self) -> Result<()> {
        self.ctx.phases_executed += 1;
        let topic = RunContext::require(&self.ctx.topic, "topic")?.clone();
        let strategy = RunContext::require(&self.ctx.strategy, "strategy")?;

        let mut set: JoinSet<Result<(AnalystLens, String, String, String, DebateOutcome)>> =
            JoinSet::new();

        for pair in &self.roster.analysts {
            let lens = pair.lens;
            let preparer = Arc::clone(&pair.preparer);
            let reviewer = Arc::clone(&pair.reviewer);
            let tracer = Arc::clone(&self.tracer);
            let debate = self.debate;
            let name = phase::analyst(lens);

            let mut fixed = BTreeMap::new();
            fixed.insert("lens".to_string(), json!(lens.as_str()));

            let mut variable = BTreeMap::new();
            variable.insert(
                "story".to_string(),
                self.store
                    .var_ref(&self.ctx.topic_phase, serde_json::to_value(&topic)?)?,
            );
            variable.insert(
                "content_type".to_string(),
                self.store
                    .var_ref(phase::CONTENT_STRATEGY, json!(strategy.content_type))?,
            );

            set.spawn(async move {
                let outcome = run_debated_phase(
                    &tracer,
                    &name,
                    preparer.as_ref(),
                    reviewer.as_ref(),
                    debate,
                    fixed,
                    variable,
                    ANALYSIS_RUBRIC,
                )
                .await?;
                Ok((
                    lens,
                    name,
                    preparer.name().to_string(),
                    preparer.codename().to_string(),
                    outcome,
                ))
            });
        }

        // Join every dispatched debate before moving on, even when one
        // fails, so the trace has no orphaned phases.
        let mut finished = Vec::new();
        let mut first_error: Option<AtelierError> = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(result)) => finished.push(result),
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "analyst debate failed");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                Err(join_error) => {
                    if first_error.is_none() {
                        first_error = Some(AtelierError::Lifecycle(format!(
                            "analyst task panicked: {}",
                            join_error
                        )));
                    }
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        // Deterministic lens order regardless of completion order
        for lens in AnalystLens::all() {
            let (_, name, agent_name, codename, outcome) = finished
                .iter()
                .find(|(l, ..)| *l == lens)
                .cloned()
                .ok_or_else(|| {
                    AtelierError::Lifecycle(format!("analyst result for lens {} missing", lens))
                })?;

            let perspective =
                expect_output(&outcome.work, AgentOutput::as_perspective, "perspective")?.clone();
            self.ctx
                .debate_rounds
                .insert(name.clone(), outcome.rounds_executed);
            self.store
                .insert(name.as_str(), agent_name, codename, outcome.work.clone())?;
            self.ctx.perspectives.push((lens, name, perspective));
        }
        Ok(())
    }

    // ── Phase 5: round table ────────────────────────────────────────

    async fn phase_round_table(&mut self) -> Result<()> {
        self.ctx.phases_executed += 1;
        let name = phase::ROUND_TABLE;

        let mut variable = BTreeMap::new();
        for (lens, source_phase, perspective) in &self.ctx.perspectives {
            variable.insert(
                format!("perspective_{}", lens),
                self.store.var_ref(source_phase, json!(perspective.thesis))?,
            );
        }

        let t0 = begin_custom_phase(
            &self.tracer,
            name,
            "AnalystPanel",
            "",
            "panel",
            &BTreeMap::new(),
            &variable,
        )?;

        let result = self.round_table_inner().await;

        let mut events = Vec::new();
        for pair in &self.roster.analysts {
            events.extend(pair.preparer.drain_events());
        }
        self.tracer.log_events(name, events)?;

        match result {
            Ok(summary) => {
                self.tracer
                    .end_phase(name, summary, t0.elapsed().as_millis() as u64)?;
                Ok(())
            }
            Err(e) => {
                self.tracer.end_phase(
                    name,
                    json!({"error": e.to_string()}),
                    t0.elapsed().as_millis() as u64,
                )?;
                Err(e)
            }
        }
    }

    async fn round_table_inner(&mut self) -> Result<Value> {
        let mut rounds = Vec::new();
        let mut incoming: BTreeMap<&'static str, Vec<String>> = BTreeMap::new();
        let mut summary = Vec::new();

        for (index, lens) in AnalystLens::all().into_iter().enumerate() {
            let target = lens.round_table_target();
            let challenger = Arc::clone(
                &self
                    .roster
                    .analyst(lens)
                    .ok_or_else(|| {
                        AtelierError::Lifecycle(format!("no analyst pair for lens {}", lens))
                    })?
                    .preparer,
            );

            let target_work = self
                .ctx
                .perspectives
                .iter()
                .find(|(l, ..)| *l == target)
                .map(|(_, _, p)| AgentOutput::Perspective(p.clone()))
                .ok_or_else(|| {
                    AtelierError::Lifecycle(format!("perspective for lens {} missing", target))
                })?;

            let challenge = challenger.critique(&target_work, ROUND_TABLE_RUBRIC).await?;
            tracing::info!(
                challenger = %lens,
                target = %target,
                score = challenge.score,
                demands = challenge.demands.len(),
                "round table challenge"
            );

            summary.push(json!({
                "from": lens.as_str(),
                "to": target.as_str(),
                "score": challenge.score,
                "demand_count": challenge.demands.len(),
            }));
            rounds.push(atelier_trace::RoundRecord {
                round: index as u32 + 1,
                score: challenge.score,
                approved: challenge.approved,
                demands: challenge.demands.clone(),
                revised: !challenge.demands.is_empty(),
            });
            if !challenge.demands.is_empty() {
                incoming
                    .entry(target.as_str())
                    .or_default()
                    .extend(challenge.demands);
            }
        }

        self.tracer
            .log_debate(phase::ROUND_TABLE, "AnalystPanel", "AnalystPanel", rounds)?;

        // Each challenged analyst incorporates the incoming demands
        for lens in AnalystLens::all() {
            let Some(demands) = incoming.get(lens.as_str()) else {
                continue;
            };
            let preparer = Arc::clone(
                &self
                    .roster
                    .analyst(lens)
                    .ok_or_else(|| {
                        AtelierError::Lifecycle(format!("no analyst pair for lens {}", lens))
                    })?
                    .preparer,
            );

            let entry = self
                .ctx
                .perspectives
                .iter_mut()
                .find(|(l, ..)| *l == lens)
                .ok_or_else(|| {
                    AtelierError::Lifecycle(format!("perspective for lens {} missing", lens))
                })?;

            let revised = preparer
                .revise(&AgentOutput::Perspective(entry.2.clone()), demands)
                .await?;
            entry.2 = expect_output(&revised, AgentOutput::as_perspective, "perspective")?.clone();
            tracing::info!(lens = %lens, incoming = demands.len(), "challenge incorporated");
        }

        Ok(json!({ "challenges": summary }))
    }

    // ── Phase 6: editorial gate ─────────────────────────────────────

    async fn phase_editorial(&mut self) -> Result<()> {
        self.ctx.phases_executed += 1;
        let name = phase::EDITORIAL;
        let editor = Arc::clone(&self.roster.editor);

        let mut fixed = BTreeMap::new();
        fixed.insert("guardrail".to_string(), json!(snippet(GUARDRAIL, 100)));

        let mut variable = BTreeMap::new();
        for (lens, source_phase, perspective) in &self.ctx.perspectives {
            variable.insert(
                format!("perspective_{}", lens),
                self.store.var_ref(source_phase, json!(perspective.thesis))?,
            );
        }

        let t0 = begin_agent_phase(&self.tracer, name, editor.as_ref(), &fixed, &variable)?;
        let result = self.editorial_inner(&editor, &fixed, &variable).await;

        let mut events = editor.drain_events();
        for pair in &self.roster.analysts {
            events.extend(pair.preparer.drain_events());
        }
        self.tracer.log_events(name, events)?;

        let duration_ms = t0.elapsed().as_millis() as u64;
        match result {
            Ok(output) => {
                self.tracer
                    .end_phase(name, serde_json::to_value(&output)?, duration_ms)?;
                self.store
                    .insert(name, editor.name(), editor.codename(), output)?;
                Ok(())
            }
            Err(e) => {
                self.tracer
                    .end_phase(name, json!({"error": e.to_string()}), duration_ms)?;
                Err(e)
            }
        }
    }

    async fn editorial_inner(
        &mut self,
        editor: &Arc<dyn AgentCapability>,
        fixed: &BTreeMap<String, Value>,
        variable: &BTreeMap<String, VarRef>,
    ) -> Result<AgentOutput> {
        let output = editor
            .produce(&to_json_map(fixed), &var_values(variable))
            .await?;
        let review = expect_output(&output, AgentOutput::as_editorial, "editorial")?.clone();
        tracing::info!(score = review.quality_score, ready = review.ready_for_synthesis, "editorial review");

        // Lenses the editor scored below 8 revise before synthesis
        for feedback in &review.lens_feedback {
            if feedback.score >= 8 {
                continue;
            }
            let preparer = Arc::clone(
                &self
                    .roster
                    .analyst(feedback.lens)
                    .ok_or_else(|| {
                        AtelierError::Lifecycle(format!("no analyst pair for lens {}", feedback.lens))
                    })?
                    .preparer,
            );
            let entry = self
                .ctx
                .perspectives
                .iter_mut()
                .find(|(l, ..)| *l == feedback.lens)
                .ok_or_else(|| {
                    AtelierError::Lifecycle(format!("perspective for lens {} missing", feedback.lens))
                })?;

            let revised = preparer
                .revise(
                    &AgentOutput::Perspective(entry.2.clone()),
                    &[feedback.notes.clone()],
                )
                .await?;
            entry.2 = expect_output(&revised, AgentOutput::as_perspective, "perspective")?.clone();
            tracing::info!(lens = %feedback.lens, "revised per editorial demands");
        }

        Ok(output)
    }

    // ── Phase 7: content synthesis + copy debate ────────────────────

    async fn phase_synthesis(&mut self, attempt: u32) -> Result<()> {
        self.ctx.phases_executed += 1;
        let preparer = Arc::clone(&self.roster.writer);
        let reviewer = Arc::clone(&self.roster.copy_reviewer);
        let strategy = RunContext::require(&self.ctx.strategy, "strategy")?;
        let topic = RunContext::require(&self.ctx.topic, "topic")?;
        let name = phase::attempt(phase::SYNTHESIS, attempt);

        let mut fixed = BTreeMap::new();
        fixed.insert("guardrail".to_string(), json!(snippet(GUARDRAIL, 100)));
        fixed.insert(
            "anchor_filter".to_string(),
            json!(self.config.brand.anchor_filter),
        );
        if attempt > 1 {
            // Loop-back from final validation carries its demands here
            fixed.insert(
                "fix_instructions".to_string(),
                json!(self.ctx.fix_instructions),
            );
        }

        let mut variable = BTreeMap::new();
        variable.insert(
            "story".to_string(),
            self.store
                .var_ref(&self.ctx.topic_phase, json!(topic.headline))?,
        );
        variable.insert(
            "content_type".to_string(),
            self.store
                .var_ref(phase::CONTENT_STRATEGY, json!(strategy.content_type))?,
        );
        variable.insert(
            "page_count".to_string(),
            self.store
                .var_ref(phase::CONTENT_STRATEGY, json!(strategy.page_count))?,
        );
        variable.insert(
            "design".to_string(),
            self.store.var_ref(
                phase::DESIGN,
                json!(RunContext::require(&self.ctx.design, "design")?.design_name),
            )?,
        );
        for (lens, source_phase, perspective) in &self.ctx.perspectives {
            variable.insert(
                format!("perspective_{}", lens),
                self.store
                    .var_ref(source_phase, serde_json::to_value(perspective)?)?,
            );
        }

        let outcome = run_debated_phase(
            &self.tracer,
            &name,
            preparer.as_ref(),
            reviewer.as_ref(),
            self.debate,
            fixed,
            variable,
            COPY_RUBRIC,
        )
        .await?;

        let brief = expect_output(&outcome.work, AgentOutput::as_brief, "brief")?.clone();
        tracing::info!(
            title = %brief.brief_title,
            pages = brief.pages.len(),
            rounds = outcome.rounds_executed,
            "brief synthesized"
        );

        self.ctx
            .debate_rounds
            .insert(name.clone(), outcome.rounds_executed);
        self.store
            .insert(name.as_str(), preparer.name(), preparer.codename(), outcome.work)?;
        self.ctx.brief = Some(brief);
        self.ctx.brief_phase = name;
        Ok(())
    }

    // ── Phase 8: neutrality checkpoint ──────────────────────────────

    async fn phase_ethics_gate(&mut self, attempt: u32) -> Result<()> {
        self.ctx.phases_executed += 1;
        let name = phase::attempt(checkpoint::NEUTRALITY, attempt);
        let guard = Arc::clone(self.guard_gate.agent());
        let writer = Arc::clone(&self.roster.writer);
        let brief = RunContext::require(&self.ctx.brief, "brief")?.clone();

        let mut fixed = BTreeMap::new();
        fixed.insert("guardrail".to_string(), json!(snippet(GUARDRAIL, 100)));

        let mut variable = BTreeMap::new();
        variable.insert(
            "brief".to_string(),
            self.store
                .var_ref(&self.ctx.brief_phase, json!(brief.brief_title))?,
        );

        let t0 = begin_agent_phase(&self.tracer, &name, guard.as_ref(), &fixed, &variable)?;

        let result = async {
            let work = AgentOutput::Brief(brief);
            let critique = self
                .guard_gate
                .review(checkpoint::NEUTRALITY, &work)
                .await?;

            let mut revised = false;
            if !critique.approved {
                let reworked = writer.revise(&work, &critique.demands).await?;
                let new_brief =
                    expect_output(&reworked, AgentOutput::as_brief, "brief")?.clone();
                self.ctx.brief = Some(new_brief);
                revised = true;
                tracing::info!("brief revised after neutrality feedback");
            }

            Ok::<Value, AtelierError>(json!({
                "score": critique.score,
                "approved": critique.approved,
                "violations": critique.demands,
                "revised": revised,
            }))
        }
        .await;

        let mut events = guard.drain_events();
        events.extend(writer.drain_events());
        self.tracer.log_events(&name, events)?;

        finish_custom_phase(&self.tracer, &name, t0, result).map(|_| ())
    }

    // ── Phase 9: visual planning ────────────────────────────────────

    async fn phase_visual_planning(&mut self, attempt: u32) -> Result<()> {
        self.ctx.phases_executed += 1;
        let agent = Arc::clone(&self.roster.visual_planner);
        let brief = RunContext::require(&self.ctx.brief, "brief")?;
        let design = RunContext::require(&self.ctx.design, "design")?;
        let name = phase::attempt(phase::VISUAL_PLANNING, attempt);

        let pages: Vec<Value> = brief
            .pages
            .iter()
            .enumerate()
            .map(|(i, p)| json!({"page_number": i + 1, "page_type": p.page_type, "title": p.title}))
            .collect();

        let mut variable = BTreeMap::new();
        variable.insert(
            "pages".to_string(),
            self.store.var_ref(&self.ctx.brief_phase, json!(pages))?,
        );
        variable.insert(
            "design".to_string(),
            self.store
                .var_ref(phase::DESIGN, serde_json::to_value(design)?)?,
        );

        let output =
            run_agent_phase(&self.tracer, &name, agent.as_ref(), BTreeMap::new(), variable)
                .await?;
        let visuals = expect_output(&output, AgentOutput::as_visuals, "visuals")?.clone();

        self.store
            .insert(name.as_str(), agent.name(), agent.codename(), output)?;
        self.ctx.visuals = Some(visuals);
        self.ctx.visuals_phase = name;
        Ok(())
    }

    // ── Phase 10: render (collaborator) ─────────────────────────────

    async fn phase_render(&mut self, attempt: u32) -> Result<()> {
        self.ctx.phases_executed += 1;
        let name = phase::attempt(phase::RENDER, attempt);
        let brief = RunContext::require(&self.ctx.brief, "brief")?.clone();
        let design = RunContext::require(&self.ctx.design, "design")?.clone();
        let visuals = RunContext::require(&self.ctx.visuals, "visuals")?.clone();

        let mut variable = BTreeMap::new();
        variable.insert(
            "brief".to_string(),
            self.store
                .var_ref(&self.ctx.brief_phase, json!(brief.brief_title))?,
        );
        variable.insert(
            "design".to_string(),
            self.store.var_ref(phase::DESIGN, json!(design.design_name))?,
        );
        variable.insert(
            "visuals".to_string(),
            self.store
                .var_ref(&self.ctx.visuals_phase, json!(visuals.pages.len()))?,
        );

        let t0 = begin_custom_phase(
            &self.tracer,
            &name,
            "Renderer",
            "",
            "collaborator",
            &BTreeMap::new(),
            &variable,
        )?;

        let result = match self.renderer.render(&brief, &design, &visuals).await {
            Ok(artifact) => {
                let value = json!({"artifact_path": artifact.path.display().to_string()});
                self.ctx.artifact = Some(artifact);
                Ok(value)
            }
            Err(e) => Err(e),
        };

        finish_custom_phase(&self.tracer, &name, t0, result)?;
        self.ctx.render_phase = name;
        Ok(())
    }

    // ── Phase 11: screen audit ──────────────────────────────────────

    async fn phase_audit(&mut self, attempt: u32) -> Result<()> {
        self.ctx.phases_executed += 1;
        let agent = Arc::clone(&self.roster.auditor);
        let brief = RunContext::require(&self.ctx.brief, "brief")?;
        let artifact = RunContext::require(&self.ctx.artifact, "artifact")?;
        let name = phase::attempt(phase::SCREEN_AUDIT, attempt);

        let pages: Vec<Value> = brief
            .pages
            .iter()
            .enumerate()
            .map(|(i, p)| {
                json!({
                    "page_number": i + 1,
                    "page_type": p.page_type,
                    "has_point": !p.point.is_empty(),
                    "has_insight": !p.insight.is_empty(),
                    "has_quote": !p.quote.is_empty(),
                })
            })
            .collect();

        let mut fixed = BTreeMap::new();
        fixed.insert("target".to_string(), json!("55-65% fill, golden ratio"));

        let mut variable = BTreeMap::new();
        variable.insert(
            "pages".to_string(),
            self.store.var_ref(&self.ctx.brief_phase, json!(pages))?,
        );
        variable.insert(
            "artifact".to_string(),
            self.store.var_ref(
                &self.ctx.render_phase,
                json!(artifact.path.display().to_string()),
            )?,
        );

        let output =
            run_agent_phase(&self.tracer, &name, agent.as_ref(), fixed, variable).await?;
        let audit = expect_output(&output, AgentOutput::as_audit, "audit")?.clone();
        tracing::info!(approved = audit.approved, "screen audit complete");

        self.store
            .insert(name.as_str(), agent.name(), agent.codename(), output)?;
        self.ctx.audit = Some(audit);
        self.ctx.audit_phase = name;
        Ok(())
    }

    // ── Phase 12: final validation ──────────────────────────────────

    /// Returns true when the weighted score reaches the publish threshold
    async fn phase_validation(&mut self, attempt: u32) -> Result<bool> {
        self.ctx.phases_executed += 1;
        let agent = Arc::clone(&self.roster.validator);
        let brief = RunContext::require(&self.ctx.brief, "brief")?;
        let design = RunContext::require(&self.ctx.design, "design")?;
        let audit = RunContext::require(&self.ctx.audit, "audit")?;
        let name = phase::attempt(phase::FINAL_VALIDATION, attempt);
        let threshold = self.config.validation.publish_threshold;

        let mut fixed = BTreeMap::new();
        fixed.insert("threshold_pct".to_string(), json!(threshold));
        fixed.insert(
            "debate_rounds".to_string(),
            json!(self.ctx.debate_rounds),
        );

        let mut variable = BTreeMap::new();
        variable.insert(
            "brief".to_string(),
            self.store.var_ref(
                &self.ctx.brief_phase,
                serde_json::to_value(brief)?,
            )?,
        );
        variable.insert(
            "design".to_string(),
            self.store.var_ref(phase::DESIGN, json!(design.design_name))?,
        );
        variable.insert(
            "audit".to_string(),
            self.store
                .var_ref(&self.ctx.audit_phase, json!(audit.approved))?,
        );

        let output =
            run_agent_phase(&self.tracer, &name, agent.as_ref(), fixed, variable).await?;
        let report = expect_output(&output, AgentOutput::as_validation, "validation")?.clone();
        self.store
            .insert(name.as_str(), agent.name(), agent.codename(), output)?;

        self.ctx.last_validation_score = report.total_score;
        let passed = report.total_score >= threshold;
        if passed {
            tracing::info!(score = report.total_score, attempt, "final validation passed");
        } else {
            tracing::warn!(
                score = report.total_score,
                threshold,
                attempt,
                failures = report.critical_failures.len(),
                "final validation below the publish bar"
            );
            self.ctx.fix_instructions = report.fix_instructions.clone();
        }
        Ok(passed)
    }

    // ── Phase 13: post copy, publish gate, publish ──────────────────

    async fn phase_post_copy(&mut self) -> Result<()> {
        let agent = Arc::clone(&self.roster.publicist);
        let brief = RunContext::require(&self.ctx.brief, "brief")?;
        let topic = RunContext::require(&self.ctx.topic, "topic")?;
        let design = RunContext::require(&self.ctx.design, "design")?;

        let mut fixed = BTreeMap::new();
        fixed.insert("author".to_string(), json!(self.config.brand.author));
        fixed.insert("assistant".to_string(), json!(self.config.brand.assistant));

        let mut variable = BTreeMap::new();
        variable.insert(
            "story".to_string(),
            self.store
                .var_ref(&self.ctx.topic_phase, json!(topic.headline))?,
        );
        variable.insert(
            "brief_title".to_string(),
            self.store
                .var_ref(&self.ctx.brief_phase, json!(brief.brief_title))?,
        );
        variable.insert(
            "design_mood".to_string(),
            self.store
                .var_ref(phase::DESIGN, json!(design.mood_alignment))?,
        );

        let output = run_agent_phase(
            &self.tracer,
            phase::POST_COPY,
            agent.as_ref(),
            fixed,
            variable,
        )
        .await?;

        let mut post = expect_output(&output, AgentOutput::as_post, "post")?.clone();
        post.document_title = post.resolved_title(&brief.brief_title);
        tracing::info!(
            chars = post.post_text.len(),
            title = %post.document_title,
            "post copy crafted"
        );

        self.store
            .insert(phase::POST_COPY, agent.name(), agent.codename(), output)?;
        self.ctx.post = Some(post);
        self.ctx.post_phase = phase::POST_COPY.to_string();
        Ok(())
    }

    async fn phase_publish_gate(&mut self) -> Result<()> {
        let name = checkpoint::PUBLISH_GATE;
        let guard = Arc::clone(self.guard_gate.agent());
        let publicist = Arc::clone(&self.roster.publicist);
        let post = RunContext::require(&self.ctx.post, "post copy")?.clone();

        let mut variable = BTreeMap::new();
        variable.insert(
            "post".to_string(),
            self.store
                .var_ref(&self.ctx.post_phase, json!(post.document_title))?,
        );

        let t0 =
            begin_agent_phase(&self.tracer, name, guard.as_ref(), &BTreeMap::new(), &variable)?;

        let result = async {
            let work = AgentOutput::Post(post);
            let critique = self
                .guard_gate
                .review(checkpoint::PUBLISH_GATE, &work)
                .await?;

            let mut revised = false;
            if !critique.approved {
                let reworked = publicist.revise(&work, &critique.demands).await?;
                let new_post = expect_output(&reworked, AgentOutput::as_post, "post")?.clone();
                self.ctx.post = Some(new_post);
                revised = true;
                tracing::info!("post copy revised after publish gate feedback");
            }

            Ok::<Value, AtelierError>(json!({
                "score": critique.score,
                "approved": critique.approved,
                "violations": critique.demands,
                "revised": revised,
            }))
        }
        .await;

        let mut events = guard.drain_events();
        events.extend(publicist.drain_events());
        self.tracer.log_events(name, events)?;

        finish_custom_phase(&self.tracer, name, t0, result).map(|_| ())
    }

    async fn phase_publish(&mut self) -> Result<()> {
        let name = phase::PUBLISH;
        let post = RunContext::require(&self.ctx.post, "post copy")?.clone();
        let artifact = RunContext::require(&self.ctx.artifact, "artifact")?.clone();
        let topic = RunContext::require(&self.ctx.topic, "topic")?.clone();

        let mut variable = BTreeMap::new();
        variable.insert(
            "post".to_string(),
            self.store
                .var_ref(&self.ctx.post_phase, json!(post.document_title))?,
        );
        variable.insert(
            "artifact".to_string(),
            self.store.var_ref(
                &self.ctx.render_phase,
                json!(artifact.path.display().to_string()),
            )?,
        );

        let t0 = begin_custom_phase(
            &self.tracer,
            name,
            "Publisher",
            "",
            "collaborator",
            &BTreeMap::new(),
            &variable,
        )?;

        let result = async {
            let receipt = self.publisher.publish(&artifact, &post).await?;
            // Fingerprint and log only once the topic is accepted into a
            // published run
            self.dedup.record(&topic, &receipt.post_ref).await?;
            self.publish_log.append(self.log_entry(&post, &receipt)?)?;
            let value = serde_json::to_value(&receipt)?;
            self.ctx.receipt = Some(receipt);
            Ok::<Value, AtelierError>(value)
        }
        .await;

        finish_custom_phase(&self.tracer, name, t0, result).map(|_| ())
    }

    fn log_entry(&self, post: &PostCopy, receipt: &PublishReceipt) -> Result<PublishLogEntry> {
        let topic = RunContext::require(&self.ctx.topic, "topic")?;
        let brief = RunContext::require(&self.ctx.brief, "brief")?;
        let design = RunContext::require(&self.ctx.design, "design")?;
        let strategy = RunContext::require(&self.ctx.strategy, "strategy")?;
        let pulse = RunContext::require(&self.ctx.pulse, "world pulse")?;

        Ok(PublishLogEntry {
            post_ref: receipt.post_ref.clone(),
            url: receipt.url.clone(),
            topic: topic.headline.clone(),
            brief_title: brief.brief_title.clone(),
            document_title: post.document_title.clone(),
            content_type: strategy.content_type.clone(),
            design_name: design.design_name.clone(),
            world_mood: pulse.mood.to_string(),
            run_id: self.run.run_id.clone(),
            published_at: Utc::now(),
            status: "published".to_string(),
        })
    }

    fn final_output(&self, status: &RunStatus) -> Value {
        let ctx = &self.ctx;
        json!({
            "status": status,
            "topic": ctx.topic,
            "headline": ctx.topic.as_ref().map(|t| t.headline.clone()),
            "content_type": ctx.strategy.as_ref().map(|s| s.content_type.clone()),
            "world_mood": ctx.pulse.as_ref().map(|p| p.mood.to_string()),
            "design_name": ctx.design.as_ref().map(|d| d.design_name.clone()),
            "brief_title": ctx.brief.as_ref().map(|b| b.brief_title.clone()),
            "validation_score": ctx.last_validation_score,
            "artifact_path": ctx.artifact.as_ref().map(|a| a.path.display().to_string()),
            "post": ctx.post,
            "receipt": ctx.receipt,
        })
    }
}

// ── Phase bracketing helpers ────────────────────────────────────────

fn to_json_map(fixed: &BTreeMap<String, Value>) -> Map<String, Value> {
    fixed.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

fn var_values(variable: &BTreeMap<String, VarRef>) -> Map<String, Value> {
    variable
        .iter()
        .map(|(k, v)| (k.clone(), v.value.clone()))
        .collect()
}

fn expect_output<'a, T>(
    output: &'a AgentOutput,
    accessor: fn(&AgentOutput) -> Option<&T>,
    kind: &str,
) -> Result<&'a T> {
    accessor(output).ok_or_else(|| {
        AtelierError::Lifecycle(format!(
            "agent returned {} output where {} was contracted",
            output.kind(),
            kind
        ))
    })
}

fn snippet(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn begin_agent_phase(
    tracer: &RunTracer,
    name: &str,
    agent: &dyn AgentCapability,
    fixed: &BTreeMap<String, Value>,
    variable: &BTreeMap<String, VarRef>,
) -> Result<Instant> {
    begin_custom_phase(
        tracer,
        name,
        agent.name(),
        agent.codename(),
        &agent.model(),
        fixed,
        variable,
    )
}

fn begin_custom_phase(
    tracer: &RunTracer,
    name: &str,
    agent_name: &str,
    codename: &str,
    model: &str,
    fixed: &BTreeMap<String, Value>,
    variable: &BTreeMap<String, VarRef>,
) -> Result<Instant> {
    tracer.begin_phase(PhaseStart {
        phase: name.to_string(),
        agent_name: agent_name.to_string(),
        agent_codename: codename.to_string(),
        model: model.to_string(),
        fixed_inputs: fixed.clone(),
        variable_inputs: variable.clone(),
    })?;
    Ok(Instant::now())
}

fn finish_custom_phase(
    tracer: &RunTracer,
    name: &str,
    t0: Instant,
    result: Result<Value>,
) -> Result<Value> {
    let duration_ms = t0.elapsed().as_millis() as u64;
    match result {
        Ok(value) => {
            tracer.end_phase(name, value.clone(), duration_ms)?;
            Ok(value)
        }
        Err(e) => {
            tracer.end_phase(name, json!({"error": e.to_string()}), duration_ms)?;
            Err(e)
        }
    }
}

/// Bracket a plain produce phase: begin, invoke, attach events, end
async fn run_agent_phase(
    tracer: &RunTracer,
    name: &str,
    agent: &dyn AgentCapability,
    fixed: BTreeMap<String, Value>,
    variable: BTreeMap<String, VarRef>,
) -> Result<AgentOutput> {
    let t0 = begin_agent_phase(tracer, name, agent, &fixed, &variable)?;
    let result = agent
        .produce(&to_json_map(&fixed), &var_values(&variable))
        .await;
    tracer.log_events(name, agent.drain_events())?;

    let duration_ms = t0.elapsed().as_millis() as u64;
    match result {
        Ok(output) => {
            tracer.end_phase(name, serde_json::to_value(&output)?, duration_ms)?;
            Ok(output)
        }
        Err(e) => {
            tracer.end_phase(name, json!({"error": e.to_string()}), duration_ms)?;
            Err(e)
        }
    }
}

/// Bracket a debated phase: the whole produce + argue() exchange runs
/// inside one begin/end pair, with the debate logged round by round
#[allow(clippy::too_many_arguments)]
async fn run_debated_phase(
    tracer: &RunTracer,
    name: &str,
    preparer: &dyn AgentCapability,
    reviewer: &dyn AgentCapability,
    debate: DebateEngine,
    fixed: BTreeMap<String, Value>,
    variable: BTreeMap<String, VarRef>,
    rubric: &str,
) -> Result<DebateOutcome> {
    let t0 = begin_agent_phase(tracer, name, preparer, &fixed, &variable)?;

    let result = async {
        let initial = preparer
            .produce(&to_json_map(&fixed), &var_values(&variable))
            .await?;
        debate
            .argue(name, initial, preparer, reviewer, rubric, tracer)
            .await
    }
    .await;

    let mut events = preparer.drain_events();
    events.extend(reviewer.drain_events());
    tracer.log_events(name, events)?;

    let duration_ms = t0.elapsed().as_millis() as u64;
    match result {
        Ok(outcome) => {
            tracer.end_phase(name, serde_json::to_value(&outcome.work)?, duration_ms)?;
            Ok(outcome)
        }
        Err(e) => {
            tracer.end_phase(name, json!({"error": e.to_string()}), duration_ms)?;
            Err(e)
        }
    }
}
