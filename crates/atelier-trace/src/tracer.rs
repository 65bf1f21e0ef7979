//! Run tracer: the complete provenance chain for every phase invocation
//!
//! For each phase the tracer records the fixed inputs (from
//! configuration), the variable inputs with source attribution (which
//! phase and agent produced them), the output, and the duration. Debates
//! are recorded round by round. `seal()` produces the immutable
//! [`Trace`]; any mutation afterwards is a lifecycle violation.
//!
//! The tracer is append-only behind an interior mutex, so parallel
//! analyst phases may call `begin_phase`/`end_phase` concurrently as
//! long as each phase name is unique.

use atelier_core::{AtelierError, CapabilityEvent, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use crate::record::{
    DebateRecord, PhaseInputs, PhaseRecord, RoundRecord, Trace, TracedFixedInput,
    TracedVariableInput,
};

const MAX_TRACED_STRING: usize = 500;
const MAX_TRACED_LIST: usize = 15;

/// A variable input reference: the value plus its originating phase and
/// agent. Built by the caller when wiring one phase's output into
/// another.
#[derive(Debug, Clone)]
pub struct VarRef {
    pub value: Value,
    pub source_agent: String,
    pub source_codename: String,
    pub source_phase: String,
}

impl VarRef {
    pub fn new(
        source_agent: impl Into<String>,
        source_codename: impl Into<String>,
        source_phase: impl Into<String>,
        value: Value,
    ) -> Self {
        Self {
            value,
            source_agent: source_agent.into(),
            source_codename: source_codename.into(),
            source_phase: source_phase.into(),
        }
    }
}

/// Everything `begin_phase` needs to open a phase record
#[derive(Debug, Clone)]
pub struct PhaseStart {
    pub phase: String,
    pub agent_name: String,
    pub agent_codename: String,
    pub model: String,
    pub fixed_inputs: BTreeMap<String, Value>,
    pub variable_inputs: BTreeMap<String, VarRef>,
}

struct OpenPhase {
    agent_name: String,
    agent_codename: String,
    model: String,
    timestamp: DateTime<Utc>,
    inputs: PhaseInputs,
    events: Vec<CapabilityEvent>,
    debate_rounds: Option<u32>,
}

enum Entry {
    Phase(PhaseRecord),
    Debate(DebateRecord),
}

struct Inner {
    open: HashMap<String, OpenPhase>,
    entries: Vec<Entry>,
    completed: HashSet<String>,
    final_output: Value,
    sealed: Option<Trace>,
}

/// Tracks every phase invocation of one run with full provenance
pub struct RunTracer {
    run_id: String,
    mode: String,
    started: DateTime<Utc>,
    inner: Mutex<Inner>,
}

impl RunTracer {
    pub fn new(run_id: impl Into<String>, mode: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            mode: mode.into(),
            started: Utc::now(),
            inner: Mutex::new(Inner {
                open: HashMap::new(),
                entries: Vec::new(),
                completed: HashSet::new(),
                final_output: Value::Null,
                sealed: None,
            }),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Start tracking a phase invocation.
    ///
    /// Every variable input must name a phase that has already completed
    /// in this run. Forward or missing references are lifecycle
    /// violations, caught here before the agent is invoked.
    pub fn begin_phase(&self, start: PhaseStart) -> Result<()> {
        let mut inner = self.lock()?;
        Self::ensure_unsealed(&inner)?;

        if inner.open.contains_key(&start.phase) || inner.completed.contains(&start.phase) {
            return Err(AtelierError::Lifecycle(format!(
                "phase '{}' already begun in this run",
                start.phase
            )));
        }

        for (key, var) in &start.variable_inputs {
            if !inner.completed.contains(&var.source_phase) {
                return Err(AtelierError::Lifecycle(format!(
                    "phase '{}' variable input '{}' references phase '{}' which has not completed",
                    start.phase, key, var.source_phase
                )));
            }
        }

        let fixed = start
            .fixed_inputs
            .iter()
            .map(|(k, v)| {
                (
                    k.clone(),
                    TracedFixedInput {
                        value: truncate_value(v, MAX_TRACED_STRING),
                        source: format!("config → {}", k),
                    },
                )
            })
            .collect();

        let variable = start
            .variable_inputs
            .iter()
            .map(|(k, v)| {
                (
                    k.clone(),
                    TracedVariableInput {
                        value: truncate_value(&v.value, MAX_TRACED_STRING),
                        source_agent: v.source_agent.clone(),
                        source_codename: v.source_codename.clone(),
                        source_phase: v.source_phase.clone(),
                    },
                )
            })
            .collect();

        inner.open.insert(
            start.phase,
            OpenPhase {
                agent_name: start.agent_name,
                agent_codename: start.agent_codename,
                model: start.model,
                timestamp: Utc::now(),
                inputs: PhaseInputs { fixed, variable },
                events: Vec::new(),
                debate_rounds: None,
            },
        );
        Ok(())
    }

    /// Record the phase output and close the record. Calling this twice
    /// for the same phase, or without a matching `begin_phase`, is a
    /// lifecycle violation.
    pub fn end_phase(&self, phase: &str, output: Value, duration_ms: u64) -> Result<()> {
        let mut inner = self.lock()?;
        Self::ensure_unsealed(&inner)?;

        let open = inner.open.remove(phase).ok_or_else(|| {
            AtelierError::Lifecycle(format!(
                "end_phase('{}') without a matching open phase",
                phase
            ))
        })?;

        let record = PhaseRecord {
            phase: phase.to_string(),
            agent_name: open.agent_name,
            agent_codename: open.agent_codename,
            model: open.model,
            timestamp: open.timestamp,
            inputs: open.inputs,
            output: truncate_value(&output, MAX_TRACED_STRING),
            duration_ms,
            capability_events: open.events,
            debate_rounds: open.debate_rounds,
        };

        inner.completed.insert(phase.to_string());
        inner.entries.push(Entry::Phase(record));
        Ok(())
    }

    /// Attach capability events (fallback attempts, retries) to the
    /// currently open phase.
    pub fn log_events(&self, phase: &str, events: Vec<CapabilityEvent>) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        let mut inner = self.lock()?;
        Self::ensure_unsealed(&inner)?;

        let open = inner.open.get_mut(phase).ok_or_else(|| {
            AtelierError::Lifecycle(format!("log_events('{}') but phase is not open", phase))
        })?;
        open.events.extend(events);
        Ok(())
    }

    /// Record a preparer/reviewer debate, round by round.
    ///
    /// `phase` names the bracketing phase, which must be open (debates
    /// run inside their phase bracket). Round indices must start at 1
    /// and increase strictly.
    pub fn log_debate(
        &self,
        phase: &str,
        preparer: &str,
        reviewer: &str,
        rounds: Vec<RoundRecord>,
    ) -> Result<()> {
        for (i, round) in rounds.iter().enumerate() {
            if round.round != i as u32 + 1 {
                return Err(AtelierError::Lifecycle(format!(
                    "debate '{}' round index {} at position {}",
                    phase,
                    round.round,
                    i + 1
                )));
            }
        }

        let mut inner = self.lock()?;
        Self::ensure_unsealed(&inner)?;

        let total_rounds = rounds.len() as u32;
        match inner.open.get_mut(phase) {
            Some(open) => open.debate_rounds = Some(total_rounds),
            None => {
                return Err(AtelierError::Lifecycle(format!(
                    "log_debate('{}') but phase is not open",
                    phase
                )))
            }
        }

        inner.entries.push(Entry::Debate(DebateRecord {
            phase: phase.to_string(),
            preparer: preparer.to_string(),
            reviewer: reviewer.to_string(),
            total_rounds,
            rounds,
            timestamp: Utc::now(),
        }));
        Ok(())
    }

    /// Set the run's final output, included in the sealed trace.
    ///
    /// Stored untruncated: replaying the publish transition from a
    /// sealed trace needs the exact post copy and artifact path.
    pub fn record_final(&self, output: Value) -> Result<()> {
        let mut inner = self.lock()?;
        Self::ensure_unsealed(&inner)?;
        inner.final_output = output;
        Ok(())
    }

    /// Produce the immutable trace snapshot.
    ///
    /// Idempotent: a second call returns a bit-identical trace. Open
    /// phases at seal time indicate a driver bug and fail loudly.
    pub fn seal(&self) -> Result<Trace> {
        let mut inner = self.lock()?;

        if let Some(trace) = &inner.sealed {
            return Ok(trace.clone());
        }

        if !inner.open.is_empty() {
            let mut names: Vec<&String> = inner.open.keys().collect();
            names.sort();
            return Err(AtelierError::Lifecycle(format!(
                "seal() with open phase(s): {}",
                names
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }

        let completed = Utc::now();
        let mut phases = Vec::new();
        let mut debates = Vec::new();
        let mut agent_flow = Vec::new();

        for entry in &inner.entries {
            match entry {
                Entry::Phase(record) => {
                    agent_flow.push(flow_line_for_phase(record));
                    phases.push(record.clone());
                }
                Entry::Debate(record) => {
                    agent_flow.push(format!(
                        "  DEBATE: {} — {} vs {} ({} rounds)",
                        record.phase, record.preparer, record.reviewer, record.total_rounds
                    ));
                    debates.push(record.clone());
                }
            }
        }

        let trace = Trace {
            run_id: self.run_id.clone(),
            mode: self.mode.clone(),
            started: self.started,
            completed,
            total_duration_seconds: (completed - self.started).num_milliseconds() as f64 / 1000.0,
            total_agent_calls: phases.len(),
            total_debates: debates.len(),
            agent_flow,
            phases,
            debates,
            final_output: inner.final_output.clone(),
        };

        inner.sealed = Some(trace.clone());
        Ok(trace)
    }

    fn ensure_unsealed(inner: &Inner) -> Result<()> {
        if inner.sealed.is_some() {
            return Err(AtelierError::Lifecycle(
                "tracer is sealed; no further mutation is permitted".to_string(),
            ));
        }
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| AtelierError::Lifecycle("tracer mutex poisoned".to_string()))
    }
}

fn flow_line_for_phase(record: &PhaseRecord) -> String {
    let sources: Vec<String> = record
        .inputs
        .variable
        .iter()
        .map(|(key, var)| format!("{}.{}", var.source_agent, key))
        .collect();

    let src_str = if sources.is_empty() {
        "config only".to_string()
    } else {
        sources.join(" + ")
    };

    format!(
        "  {} ({}) ← [{}]",
        record.agent_name, record.agent_codename, src_str
    )
}

/// Truncate large values so trace files stay readable
fn truncate_value(value: &Value, max_str: usize) -> Value {
    match value {
        Value::String(s) => {
            if s.chars().count() > max_str {
                let truncated: String = s.chars().take(max_str).collect();
                Value::String(format!("{}…", truncated))
            } else {
                value.clone()
            }
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), truncate_value(v, max_str)))
                .collect(),
        ),
        Value::Array(items) => {
            if items.len() > MAX_TRACED_LIST {
                let mut truncated: Vec<Value> = items
                    .iter()
                    .take(MAX_TRACED_LIST)
                    .map(|v| truncate_value(v, max_str))
                    .collect();
                truncated.push(Value::String(format!(
                    "… +{} more",
                    items.len() - MAX_TRACED_LIST
                )));
                Value::Array(truncated)
            } else {
                Value::Array(items.iter().map(|v| truncate_value(v, max_str)).collect())
            }
        }
        other => other.clone(),
    }
}
