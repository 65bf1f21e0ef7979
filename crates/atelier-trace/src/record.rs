//! Serialized trace record types
//!
//! A sealed [`Trace`] lets a reader answer, for any phase: its fixed
//! inputs, its variable inputs with source attribution, its output, and
//! its duration, without cross-referencing any other file.

use atelier_core::{AtelierError, CapabilityEvent, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A fixed input: its value and where in the configuration it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracedFixedInput {
    pub value: Value,
    pub source: String,
}

/// A variable input: its value plus the phase and agent that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracedVariableInput {
    pub value: Value,
    pub source_agent: String,
    #[serde(default)]
    pub source_codename: String,
    pub source_phase: String,
}

/// Inputs of one phase, split by provenance class
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseInputs {
    pub fixed: BTreeMap<String, TracedFixedInput>,
    pub variable: BTreeMap<String, TracedVariableInput>,
}

/// One entry per phase execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub phase: String,
    pub agent_name: String,
    #[serde(default)]
    pub agent_codename: String,
    pub model: String,
    pub timestamp: DateTime<Utc>,
    pub inputs: PhaseInputs,
    pub output: Value,
    pub duration_ms: u64,
    /// Fallback/retry events raised by the capability during this phase
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capability_events: Vec<CapabilityEvent>,
    /// Round count when the phase was wrapped by a debate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debate_rounds: Option<u32>,
}

/// One critique/revise cycle inside a debate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    /// 1-based, strictly increasing
    pub round: u32,
    pub score: u8,
    pub approved: bool,
    #[serde(default)]
    pub demands: Vec<String>,
    /// Whether a revision followed this critique
    pub revised: bool,
}

/// A full preparer/reviewer debate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateRecord {
    /// Phase name the debate was bracketed by
    pub phase: String,
    pub preparer: String,
    pub reviewer: String,
    pub total_rounds: u32,
    pub rounds: Vec<RoundRecord>,
    pub timestamp: DateTime<Utc>,
}

/// The sealed, immutable provenance record of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub run_id: String,
    pub mode: String,
    pub started: DateTime<Utc>,
    pub completed: DateTime<Utc>,
    pub total_duration_seconds: f64,
    pub total_agent_calls: usize,
    pub total_debates: usize,
    /// Human-readable provenance lines, in execution order
    pub agent_flow: Vec<String>,
    pub phases: Vec<PhaseRecord>,
    pub debates: Vec<DebateRecord>,
    #[serde(default)]
    pub final_output: Value,
}

impl Trace {
    /// Write the trace as pretty JSON under `dir`, named by run id
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.json", self.run_id));
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;
        tracing::info!(
            path = %path.display(),
            agent_calls = self.total_agent_calls,
            debates = self.total_debates,
            "trace saved"
        );
        Ok(path)
    }

    /// Load a previously sealed trace
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(AtelierError::from)
    }

    /// Look up a phase record by name
    pub fn phase(&self, name: &str) -> Option<&PhaseRecord> {
        self.phases.iter().find(|p| p.phase == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_trace() -> Trace {
        Trace {
            run_id: "run_test_1".to_string(),
            mode: "autonomous".to_string(),
            started: Utc::now(),
            completed: Utc::now(),
            total_duration_seconds: 1.5,
            total_agent_calls: 1,
            total_debates: 0,
            agent_flow: vec!["  Scout (Sable) ← [config only]".to_string()],
            phases: vec![PhaseRecord {
                phase: "TopicDiscovery".to_string(),
                agent_name: "NewsScout".to_string(),
                agent_codename: "Sable".to_string(),
                model: "gpt-4o".to_string(),
                timestamp: Utc::now(),
                inputs: PhaseInputs::default(),
                output: serde_json::json!({"headline": "h"}),
                duration_ms: 1500,
                capability_events: Vec::new(),
                debate_rounds: None,
            }],
            debates: Vec::new(),
            final_output: Value::Null,
        }
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let trace = sample_trace();

        let path = trace.save(dir.path()).unwrap();
        assert!(path.ends_with("run_test_1.json"));

        let loaded = Trace::load(&path).unwrap();
        assert_eq!(loaded, trace);
    }

    #[test]
    fn test_phase_lookup() {
        let trace = sample_trace();
        assert!(trace.phase("TopicDiscovery").is_some());
        assert!(trace.phase("Missing").is_none());
    }
}
