//! Run-scoped result store
//!
//! Each phase writes its output exactly once under its own phase name;
//! later phases read earlier results and build traced variable-input
//! references from them. Single writer per key, enforced.

use atelier_core::{AgentOutput, AtelierError, Result};
use atelier_trace::VarRef;
use serde_json::Value;
use std::collections::HashMap;

/// A stored phase result with its producer identity
#[derive(Debug, Clone)]
pub struct StoredResult {
    pub phase: String,
    pub agent: String,
    pub codename: String,
    pub output: AgentOutput,
}

/// Phase-name-keyed result store for one run
#[derive(Debug, Default)]
pub struct ResultStore {
    results: HashMap<String, StoredResult>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a phase result. Writing a key twice is a contract
    /// violation: every slot has exactly one owning phase.
    pub fn insert(
        &mut self,
        phase: impl Into<String>,
        agent: impl Into<String>,
        codename: impl Into<String>,
        output: AgentOutput,
    ) -> Result<()> {
        let phase = phase.into();
        if self.results.contains_key(&phase) {
            return Err(AtelierError::Lifecycle(format!(
                "result store slot '{}' already written",
                phase
            )));
        }
        self.results.insert(
            phase.clone(),
            StoredResult {
                phase,
                agent: agent.into(),
                codename: codename.into(),
                output,
            },
        );
        Ok(())
    }

    /// Fetch a prior phase's result. A missing key means the caller is
    /// referencing a phase that has not run: a contract violation.
    pub fn get(&self, phase: &str) -> Result<&StoredResult> {
        self.results.get(phase).ok_or_else(|| {
            AtelierError::Lifecycle(format!(
                "result store has no entry for phase '{}' (unresolved reference)",
                phase
            ))
        })
    }

    pub fn contains(&self, phase: &str) -> bool {
        self.results.contains_key(phase)
    }

    /// Build a traced variable-input reference from a stored result,
    /// carrying the given view of its value.
    pub fn var_ref(&self, phase: &str, value: Value) -> Result<VarRef> {
        let stored = self.get(phase)?;
        Ok(VarRef::new(
            stored.agent.clone(),
            stored.codename.clone(),
            stored.phase.clone(),
            value,
        ))
    }

    /// Extract a typed view of a stored output; the wrong variant is a
    /// contract violation (the owning phase validated shape already).
    pub fn expect<'a, T>(
        &'a self,
        phase: &str,
        accessor: fn(&AgentOutput) -> Option<&T>,
        kind: &str,
    ) -> Result<&'a T> {
        let stored = self.get(phase)?;
        accessor(&stored.output).ok_or_else(|| {
            AtelierError::Lifecycle(format!(
                "phase '{}' holds {} output, expected {}",
                phase,
                stored.output.kind(),
                kind
            ))
        })
    }
}
