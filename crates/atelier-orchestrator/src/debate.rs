//! Debate engine: the bounded critique/revise loop between a preparer and
//! a reviewer
//!
//! The loop terminates at the first round where the reviewer both
//! approves AND scores at or above the pass bar, or when the round
//! budget is exhausted. Approval and score are a conjunction, never
//! evaluated independently: a high score without conscious sign-off
//! keeps the debate going. Non-convergence is not an error; the last
//! round's work is returned with the flag lowered and the caller
//! decides (typically: proceed with a logged warning).
//!
//! Every round is flushed to the tracer regardless of outcome,
//! including capability failures mid-debate.

use atelier_core::{AgentOutput, DebateConfig, Result};
use atelier_trace::{RoundRecord, RunTracer};

use crate::AgentCapability;

/// Result of one debate session
#[derive(Debug, Clone)]
pub struct DebateOutcome {
    /// Work produced by the last executed round
    pub work: AgentOutput,
    pub rounds_executed: u32,
    /// True when the pass condition was met within the round budget
    pub converged: bool,
}

/// Runs preparer/reviewer debates under configured bounds
#[derive(Debug, Clone, Copy)]
pub struct DebateEngine {
    max_rounds: u32,
    pass_score: u8,
}

impl DebateEngine {
    pub fn new(config: &DebateConfig) -> Self {
        Self {
            max_rounds: config.max_rounds,
            pass_score: config.pass_score,
        }
    }

    pub fn max_rounds(&self) -> u32 {
        self.max_rounds
    }

    /// Argue over `initial` until the quality bar is met or the round
    /// budget is exhausted.
    ///
    /// `phase` names the open tracer phase bracketing this debate; the
    /// round-by-round record is logged under it.
    pub async fn argue(
        &self,
        phase: &str,
        initial: AgentOutput,
        preparer: &dyn AgentCapability,
        reviewer: &dyn AgentCapability,
        rubric: &str,
        tracer: &RunTracer,
    ) -> Result<DebateOutcome> {
        let mut work = initial;
        let mut rounds: Vec<RoundRecord> = Vec::new();
        let mut converged = false;
        let mut round: u32 = 1;

        let outcome = loop {
            let critique = match reviewer.critique(&work, rubric).await {
                Ok(critique) => critique,
                Err(e) => break Err(e),
            };

            tracing::info!(
                phase,
                round,
                max_rounds = self.max_rounds,
                score = critique.score,
                approved = critique.approved,
                demands = critique.demands.len(),
                "debate round reviewed"
            );

            // Conjunction: approval alone or score alone never ends the loop
            if critique.approved && critique.score >= self.pass_score {
                rounds.push(round_record(round, &critique, false));
                converged = true;
                break Ok(());
            }

            if round == self.max_rounds {
                rounds.push(round_record(round, &critique, false));
                break Ok(());
            }

            match preparer.revise(&work, &critique.demands).await {
                Ok(revised) => {
                    rounds.push(round_record(round, &critique, true));
                    work = revised;
                    round += 1;
                }
                Err(e) => {
                    rounds.push(round_record(round, &critique, false));
                    break Err(e);
                }
            }
        };

        // Flushed on every exit path, including the error ones
        tracer.log_debate(phase, preparer.name(), reviewer.name(), rounds)?;

        outcome?;

        if !converged {
            tracing::warn!(
                phase,
                rounds = round,
                "debate did not converge; proceeding with last round's work"
            );
        }

        Ok(DebateOutcome {
            work,
            rounds_executed: round,
            converged,
        })
    }
}

fn round_record(round: u32, critique: &atelier_core::Critique, revised: bool) -> RoundRecord {
    RoundRecord {
        round,
        score: critique.score,
        approved: critique.approved,
        demands: critique.demands.clone(),
        revised,
    }
}
