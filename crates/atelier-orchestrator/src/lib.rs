//! # atelier-orchestrator
//!
//! Phase-sequenced orchestration engine for Atelier.
//!
//! This crate provides:
//! - A pure state machine for pipeline control flow
//! - The debate engine running bounded preparer/reviewer exchanges
//! - The run-scoped result store with single-writer slots
//! - Reusable guard checkpoints for the content guardrail
//! - Renderer/publisher collaborator boundaries
//! - The orchestrator driving a full run, trace sealing included

#![allow(dead_code)]

mod checklist;
mod collaborators;
mod debate;
mod guard;
mod orchestrator;
mod publish_log;
mod roster;
mod state_machine;
mod store;

pub use atelier_agent::AgentCapability;
pub use checklist::{checklist_prompt, total_weight, ChecklistRule, MASTER_CHECKLIST};
pub use collaborators::{JsonDeckRenderer, LocalPublisher, Publisher, Renderer};
pub use debate::{DebateEngine, DebateOutcome};
pub use guard::{checkpoint, GuardGate, GUARDRAIL};
pub use orchestrator::{phase, Orchestrator, RunOptions, RunReport};
pub use publish_log::{PublishLog, PublishLogEntry};
pub use roster::{AgentRoster, AnalystPair};
pub use state_machine::{advance, Event, State, ABORT_TOPIC_EXHAUSTED, ABORT_VALIDATION_FAILED};
pub use store::{ResultStore, StoredResult};
