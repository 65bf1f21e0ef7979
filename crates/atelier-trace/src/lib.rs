//! # atelier-trace
//!
//! Provenance tracer for Atelier runs.
//!
//! This crate provides:
//! - Phase records with fixed/variable input attribution
//! - Debate records with round-by-round results
//! - Lifecycle enforcement (no forward references, no double-close,
//!   no mutation after sealing)
//! - The sealed, immutable [`Trace`] and its JSON persistence

#![allow(dead_code)]

mod record;
mod tracer;

pub use record::{
    DebateRecord, PhaseInputs, PhaseRecord, RoundRecord, Trace, TracedFixedInput,
    TracedVariableInput,
};
pub use tracer::{PhaseStart, RunTracer, VarRef};
