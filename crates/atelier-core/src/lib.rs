//! # atelier-core
//!
//! Core types for the Atelier autonomous brief pipeline.
//!
//! Atelier orchestrates a roster of role-specific agents through a
//! phase-sequenced state machine that debates, traces, and gates its way
//! from a global sentiment scan to a published brief.
//!
//! ## Core Paradigm
//!
//! - Every agent output is a typed, tagged variant (no loose documents)
//! - Configuration is loaded once per run and never mutated
//! - Every phase input is attributed to its source phase and agent
//! - Quality bars are conjunctions: approval AND score, never one alone

#![allow(dead_code)]

mod config;
mod error;
mod types;

pub use config::{
    BackendEndpoint, BackendsConfig, BrandConfig, Controls, DebateConfig, DedupConfig,
    PipelineConfig, StorageConfig, ValidationConfig,
};
pub use error::{AtelierError, Result};
pub use types::*;
