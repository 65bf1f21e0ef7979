//! # atelier-agent
//!
//! Agent capability contract and model backend adapters for Atelier.
//!
//! Key design: each capability call is completely stateless. The concrete
//! generative model hides behind [`ModelBackend`], backends compose into
//! an explicit ordered [`FallbackChain`], and role-shaped output is
//! parsed and validated at this boundary so downstream phases never see
//! a malformed document.

#![allow(dead_code)]

mod backend;
mod capability;
mod circuit_breaker;
mod embedding;
mod types;

pub use backend::{FallbackChain, HttpChatBackend, ModelBackend};
pub use capability::{parse_json_payload, AgentCapability, AgentRole, RoleAgent};
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use embedding::{EmbeddingBackend, HttpEmbeddingBackend};
pub use types::{
    ChatChoice, ChatMessage, ChatRequest, ChatResponse, EmbeddingData, EmbeddingRequest,
    EmbeddingResponse, ResponseFormat, Usage,
};
