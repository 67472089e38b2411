//! LLM-backed agents for the pitchforge pipeline.
//!
//! Each agent wraps an [`LlmClient`] with a system prompt and turns model
//! text into typed results. The orchestrator only sees the
//! [`AgentCapability`] trait, so agents can be swapped for stubs in tests.
//!
//! # Main types
//!
//! - [`AgentCapability`] — The five operations an agent may perform.
//! - [`AgentRoster`] — One agent per pipeline role.
//! - [`LlmClient`] — Provider backend wrapped in failover.
//! - [`ModelConfig`] / [`LlmProvider`] — Which model to call and how.
//! - [`AgentProfiles`] — Per-role system prompts and sampling overrides.

/// Research, generator, scoring, refiner and strategy agents.
pub mod agents;
/// Provider HTTP backends.
pub mod backends;
/// The agent trait and its request types.
pub mod capability;
/// Model and provider configuration.
pub mod config;
/// Fallback across models with retry backoff.
pub mod failover;
/// Backend selection.
pub mod llm;
/// Parsing of model output.
pub mod parse;
/// Per-role prompts and sampling settings.
pub mod profiles;
/// Prompt builders.
pub mod prompts;

pub use agents::{
    AgentRoster, GeneratorAgent, RefinerAgent, ResearchAgent, ScoringAgent, StrategyAgent,
};
pub use backends::{CompletionParams, CompletionRequest, LlmBackend};
pub use capability::{AgentCapability, AgentContext, Feedback, GenerationRequest};
pub use config::{LlmProvider, ModelConfig};
pub use failover::{FailoverBackend, RetryPolicy};
pub use llm::LlmClient;
pub use profiles::{AgentProfile, AgentProfiles};
