//! Pipeline orchestration for pitchforge.
//!
//! Runs a customer through Research, Generate and a bounded
//! Score/Refine loop, recording every delegation on the run's A2A trail and
//! publishing progress to subscribers.
//!
//! # Main types
//!
//! - [`Orchestrator`] — Drives runs; synchronous [`Orchestrator::run`] or background [`Orchestrator::start`].
//! - [`OrchestratorConfig`] — Stage timeouts, run deadline, retries, score weights and run retention.
//! - [`ProgressNotifier`] — Per-run progress broadcast; [`progress_stream`] adapts a subscription.
//! - [`RunTable`] / [`CancelToken`] — Run status polling and cooperative cancellation.

/// Orchestrator settings.
pub mod config;
/// The pipeline state machine.
pub mod engine;
/// Quality gate decisions.
pub mod gate;
/// Progress notifications.
pub mod progress;
/// Run registry and cancellation.
pub mod runs;

pub use config::{OrchestratorConfig, StageTimeouts};
pub use engine::Orchestrator;
pub use gate::{BestPitch, GateDecision};
pub use progress::{progress_stream, ProgressEvent, ProgressNotifier};
pub use runs::{CancelToken, RunTable};
