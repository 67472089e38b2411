//! Core types and error definitions for the pitchforge pipeline.
//!
//! This crate provides the domain model shared across all pitchforge crates:
//! the error taxonomy, customers and their research profiles, pitch versions
//! and their scores, agent-to-agent messages, and the run state machine.
//!
//! # Main types
//!
//! - [`PitchError`] — Unified error enum; [`ErrorKind`] is its serializable classification.
//! - [`Pitch`] — One version of a pitch, linked to its parent version.
//! - [`Score`] — Five-dimension quality score with a derived overall value.
//! - [`A2AMessage`] — One recorded message between two logical agents.
//! - [`Stage`] — Position of a run in the pipeline state machine.
//! - [`RunConfig`] / [`RunStatus`] / [`RunOutcome`] — Run input, poll snapshot and result.

/// Customers and research output.
pub mod customer;
/// Error taxonomy.
pub mod error;
/// Agent-to-agent messages.
pub mod message;
/// Pitch versions and drafts.
pub mod pitch;
/// Run configuration, state machine and results.
pub mod run;
/// Quality scores.
pub mod score;

pub use customer::{CompanySize, CustomerProfile, CustomerSeed, Recommendations};
pub use error::{ErrorKind, PitchError, PitchResult, StageFailure};
pub use message::{A2AMessage, AgentKind, MessageStatus, MessageType};
pub use pitch::{Draft, Pitch, PitchStatus, PitchType, Tone};
pub use run::{
    GateVerdict, RunConfig, RunOutcome, RunStatus, Stage, TerminalState, MAX_ITERATIONS_LIMIT,
};
pub use score::{Dimension, Dimensions, Score, ScoreWeights, SCORE_EPSILON};
