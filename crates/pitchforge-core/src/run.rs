use crate::error::{ErrorKind, PitchError, PitchResult, StageFailure};
use crate::message::A2AMessage;
use crate::pitch::{Pitch, PitchType, Tone};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound on `max_iterations` accepted from callers.
pub const MAX_ITERATIONS_LIMIT: u32 = 20;

/// Position of a run in the pipeline state machine.
///
/// ```text
/// Created -> Researching -> Generating -> Scoring -> (Refining -> Scoring)*
///         -> Finalizing -> Completed | Failed
/// ```
/// `Cancelled` and `Failed` are reachable from every non-terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Registered, nothing run yet.
    Created,
    /// Research stage.
    Researching,
    /// First draft.
    Generating,
    /// Scoring the current pitch.
    Scoring,
    /// Refining the current pitch.
    Refining,
    /// Persisting the chosen pitch.
    Finalizing,
    /// Finished with an accepted pitch.
    Completed,
    /// Ended by an error or a passed deadline.
    Failed,
    /// Cancelled by the caller.
    Cancelled,
}

impl Stage {
    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed | Stage::Cancelled)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: Stage) -> bool {
        if self.is_terminal() {
            return false;
        }
        if matches!(next, Stage::Failed | Stage::Cancelled) {
            return true;
        }
        matches!(
            (self, next),
            (Stage::Created, Stage::Researching)
                | (Stage::Researching, Stage::Generating)
                | (Stage::Generating, Stage::Scoring)
                | (Stage::Scoring, Stage::Refining)
                | (Stage::Scoring, Stage::Finalizing)
                | (Stage::Refining, Stage::Scoring)
                | (Stage::Refining, Stage::Finalizing)
                | (Stage::Finalizing, Stage::Completed)
        )
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Created => "created",
            Stage::Researching => "researching",
            Stage::Generating => "generating",
            Stage::Scoring => "scoring",
            Stage::Refining => "refining",
            Stage::Finalizing => "finalizing",
            Stage::Completed => "completed",
            Stage::Failed => "failed",
            Stage::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalState {
    /// The run produced an accepted pitch.
    Completed,
    /// The run ended with an error.
    Failed,
    /// The caller cancelled the run.
    Cancelled,
}

impl From<TerminalState> for Stage {
    fn from(t: TerminalState) -> Self {
        match t {
            TerminalState::Completed => Stage::Completed,
            TerminalState::Failed => Stage::Failed,
            TerminalState::Cancelled => Stage::Cancelled,
        }
    }
}

/// How the quality gate let the run go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateVerdict {
    /// A pitch reached the threshold.
    Passed,
    /// Iterations ran out; the best pitch seen was accepted.
    Exhausted,
}

/// Per-run configuration supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Voice of the pitch.
    #[serde(default)]
    pub tone: Tone,
    /// Kind of pitch.
    #[serde(default)]
    pub pitch_type: PitchType,
    /// Template the generator should follow.
    #[serde(default)]
    pub template: Option<String>,
    /// Overall score a pitch needs to pass the gate, in (0, 1].
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f64,
    /// Refinements allowed before the best pitch is accepted.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Campaign to attach generated pitches to.
    #[serde(default)]
    pub campaign_id: Option<Uuid>,
    /// Extra instructions passed to generation.
    #[serde(default)]
    pub additional_context: Option<String>,
    /// Also ask the strategy agent for recommendations during research.
    #[serde(default)]
    pub include_strategy: bool,
    /// Language code for the pitch.
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_score_threshold() -> f64 {
    0.7
}

fn default_max_iterations() -> u32 {
    3
}

fn default_language() -> String {
    "en".to_string()
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            tone: Tone::default(),
            pitch_type: PitchType::default(),
            template: None,
            score_threshold: default_score_threshold(),
            max_iterations: default_max_iterations(),
            campaign_id: None,
            additional_context: None,
            include_strategy: false,
            language: default_language(),
        }
    }
}

impl RunConfig {
    /// Set the score threshold.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.score_threshold = threshold;
        self
    }

    /// Set the refinement limit.
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Reject out-of-range values before any stage runs.
    pub fn validate(&self) -> PitchResult<()> {
        let t = self.score_threshold;
        if !t.is_finite() || t <= 0.0 || t > 1.0 {
            return Err(PitchError::InputInvalid(format!(
                "score_threshold must be in (0, 1], got {t}"
            )));
        }
        if self.max_iterations > MAX_ITERATIONS_LIMIT {
            return Err(PitchError::InputInvalid(format!(
                "max_iterations must be at most {MAX_ITERATIONS_LIMIT}, got {}",
                self.max_iterations
            )));
        }
        if self.language.trim().is_empty() {
            return Err(PitchError::InputInvalid("language must not be empty".into()));
        }
        Ok(())
    }
}

/// Snapshot returned by status polling. Frozen once `terminal` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
    /// Run id.
    pub run_id: Uuid,
    /// Customer the run is for.
    pub customer_id: Uuid,
    /// Current stage.
    pub stage: Stage,
    /// Refinements so far.
    pub iteration: u32,
    /// Set once the run has ended.
    pub terminal: Option<TerminalState>,
    /// Gate verdict of a completed run.
    pub verdict: Option<GateVerdict>,
    /// Latest pitch.
    pub pitch: Option<Pitch>,
    /// Failure that ended the run.
    pub error: Option<StageFailure>,
    /// When the run was registered.
    pub started_at: DateTime<Utc>,
    /// When the run ended.
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunStatus {
    /// Status of a freshly registered run.
    pub fn new(run_id: Uuid, customer_id: Uuid) -> Self {
        Self {
            run_id,
            customer_id,
            stage: Stage::Created,
            iteration: 0,
            terminal: None,
            verdict: None,
            pitch: None,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Whether the run has ended.
    pub fn is_terminal(&self) -> bool {
        self.terminal.is_some()
    }
}

/// Everything a finished run hands back to its caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Run id, shared by every message in the trail.
    pub correlation_id: Uuid,
    /// Customer the run was for.
    pub customer_id: Uuid,
    /// How the run ended.
    pub terminal: TerminalState,
    /// Gate verdict of a completed run.
    pub verdict: Option<GateVerdict>,
    /// Refinements performed.
    pub iterations: u32,
    /// Final pitch, or the best partial result for failed/cancelled runs.
    pub pitch: Option<Pitch>,
    /// Every message recorded for the run, in order.
    pub trail: Vec<A2AMessage>,
    /// Failure that ended the run.
    pub error: Option<StageFailure>,
}

impl RunOutcome {
    /// Whether the run ended `Completed`.
    pub fn is_completed(&self) -> bool {
        self.terminal == TerminalState::Completed
    }

    /// Collapse into the plain `(pitch, trail)` contract, turning any
    /// non-completed run into its error.
    pub fn into_result(self) -> PitchResult<(Pitch, Vec<A2AMessage>)> {
        match (self.terminal, self.pitch, self.error) {
            (TerminalState::Completed, Some(pitch), _) => Ok((pitch, self.trail)),
            (_, _, Some(failure)) => Err(failure.into_error()),
            (TerminalState::Cancelled, _, None) => Err(PitchError::Cancelled),
            (_, _, None) => Err(PitchError::InvalidResponse(
                "run finished without a pitch".to_string(),
            )),
        }
    }
}

impl StageFailure {
    /// Rebuild an error of the same kind from this failure.
    pub fn into_error(self) -> PitchError {
        let msg = format!("{}: {}", self.stage, self.message);
        match self.kind {
            ErrorKind::NotFound => PitchError::NotFound(msg),
            ErrorKind::Timeout => PitchError::Timeout(msg),
            ErrorKind::ProviderUnavailable => PitchError::ProviderUnavailable(msg),
            ErrorKind::InvalidResponse => PitchError::InvalidResponse(msg),
            ErrorKind::InputInvalid => PitchError::InputInvalid(msg),
            ErrorKind::Cancelled => PitchError::Cancelled,
            ErrorKind::DeadlineExceeded => PitchError::DeadlineExceeded(msg),
            ErrorKind::Internal => PitchError::Storage(msg),
        }
    }
}
