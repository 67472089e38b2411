use crate::run::Stage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A convenience `Result` alias using [`PitchError`].
pub type PitchResult<T> = Result<T, PitchError>;

/// Top-level error type for the pitch pipeline.
///
/// The first seven variants form the taxonomy callers see on a run; the rest
/// are infrastructure failures raised by stores and configuration loading.
#[derive(Error, Debug)]
pub enum PitchError {
    /// A customer or pitch could not be resolved.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A stage deadline expired before the agent answered.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The model provider could not be reached or refused service.
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The model answered with unparseable or degenerate output.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Caller-supplied input is out of range or malformed.
    #[error("Invalid input: {0}")]
    InputInvalid(String),

    /// The caller cancelled the run.
    #[error("Cancelled")]
    Cancelled,

    /// The run-level deadline expired.
    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// A persistence backend failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration could not be parsed or validated.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Serializable classification of a [`PitchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`PitchError::NotFound`].
    NotFound,
    /// See [`PitchError::Timeout`].
    Timeout,
    /// See [`PitchError::ProviderUnavailable`].
    ProviderUnavailable,
    /// See [`PitchError::InvalidResponse`].
    InvalidResponse,
    /// See [`PitchError::InputInvalid`].
    InputInvalid,
    /// See [`PitchError::Cancelled`].
    Cancelled,
    /// See [`PitchError::DeadlineExceeded`].
    DeadlineExceeded,
    /// Storage, configuration and I/O failures.
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ProviderUnavailable => "provider_unavailable",
            ErrorKind::InvalidResponse => "invalid_response",
            ErrorKind::InputInvalid => "input_invalid",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::DeadlineExceeded => "deadline_exceeded",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

impl PitchError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PitchError::NotFound(_) => ErrorKind::NotFound,
            PitchError::Timeout(_) => ErrorKind::Timeout,
            PitchError::ProviderUnavailable(_) => ErrorKind::ProviderUnavailable,
            PitchError::InvalidResponse(_) => ErrorKind::InvalidResponse,
            PitchError::InputInvalid(_) => ErrorKind::InputInvalid,
            PitchError::Cancelled => ErrorKind::Cancelled,
            PitchError::DeadlineExceeded(_) => ErrorKind::DeadlineExceeded,
            PitchError::Storage(_) | PitchError::Config(_) | PitchError::Io(_) => {
                ErrorKind::Internal
            }
            PitchError::Json(_) => ErrorKind::InvalidResponse,
        }
    }

    /// Whether a stage-local retry may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PitchError::Timeout(_) | PitchError::ProviderUnavailable(_)
        )
    }
}

/// A failure with the stage it happened in. Cloneable so it can live in
/// run status snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    /// Stage the run was in when it failed.
    pub stage: Stage,
    /// Classification of the error.
    pub kind: ErrorKind,
    /// Rendered error message.
    pub message: String,
}

impl StageFailure {
    /// Capture `err` as it happened during `stage`.
    pub fn new(stage: Stage, err: &PitchError) -> Self {
        Self {
            stage,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for StageFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} during {}: {}", self.kind, self.stage, self.message)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(PitchError::Timeout("score".into()).is_transient());
        assert!(PitchError::ProviderUnavailable("503".into()).is_transient());
        assert!(!PitchError::InvalidResponse("garbage".into()).is_transient());
        assert!(!PitchError::NotFound("c-1".into()).is_transient());
        assert!(!PitchError::Cancelled.is_transient());
    }

    #[test]
    fn test_stage_failure_carries_context() {
        let err = PitchError::NotFound("customer 42".into());
        let failure = StageFailure::new(Stage::Researching, &err);
        assert_eq!(failure.kind, ErrorKind::NotFound);
        assert_eq!(failure.stage, Stage::Researching);
        assert!(failure.to_string().contains("researching"));
        assert!(failure.message.contains("customer 42"));
    }

    #[test]
    fn test_error_kind_serialization() {
        let json = serde_json::to_string(&ErrorKind::DeadlineExceeded).unwrap();
        assert_eq!(json, "\"deadline_exceeded\"");
    }
}
