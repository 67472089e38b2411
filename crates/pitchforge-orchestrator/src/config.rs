use pitchforge_core::{ScoreWeights, Stage};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-stage call deadlines, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTimeouts {
    /// Research call.
    #[serde(default = "default_research_ms")]
    pub research_ms: u64,
    /// Generation call.
    #[serde(default = "default_generate_ms")]
    pub generate_ms: u64,
    /// One scoring attempt.
    #[serde(default = "default_score_ms")]
    pub score_ms: u64,
    /// One refinement attempt.
    #[serde(default = "default_refine_ms")]
    pub refine_ms: u64,
}

fn default_research_ms() -> u64 {
    60_000
}

fn default_generate_ms() -> u64 {
    120_000
}

fn default_score_ms() -> u64 {
    20_000
}

fn default_refine_ms() -> u64 {
    120_000
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            research_ms: default_research_ms(),
            generate_ms: default_generate_ms(),
            score_ms: default_score_ms(),
            refine_ms: default_refine_ms(),
        }
    }
}

impl StageTimeouts {
    /// Same deadline for every stage.
    pub fn uniform(timeout: Duration) -> Self {
        let ms = timeout.as_millis() as u64;
        Self {
            research_ms: ms,
            generate_ms: ms,
            score_ms: ms,
            refine_ms: ms,
        }
    }

    /// Deadline for one agent call made during `stage`. Stages without agent
    /// calls get the research deadline.
    pub fn for_stage(&self, stage: Stage) -> Duration {
        let ms = match stage {
            Stage::Generating => self.generate_ms,
            Stage::Scoring => self.score_ms,
            Stage::Refining => self.refine_ms,
            _ => self.research_ms,
        };
        Duration::from_millis(ms)
    }
}

/// Process-wide orchestrator settings, built once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Per-stage call deadlines.
    #[serde(default)]
    pub timeouts: StageTimeouts,
    /// Wall-clock bound on a whole run.
    #[serde(default = "default_run_deadline_ms")]
    pub run_deadline_ms: u64,
    /// Extra attempts for a transient Score or Refine failure.
    #[serde(default = "default_stage_retries")]
    pub stage_retries: u32,
    /// Pause between those attempts, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Progress events buffered per run before the oldest is dropped.
    #[serde(default = "default_progress_buffer")]
    pub progress_buffer: usize,
    /// Dimension weights for the overall score.
    #[serde(default)]
    pub score_weights: ScoreWeights,
    /// Finished runs kept for `status` and `wait` before the oldest are
    /// forgotten.
    #[serde(default = "default_retained_runs")]
    pub retained_runs: usize,
}

fn default_run_deadline_ms() -> u64 {
    600_000
}

fn default_stage_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    250
}

fn default_progress_buffer() -> usize {
    64
}

fn default_retained_runs() -> usize {
    256
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            timeouts: StageTimeouts::default(),
            run_deadline_ms: default_run_deadline_ms(),
            stage_retries: default_stage_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            progress_buffer: default_progress_buffer(),
            score_weights: ScoreWeights::default(),
            retained_runs: default_retained_runs(),
        }
    }
}

impl OrchestratorConfig {
    /// Set the stage deadlines.
    pub fn with_timeouts(mut self, timeouts: StageTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set the run deadline.
    pub fn with_run_deadline(mut self, deadline: Duration) -> Self {
        self.run_deadline_ms = deadline.as_millis() as u64;
        self
    }

    /// Set the transient retry count.
    pub fn with_stage_retries(mut self, retries: u32) -> Self {
        self.stage_retries = retries;
        self
    }

    /// Set the pause between retries.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set how many finished runs are kept.
    pub fn with_retained_runs(mut self, retained: usize) -> Self {
        self.retained_runs = retained;
        self
    }

    /// Run deadline as a `Duration`.
    pub fn run_deadline(&self) -> Duration {
        Duration::from_millis(self.run_deadline_ms)
    }

    /// Retry pause as a `Duration`.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.timeouts.for_stage(Stage::Researching), Duration::from_secs(60));
        assert_eq!(config.timeouts.for_stage(Stage::Generating), Duration::from_secs(120));
        assert_eq!(config.timeouts.for_stage(Stage::Scoring), Duration::from_secs(20));
        assert_eq!(config.timeouts.for_stage(Stage::Refining), Duration::from_secs(120));
        assert_eq!(config.run_deadline(), Duration::from_secs(600));
        assert_eq!(config.stage_retries, 2);
        assert_eq!(config.retry_delay(), Duration::from_millis(250));
        assert_eq!(config.progress_buffer, 64);
        assert_eq!(config.retained_runs, 256);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: OrchestratorConfig = toml::from_str(
            r#"
            stage_retries = 1

            [timeouts]
            score_ms = 5000

            [score_weights]
            call_to_action = 2.0
            "#,
        )
        .unwrap();
        assert_eq!(config.stage_retries, 1);
        assert_eq!(config.timeouts.score_ms, 5000);
        assert_eq!(config.timeouts.generate_ms, 120_000);
        assert_eq!(config.score_weights.call_to_action, 2.0);
        assert_eq!(config.score_weights.clarity, 1.0);
        assert_eq!(config.run_deadline_ms, 600_000);
    }
}
