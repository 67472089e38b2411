use async_trait::async_trait;
use pitchforge_core::{
    AgentKind, CustomerProfile, CustomerSeed, Draft, Pitch, PitchError, PitchResult, PitchType,
    Recommendations, RunConfig, Score, Stage, Tone,
};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

/// Per-call context handed to every capability invocation.
#[derive(Debug, Clone)]
pub struct AgentContext {
    /// Run the call belongs to.
    pub correlation_id: Uuid,
    /// Stage making the call.
    pub stage: Stage,
    /// Zero-based attempt number within the stage invocation.
    pub attempt: u32,
    /// The call must answer before this instant.
    pub deadline: Instant,
}

impl AgentContext {
    /// Context for the first attempt.
    pub fn new(correlation_id: Uuid, stage: Stage, deadline: Instant) -> Self {
        Self {
            correlation_id,
            stage,
            attempt: 0,
            deadline,
        }
    }

    /// Set the attempt number.
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> std::time::Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// What the generator needs besides the profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Voice of the pitch.
    pub tone: Tone,
    /// Kind of pitch.
    pub pitch_type: PitchType,
    /// Template to follow.
    pub template: Option<String>,
    /// Extra instructions from the caller.
    pub additional_context: Option<String>,
    /// Language code.
    pub language: String,
    /// Strategy advice gathered during research.
    pub recommendations: Option<Recommendations>,
}

impl GenerationRequest {
    /// Request built from the run config.
    pub fn from_config(config: &RunConfig, recommendations: Option<Recommendations>) -> Self {
        Self {
            tone: config.tone,
            pitch_type: config.pitch_type,
            template: config.template.clone(),
            additional_context: config.additional_context.clone(),
            language: config.language.clone(),
            recommendations,
        }
    }
}

/// Structured feedback handed to a refine call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    /// Score of the pitch being refined.
    pub score: Score,
    /// Human-readable brief built from the score and threshold.
    pub brief: String,
}

impl Feedback {
    /// Feedback naming the dimensions below `threshold`.
    pub fn from_score(score: &Score, threshold: f64) -> Self {
        Self {
            score: score.clone(),
            brief: score.refinement_brief(threshold),
        }
    }
}

/// The shared interface every agent implements.
///
/// An agent implements the subset of operations matching its role; the rest
/// fail with `InputInvalid`. Implementations must fail only with `Timeout`,
/// `ProviderUnavailable`, `InvalidResponse` or `InputInvalid`.
#[async_trait]
pub trait AgentCapability: Send + Sync {
    /// Role this agent plays.
    fn kind(&self) -> AgentKind;

    /// Build a profile for a customer.
    async fn research(
        &self,
        _ctx: &AgentContext,
        _customer: &CustomerSeed,
    ) -> PitchResult<CustomerProfile> {
        Err(unsupported(self.kind(), "research"))
    }

    /// Write a first draft.
    async fn generate(
        &self,
        _ctx: &AgentContext,
        _profile: &CustomerProfile,
        _request: &GenerationRequest,
    ) -> PitchResult<Draft> {
        Err(unsupported(self.kind(), "generate"))
    }

    /// Must populate all five dimensions of the returned score.
    async fn score(
        &self,
        _ctx: &AgentContext,
        _profile: &CustomerProfile,
        _pitch: &Pitch,
    ) -> PitchResult<Score> {
        Err(unsupported(self.kind(), "score"))
    }

    /// Must return content different from `pitch.content`.
    async fn refine(
        &self,
        _ctx: &AgentContext,
        _profile: &CustomerProfile,
        _pitch: &Pitch,
        _feedback: &Feedback,
    ) -> PitchResult<Draft> {
        Err(unsupported(self.kind(), "refine"))
    }

    /// Suggest a campaign strategy.
    async fn strategize(
        &self,
        _ctx: &AgentContext,
        _profile: &CustomerProfile,
    ) -> PitchResult<Recommendations> {
        Err(unsupported(self.kind(), "strategize"))
    }
}

fn unsupported(kind: AgentKind, op: &str) -> PitchError {
    PitchError::InputInvalid(format!("{kind} agent does not support {op}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    struct OnlyResearch;

    #[async_trait]
    impl AgentCapability for OnlyResearch {
        fn kind(&self) -> AgentKind {
            AgentKind::Research
        }

        async fn research(
            &self,
            _ctx: &AgentContext,
            customer: &CustomerSeed,
        ) -> PitchResult<CustomerProfile> {
            Ok(CustomerProfile::from_seed(customer))
        }
    }

    #[tokio::test]
    async fn test_unimplemented_operations_fail_input_invalid() {
        let agent = OnlyResearch;
        let ctx = AgentContext::new(Uuid::new_v4(), Stage::Scoring, Instant::now());
        let seed = CustomerSeed::new("a", "b", "c");
        let profile = agent.research(&ctx, &seed).await.unwrap();
        let err = agent.strategize(&ctx, &profile).await.unwrap_err();
        assert!(matches!(err, PitchError::InputInvalid(_)));
        assert!(err.to_string().contains("research agent does not support strategize"));
    }

    #[test]
    fn test_generation_request_from_config() {
        let config = RunConfig {
            tone: Tone::Consultative,
            template: Some("Hook / Value / Ask".into()),
            ..RunConfig::default()
        };
        let req = GenerationRequest::from_config(&config, None);
        assert_eq!(req.tone, Tone::Consultative);
        assert_eq!(req.template.as_deref(), Some("Hook / Value / Ask"));
        assert_eq!(req.language, "en");
    }
}
