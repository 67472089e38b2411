use crate::backends::{CompletionParams, CompletionRequest};
use crate::capability::{AgentCapability, AgentContext, Feedback, GenerationRequest};
use crate::llm::LlmClient;
use crate::parse;
use crate::profiles::{AgentProfile, AgentProfiles};
use crate::prompts;
use async_trait::async_trait;
use pitchforge_core::{
    AgentKind, CustomerProfile, CustomerSeed, Draft, Pitch, PitchError, PitchResult,
    Recommendations, Score, ScoreWeights, Stage,
};
use std::sync::Arc;
use tracing::debug;

/// Shared plumbing of the LLM-backed agents: one client, one profile.
struct LlmAgent {
    client: Arc<LlmClient>,
    profile: AgentProfile,
}

impl LlmAgent {
    fn new(client: Arc<LlmClient>, profile: AgentProfile) -> Self {
        Self { client, profile }
    }

    /// Send `prompt` and wait until `ctx.deadline` at most.
    async fn ask(&self, ctx: &AgentContext, prompt: String) -> PitchResult<String> {
        let request = CompletionRequest::new(prompt)
            .with_system(self.profile.system_prompt.clone())
            .with_params(CompletionParams {
                temperature: self.profile.temperature,
                max_tokens: self.profile.max_tokens,
            });

        debug!(
            correlation_id = %ctx.correlation_id,
            agent = %self.profile.kind,
            stage = %ctx.stage,
            attempt = ctx.attempt,
            "Calling model"
        );

        match tokio::time::timeout_at(ctx.deadline, self.client.complete(&request)).await {
            Ok(result) => result,
            Err(_) => Err(PitchError::Timeout(format!(
                "{} did not answer in time",
                self.profile.kind.display_name()
            ))),
        }
    }
}

/// Analyzes a customer seed into a profile.
pub struct ResearchAgent(LlmAgent);

impl ResearchAgent {
    /// Research agent using `profile`'s system prompt.
    pub fn new(client: Arc<LlmClient>, profile: AgentProfile) -> Self {
        Self(LlmAgent::new(client, profile))
    }
}

#[async_trait]
impl AgentCapability for ResearchAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Research
    }

    async fn research(
        &self,
        ctx: &AgentContext,
        customer: &CustomerSeed,
    ) -> PitchResult<CustomerProfile> {
        let text = self.0.ask(ctx, prompts::research_prompt(customer)).await?;
        parse::parse_research(&text, customer)
    }
}

/// Writes the first draft.
pub struct GeneratorAgent(LlmAgent);

impl GeneratorAgent {
    /// Generator using `profile`'s system prompt.
    pub fn new(client: Arc<LlmClient>, profile: AgentProfile) -> Self {
        Self(LlmAgent::new(client, profile))
    }
}

#[async_trait]
impl AgentCapability for GeneratorAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Generator
    }

    async fn generate(
        &self,
        ctx: &AgentContext,
        profile: &CustomerProfile,
        request: &GenerationRequest,
    ) -> PitchResult<Draft> {
        let text = self
            .0
            .ask(ctx, prompts::generation_prompt(profile, request))
            .await?;
        let mut draft = parse::parse_draft(&text, &format!("Pitch for {}", profile.company))?;
        draft
            .metadata
            .insert("tone".into(), serde_json::json!(request.tone));
        Ok(draft)
    }
}

/// Rates a pitch on the five dimensions.
pub struct ScoringAgent {
    inner: LlmAgent,
    weights: ScoreWeights,
}

impl ScoringAgent {
    /// Scorer whose overall score uses `weights`.
    pub fn new(client: Arc<LlmClient>, profile: AgentProfile, weights: ScoreWeights) -> Self {
        Self {
            inner: LlmAgent::new(client, profile),
            weights,
        }
    }
}

#[async_trait]
impl AgentCapability for ScoringAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Scorer
    }

    async fn score(
        &self,
        ctx: &AgentContext,
        profile: &CustomerProfile,
        pitch: &Pitch,
    ) -> PitchResult<Score> {
        let text = self
            .inner
            .ask(ctx, prompts::scoring_prompt(profile, pitch))
            .await?;
        parse::parse_score(&text, &self.weights)
    }
}

/// Rewrites a pitch against scorer feedback.
pub struct RefinerAgent(LlmAgent);

impl RefinerAgent {
    /// Refiner using `profile`'s system prompt.
    pub fn new(client: Arc<LlmClient>, profile: AgentProfile) -> Self {
        Self(LlmAgent::new(client, profile))
    }
}

#[async_trait]
impl AgentCapability for RefinerAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Refiner
    }

    async fn refine(
        &self,
        ctx: &AgentContext,
        profile: &CustomerProfile,
        pitch: &Pitch,
        feedback: &Feedback,
    ) -> PitchResult<Draft> {
        let text = self
            .0
            .ask(ctx, prompts::refinement_prompt(profile, pitch, feedback))
            .await?;
        let mut draft = parse::parse_draft(&text, &pitch.title)?;
        draft.ensure_differs(&pitch.content)?;
        draft
            .metadata
            .insert("refined_from".into(), serde_json::json!(pitch.id));
        Ok(draft)
    }
}

/// Suggests an outreach strategy for a researched customer.
pub struct StrategyAgent(LlmAgent);

impl StrategyAgent {
    /// Strategy agent using `profile`'s system prompt.
    pub fn new(client: Arc<LlmClient>, profile: AgentProfile) -> Self {
        Self(LlmAgent::new(client, profile))
    }
}

#[async_trait]
impl AgentCapability for StrategyAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Strategist
    }

    async fn strategize(
        &self,
        ctx: &AgentContext,
        profile: &CustomerProfile,
    ) -> PitchResult<Recommendations> {
        let text = self.0.ask(ctx, prompts::strategy_prompt(profile)).await?;
        parse::parse_recommendations(&text)
    }
}

/// The set of agents an orchestrator delegates to, one per role.
///
/// Built once at startup and shared by `Arc`; any role can be swapped for a
/// custom [`AgentCapability`].
#[derive(Clone)]
pub struct AgentRoster {
    /// Research stage.
    pub research: Arc<dyn AgentCapability>,
    /// First drafts.
    pub generator: Arc<dyn AgentCapability>,
    /// Scoring.
    pub scorer: Arc<dyn AgentCapability>,
    /// Refinement.
    pub refiner: Arc<dyn AgentCapability>,
    /// Optional recommendations during research.
    pub strategist: Arc<dyn AgentCapability>,
}

impl AgentRoster {
    /// LLM-backed roster sharing one client.
    pub fn from_llm(client: Arc<LlmClient>, profiles: &AgentProfiles, weights: ScoreWeights) -> Self {
        Self {
            research: Arc::new(ResearchAgent::new(
                client.clone(),
                profiles.get(AgentKind::Research),
            )),
            generator: Arc::new(GeneratorAgent::new(
                client.clone(),
                profiles.get(AgentKind::Generator),
            )),
            scorer: Arc::new(ScoringAgent::new(
                client.clone(),
                profiles.get(AgentKind::Scorer),
                weights,
            )),
            refiner: Arc::new(RefinerAgent::new(
                client.clone(),
                profiles.get(AgentKind::Refiner),
            )),
            strategist: Arc::new(StrategyAgent::new(client, profiles.get(AgentKind::Strategist))),
        }
    }

    /// The agent that handles `stage`, if any.
    pub fn for_stage(&self, stage: Stage) -> Option<&Arc<dyn AgentCapability>> {
        match stage {
            Stage::Researching => Some(&self.research),
            Stage::Generating => Some(&self.generator),
            Stage::Scoring => Some(&self.scorer),
            Stage::Refining => Some(&self.refiner),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::backends::LlmBackend;
    use pitchforge_core::{PitchType, Tone};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;
    use uuid::Uuid;

    /// Returns canned replies in order and records prompts.
    struct Canned {
        replies: Mutex<Vec<String>>,
        prompts: Arc<Mutex<Vec<CompletionRequest>>>,
        delay: Duration,
    }

    #[async_trait]
    impl LlmBackend for Canned {
        async fn complete(&self, request: &CompletionRequest) -> PitchResult<String> {
            self.prompts.lock().unwrap().push(request.clone());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                return Err(PitchError::ProviderUnavailable("no reply".into()));
            }
            Ok(replies.remove(0))
        }
    }

    fn client(replies: &[&str], delay: Duration) -> (Arc<LlmClient>, Arc<Mutex<Vec<CompletionRequest>>>) {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let backend = Canned {
            replies: Mutex::new(replies.iter().map(|s| s.to_string()).collect()),
            prompts: prompts.clone(),
            delay,
        };
        (Arc::new(LlmClient::from_backend(Box::new(backend))), prompts)
    }

    fn ctx(stage: Stage) -> AgentContext {
        AgentContext::new(Uuid::new_v4(), stage, Instant::now() + Duration::from_secs(5))
    }

    fn profile() -> CustomerProfile {
        CustomerProfile::from_seed(&CustomerSeed::new("Ada", "Acme", "retail"))
    }

    #[tokio::test]
    async fn test_generator_uses_profile_and_fallback_title() {
        let (client, prompts) = client(&["A plain pitch body."], Duration::ZERO);
        let roster = AgentRoster::from_llm(client, &AgentProfiles::default(), ScoreWeights::default());
        let draft = roster
            .generator
            .generate(&ctx(Stage::Generating), &profile(), &GenerationRequest::default())
            .await
            .unwrap();
        assert_eq!(draft.title, "Pitch for Acme");
        assert_eq!(draft.content, "A plain pitch body.");

        let sent = prompts.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].system_prompt.as_deref().unwrap().contains("copywriter"));
        assert_eq!(sent[0].params.temperature, Some(0.8));
    }

    #[tokio::test]
    async fn test_refiner_rejects_unchanged_content() {
        let (client, _) = client(&["TITLE: Same\nCONTENT:\nBody"], Duration::ZERO);
        let refiner = RefinerAgent::new(client, AgentProfiles::default().get(AgentKind::Refiner));
        let pitch = Pitch::initial(
            Uuid::new_v4(),
            Draft::new("Same", "Body"),
            PitchType::Initial,
            Tone::Professional,
        );
        let feedback = Feedback::from_score(&Score::uniform(0.2), 0.7);
        let err = refiner
            .refine(&ctx(Stage::Refining), &profile(), &pitch, &feedback)
            .await
            .unwrap_err();
        assert!(matches!(err, PitchError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_scorer_applies_weights() {
        let reply = r#"{"persuasiveness": 10, "clarity": 0, "relevance": 0,
                        "personalization": 0, "call_to_action": 0}"#;
        let (client, _) = client(&[reply], Duration::ZERO);
        let weights = ScoreWeights {
            persuasiveness: 4.0,
            ..ScoreWeights::default()
        };
        let scorer = ScoringAgent::new(client, AgentProfiles::default().get(AgentKind::Scorer), weights);
        let pitch = Pitch::initial(
            Uuid::new_v4(),
            Draft::new("T", "Body"),
            PitchType::Initial,
            Tone::Professional,
        );
        let score = scorer.score(&ctx(Stage::Scoring), &profile(), &pitch).await.unwrap();
        assert!((score.overall() - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_deadline_maps_to_timeout() {
        let (client, _) = client(&["late"], Duration::from_millis(200));
        let research = ResearchAgent::new(client, AgentProfiles::default().get(AgentKind::Research));
        let ctx = AgentContext::new(
            Uuid::new_v4(),
            Stage::Researching,
            Instant::now() + Duration::from_millis(20),
        );
        let seed = CustomerSeed::new("Ada", "Acme", "retail");
        let err = research.research(&ctx, &seed).await.unwrap_err();
        assert!(matches!(err, PitchError::Timeout(_)), "got {err}");
    }

    #[test]
    fn test_roster_stage_mapping() {
        let (client, _) = client(&[], Duration::ZERO);
        let roster = AgentRoster::from_llm(client, &AgentProfiles::default(), ScoreWeights::default());
        assert_eq!(roster.for_stage(Stage::Scoring).unwrap().kind(), AgentKind::Scorer);
        assert_eq!(roster.for_stage(Stage::Refining).unwrap().kind(), AgentKind::Refiner);
        assert!(roster.for_stage(Stage::Finalizing).is_none());
    }
}
