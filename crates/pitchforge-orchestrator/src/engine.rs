use crate::config::OrchestratorConfig;
use crate::gate::{self, BestPitch, GateDecision};
use crate::progress::{ProgressEvent, ProgressNotifier};
use crate::runs::{CancelToken, RunTable};
use chrono::Utc;
use pitchforge_agent::{AgentContext, AgentRoster, Feedback, GenerationRequest};
use pitchforge_core::{
    A2AMessage, AgentKind, CustomerProfile, Draft, GateVerdict, Pitch, PitchError, PitchResult,
    PitchStatus, Recommendations, RunConfig, RunOutcome, RunStatus, Score, Stage, StageFailure,
    TerminalState,
};
use pitchforge_store::{CustomerRepository, PitchRepository, TrailRecorder};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Drives pitch runs through the pipeline.
///
/// Shared state is limited to the injected roster and repositories, the trail
/// recorder, the progress notifier and the run table; everything else lives
/// in the per-run [`PipelineRun`], so runs never observe each other.
pub struct Orchestrator {
    roster: Arc<AgentRoster>,
    customers: Arc<dyn CustomerRepository>,
    pitches: Arc<dyn PitchRepository>,
    trail: Arc<TrailRecorder>,
    progress: Arc<ProgressNotifier>,
    config: OrchestratorConfig,
    runs: RunTable,
}

impl Orchestrator {
    /// Orchestrator over the given agents and stores.
    pub fn new(
        roster: Arc<AgentRoster>,
        customers: Arc<dyn CustomerRepository>,
        pitches: Arc<dyn PitchRepository>,
        trail: Arc<TrailRecorder>,
        progress: Arc<ProgressNotifier>,
        config: OrchestratorConfig,
    ) -> Self {
        let runs = RunTable::new(config.retained_runs);
        Self {
            roster,
            customers,
            pitches,
            trail,
            progress,
            config,
            runs,
        }
    }

    /// Settings the orchestrator was built with.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Trail recorder shared by every run.
    pub fn trail(&self) -> &Arc<TrailRecorder> {
        &self.trail
    }

    /// Progress notifier shared by every run.
    pub fn progress(&self) -> &Arc<ProgressNotifier> {
        &self.progress
    }

    /// Pitch store finalized pitches are saved to.
    pub fn pitches(&self) -> &Arc<dyn PitchRepository> {
        &self.pitches
    }

    /// Run the pipeline for `customer_id` to completion.
    pub async fn run(&self, customer_id: Uuid, config: RunConfig) -> RunOutcome {
        let (run_id, cancel, _) = self.register(customer_id);
        self.execute(run_id, customer_id, config, cancel).await
    }

    /// Start a run in the background and return its id right away.
    pub fn start(self: &Arc<Self>, customer_id: Uuid, config: RunConfig) -> Uuid {
        self.start_and_subscribe(customer_id, config).0
    }

    /// Like [`start`](Self::start), with a progress subscription taken before
    /// the run emits anything.
    pub fn start_and_subscribe(
        self: &Arc<Self>,
        customer_id: Uuid,
        config: RunConfig,
    ) -> (Uuid, broadcast::Receiver<ProgressEvent>) {
        let (run_id, cancel, rx) = self.register(customer_id);
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.execute(run_id, customer_id, config, cancel).await;
        });
        (run_id, rx)
    }

    /// Current status of a run. Frozen once the run has ended.
    pub fn status(&self, run_id: Uuid) -> PitchResult<RunStatus> {
        self.runs.status(run_id)
    }

    /// Ask a run to stop. It ends `Cancelled` at its next checkpoint.
    pub fn cancel(&self, run_id: Uuid) -> PitchResult<()> {
        info!(correlation_id = %run_id, "Cancellation requested");
        self.runs.cancel(run_id)
    }

    /// Wait for a run to end. The outcome is available once its trail has been flushed.
    pub async fn wait(&self, run_id: Uuid) -> PitchResult<RunOutcome> {
        self.runs.wait(run_id).await
    }

    /// Status of every tracked run.
    pub fn runs(&self) -> Vec<RunStatus> {
        self.runs.list()
    }

    fn register(&self, customer_id: Uuid) -> (Uuid, CancelToken, broadcast::Receiver<ProgressEvent>) {
        let run_id = Uuid::new_v4();
        let rx = self.progress.open(run_id);
        let cancel = self.runs.register(RunStatus::new(run_id, customer_id));
        (run_id, cancel, rx)
    }

    async fn execute(
        &self,
        run_id: Uuid,
        customer_id: Uuid,
        config: RunConfig,
        cancel: CancelToken,
    ) -> RunOutcome {
        let started = std::time::Instant::now();
        info!(
            correlation_id = %run_id,
            customer_id = %customer_id,
            threshold = config.score_threshold,
            max_iterations = config.max_iterations,
            "Run started"
        );

        let mut run = PipelineRun::new(self, run_id, customer_id, config, cancel);
        let ending = match run.pipeline().await {
            Ok(ending) => ending,
            Err(Halt::Failed(stage, e)) => Ending::Fail(StageFailure::new(stage, &e)),
            Err(Halt::Cancelled) => Ending::Cancelled,
            Err(Halt::Deadline) => Ending::Deadline,
        };
        let outcome = run.finish(ending).await;

        info!(
            correlation_id = %run_id,
            terminal = ?outcome.terminal,
            iterations = outcome.iterations,
            duration_ms = started.elapsed().as_millis() as u64,
            "Run finished"
        );
        for forgotten in self.runs.complete(outcome.clone()) {
            self.trail.evict(forgotten);
        }
        outcome
    }
}

/// Why the pipeline stopped before reaching the gate's verdict.
enum Halt {
    Failed(Stage, PitchError),
    Cancelled,
    Deadline,
}

/// How a run ends.
enum Ending {
    Finalize { pitch: Pitch, verdict: GateVerdict },
    /// Score or refine gave up; finalize the last scored pitch as a failure.
    FinalizeFailed { pitch: Pitch, failure: StageFailure },
    Fail(StageFailure),
    Cancelled,
    Deadline,
}

/// State of one run. Owned by the task driving it.
struct PipelineRun<'a> {
    orch: &'a Orchestrator,
    run_id: Uuid,
    customer_id: Uuid,
    config: RunConfig,
    cancel: CancelToken,
    deadline: Instant,
    request: A2AMessage,
    stage: Stage,
    iteration: u32,
    best: BestPitch,
    last_scored: Option<Pitch>,
    latest: Option<Pitch>,
}

impl<'a> PipelineRun<'a> {
    fn new(
        orch: &'a Orchestrator,
        run_id: Uuid,
        customer_id: Uuid,
        config: RunConfig,
        cancel: CancelToken,
    ) -> Self {
        let request = orch.trail.record(A2AMessage::request(
            run_id,
            json!({ "customer_id": customer_id, "config": config }),
        ));
        orch.progress.publish(ProgressEvent::new(
            run_id,
            Stage::Created,
            0,
            "Run created",
        ));
        Self {
            orch,
            run_id,
            customer_id,
            config,
            cancel,
            deadline: Instant::now() + orch.config.run_deadline(),
            request,
            stage: Stage::Created,
            iteration: 0,
            best: BestPitch::default(),
            last_scored: None,
            latest: None,
        }
    }

    async fn pipeline(&mut self) -> Result<Ending, Halt> {
        let orch = self.orch;
        let roster = orch.roster.as_ref();
        let threshold = self.config.score_threshold;

        self.config
            .validate()
            .map_err(|e| Halt::Failed(Stage::Created, e))?;
        self.checkpoint()?;
        let seed = orch
            .customers
            .get(self.customer_id)
            .await
            .map_err(|e| Halt::Failed(Stage::Created, e))?;
        self.checkpoint()?;

        // Research
        self.enter(Stage::Researching, format!("Researching {}", seed.company));
        let seed = &seed;
        let profile: CustomerProfile = self
            .call(
                AgentKind::Research,
                json!({ "customer_id": seed.id, "company": seed.company }),
                0,
                |ctx| async move { roster.research.research(&ctx, seed).await },
                |p: &CustomerProfile| {
                    json!({
                        "company": p.company,
                        "pain_points": p.pain_points,
                        "talking_points": p.talking_points.len(),
                    })
                },
            )
            .await?;
        let profile = &profile;

        let recommendations = if self.config.include_strategy {
            let result = self
                .call(
                    AgentKind::Strategist,
                    json!({ "operation": "strategize", "company": profile.company }),
                    0,
                    |ctx| async move { roster.strategist.strategize(&ctx, profile).await },
                    |r: &Recommendations| json!({ "strategy": r.strategy, "channels": r.channels }),
                )
                .await;
            match result {
                Ok(r) => Some(r),
                Err(Halt::Failed(_, e)) => {
                    warn!(
                        correlation_id = %self.run_id,
                        error = %e,
                        "Strategy recommendations unavailable, generating without them"
                    );
                    None
                }
                Err(halt) => return Err(halt),
            }
        } else {
            None
        };

        // Generate
        self.checkpoint()?;
        self.enter(Stage::Generating, "Generating first draft");
        let request = GenerationRequest::from_config(&self.config, recommendations);
        let request = &request;
        let draft = self
            .call(
                AgentKind::Generator,
                json!({
                    "tone": request.tone,
                    "pitch_type": request.pitch_type,
                    "template": request.template,
                }),
                0,
                |ctx| async move { roster.generator.generate(&ctx, profile, request).await },
                draft_summary,
            )
            .await?;
        let mut pitch = Pitch::initial(
            self.customer_id,
            draft,
            self.config.pitch_type,
            self.config.tone,
        )
        .with_generated_by(AgentKind::Generator.display_name())
        .with_campaign(self.config.campaign_id)
        .with_language(self.config.language.clone());
        self.track(&pitch).await;

        let retries = orch.config.stage_retries;
        loop {
            // Score
            self.checkpoint()?;
            self.enter(Stage::Scoring, format!("Scoring version {}", pitch.version));
            let current = &pitch;
            let result = self
                .call(
                    AgentKind::Scorer,
                    json!({ "pitch_id": current.id, "version": current.version }),
                    retries,
                    |ctx| async move { roster.scorer.score(&ctx, profile, current).await },
                    |s: &Score| json!({ "overall": s.overall(), "dimensions": s.dimensions() }),
                )
                .await;
            let score = match result {
                Ok(score) => score.reweighted(orch.config.score_weights),
                Err(Halt::Failed(stage, e)) => return Ok(self.finalize_early(stage, e)),
                Err(halt) => return Err(halt),
            };
            pitch.set_score(score.clone());
            self.best.observe(&pitch);
            self.last_scored = Some(pitch.clone());
            self.track(&pitch).await;
            info!(
                correlation_id = %self.run_id,
                version = pitch.version,
                overall = score.overall(),
                threshold,
                "Pitch scored"
            );

            match gate::decide(&score, threshold, self.iteration, self.config.max_iterations) {
                GateDecision::Pass => {
                    return Ok(Ending::Finalize {
                        pitch,
                        verdict: GateVerdict::Passed,
                    })
                }
                GateDecision::Exhausted => {
                    let best = self.best.get().cloned().unwrap_or(pitch);
                    return Ok(Ending::Finalize {
                        pitch: best,
                        verdict: GateVerdict::Exhausted,
                    });
                }
                GateDecision::Refine => {}
            }

            // Refine
            self.checkpoint()?;
            self.iteration += 1;
            self.enter(
                Stage::Refining,
                format!(
                    "Refining (iteration {}/{})",
                    self.iteration, self.config.max_iterations
                ),
            );
            let feedback = Feedback::from_score(&score, threshold);
            let feedback = &feedback;
            let current = &pitch;
            let result = self
                .call(
                    AgentKind::Refiner,
                    json!({
                        "pitch_id": current.id,
                        "version": current.version,
                        "iteration": self.iteration,
                        "feedback": feedback.brief,
                    }),
                    retries,
                    |ctx| async move {
                        roster.refiner.refine(&ctx, profile, current, feedback).await
                    },
                    draft_summary,
                )
                .await;
            let draft = match result {
                Ok(draft) => draft,
                Err(Halt::Failed(stage, e)) => return Ok(self.finalize_early(stage, e)),
                Err(halt) => return Err(halt),
            };
            pitch = pitch
                .refine_into(draft, feedback.brief.clone())
                .with_generated_by(AgentKind::Refiner.display_name());
            self.track(&pitch).await;
        }
    }

    /// One delegated agent call with its trail messages, the stage deadline
    /// and up to `retries` extra attempts on transient failures.
    async fn call<T, F, Fut, S>(
        &self,
        agent: AgentKind,
        payload: Value,
        retries: u32,
        op: F,
        summarize: S,
    ) -> Result<T, Halt>
    where
        F: Fn(AgentContext) -> Fut,
        Fut: Future<Output = PitchResult<T>>,
        S: Fn(&T) -> Value,
    {
        let stage = self.stage;
        let timeout = self.orch.config.timeouts.for_stage(stage);
        let mut attempt = 0;

        loop {
            self.checkpoint()?;
            let call_deadline = (Instant::now() + timeout).min(self.deadline);
            let delegate = self.orch.trail.record(A2AMessage::delegate(
                self.run_id,
                agent,
                with_field(payload.clone(), "attempt", json!(attempt)),
            ));
            let ctx = AgentContext::new(self.run_id, stage, call_deadline).with_attempt(attempt);

            let result = match tokio::time::timeout_at(call_deadline, op(ctx)).await {
                Ok(result) => result,
                Err(_) => Err(PitchError::Timeout(format!(
                    "{} did not answer within {}ms",
                    agent.display_name(),
                    timeout.as_millis()
                ))),
            };

            match result {
                Ok(value) => {
                    self.orch.trail.record(delegate.reply(summarize(&value)));
                    if self.cancel.is_cancelled() {
                        return Err(Halt::Cancelled);
                    }
                    return Ok(value);
                }
                Err(e) => {
                    self.orch.trail.record(delegate.fail(json!({
                        "kind": e.kind(),
                        "message": e.to_string(),
                        "attempt": attempt,
                    })));
                    self.checkpoint()?;
                    if !e.is_transient() || attempt >= retries {
                        return Err(Halt::Failed(stage, e));
                    }
                    attempt += 1;
                    warn!(
                        correlation_id = %self.run_id,
                        agent = %agent,
                        stage = %stage,
                        attempt,
                        error = %e,
                        "Agent call failed, retrying"
                    );
                    self.publish(format!(
                        "Retrying {} (attempt {}/{})",
                        agent.display_name(),
                        attempt + 1,
                        retries + 1
                    ));
                    let resume = (Instant::now() + self.orch.config.retry_delay()).min(self.deadline);
                    tokio::time::sleep_until(resume).await;
                }
            }
        }
    }

    /// Cancellation wins over the deadline when both apply.
    fn checkpoint(&self) -> Result<(), Halt> {
        if self.cancel.is_cancelled() {
            return Err(Halt::Cancelled);
        }
        if Instant::now() >= self.deadline {
            return Err(Halt::Deadline);
        }
        Ok(())
    }

    fn enter(&mut self, stage: Stage, message: impl Into<String>) {
        if !self.stage.can_transition_to(stage) {
            warn!(
                correlation_id = %self.run_id,
                from = %self.stage,
                to = %stage,
                "Unexpected stage transition"
            );
        }
        self.stage = stage;
        let iteration = self.iteration;
        self.orch.runs.update(self.run_id, |s| {
            s.stage = stage;
            s.iteration = iteration;
        });
        info!(
            correlation_id = %self.run_id,
            stage = %stage,
            iteration,
            "Stage started"
        );
        self.publish(message);
    }

    fn publish(&self, message: impl Into<String>) {
        self.orch.progress.publish(ProgressEvent::new(
            self.run_id,
            self.stage,
            self.iteration,
            message,
        ));
    }

    /// Persist a new or updated pitch and expose it in the run status.
    async fn track(&mut self, pitch: &Pitch) {
        self.save(pitch).await;
        self.latest = Some(pitch.clone());
        let snapshot = pitch.clone();
        self.orch
            .runs
            .update(self.run_id, move |s| s.pitch = Some(snapshot));
    }

    async fn save(&self, pitch: &Pitch) {
        if let Err(e) = self.orch.pitches.save(pitch).await {
            warn!(
                correlation_id = %self.run_id,
                pitch_id = %pitch.id,
                version = pitch.version,
                error = %e,
                "Failed to save pitch"
            );
        }
    }

    fn finalize_early(&self, stage: Stage, e: PitchError) -> Ending {
        let failure = StageFailure::new(stage, &e);
        match self.last_scored.clone() {
            Some(pitch) => Ending::FinalizeFailed { pitch, failure },
            None => Ending::Fail(failure),
        }
    }

    async fn finish(&mut self, ending: Ending) -> RunOutcome {
        let (terminal, verdict, pitch, failure, finalized) = match ending {
            Ending::Finalize { mut pitch, verdict } => {
                self.enter(Stage::Finalizing, "Finalizing pitch");
                pitch.set_status(PitchStatus::ApprovedCandidate);
                self.save(&pitch).await;
                (TerminalState::Completed, Some(verdict), Some(pitch), None, true)
            }
            Ending::FinalizeFailed { pitch, failure } => {
                self.enter(Stage::Finalizing, "Finalizing last scored pitch");
                (TerminalState::Failed, None, Some(pitch), Some(failure), true)
            }
            Ending::Fail(failure) => (
                TerminalState::Failed,
                None,
                self.best.get().cloned(),
                Some(failure),
                false,
            ),
            Ending::Cancelled => (
                TerminalState::Cancelled,
                None,
                self.best.get().cloned().or_else(|| self.latest.clone()),
                Some(StageFailure::new(self.stage, &PitchError::Cancelled)),
                false,
            ),
            Ending::Deadline => {
                let e = PitchError::DeadlineExceeded(format!(
                    "run exceeded {}ms",
                    self.orch.config.run_deadline_ms
                ));
                (
                    TerminalState::Failed,
                    None,
                    self.best.get().cloned(),
                    Some(StageFailure::new(self.stage, &e)),
                    false,
                )
            }
        };

        let mut payload = json!({
            "terminal": terminal,
            "finalized": finalized,
            "iterations": self.iteration,
            "verdict": verdict,
        });
        if let Some(p) = &pitch {
            payload["pitch_id"] = json!(p.id);
            payload["version"] = json!(p.version);
            payload["overall"] = json!(p.overall_score());
        }
        if let Some(f) = &failure {
            payload["error"] = json!(f);
        }
        let closing = match terminal {
            TerminalState::Completed => self.request.reply(payload),
            _ => self.request.fail(payload),
        };
        self.orch.trail.record(closing);

        let stage: Stage = terminal.into();
        let iteration = self.iteration;
        {
            let pitch = pitch.clone();
            let failure = failure.clone();
            self.orch.runs.update(self.run_id, move |s| {
                s.stage = stage;
                s.iteration = iteration;
                s.terminal = Some(terminal);
                s.verdict = verdict;
                s.pitch = pitch;
                s.error = failure;
                s.finished_at = Some(Utc::now());
            });
        }
        self.stage = stage;

        match (&failure, terminal) {
            (Some(f), TerminalState::Failed) => error!(
                correlation_id = %self.run_id,
                stage = %f.stage,
                kind = %f.kind,
                error = %f.message,
                "Run failed"
            ),
            (_, TerminalState::Cancelled) => info!(correlation_id = %self.run_id, "Run cancelled"),
            _ => info!(
                correlation_id = %self.run_id,
                verdict = ?verdict,
                version = pitch.as_ref().map(|p| p.version),
                "Run completed"
            ),
        }
        self.publish(match &failure {
            Some(f) => format!("Run {stage}: {}", f.kind),
            None => format!("Run {stage}"),
        });
        self.orch.progress.close(self.run_id);
        self.orch.trail.flush().await;
        let trail = self.orch.trail.snapshot(self.run_id);
        if self.orch.trail.is_durable() {
            self.orch.trail.evict(self.run_id);
        }

        RunOutcome {
            correlation_id: self.run_id,
            customer_id: self.customer_id,
            terminal,
            verdict,
            iterations: self.iteration,
            pitch,
            trail,
            error: failure,
        }
    }
}

fn draft_summary(draft: &Draft) -> Value {
    json!({ "title": draft.title, "chars": draft.content.chars().count() })
}

fn with_field(mut payload: Value, key: &str, value: Value) -> Value {
    if let Value::Object(map) = &mut payload {
        map.insert(key.to_string(), value);
    }
    payload
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_with_field_extends_objects_only() {
        let v = with_field(json!({"a": 1}), "attempt", json!(2));
        assert_eq!(v, json!({"a": 1, "attempt": 2}));
        assert_eq!(with_field(json!(null), "attempt", json!(2)), json!(null));
    }

    #[test]
    fn test_draft_summary_counts_chars() {
        let summary = draft_summary(&Draft::new("Hola", "año"));
        assert_eq!(summary["chars"], 3);
        assert_eq!(summary["title"], "Hola");
    }
}
