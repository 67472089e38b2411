use async_trait::async_trait;
use parking_lot::Mutex;
use pitchforge_core::{
    A2AMessage, AgentKind, MessageType, PitchError, PitchResult, Stage, TerminalState,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// TrailStore trait
// ---------------------------------------------------------------------------

/// Durable backing store for message trails.
#[async_trait]
pub trait TrailStore: Send + Sync {
    /// Persist one message at the end of its run's trail.
    async fn append(&self, message: &A2AMessage) -> PitchResult<()>;
    /// Messages for `correlation_id`, ordered by sequence.
    async fn read(&self, correlation_id: Uuid) -> PitchResult<Vec<A2AMessage>>;
}

// ---------------------------------------------------------------------------
// FileTrailStore
// ---------------------------------------------------------------------------

/// One JSONL file per correlation id.
pub struct FileTrailStore {
    dir: PathBuf,
}

impl FileTrailStore {
    /// Store under `dir`, created if missing.
    pub async fn new(dir: PathBuf) -> PitchResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn trail_path(&self, correlation_id: Uuid) -> PathBuf {
        self.dir.join(format!("{correlation_id}.trail.jsonl"))
    }
}

#[async_trait]
impl TrailStore for FileTrailStore {
    async fn append(&self, message: &A2AMessage) -> PitchResult<()> {
        let path = self.trail_path(message.correlation_id);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        let mut line = serde_json::to_string(message)?;
        line.push('\n');
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn read(&self, correlation_id: Uuid) -> PitchResult<Vec<A2AMessage>> {
        let path = self.trail_path(correlation_id);
        if !tokio::fs::try_exists(&path).await? {
            return Ok(Vec::new());
        }
        let data = tokio::fs::read_to_string(&path).await?;
        let mut messages: Vec<A2AMessage> = data
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(serde_json::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        messages.sort_by_key(|m| m.sequence);
        // A retried write may have landed twice.
        messages.dedup_by_key(|m| m.id);
        Ok(messages)
    }
}

// ---------------------------------------------------------------------------
// MemoryTrailStore
// ---------------------------------------------------------------------------

/// In-memory trail store, mostly for tests.
#[derive(Default)]
pub struct MemoryTrailStore {
    trails: Mutex<HashMap<Uuid, Vec<A2AMessage>>>,
}

impl MemoryTrailStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TrailStore for MemoryTrailStore {
    async fn append(&self, message: &A2AMessage) -> PitchResult<()> {
        self.trails
            .lock()
            .entry(message.correlation_id)
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn read(&self, correlation_id: Uuid) -> PitchResult<Vec<A2AMessage>> {
        let mut messages = self
            .trails
            .lock()
            .get(&correlation_id)
            .cloned()
            .unwrap_or_default();
        messages.sort_by_key(|m| m.sequence);
        Ok(messages)
    }
}

// ---------------------------------------------------------------------------
// TrailRecorder
// ---------------------------------------------------------------------------

/// Retry schedule for background trail writes.
#[derive(Debug, Clone, Copy)]
pub struct PersistRetry {
    /// Writes tried per message before it is dropped.
    pub max_attempts: u32,
    /// Delay before the first retry. Doubles on each attempt.
    pub base_delay: Duration,
    /// Cap on the retry delay.
    pub max_delay: Duration,
}

impl Default for PersistRetry {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl PersistRetry {
    fn delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay)
    }
}

enum Command {
    Append(A2AMessage),
    Flush(oneshot::Sender<()>),
}

/// Append-only, per-correlation log of every A2A message.
///
/// `record` is synchronous and never fails: the message lands in memory
/// immediately and, when a [`TrailStore`] is attached, is queued for a
/// background writer that retries failed writes with backoff. A run never
/// waits on persistence.
pub struct TrailRecorder {
    trails: Mutex<HashMap<Uuid, Vec<A2AMessage>>>,
    tx: Option<mpsc::UnboundedSender<Command>>,
    store: Option<Arc<dyn TrailStore>>,
}

impl TrailRecorder {
    /// Recorder that keeps trails in memory only.
    pub fn in_memory() -> Self {
        Self {
            trails: Mutex::new(HashMap::new()),
            tx: None,
            store: None,
        }
    }

    /// Recorder backed by `store`. Spawns the background writer, so it must
    /// be called from within a tokio runtime.
    pub fn with_store(store: Arc<dyn TrailStore>, retry: PersistRetry) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Command>();
        let writer = store.clone();

        tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                match cmd {
                    Command::Append(msg) => persist(writer.as_ref(), &msg, retry).await,
                    Command::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
        });

        Self {
            trails: Mutex::new(HashMap::new()),
            tx: Some(tx),
            store: Some(store),
        }
    }

    /// Append `message` to its trail, assigning the next sequence number.
    /// Returns the message as stored.
    pub fn record(&self, mut message: A2AMessage) -> A2AMessage {
        {
            let mut trails = self.trails.lock();
            let trail = trails.entry(message.correlation_id).or_default();
            message.sequence = trail.len() as u64 + 1;
            if let Some(last) = trail.last() {
                if message.created_at < last.created_at {
                    message.created_at = last.created_at;
                }
            }
            trail.push(message.clone());
        }

        debug!(
            correlation_id = %message.correlation_id,
            sequence = message.sequence,
            from = %message.from,
            to = %message.to,
            message_type = ?message.message_type,
            "a2a"
        );

        if let Some(tx) = &self.tx {
            if tx.send(Command::Append(message.clone())).is_err() {
                warn!(
                    correlation_id = %message.correlation_id,
                    "Trail writer stopped, message kept in memory only"
                );
            }
        }
        message
    }

    /// In-memory trail for `correlation_id`, in recording order.
    pub fn snapshot(&self, correlation_id: Uuid) -> Vec<A2AMessage> {
        self.trails
            .lock()
            .get(&correlation_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Ordered trail for `correlation_id`, falling back to the durable store
    /// for runs no longer held in memory.
    pub async fn fetch(&self, correlation_id: Uuid) -> PitchResult<Vec<A2AMessage>> {
        let in_memory = self.snapshot(correlation_id);
        if !in_memory.is_empty() {
            return Ok(in_memory);
        }
        match &self.store {
            Some(store) => store.read(correlation_id).await,
            None => Ok(Vec::new()),
        }
    }

    /// Whether recorded messages also go to a durable store.
    pub fn is_durable(&self) -> bool {
        self.store.is_some()
    }

    /// Drop the in-memory copy of a finished run's trail. With a durable
    /// store attached, [`fetch`](Self::fetch) still returns it.
    pub fn evict(&self, correlation_id: Uuid) {
        self.trails.lock().remove(&correlation_id);
    }

    /// Wait until every message recorded so far has been handed to the store.
    pub async fn flush(&self) {
        if let Some(tx) = &self.tx {
            let (done_tx, done_rx) = oneshot::channel();
            if tx.send(Command::Flush(done_tx)).is_ok() {
                let _ = done_rx.await;
            }
        }
    }
}

async fn persist(store: &dyn TrailStore, message: &A2AMessage, retry: PersistRetry) {
    for attempt in 0..retry.max_attempts {
        match store.append(message).await {
            Ok(()) => return,
            Err(e) if attempt + 1 < retry.max_attempts => {
                let delay = retry.delay(attempt);
                warn!(
                    correlation_id = %message.correlation_id,
                    sequence = message.sequence,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Trail write failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                error!(
                    correlation_id = %message.correlation_id,
                    sequence = message.sequence,
                    error = %e,
                    "Trail write failed, giving up"
                );
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Replay
// ---------------------------------------------------------------------------

fn stage_for(agent: AgentKind) -> Option<Stage> {
    match agent {
        AgentKind::Research | AgentKind::Strategist => Some(Stage::Researching),
        AgentKind::Generator => Some(Stage::Generating),
        AgentKind::Scorer => Some(Stage::Scoring),
        AgentKind::Refiner => Some(Stage::Refining),
        AgentKind::Client | AgentKind::Orchestrator => None,
    }
}

/// Rebuild the stage sequence of a run from its trail.
///
/// Delegates mark stage entries (retries of the same stage collapse into
/// one). The final Orchestrator-to-Client message closes the run; its payload
/// names the `terminal` state and whether the run went through `finalized`.
/// Every step is checked against [`Stage::can_transition_to`].
pub fn replay_stages(messages: &[A2AMessage]) -> PitchResult<Vec<Stage>> {
    let invalid = |msg: String| PitchError::InputInvalid(format!("inconsistent trail: {msg}"));

    let mut ordered: Vec<&A2AMessage> = messages.iter().collect();
    ordered.sort_by_key(|m| m.sequence);

    let first = *ordered.first().ok_or_else(|| invalid("empty".into()))?;
    if first.message_type != MessageType::Request || first.from != AgentKind::Client {
        return Err(invalid("does not start with a client request".into()));
    }

    let mut stages = vec![Stage::Created];
    let mut seen = std::collections::HashSet::new();

    for msg in ordered {
        if msg.correlation_id != first.correlation_id {
            return Err(invalid(format!("message {} belongs to another run", msg.id)));
        }
        if let Some(parent) = msg.in_reply_to {
            if !seen.contains(&parent) {
                return Err(invalid(format!("message {} answers an unknown message", msg.id)));
            }
        }
        seen.insert(msg.id);

        let current = stages.last().copied().unwrap_or(Stage::Created);
        if current.is_terminal() {
            return Err(invalid(format!("message {} after the run ended", msg.id)));
        }

        let mut next = Vec::new();
        match (msg.message_type, msg.from, msg.to) {
            (MessageType::Delegate, AgentKind::Orchestrator, to) => {
                if let Some(stage) = stage_for(to).filter(|s| *s != current) {
                    next.push(stage);
                }
            }
            (MessageType::Response | MessageType::Error, AgentKind::Orchestrator, AgentKind::Client) => {
                let terminal: TerminalState = msg
                    .payload
                    .get("terminal")
                    .cloned()
                    .map(serde_json::from_value)
                    .transpose()?
                    .ok_or_else(|| invalid("closing message has no terminal state".into()))?;
                let finalized = msg
                    .payload
                    .get("finalized")
                    .and_then(serde_json::Value::as_bool)
                    .unwrap_or(terminal == TerminalState::Completed);
                if finalized {
                    next.push(Stage::Finalizing);
                }
                next.push(terminal.into());
            }
            _ => {}
        }

        for stage in next {
            let from = stages.last().copied().unwrap_or(Stage::Created);
            if !from.can_transition_to(stage) {
                return Err(invalid(format!("{from} cannot be followed by {stage}")));
            }
            stages.push(stage);
        }
    }

    Ok(stages)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    fn closing(request: &A2AMessage, terminal: &str, finalized: bool) -> A2AMessage {
        let payload = json!({"terminal": terminal, "finalized": finalized});
        if terminal == "completed" {
            request.reply(payload)
        } else {
            request.fail(payload)
        }
    }

    #[test]
    fn test_record_assigns_sequence_per_run() {
        let recorder = TrailRecorder::in_memory();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert!(!recorder.is_durable());
        let m1 = recorder.record(A2AMessage::request(a, json!({})));
        let m2 = recorder.record(A2AMessage::delegate(a, AgentKind::Research, json!({})));
        let n1 = recorder.record(A2AMessage::request(b, json!({})));
        assert_eq!((m1.sequence, m2.sequence, n1.sequence), (1, 2, 1));
        assert_eq!(recorder.snapshot(a).len(), 2);
        assert!(recorder.snapshot(a)[0].created_at <= recorder.snapshot(a)[1].created_at);
    }

    #[tokio::test]
    async fn test_concurrent_record_keeps_total_order() {
        let recorder = Arc::new(TrailRecorder::in_memory());
        let id = Uuid::new_v4();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let r = recorder.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..25 {
                    r.record(A2AMessage::delegate(id, AgentKind::Scorer, json!({})));
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let seqs: Vec<u64> = recorder.snapshot(id).iter().map(|m| m.sequence).collect();
        assert_eq!(seqs, (1..=200).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_fetch_falls_back_to_store() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(FileTrailStore::new(tmp.path().to_path_buf()).await.unwrap());
        let recorder = TrailRecorder::with_store(store.clone(), PersistRetry::default());
        let id = Uuid::new_v4();
        let req = recorder.record(A2AMessage::request(id, json!({"customer_id": "x"})));
        recorder.record(req.fail(json!({"terminal": "failed"})));
        recorder.flush().await;

        assert!(recorder.is_durable());
        recorder.evict(id);
        assert!(recorder.snapshot(id).is_empty());
        let fetched = recorder.fetch(id).await.unwrap();
        assert_eq!(fetched.len(), 2);
        assert_eq!(fetched[1].in_reply_to, Some(req.id));

        // A new recorder over the same directory sees the trail too.
        let fresh = TrailRecorder::with_store(store, PersistRetry::default());
        assert_eq!(fresh.fetch(id).await.unwrap().len(), 2);
    }

    struct FlakyStore {
        inner: MemoryTrailStore,
        failures_left: AtomicU32,
    }

    #[async_trait]
    impl TrailStore for FlakyStore {
        async fn append(&self, message: &A2AMessage) -> PitchResult<()> {
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(PitchError::Storage("disk unavailable".into()));
            }
            self.inner.append(message).await
        }

        async fn read(&self, correlation_id: Uuid) -> PitchResult<Vec<A2AMessage>> {
            self.inner.read(correlation_id).await
        }
    }

    #[tokio::test]
    async fn test_failed_writes_are_retried_without_blocking_record() {
        let store = Arc::new(FlakyStore {
            inner: MemoryTrailStore::new(),
            failures_left: AtomicU32::new(2),
        });
        let retry = PersistRetry {
            max_attempts: 5,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        };
        let recorder = TrailRecorder::with_store(store.clone(), retry);
        let id = Uuid::new_v4();
        let msg = recorder.record(A2AMessage::request(id, json!({})));
        assert_eq!(recorder.snapshot(id), vec![msg.clone()]);

        recorder.flush().await;
        assert_eq!(store.read(id).await.unwrap(), vec![msg]);
    }

    #[test]
    fn test_replay_completed_run_with_refinement() {
        let id = Uuid::new_v4();
        let req = A2AMessage::request(id, json!({}));
        let mut trail = vec![req.clone()];
        for agent in [
            AgentKind::Research,
            AgentKind::Strategist,
            AgentKind::Generator,
            AgentKind::Scorer,
            AgentKind::Refiner,
            AgentKind::Scorer,
        ] {
            let d = A2AMessage::delegate(id, agent, json!({}));
            trail.push(d.clone());
            trail.push(d.reply(json!({})));
        }
        trail.push(closing(&req, "completed", true));
        for (i, m) in trail.iter_mut().enumerate() {
            m.sequence = i as u64 + 1;
        }

        let stages = replay_stages(&trail).unwrap();
        assert_eq!(
            stages,
            vec![
                Stage::Created,
                Stage::Researching,
                Stage::Generating,
                Stage::Scoring,
                Stage::Refining,
                Stage::Scoring,
                Stage::Finalizing,
                Stage::Completed,
            ]
        );
    }

    #[test]
    fn test_replay_collapses_retries() {
        let recorder = TrailRecorder::in_memory();
        let id = Uuid::new_v4();
        let req = recorder.record(A2AMessage::request(id, json!({})));
        for agent in [AgentKind::Research, AgentKind::Generator, AgentKind::Scorer] {
            let d = recorder.record(A2AMessage::delegate(id, agent, json!({})));
            recorder.record(d.reply(json!({})));
        }
        let d = recorder.record(A2AMessage::delegate(id, AgentKind::Refiner, json!({})));
        recorder.record(d.fail(json!({"kind": "timeout"})));
        let d = recorder.record(A2AMessage::delegate(id, AgentKind::Refiner, json!({})));
        recorder.record(d.fail(json!({"kind": "timeout"})));
        recorder.record(closing(&req, "failed", true));

        let stages = replay_stages(&recorder.snapshot(id)).unwrap();
        assert_eq!(
            stages,
            vec![
                Stage::Created,
                Stage::Researching,
                Stage::Generating,
                Stage::Scoring,
                Stage::Refining,
                Stage::Finalizing,
                Stage::Failed,
            ]
        );
    }

    #[test]
    fn test_replay_not_found_run() {
        let recorder = TrailRecorder::in_memory();
        let id = Uuid::new_v4();
        let req = recorder.record(A2AMessage::request(id, json!({})));
        recorder.record(closing(&req, "failed", false));
        let stages = replay_stages(&recorder.snapshot(id)).unwrap();
        assert_eq!(stages, vec![Stage::Created, Stage::Failed]);
    }

    #[test]
    fn test_replay_rejects_score_before_generate() {
        let recorder = TrailRecorder::in_memory();
        let id = Uuid::new_v4();
        recorder.record(A2AMessage::request(id, json!({})));
        recorder.record(A2AMessage::delegate(id, AgentKind::Research, json!({})));
        recorder.record(A2AMessage::delegate(id, AgentKind::Scorer, json!({})));
        let err = replay_stages(&recorder.snapshot(id)).unwrap_err();
        assert!(err.to_string().contains("researching cannot be followed by scoring"));
    }

    #[test]
    fn test_replay_rejects_dangling_reply() {
        let id = Uuid::new_v4();
        let mut req = A2AMessage::request(id, json!({}));
        req.sequence = 1;
        let orphan_parent = A2AMessage::delegate(id, AgentKind::Research, json!({}));
        let mut orphan = orphan_parent.reply(json!({}));
        orphan.sequence = 2;
        assert!(replay_stages(&[req, orphan]).is_err());
    }

    #[test]
    fn test_replay_rejects_empty_trail() {
        assert!(replay_stages(&[]).is_err());
    }
}
