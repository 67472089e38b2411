use parking_lot::Mutex;
use pitchforge_core::{PitchError, PitchResult, RunOutcome, RunStatus};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// Cooperative cancellation flag shared between a run and its callers.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    /// A token that has not been cancelled.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Flag the run. It stops at its next checkpoint.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

struct RunEntry {
    status: RunStatus,
    cancel: CancelToken,
    /// `Some` once the run has finished.
    outcome: watch::Sender<Option<RunOutcome>>,
}

#[derive(Default)]
struct Runs {
    entries: HashMap<Uuid, RunEntry>,
    /// Finished runs, oldest first.
    finished: VecDeque<Uuid>,
}

/// Status table of the runs started by one orchestrator.
///
/// Updates to a run whose status is terminal are ignored, so a finished
/// run's snapshot never changes again. Only the most recent `retain`
/// finished runs are kept; live runs are never dropped.
pub struct RunTable {
    runs: Mutex<Runs>,
    retain: usize,
}

impl RunTable {
    /// Table keeping at most `retain` finished runs.
    pub fn new(retain: usize) -> Self {
        Self {
            runs: Mutex::new(Runs::default()),
            retain,
        }
    }

    /// Add a live run and hand out its cancellation token.
    pub fn register(&self, status: RunStatus) -> CancelToken {
        let cancel = CancelToken::new();
        let (outcome, _) = watch::channel(None);
        self.runs.lock().entries.insert(
            status.run_id,
            RunEntry {
                status,
                cancel: cancel.clone(),
                outcome,
            },
        );
        cancel
    }

    /// Apply `f` to the status of a live run.
    pub fn update(&self, run_id: Uuid, f: impl FnOnce(&mut RunStatus)) {
        if let Some(entry) = self.runs.lock().entries.get_mut(&run_id) {
            if !entry.status.is_terminal() {
                f(&mut entry.status);
            }
        }
    }

    /// Store the outcome of a finished run and wake its waiters. Returns the
    /// ids of older finished runs dropped to stay within the retention bound.
    pub fn complete(&self, outcome: RunOutcome) -> Vec<Uuid> {
        let run_id = outcome.correlation_id;
        let mut runs = self.runs.lock();
        let Some(entry) = runs.entries.get_mut(&run_id) else {
            return Vec::new();
        };
        if entry.outcome.borrow().is_some() {
            return Vec::new();
        }
        entry.outcome.send_replace(Some(outcome));
        runs.finished.push_back(run_id);

        let mut dropped = Vec::new();
        while runs.finished.len() > self.retain {
            if let Some(old) = runs.finished.pop_front() {
                runs.entries.remove(&old);
                dropped.push(old);
            }
        }
        dropped
    }

    /// Current status snapshot of `run_id`.
    pub fn status(&self, run_id: Uuid) -> PitchResult<RunStatus> {
        self.runs
            .lock()
            .entries
            .get(&run_id)
            .map(|e| e.status.clone())
            .ok_or_else(|| not_found(run_id))
    }

    /// Request cancellation. Cancelling a finished run is a no-op.
    pub fn cancel(&self, run_id: Uuid) -> PitchResult<()> {
        let runs = self.runs.lock();
        let entry = runs.entries.get(&run_id).ok_or_else(|| not_found(run_id))?;
        if !entry.status.is_terminal() {
            entry.cancel.cancel();
        }
        Ok(())
    }

    /// Wait for the outcome of `run_id`.
    pub async fn wait(&self, run_id: Uuid) -> PitchResult<RunOutcome> {
        let mut rx = {
            let runs = self.runs.lock();
            let entry = runs.entries.get(&run_id).ok_or_else(|| not_found(run_id))?;
            entry.outcome.subscribe()
        };
        let outcome = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| PitchError::Storage(format!("run {run_id} was dropped")))?;
        outcome.clone().ok_or_else(|| not_found(run_id))
    }

    /// Statuses of every known run, oldest first.
    pub fn list(&self) -> Vec<RunStatus> {
        let mut all: Vec<RunStatus> = self
            .runs
            .lock()
            .entries
            .values()
            .map(|e| e.status.clone())
            .collect();
        all.sort_by_key(|s| s.started_at);
        all
    }
}

fn not_found(run_id: Uuid) -> PitchError {
    PitchError::NotFound(format!("run {run_id}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use pitchforge_core::{Stage, TerminalState};
    use std::time::Duration;

    fn outcome(run_id: Uuid, customer_id: Uuid) -> RunOutcome {
        RunOutcome {
            correlation_id: run_id,
            customer_id,
            terminal: TerminalState::Cancelled,
            verdict: None,
            iterations: 0,
            pitch: None,
            trail: Vec::new(),
            error: None,
        }
    }

    #[test]
    fn test_terminal_status_is_frozen() {
        let table = RunTable::new(16);
        let run = Uuid::new_v4();
        table.register(RunStatus::new(run, Uuid::new_v4()));

        table.update(run, |s| s.stage = Stage::Scoring);
        table.update(run, |s| {
            s.stage = Stage::Cancelled;
            s.terminal = Some(TerminalState::Cancelled);
        });
        table.update(run, |s| s.stage = Stage::Refining);

        let status = table.status(run).unwrap();
        assert_eq!(status.stage, Stage::Cancelled);
        assert_eq!(status, table.status(run).unwrap());
    }

    #[test]
    fn test_unknown_run() {
        let table = RunTable::new(16);
        assert!(matches!(
            table.status(Uuid::new_v4()),
            Err(PitchError::NotFound(_))
        ));
        assert!(table.cancel(Uuid::new_v4()).is_err());
    }

    #[test]
    fn test_cancel_sets_token() {
        let table = RunTable::new(16);
        let run = Uuid::new_v4();
        let token = table.register(RunStatus::new(run, Uuid::new_v4()));
        assert!(!token.is_cancelled());
        table.cancel(run).unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_wait_returns_outcome_once_completed() {
        let table = Arc::new(RunTable::new(16));
        let run = Uuid::new_v4();
        let customer = Uuid::new_v4();
        table.register(RunStatus::new(run, customer));

        let waiter = {
            let table = table.clone();
            tokio::spawn(async move { table.wait(run).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        table.complete(outcome(run, customer));

        let got = waiter.await.unwrap().unwrap();
        assert_eq!(got.correlation_id, run);
        // Waiting after completion returns immediately.
        assert_eq!(table.wait(run).await.unwrap().customer_id, customer);
    }

    #[tokio::test]
    async fn test_oldest_finished_runs_are_dropped() {
        let table = RunTable::new(2);
        let customer = Uuid::new_v4();
        let ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            table.register(RunStatus::new(*id, customer));
        }

        assert!(table.complete(outcome(ids[0], customer)).is_empty());
        assert!(table.complete(outcome(ids[1], customer)).is_empty());
        assert_eq!(table.complete(outcome(ids[2], customer)), vec![ids[0]]);
        // Completing twice neither re-counts nor drops anything.
        assert!(table.complete(outcome(ids[2], customer)).is_empty());

        assert!(matches!(table.status(ids[0]), Err(PitchError::NotFound(_))));
        assert!(matches!(table.wait(ids[0]).await, Err(PitchError::NotFound(_))));
        assert_eq!(table.wait(ids[1]).await.unwrap().correlation_id, ids[1]);
        // The live run survives however many runs finish.
        assert!(table.status(ids[3]).is_ok());
        assert_eq!(table.list().len(), 3);
    }
}
