use crate::backends::{CompletionRequest, LlmBackend};
use async_trait::async_trait;
use pitchforge_core::{PitchError, PitchResult};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Sleep hook, replaced in tests so backoff does not slow them down.
#[cfg(test)]
type SleepFn = Box<
    dyn Fn(u64) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> + Send + Sync,
>;

/// How often and how patiently each provider is retried.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries on one provider before falling over to the next.
    pub max_retries: u32,
    /// First backoff delay, doubled on every retry.
    pub backoff_base_ms: u64,
    /// Upper bound for a single backoff delay.
    pub backoff_max_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            backoff_base_ms: 500,
            backoff_max_ms: 8_000,
        }
    }
}

/// `backoff_base_ms * 2^attempt`, never above `backoff_max_ms`.
pub fn compute_backoff(policy: &RetryPolicy, attempt: u32) -> u64 {
    let delay = policy
        .backoff_base_ms
        .saturating_mul(2u64.saturating_pow(attempt));
    delay.min(policy.backoff_max_ms)
}

/// An `LlmBackend` that wraps several backends and fails over between them,
/// retrying transient errors with exponential backoff.
///
/// For each request it tries backends in order. Within each backend it retries
/// up to `max_retries` times for transient errors (timeouts, unavailable
/// provider). A non-transient error moves straight to the next backend. If
/// every backend fails, the last error is returned.
pub struct FailoverBackend {
    backends: Vec<Box<dyn LlmBackend>>,
    policy: RetryPolicy,
    #[cfg(test)]
    sleep_fn: Option<SleepFn>,
}

impl FailoverBackend {
    /// Returns `None` when `backends` is empty.
    pub fn new(backends: Vec<Box<dyn LlmBackend>>, policy: RetryPolicy) -> Option<Self> {
        if backends.is_empty() {
            return None;
        }
        Some(Self {
            backends,
            policy,
            #[cfg(test)]
            sleep_fn: None,
        })
    }

    /// Primary backend followed by fallbacks, tried in order.
    pub fn with_primary(
        primary: Box<dyn LlmBackend>,
        fallbacks: Vec<Box<dyn LlmBackend>>,
        policy: RetryPolicy,
    ) -> Self {
        let mut backends = Vec::with_capacity(fallbacks.len() + 1);
        backends.push(primary);
        backends.extend(fallbacks);
        Self {
            backends,
            policy,
            #[cfg(test)]
            sleep_fn: None,
        }
    }

    async fn do_sleep(&self, ms: u64) {
        #[cfg(test)]
        if let Some(ref f) = self.sleep_fn {
            f(ms).await;
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
    }
}

#[async_trait]
impl LlmBackend for FailoverBackend {
    async fn complete(&self, request: &CompletionRequest) -> PitchResult<String> {
        let mut last_err: Option<PitchError> = None;

        for (backend_idx, backend) in self.backends.iter().enumerate() {
            for attempt in 0..=self.policy.max_retries {
                match backend.complete(request).await {
                    Ok(text) => return Ok(text),
                    Err(e) => {
                        if !e.is_transient() {
                            warn!(
                                backend = backend_idx,
                                attempt,
                                error = %e,
                                "Provider rejected the request, trying next model"
                            );
                            last_err = Some(e);
                            break;
                        }

                        if attempt < self.policy.max_retries {
                            let delay = compute_backoff(&self.policy, attempt);
                            info!(
                                backend = backend_idx,
                                attempt,
                                delay_ms = delay,
                                error = %e,
                                "Retryable error, backing off"
                            );
                            self.do_sleep(delay).await;
                        }
                        last_err = Some(e);
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            PitchError::ProviderUnavailable("All failover backends exhausted".into())
        }))
    }
}
