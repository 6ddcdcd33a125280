use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};

use crate::backend::FixBackend;
use crate::error::{BackendError, RouterError};
use crate::session::SessionStore;
use crate::types::{BackendSpec, Invocation, SessionRecord};

/// Backoff ceiling per attempt; doubling stops here.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// One link of the failover chain: descriptor plus implementation.
pub struct RankedBackend {
    pub spec: BackendSpec,
    pub backend: Arc<dyn FixBackend>,
}

/// Outcome of running one backend to completion of its retry budget.
/// Folding this over the ordered chain is the whole failover policy; no
/// mutable "current backend" index exists anywhere.
enum ChainStep {
    Success(Invocation),
    /// Usage limit or retries spent on transients; advance to next backend.
    Exhausted,
    Fatal { message: String },
}

/// Routes a fix prompt through an ordered chain of backends with retry,
/// exponential backoff, and usage-limit failover, persisting session
/// affinity through the [`SessionStore`].
pub struct BackendRouter {
    chain: Vec<RankedBackend>,
    session: Arc<SessionStore>,
}

impl BackendRouter {
    /// Builds a router over `chain`, sorted by ascending rank. An empty
    /// chain is a configuration error and refuses to construct.
    pub fn new(mut chain: Vec<RankedBackend>, session: Arc<SessionStore>) -> Result<Self, RouterError> {
        if chain.is_empty() {
            return Err(RouterError::NoBackends);
        }
        chain.sort_by_key(|b| b.spec.rank);
        Ok(Self { chain, session })
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.chain.iter().map(|b| b.spec.name.as_str()).collect()
    }

    /// Run `prompt` through the chain in rank order and return the first
    /// successful text.
    ///
    /// When `resume` is set and the last successful backend is still the
    /// first-eligible entry, its stored session id is passed along so the
    /// conversation continues. Affinity is advisory only: failover proceeds
    /// in rank order regardless.
    pub async fn execute(&self, prompt: &str, resume: bool) -> Result<String, RouterError> {
        let affinity = if resume {
            let record = self.session.load().await;
            match (&record.last_backend, &record.last_session_id) {
                (Some(backend), Some(sid)) if *backend == self.chain[0].spec.name => {
                    Some(sid.clone())
                }
                _ => None,
            }
        } else {
            None
        };

        for (idx, link) in self.chain.iter().enumerate() {
            let session_hint = if idx == 0 { affinity.as_deref() } else { None };
            match self.run_backend(link, prompt, session_hint).await {
                ChainStep::Success(invocation) => {
                    self.persist_session(&link.spec, &invocation).await;
                    return Ok(invocation.text);
                }
                ChainStep::Exhausted => {
                    debug!(backend = %link.spec.name, "backend exhausted, failing over");
                }
                ChainStep::Fatal { message } => {
                    return Err(RouterError::Fatal {
                        backend: link.spec.name.clone(),
                        message,
                    });
                }
            }
        }

        Err(RouterError::AllBackendsExhausted {
            attempted: self.chain.len(),
        })
    }

    /// Run one backend through its retry budget. A usage-limit response
    /// ends the budget immediately; transients consume one attempt each
    /// with a doubling, capped, jittered delay in between.
    async fn run_backend(
        &self,
        link: &RankedBackend,
        prompt: &str,
        session_hint: Option<&str>,
    ) -> ChainStep {
        let max_attempts = link.spec.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            match link.backend.invoke(prompt, session_hint).await {
                Ok(invocation) => {
                    info!(backend = %link.spec.name, attempt, "backend invocation succeeded");
                    return ChainStep::Success(invocation);
                }
                Err(BackendError::UsageLimit(msg)) => {
                    info!(backend = %link.spec.name, "usage limit: {msg}");
                    return ChainStep::Exhausted;
                }
                Err(BackendError::Fatal(message)) => {
                    warn!(backend = %link.spec.name, "fatal backend error: {message}");
                    return ChainStep::Fatal { message };
                }
                Err(BackendError::Transient(msg)) => {
                    if attempt == max_attempts {
                        warn!(backend = %link.spec.name, attempt, "transient failure, retries spent: {msg}");
                        return ChainStep::Exhausted;
                    }
                    let delay = backoff_delay(link.spec.base_delay_ms, attempt);
                    warn!(
                        backend = %link.spec.name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "transient failure, backing off: {msg}"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
        ChainStep::Exhausted
    }

    async fn persist_session(&self, spec: &BackendSpec, invocation: &Invocation) {
        let record = SessionRecord {
            last_backend: Some(spec.name.clone()),
            last_session_id: invocation.session_id.clone(),
            last_used_at: chrono::Utc::now().timestamp(),
        };
        // save() logs its own warning and the scheduling loop never sees
        // persistence failures.
        self.session.save(&record).await;
    }
}

/// Delay before retry `attempt + 1`: base doubled per attempt, capped at
/// [`MAX_BACKOFF`], with up to 25% additive jitter.
fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let base = base_ms.max(1);
    let doubled = base.saturating_mul(1u64 << (attempt - 1).min(16));
    let capped = doubled.min(MAX_BACKOFF.as_millis() as u64);
    let jitter = rand::thread_rng().gen_range(0..=capped / 4);
    Duration::from_millis(capped.saturating_add(jitter).min(MAX_BACKOFF.as_millis() as u64))
}
