use thiserror::Error;

use crate::types::LockHandle;

// ── Backend errors ───────────────────────────────────────────────────────

/// How a single backend invocation failed. The router's failover policy is
/// driven entirely by this classification.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Retryable network/process failure; consumes one retry attempt.
    #[error("transient backend failure: {0}")]
    Transient(String),

    /// The backend reported quota/usage exhaustion; the router advances to
    /// the next backend immediately without burning further attempts here.
    #[error("backend usage limit reached: {0}")]
    UsageLimit(String),

    /// Misconfiguration or unrecoverable failure; aborts the whole call.
    #[error("fatal backend error: {0}")]
    Fatal(String),
}

// ── Router errors ────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum RouterError {
    /// Every backend in the chain was exhausted (usage limit or retries
    /// spent on transient failures). Fatal for this work item only.
    #[error("all {attempted} backend(s) exhausted")]
    AllBackendsExhausted { attempted: usize },

    /// A backend reported a fatal error; no further failover was attempted.
    #[error("backend '{backend}' failed fatally: {message}")]
    Fatal { backend: String, message: String },

    /// Empty backend chain. The only error allowed to halt the scheduler.
    #[error("no backends configured")]
    NoBackends,
}

// ── Lock errors ──────────────────────────────────────────────────────────

/// Outcome of a lock acquisition attempt. Contention is an expected,
/// frequent result and deliberately not an error.
#[derive(Debug)]
pub enum Acquisition {
    Acquired(LockHandle),
    /// Another holder already has the marker. Skip the item, retry on a
    /// later discovery cycle.
    Contended,
}

impl Acquisition {
    pub fn is_contended(&self) -> bool {
        matches!(self, Self::Contended)
    }
}

#[derive(Debug, Error)]
pub enum LockError {
    /// Transport failure that survived the configured retries.
    #[error("marker operation failed after {attempts} attempt(s): {source}")]
    Transient {
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },
}
