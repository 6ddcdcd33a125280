use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Work items ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Issue,
    ChangeRequest,
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Issue => write!(f, "issue"),
            Self::ChangeRequest => write!(f, "pr"),
        }
    }
}

/// Identity of a remote work item: kind + number within the watched repo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId {
    pub kind: ItemKind,
    pub number: i64,
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.kind, self.number)
    }
}

/// A discovered unit of work, eligible for scheduling.
///
/// At most one live candidate per `ItemId` is tracked at any time: the
/// scheduler drops rediscoveries of items already queued or dispatched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: ItemId,
    /// Larger wins. Derived from item metadata at discovery time.
    pub priority: i64,
    pub title: String,
    pub discovered_at: DateTime<Utc>,
}

// ── Lock handle ──────────────────────────────────────────────────────────

/// Proof of a successful marker acquisition, owned by exactly one worker.
///
/// `noop` handles come from dry-run or markers-disabled acquisition; their
/// release makes no remote call either.
#[derive(Debug, Clone)]
pub struct LockHandle {
    pub item: ItemId,
    pub marker: String,
    pub acquired_at: DateTime<Utc>,
    pub noop: bool,
}

// ── Backend chain ────────────────────────────────────────────────────────

/// One entry of the failover chain. The chain is ordered by ascending
/// `rank`; per-backend retry policy rides along.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSpec {
    pub name: String,
    pub rank: i64,
    /// Model identifier passed through to the backend (may be empty).
    pub model: String,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

// ── Session affinity ─────────────────────────────────────────────────────

/// Last backend/session pairing, persisted across daemon restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub last_backend: Option<String>,
    pub last_session_id: Option<String>,
    /// Unix seconds of the last successful backend invocation.
    #[serde(default)]
    pub last_used_at: i64,
}

// ── Pool status ──────────────────────────────────────────────────────────

/// Read-only snapshot of scheduler state, for the daemon's status line.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PoolStatus {
    pub queue_depth: usize,
    pub active: usize,
    pub skipped: u64,
    pub completed: u64,
    pub failed: u64,
}

// ── Backend invocation ───────────────────────────────────────────────────

/// Result of one successful backend invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub text: String,
    /// Session id for resumption, if the backend supports it.
    pub session_id: Option<String>,
}
