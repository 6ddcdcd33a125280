use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::{Acquisition, RouterError};
use crate::lock::ItemLock;
use crate::prompt::fix_prompt;
use crate::router::BackendRouter;
use crate::store::ItemStore;
use crate::types::{Candidate, ItemId, PoolStatus};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Bounded worker-pool size N.
    pub worker_count: usize,
    pub poll_interval: Duration,
    /// How long the drain waits for in-flight workers on shutdown.
    pub shutdown_grace: Duration,
}

/// Waiting queue plus active-slot table, behind one coarse lock. Both the
/// poll loop and the workers mutate this; fine-grained locking buys nothing
/// at this scale.
#[derive(Default)]
struct SchedState {
    queue: Vec<Candidate>,
    active: HashMap<ItemId, Candidate>,
}

/// Priority candidate scheduler over a bounded worker pool.
///
/// One poll loop discovers open items and merges them into the waiting
/// queue; up to `worker_count` spawned workers each run the protected
/// section: acquire the item lock, route the fix through the backend
/// chain, release the lock on every outcome.
pub struct Scheduler {
    store: Arc<dyn ItemStore>,
    lock: Arc<ItemLock>,
    router: Arc<BackendRouter>,
    cfg: SchedulerConfig,
    state: Mutex<SchedState>,
    skipped: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn ItemStore>,
        lock: Arc<ItemLock>,
        router: Arc<BackendRouter>,
        cfg: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            lock,
            router,
            cfg,
            state: Mutex::new(SchedState::default()),
            skipped: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Read-only snapshot: queue depth, occupied slots, skip/outcome
    /// counters.
    pub async fn status(&self) -> PoolStatus {
        let state = self.state.lock().await;
        PoolStatus {
            queue_depth: state.queue.len(),
            active: state.active.len(),
            skipped: self.skipped.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    /// Main loop: poll, dispatch, sleep; on shutdown stop dispatching and
    /// drain in-flight workers until the grace deadline.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            if let Err(e) = self.poll_once().await {
                warn!("candidate discovery failed: {e:#}");
            }
            Arc::clone(&self).dispatch_ready().await;

            tokio::select! {
                _ = tokio::time::sleep(self.cfg.poll_interval) => {}
                _ = shutdown.changed() => {}
            }
        }
        self.drain().await;
    }

    /// Fetch the open-item set and merge it into the waiting queue,
    /// dropping anything already queued or dispatched. Re-seen queued
    /// items keep their discovery time (FIFO tie-break) but pick up fresh
    /// priority and title.
    pub async fn poll_once(&self) -> anyhow::Result<()> {
        let discovered = self.store.list_open_items().await?;
        let mut state = self.state.lock().await;
        let mut added = 0usize;
        for candidate in discovered {
            if state.active.contains_key(&candidate.id) {
                continue;
            }
            if let Some(existing) = state.queue.iter_mut().find(|c| c.id == candidate.id) {
                existing.priority = candidate.priority;
                existing.title = candidate.title;
                continue;
            }
            state.queue.push(candidate);
            added += 1;
        }
        if added > 0 {
            debug!(added, queue_depth = state.queue.len(), "discovery merged candidates");
        }
        Ok(())
    }

    /// Fill idle worker slots with the best waiting candidates.
    pub async fn dispatch_ready(self: Arc<Self>) {
        loop {
            let candidate = {
                let mut state = self.state.lock().await;
                if state.active.len() >= self.cfg.worker_count {
                    return;
                }
                let Some(idx) = pick_best(&state.queue) else {
                    return;
                };
                let candidate = state.queue.remove(idx);
                state.active.insert(candidate.id, candidate.clone());
                candidate
            };

            let scheduler = Arc::clone(&self);
            tokio::spawn(async move {
                let id = candidate.id;
                scheduler.run_protected(candidate).await;
                scheduler.state.lock().await.active.remove(&id);
            });
        }
    }

    /// The worker's protected section. The lock is released on every exit
    /// path after a successful acquisition; a contended item is counted as
    /// skipped and left for the next discovery cycle.
    async fn run_protected(&self, candidate: Candidate) {
        let handle = match self.lock.acquire(candidate.id).await {
            Ok(Acquisition::Acquired(handle)) => handle,
            Ok(Acquisition::Contended) => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
                debug!(item = %candidate.id, "item contended, skipping this cycle");
                return;
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                warn!(item = %candidate.id, "lock acquisition failed: {e}");
                return;
            }
        };

        info!(item = %candidate.id, priority = candidate.priority, title = %candidate.title, "working item");
        let prompt = fix_prompt(&candidate);
        let result = self.router.execute(&prompt, true).await;
        // Release before inspecting the outcome so every path cleans up.
        self.lock.release(handle, false).await;

        match result {
            Ok(text) => {
                self.completed.fetch_add(1, Ordering::Relaxed);
                info!(item = %candidate.id, summary_len = text.len(), "item completed");
            }
            Err(RouterError::AllBackendsExhausted { attempted }) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                warn!(item = %candidate.id, attempted, "all backends exhausted; item stays eligible");
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                error!(item = %candidate.id, "fix failed: {e}");
            }
        }
    }

    /// Best-effort drain: wait for in-flight workers until the grace
    /// deadline, then report any items whose markers may be left behind.
    async fn drain(&self) {
        info!("shutdown: draining in-flight workers");
        let deadline = Instant::now() + self.cfg.shutdown_grace;
        loop {
            let leftover: Vec<ItemId> = {
                let state = self.state.lock().await;
                state.active.keys().copied().collect()
            };
            if leftover.is_empty() {
                info!("drain complete");
                return;
            }
            if Instant::now() >= deadline {
                let items: Vec<String> = leftover.iter().map(ItemId::to_string).collect();
                warn!(
                    items = %items.join(", "),
                    "drain deadline reached; stale markers may remain on these items"
                );
                return;
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }
}

/// Index of the dispatch winner: highest priority, FIFO among equals.
fn pick_best(queue: &[Candidate]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (idx, c) in queue.iter().enumerate() {
        best = match best {
            None => Some(idx),
            Some(b) => {
                let cur = &queue[b];
                if c.priority > cur.priority
                    || (c.priority == cur.priority && c.discovered_at < cur.discovered_at)
                {
                    Some(idx)
                } else {
                    Some(b)
                }
            }
        };
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ItemKind;
    use chrono::{Duration as ChronoDuration, Utc};

    fn candidate(number: i64, priority: i64, age_s: i64) -> Candidate {
        Candidate {
            id: ItemId { kind: ItemKind::Issue, number },
            priority,
            title: format!("item {number}"),
            discovered_at: Utc::now() - ChronoDuration::seconds(age_s),
        }
    }

    #[test]
    fn pick_best_prefers_priority() {
        let queue = vec![candidate(1, 2, 100), candidate(2, 10, 0)];
        assert_eq!(pick_best(&queue), Some(1));
    }

    #[test]
    fn pick_best_is_fifo_among_equals() {
        let queue = vec![candidate(1, 5, 10), candidate(2, 5, 100), candidate(3, 5, 50)];
        // Item 2 was discovered first.
        assert_eq!(pick_best(&queue), Some(1));
    }

    #[test]
    fn pick_best_empty_queue() {
        assert_eq!(pick_best(&[]), None);
    }
}
