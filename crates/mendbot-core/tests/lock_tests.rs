use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use mendbot_core::error::{Acquisition, LockError};
use mendbot_core::lock::{ItemLock, LockOptions};
use mendbot_core::store::ItemStore;
use mendbot_core::types::{Candidate, ItemId, ItemKind};

// ── Mock store ───────────────────────────────────────────────────────────

/// Records every marker call and replays scripted try-add outcomes.
#[derive(Default)]
struct MockStore {
    /// Scripted `try_add_marker` results, consumed front to back.
    /// When empty, Ok(true).
    add_script: Mutex<VecDeque<Result<bool>>>,
    calls: Mutex<Vec<String>>,
    marker_present: Mutex<bool>,
}

impl MockStore {
    fn scripted(results: Vec<Result<bool>>) -> Arc<Self> {
        Arc::new(Self {
            add_script: Mutex::new(results.into()),
            ..Self::default()
        })
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl ItemStore for MockStore {
    async fn list_open_items(&self) -> Result<Vec<Candidate>> {
        Ok(Vec::new())
    }

    async fn try_add_marker(&self, _item: ItemId, _name: &str) -> Result<bool> {
        self.calls.lock().expect("calls lock").push("add".into());
        self.add_script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or(Ok(true))
    }

    async fn remove_marker(&self, _item: ItemId, _name: &str) -> Result<()> {
        self.calls.lock().expect("calls lock").push("remove".into());
        Ok(())
    }

    async fn has_marker(&self, _item: ItemId, _name: &str) -> Result<bool> {
        self.calls.lock().expect("calls lock").push("has".into());
        Ok(*self.marker_present.lock().expect("marker lock"))
    }
}

fn item() -> ItemId {
    ItemId { kind: ItemKind::Issue, number: 17 }
}

fn opts(max_retries: u32, delay_ms: u64) -> LockOptions {
    LockOptions {
        max_retries,
        retry_delay: Duration::from_millis(delay_ms),
        dry_run: false,
        disabled: false,
    }
}

// ── Acquisition ──────────────────────────────────────────────────────────

#[tokio::test]
async fn acquire_succeeds_on_true() {
    let store = MockStore::scripted(vec![Ok(true)]);
    let lock = ItemLock::new(Arc::clone(&store) as Arc<dyn ItemStore>, "working", opts(3, 1));

    let acq = lock.acquire(item()).await.expect("acquire");
    let Acquisition::Acquired(handle) = acq else {
        panic!("expected acquisition");
    };
    assert!(!handle.noop);
    assert_eq!(handle.item, item());
    assert_eq!(handle.marker, "working");
    assert_eq!(store.calls(), vec!["add"]);
}

#[tokio::test]
async fn acquire_reports_contention_without_retrying() {
    let store = MockStore::scripted(vec![Ok(false)]);
    let lock = ItemLock::new(Arc::clone(&store) as Arc<dyn ItemStore>, "working", opts(5, 1));

    let acq = lock.acquire(item()).await.expect("acquire");
    assert!(acq.is_contended());
    // Contention is authoritative; it must not burn retries.
    assert_eq!(store.calls(), vec!["add"]);
}

#[tokio::test]
async fn acquire_retries_transient_failures_with_delay() {
    // Two transport failures, then success: elapsed >= 2 * delay.
    let store = MockStore::scripted(vec![
        Err(anyhow!("connection reset")),
        Err(anyhow!("timeout")),
        Ok(true),
    ]);
    let delay_ms = 50;
    let lock = ItemLock::new(Arc::clone(&store) as Arc<dyn ItemStore>, "working", opts(3, delay_ms));

    let start = std::time::Instant::now();
    let acq = lock.acquire(item()).await.expect("acquire");
    assert!(matches!(acq, Acquisition::Acquired(_)));
    assert!(start.elapsed() >= Duration::from_millis(2 * delay_ms));
    assert_eq!(store.calls(), vec!["add", "add", "add"]);
}

#[tokio::test]
async fn acquire_surfaces_transient_after_retry_exhaustion() {
    let store = MockStore::scripted(vec![
        Err(anyhow!("boom")),
        Err(anyhow!("boom")),
        Err(anyhow!("boom")),
    ]);
    let lock = ItemLock::new(Arc::clone(&store) as Arc<dyn ItemStore>, "working", opts(3, 1));

    let err = lock.acquire(item()).await.expect_err("should exhaust");
    let LockError::Transient { attempts, .. } = err;
    assert_eq!(attempts, 3);
    assert_eq!(store.calls().len(), 3);
}

// ── Dry-run / disabled: zero remote mutations ────────────────────────────

#[tokio::test]
async fn dry_run_acquire_and_release_touch_nothing() {
    let store = MockStore::scripted(vec![]);
    let lock = ItemLock::new(
        Arc::clone(&store) as Arc<dyn ItemStore>,
        "working",
        LockOptions { dry_run: true, ..opts(3, 1) },
    );

    let acq = lock.acquire(item()).await.expect("acquire");
    let Acquisition::Acquired(handle) = acq else {
        panic!("dry-run acquisition always succeeds");
    };
    assert!(handle.noop);

    lock.release(handle, false).await;
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn disabled_acquire_and_release_touch_nothing() {
    let store = MockStore::scripted(vec![]);
    let lock = ItemLock::new(
        Arc::clone(&store) as Arc<dyn ItemStore>,
        "working",
        LockOptions { disabled: true, ..opts(3, 1) },
    );

    let acq = lock.acquire(item()).await.expect("acquire");
    let Acquisition::Acquired(handle) = acq else {
        panic!("disabled acquisition always succeeds");
    };
    assert!(handle.noop);

    lock.release(handle, false).await;
    assert!(store.calls().is_empty());
}

// ── Release ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn release_removes_the_marker() {
    let store = MockStore::scripted(vec![Ok(true)]);
    let lock = ItemLock::new(Arc::clone(&store) as Arc<dyn ItemStore>, "working", opts(3, 1));

    let Acquisition::Acquired(handle) = lock.acquire(item()).await.expect("acquire") else {
        panic!("expected acquisition");
    };
    lock.release(handle, false).await;
    assert_eq!(store.calls(), vec!["add", "remove"]);
}

#[tokio::test]
async fn release_with_keep_leaves_the_marker() {
    let store = MockStore::scripted(vec![Ok(true)]);
    let lock = ItemLock::new(Arc::clone(&store) as Arc<dyn ItemStore>, "working", opts(3, 1));

    let Acquisition::Acquired(handle) = lock.acquire(item()).await.expect("acquire") else {
        panic!("expected acquisition");
    };
    lock.release(handle, true).await;
    assert_eq!(store.calls(), vec!["add"]);
}

// ── Verify ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn verify_is_read_only() {
    let store = MockStore::scripted(vec![]);
    *store.marker_present.lock().expect("marker lock") = true;
    let lock = ItemLock::new(Arc::clone(&store) as Arc<dyn ItemStore>, "working", opts(3, 1));

    assert!(lock.verify(item()).await.expect("verify"));
    assert_eq!(store.calls(), vec!["has"]);
}
