use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, warn};

use crate::error::{Acquisition, LockError};
use crate::store::ItemStore;
use crate::types::{ItemId, LockHandle};

/// Options for marker acquisition.
#[derive(Debug, Clone)]
pub struct LockOptions {
    /// Total try-add attempts on transport failure (minimum 1).
    pub max_retries: u32,
    /// Fixed delay between attempts.
    pub retry_delay: Duration,
    /// Pretend to acquire/release without touching the remote store.
    pub dry_run: bool,
    /// Markers turned off by configuration; acquisition is a no-op.
    pub disabled: bool,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            dry_run: false,
            disabled: false,
        }
    }
}

/// Advisory distributed lock over a named marker on a remote item.
///
/// The remote add operation's boolean return is the only source of truth
/// for ownership. The add/verify/remove sequence is not atomic against the
/// store, so the protocol is best-effort: it prevents duplicate work in
/// practice, it does not guarantee mutual exclusion. The marker carries no
/// holder token, so removal is not ownership-checked either.
pub struct ItemLock {
    store: Arc<dyn ItemStore>,
    marker: String,
    opts: LockOptions,
}

impl ItemLock {
    pub fn new(store: Arc<dyn ItemStore>, marker: impl Into<String>, opts: LockOptions) -> Self {
        Self {
            store,
            marker: marker.into(),
            opts,
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Try to take the marker on `item`.
    ///
    /// `Contended` is an expected outcome, not an error: the caller skips
    /// the item and leaves it for a later discovery cycle. Transport
    /// failures are retried `max_retries` times with a fixed delay before
    /// surfacing as `LockError::Transient`.
    pub async fn acquire(&self, item: ItemId) -> Result<Acquisition, LockError> {
        if self.opts.disabled || self.opts.dry_run {
            debug!(item = %item, dry_run = self.opts.dry_run, "lock acquisition is a no-op");
            return Ok(Acquisition::Acquired(LockHandle {
                item,
                marker: self.marker.clone(),
                acquired_at: Utc::now(),
                noop: true,
            }));
        }

        let attempts = self.opts.max_retries.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.store.try_add_marker(item, &self.marker).await {
                Ok(true) => {
                    debug!(item = %item, marker = %self.marker, "marker acquired");
                    return Ok(Acquisition::Acquired(LockHandle {
                        item,
                        marker: self.marker.clone(),
                        acquired_at: Utc::now(),
                        noop: false,
                    }));
                }
                Ok(false) => return Ok(Acquisition::Contended),
                Err(e) => {
                    if attempt >= attempts {
                        return Err(LockError::Transient { attempts, source: e });
                    }
                    warn!(item = %item, attempt, "marker add failed, retrying: {e}");
                    tokio::time::sleep(self.opts.retry_delay).await;
                }
            }
        }
    }

    /// Remove the marker behind `handle`.
    ///
    /// Invoked from the worker's guaranteed-cleanup path, so it never
    /// raises: removal failures are logged and left for the stale-marker
    /// report. `keep` is the escape hatch for a follow-up phase that is
    /// taking over ownership of the marker.
    pub async fn release(&self, handle: LockHandle, keep: bool) {
        if handle.noop {
            return;
        }
        if keep {
            debug!(item = %handle.item, marker = %handle.marker, "keeping marker on release");
            return;
        }
        if let Err(e) = self.store.remove_marker(handle.item, &handle.marker).await {
            warn!(item = %handle.item, marker = %handle.marker, "marker release failed: {e}");
        }
    }

    /// Read-only existence check, for diagnostics. Never mutates state.
    pub async fn verify(&self, item: ItemId) -> Result<bool> {
        self.store.has_marker(item, &self.marker).await
    }
}
