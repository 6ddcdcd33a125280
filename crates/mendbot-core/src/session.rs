use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::warn;

use crate::types::SessionRecord;

/// Persists the last backend/session pairing across daemon restarts.
///
/// Loading never fails: a missing or corrupt file degrades to the zero
/// record. Saving never raises either; it reports success as a bool so a
/// persistence failure can never interrupt the scheduling loop. An internal
/// mutex serializes read-modify-write cycles from concurrent workers.
pub struct SessionStore {
    path: PathBuf,
    io_lock: Mutex<()>,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            io_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> SessionRecord {
        let _guard = self.io_lock.lock().await;
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return SessionRecord::default();
            }
            Err(e) => {
                warn!(path = %self.path.display(), "session file unreadable, using defaults: {e}");
                return SessionRecord::default();
            }
        };
        match serde_json::from_str(&contents) {
            Ok(record) => record,
            Err(e) => {
                warn!(path = %self.path.display(), "session file malformed, using defaults: {e}");
                SessionRecord::default()
            }
        }
    }

    /// Atomically replace the session file: write a temp file next to the
    /// target, restrict it to owner read/write, then rename over the
    /// destination.
    pub async fn save(&self, record: &SessionRecord) -> bool {
        let _guard = self.io_lock.lock().await;
        match self.write_atomic(record) {
            Ok(()) => true,
            Err(e) => {
                warn!(path = %self.path.display(), "session save failed: {e}");
                false
            }
        }
    }

    fn write_atomic(&self, record: &SessionRecord) -> anyhow::Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(record)?;
        std::fs::write(&tmp, json)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
        }
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
