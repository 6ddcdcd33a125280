use mendbot_core::session::SessionStore;
use mendbot_core::types::SessionRecord;

fn record(backend: Option<&str>, session: Option<&str>, ts: i64) -> SessionRecord {
    SessionRecord {
        last_backend: backend.map(str::to_string),
        last_session_id: session.map(str::to_string),
        last_used_at: ts,
    }
}

// ── Round-trip ───────────────────────────────────────────────────────────

#[tokio::test]
async fn save_then_load_round_trips_all_fields() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SessionStore::new(dir.path().join("session.json"));

    let original = record(Some("claude"), Some("sess-abc-123"), 1_700_000_000);
    assert!(store.save(&original).await);
    assert_eq!(store.load().await, original);
}

#[tokio::test]
async fn round_trip_preserves_null_fields() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SessionStore::new(dir.path().join("session.json"));

    let original = record(None, None, 0);
    assert!(store.save(&original).await);
    assert_eq!(store.load().await, original);

    let partial = record(Some("codex"), None, 42);
    assert!(store.save(&partial).await);
    assert_eq!(store.load().await, partial);
}

#[tokio::test]
async fn save_overwrites_previous_record() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SessionStore::new(dir.path().join("session.json"));

    assert!(store.save(&record(Some("claude"), Some("one"), 1)).await);
    assert!(store.save(&record(Some("codex"), Some("two"), 2)).await);
    let loaded = store.load().await;
    assert_eq!(loaded.last_backend.as_deref(), Some("codex"));
    assert_eq!(loaded.last_session_id.as_deref(), Some("two"));
}

// ── Corrupt/missing store defaults ───────────────────────────────────────

#[tokio::test]
async fn missing_file_loads_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SessionStore::new(dir.path().join("does-not-exist.json"));
    assert_eq!(store.load().await, SessionRecord::default());
}

#[tokio::test]
async fn malformed_file_loads_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("session.json");
    std::fs::write(&path, "{ not valid json at all").expect("write garbage");

    let store = SessionStore::new(&path);
    assert_eq!(store.load().await, SessionRecord::default());
}

#[tokio::test]
async fn wrong_shape_loads_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("session.json");
    std::fs::write(&path, r#"[1, 2, 3]"#).expect("write wrong shape");

    let store = SessionStore::new(&path);
    assert_eq!(store.load().await, SessionRecord::default());
}

// ── Write mechanics ──────────────────────────────────────────────────────

#[tokio::test]
async fn save_creates_missing_parent_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("nested/deeper/session.json");
    let store = SessionStore::new(&path);

    assert!(store.save(&record(Some("claude"), None, 9)).await);
    assert!(path.exists());
}

#[cfg(unix)]
#[tokio::test]
async fn saved_file_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("session.json");
    let store = SessionStore::new(&path);
    assert!(store.save(&record(Some("claude"), Some("sid"), 1)).await);

    let mode = std::fs::metadata(&path).expect("metadata").permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[tokio::test]
async fn save_leaves_no_temp_file_behind() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SessionStore::new(dir.path().join("session.json"));
    assert!(store.save(&record(Some("claude"), None, 1)).await);

    let names: Vec<String> = std::fs::read_dir(dir.path())
        .expect("read_dir")
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["session.json".to_string()]);
}

#[tokio::test]
async fn save_failure_returns_false_not_panic() {
    // Point the store at a path whose parent is a regular file.
    let dir = tempfile::tempdir().expect("tempdir");
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "x").expect("write blocker");

    let store = SessionStore::new(blocker.join("session.json"));
    assert!(!store.save(&record(Some("claude"), None, 1)).await);
}
