use std::collections::HashMap;

use anyhow::{bail, Result};

use crate::types::BackendSpec;

/// Full daemon configuration. Values come from env/.env only; there is no
/// flag parsing. Sensitive fields (API tokens) are never logged.
#[derive(Debug, Clone)]
pub struct Config {
    /// Watched repository slug, "owner/name".
    pub repo: String,
    pub github_token: String,
    pub api_base_url: String,

    // Marker lock
    /// Label used as the advisory work marker.
    pub marker_name: String,
    pub lock_max_retries: u32,
    pub lock_retry_delay_ms: u64,
    /// Report remote effects without performing them.
    pub dry_run: bool,
    /// Turn marker locking off entirely (single-instance deployments).
    pub markers_disabled: bool,

    // Scheduling
    pub worker_count: usize,
    pub poll_interval_s: u64,
    /// Seconds to let in-flight workers finish after a shutdown signal.
    pub shutdown_grace_s: u64,

    // Backends
    /// Ordered failover chain, parsed from `BACKEND_CHAIN`.
    pub backends: Vec<BackendSpec>,
    /// Per-invocation timeout handed to subprocess backends (0 = no limit).
    pub backend_timeout_s: u64,

    // Persistence
    pub data_dir: String,
    /// Path of the session-affinity file.
    pub session_path: String,
}

fn parse_dotenv() -> HashMap<String, String> {
    let mut map = HashMap::new();
    let Ok(contents) = std::fs::read_to_string(".env") else {
        return map;
    };
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            map.insert(k.trim().to_string(), v.trim().to_string());
        }
    }
    map
}

fn get(key: &str, dotenv: &HashMap<String, String>) -> Option<String> {
    std::env::var(key).ok().or_else(|| dotenv.get(key).cloned())
}

fn get_str(key: &str, dotenv: &HashMap<String, String>, default: &str) -> String {
    get(key, dotenv).unwrap_or_else(|| default.to_string())
}

fn get_bool(key: &str, dotenv: &HashMap<String, String>, default: bool) -> bool {
    match get(key, dotenv).as_deref() {
        Some("true") | Some("1") => true,
        Some("false") | Some("0") => false,
        Some(_) => default,
        None => default,
    }
}

fn get_u32(key: &str, dotenv: &HashMap<String, String>, default: u32) -> u32 {
    get(key, dotenv)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn get_u64(key: &str, dotenv: &HashMap<String, String>, default: u64) -> u64 {
    get(key, dotenv)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn get_usize(key: &str, dotenv: &HashMap<String, String>, default: usize) -> usize {
    get(key, dotenv)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parse the ordered backend chain from its compact env form:
///
/// `name:model:max_attempts:base_delay_ms|name:model:...`
///
/// Trailing fields may be omitted per entry; rank is the position in the
/// list. Unknown garbage entries are skipped rather than failing startup.
pub fn parse_backend_chain(raw: &str) -> Vec<BackendSpec> {
    let mut chain = Vec::new();
    for (idx, entry) in raw.split('|').enumerate() {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let parts: Vec<&str> = entry.splitn(4, ':').collect();
        let name = parts[0].trim().to_string();
        if name.is_empty() {
            continue;
        }
        let model = parts.get(1).copied().unwrap_or("").trim().to_string();
        let max_attempts = parts
            .get(2)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(3u32)
            .max(1);
        let base_delay_ms = parts
            .get(3)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(2_000u64);
        chain.push(BackendSpec {
            name,
            rank: idx as i64,
            model,
            max_attempts,
            base_delay_ms,
        });
    }
    chain.sort_by_key(|b| b.rank);
    chain
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let dotenv = parse_dotenv();

        let repo = get_str("MENDBOT_REPO", &dotenv, "");
        if repo.is_empty() || !repo.contains('/') {
            bail!("MENDBOT_REPO must be set to an owner/name slug");
        }

        let backends = parse_backend_chain(&get_str(
            "BACKEND_CHAIN",
            &dotenv,
            "claude:claude-sonnet-4-6:3:2000|codex:o4-mini:2:2000",
        ));

        let data_dir = get_str("DATA_DIR", &dotenv, "store");
        let default_session_path = format!("{data_dir}/session.json");

        Ok(Config {
            repo,
            github_token: get_str("GITHUB_TOKEN", &dotenv, ""),
            api_base_url: get_str("GITHUB_API_URL", &dotenv, "https://api.github.com"),
            marker_name: get_str("MARKER_NAME", &dotenv, "mendbot-working"),
            lock_max_retries: get_u32("LOCK_MAX_RETRIES", &dotenv, 3),
            lock_retry_delay_ms: get_u64("LOCK_RETRY_DELAY_MS", &dotenv, 1_000),
            dry_run: get_bool("DRY_RUN", &dotenv, false),
            markers_disabled: get_bool("MARKERS_DISABLED", &dotenv, false),
            worker_count: get_usize("WORKER_COUNT", &dotenv, 3).max(1),
            poll_interval_s: get_u64("POLL_INTERVAL_S", &dotenv, 60).max(1),
            shutdown_grace_s: get_u64("SHUTDOWN_GRACE_S", &dotenv, 30),
            backends,
            backend_timeout_s: get_u64("BACKEND_TIMEOUT_S", &dotenv, 1_800),
            session_path: get_str("SESSION_PATH", &dotenv, &default_session_path),
            data_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_parses_full_entries() {
        let chain = parse_backend_chain("claude:sonnet:3:2000|codex:o4-mini:2:500");
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].name, "claude");
        assert_eq!(chain[0].model, "sonnet");
        assert_eq!(chain[0].max_attempts, 3);
        assert_eq!(chain[0].base_delay_ms, 2000);
        assert_eq!(chain[1].name, "codex");
        assert_eq!(chain[1].rank, 1);
    }

    #[test]
    fn chain_fills_defaults_and_skips_blanks() {
        let chain = parse_backend_chain("claude||codex:o4-mini");
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].max_attempts, 3);
        assert_eq!(chain[0].base_delay_ms, 2000);
        assert_eq!(chain[1].model, "o4-mini");
    }

    #[test]
    fn chain_empty_input_is_empty() {
        assert!(parse_backend_chain("").is_empty());
        assert!(parse_backend_chain(" | | ").is_empty());
    }

    #[test]
    fn chain_clamps_zero_attempts() {
        let chain = parse_backend_chain("claude:m:0:100");
        assert_eq!(chain[0].max_attempts, 1);
    }
}
