use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use mendbot_agent::{ClaudeBackend, CodexBackend};
use mendbot_core::{
    backend::FixBackend,
    config::Config,
    lock::{ItemLock, LockOptions},
    router::{BackendRouter, RankedBackend},
    scheduler::{Scheduler, SchedulerConfig},
    session::SessionStore,
    store::{GithubStore, ItemStore},
};
use tokio::sync::watch;
use tracing::{info, warn};

/// Map a configured backend spec onto its implementation. Unknown names
/// are skipped with a warning so a typo in the chain does not take the
/// whole daemon down.
fn build_chain(config: &Config) -> Vec<RankedBackend> {
    let mut chain = Vec::new();
    for spec in &config.backends {
        let backend: Arc<dyn FixBackend> = match spec.name.as_str() {
            "claude" => Arc::new(
                ClaudeBackend::new("claude", &spec.model).with_timeout(config.backend_timeout_s),
            ),
            "codex" => {
                let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
                Arc::new(
                    CodexBackend::new(api_key, &spec.model).with_timeout(config.backend_timeout_s),
                )
            }
            other => {
                warn!("unknown backend '{other}' in chain, skipping");
                continue;
            }
        };
        chain.push(RankedBackend {
            spec: spec.clone(),
            backend,
        });
    }
    chain
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mendbot=info,mendbot_core=info,mendbot_agent=info".into()),
        )
        .init();

    let config = Config::from_env()?;
    std::fs::create_dir_all(&config.data_dir)?;

    let chain = build_chain(&config);
    if chain.is_empty() {
        bail!("no usable backends configured (BACKEND_CHAIN)");
    }

    let store = Arc::new(
        GithubStore::new(&config.api_base_url, &config.repo, &config.github_token)
            .context("construct item store")?,
    );
    let session = Arc::new(SessionStore::new(&config.session_path));
    let router = Arc::new(
        BackendRouter::new(chain, Arc::clone(&session)).context("construct backend router")?,
    );
    let lock = Arc::new(ItemLock::new(
        Arc::clone(&store) as Arc<dyn ItemStore>,
        &config.marker_name,
        LockOptions {
            max_retries: config.lock_max_retries,
            retry_delay: Duration::from_millis(config.lock_retry_delay_ms),
            dry_run: config.dry_run,
            disabled: config.markers_disabled,
        },
    ));

    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&store) as Arc<dyn ItemStore>,
        lock,
        router,
        SchedulerConfig {
            worker_count: config.worker_count,
            poll_interval: Duration::from_secs(config.poll_interval_s),
            shutdown_grace: Duration::from_secs(config.shutdown_grace_s),
        },
    ));

    info!(
        repo = %config.repo,
        workers = config.worker_count,
        poll_interval_s = config.poll_interval_s,
        marker = %config.marker_name,
        dry_run = config.dry_run,
        "mendbot starting"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Periodic status line in place of a dashboard.
    {
        let scheduler = Arc::clone(&scheduler);
        let mut rx = shutdown_rx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(60)) => {}
                    _ = rx.changed() => return,
                }
                let s = scheduler.status().await;
                info!(
                    queue = s.queue_depth,
                    active = s.active,
                    skipped = s.skipped,
                    completed = s.completed,
                    failed = s.failed,
                    "scheduler status"
                );
            }
        });
    }

    let run_handle = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(scheduler.run(shutdown_rx))
    };

    tokio::signal::ctrl_c()
        .await
        .context("listen for shutdown signal")?;
    info!("shutdown signal received, draining");
    let _ = shutdown_tx.send(true);

    // run() drains in-flight workers up to the grace deadline.
    run_handle.await.context("scheduler task panicked")?;

    let s = scheduler.status().await;
    info!(
        completed = s.completed,
        failed = s.failed,
        skipped = s.skipped,
        "mendbot stopped"
    );
    Ok(())
}
