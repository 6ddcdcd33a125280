use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::types::{Candidate, ItemId, ItemKind};

// ── Capability trait ─────────────────────────────────────────────────────

/// Remote item-store capability: discovery plus marker mutation.
///
/// `try_add_marker`'s boolean return is authoritative: `true` means this
/// caller now holds the marker, `false` means another holder already has
/// it. Callers must never infer ownership from a separate existence check.
#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn list_open_items(&self) -> Result<Vec<Candidate>>;

    /// Add `name` to the item's marker set. Returns `false` when the
    /// marker was already present (held by another caller).
    async fn try_add_marker(&self, item: ItemId, name: &str) -> Result<bool>;

    async fn remove_marker(&self, item: ItemId, name: &str) -> Result<()>;

    /// Read-only existence check, for diagnostics only.
    async fn has_marker(&self, item: ItemId, name: &str) -> Result<bool>;
}

// ── Priority derivation ──────────────────────────────────────────────────

/// Map item metadata to a scheduling priority (larger wins).
///
/// Draft change requests are demoted below everything else; items untouched
/// for 30 days get a small bump so routine work is not starved forever.
pub fn derive_priority(labels: &[String], draft: bool, updated_at: DateTime<Utc>) -> i64 {
    if draft {
        return 1;
    }
    let has = |needle: &str| labels.iter().any(|l| l.eq_ignore_ascii_case(needle));
    let mut priority = if has("breaking-change") || has("urgent") || has("critical") {
        10
    } else if has("priority:high") || has("high-priority") {
        8
    } else if has("bug") {
        5
    } else {
        2
    };
    if Utc::now() - updated_at > Duration::days(30) {
        priority += 1;
    }
    priority
}

// ── GitHub REST implementation ───────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GhLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GhIssue {
    number: i64,
    title: String,
    #[serde(default)]
    labels: Vec<GhLabel>,
    /// Present (possibly empty) exactly when the item is a pull request.
    pull_request: Option<serde_json::Value>,
    #[serde(default)]
    draft: Option<bool>,
    updated_at: DateTime<Utc>,
}

/// Item store backed by the GitHub REST API, using issue labels as the
/// marker set.
///
/// The label API has no compare-and-set, so `try_add_marker` is a check
/// followed by an add. The window between the two is the best-effort gap
/// the advisory lock protocol already accepts.
pub struct GithubStore {
    client: reqwest::Client,
    base_url: String,
    repo: String,
    token: String,
}

impl GithubStore {
    pub fn new(base_url: impl Into<String>, repo: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("mendbot")
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            repo: repo.into(),
            token: token.into(),
        })
    }

    fn url(&self, tail: &str) -> String {
        format!("{}/repos/{}/{}", self.base_url.trim_end_matches('/'), self.repo, tail)
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let req = req.header("Accept", "application/vnd.github+json");
        if self.token.is_empty() {
            req
        } else {
            req.bearer_auth(&self.token)
        }
    }

    async fn item_labels(&self, item: ItemId) -> Result<Vec<String>> {
        let url = self.url(&format!("issues/{}/labels", item.number));
        let resp = self
            .authed(self.client.get(&url))
            .send()
            .await
            .with_context(|| format!("list labels for {item}"))?;
        if !resp.status().is_success() {
            bail!("list labels for {item}: HTTP {}", resp.status());
        }
        let labels: Vec<GhLabel> = resp.json().await.context("decode label list")?;
        Ok(labels.into_iter().map(|l| l.name).collect())
    }
}

#[async_trait]
impl ItemStore for GithubStore {
    async fn list_open_items(&self) -> Result<Vec<Candidate>> {
        // The issues endpoint returns both issues and pull requests.
        let url = self.url("issues?state=open&per_page=100");
        let resp = self
            .authed(self.client.get(&url))
            .send()
            .await
            .context("list open items")?;
        if !resp.status().is_success() {
            bail!("list open items: HTTP {}", resp.status());
        }
        let issues: Vec<GhIssue> = resp.json().await.context("decode item list")?;

        let now = Utc::now();
        let candidates = issues
            .into_iter()
            .map(|i| {
                let kind = if i.pull_request.is_some() {
                    ItemKind::ChangeRequest
                } else {
                    ItemKind::Issue
                };
                let labels: Vec<String> = i.labels.into_iter().map(|l| l.name).collect();
                Candidate {
                    id: ItemId { kind, number: i.number },
                    priority: derive_priority(&labels, i.draft.unwrap_or(false), i.updated_at),
                    title: i.title,
                    discovered_at: now,
                }
            })
            .collect();
        Ok(candidates)
    }

    async fn try_add_marker(&self, item: ItemId, name: &str) -> Result<bool> {
        if self.item_labels(item).await?.iter().any(|l| l == name) {
            debug!(item = %item, marker = name, "marker already held");
            return Ok(false);
        }
        let url = self.url(&format!("issues/{}/labels", item.number));
        let resp = self
            .authed(self.client.post(&url))
            .json(&serde_json::json!({ "labels": [name] }))
            .send()
            .await
            .with_context(|| format!("add marker to {item}"))?;
        if !resp.status().is_success() {
            bail!("add marker to {item}: HTTP {}", resp.status());
        }
        Ok(true)
    }

    async fn remove_marker(&self, item: ItemId, name: &str) -> Result<()> {
        let url = self.url(&format!("issues/{}/labels/{}", item.number, name));
        let resp = self
            .authed(self.client.delete(&url))
            .send()
            .await
            .with_context(|| format!("remove marker from {item}"))?;
        // 404 means the marker is already gone; that is fine on release.
        if !resp.status().is_success() && resp.status() != reqwest::StatusCode::NOT_FOUND {
            bail!("remove marker from {item}: HTTP {}", resp.status());
        }
        Ok(())
    }

    async fn has_marker(&self, item: ItemId, name: &str) -> Result<bool> {
        Ok(self.item_labels(item).await?.iter().any(|l| l == name))
    }
}
