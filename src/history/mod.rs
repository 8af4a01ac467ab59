//! Exchange history: the persisted record of every answered question.
//!
//! [`HistoryStore`] is the backend seam (SQLite on the server, HTTP on a
//! device, in-memory for tests). [`HistoryAdapter`] layers the client-facing
//! policy on top: fire-and-forget appends that only ever produce a
//! [`SaveStatus`], and listings that recover from a missing creation-time
//! index by fetching everything and sorting locally.

pub mod http;
pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use self::http::HttpHistoryStore;
pub use self::memory::InMemoryHistoryStore;
pub use self::sqlite::SqliteHistoryStore;

/// One persisted question/answer exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exchange {
    /// Store-assigned identifier (`None` until appended).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Candidate background in effect when the question was answered.
    pub job_context: String,
    /// Transcript that was sent for answering.
    pub transcript: String,
    /// Generated answer as displayed.
    pub answer: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Exchange {
    /// Create an unsaved exchange stamped with the current time.
    pub fn new(
        job_context: impl Into<String>,
        transcript: impl Into<String>,
        answer: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            job_context: job_context.into(),
            transcript: transcript.into(),
            answer: answer.into(),
            created_at: Utc::now(),
        }
    }
}

/// Backend failures, classified the way callers need to react to them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The backend refused the operation for access-control reasons.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// An ordered query needs an index the backend does not have.
    #[error("index not defined: {0}")]
    MissingIndex(String),

    /// Any other backend failure.
    #[error("{0}")]
    Backend(String),
}

impl StoreError {
    /// Stable error code, also used on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            Self::PermissionDenied(_) => "PERMISSION_DENIED",
            Self::MissingIndex(_) => "MISSING_INDEX",
            Self::Backend(_) => "STORE_FAILED",
        }
    }
}

/// Append-only exchange storage.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append an exchange and return its assigned identifier.
    ///
    /// No deduplication: identical exchanges produce distinct records.
    async fn append(&self, exchange: Exchange) -> Result<String, StoreError>;

    /// Up to `limit` most recent exchanges via the creation-time index.
    async fn query_recent(&self, limit: usize) -> Result<Vec<Exchange>, StoreError>;

    /// Every stored exchange, in no particular order.
    async fn fetch_all(&self) -> Result<Vec<Exchange>, StoreError>;
}

/// Outcome of a history write, as shown in the save-status indicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveStatus {
    /// Write in progress.
    Saving,
    /// Write acknowledged.
    Saved,
    /// Backend refused the write.
    PermissionDenied,
    /// Any other failure.
    Failed(String),
}

impl SaveStatus {
    /// Short operator-facing label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Saving => "💾 Saving...",
            Self::Saved => "✅ Saved!",
            Self::PermissionDenied => "⚠️ Permission denied",
            Self::Failed(_) => "⚠️ Save failed",
        }
    }
}

/// Non-fatal problem encountered while listing history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListIssue {
    /// Served from the unindexed fallback; results are still correct.
    MissingIndex,
    /// The backend refused the read.
    PermissionDenied,
    /// The unindexed fallback failed too.
    FallbackFailed,
    /// Any other failure.
    Failed(String),
}

impl ListIssue {
    /// Operator-facing message.
    pub fn message(&self) -> String {
        match self {
            Self::MissingIndex => {
                "Index not defined. Add a createdAt index to the history store.".to_owned()
            }
            Self::PermissionDenied => "Permission denied. Check database rules.".to_owned(),
            Self::FallbackFailed => "Failed to load chat history.".to_owned(),
            Self::Failed(msg) => format!("Failed to load: {msg}"),
        }
    }
}

/// Result of [`HistoryAdapter::list`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryListing {
    /// Exchanges, newest first.
    pub exchanges: Vec<Exchange>,
    /// Warning or failure to surface alongside (or instead of) the results.
    pub issue: Option<ListIssue>,
}

/// Client-side history policy over any [`HistoryStore`].
#[derive(Clone)]
pub struct HistoryAdapter {
    store: Arc<dyn HistoryStore>,
}

impl std::fmt::Debug for HistoryAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryAdapter").finish_non_exhaustive()
    }
}

/// Default number of exchanges returned by [`HistoryAdapter::list`].
pub const DEFAULT_LIST_LIMIT: usize = 50;

impl HistoryAdapter {
    /// Wrap a backend.
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self { store }
    }

    /// Underlying backend.
    pub fn store(&self) -> &Arc<dyn HistoryStore> {
        &self.store
    }

    /// Write an exchange once; never retries and never returns an error.
    pub async fn append(&self, exchange: Exchange) -> SaveStatus {
        match self.store.append(exchange).await {
            Ok(id) => {
                debug!(id = id.as_str(), "exchange saved");
                SaveStatus::Saved
            }
            Err(StoreError::PermissionDenied(msg)) => {
                warn!(error = msg.as_str(), "history write refused");
                SaveStatus::PermissionDenied
            }
            Err(e) => {
                warn!(error = %e, "history write failed");
                SaveStatus::Failed(e.to_string())
            }
        }
    }

    /// Fetch up to `limit` most recent exchanges, newest first.
    ///
    /// A missing index is recovered by fetching the whole collection and
    /// sorting locally; the listing then carries [`ListIssue::MissingIndex`].
    pub async fn list(&self, limit: usize) -> HistoryListing {
        match self.store.query_recent(limit).await {
            Ok(exchanges) => HistoryListing {
                exchanges: newest_first(exchanges, limit),
                issue: None,
            },
            Err(StoreError::PermissionDenied(msg)) => {
                warn!(error = msg.as_str(), "history read refused");
                HistoryListing {
                    exchanges: Vec::new(),
                    issue: Some(ListIssue::PermissionDenied),
                }
            }
            Err(StoreError::MissingIndex(msg)) => {
                warn!(error = msg.as_str(), "history index missing, fetching unordered");
                match self.store.fetch_all().await {
                    Ok(all) => HistoryListing {
                        exchanges: newest_first(all, limit),
                        issue: Some(ListIssue::MissingIndex),
                    },
                    Err(e) => {
                        warn!(error = %e, "unordered history fetch failed");
                        HistoryListing {
                            exchanges: Vec::new(),
                            issue: Some(ListIssue::FallbackFailed),
                        }
                    }
                }
            }
            Err(StoreError::Backend(msg)) => {
                warn!(error = msg.as_str(), "history read failed");
                HistoryListing {
                    exchanges: Vec::new(),
                    issue: Some(ListIssue::Failed(msg)),
                }
            }
        }
    }
}

/// Sort by creation time descending and keep the first `limit`.
pub fn newest_first(mut exchanges: Vec<Exchange>, limit: usize) -> Vec<Exchange> {
    exchanges.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    exchanges.truncate(limit);
    exchanges
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use chrono::Duration;

    fn at(offset_secs: i64, label: &str) -> Exchange {
        let mut ex = Exchange::new("ctx", label, format!("answer {label}"));
        ex.created_at = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
            + Duration::seconds(offset_secs);
        ex
    }

    struct FailingStore(StoreError);

    #[async_trait]
    impl HistoryStore for FailingStore {
        async fn append(&self, _exchange: Exchange) -> Result<String, StoreError> {
            Err(self.0.clone())
        }
        async fn query_recent(&self, _limit: usize) -> Result<Vec<Exchange>, StoreError> {
            Err(self.0.clone())
        }
        async fn fetch_all(&self) -> Result<Vec<Exchange>, StoreError> {
            Err(self.0.clone())
        }
    }

    #[test]
    fn exchange_wire_format_is_camel_case() {
        let ex = at(0, "q");
        let json = serde_json::to_value(&ex).unwrap();
        assert!(json.get("jobContext").is_some());
        assert!(json.get("createdAt").is_some());
        assert!(json.get("id").is_none());
    }

    #[test]
    fn newest_first_sorts_and_truncates() {
        let sorted = newest_first(vec![at(1, "b"), at(3, "d"), at(0, "a"), at(2, "c")], 3);
        let labels: Vec<_> = sorted.iter().map(|e| e.transcript.as_str()).collect();
        assert_eq!(labels, vec!["d", "c", "b"]);
    }

    #[tokio::test]
    async fn listing_is_sorted_on_indexed_path() {
        let store = Arc::new(InMemoryHistoryStore::new());
        for ex in [at(5, "e"), at(1, "a"), at(3, "c")] {
            store.append(ex).await.unwrap();
        }
        let listing = HistoryAdapter::new(store).list(10).await;
        assert!(listing.issue.is_none());
        let labels: Vec<_> = listing.exchanges.iter().map(|e| e.transcript.as_str()).collect();
        assert_eq!(labels, vec!["e", "c", "a"]);
    }

    #[tokio::test]
    async fn missing_index_falls_back_sorted_with_warning() {
        let store = Arc::new(InMemoryHistoryStore::without_index());
        for ex in [at(2, "b"), at(9, "z"), at(4, "d"), at(0, "a")] {
            store.append(ex).await.unwrap();
        }
        let listing = HistoryAdapter::new(store).list(3).await;
        assert_eq!(listing.issue, Some(ListIssue::MissingIndex));
        let labels: Vec<_> = listing.exchanges.iter().map(|e| e.transcript.as_str()).collect();
        assert_eq!(labels, vec!["z", "d", "b"]);
    }

    #[tokio::test]
    async fn permission_denied_listing() {
        let adapter = HistoryAdapter::new(Arc::new(FailingStore(StoreError::PermissionDenied(
            "rules".into(),
        ))));
        let listing = adapter.list(DEFAULT_LIST_LIMIT).await;
        assert!(listing.exchanges.is_empty());
        assert_eq!(listing.issue, Some(ListIssue::PermissionDenied));
        assert!(listing.issue.unwrap().message().contains("Permission denied"));
    }

    #[tokio::test]
    async fn missing_index_with_failing_fallback() {
        let adapter =
            HistoryAdapter::new(Arc::new(FailingStore(StoreError::MissingIndex("x".into()))));
        let listing = adapter.list(5).await;
        assert_eq!(listing.issue, Some(ListIssue::FallbackFailed));
    }

    #[tokio::test]
    async fn generic_listing_failure_carries_message() {
        let adapter = HistoryAdapter::new(Arc::new(FailingStore(StoreError::Backend(
            "disk on fire".into(),
        ))));
        let issue = adapter.list(5).await.issue.unwrap();
        assert_eq!(issue.message(), "Failed to load: disk on fire");
    }

    #[tokio::test]
    async fn append_statuses_distinguish_permission() {
        let denied = HistoryAdapter::new(Arc::new(FailingStore(StoreError::PermissionDenied(
            "ro".into(),
        ))));
        assert_eq!(denied.append(at(0, "a")).await, SaveStatus::PermissionDenied);

        let broken = HistoryAdapter::new(Arc::new(FailingStore(StoreError::Backend("io".into()))));
        let status = broken.append(at(0, "a")).await;
        assert_eq!(status, SaveStatus::Failed("io".into()));
        assert_eq!(status.label(), "⚠️ Save failed");
    }

    #[tokio::test]
    async fn identical_appends_create_distinct_records() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let adapter = HistoryAdapter::new(store.clone());
        let ex = at(0, "same");
        assert_eq!(adapter.append(ex.clone()).await, SaveStatus::Saved);
        assert_eq!(adapter.append(ex).await, SaveStatus::Saved);

        let all = store.fetch_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_ne!(all[0].id, all[1].id);
    }
}
