//! Expiry reaper: two-phase sweep that purges sessions with stale chunks.
//!
//! Phase one scrolls the whole collection page by page and collects the ids
//! of sessions owning at least one chunk older than the cutoff. Phase two
//! issues one bulk delete per expired session. A session with any expired
//! chunk is purged entirely, so mid-conversation re-uploads do not leave a
//! half-expired session behind.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use greenroom_core::error::{GreenroomError, Result};
use greenroom_core::types::{system_clock, Clock};

use crate::index::VectorStore;

const REAP_PAGE_SIZE: usize = 500;

/// Counters from one reap sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReapReport {
    /// Points examined across all pages.
    pub points_scanned: usize,
    /// Records skipped because session id or timestamp was unusable.
    pub malformed_skipped: usize,
    /// Distinct sessions with at least one expired chunk.
    pub sessions_expired: usize,
    /// Sessions whose bulk delete succeeded.
    pub sessions_deleted: usize,
    /// Sessions whose bulk delete failed; the rest of the sweep proceeded.
    pub failed_sessions: Vec<String>,
}

/// Batch job that reclaims index space from stale sessions.
///
/// Never touches the session store; holding no locks, it is safe to run
/// concurrently with request handling.
pub struct ExpiryReaper {
    store: Arc<dyn VectorStore>,
    collection: String,
    clock: Clock,
}

impl ExpiryReaper {
    /// Create a reaper sweeping the given collection.
    pub fn new(store: Arc<dyn VectorStore>, collection: &str) -> Self {
        Self {
            store,
            collection: collection.to_string(),
            clock: system_clock(),
        }
    }

    /// Replace the time source, for tests that pin the cutoff.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Sweep once, purging every session owning a chunk older than `max_age`.
    ///
    /// Malformed records are counted and skipped. A failed per-session
    /// deletion is recorded in the report and does not abort the sweep; a
    /// scan failure does.
    pub async fn reap(&self, max_age: Duration) -> Result<ReapReport> {
        let cutoff = (self.clock)() - max_age;
        let mut report = ReapReport::default();
        let mut expired: BTreeSet<String> = BTreeSet::new();

        // Phase 1: collect expired session ids.
        let mut token = None;
        loop {
            let (points, next) = self
                .store
                .scroll(&self.collection, REAP_PAGE_SIZE, token)
                .await?;
            report.points_scanned += points.len();

            for point in points {
                match chunk_meta(&point.payload) {
                    Ok((session_id, created_at)) => {
                        if created_at < cutoff {
                            expired.insert(session_id);
                        }
                    }
                    Err(reason) => {
                        warn!(point_id = %point.id, "skipping malformed chunk record: {}", reason);
                        report.malformed_skipped += 1;
                    }
                }
            }

            match next {
                Some(t) => token = Some(t),
                None => break,
            }
        }

        report.sessions_expired = expired.len();
        debug!(
            expired = report.sessions_expired,
            scanned = report.points_scanned,
            "collect phase complete"
        );

        // Phase 2: one bulk delete per expired session.
        for session_id in &expired {
            match self.purge_session(session_id).await {
                Ok(()) => {
                    debug!(session_id = %session_id, "purged expired session");
                    report.sessions_deleted += 1;
                }
                Err(e) => {
                    warn!("{}", e);
                    report.failed_sessions.push(session_id.clone());
                }
            }
        }

        info!(
            scanned = report.points_scanned,
            malformed = report.malformed_skipped,
            expired = report.sessions_expired,
            deleted = report.sessions_deleted,
            failed = report.failed_sessions.len(),
            "reap sweep complete"
        );
        Ok(report)
    }

    async fn purge_session(&self, session_id: &str) -> Result<()> {
        self.store
            .delete_by_session(&self.collection, session_id)
            .await
            .map_err(|e| GreenroomError::ReapDeletion {
                session_id: session_id.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Extract the session id and creation time from a raw chunk payload.
///
/// Returns the rejection reason for records the reaper cannot attribute.
fn chunk_meta(payload: &Value) -> std::result::Result<(String, DateTime<Utc>), String> {
    let session_id = payload
        .get("session_id")
        .and_then(Value::as_str)
        .ok_or_else(|| "missing session_id".to_string())?;
    let created_at = payload
        .get("created_at")
        .and_then(Value::as_str)
        .ok_or_else(|| "missing created_at".to_string())?;
    let created_at = DateTime::parse_from_rfc3339(created_at)
        .map_err(|e| format!("unparsable created_at {:?}: {}", created_at, e))?
        .with_timezone(&Utc);
    Ok((session_id.to_string(), created_at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use uuid::Uuid;

    use greenroom_core::types::ChunkPayload;

    use crate::index::{ChunkPoint, MemoryIndex, ScoredChunk, ScrollPoint, ScrollToken, SearchQuery};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn fixed_clock(at: DateTime<Utc>) -> Clock {
        Arc::new(move || at)
    }

    fn make_point(session_id: &str, seq: usize, created_at: DateTime<Utc>) -> ChunkPoint {
        ChunkPoint {
            id: Uuid::new_v4(),
            vector: vec![1.0, 0.0, 0.0, 0.0],
            payload: ChunkPayload::new(format!("text {}", seq), session_id, seq, created_at),
        }
    }

    async fn make_index(points: Vec<ChunkPoint>) -> MemoryIndex {
        let index = MemoryIndex::new();
        index.ensure_collection("chunks", 4).await.unwrap();
        index.upsert("chunks", points).await.unwrap();
        index
    }

    fn make_reaper(index: &MemoryIndex) -> ExpiryReaper {
        ExpiryReaper::new(Arc::new(index.clone()), "chunks").with_clock(fixed_clock(t0()))
    }

    // ---- sweep behavior ----

    #[tokio::test]
    async fn test_reap_purges_session_with_any_expired_chunk() {
        // Session "old" has chunks at t-40m and t-10m; "fresh" only at t-5m.
        let index = make_index(vec![
            make_point("old", 0, t0() - Duration::minutes(40)),
            make_point("old", 1, t0() - Duration::minutes(10)),
            make_point("fresh", 0, t0() - Duration::minutes(5)),
        ])
        .await;

        let report = make_reaper(&index).reap(Duration::minutes(30)).await.unwrap();

        assert_eq!(report.points_scanned, 3);
        assert_eq!(report.malformed_skipped, 0);
        assert_eq!(report.sessions_expired, 1);
        assert_eq!(report.sessions_deleted, 1);
        assert!(report.failed_sessions.is_empty());

        // The whole "old" session is gone, including its fresh chunk.
        assert_eq!(index.count("chunks"), 1);
        let (remaining, _) = index.scroll("chunks", 10, None).await.unwrap();
        assert_eq!(remaining[0].payload["session_id"], "fresh");
    }

    #[tokio::test]
    async fn test_reap_leaves_fresh_sessions_alone() {
        let index = make_index(vec![
            make_point("a", 0, t0() - Duration::minutes(29)),
            make_point("b", 0, t0() - Duration::minutes(1)),
        ])
        .await;

        let report = make_reaper(&index).reap(Duration::minutes(30)).await.unwrap();

        assert_eq!(report.sessions_expired, 0);
        assert_eq!(report.sessions_deleted, 0);
        assert_eq!(index.count("chunks"), 2);
    }

    #[tokio::test]
    async fn test_reap_counts_and_skips_malformed_records() {
        let index = make_index(vec![make_point("good", 0, t0() - Duration::minutes(1))]).await;
        index.insert_raw(
            "chunks",
            Uuid::new_v4(),
            vec![1.0, 0.0, 0.0, 0.0],
            serde_json::json!({"created_at": "2025-03-01T11:00:00Z"}),
        );
        index.insert_raw(
            "chunks",
            Uuid::new_v4(),
            vec![1.0, 0.0, 0.0, 0.0],
            serde_json::json!({"session_id": "x"}),
        );
        index.insert_raw(
            "chunks",
            Uuid::new_v4(),
            vec![1.0, 0.0, 0.0, 0.0],
            serde_json::json!({"session_id": "y", "created_at": "yesterday-ish"}),
        );

        let report = make_reaper(&index).reap(Duration::minutes(30)).await.unwrap();

        assert_eq!(report.points_scanned, 4);
        assert_eq!(report.malformed_skipped, 3);
        assert_eq!(report.sessions_expired, 0);
        // Malformed records are skipped, never deleted.
        assert_eq!(index.count("chunks"), 4);
    }

    #[tokio::test]
    async fn test_reap_pages_through_large_collections() {
        let points: Vec<ChunkPoint> = (0..1200)
            .map(|i| make_point("bulk", i, t0() - Duration::minutes(1)))
            .collect();
        let index = make_index(points).await;

        let report = make_reaper(&index).reap(Duration::minutes(30)).await.unwrap();

        assert_eq!(report.points_scanned, 1200);
        assert_eq!(report.sessions_expired, 0);
    }

    #[tokio::test]
    async fn test_reap_empty_collection() {
        let index = MemoryIndex::new();
        index.ensure_collection("chunks", 4).await.unwrap();

        let report = make_reaper(&index).reap(Duration::minutes(30)).await.unwrap();
        assert_eq!(report, ReapReport::default());
    }

    // ---- failure isolation ----

    struct FlakyStore {
        inner: MemoryIndex,
        cursed_session: String,
    }

    #[async_trait]
    impl VectorStore for FlakyStore {
        async fn ensure_collection(&self, name: &str, dim: usize) -> Result<()> {
            self.inner.ensure_collection(name, dim).await
        }

        async fn upsert(&self, collection: &str, points: Vec<ChunkPoint>) -> Result<()> {
            self.inner.upsert(collection, points).await
        }

        async fn search(&self, collection: &str, query: SearchQuery) -> Result<Vec<ScoredChunk>> {
            self.inner.search(collection, query).await
        }

        async fn scroll(
            &self,
            collection: &str,
            page_size: usize,
            token: Option<ScrollToken>,
        ) -> Result<(Vec<ScrollPoint>, Option<ScrollToken>)> {
            self.inner.scroll(collection, page_size, token).await
        }

        async fn delete_by_session(&self, collection: &str, session_id: &str) -> Result<()> {
            if session_id == self.cursed_session {
                return Err(GreenroomError::Index("delete rejected".to_string()));
            }
            self.inner.delete_by_session(collection, session_id).await
        }
    }

    #[tokio::test]
    async fn test_reap_isolates_per_session_delete_failures() {
        let inner = make_index(vec![
            make_point("cursed", 0, t0() - Duration::minutes(60)),
            make_point("doomed", 0, t0() - Duration::minutes(60)),
        ])
        .await;
        let store = FlakyStore {
            inner: inner.clone(),
            cursed_session: "cursed".to_string(),
        };
        let reaper =
            ExpiryReaper::new(Arc::new(store), "chunks").with_clock(fixed_clock(t0()));

        let report = reaper.reap(Duration::minutes(30)).await.unwrap();

        assert_eq!(report.sessions_expired, 2);
        assert_eq!(report.sessions_deleted, 1);
        assert_eq!(report.failed_sessions, vec!["cursed".to_string()]);

        // The failed session's chunks remain; the other session is gone.
        let (remaining, _) = inner.scroll("chunks", 10, None).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].payload["session_id"], "cursed");
    }

    // ---- payload parsing ----

    #[test]
    fn test_chunk_meta_valid() {
        let payload = serde_json::json!({
            "session_id": "s",
            "created_at": "2025-03-01T11:20:00+00:00",
            "text": "anything"
        });
        let (session_id, created_at) = chunk_meta(&payload).unwrap();
        assert_eq!(session_id, "s");
        assert_eq!(created_at, Utc.with_ymd_and_hms(2025, 3, 1, 11, 20, 0).unwrap());
    }

    #[test]
    fn test_chunk_meta_missing_session() {
        let payload = serde_json::json!({"created_at": "2025-03-01T11:20:00Z"});
        assert!(chunk_meta(&payload).unwrap_err().contains("session_id"));
    }

    #[test]
    fn test_chunk_meta_missing_timestamp() {
        let payload = serde_json::json!({"session_id": "s"});
        assert!(chunk_meta(&payload).unwrap_err().contains("created_at"));
    }

    #[test]
    fn test_chunk_meta_unparsable_timestamp() {
        let payload = serde_json::json!({"session_id": "s", "created_at": "last tuesday"});
        assert!(chunk_meta(&payload).unwrap_err().contains("unparsable"));
    }

    #[test]
    fn test_chunk_meta_non_string_fields() {
        let payload = serde_json::json!({"session_id": 42, "created_at": "2025-03-01T11:20:00Z"});
        assert!(chunk_meta(&payload).is_err());
    }
}
