//! Vector store abstraction and the in-process index implementation.
//!
//! The trait covers the five operations the engine needs: collection setup,
//! upsert, filtered similarity search with diversity re-ranking, scroll-style
//! enumeration, and bulk delete by session. [`MemoryIndex`] is the in-process
//! implementation used by tests and local runs; the remote implementation
//! lives in [`crate::qdrant`].

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use greenroom_core::error::{GreenroomError, Result};
use greenroom_core::types::ChunkPayload;

/// A vector plus payload ready for insertion.
#[derive(Debug, Clone)]
pub struct ChunkPoint {
    /// Point id, fresh per chunk, never reused.
    pub id: Uuid,
    /// Embedding vector, must match the collection dimension.
    pub vector: Vec<f32>,
    /// Chunk payload stored alongside the vector.
    pub payload: ChunkPayload,
}

/// Parameters for one filtered similarity search.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    /// Query embedding.
    pub vector: Vec<f32>,
    /// Only chunks belonging to this session are considered.
    pub session_id: String,
    /// Number of results to return.
    pub k: usize,
    /// Over-fetch pool size for diversity re-ranking.
    pub fetch_k: usize,
    /// Relevance/diversity trade-off: 1.0 is pure relevance, 0.0 pure
    /// diversity.
    pub diversity_weight: f32,
}

/// A chunk returned from search, with its query similarity.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    /// Parsed chunk payload.
    pub payload: ChunkPayload,
    /// Cosine similarity to the query vector.
    pub score: f32,
}

/// A raw point returned from enumeration.
///
/// Both fields stay loosely typed so callers can decide how to treat records
/// that do not parse (the reaper counts and skips them). The id is the
/// backend's rendering, which for foreign data may not be a UUID.
#[derive(Debug, Clone)]
pub struct ScrollPoint {
    /// Point id as rendered by the backend.
    pub id: String,
    /// Raw payload JSON.
    pub payload: Value,
}

/// Opaque continuation token for scroll pagination.
///
/// Produced by one `scroll` call and consumed by the next; callers never
/// inspect the inner value.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollToken(pub Value);

/// Storage backend for indexed chunks.
///
/// Implementations must be safe to share across tasks. Search applies the
/// "fetch broad, rank diverse" policy: gather a `fetch_k` candidate pool,
/// then select `k` results by max-marginal-relevance.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection with cosine distance if it does not exist.
    ///
    /// An existing collection is reused, but its dimension is revalidated and
    /// a mismatch is an error.
    async fn ensure_collection(&self, name: &str, dim: usize) -> Result<()>;

    /// Insert or replace points by id.
    async fn upsert(&self, collection: &str, points: Vec<ChunkPoint>) -> Result<()>;

    /// Filtered similarity search with diversity re-ranking.
    async fn search(&self, collection: &str, query: SearchQuery) -> Result<Vec<ScoredChunk>>;

    /// Enumerate points one page at a time.
    ///
    /// Pass the token from the previous page to continue; a `None` next-token
    /// means the enumeration is complete.
    async fn scroll(
        &self,
        collection: &str,
        page_size: usize,
        token: Option<ScrollToken>,
    ) -> Result<(Vec<ScrollPoint>, Option<ScrollToken>)>;

    /// Delete every point belonging to the session.
    ///
    /// Deleting from a collection that does not exist is a no-op.
    async fn delete_by_session(&self, collection: &str, session_id: &str) -> Result<()>;
}

// ============================================================================
// Similarity and re-ranking
// ============================================================================

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

/// Max-marginal-relevance selection over a candidate pool.
///
/// `query_scores[i]` is the i-th candidate's similarity to the query and
/// `vectors[i]` its embedding. Greedily picks `k` candidates maximizing
/// `lambda * query_score - (1 - lambda) * max_similarity_to_selected`.
/// Returns indices into the pool in selection order.
pub fn mmr_select(query_scores: &[f32], vectors: &[Vec<f32>], k: usize, lambda: f32) -> Vec<usize> {
    let n = vectors.len();
    let mut selected: Vec<usize> = Vec::with_capacity(k.min(n));
    let mut remaining: Vec<usize> = (0..n).collect();

    while selected.len() < k && !remaining.is_empty() {
        let mut best_pos = 0;
        let mut best_value = f32::NEG_INFINITY;

        for (pos, &i) in remaining.iter().enumerate() {
            let redundancy = selected
                .iter()
                .map(|&j| cosine_similarity(&vectors[i], &vectors[j]))
                .fold(f32::NEG_INFINITY, f32::max);
            let redundancy = if redundancy == f32::NEG_INFINITY {
                0.0
            } else {
                redundancy
            };
            let value = lambda * query_scores[i] - (1.0 - lambda) * redundancy;
            if value > best_value {
                best_value = value;
                best_pos = pos;
            }
        }

        selected.push(remaining.swap_remove(best_pos));
    }

    selected
}

// ============================================================================
// In-process index
// ============================================================================

/// In-memory vector index using brute-force cosine similarity.
///
/// Thread-safe via interior RwLock, cheap to clone. Payloads are stored as
/// raw JSON exactly like the remote backend, so parse behavior is identical
/// across implementations.
#[derive(Debug, Clone)]
pub struct MemoryIndex {
    collections: Arc<RwLock<HashMap<String, MemoryCollection>>>,
}

#[derive(Debug)]
struct MemoryCollection {
    dim: usize,
    // Insertion order is preserved so scroll pagination is stable.
    points: Vec<StoredPoint>,
}

#[derive(Debug, Clone)]
struct StoredPoint {
    id: Uuid,
    vector: Vec<f32>,
    payload: Value,
}

impl MemoryIndex {
    /// Create a new empty index.
    pub fn new() -> Self {
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of points in a collection, 0 if the collection does not exist.
    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .map(|c| c.get(collection).map(|col| col.points.len()).unwrap_or(0))
            .unwrap_or(0)
    }

    #[cfg(test)]
    pub(crate) fn insert_raw(&self, collection: &str, id: Uuid, vector: Vec<f32>, payload: Value) {
        let mut collections = self.collections.write().unwrap();
        let col = collections
            .entry(collection.to_string())
            .or_insert_with(|| MemoryCollection {
                dim: vector.len(),
                points: Vec::new(),
            });
        col.points.push(StoredPoint {
            id,
            vector,
            payload,
        });
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for MemoryIndex {
    async fn ensure_collection(&self, name: &str, dim: usize) -> Result<()> {
        let mut collections = self
            .collections
            .write()
            .map_err(|e| GreenroomError::Index(format!("Lock poisoned: {}", e)))?;

        match collections.get(name) {
            Some(existing) if existing.dim != dim => Err(GreenroomError::Index(format!(
                "collection {} exists with dimension {}, requested {}",
                name, existing.dim, dim
            ))),
            Some(_) => Ok(()),
            None => {
                collections.insert(
                    name.to_string(),
                    MemoryCollection {
                        dim,
                        points: Vec::new(),
                    },
                );
                Ok(())
            }
        }
    }

    async fn upsert(&self, collection: &str, points: Vec<ChunkPoint>) -> Result<()> {
        let mut collections = self
            .collections
            .write()
            .map_err(|e| GreenroomError::Index(format!("Lock poisoned: {}", e)))?;

        let col = collections
            .get_mut(collection)
            .ok_or_else(|| GreenroomError::Index(format!("unknown collection {}", collection)))?;

        for point in points {
            if point.vector.len() != col.dim {
                return Err(GreenroomError::Index(format!(
                    "vector dimension {} does not match collection dimension {}",
                    point.vector.len(),
                    col.dim
                )));
            }
            let payload = serde_json::to_value(&point.payload)
                .map_err(|e| GreenroomError::Index(format!("payload serialization: {}", e)))?;
            let stored = StoredPoint {
                id: point.id,
                vector: point.vector,
                payload,
            };
            match col.points.iter_mut().find(|p| p.id == stored.id) {
                Some(existing) => *existing = stored,
                None => col.points.push(stored),
            }
        }

        Ok(())
    }

    async fn search(&self, collection: &str, query: SearchQuery) -> Result<Vec<ScoredChunk>> {
        let collections = self
            .collections
            .read()
            .map_err(|e| GreenroomError::Index(format!("Lock poisoned: {}", e)))?;

        let col = collections
            .get(collection)
            .ok_or_else(|| GreenroomError::Index(format!("unknown collection {}", collection)))?;

        if query.vector.len() != col.dim {
            return Err(GreenroomError::Index(format!(
                "query dimension {} does not match collection dimension {}",
                query.vector.len(),
                col.dim
            )));
        }

        // Candidate pool: this session's points, best-first, capped at fetch_k.
        let mut pool: Vec<(&StoredPoint, f32)> = col
            .points
            .iter()
            .filter(|p| {
                p.payload.get("session_id").and_then(Value::as_str)
                    == Some(query.session_id.as_str())
            })
            .map(|p| (p, cosine_similarity(&query.vector, &p.vector)))
            .collect();
        pool.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        pool.truncate(query.fetch_k.max(query.k));

        let scores: Vec<f32> = pool.iter().map(|(_, s)| *s).collect();
        let vectors: Vec<Vec<f32>> = pool.iter().map(|(p, _)| p.vector.clone()).collect();
        let picked = mmr_select(&scores, &vectors, query.k, query.diversity_weight);

        let mut hits = Vec::with_capacity(picked.len());
        for i in picked {
            let (point, score) = &pool[i];
            match serde_json::from_value::<ChunkPayload>(point.payload.clone()) {
                Ok(payload) => hits.push(ScoredChunk {
                    payload,
                    score: *score,
                }),
                Err(e) => {
                    debug!(point_id = %point.id, "skipping unparsable payload in search: {}", e);
                }
            }
        }

        Ok(hits)
    }

    async fn scroll(
        &self,
        collection: &str,
        page_size: usize,
        token: Option<ScrollToken>,
    ) -> Result<(Vec<ScrollPoint>, Option<ScrollToken>)> {
        let collections = self
            .collections
            .read()
            .map_err(|e| GreenroomError::Index(format!("Lock poisoned: {}", e)))?;

        let col = collections
            .get(collection)
            .ok_or_else(|| GreenroomError::Index(format!("unknown collection {}", collection)))?;

        let offset = match token {
            None => 0,
            Some(ScrollToken(value)) => value
                .as_u64()
                .ok_or_else(|| GreenroomError::Index("invalid scroll token".to_string()))?
                as usize,
        };

        let end = (offset + page_size).min(col.points.len());
        let page: Vec<ScrollPoint> = col.points[offset.min(end)..end]
            .iter()
            .map(|p| ScrollPoint {
                id: p.id.to_string(),
                payload: p.payload.clone(),
            })
            .collect();

        let next = if end < col.points.len() {
            Some(ScrollToken(Value::from(end as u64)))
        } else {
            None
        };

        Ok((page, next))
    }

    async fn delete_by_session(&self, collection: &str, session_id: &str) -> Result<()> {
        let mut collections = self
            .collections
            .write()
            .map_err(|e| GreenroomError::Index(format!("Lock poisoned: {}", e)))?;

        if let Some(col) = collections.get_mut(collection) {
            col.points.retain(|p| {
                p.payload.get("session_id").and_then(Value::as_str) != Some(session_id)
            });
        }

        Ok(())
    }
}
