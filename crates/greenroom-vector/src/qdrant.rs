//! HTTP client for a remote Qdrant vector index.
//!
//! Talks to the REST API directly: collection management, point upsert,
//! filtered search, scroll, and delete-by-filter. Search fetches the
//! `fetch_k` candidate pool with vectors and applies the same
//! max-marginal-relevance selection as the in-process index, so both
//! backends rank identically.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use greenroom_core::config::IndexConfig;
use greenroom_core::error::{GreenroomError, Result};
use greenroom_core::types::ChunkPayload;

use crate::index::{
    mmr_select, ChunkPoint, ScoredChunk, ScrollPoint, ScrollToken, SearchQuery, VectorStore,
};

/// Remote vector store backed by a Qdrant instance.
#[derive(Clone)]
pub struct QdrantStore {
    client: reqwest::Client,
    base_url: String,
}

impl QdrantStore {
    /// Build a client for the given Qdrant endpoint.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(GreenroomError::Config(format!(
                "index endpoint must be an http(s) URL: {}",
                endpoint
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GreenroomError::Index(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: endpoint.trim_end_matches('/').to_string(),
        })
    }

    /// Build a client from the index section of the configuration.
    pub fn from_config(config: &IndexConfig) -> Result<Self> {
        Self::new(&config.endpoint, Duration::from_secs(config.timeout_secs))
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/collections/{}", self.base_url, collection)
    }
}

async fn response_error(context: &str, resp: reqwest::Response) -> GreenroomError {
    let status = resp.status();
    let body = resp
        .text()
        .await
        .unwrap_or_else(|_| "<body unavailable>".to_string());
    GreenroomError::Index(format!("{} failed ({}): {}", context, status, body))
}

fn send_error(context: &str, err: reqwest::Error) -> GreenroomError {
    GreenroomError::Index(format!("{} failed: {}", context, err))
}

fn session_filter(session_id: &str) -> Filter {
    Filter {
        must: vec![Condition {
            key: "session_id".to_string(),
            matches: MatchValue {
                value: session_id.to_string(),
            },
        }],
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ensure_collection(&self, name: &str, dim: usize) -> Result<()> {
        let url = self.collection_url(name);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| send_error("collection info", e))?;

        if resp.status() == StatusCode::NOT_FOUND {
            let request = CreateCollectionRequest {
                vectors: VectorParams {
                    size: dim,
                    distance: "Cosine".to_string(),
                },
            };
            let resp = self
                .client
                .put(&url)
                .json(&request)
                .send()
                .await
                .map_err(|e| send_error("collection create", e))?;
            if !resp.status().is_success() {
                return Err(response_error("collection create", resp).await);
            }
            debug!(collection = name, dim, "created collection");
            return Ok(());
        }

        if !resp.status().is_success() {
            return Err(response_error("collection info", resp).await);
        }

        // Revalidate the dimension of a pre-existing collection. An
        // unrecognized info shape is tolerated; a recognized mismatch is not.
        match resp.json::<CollectionInfoResponse>().await {
            Ok(info) => {
                let size = info.result.config.params.vectors.size;
                if size != dim {
                    return Err(GreenroomError::Index(format!(
                        "collection {} exists with dimension {}, requested {}",
                        name, size, dim
                    )));
                }
                Ok(())
            }
            Err(e) => {
                warn!(collection = name, "could not read collection info: {}", e);
                Ok(())
            }
        }
    }

    async fn upsert(&self, collection: &str, points: Vec<ChunkPoint>) -> Result<()> {
        let url = format!("{}/points?wait=true", self.collection_url(collection));
        let request = UpsertRequest {
            points: points
                .into_iter()
                .map(|p| PointStruct {
                    id: p.id.to_string(),
                    vector: p.vector,
                    payload: serde_json::to_value(&p.payload)
                        .unwrap_or_else(|_| Value::Null),
                })
                .collect(),
        };

        let resp = self
            .client
            .put(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| send_error("points upsert", e))?;
        if !resp.status().is_success() {
            return Err(response_error("points upsert", resp).await);
        }
        Ok(())
    }

    async fn search(&self, collection: &str, query: SearchQuery) -> Result<Vec<ScoredChunk>> {
        let url = format!("{}/points/search", self.collection_url(collection));
        let request = SearchRequest {
            vector: query.vector,
            limit: query.fetch_k.max(query.k),
            filter: session_filter(&query.session_id),
            with_payload: true,
            with_vector: true,
        };

        let resp = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| send_error("points search", e))?;
        if !resp.status().is_success() {
            return Err(response_error("points search", resp).await);
        }
        let parsed: SearchResponse = resp
            .json()
            .await
            .map_err(|e| GreenroomError::Index(format!("search response parse: {}", e)))?;

        // Pool for MMR: score, vector, and parsed payload per candidate.
        let mut scores = Vec::new();
        let mut vectors = Vec::new();
        let mut payloads = Vec::new();
        for point in parsed.result {
            let Some(vector) = point.vector else {
                debug!("search hit without vector, skipping");
                continue;
            };
            let Some(raw) = point.payload else {
                debug!("search hit without payload, skipping");
                continue;
            };
            match serde_json::from_value::<ChunkPayload>(raw) {
                Ok(payload) => {
                    scores.push(point.score);
                    vectors.push(vector);
                    payloads.push(payload);
                }
                Err(e) => {
                    debug!("skipping unparsable payload in search: {}", e);
                }
            }
        }

        let picked = mmr_select(&scores, &vectors, query.k, query.diversity_weight);
        Ok(picked
            .into_iter()
            .map(|i| ScoredChunk {
                payload: payloads[i].clone(),
                score: scores[i],
            })
            .collect())
    }

    async fn scroll(
        &self,
        collection: &str,
        page_size: usize,
        token: Option<ScrollToken>,
    ) -> Result<(Vec<ScrollPoint>, Option<ScrollToken>)> {
        let url = format!("{}/points/scroll", self.collection_url(collection));
        let request = ScrollRequest {
            limit: page_size,
            offset: token.map(|t| t.0),
            with_payload: true,
            with_vector: false,
        };

        let resp = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| send_error("points scroll", e))?;
        if !resp.status().is_success() {
            return Err(response_error("points scroll", resp).await);
        }
        let parsed: ScrollResponse = resp
            .json()
            .await
            .map_err(|e| GreenroomError::Index(format!("scroll response parse: {}", e)))?;

        let points = parsed
            .result
            .points
            .into_iter()
            .map(|record| ScrollPoint {
                id: match record.id.as_str() {
                    Some(s) => s.to_string(),
                    None => record.id.to_string(),
                },
                payload: record.payload.unwrap_or(Value::Null),
            })
            .collect();
        let next = parsed.result.next_page_offset.map(ScrollToken);

        Ok((points, next))
    }

    async fn delete_by_session(&self, collection: &str, session_id: &str) -> Result<()> {
        let url = format!("{}/points/delete?wait=true", self.collection_url(collection));
        let request = DeleteRequest {
            filter: session_filter(session_id),
        };

        let resp = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| send_error("points delete", e))?;
        // A missing collection has nothing to delete.
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        if !resp.status().is_success() {
            return Err(response_error("points delete", resp).await);
        }
        Ok(())
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
struct CreateCollectionRequest {
    vectors: VectorParams,
}

#[derive(Serialize, Deserialize)]
struct VectorParams {
    size: usize,
    distance: String,
}

#[derive(Deserialize)]
struct CollectionInfoResponse {
    result: CollectionInfo,
}

#[derive(Deserialize)]
struct CollectionInfo {
    config: CollectionConfig,
}

#[derive(Deserialize)]
struct CollectionConfig {
    params: CollectionParams,
}

#[derive(Deserialize)]
struct CollectionParams {
    vectors: VectorParams,
}

#[derive(Serialize)]
struct UpsertRequest {
    points: Vec<PointStruct>,
}

#[derive(Serialize)]
struct PointStruct {
    id: String,
    vector: Vec<f32>,
    payload: Value,
}

#[derive(Serialize)]
struct Filter {
    must: Vec<Condition>,
}

#[derive(Serialize)]
struct Condition {
    key: String,
    #[serde(rename = "match")]
    matches: MatchValue,
}

#[derive(Serialize)]
struct MatchValue {
    value: String,
}

#[derive(Serialize)]
struct SearchRequest {
    vector: Vec<f32>,
    limit: usize,
    filter: Filter,
    with_payload: bool,
    with_vector: bool,
}

#[derive(Deserialize)]
struct SearchResponse {
    result: Vec<RemoteScoredPoint>,
}

#[derive(Deserialize)]
struct RemoteScoredPoint {
    score: f32,
    #[serde(default)]
    payload: Option<Value>,
    #[serde(default)]
    vector: Option<Vec<f32>>,
}

#[derive(Serialize)]
struct ScrollRequest {
    limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<Value>,
    with_payload: bool,
    with_vector: bool,
}

#[derive(Deserialize)]
struct ScrollResponse {
    result: ScrollResult,
}

#[derive(Deserialize)]
struct ScrollResult {
    points: Vec<ScrollRecord>,
    #[serde(default)]
    next_page_offset: Option<Value>,
}

#[derive(Deserialize)]
struct ScrollRecord {
    id: Value,
    #[serde(default)]
    payload: Option<Value>,
}

#[derive(Serialize)]
struct DeleteRequest {
    filter: Filter,
}
