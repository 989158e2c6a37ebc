//! Document ingestion: split, embed, upsert.
//!
//! The pipeline treats one document as a best-effort unit. Embedding runs as
//! a single batched call before anything touches the index, so an embedding
//! failure aborts with no partial writes. It has no session-store side
//! effects; the caller registers the session only after ingestion succeeds.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use greenroom_core::error::Result;
use greenroom_core::types::{system_clock, ChunkPayload, Clock};

use crate::embedding::DynEmbeddingService;
use crate::index::{ChunkPoint, VectorStore};
use crate::splitter::ChunkSplitter;

/// Receipt summarizing one successful ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReceipt {
    /// Number of chunks written to the index.
    pub chunk_count: usize,
}

/// Splits a document, embeds every chunk in one order-preserving batch, and
/// writes the tagged points to the vector store.
pub struct IngestionPipeline {
    splitter: ChunkSplitter,
    embedding: Arc<dyn DynEmbeddingService>,
    store: Arc<dyn VectorStore>,
    collection: String,
    clock: Clock,
}

impl IngestionPipeline {
    /// Create a pipeline writing to the given collection.
    pub fn new(
        splitter: ChunkSplitter,
        embedding: Arc<dyn DynEmbeddingService>,
        store: Arc<dyn VectorStore>,
        collection: &str,
    ) -> Self {
        Self {
            splitter,
            embedding,
            store,
            collection: collection.to_string(),
            clock: system_clock(),
        }
    }

    /// Replace the time source, for tests that pin chunk timestamps.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Ingest a document under the given session id.
    ///
    /// Chunk ids are `"{session_id}_{seq}"` in split order and every point
    /// carries the same creation timestamp. A document that yields no chunks
    /// is a no-op with a zero-count receipt, not an error.
    pub async fn ingest(&self, session_id: &str, text: &str) -> Result<IngestReceipt> {
        let chunks = self.splitter.split(text);
        if chunks.is_empty() {
            debug!(session_id, "document produced no chunks");
            return Ok(IngestReceipt { chunk_count: 0 });
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedding.embed_batch_boxed(&texts).await?;

        self.store
            .ensure_collection(&self.collection, self.embedding.dimensions())
            .await?;

        let now = (self.clock)();
        let points: Vec<ChunkPoint> = texts
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(seq, (text, vector))| ChunkPoint {
                id: Uuid::new_v4(),
                vector,
                payload: ChunkPayload::new(text, session_id, seq, now),
            })
            .collect();
        let chunk_count = points.len();

        self.store.upsert(&self.collection, points).await?;

        info!(session_id, chunks = chunk_count, "ingested document");
        Ok(IngestReceipt { chunk_count })
    }

    /// The collection this pipeline writes to.
    pub fn collection(&self) -> &str {
        &self.collection
    }
}
