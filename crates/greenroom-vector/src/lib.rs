//! Vector retrieval core for Greenroom.
//!
//! Everything between a raw document and a ranked set of session-scoped
//! chunks: the sliding-window splitter, the embedding seam, the vector store
//! abstraction with its in-process and Qdrant implementations, the ingestion
//! pipeline, and the expiry reaper.

pub mod embedding;
pub mod index;
pub mod pipeline;
pub mod qdrant;
pub mod reaper;
pub mod splitter;

pub use embedding::{DynEmbeddingService, EmbeddingService, HttpEmbedding, MockEmbedding};
pub use index::{
    ChunkPoint, MemoryIndex, ScoredChunk, ScrollPoint, ScrollToken, SearchQuery, VectorStore,
};
pub use pipeline::{IngestReceipt, IngestionPipeline};
pub use qdrant::QdrantStore;
pub use reaper::{ExpiryReaper, ReapReport};
pub use splitter::{ChunkSplitter, TextChunk};
