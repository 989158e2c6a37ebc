//! Context assembly: non-repetitive grounding for each turn.
//!
//! Retrieval finds the chunks most relevant to the current message; the
//! usage filter then drops any chunk already served up to its ceiling in
//! this session, so consecutive turns ground on fresh material. When nothing
//! fresh remains (or retrieval itself fails), the turn grounds on the full
//! source text rather than nothing.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use greenroom_core::config::RetrievalConfig;
use greenroom_core::error::{GreenroomError, Result as CoreResult};
use greenroom_vector::{DynEmbeddingService, ScoredChunk, SearchQuery, VectorStore};

use crate::error::ChatError;
use crate::store::SessionStore;

/// Outcome of running the usage filter over one candidate list.
#[derive(Clone, Debug, PartialEq)]
pub struct ContextSelection {
    /// Selected chunk texts joined by blank lines, or the fallback source text.
    pub context: String,
    /// Usage counters after this selection. Only selected chunks are counted.
    pub updated_usage: HashMap<String, u32>,
    /// False when the selection fell back to the source text.
    pub grounded: bool,
}

/// Apply the usage ceiling to ranked candidates.
///
/// Candidates are kept in retrieval order while their counter is below the
/// ceiling; each kept chunk's counter is incremented immediately, so a chunk
/// appearing twice in one candidate list is capped within the batch too.
/// Skipped chunks are never counted. If nothing survives, the whole
/// `source_text` becomes the context and the counters are left as they were.
pub fn select_context(
    candidates: &[ScoredChunk],
    usage: &HashMap<String, u32>,
    ceiling: u32,
    source_text: &str,
) -> ContextSelection {
    let mut updated = usage.clone();
    let mut kept: Vec<&str> = Vec::new();

    for candidate in candidates {
        let chunk_id = candidate.payload.chunk_id.as_str();
        if chunk_id.is_empty() {
            debug!("skipping candidate without a usable chunk id");
            continue;
        }
        let count = updated.get(chunk_id).copied().unwrap_or(0);
        if count < ceiling {
            updated.insert(chunk_id.to_string(), count + 1);
            kept.push(candidate.payload.text.as_str());
        }
    }

    if kept.is_empty() {
        ContextSelection {
            context: source_text.to_string(),
            updated_usage: updated,
            grounded: false,
        }
    } else {
        ContextSelection {
            context: kept.join("\n\n"),
            updated_usage: updated,
            grounded: true,
        }
    }
}

/// Grounding product for one turn.
#[derive(Clone, Debug, PartialEq)]
pub struct AssembledContext {
    /// Context string to hand to the LLM chain.
    pub context: String,
    /// False when the turn grounds on the raw source text.
    pub grounded: bool,
    /// Candidates retrieval returned before the usage filter.
    pub candidates: usize,
}

/// Builds the grounding context for one turn of one session.
///
/// Holds no per-session state of its own; counters live in the
/// [`SessionStore`] and are read and merged under its lock, so concurrent
/// turns on one session can never push a chunk past its ceiling.
pub struct ContextAssembler {
    embedding: Arc<dyn DynEmbeddingService>,
    index: Arc<dyn VectorStore>,
    collection: String,
    retrieval: RetrievalConfig,
}

impl ContextAssembler {
    /// Create an assembler reading from the given collection.
    pub fn new(
        embedding: Arc<dyn DynEmbeddingService>,
        index: Arc<dyn VectorStore>,
        collection: &str,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            embedding,
            index,
            collection: collection.to_string(),
            retrieval,
        }
    }

    /// Assemble the context for one message.
    ///
    /// Flow: snapshot the session (no lock held across I/O), embed the
    /// message and search the index, then run the usage filter against the
    /// live counters and merge the result back. Retrieval failures degrade
    /// to source-text grounding instead of failing the turn; only a missing
    /// session or a poisoned store is an error.
    pub async fn assemble(
        &self,
        sessions: &SessionStore,
        session_id: Uuid,
        message: &str,
    ) -> Result<AssembledContext, ChatError> {
        let snapshot = sessions.get(session_id)?;

        let candidates = match self.retrieve(session_id, message).await {
            Ok(candidates) => candidates,
            Err(err) => {
                warn!(%session_id, error = %err, "retrieval failed; grounding on source text");
                return Ok(AssembledContext {
                    context: snapshot.source_text,
                    grounded: false,
                    candidates: 0,
                });
            }
        };

        sessions.with_session_mut(session_id, |state| {
            let selection = select_context(
                &candidates,
                &state.chunk_usage,
                self.retrieval.usage_ceiling,
                &state.source_text,
            );
            state.chunk_usage = selection.updated_usage;
            if !selection.grounded {
                debug!(%session_id, "no fresh chunks; grounding on source text");
            }
            AssembledContext {
                context: selection.context,
                grounded: selection.grounded,
                candidates: candidates.len(),
            }
        })
    }

    async fn retrieve(&self, session_id: Uuid, message: &str) -> CoreResult<Vec<ScoredChunk>> {
        let query_texts = vec![message.to_string()];
        let mut vectors = self.embedding.embed_batch_boxed(&query_texts).await?;
        let vector = vectors.pop().ok_or_else(|| {
            GreenroomError::Embedding("no vector returned for query".to_string())
        })?;

        let query = SearchQuery {
            vector,
            session_id: session_id.to_string(),
            k: self.retrieval.k,
            fetch_k: self.retrieval.fetch_k,
            diversity_weight: self.retrieval.diversity_weight,
        };
        self.index.search(&self.collection, query).await
    }
}

// =============================================================================
// Tests
// =============================================================================
