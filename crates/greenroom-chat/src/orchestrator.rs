//! Interview orchestrator: the facade over ingestion, sessions, context
//! assembly, and the LLM seam.
//!
//! One orchestrator serves every session. Callers hand it raw documents and
//! candidate messages; it hands back session ids, interviewer replies, and
//! evaluations, with all grounding and bookkeeping done internally.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use greenroom_core::config::GreenroomConfig;
use greenroom_core::types::PromptInputs;
use greenroom_vector::{ChunkSplitter, DynEmbeddingService, IngestionPipeline, VectorStore};

use crate::context::ContextAssembler;
use crate::error::ChatError;
use crate::llm::DynLlmService;
use crate::store::{SessionStore, SessionSummary, Turn};

/// Maximum message length in characters.
const MAX_MESSAGE_LENGTH: usize = 2000;

/// Appended to the candidate's first message so the model opens the
/// interview instead of answering in a vacuum.
const OPENING_INSTRUCTION: &str = "This is the candidate's first message. Politely acknowledge \
    it, then open the interview: ask them to introduce themselves or to describe their most \
    relevant experience. Do not be generic.";

/// The input used when a performance evaluation is requested.
const EVALUATION_INSTRUCTION: &str = "Evaluate the candidate's interview performance so far. \
    Summarize strengths and weaknesses against the provided material, and close with a clear \
    hiring recommendation.";

/// One completed turn as returned to the caller.
#[derive(Clone, Debug, Serialize)]
pub struct TurnReply {
    pub session_id: Uuid,
    /// The interviewer's reply.
    pub reply: String,
    /// Context string the reply was grounded on.
    pub context: String,
    /// False when the context fell back to the raw source text.
    pub grounded: bool,
}

/// Central coordinator for the interview flow.
pub struct InterviewOrchestrator {
    sessions: SessionStore,
    pipeline: IngestionPipeline,
    assembler: ContextAssembler,
    llm: Arc<dyn DynLlmService>,
}

impl InterviewOrchestrator {
    /// Wire an orchestrator from configuration and its collaborators.
    pub fn new(
        config: &GreenroomConfig,
        embedding: Arc<dyn DynEmbeddingService>,
        index: Arc<dyn VectorStore>,
        llm: Arc<dyn DynLlmService>,
    ) -> Self {
        let pipeline = IngestionPipeline::new(
            ChunkSplitter::from_config(&config.chunking),
            Arc::clone(&embedding),
            Arc::clone(&index),
            &config.index.collection,
        );
        let assembler = ContextAssembler::new(
            embedding,
            index,
            &config.index.collection,
            config.retrieval.clone(),
        );

        Self {
            sessions: SessionStore::new(),
            pipeline,
            assembler,
            llm,
        }
    }

    /// Ingest a document and start a session for it.
    ///
    /// The id is allocated up front so chunks are indexed under it, but the
    /// session becomes visible only once ingestion has succeeded; a failed
    /// upload leaves no half-usable session behind.
    pub async fn upload(&self, source_text: &str, context_label: &str) -> Result<Uuid, ChatError> {
        let session_id = Uuid::new_v4();
        let receipt = self
            .pipeline
            .ingest(&session_id.to_string(), source_text)
            .await?;
        self.sessions
            .register(session_id, source_text, context_label)?;
        info!(
            %session_id,
            chunks = receipt.chunk_count,
            label = context_label,
            "session started"
        );
        Ok(session_id)
    }

    /// Run one interview turn.
    ///
    /// The first turn of a session carries an opening instruction alongside
    /// the candidate's message; history always records the message verbatim.
    pub async fn interview_turn(
        &self,
        session_id: Uuid,
        message: &str,
    ) -> Result<TurnReply, ChatError> {
        if message.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if message.len() > MAX_MESSAGE_LENGTH {
            return Err(ChatError::MessageTooLong(MAX_MESSAGE_LENGTH));
        }

        let snapshot = self.sessions.get(session_id)?;
        let assembled = self
            .assembler
            .assemble(&self.sessions, session_id, message)
            .await?;

        let input = if snapshot.turns.is_empty() {
            format!("{}\n\n{}", message, OPENING_INSTRUCTION)
        } else {
            message.to_string()
        };
        let inputs = PromptInputs {
            context: assembled.context.clone(),
            chat_history: render_history(&snapshot.turns),
            input,
            context_label: snapshot.context_label.clone(),
        };

        let reply = self.llm.complete_boxed(&inputs).await?;

        self.sessions.append_turn(session_id, message, &reply)?;

        Ok(TurnReply {
            session_id,
            reply,
            context: assembled.context,
            grounded: assembled.grounded,
        })
    }

    /// Ask for an evaluation of the conversation so far.
    ///
    /// Grounded on the full source text rather than retrieval: an evaluation
    /// covers the whole interview, not the current topic. Leaves the
    /// conversation history untouched.
    pub async fn evaluate(&self, session_id: Uuid) -> Result<String, ChatError> {
        let snapshot = self.sessions.get(session_id)?;
        let inputs = PromptInputs {
            context: snapshot.source_text,
            chat_history: render_history(&snapshot.turns),
            input: EVALUATION_INSTRUCTION.to_string(),
            context_label: snapshot.context_label,
        };
        self.llm.complete_boxed(&inputs).await
    }

    /// List active sessions.
    pub fn sessions(&self) -> Vec<SessionSummary> {
        self.sessions.list()
    }

    /// Conversation history for a session.
    pub fn history(&self, session_id: Uuid) -> Result<Vec<Turn>, ChatError> {
        Ok(self.sessions.get(session_id)?.turns)
    }

    /// Drop a session's conversational state.
    ///
    /// Indexed chunks are left behind for the expiry reaper.
    pub fn reset(&self, session_id: Uuid) -> Result<(), ChatError> {
        if self.sessions.delete(session_id) {
            info!(%session_id, "session reset");
            Ok(())
        } else {
            Err(ChatError::SessionNotFound(session_id))
        }
    }
}

/// Render completed turns as `User:`/`AI:` blocks separated by blank lines.
fn render_history(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| format!("User: {}\nAI: {}", t.user, t.assistant))
        .collect::<Vec<_>>()
        .join("\n\n")
}

// =============================================================================
// Tests
// =============================================================================
