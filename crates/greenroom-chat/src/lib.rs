//! Interview conversation engine for Greenroom.
//!
//! Provides session management, non-repetitive context assembly over the
//! vector index, and the orchestrated interview flow from document upload
//! through turns to evaluation. The LLM itself stays behind a seam.

pub mod context;
pub mod error;
pub mod llm;
pub mod orchestrator;
pub mod store;

pub use context::{select_context, AssembledContext, ContextAssembler, ContextSelection};
pub use error::ChatError;
pub use llm::{DynLlmService, LlmService, MockLlm, ScriptedLlm};
pub use orchestrator::{InterviewOrchestrator, TurnReply};
pub use store::{SessionState, SessionStore, SessionSummary, Turn};
