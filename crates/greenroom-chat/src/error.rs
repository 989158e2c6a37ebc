//! Error types for the interview conversation engine.

use greenroom_core::error::GreenroomError;

/// Errors from the conversation engine.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("session not found: {0}")]
    SessionNotFound(uuid::Uuid),
    #[error("LLM error: {0}")]
    LlmError(String),
    #[error("storage error: {0}")]
    StorageError(String),
}

impl From<GreenroomError> for ChatError {
    fn from(err: GreenroomError) -> Self {
        ChatError::StorageError(err.to_string())
    }
}
