//! LLM seam for the interview engine.
//!
//! The production model chain lives outside this process; the engine's whole
//! contract with it is [`PromptInputs`] in, one completion string out. This
//! module defines that seam plus two local implementations: a deterministic
//! mock for CLI runs and demos, and a scripted double for tests.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use greenroom_core::types::PromptInputs;

use crate::error::ChatError;

/// Trait for services that turn prompt inputs into one completion.
pub trait LlmService {
    /// Produce a completion for the given inputs.
    fn complete(
        &self,
        inputs: &PromptInputs,
    ) -> impl Future<Output = Result<String, ChatError>> + Send;
}

/// Object-safe companion to [`LlmService`].
///
/// The primary trait uses an `impl Future` return type, which prevents
/// `dyn LlmService`. This trait boxes the future so services can be stored
/// as trait objects; a blanket impl covers every `LlmService`.
pub trait DynLlmService: Send + Sync {
    /// Produce a completion, returning a boxed future.
    fn complete_boxed<'a>(
        &'a self,
        inputs: &'a PromptInputs,
    ) -> Pin<Box<dyn Future<Output = Result<String, ChatError>> + Send + 'a>>;
}

impl<T> DynLlmService for T
where
    T: LlmService + Send + Sync,
{
    fn complete_boxed<'a>(
        &'a self,
        inputs: &'a PromptInputs,
    ) -> Pin<Box<dyn Future<Output = Result<String, ChatError>> + Send + 'a>> {
        Box::pin(self.complete(inputs))
    }
}

// ============================================================================
// Mock interviewer
// ============================================================================

/// Deterministic local stand-in for the external model chain.
///
/// Shapes an interviewer-style reply from the inputs alone, quoting an
/// excerpt of the grounding context so runs without a real model still show
/// how retrieval changes from turn to turn.
#[derive(Clone, Copy, Debug, Default)]
pub struct MockLlm;

impl LlmService for MockLlm {
    fn complete(
        &self,
        inputs: &PromptInputs,
    ) -> impl Future<Output = Result<String, ChatError>> + Send {
        let reply = if inputs.chat_history.is_empty() {
            format!(
                "Thank you for your message. For the {} position, let's begin: \
                 walk me through the experience most relevant to \"{}\".",
                inputs.context_label,
                excerpt(&inputs.context, 60)
            )
        } else {
            format!(
                "Understood. Staying with the {} position: how does that \
                 connect to \"{}\"?",
                inputs.context_label,
                excerpt(&inputs.context, 60)
            )
        };
        async move { Ok(reply) }
    }
}

/// First line of `text`, cut at `max_chars` characters.
fn excerpt(text: &str, max_chars: usize) -> String {
    let line = text.lines().next().unwrap_or("").trim();
    if line.chars().count() <= max_chars {
        line.to_string()
    } else {
        let cut: String = line.chars().take(max_chars).collect();
        format!("{}...", cut.trim_end())
    }
}

// ============================================================================
// Scripted test double
// ============================================================================

/// Test double that replays queued replies and records every prompt it saw.
///
/// An exhausted script fails the completion, which doubles as the failure
/// injector: a double constructed with no replies always errors.
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<String>>,
    seen: Mutex<Vec<PromptInputs>>,
}

impl ScriptedLlm {
    /// Queue up replies to hand out in order.
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Every [`PromptInputs`] passed to `complete`, in call order.
    pub fn seen(&self) -> Vec<PromptInputs> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn next_reply(&self, inputs: &PromptInputs) -> Result<String, ChatError> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(inputs.clone());
        }
        let mut replies = self
            .replies
            .lock()
            .map_err(|e| ChatError::LlmError(format!("script lock poisoned: {}", e)))?;
        replies
            .pop_front()
            .ok_or_else(|| ChatError::LlmError("scripted replies exhausted".to_string()))
    }
}

impl LlmService for ScriptedLlm {
    fn complete(
        &self,
        inputs: &PromptInputs,
    ) -> impl Future<Output = Result<String, ChatError>> + Send {
        let result = self.next_reply(inputs);
        async move { result }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn make_inputs(history: &str) -> PromptInputs {
        PromptInputs {
            context: "Led the payments team at Acme.\nShipped a v2 API.".to_string(),
            chat_history: history.to_string(),
            input: "Hello, I'm ready to start.".to_string(),
            context_label: "Backend Engineer".to_string(),
        }
    }

    // ---- MockLlm ----

    #[tokio::test]
    async fn test_mock_llm_opening_mentions_label_and_context() {
        let reply = MockLlm.complete(&make_inputs("")).await.unwrap();
        assert!(reply.contains("Backend Engineer"));
        assert!(reply.contains("Led the payments team at Acme."));
    }

    #[tokio::test]
    async fn test_mock_llm_is_deterministic() {
        let inputs = make_inputs("User: hi\nAI: hello");
        let first = MockLlm.complete(&inputs).await.unwrap();
        let second = MockLlm.complete(&inputs).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_mock_llm_follow_up_differs_from_opening() {
        let opening = MockLlm.complete(&make_inputs("")).await.unwrap();
        let follow_up = MockLlm
            .complete(&make_inputs("User: hi\nAI: hello"))
            .await
            .unwrap();
        assert_ne!(opening, follow_up);
    }

    #[test]
    fn test_excerpt_short_line_untouched() {
        assert_eq!(excerpt("one line", 60), "one line");
    }

    #[test]
    fn test_excerpt_cuts_long_line_on_char_boundary() {
        let text = "é".repeat(100);
        let cut = excerpt(&text, 10);
        assert!(cut.starts_with(&"é".repeat(10)));
        assert!(cut.ends_with("..."));
    }

    #[test]
    fn test_excerpt_empty_text() {
        assert_eq!(excerpt("", 60), "");
    }

    // ---- ScriptedLlm ----

    #[tokio::test]
    async fn test_scripted_llm_replays_in_order() {
        let llm = ScriptedLlm::new(["first", "second"]);
        assert_eq!(llm.complete(&make_inputs("")).await.unwrap(), "first");
        assert_eq!(llm.complete(&make_inputs("")).await.unwrap(), "second");
    }

    #[tokio::test]
    async fn test_scripted_llm_records_inputs() {
        let llm = ScriptedLlm::new(["ok"]);
        let inputs = make_inputs("User: q\nAI: a");
        llm.complete(&inputs).await.unwrap();

        let seen = llm.seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], inputs);
    }

    #[tokio::test]
    async fn test_scripted_llm_exhausted_errors() {
        let llm = ScriptedLlm::new(Vec::<String>::new());
        let err = llm.complete(&make_inputs("")).await.unwrap_err();
        assert!(matches!(err, ChatError::LlmError(_)));
    }

    #[tokio::test]
    async fn test_dyn_llm_service_dispatch() {
        let llm: Arc<dyn DynLlmService> = Arc::new(ScriptedLlm::new(["boxed"]));
        let reply = llm.complete_boxed(&make_inputs("")).await.unwrap();
        assert_eq!(reply, "boxed");
    }
}
