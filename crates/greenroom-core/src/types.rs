use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GreenroomError, Result};

/// Injectable time source.
///
/// Expiry decisions (session inactivity, chunk age) compare against this
/// clock, so tests can pin time instead of sleeping.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// The wall-clock time source used outside tests.
pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

// =============================================================================
// ChunkPayload
// =============================================================================

/// Payload stored alongside each vector in the index.
///
/// One payload per indexed chunk. `session_id` is the sole isolation filter
/// for retrieval and deletion; `created_at` is consumed only by the expiry
/// reaper. Payloads are immutable after ingestion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    /// Literal chunk text.
    pub text: String,
    /// Owning session.
    pub session_id: String,
    /// Stable identifier, unique within the session.
    pub chunk_id: String,
    /// Ingestion timestamp, RFC 3339 UTC.
    pub created_at: String,
}

impl ChunkPayload {
    /// Build a payload for the `seq`-th chunk of a session.
    pub fn new(text: String, session_id: &str, seq: usize, created_at: DateTime<Utc>) -> Self {
        Self {
            text,
            session_id: session_id.to_string(),
            chunk_id: chunk_id(session_id, seq),
            created_at: created_at.to_rfc3339(),
        }
    }

    /// Parse `created_at` back into a UTC timestamp.
    ///
    /// Fails with [`GreenroomError::MalformedChunk`] when the stored string is
    /// not a valid RFC 3339 timestamp (foreign or corrupted records).
    pub fn created_at_utc(&self) -> Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                GreenroomError::MalformedChunk(format!(
                    "unparsable created_at {:?} for chunk {}: {}",
                    self.created_at, self.chunk_id, e
                ))
            })
    }
}

/// Compose the stable chunk identifier for the `seq`-th chunk of a session.
pub fn chunk_id(session_id: &str, seq: usize) -> String {
    format!("{}_{}", session_id, seq)
}

// =============================================================================
// PromptInputs
// =============================================================================

/// Variables handed to the downstream LLM chain for one completion.
///
/// The chain itself is an external collaborator; this is the full contract the
/// engine produces per turn (and per evaluation request).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PromptInputs {
    /// Grounding context: selected chunk texts or the fallback source text.
    pub context: String,
    /// Rendered conversation history.
    pub chat_history: String,
    /// Current user input.
    pub input: String,
    /// Job description or role name supplied at session creation.
    pub context_label: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_chunk_id_format() {
        assert_eq!(chunk_id("abc", 0), "abc_0");
        assert_eq!(chunk_id("abc", 12), "abc_12");
    }

    #[test]
    fn test_fixed_clock_is_injectable() {
        let fixed = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let clock: Clock = Arc::new(move || fixed);
        assert_eq!(clock(), fixed);
        assert_eq!(clock(), fixed);
    }

    #[test]
    fn test_payload_new_composes_chunk_id() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let payload = ChunkPayload::new("some text".to_string(), "sess1", 3, now);
        assert_eq!(payload.chunk_id, "sess1_3");
        assert_eq!(payload.session_id, "sess1");
        assert_eq!(payload.text, "some text");
    }

    #[test]
    fn test_payload_created_at_roundtrip() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let payload = ChunkPayload::new("t".to_string(), "s", 0, now);
        assert_eq!(payload.created_at_utc().unwrap(), now);
    }

    #[test]
    fn test_payload_bad_timestamp_is_malformed() {
        let payload = ChunkPayload {
            text: "t".to_string(),
            session_id: "s".to_string(),
            chunk_id: "s_0".to_string(),
            created_at: "not-a-timestamp".to_string(),
        };
        let err = payload.created_at_utc().unwrap_err();
        assert!(matches!(err, GreenroomError::MalformedChunk(_)));
        assert!(err.to_string().contains("s_0"));
    }

    #[test]
    fn test_payload_json_roundtrip() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let payload = ChunkPayload::new("body".to_string(), "sess", 1, now);
        let json = serde_json::to_string(&payload).unwrap();
        let back: ChunkPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn test_payload_deserialize_missing_field_fails() {
        // A record without session_id is foreign data; it must not parse.
        let json = r#"{"text":"t","chunk_id":"x_0","created_at":"2025-03-01T12:00:00Z"}"#;
        let result: std::result::Result<ChunkPayload, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn test_prompt_inputs_serialize() {
        let inputs = PromptInputs {
            context: "ctx".to_string(),
            chat_history: "hist".to_string(),
            input: "hello".to_string(),
            context_label: "Backend Engineer".to_string(),
        };
        let json = serde_json::to_value(&inputs).unwrap();
        assert_eq!(json["context"], "ctx");
        assert_eq!(json["context_label"], "Backend Engineer");
    }
}
