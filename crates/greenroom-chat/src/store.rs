//! In-memory session store.
//!
//! One entry per live interview: the raw source text kept for grounding
//! fallback, the conversation so far, and the per-chunk usage counters that
//! stop the context assembler from repeating itself. Lost on restart by
//! design; only the vector index outlives the process.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use greenroom_core::types::{system_clock, Clock};

use crate::error::ChatError;

/// One user/assistant exchange.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// What the candidate said, verbatim.
    pub user: String,
    /// The interviewer's reply.
    pub assistant: String,
}

/// Conversational and retrieval state for one session.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionState {
    pub session_id: Uuid,
    /// Full document text, kept for the no-fresh-chunks fallback.
    pub source_text: String,
    /// Job description or role name supplied at creation.
    pub context_label: String,
    /// Completed exchanges in order.
    pub turns: Vec<Turn>,
    /// Times each chunk id has been served into context.
    pub chunk_usage: HashMap<String, u32>,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

impl SessionState {
    fn new(session_id: Uuid, source_text: &str, context_label: &str, now: DateTime<Utc>) -> Self {
        Self {
            session_id,
            source_text: source_text.to_string(),
            context_label: context_label.to_string(),
            turns: Vec::new(),
            chunk_usage: HashMap::new(),
            created_at: now,
            last_accessed: now,
        }
    }
}

/// Summary row for session listings.
#[derive(Clone, Debug, Serialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub context_label: String,
    pub turn_count: usize,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

/// Store-wide map of live sessions behind a single mutex.
///
/// Session state is small and mutations are short, so one lock is simpler
/// than per-session locking and makes the usage-counter merge atomic. No
/// I/O happens while the lock is held.
///
/// Expiry is off by default; [`SessionStore::with_inactivity_timeout`] arms
/// a lazy sweep that runs before lookup and create decisions.
pub struct SessionStore {
    sessions: Mutex<HashMap<Uuid, SessionState>>,
    inactivity: Option<Duration>,
    clock: Clock,
}

impl SessionStore {
    /// Create an empty store without inactivity expiry.
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            inactivity: None,
            clock: system_clock(),
        }
    }

    /// Arm lazy expiry: sessions idle strictly longer than `minutes` are
    /// dropped on the next lookup or create.
    pub fn with_inactivity_timeout(mut self, minutes: u32) -> Self {
        self.inactivity = Some(Duration::minutes(i64::from(minutes)));
        self
    }

    /// Replace the time source, for tests that pin or step time.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Create a session with a fresh id.
    pub fn create(&self, source_text: &str, context_label: &str) -> Result<Uuid, ChatError> {
        let session_id = Uuid::new_v4();
        self.register(session_id, source_text, context_label)?;
        Ok(session_id)
    }

    /// Insert a session under a caller-supplied id.
    ///
    /// Used when the id must exist before the state does (chunks are indexed
    /// under the session id first, and the session is registered only once
    /// ingestion has succeeded). An existing entry under the same id is
    /// replaced.
    pub fn register(
        &self,
        session_id: Uuid,
        source_text: &str,
        context_label: &str,
    ) -> Result<(), ChatError> {
        let now = (self.clock)();
        let mut sessions = self.lock()?;
        sessions.insert(
            session_id,
            SessionState::new(session_id, source_text, context_label, now),
        );
        Ok(())
    }

    /// Snapshot a session by id, refreshing its `last_accessed`.
    pub fn get(&self, session_id: Uuid) -> Result<SessionState, ChatError> {
        let now = (self.clock)();
        let mut sessions = self.lock()?;
        self.sweep(&mut sessions, now);
        let state = sessions
            .get_mut(&session_id)
            .ok_or(ChatError::SessionNotFound(session_id))?;
        state.last_accessed = now;
        Ok(state.clone())
    }

    /// Look up a live session or start a fresh one.
    ///
    /// Entry point for role-only chat, where no document upload precedes the
    /// conversation: the caller passes whatever id it has (possibly none) and
    /// always gets a usable session back. A requested id that is unknown or
    /// has been swept yields a brand-new session, never an error. Returns the
    /// id and whether it was created on this call.
    pub fn get_or_create(
        &self,
        requested: Option<Uuid>,
        context_label: &str,
    ) -> Result<(Uuid, bool), ChatError> {
        let now = (self.clock)();
        let mut sessions = self.lock()?;
        self.sweep(&mut sessions, now);

        if let Some(session_id) = requested {
            if let Some(state) = sessions.get_mut(&session_id) {
                state.last_accessed = now;
                return Ok((session_id, false));
            }
        }

        let session_id = Uuid::new_v4();
        sessions.insert(
            session_id,
            SessionState::new(session_id, "", context_label, now),
        );
        Ok((session_id, true))
    }

    /// Record a completed exchange.
    pub fn append_turn(
        &self,
        session_id: Uuid,
        user: &str,
        assistant: &str,
    ) -> Result<(), ChatError> {
        let now = (self.clock)();
        let mut sessions = self.lock()?;
        let state = sessions
            .get_mut(&session_id)
            .ok_or(ChatError::SessionNotFound(session_id))?;
        state.turns.push(Turn {
            user: user.to_string(),
            assistant: assistant.to_string(),
        });
        state.last_accessed = now;
        Ok(())
    }

    /// Run a closure against a session's state under the store lock.
    ///
    /// This is the atomic read-modify-write seam for the usage counters: the
    /// closure sees the live state, not a snapshot, and nothing else can
    /// interleave while it runs. The closure must not block.
    pub fn with_session_mut<T>(
        &self,
        session_id: Uuid,
        f: impl FnOnce(&mut SessionState) -> T,
    ) -> Result<T, ChatError> {
        let now = (self.clock)();
        let mut sessions = self.lock()?;
        self.sweep(&mut sessions, now);
        let state = sessions
            .get_mut(&session_id)
            .ok_or(ChatError::SessionNotFound(session_id))?;
        let value = f(state);
        state.last_accessed = now;
        Ok(value)
    }

    /// List all sessions as summaries.
    pub fn list(&self) -> Vec<SessionSummary> {
        let sessions = match self.sessions.lock() {
            Ok(s) => s,
            Err(_) => return vec![],
        };
        sessions
            .values()
            .map(|s| SessionSummary {
                session_id: s.session_id,
                context_label: s.context_label.clone(),
                turn_count: s.turns.len(),
                created_at: s.created_at,
                last_accessed: s.last_accessed,
            })
            .collect()
    }

    /// Remove a session. Returns whether it existed.
    pub fn delete(&self, session_id: Uuid) -> bool {
        self.sessions
            .lock()
            .map(|mut s| s.remove(&session_id).is_some())
            .unwrap_or(false)
    }

    // -- Private helpers --

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<Uuid, SessionState>>, ChatError> {
        self.sessions
            .lock()
            .map_err(|e| ChatError::StorageError(format!("session lock poisoned: {}", e)))
    }

    /// Drop sessions idle strictly longer than the inactivity window.
    fn sweep(&self, sessions: &mut HashMap<Uuid, SessionState>, now: DateTime<Utc>) {
        let Some(window) = self.inactivity else {
            return;
        };
        let before = sessions.len();
        sessions.retain(|_, s| now - s.last_accessed <= window);
        let dropped = before - sessions.len();
        if dropped > 0 {
            debug!(dropped, "swept inactive sessions");
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
