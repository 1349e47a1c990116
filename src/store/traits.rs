//! Unified `Database` trait: the session, transcript and answer stores.
//!
//! The conversation engine mutates session and answer state only through
//! this trait. Implementations own their own write atomicity.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::onboarding::model::{
    Answer, Session, SessionMode, SessionUpdate, TranscriptTurn, TurnRole,
};

/// Backend-agnostic persistence for onboarding sessions.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Sessions ────────────────────────────────────────────────────

    /// Create a new `draft` session at index 0.
    async fn create_session(&self, mode: SessionMode) -> Result<Session, DatabaseError>;

    /// Get a session by ID.
    async fn get_session(&self, id: &str) -> Result<Option<Session>, DatabaseError>;

    /// Apply a partial update. Fails with `NotFound` when the session is missing.
    async fn update_session(
        &self,
        id: &str,
        update: SessionUpdate,
    ) -> Result<Session, DatabaseError>;

    /// Move the cursor from `from_index` to `from_index + 1` and clear the
    /// pending answer, marking the session complete when `complete` is set.
    ///
    /// Returns `None` when the session is no longer at `from_index`.
    async fn advance_session(
        &self,
        id: &str,
        from_index: usize,
        complete: bool,
    ) -> Result<Option<Session>, DatabaseError>;

    /// All sessions, newest first.
    async fn list_sessions(&self) -> Result<Vec<Session>, DatabaseError>;

    // ── Transcript ──────────────────────────────────────────────────

    /// Append a turn to a session's transcript.
    async fn append_turn(
        &self,
        session_id: &str,
        role: TurnRole,
        content: &str,
    ) -> Result<TranscriptTurn, DatabaseError>;

    /// All turns for a session, oldest first.
    async fn list_turns(&self, session_id: &str) -> Result<Vec<TranscriptTurn>, DatabaseError>;

    // ── Answers ─────────────────────────────────────────────────────

    /// Insert or replace the answer for `(session_id, step_key)`.
    async fn upsert_answer(
        &self,
        session_id: &str,
        step_key: &str,
        question: &str,
        answer: &str,
    ) -> Result<Answer, DatabaseError>;

    /// `step_key → answer` for only the requested keys.
    async fn list_answers_by_keys(
        &self,
        session_id: &str,
        keys: &[&str],
    ) -> Result<HashMap<String, String>, DatabaseError>;

    /// Every answer recorded for a session.
    async fn list_answers(&self, session_id: &str) -> Result<Vec<Answer>, DatabaseError>;

    /// A single answer.
    async fn get_answer(
        &self,
        session_id: &str,
        step_key: &str,
    ) -> Result<Option<Answer>, DatabaseError>;

    /// Replace the text of an existing answer. Returns false if there is none.
    async fn update_answer_text(
        &self,
        session_id: &str,
        step_key: &str,
        answer: &str,
    ) -> Result<bool, DatabaseError>;
}
