//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::onboarding::model::{
    Answer, Session, SessionMode, SessionStatus, SessionUpdate, TranscriptTurn, TurnRole,
};
use crate::store::migrations;
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Timestamps are written as RFC 3339 with microseconds so lexical order
/// matches chronological order.
fn now_str() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn query_err(op: &str) -> impl Fn(libsql::Error) -> DatabaseError + '_ {
    move |e| DatabaseError::Query(format!("{op}: {e}"))
}

fn parse_column<T>(op: &str, raw: &str) -> Result<T, DatabaseError>
where
    T: std::str::FromStr<Err = String>,
{
    raw.parse()
        .map_err(|e: String| DatabaseError::Serialization(format!("{op}: {e}")))
}

const SESSION_COLUMNS: &str =
    "id, current_index, mode, status, pending_answer, created_at, updated_at";

/// Map a libsql Row to a Session. Column order matches SESSION_COLUMNS.
fn row_to_session(row: &libsql::Row) -> Result<Session, DatabaseError> {
    let op = "row_to_session";
    let id: String = row.get(0).map_err(query_err(op))?;
    let current_index: i64 = row.get(1).map_err(query_err(op))?;
    let mode: String = row.get(2).map_err(query_err(op))?;
    let status: String = row.get(3).map_err(query_err(op))?;
    let pending_answer: Option<String> = row.get(4).map_err(query_err(op))?;
    let created: String = row.get(5).map_err(query_err(op))?;
    let updated: String = row.get(6).map_err(query_err(op))?;

    Ok(Session {
        id,
        current_index: current_index.max(0) as usize,
        mode: parse_column::<SessionMode>(op, &mode)?,
        status: parse_column::<SessionStatus>(op, &status)?,
        pending_answer,
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

const TURN_COLUMNS: &str = "id, session_id, seq, role, content, created_at";

fn row_to_turn(row: &libsql::Row) -> Result<TranscriptTurn, DatabaseError> {
    let op = "row_to_turn";
    let role: String = row.get(3).map_err(query_err(op))?;
    let created: String = row.get(5).map_err(query_err(op))?;
    Ok(TranscriptTurn {
        id: row.get(0).map_err(query_err(op))?,
        session_id: row.get(1).map_err(query_err(op))?,
        seq: row.get(2).map_err(query_err(op))?,
        role: parse_column::<TurnRole>(op, &role)?,
        content: row.get(4).map_err(query_err(op))?,
        created_at: parse_datetime(&created),
    })
}

const ANSWER_COLUMNS: &str = "session_id, step_key, question, answer, created_at, updated_at";

fn row_to_answer(row: &libsql::Row) -> Result<Answer, DatabaseError> {
    let op = "row_to_answer";
    let created: String = row.get(4).map_err(query_err(op))?;
    let updated: String = row.get(5).map_err(query_err(op))?;
    Ok(Answer {
        session_id: row.get(0).map_err(query_err(op))?,
        step_key: row.get(1).map_err(query_err(op))?,
        question: row.get(2).map_err(query_err(op))?,
        answer: row.get(3).map_err(query_err(op))?,
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Sessions ────────────────────────────────────────────────────

    async fn create_session(&self, mode: SessionMode) -> Result<Session, DatabaseError> {
        let id = Uuid::new_v4().to_string();
        let now = now_str();
        self.conn()
            .execute(
                "INSERT INTO sessions (id, current_index, mode, status, created_at, updated_at)
                 VALUES (?1, 0, ?2, ?3, ?4, ?4)",
                params![id.clone(), mode.to_string(), SessionStatus::Draft.to_string(), now],
            )
            .await
            .map_err(query_err("create_session"))?;

        debug!(session_id = %id, mode = %mode, "Session created");
        self.get_session(&id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "session".to_string(),
                id,
            })
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(query_err("get_session"))?;

        match rows.next().await.map_err(query_err("get_session"))? {
            Some(row) => Ok(Some(row_to_session(&row)?)),
            None => Ok(None),
        }
    }

    async fn update_session(
        &self,
        id: &str,
        update: SessionUpdate,
    ) -> Result<Session, DatabaseError> {
        let mut session = self
            .get_session(id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "session".to_string(),
                id: id.to_string(),
            })?;

        update.apply(&mut session);
        session.updated_at = Utc::now();

        self.conn()
            .execute(
                "UPDATE sessions SET mode = ?1, status = ?2, pending_answer = ?3, updated_at = ?4
                 WHERE id = ?5",
                params![
                    session.mode.to_string(),
                    session.status.to_string(),
                    opt_text(session.pending_answer.as_deref()),
                    now_str(),
                    id
                ],
            )
            .await
            .map_err(query_err("update_session"))?;

        debug!(session_id = %id, mode = %session.mode, status = %session.status, "Session updated");
        Ok(session)
    }

    async fn advance_session(
        &self,
        id: &str,
        from_index: usize,
        complete: bool,
    ) -> Result<Option<Session>, DatabaseError> {
        let status = complete.then(|| SessionStatus::Complete.to_string());
        let changed = self
            .conn()
            .execute(
                "UPDATE sessions
                 SET current_index = ?1, status = COALESCE(?2, status),
                     pending_answer = NULL, updated_at = ?3
                 WHERE id = ?4 AND current_index = ?5",
                params![
                    (from_index + 1) as i64,
                    opt_text(status.as_deref()),
                    now_str(),
                    id,
                    from_index as i64
                ],
            )
            .await
            .map_err(query_err("advance_session"))?;

        if changed == 0 {
            debug!(session_id = %id, from_index, "Advance skipped, index already moved");
            return Ok(None);
        }
        self.get_session(id).await
    }

    async fn list_sessions(&self) -> Result<Vec<Session>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions ORDER BY created_at DESC"),
                (),
            )
            .await
            .map_err(query_err("list_sessions"))?;

        let mut sessions = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err("list_sessions"))? {
            sessions.push(row_to_session(&row)?);
        }
        Ok(sessions)
    }

    // ── Transcript ──────────────────────────────────────────────────

    async fn append_turn(
        &self,
        session_id: &str,
        role: TurnRole,
        content: &str,
    ) -> Result<TranscriptTurn, DatabaseError> {
        let id = Uuid::new_v4().to_string();
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "INSERT INTO transcript_turns (id, session_id, seq, role, content, created_at)
                     VALUES (?1, ?2,
                             (SELECT COALESCE(MAX(seq), 0) + 1 FROM transcript_turns WHERE session_id = ?2),
                             ?3, ?4, ?5)
                     RETURNING {TURN_COLUMNS}"
                ),
                params![id, session_id, role.as_str(), content, now_str()],
            )
            .await
            .map_err(query_err("append_turn"))?;

        let row = rows
            .next()
            .await
            .map_err(query_err("append_turn"))?
            .ok_or_else(|| DatabaseError::Query("append_turn: no row returned".to_string()))?;
        let turn = row_to_turn(&row)?;
        debug!(session_id, seq = turn.seq, role = role.as_str(), "Transcript turn appended");
        Ok(turn)
    }

    async fn list_turns(&self, session_id: &str) -> Result<Vec<TranscriptTurn>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {TURN_COLUMNS} FROM transcript_turns
                     WHERE session_id = ?1 ORDER BY seq ASC"
                ),
                params![session_id],
            )
            .await
            .map_err(query_err("list_turns"))?;

        let mut turns = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err("list_turns"))? {
            turns.push(row_to_turn(&row)?);
        }
        Ok(turns)
    }

    // ── Answers ─────────────────────────────────────────────────────

    async fn upsert_answer(
        &self,
        session_id: &str,
        step_key: &str,
        question: &str,
        answer: &str,
    ) -> Result<Answer, DatabaseError> {
        let now = now_str();
        self.conn()
            .execute(
                "INSERT INTO answers (session_id, step_key, question, answer, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                 ON CONFLICT (session_id, step_key)
                 DO UPDATE SET question = ?3, answer = ?4, updated_at = ?5",
                params![session_id, step_key, question, answer, now],
            )
            .await
            .map_err(query_err("upsert_answer"))?;

        debug!(session_id, step_key, "Answer upserted");
        self.get_answer(session_id, step_key)
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "answer".to_string(),
                id: format!("{session_id}/{step_key}"),
            })
    }

    async fn list_answers_by_keys(
        &self,
        session_id: &str,
        keys: &[&str],
    ) -> Result<HashMap<String, String>, DatabaseError> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let wanted: HashSet<&str> = keys.iter().copied().collect();
        Ok(self
            .list_answers(session_id)
            .await?
            .into_iter()
            .filter(|a| wanted.contains(a.step_key.as_str()))
            .map(|a| (a.step_key, a.answer))
            .collect())
    }

    async fn list_answers(&self, session_id: &str) -> Result<Vec<Answer>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {ANSWER_COLUMNS} FROM answers
                     WHERE session_id = ?1 ORDER BY created_at ASC"
                ),
                params![session_id],
            )
            .await
            .map_err(query_err("list_answers"))?;

        let mut answers = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err("list_answers"))? {
            answers.push(row_to_answer(&row)?);
        }
        Ok(answers)
    }

    async fn get_answer(
        &self,
        session_id: &str,
        step_key: &str,
    ) -> Result<Option<Answer>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {ANSWER_COLUMNS} FROM answers WHERE session_id = ?1 AND step_key = ?2"
                ),
                params![session_id, step_key],
            )
            .await
            .map_err(query_err("get_answer"))?;

        match rows.next().await.map_err(query_err("get_answer"))? {
            Some(row) => Ok(Some(row_to_answer(&row)?)),
            None => Ok(None),
        }
    }

    async fn update_answer_text(
        &self,
        session_id: &str,
        step_key: &str,
        answer: &str,
    ) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE answers SET answer = ?1, updated_at = ?2
                 WHERE session_id = ?3 AND step_key = ?4",
                params![answer, now_str(), session_id, step_key],
            )
            .await
            .map_err(query_err("update_answer_text"))?;
        Ok(count > 0)
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    // ── Session tests ───────────────────────────────────────────────

    #[tokio::test]
    async fn create_and_get_session() {
        let db = test_db().await;
        let session = db.create_session(SessionMode::Voice).await.unwrap();

        let fetched = db.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, session.id);
        assert_eq!(fetched.current_index, 0);
        assert_eq!(fetched.mode, SessionMode::Voice);
        assert_eq!(fetched.status, SessionStatus::Draft);
        assert!(fetched.pending_answer.is_none());
    }

    #[tokio::test]
    async fn get_session_not_found() {
        let db = test_db().await;
        assert!(db.get_session("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_session_partial_fields() {
        let db = test_db().await;
        let session = db.create_session(SessionMode::Text).await.unwrap();

        db.update_session(&session.id, SessionUpdate::pending_answer(Some("Zesti".into())))
            .await
            .unwrap();
        let updated = db
            .update_session(&session.id, SessionUpdate::mode(SessionMode::Voice))
            .await
            .unwrap();
        assert_eq!(updated.mode, SessionMode::Voice);
        assert_eq!(updated.pending_answer.as_deref(), Some("Zesti"));

        let fetched = db.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(fetched.mode, SessionMode::Voice);
        assert_eq!(fetched.pending_answer.as_deref(), Some("Zesti"));
        assert_eq!(fetched.current_index, 0);
    }

    #[tokio::test]
    async fn corrupt_pending_answer_is_an_error() {
        let db = test_db().await;
        let session = db.create_session(SessionMode::Text).await.unwrap();
        db.conn
            .execute(
                "UPDATE sessions SET pending_answer = X'DEADBEEF' WHERE id = ?1",
                params![session.id.clone()],
            )
            .await
            .unwrap();

        let err = db.get_session(&session.id).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Query(_)));
    }

    #[tokio::test]
    async fn update_missing_session_is_not_found() {
        let db = test_db().await;
        let err = db
            .update_session("nope", SessionUpdate::mode(SessionMode::Voice))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[tokio::test]
    async fn advance_is_compare_and_set() {
        let db = test_db().await;
        let session = db.create_session(SessionMode::Text).await.unwrap();
        db.update_session(&session.id, SessionUpdate::pending_answer(Some("x".into())))
            .await
            .unwrap();

        let advanced = db.advance_session(&session.id, 0, false).await.unwrap().unwrap();
        assert_eq!(advanced.current_index, 1);
        assert!(advanced.pending_answer.is_none());
        assert_eq!(advanced.status, SessionStatus::Draft);

        // Stale advance from the old index does nothing.
        assert!(db.advance_session(&session.id, 0, false).await.unwrap().is_none());
        let fetched = db.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(fetched.current_index, 1);
    }

    #[tokio::test]
    async fn advance_can_complete() {
        let db = test_db().await;
        let session = db.create_session(SessionMode::Text).await.unwrap();
        let done = db.advance_session(&session.id, 0, true).await.unwrap().unwrap();
        assert_eq!(done.status, SessionStatus::Complete);
        assert_eq!(done.current_index, 1);
    }

    #[tokio::test]
    async fn list_sessions_returns_all() {
        let db = test_db().await;
        db.create_session(SessionMode::Text).await.unwrap();
        db.create_session(SessionMode::Voice).await.unwrap();
        assert_eq!(db.list_sessions().await.unwrap().len(), 2);
    }

    // ── Transcript tests ────────────────────────────────────────────

    #[tokio::test]
    async fn transcript_is_ordered_by_insertion() {
        let db = test_db().await;
        let session = db.create_session(SessionMode::Text).await.unwrap();

        db.append_turn(&session.id, TurnRole::User, "Hello").await.unwrap();
        db.append_turn(&session.id, TurnRole::User, "Anyone?").await.unwrap();
        let third = db
            .append_turn(&session.id, TurnRole::Assistant, "Hi!")
            .await
            .unwrap();
        assert_eq!(third.seq, 3);

        let turns = db.list_turns(&session.id).await.unwrap();
        let contents: Vec<&str> = turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, ["Hello", "Anyone?", "Hi!"]);
        assert_eq!(turns[0].role, TurnRole::User);
        assert_eq!(turns[2].role, TurnRole::Assistant);
        assert!(turns.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }

    #[tokio::test]
    async fn transcripts_are_per_session() {
        let db = test_db().await;
        let a = db.create_session(SessionMode::Text).await.unwrap();
        let b = db.create_session(SessionMode::Text).await.unwrap();
        db.append_turn(&a.id, TurnRole::User, "for a").await.unwrap();
        let first_b = db.append_turn(&b.id, TurnRole::User, "for b").await.unwrap();
        assert_eq!(first_b.seq, 1);
        assert_eq!(db.list_turns(&a.id).await.unwrap().len(), 1);
    }

    // ── Answer tests ────────────────────────────────────────────────

    #[tokio::test]
    async fn upsert_is_idempotent_per_step() {
        let db = test_db().await;
        let session = db.create_session(SessionMode::Text).await.unwrap();

        db.upsert_answer(&session.id, "brandName", "Name?", "Zesti")
            .await
            .unwrap();
        let second = db
            .upsert_answer(&session.id, "brandName", "Name?", "Zesti Co")
            .await
            .unwrap();
        assert_eq!(second.answer, "Zesti Co");

        let answers = db.list_answers(&session.id).await.unwrap();
        assert_eq!(answers.len(), 1);
    }

    #[tokio::test]
    async fn list_by_keys_filters() {
        let db = test_db().await;
        let session = db.create_session(SessionMode::Text).await.unwrap();
        db.upsert_answer(&session.id, "brandName", "Name?", "Zesti")
            .await
            .unwrap();
        db.upsert_answer(&session.id, "brandTone", "Tone?", "Bold")
            .await
            .unwrap();

        let map = db
            .list_answers_by_keys(&session.id, &["brandName"])
            .await
            .unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map["brandName"], "Zesti");
        assert!(db
            .list_answers_by_keys(&session.id, &[])
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn update_answer_text_only_touches_existing() {
        let db = test_db().await;
        let session = db.create_session(SessionMode::Text).await.unwrap();
        assert!(!db
            .update_answer_text(&session.id, "brandName", "Nope")
            .await
            .unwrap());

        db.upsert_answer(&session.id, "brandName", "Name?", "Zesti")
            .await
            .unwrap();
        assert!(db
            .update_answer_text(&session.id, "brandName", "Zestier")
            .await
            .unwrap());
        let answer = db.get_answer(&session.id, "brandName").await.unwrap().unwrap();
        assert_eq!(answer.answer, "Zestier");
        assert_eq!(answer.question, "Name?");
    }

    // ── Migration tests ─────────────────────────────────────────────

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let db = test_db().await;
        db.init_schema().await.unwrap();
    }

    #[tokio::test]
    async fn open_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("dir").join("test.db");
        let db = LibSqlBackend::new_local(&path).await.unwrap();
        db.create_session(SessionMode::Text).await.unwrap();
        assert!(path.exists());
    }
}
