//! REST endpoints for sessions, answers and transcripts.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::catalog::QuestionCatalog;
use super::model::{Session, SessionMode, SessionStatus, SessionUpdate, TurnRole};
use crate::error::DatabaseError;
use crate::store::Database;

/// Shared state for the REST routes.
#[derive(Clone)]
pub struct BrandRouteState {
    pub db: Arc<dyn Database>,
    pub catalog: Arc<QuestionCatalog>,
}

/// Session summary as listed over REST.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionSummary {
    id: String,
    status: SessionStatus,
    current_index: usize,
    voice_mode: bool,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            status: session.status,
            current_index: session.current_index,
            voice_mode: session.mode.is_voice(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartRequest {
    #[serde(default)]
    is_voice: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateAnswerRequest {
    session_id: String,
    key: String,
    new_answer: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendTurnRequest {
    session_id: String,
    role: String,
    content: String,
}

fn error_json(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

fn internal(op: &str, e: DatabaseError) -> Response {
    warn!(op, error = %e, "Store failure in REST handler");
    error_json(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

fn session_not_found() -> Response {
    error_json(StatusCode::NOT_FOUND, "Session not found")
}

/// Look up a session, turning absence and store errors into responses.
async fn require_session(db: &dyn Database, id: &str, op: &str) -> Result<Session, Response> {
    match db.get_session(id).await {
        Ok(Some(session)) => Ok(session),
        Ok(None) => Err(session_not_found()),
        Err(e) => Err(internal(op, e)),
    }
}

// ── Health ──────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "brand-onboarding"
    }))
}

// ── Sessions ────────────────────────────────────────────────────────

/// POST /api/brand/start
///
/// Body is optional; `{"isVoice": true}` starts in voice mode.
async fn start_session(
    State(state): State<BrandRouteState>,
    body: Option<Json<StartRequest>>,
) -> Response {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let mode = if request.is_voice {
        SessionMode::Voice
    } else {
        SessionMode::Text
    };

    match state.db.create_session(mode).await {
        Ok(session) => {
            info!(session_id = %session.id, mode = %mode, "Session created via REST");
            Json(serde_json::json!({ "id": session.id })).into_response()
        }
        Err(e) => internal("start_session", e),
    }
}

/// GET /api/brand/sessions
async fn list_sessions(State(state): State<BrandRouteState>) -> Response {
    match state.db.list_sessions().await {
        Ok(sessions) => {
            let summaries: Vec<SessionSummary> = sessions.iter().map(SessionSummary::from).collect();
            Json(summaries).into_response()
        }
        Err(e) => internal("list_sessions", e),
    }
}

/// GET /api/brand/sessions/{id}
async fn get_session(State(state): State<BrandRouteState>, Path(id): Path<String>) -> Response {
    match require_session(state.db.as_ref(), &id, "get_session").await {
        Ok(session) => Json(SessionSummary::from(&session)).into_response(),
        Err(response) => response,
    }
}

/// PATCH /api/brand/{sessionId}/voice
async fn set_voice_mode(
    State(state): State<BrandRouteState>,
    Path(session_id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let Some(voice_mode) = body.get("voiceMode").and_then(Value::as_bool) else {
        return error_json(StatusCode::BAD_REQUEST, "voiceMode must be a boolean");
    };
    let mode = if voice_mode {
        SessionMode::Voice
    } else {
        SessionMode::Text
    };

    match state
        .db
        .update_session(&session_id, SessionUpdate::mode(mode))
        .await
    {
        Ok(session) => Json(serde_json::json!({
            "message": "Voice mode updated successfully",
            "voiceMode": session.mode.is_voice(),
        }))
        .into_response(),
        Err(DatabaseError::NotFound { .. }) => session_not_found(),
        Err(e) => internal("set_voice_mode", e),
    }
}

// ── Answers ─────────────────────────────────────────────────────────

/// GET /api/brand/answers/{sessionId}
///
/// Answers in catalog order; keys the catalog doesn't know sort last.
async fn list_answers(
    State(state): State<BrandRouteState>,
    Path(session_id): Path<String>,
) -> Response {
    let mut answers = match state.db.list_answers(&session_id).await {
        Ok(answers) => answers,
        Err(e) => return internal("list_answers", e),
    };
    answers.sort_by_key(|a| state.catalog.position(&a.step_key).unwrap_or(usize::MAX));

    let body: Vec<Value> = answers
        .into_iter()
        .map(|a| {
            serde_json::json!({
                "key": a.step_key,
                "question": a.question,
                "answer": a.answer,
            })
        })
        .collect();
    Json(body).into_response()
}

/// GET /api/brand/qa/{sessionId}/{stepKey}
async fn get_answer(
    State(state): State<BrandRouteState>,
    Path((session_id, step_key)): Path<(String, String)>,
) -> Response {
    match state.db.get_answer(&session_id, &step_key).await {
        Ok(Some(answer)) => Json(answer).into_response(),
        Ok(None) => error_json(StatusCode::NOT_FOUND, "QA not found"),
        Err(e) => internal("get_answer", e),
    }
}

/// PUT /api/brand/update-answer
///
/// Edits an already-confirmed answer. Never creates one, so progress can
/// only be made through the conversation.
async fn update_answer(
    State(state): State<BrandRouteState>,
    Json(request): Json<UpdateAnswerRequest>,
) -> Response {
    let new_answer = request.new_answer.trim();
    if new_answer.is_empty() {
        return error_json(StatusCode::BAD_REQUEST, "newAnswer must not be empty");
    }
    if let Err(response) =
        require_session(state.db.as_ref(), &request.session_id, "update_answer").await
    {
        return response;
    }

    match state
        .db
        .update_answer_text(&request.session_id, &request.key, new_answer)
        .await
    {
        Ok(success) => {
            if success {
                info!(session_id = %request.session_id, step = %request.key, "Answer edited");
            }
            Json(serde_json::json!({ "success": success })).into_response()
        }
        Err(e) => internal("update_answer", e),
    }
}

// ── Transcript ──────────────────────────────────────────────────────

/// GET /api/conversation/{sessionId}
async fn get_conversation(
    State(state): State<BrandRouteState>,
    Path(session_id): Path<String>,
) -> Response {
    if let Err(response) =
        require_session(state.db.as_ref(), &session_id, "get_conversation").await
    {
        return response;
    }
    match state.db.list_turns(&session_id).await {
        Ok(turns) => Json(turns).into_response(),
        Err(e) => internal("get_conversation", e),
    }
}

/// POST /api/conversation
///
/// Appends a turn written outside the WebSocket flow. Session progress is
/// untouched.
async fn append_conversation(
    State(state): State<BrandRouteState>,
    Json(request): Json<AppendTurnRequest>,
) -> Response {
    let Ok(role) = request.role.parse::<TurnRole>() else {
        return error_json(StatusCode::BAD_REQUEST, "role must be \"user\" or \"assistant\"");
    };
    if request.content.trim().is_empty() {
        return error_json(StatusCode::BAD_REQUEST, "content must not be empty");
    }
    if let Err(response) =
        require_session(state.db.as_ref(), &request.session_id, "append_conversation").await
    {
        return response;
    }

    match state
        .db
        .append_turn(&request.session_id, role, &request.content)
        .await
    {
        Ok(turn) => (StatusCode::CREATED, Json(turn)).into_response(),
        Err(e) => internal("append_conversation", e),
    }
}

/// Build the REST routes.
pub fn brand_routes(state: BrandRouteState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/brand/start", post(start_session))
        .route("/api/brand/sessions", get(list_sessions))
        .route("/api/brand/sessions/{id}", get(get_session))
        .route("/api/brand/{session_id}/voice", patch(set_voice_mode))
        .route("/api/brand/answers/{session_id}", get(list_answers))
        .route("/api/brand/qa/{session_id}/{step_key}", get(get_answer))
        .route("/api/brand/update-answer", put(update_answer))
        .route("/api/conversation", post(append_conversation))
        .route("/api/conversation/{session_id}", get(get_conversation))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request};
    use tower::ServiceExt;

    use super::*;
    use crate::store::LibSqlBackend;

    async fn setup() -> (Router, Arc<LibSqlBackend>) {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let router = brand_routes(BrandRouteState {
            db: db.clone(),
            catalog: Arc::new(QuestionCatalog::brand_default()),
        });
        (router, db)
    }

    async fn call(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn start_creates_draft_session() {
        let (router, db) = setup().await;
        let (status, body) = call(
            &router,
            Method::POST,
            "/api/brand/start",
            Some(serde_json::json!({"isVoice": true})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let id = body["id"].as_str().unwrap();
        let session = db.get_session(id).await.unwrap().unwrap();
        assert_eq!(session.mode, SessionMode::Voice);
        assert_eq!(session.current_index, 0);
        assert_eq!(session.status, SessionStatus::Draft);
    }

    #[tokio::test]
    async fn start_without_body_defaults_to_text() {
        let (router, db) = setup().await;
        let (status, body) = call(&router, Method::POST, "/api/brand/start", None).await;
        assert_eq!(status, StatusCode::OK);
        let session = db
            .get_session(body["id"].as_str().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.mode, SessionMode::Text);
    }

    #[tokio::test]
    async fn session_lookup_and_listing() {
        let (router, db) = setup().await;
        let session = db.create_session(SessionMode::Text).await.unwrap();

        let (status, body) = call(&router, Method::GET, &format!("/api/brand/sessions/{}", session.id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["currentIndex"], 0);
        assert_eq!(body["voiceMode"], false);
        assert_eq!(body["status"], "draft");

        let (status, _) = call(&router, Method::GET, "/api/brand/sessions/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, list) = call(&router, Method::GET, "/api/brand/sessions", None).await;
        assert_eq!(list.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn voice_toggle_validates_body() {
        let (router, db) = setup().await;
        let session = db.create_session(SessionMode::Text).await.unwrap();
        let uri = format!("/api/brand/{}/voice", session.id);

        let (status, _) = call(&router, Method::PATCH, &uri, Some(serde_json::json!({"voiceMode": "yes"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(&router, Method::PATCH, &uri, Some(serde_json::json!({"voiceMode": true}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["voiceMode"], true);
        let stored = db.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(stored.mode, SessionMode::Voice);
        assert_eq!(stored.current_index, 0);

        let (status, _) = call(
            &router,
            Method::PATCH,
            "/api/brand/missing/voice",
            Some(serde_json::json!({"voiceMode": true})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn answers_come_back_in_catalog_order() {
        let (router, db) = setup().await;
        let session = db.create_session(SessionMode::Text).await.unwrap();
        db.upsert_answer(&session.id, "brandCategory", "Category?", "Food")
            .await
            .unwrap();
        db.upsert_answer(&session.id, "brandName", "Name?", "Zesti")
            .await
            .unwrap();

        let (_, body) = call(&router, Method::GET, &format!("/api/brand/answers/{}", session.id), None).await;
        let keys: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["key"].as_str().unwrap())
            .collect();
        assert_eq!(keys, ["brandName", "brandCategory"]);

        let (status, qa) = call(&router, Method::GET, &format!("/api/brand/qa/{}/brandName", session.id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(qa["answer"], "Zesti");

        let (status, _) = call(&router, Method::GET, &format!("/api/brand/qa/{}/brandTone", session.id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn update_answer_never_creates() {
        let (router, db) = setup().await;
        let session = db.create_session(SessionMode::Text).await.unwrap();

        let (status, body) = call(
            &router,
            Method::PUT,
            "/api/brand/update-answer",
            Some(serde_json::json!({"sessionId": session.id, "key": "brandName", "newAnswer": "Zesti"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert!(db.list_answers(&session.id).await.unwrap().is_empty());

        db.upsert_answer(&session.id, "brandName", "Name?", "Zesti")
            .await
            .unwrap();
        let (_, body) = call(
            &router,
            Method::PUT,
            "/api/brand/update-answer",
            Some(serde_json::json!({"sessionId": session.id, "key": "brandName", "newAnswer": "Zestier"})),
        )
        .await;
        assert_eq!(body["success"], true);
        let stored = db.get_answer(&session.id, "brandName").await.unwrap().unwrap();
        assert_eq!(stored.answer, "Zestier");
        assert_eq!(db.get_session(&session.id).await.unwrap().unwrap().current_index, 0);
    }

    #[tokio::test]
    async fn conversation_lists_turns_in_order() {
        let (router, db) = setup().await;
        let session = db.create_session(SessionMode::Text).await.unwrap();
        db.append_turn(&session.id, TurnRole::User, "hi").await.unwrap();
        db.append_turn(&session.id, TurnRole::Assistant, "hello").await.unwrap();

        let (status, body) = call(&router, Method::GET, &format!("/api/conversation/{}", session.id), None).await;
        assert_eq!(status, StatusCode::OK);
        let turns = body.as_array().unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0]["role"], "user");
        assert_eq!(turns[1]["content"], "hello");

        let (status, _) = call(&router, Method::GET, "/api/conversation/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn conversation_append_creates_turn() {
        let (router, db) = setup().await;
        let session = db.create_session(SessionMode::Text).await.unwrap();
        db.append_turn(&session.id, TurnRole::User, "hi").await.unwrap();

        let (status, body) = call(
            &router,
            Method::POST,
            "/api/conversation",
            Some(serde_json::json!({"sessionId": session.id, "role": "assistant", "content": "hello"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["sessionId"], session.id.as_str());
        assert_eq!(body["role"], "assistant");
        assert_eq!(body["content"], "hello");

        let turns = db.list_turns(&session.id).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].role, TurnRole::Assistant);
        assert!(turns[0].seq < turns[1].seq);
        assert_eq!(db.get_session(&session.id).await.unwrap().unwrap().current_index, 0);
    }

    #[tokio::test]
    async fn conversation_append_rejects_bad_input() {
        let (router, db) = setup().await;
        let session = db.create_session(SessionMode::Text).await.unwrap();

        let (status, _) = call(
            &router,
            Method::POST,
            "/api/conversation",
            Some(serde_json::json!({"sessionId": "missing", "role": "user", "content": "hi"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(
            &router,
            Method::POST,
            "/api/conversation",
            Some(serde_json::json!({"sessionId": session.id, "role": "system", "content": "hi"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &router,
            Method::POST,
            "/api/conversation",
            Some(serde_json::json!({"sessionId": session.id, "role": "user", "content": "  "})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(db.list_turns(&session.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (router, _) = setup().await;
        let (status, body) = call(&router, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }
}
