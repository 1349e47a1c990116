//! Brand onboarding, a conversational wizard that walks a user through a
//! fixed list of questions, one confirmed answer at a time.
//!
//! Each user turn goes to a content generator, whose JSON decision is
//! validated before any state changes. A step only advances once the user
//! has confirmed the proposed answer.

pub mod catalog;
pub mod engine;
pub mod generator;
pub mod model;
pub mod prompts;
pub mod routes;
pub mod state;
pub mod validator;
pub mod ws;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use catalog::{CatalogEntry, QuestionCatalog};
pub use engine::ConversationEngine;
pub use generator::{ContentGenerator, LlmContentGenerator};
pub use model::{BotStatus, ClientMessage, ServerMessage, Session, SessionMode, SessionStatus};
pub use routes::{BrandRouteState, brand_routes};
pub use state::ConversationState;
pub use ws::ws_routes;

/// The full HTTP surface: `/ws`, the REST routes and `/health`.
pub fn app_router(engine: Arc<ConversationEngine>, state: BrandRouteState) -> Router {
    ws_routes(engine)
        .merge(brand_routes(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
