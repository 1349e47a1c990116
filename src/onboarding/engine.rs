//! ConversationEngine: drives one session through the question catalog.
//!
//! Each call handles exactly one inbound frame. Session and answer state is
//! only mutated through the `Database` trait, and only after the generator's
//! output has been fully validated.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::ConversationError;
use crate::store::Database;

use super::catalog::{CatalogEntry, QuestionCatalog};
use super::generator::ContentGenerator;
use super::model::{BotStatus, ClientMessage, ServerMessage, Session, SessionMode, SessionUpdate, TurnRole};
use super::prompts::{PromptInput, build_prompt, mode_transition_message, render_history};
use super::state::ConversationState;
use super::validator::{GeneratorDecision, parse_decision};

/// Sent when the last catalog step is confirmed.
pub const CATALOG_FINISHED: &str = "All questions answered. Great job!";

/// Sent when a finished session is resumed or messaged again.
pub const ALREADY_COMPLETE: &str = "All questions are complete!";

/// Coordinates the stores, prompt builder, generator and validator.
pub struct ConversationEngine {
    db: Arc<dyn Database>,
    generator: Arc<dyn ContentGenerator>,
    catalog: Arc<QuestionCatalog>,
    config: EngineConfig,
}

impl ConversationEngine {
    pub fn new(
        db: Arc<dyn Database>,
        generator: Arc<dyn ContentGenerator>,
        catalog: Arc<QuestionCatalog>,
        config: EngineConfig,
    ) -> Self {
        Self {
            db,
            generator,
            catalog,
            config,
        }
    }

    /// Handle one inbound frame for a connection.
    ///
    /// `bound` is the connection's session binding; a successful `start`
    /// replaces it. Errors leave the binding untouched.
    pub async fn handle(
        &self,
        bound: &mut Option<String>,
        message: ClientMessage,
    ) -> Result<ServerMessage, ConversationError> {
        match message {
            ClientMessage::Start { session_id, mode } => {
                let session_id = session_id
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .ok_or(ConversationError::MissingSessionId)?;
                let reply = self.start(&session_id, mode).await?;
                *bound = Some(session_id);
                Ok(reply)
            }
            ClientMessage::UserMessage { message } => {
                let session_id = bound.as_deref().ok_or(ConversationError::NotStarted)?;
                self.handle_user_message(session_id, &message).await
            }
            ClientMessage::SwitchMode { mode } => {
                let session_id = bound.as_deref().ok_or(ConversationError::NotStarted)?;
                self.switch_mode(session_id, mode).await
            }
        }
    }

    /// Resume a session at its current question, optionally changing mode.
    pub async fn start(
        &self,
        session_id: &str,
        mode: Option<SessionMode>,
    ) -> Result<ServerMessage, ConversationError> {
        let mut session = self.load_session(session_id).await?;

        if let Some(mode) = mode.filter(|m| *m != session.mode) {
            session = self
                .db
                .update_session(session_id, SessionUpdate::mode(mode))
                .await?;
        }

        let state = ConversationState::of(&session, &self.catalog);
        info!(session_id, state = %state, mode = %session.mode, "Session started");

        Ok(match self.current_entry(&state) {
            Some(entry) => ServerMessage::bot(entry.question.clone(), BotStatus::Ask),
            None => ServerMessage::end(ALREADY_COMPLETE),
        })
    }

    /// Process one user turn.
    pub async fn handle_user_message(
        &self,
        session_id: &str,
        message: &str,
    ) -> Result<ServerMessage, ConversationError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ConversationError::EmptyMessage);
        }

        let session = self.load_session(session_id).await?;
        let state = ConversationState::of(&session, &self.catalog);

        let (Some(index), Some(entry)) = (state.step_index(), self.current_entry(&state)) else {
            self.db.append_turn(session_id, TurnRole::User, message).await?;
            debug!(session_id, "Message on completed session");
            return Ok(ServerMessage::end(ALREADY_COMPLETE));
        };

        let prior_turns = self.db.list_turns(session_id).await?;
        self.db.append_turn(session_id, TurnRole::User, message).await?;

        let previous_qa = self.previous_qa(session_id, index).await?;
        let history = render_history(&prior_turns, self.config.history_limit);
        let prompt = build_prompt(&PromptInput {
            mode: session.mode,
            step_index: index,
            question: &entry.question,
            previous_qa: &previous_qa,
            history: &history,
            user_message: message,
            pending_answer: state.candidate(),
        });

        let raw = self.generator.generate(&prompt).await.map_err(|e| {
            warn!(session_id, step = %entry.key, error = %e, "Generator call failed");
            ConversationError::from(e)
        })?;

        let decision = parse_decision(&raw).map_err(|e| {
            warn!(session_id, step = %entry.key, error = %e, "Rejected generator output");
            e
        })?;
        let decision = state.resolve(decision);
        debug!(session_id, step = %entry.key, status = decision.status_str(), "Generator decision");

        match decision {
            GeneratorDecision::Unsure { content, answer } => {
                self.record_unsure(session_id, &content, &answer).await
            }
            GeneratorDecision::Confirm { content, answer } => {
                let answer = match answer.trim() {
                    "" => state
                        .candidate()
                        .map(str::to_string)
                        .ok_or_else(|| {
                            ConversationError::InvalidGeneratorOutput(
                                "confirmation without an answer".to_string(),
                            )
                        })?,
                    trimmed => trimmed.to_string(),
                };
                self.record_confirm(session_id, index, entry, &content, &answer)
                    .await
            }
        }
    }

    /// Change chat/voice mode and resume at the unchanged current question.
    pub async fn switch_mode(
        &self,
        session_id: &str,
        mode: SessionMode,
    ) -> Result<ServerMessage, ConversationError> {
        self.load_session(session_id).await?;
        let session = self
            .db
            .update_session(session_id, SessionUpdate::mode(mode))
            .await?;
        let state = ConversationState::of(&session, &self.catalog);
        info!(session_id, mode = %mode, state = %state, "Mode switched");

        match self.current_entry(&state) {
            Some(entry) => {
                let content = mode_transition_message(mode, &entry.question);
                self.db
                    .append_turn(session_id, TurnRole::Assistant, &content)
                    .await?;
                Ok(ServerMessage::bot(content, BotStatus::Ask))
            }
            None => Ok(ServerMessage::end(ALREADY_COMPLETE)),
        }
    }

    async fn record_unsure(
        &self,
        session_id: &str,
        content: &str,
        answer: &str,
    ) -> Result<ServerMessage, ConversationError> {
        self.db
            .append_turn(session_id, TurnRole::Assistant, content)
            .await?;
        let candidate = answer.trim();
        let pending = (!candidate.is_empty()).then(|| candidate.to_string());
        self.db
            .update_session(session_id, SessionUpdate::pending_answer(pending))
            .await?;
        Ok(ServerMessage::bot(content, BotStatus::Unsure))
    }

    async fn record_confirm(
        &self,
        session_id: &str,
        index: usize,
        entry: &CatalogEntry,
        content: &str,
        answer: &str,
    ) -> Result<ServerMessage, ConversationError> {
        // Transcript, then answer, then cursor. A failure before the advance
        // leaves the step open, so the user can simply resend.
        self.db
            .append_turn(session_id, TurnRole::Assistant, content)
            .await?;
        self.db
            .upsert_answer(session_id, &entry.key, &entry.question, answer)
            .await?;

        let complete = self.catalog.is_complete(index + 1);
        let session = match self.db.advance_session(session_id, index, complete).await? {
            Some(session) => {
                info!(session_id, step = %entry.key, next_index = session.current_index, "Step confirmed");
                session
            }
            None => {
                warn!(session_id, step = %entry.key, from_index = index, "Session advanced concurrently");
                self.load_session(session_id).await?
            }
        };

        let next = ConversationState::of(&session, &self.catalog);
        Ok(match self.current_entry(&next) {
            Some(next_entry) => ServerMessage::bot(
                format!("{content} {}", next_entry.question),
                BotStatus::Confirm,
            ),
            None => {
                info!(session_id, "Onboarding complete");
                ServerMessage::end(CATALOG_FINISHED)
            }
        })
    }

    async fn load_session(&self, session_id: &str) -> Result<Session, ConversationError> {
        self.db
            .get_session(session_id)
            .await?
            .ok_or_else(|| ConversationError::SessionNotFound(session_id.to_string()))
    }

    fn current_entry(&self, state: &ConversationState) -> Option<&CatalogEntry> {
        state.step_index().and_then(|i| self.catalog.get(i))
    }

    /// Prior steps with whatever answers exist, never anything at or past `index`.
    async fn previous_qa(
        &self,
        session_id: &str,
        index: usize,
    ) -> Result<Vec<(String, Option<String>)>, ConversationError> {
        let prior = self.catalog.before(index);
        let keys: Vec<&str> = prior.iter().map(|e| e.key.as_str()).collect();
        let mut answers = self.db.list_answers_by_keys(session_id, &keys).await?;
        Ok(prior
            .iter()
            .map(|e| (e.question.clone(), answers.remove(&e.key)))
            .collect())
    }
}
