//! Conversation state machine: derived per turn from the persisted session.
//!
//! `Asking(i)` → `AwaitingConfirmation(i)` → (advance) → `Asking(i + 1)` or
//! `Complete`. The index never moves backward and moves forward by exactly
//! one per confirmed turn.

use super::catalog::QuestionCatalog;
use super::model::{Session, SessionStatus};
use super::validator::GeneratorDecision;

/// Where a session stands in the question sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationState {
    /// The question at `index` has been presented; nothing proposed yet.
    Asking { index: usize },
    /// The assistant proposed `candidate` for step `index` and asked the user
    /// to confirm it.
    AwaitingConfirmation { index: usize, candidate: String },
    /// Every catalog question has a confirmed answer.
    Complete,
}

impl ConversationState {
    /// Derive the state from a session snapshot.
    pub fn of(session: &Session, catalog: &QuestionCatalog) -> Self {
        if session.status == SessionStatus::Complete || catalog.is_complete(session.current_index)
        {
            return Self::Complete;
        }
        match session.pending_answer.as_deref().map(str::trim) {
            Some(candidate) if !candidate.is_empty() => Self::AwaitingConfirmation {
                index: session.current_index,
                candidate: candidate.to_string(),
            },
            _ => Self::Asking {
                index: session.current_index,
            },
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Index of the step currently being worked on.
    pub fn step_index(&self) -> Option<usize> {
        match self {
            Self::Asking { index } | Self::AwaitingConfirmation { index, .. } => Some(*index),
            Self::Complete => None,
        }
    }

    pub fn candidate(&self) -> Option<&str> {
        match self {
            Self::AwaitingConfirmation { candidate, .. } => Some(candidate),
            _ => None,
        }
    }

    /// Apply the forced-progress rule: proposing the same answer a second
    /// time in a row counts as confirmation, whatever the generator said.
    pub fn resolve(&self, decision: GeneratorDecision) -> GeneratorDecision {
        let forced = match (self, &decision) {
            (
                Self::AwaitingConfirmation { candidate, .. },
                GeneratorDecision::Unsure { answer, .. },
            ) => same_answer(candidate, answer),
            _ => false,
        };
        if forced {
            decision.into_confirm()
        } else {
            decision
        }
    }
}

impl std::fmt::Display for ConversationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Asking { index } => write!(f, "asking({index})"),
            Self::AwaitingConfirmation { index, .. } => write!(f, "awaiting_confirmation({index})"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

/// Trimmed, case-insensitive comparison. Empty answers never match.
fn same_answer(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    !a.is_empty() && a.to_lowercase() == b.to_lowercase()
}
