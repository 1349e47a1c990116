//! Session, transcript and answer data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How the user is talking to the wizard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    #[default]
    Text,
    Voice,
}

impl SessionMode {
    pub fn is_voice(&self) -> bool {
        matches!(self, Self::Voice)
    }
}

impl std::fmt::Display for SessionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Voice => write!(f, "voice"),
        }
    }
}

impl std::str::FromStr for SessionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "voice" => Ok(Self::Voice),
            other => Err(format!("unknown session mode: {other}")),
        }
    }
}

/// Lifecycle of an onboarding session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Draft,
    Complete,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "complete" => Ok(Self::Complete),
            other => Err(format!("unknown session status: {other}")),
        }
    }
}

/// One onboarding run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    /// Progress cursor into the question catalog. Never decreases.
    pub current_index: usize,
    pub mode: SessionMode,
    pub status: SessionStatus,
    /// Candidate answer the assistant last asked the user to confirm for the
    /// current step. Cleared whenever the index advances.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_answer: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update applied by `Database::update_session`.
///
/// `pending_answer: Some(None)` clears the candidate.
#[derive(Debug, Clone, Default)]
pub struct SessionUpdate {
    pub mode: Option<SessionMode>,
    pub status: Option<SessionStatus>,
    pub pending_answer: Option<Option<String>>,
}

impl SessionUpdate {
    pub fn mode(mode: SessionMode) -> Self {
        Self {
            mode: Some(mode),
            ..Default::default()
        }
    }

    pub fn pending_answer(answer: Option<String>) -> Self {
        Self {
            pending_answer: Some(answer),
            ..Default::default()
        }
    }

    /// Apply this update to a session in place.
    pub fn apply(&self, session: &mut Session) {
        if let Some(mode) = self.mode {
            session.mode = mode;
        }
        if let Some(status) = self.status {
            session.status = status;
        }
        if let Some(ref pending) = self.pending_answer {
            session.pending_answer = pending.clone();
        }
    }
}

/// Who authored a transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Label used when rendering history into a prompt.
    pub fn label(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }
}

impl std::str::FromStr for TurnRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(format!("unknown turn role: {other}")),
        }
    }
}

/// One message in a session's transcript. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptTurn {
    pub id: String,
    pub session_id: String,
    /// Per-session insertion sequence; breaks `created_at` ties.
    pub seq: i64,
    pub role: TurnRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Confirmed answer for one catalog step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub session_id: String,
    pub step_key: String,
    pub question: String,
    pub answer: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ── WebSocket protocol ──────────────────────────────────────────────

/// Inbound WebSocket frames.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Bind the connection to a session and ask the current question.
    Start {
        #[serde(rename = "sessionId", default)]
        session_id: Option<String>,
        #[serde(default)]
        mode: Option<SessionMode>,
    },
    /// One user turn.
    UserMessage { message: String },
    /// Toggle between chat and voice without losing progress.
    SwitchMode { mode: SessionMode },
}

/// Status attached to a `bot_message` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotStatus {
    Ask,
    Unsure,
    Confirm,
}

/// Outbound WebSocket frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    BotMessage { content: String, status: BotStatus },
    End { message: String },
    Error { message: String },
}

impl ServerMessage {
    pub fn bot(content: impl Into<String>, status: BotStatus) -> Self {
        Self::BotMessage {
            content: content.into(),
            status,
        }
    }

    pub fn end(message: impl Into<String>) -> Self {
        Self::End {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
