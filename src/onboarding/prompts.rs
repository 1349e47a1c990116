//! Prompt builder for the onboarding conversation.
//!
//! The generator keeps no memory between calls, so every prompt carries the
//! confirmed answers so far, the recent transcript, and any candidate answer
//! still waiting for the user's confirmation.

use super::model::{SessionMode, TranscriptTurn};

/// Everything needed to build one turn's prompt.
#[derive(Debug, Clone)]
pub struct PromptInput<'a> {
    pub mode: SessionMode,
    /// Index of the current step; step 0 gets the richer template.
    pub step_index: usize,
    pub question: &'a str,
    /// Prior steps in catalog order, with their confirmed answers.
    pub previous_qa: &'a [(String, Option<String>)],
    /// Rendered transcript (see [`render_history`]).
    pub history: &'a str,
    pub user_message: &'a str,
    /// Candidate the assistant already asked the user to confirm.
    pub pending_answer: Option<&'a str>,
}

const RESPONSE_FORMAT: &str = r#"Analyze the user's most recent message and respond ONLY with a JSON object in exactly this shape, with no other text:

{
  "content": "<friendly response (max 50 words). If the user is unsure, gently suggest next steps. If the user gives a clear name or idea, politely ask for confirmation, but only once. If confirmed, add a short friendly transition.>",
  "status": "confirm" | "unsure",
  "answer": "<the clear answer if confident; otherwise your best inference from the message>"
}"#;

const RULES: &str = r#"Rules:

1. If the user's message is vague, indecisive, or uncertain ("maybe", "not sure", "I don't know"):
   - Set "status": "unsure"
   - Offer 2-3 creative suggestions or one guiding question
   - Infer the user's intent and set "answer" accordingly

2. If the user gives a clear answer for the first time:
   - Set "status": "unsure" and ask for confirmation ONCE, e.g. "Nice choice! Should we go ahead with <answer>?"

3. Set "status": "confirm" ONLY when the assistant has already asked for confirmation of an answer and the user agrees ("Yes, go with it", "That's perfect", "Let's do that", "Confirmed"). Never ask for confirmation twice.

4. General:
   - Keep the tone supportive and professional
   - Ask one question at a time and never re-ask a question that already has an answer
   - Use short, emotionally intelligent sentences"#;

const FIRST_STEP_EXAMPLES: &str = r#"Examples:

User: "Something fresh and fun, maybe?"
{"content": "How about names like Zesti, Bloomly, or SnapSeed? Which direction feels right to you?", "status": "unsure", "answer": "fresh and fun brand"}

User: "I like SnapSeed"
{"content": "Nice choice! Should we go ahead with SnapSeed?", "status": "unsure", "answer": "SnapSeed"}

User: "Yes, go with SnapSeed"
{"content": "Perfect, we've locked that in!", "status": "confirm", "answer": "SnapSeed"}"#;

const MODE_TRANSITION_GUIDANCE: &str = r#"Mode switching:
- The user may switch between chat and voice at any time.
- When that happens, remember every question already asked and answered.
- Say a natural one-line transition and continue with the current unanswered question.
  For example, after switching from chat to voice: "Great, you're on voice now. Let's keep going." "#;

fn mode_guidance(mode: SessionMode) -> &'static str {
    match mode {
        SessionMode::Voice => {
            "The user is in VOICE mode: keep \"content\" short, natural to speak aloud, and free of lists or markdown."
        }
        SessionMode::Text => "The user is in CHAT mode: keep \"content\" concise and friendly.",
    }
}

/// Render prior Q&A for prompt context. Unanswered steps are marked as such.
fn render_previous_qa(previous_qa: &[(String, Option<String>)]) -> String {
    if previous_qa.is_empty() {
        return "(none yet)".to_string();
    }
    previous_qa
        .iter()
        .map(|(question, answer)| {
            format!(
                "- Q: {question}\n  A: {}",
                answer.as_deref().unwrap_or("(not answered)")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_pending(pending_answer: Option<&str>) -> String {
    match pending_answer {
        Some(answer) => format!(
            "The assistant already asked the user to confirm this answer: \"{answer}\". \
             If the user agrees, respond with status \"confirm\" and this answer."
        ),
        None => "No answer is waiting for confirmation yet.".to_string(),
    }
}

/// Render the most recent `limit` transcript turns as `Role: text` lines.
pub fn render_history(turns: &[TranscriptTurn], limit: usize) -> String {
    let start = turns.len().saturating_sub(limit);
    turns[start..]
        .iter()
        .map(|t| format!("{}: {}", t.role.label(), t.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the prompt for one turn. Pure and deterministic.
pub fn build_prompt(input: &PromptInput<'_>) -> String {
    if input.step_index == 0 {
        first_step_prompt(input)
    } else {
        generic_prompt(input)
    }
}

fn first_step_prompt(input: &PromptInput<'_>) -> String {
    format!(
        "You are a helpful brand naming assistant guiding the user through choosing their brand name.\n\n\
         {RESPONSE_FORMAT}\n\n\
         {RULES}\n\n\
         {FIRST_STEP_EXAMPLES}\n\n\
         {MODE_TRANSITION_GUIDANCE}\n\
         {mode}\n\n\
         Current step: {question}\n\n\
         {pending}\n\n\
         Chat history:\n{history}\n\n\
         Most recent user message:\nUser: \"{message}\"\n\n\
         Respond with the JSON object only.",
        mode = mode_guidance(input.mode),
        question = input.question,
        pending = render_pending(input.pending_answer),
        history = input.history,
        message = input.user_message,
    )
}

fn generic_prompt(input: &PromptInput<'_>) -> String {
    format!(
        "You are a friendly and emotionally intelligent branding assistant guiding the user step by step \
         through building their brand identity.\n\n\
         {RESPONSE_FORMAT}\n\n\
         {RULES}\n\n\
         {mode}\n\n\
         Previous Q&A:\n{previous}\n\n\
         Current branding question: {question}\n\n\
         {pending}\n\n\
         Conversation history:\n{history}\n\n\
         User's latest message: {message}\n\n\
         Respond with the JSON object only.",
        mode = mode_guidance(input.mode),
        previous = render_previous_qa(input.previous_qa),
        question = input.question,
        pending = render_pending(input.pending_answer),
        history = input.history,
        message = input.user_message,
    )
}

/// One-time message sent after a mode switch, resuming at the current question.
pub fn mode_transition_message(mode: SessionMode, question: &str) -> String {
    match mode {
        SessionMode::Voice => format!("Great, you're on voice now. Let's keep going. {question}"),
        SessionMode::Text => format!("Got it, we're back in chat. Let's pick up where we left off. {question}"),
    }
}
