//! Response validator: turns the generator's raw text into a typed decision.
//!
//! The generator is asked for a bare JSON object but often wraps it in a
//! markdown fence. We try the raw text first, then every fenced block.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::ConversationError;

/// A markdown fence whose opening and closing markers each start a line.
static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*```[A-Za-z]*[ \t]*\r?\n([\s\S]*?)\r?\n?[ \t]*```[ \t]*\r?$")
        .expect("fenced block regex is valid")
});

/// The validated outcome of one generator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratorDecision {
    /// The step is not resolved yet; `answer` is the current best guess.
    Unsure { content: String, answer: String },
    /// The user confirmed `answer` for the current step.
    Confirm { content: String, answer: String },
}

impl GeneratorDecision {
    pub fn content(&self) -> &str {
        match self {
            Self::Unsure { content, .. } | Self::Confirm { content, .. } => content,
        }
    }

    pub fn answer(&self) -> &str {
        match self {
            Self::Unsure { answer, .. } | Self::Confirm { answer, .. } => answer,
        }
    }

    pub fn is_confirm(&self) -> bool {
        matches!(self, Self::Confirm { .. })
    }

    pub fn status_str(&self) -> &'static str {
        match self {
            Self::Unsure { .. } => "unsure",
            Self::Confirm { .. } => "confirm",
        }
    }

    /// Promote an `Unsure` decision to `Confirm`, keeping its text.
    pub fn into_confirm(self) -> Self {
        match self {
            Self::Unsure { content, answer } => Self::Confirm { content, answer },
            confirm => confirm,
        }
    }
}

/// Parse and validate raw generator output.
pub fn parse_decision(raw: &str) -> Result<GeneratorDecision, ConversationError> {
    if let Some(decision) = try_parse(raw.trim()) {
        return Ok(decision);
    }

    for captures in FENCED_BLOCK.captures_iter(raw) {
        if let Some(decision) = captures.get(1).and_then(|m| try_parse(m.as_str())) {
            return Ok(decision);
        }
    }

    Err(ConversationError::InvalidGeneratorOutput(truncate(raw, 200)))
}

fn try_parse(text: &str) -> Option<GeneratorDecision> {
    let value: Value = serde_json::from_str(text).ok()?;
    validate(&value)
}

/// Structural check: `content` and `answer` are strings, `status` is one of
/// the two known values.
fn validate(value: &Value) -> Option<GeneratorDecision> {
    let obj = value.as_object()?;
    let content = obj.get("content")?.as_str()?.to_string();
    let answer = obj.get("answer")?.as_str()?.to_string();
    match obj.get("status")?.as_str()? {
        "confirm" => Some(GeneratorDecision::Confirm { content, answer }),
        "unsure" => Some(GeneratorDecision::Unsure { content, answer }),
        _ => None,
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{cut}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_json() {
        let raw = r#"{"content":"Nice, locking it in!","status":"confirm","answer":"Zesti"}"#;
        let decision = parse_decision(raw).unwrap();
        assert_eq!(
            decision,
            GeneratorDecision::Confirm {
                content: "Nice, locking it in!".into(),
                answer: "Zesti".into()
            }
        );
    }

    #[test]
    fn parses_json_fence_with_surrounding_text() {
        let raw = "Sure thing!\n```json\n{\"content\":\"Should we go with SnapSeed?\",\"status\":\"unsure\",\"answer\":\"SnapSeed\"}\n```\nDone.";
        let decision = parse_decision(raw).unwrap();
        assert!(!decision.is_confirm());
        assert_eq!(decision.answer(), "SnapSeed");
    }

    #[test]
    fn parses_untagged_fence() {
        let raw = "```\n{\"content\":\"ok\",\"status\":\"unsure\",\"answer\":\"x\"}\n```";
        assert_eq!(parse_decision(raw).unwrap().content(), "ok");
    }

    #[test]
    fn skips_invalid_fence_and_uses_later_one() {
        let raw = "```json\n{\"oops\": true}\n```\n```json\n{\"content\":\"c\",\"status\":\"confirm\",\"answer\":\"a\"}\n```";
        assert!(parse_decision(raw).unwrap().is_confirm());
    }

    #[test]
    fn inline_backticks_in_prose_are_not_a_fence() {
        let raw = "Tip: wrap code in ``` marks.\n```json\n{\"content\":\"ok\",\"status\":\"confirm\",\"answer\":\"Zesti\"}\n```";
        let decision = parse_decision(raw).unwrap();
        assert!(decision.is_confirm());
        assert_eq!(decision.answer(), "Zesti");
    }

    #[test]
    fn crlf_fence_is_parsed() {
        let raw = "Here you go:\r\n```json\r\n{\"content\":\"c\",\"status\":\"unsure\",\"answer\":\"a\"}\r\n```\r\n";
        assert_eq!(parse_decision(raw).unwrap().answer(), "a");
    }

    #[test]
    fn plain_refusal_is_invalid() {
        let err = parse_decision("Sorry, I cannot help.").unwrap_err();
        assert!(matches!(err, ConversationError::InvalidGeneratorOutput(_)));
    }

    #[test]
    fn unknown_status_is_invalid() {
        let raw = r#"{"content":"hi","status":"maybe","answer":"x"}"#;
        assert!(parse_decision(raw).is_err());
    }

    #[test]
    fn non_string_fields_are_invalid() {
        assert!(parse_decision(r#"{"content":1,"status":"unsure","answer":"x"}"#).is_err());
        assert!(parse_decision(r#"{"content":"c","status":"unsure","answer":null}"#).is_err());
        assert!(parse_decision(r#"{"content":"c","status":"unsure"}"#).is_err());
        assert!(parse_decision(r#"["content","status","answer"]"#).is_err());
    }

    #[test]
    fn extra_fields_are_tolerated() {
        let raw = r#"{"content":"c","status":"unsure","answer":"a","confidence":0.4}"#;
        assert!(parse_decision(raw).is_ok());
    }

    #[test]
    fn into_confirm_keeps_text() {
        let d = GeneratorDecision::Unsure {
            content: "Go with Zesti?".into(),
            answer: "Zesti".into(),
        }
        .into_confirm();
        assert!(d.is_confirm());
        assert_eq!(d.answer(), "Zesti");
        assert_eq!(d.status_str(), "confirm");
    }

    #[test]
    fn error_payload_is_truncated() {
        let raw = "x".repeat(1000);
        match parse_decision(&raw).unwrap_err() {
            ConversationError::InvalidGeneratorOutput(snippet) => {
                assert!(snippet.chars().count() <= 201)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
