//! Bridges rig's `CompletionModel` to our `LlmProvider` trait.

use async_trait::async_trait;
use rig::completion::{AssistantContent, CompletionModel, Message};

use crate::error::LlmError;

use super::provider::{ChatMessage, CompletionRequest, CompletionResponse, LlmProvider, Role};

/// Wraps any rig completion model.
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
}

impl<M> RigAdapter<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }
}

/// Split our flat message list into rig's preamble / history / prompt shape.
///
/// System messages are joined into the preamble. The last user message is the
/// prompt; everything before it becomes history.
fn split_messages(messages: &[ChatMessage]) -> (Option<String>, Vec<Message>, Option<String>) {
    let preamble: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();
    let preamble = if preamble.is_empty() {
        None
    } else {
        Some(preamble.join("\n\n"))
    };

    let mut turns: Vec<&ChatMessage> = messages.iter().filter(|m| m.role != Role::System).collect();
    let prompt = match turns.last() {
        Some(last) if last.role == Role::User => turns.pop().map(|m| m.content.clone()),
        _ => None,
    };

    let history = turns
        .into_iter()
        .map(|m| match m.role {
            Role::Assistant => Message::assistant(m.content.clone()),
            _ => Message::user(m.content.clone()),
        })
        .collect();

    (preamble, history, prompt)
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let (preamble, history, prompt) = split_messages(&request.messages);
        let prompt = prompt.ok_or_else(|| LlmError::RequestFailed {
            provider: self.model_name.clone(),
            reason: "completion request has no trailing user message".to_string(),
        })?;

        let mut builder = self
            .model
            .completion_request(Message::user(prompt))
            .messages(history);
        if let Some(preamble) = preamble {
            builder = builder.preamble(preamble);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(temperature as f64);
        }
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(max_tokens as u64);
        }

        let response = builder.send().await.map_err(|e| LlmError::RequestFailed {
            provider: self.model_name.clone(),
            reason: e.to_string(),
        })?;

        let content: String = response
            .choice
            .iter()
            .filter_map(|c| match c {
                AssistantContent::Text(text) => Some(text.text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");

        Ok(CompletionResponse {
            content,
            input_tokens: response.usage.input_tokens as u32,
            output_tokens: response.usage.output_tokens as u32,
        })
    }
}
