//! Content generator: prompt in, raw text out.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::LlmError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};

/// External text-generation collaborator invoked once per user turn.
///
/// Output is expected to contain a JSON object but is not trusted; see
/// `validator::parse_decision`.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

/// `ContentGenerator` backed by an `LlmProvider`, bounded by a timeout.
pub struct LlmContentGenerator {
    llm: Arc<dyn LlmProvider>,
    timeout: Duration,
    temperature: f32,
    max_tokens: u32,
}

impl LlmContentGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>, config: &EngineConfig) -> Self {
        Self {
            llm,
            timeout: config.generator_timeout,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

#[async_trait]
impl ContentGenerator for LlmContentGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let request = CompletionRequest::new(vec![ChatMessage::user(prompt)])
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);

        let response = tokio::time::timeout(self.timeout, self.llm.complete(request))
            .await
            .map_err(|_| LlmError::Timeout {
                provider: self.llm.model_name().to_string(),
                timeout: self.timeout,
            })??;

        debug!(
            model = self.llm.model_name(),
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "Generator call complete"
        );
        Ok(response.content)
    }
}
