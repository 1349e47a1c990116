//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};

/// Conversation engine tuning.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on a single Content Generator call.
    pub generator_timeout: Duration,
    /// Number of most recent transcript turns fed into the prompt.
    pub history_limit: usize,
    /// Sampling temperature for the generator.
    pub temperature: f32,
    /// Max tokens for the generator response.
    pub max_tokens: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            generator_timeout: Duration::from_secs(30),
            history_limit: 20,
            temperature: 0.4,
            max_tokens: 512,
        }
    }
}

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub port: u16,
    pub db_path: PathBuf,
    /// Optional JSON question catalog; the built-in brand catalog is used when unset.
    pub catalog_path: Option<PathBuf>,
    pub engine: EngineConfig,
}

impl AppConfig {
    /// Build the configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend: LlmBackend = std::env::var("BRAND_LLM_BACKEND")
            .unwrap_or_else(|_| "anthropic".to_string())
            .parse()?;

        let api_key = std::env::var(backend.api_key_var())
            .map_err(|_| ConfigError::MissingEnvVar(backend.api_key_var().to_string()))?;

        let model =
            std::env::var("BRAND_MODEL").unwrap_or_else(|_| backend.default_model().to_string());

        let port: u16 = parse_var("BRAND_PORT", 3000)?;

        let db_path = std::env::var("BRAND_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/brand-onboarding.db"));

        let catalog_path = std::env::var("BRAND_CATALOG_PATH").ok().map(PathBuf::from);

        let defaults = EngineConfig::default();
        let timeout_secs: u64 =
            parse_var("BRAND_GENERATOR_TIMEOUT_SECS", defaults.generator_timeout.as_secs())?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "BRAND_GENERATOR_TIMEOUT_SECS".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        let history_limit: usize = parse_var("BRAND_HISTORY_LIMIT", defaults.history_limit)?;

        Ok(Self {
            llm: LlmConfig {
                backend,
                api_key: secrecy::SecretString::from(api_key),
                model,
            },
            port,
            db_path,
            catalog_path,
            engine: EngineConfig {
                generator_timeout: Duration::from_secs(timeout_secs),
                history_limit,
                ..defaults
            },
        })
    }
}

/// Read and parse an optional variable, falling back to `default` when unset.
fn parse_var<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}
