//! Brand onboarding: conversational question/answer backend.

pub mod config;
pub mod error;
pub mod llm;
pub mod onboarding;
pub mod store;
