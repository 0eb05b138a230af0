//! LLM layer.
//!
//! - [`base_llm`] - the provider-agnostic trait, message helpers and usage tracking
//! - [`providers`] - concrete providers (Gemini)

pub mod base_llm;
pub mod providers;

pub use base_llm::{BaseLLM, BaseLLMState, LLMMessage, LlmError, LlmResponse, TokenUsage, ToolCall};
pub use providers::gemini::GeminiCompletion;
