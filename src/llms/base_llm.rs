//! Base LLM trait and shared state.
//!
//! Messages use the OpenAI chat shape (`role`, `content`, `tool_calls`,
//! `tool_call_id`) regardless of provider; each provider converts them to
//! its own wire format.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A single message in an LLM conversation.
pub type LLMMessage = HashMap<String, Value>;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM credentials not configured: {0}")]
    MissingCredentials(String),

    #[error("LLM request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("LLM API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Invalid LLM response: {0}")]
    InvalidResponse(String),

    #[error("LLM call failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

/// A function call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Always a JSON object; providers normalize missing args to `{}`.
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: format!("call_{}", uuid::Uuid::new_v4()),
            name: name.into(),
            arguments,
        }
    }

    /// OpenAI-style `tool_calls[]` entry.
    pub fn to_message_value(&self) -> Value {
        serde_json::json!({
            "id": self.id,
            "type": "function",
            "function": {
                "name": self.name,
                "arguments": self.arguments.to_string(),
            }
        })
    }
}

/// What one model turn produced.
#[derive(Debug, Clone, PartialEq)]
pub enum LlmResponse {
    Text(String),
    ToolCalls {
        content: Option<String>,
        calls: Vec<ToolCall>,
    },
}

/// Cumulative token usage across all calls made by an LLM instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub total_tokens: i64,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub successful_requests: i64,
    pub cached_prompt_tokens: i64,
}

#[async_trait]
pub trait BaseLLM: Send + Sync + fmt::Debug {
    fn model(&self) -> &str;

    fn provider(&self) -> &str;

    /// Run one model turn. `tools` are OpenAI-style function declarations.
    async fn acall(
        &self,
        messages: Vec<LLMMessage>,
        tools: Option<Vec<Value>>,
    ) -> Result<LlmResponse, LlmError>;

    fn get_token_usage_summary(&self) -> TokenUsage;
}

/// State shared by provider implementations.
#[derive(Debug)]
pub struct BaseLLMState {
    pub model: String,
    pub temperature: Option<f64>,
    pub stop: Vec<String>,
    token_usage: Mutex<TokenUsage>,
}

impl Clone for BaseLLMState {
    fn clone(&self) -> Self {
        Self {
            model: self.model.clone(),
            temperature: self.temperature,
            stop: self.stop.clone(),
            token_usage: Mutex::new(self.token_usage.lock().clone()),
        }
    }
}

impl BaseLLMState {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: None,
            stop: Vec::new(),
            token_usage: Mutex::new(TokenUsage::default()),
        }
    }

    /// Truncate `content` at the earliest configured stop word.
    pub fn apply_stop_words(&self, content: &str) -> String {
        if self.stop.is_empty() || content.is_empty() {
            return content.to_string();
        }

        let earliest = self
            .stop
            .iter()
            .filter_map(|word| content.find(word.as_str()).map(|pos| (pos, word)))
            .min_by_key(|(pos, _)| *pos);

        match earliest {
            Some((pos, word)) => {
                tracing::debug!("Applied stop word '{}' at position {}", word, pos);
                content[..pos].trim().to_string()
            }
            None => content.to_string(),
        }
    }

    /// Track usage from provider-agnostic field names.
    pub fn track_token_usage(&self, usage_data: &HashMap<String, Value>) {
        let field = |names: &[&str]| {
            names
                .iter()
                .find_map(|n| usage_data.get(*n).and_then(|v| v.as_i64()))
                .unwrap_or(0)
        };
        let prompt_tokens = field(&["prompt_tokens", "prompt_token_count", "input_tokens"]);
        let completion_tokens =
            field(&["completion_tokens", "candidates_token_count", "output_tokens"]);
        let cached_tokens = field(&["cached_tokens", "cached_prompt_tokens"]);

        let mut usage = self.token_usage.lock();
        usage.prompt_tokens += prompt_tokens;
        usage.completion_tokens += completion_tokens;
        usage.total_tokens += prompt_tokens + completion_tokens;
        usage.successful_requests += 1;
        usage.cached_prompt_tokens += cached_tokens;
    }

    pub fn token_usage(&self) -> TokenUsage {
        self.token_usage.lock().clone()
    }
}

/// Build a plain `{role, content}` message.
pub fn message(role: &str, content: impl Into<String>) -> LLMMessage {
    let mut msg = HashMap::new();
    msg.insert("role".to_string(), Value::String(role.to_string()));
    msg.insert("content".to_string(), Value::String(content.into()));
    msg
}

/// The assistant turn that requested `calls`.
pub fn assistant_tool_calls_message(content: Option<&str>, calls: &[ToolCall]) -> LLMMessage {
    let mut msg = HashMap::new();
    msg.insert("role".to_string(), Value::String("assistant".to_string()));
    msg.insert(
        "content".to_string(),
        content.map_or(Value::Null, |c| Value::String(c.to_string())),
    );
    msg.insert(
        "tool_calls".to_string(),
        Value::Array(calls.iter().map(ToolCall::to_message_value).collect()),
    );
    msg
}

/// The result of executing `call`, fed back to the model.
pub fn tool_result_message(call: &ToolCall, result: &Value) -> LLMMessage {
    let mut msg = HashMap::new();
    msg.insert("role".to_string(), Value::String("tool".to_string()));
    msg.insert("tool_call_id".to_string(), Value::String(call.id.clone()));
    msg.insert("name".to_string(), Value::String(call.name.clone()));
    msg.insert("content".to_string(), Value::String(result.to_string()));
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_stop_words() {
        let mut state = BaseLLMState::new("test-model");
        state.stop = vec!["Observation:".to_string(), "Final Answer:".to_string()];

        let content = "I need to search.\n\nAction: search\nObservation: Found results";
        assert_eq!(state.apply_stop_words(content), "I need to search.\n\nAction: search");
    }

    #[test]
    fn test_apply_stop_words_no_match() {
        let mut state = BaseLLMState::new("test-model");
        state.stop = vec!["STOP".to_string()];
        assert_eq!(state.apply_stop_words("No stop word here"), "No stop word here");
    }

    #[test]
    fn test_token_usage_tracking() {
        let state = BaseLLMState::new("test");
        let mut usage = HashMap::new();
        usage.insert("prompt_tokens".to_string(), serde_json::json!(100));
        usage.insert("completion_tokens".to_string(), serde_json::json!(50));
        usage.insert("cached_tokens".to_string(), serde_json::json!(10));

        state.track_token_usage(&usage);
        let totals = state.token_usage();
        assert_eq!(totals.prompt_tokens, 100);
        assert_eq!(totals.completion_tokens, 50);
        assert_eq!(totals.total_tokens, 150);
        assert_eq!(totals.successful_requests, 1);
        assert_eq!(totals.cached_prompt_tokens, 10);

        state.track_token_usage(&usage);
        assert_eq!(state.token_usage().total_tokens, 300);
        assert_eq!(state.token_usage().successful_requests, 2);
    }

    #[test]
    fn test_tool_call_messages() {
        let call = ToolCall::new("call_execution_agent", serde_json::json!({"request": "get customer 1"}));
        assert!(call.id.starts_with("call_"));

        let assistant = assistant_tool_calls_message(None, &[call.clone()]);
        assert_eq!(assistant["role"], "assistant");
        assert!(assistant["content"].is_null());
        let entry = &assistant["tool_calls"][0];
        assert_eq!(entry["function"]["name"], "call_execution_agent");
        assert_eq!(
            entry["function"]["arguments"],
            "{\"request\":\"get customer 1\"}"
        );

        let result = tool_result_message(&call, &serde_json::json!({"success": true}));
        assert_eq!(result["role"], "tool");
        assert_eq!(result["name"], "call_execution_agent");
        assert_eq!(result["content"], "{\"success\":true}");
    }
}
