//! Google Gemini completion provider.
//!
//! Talks to the `generateContent` endpoint directly over HTTP.
//!
//! # Authentication
//!
//! - **Gemini API**: `GOOGLE_API_KEY` or `GEMINI_API_KEY`, sent as the `key`
//!   query parameter.
//! - **Vertex AI**: enabled by `GOOGLE_GENAI_USE_VERTEXAI=true`; a bearer
//!   token comes from the shared [`TokenProvider`] on every call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::auth::TokenProvider;
use crate::config::{
    ConfigSource, GEMINI_API_KEY, GOOGLE_API_KEY, GOOGLE_CLOUD_LOCATION, GOOGLE_CLOUD_PROJECT,
    GOOGLE_GENAI_USE_VERTEXAI,
};
use crate::llms::base_llm::{BaseLLM, BaseLLMState, LLMMessage, LlmError, LlmResponse, TokenUsage, ToolCall};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_LOCATION: &str = "us-central1";

#[derive(Debug, Clone)]
enum GeminiAuth {
    ApiKey(String),
    Vertex {
        project: String,
        location: String,
        tokens: Arc<dyn TokenProvider>,
    },
}

/// Gemini completion implementation of [`BaseLLM`].
#[derive(Debug, Clone)]
pub struct GeminiCompletion {
    pub state: BaseLLMState,
    pub max_output_tokens: Option<u32>,
    auth: GeminiAuth,
    base_url: Option<String>,
    http: reqwest::Client,
    max_retries: u32,
    initial_backoff: Duration,
}

impl GeminiCompletion {
    /// Gemini API provider authenticated with an API key.
    pub fn with_api_key(model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::build(model, GeminiAuth::ApiKey(api_key.into()))
    }

    /// Vertex AI provider authenticated with bearer tokens.
    pub fn vertex(
        model: impl Into<String>,
        project: impl Into<String>,
        location: impl Into<String>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        Self::build(
            model,
            GeminiAuth::Vertex {
                project: project.into(),
                location: location.into(),
                tokens,
            },
        )
    }

    /// Pick Vertex AI or the Gemini API from configuration.
    pub fn from_config(
        model: impl Into<String>,
        config: &dyn ConfigSource,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, LlmError> {
        let use_vertexai = config
            .get(GOOGLE_GENAI_USE_VERTEXAI)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        if use_vertexai {
            let project = config.get(GOOGLE_CLOUD_PROJECT).ok_or_else(|| {
                LlmError::MissingCredentials(format!("{} is required for Vertex AI", GOOGLE_CLOUD_PROJECT))
            })?;
            let location = config.get_or(GOOGLE_CLOUD_LOCATION, DEFAULT_LOCATION);
            return Ok(Self::vertex(model, project, location, tokens));
        }

        let api_key = config
            .get(GOOGLE_API_KEY)
            .or_else(|| config.get(GEMINI_API_KEY))
            .ok_or_else(|| {
                LlmError::MissingCredentials(format!(
                    "set {} or {} environment variable",
                    GOOGLE_API_KEY, GEMINI_API_KEY
                ))
            })?;
        Ok(Self::with_api_key(model, api_key))
    }

    fn build(model: impl Into<String>, auth: GeminiAuth) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_default();
        Self {
            state: BaseLLMState::new(model),
            max_output_tokens: None,
            auth,
            base_url: None,
            http,
            max_retries: 2,
            initial_backoff: Duration::from_secs(1),
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.state.temperature = Some(temperature);
        self
    }

    /// Override the API root, e.g. to point at a local mock.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn with_retry(mut self, max_retries: u32, initial_backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.initial_backoff = initial_backoff;
        self
    }

    fn api_endpoint(&self) -> String {
        match &self.auth {
            GeminiAuth::ApiKey(_) => format!(
                "{}/models/{}:generateContent",
                self.base_url.as_deref().unwrap_or(GEMINI_API_BASE),
                self.state.model
            ),
            GeminiAuth::Vertex {
                project, location, ..
            } => {
                let base = self
                    .base_url
                    .clone()
                    .unwrap_or_else(|| format!("https://{}-aiplatform.googleapis.com/v1", location));
                format!(
                    "{}/projects/{}/locations/{}/publishers/google/models/{}:generateContent",
                    base, project, location, self.state.model
                )
            }
        }
    }

    pub fn generation_config(&self) -> Value {
        let mut config = serde_json::Map::new();
        if let Some(temp) = self.state.temperature {
            config.insert("temperature".to_string(), serde_json::json!(temp));
        }
        if let Some(max_tokens) = self.max_output_tokens {
            config.insert("maxOutputTokens".to_string(), serde_json::json!(max_tokens));
        }
        if !self.state.stop.is_empty() {
            config.insert("stopSequences".to_string(), serde_json::json!(self.state.stop));
        }
        Value::Object(config)
    }

    /// Convert OpenAI-style messages to Gemini `contents`.
    ///
    /// System messages become the `systemInstruction`; tool results become
    /// `functionResponse` parts.
    fn format_messages(&self, messages: &[LLMMessage]) -> (Option<String>, Vec<Value>) {
        let mut system_parts: Vec<String> = Vec::new();
        let mut contents: Vec<Value> = Vec::new();

        for msg in messages {
            let role = msg.get("role").and_then(|v| v.as_str()).unwrap_or("user");
            let content = msg.get("content").cloned().unwrap_or(Value::Null);

            match role {
                "system" => {
                    if let Some(text) = content.as_str() {
                        system_parts.push(text.to_string());
                    }
                }
                "tool" => {
                    let name = msg
                        .get("name")
                        .or_else(|| msg.get("tool_call_id"))
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown");
                    let result = content
                        .as_str()
                        .map(|text| serde_json::from_str(text).unwrap_or(Value::String(text.to_string())))
                        .unwrap_or(content.clone());
                    contents.push(serde_json::json!({
                        "role": "function",
                        "parts": [{
                            "functionResponse": {
                                "name": name,
                                "response": { "result": result }
                            }
                        }]
                    }));
                }
                "assistant" => {
                    let mut parts: Vec<Value> = Vec::new();
                    if let Some(text) = content.as_str().filter(|t| !t.is_empty()) {
                        parts.push(serde_json::json!({ "text": text }));
                    }
                    if let Some(tool_calls) = msg.get("tool_calls").and_then(|v| v.as_array()) {
                        for tc in tool_calls {
                            let func = tc.get("function").unwrap_or(&Value::Null);
                            let name = func.get("name").and_then(|v| v.as_str()).unwrap_or("");
                            let args_str = func.get("arguments").and_then(|v| v.as_str()).unwrap_or("{}");
                            let args: Value = serde_json::from_str(args_str).unwrap_or(serde_json::json!({}));
                            parts.push(serde_json::json!({
                                "functionCall": { "name": name, "args": args }
                            }));
                        }
                    }
                    contents.push(serde_json::json!({ "role": "model", "parts": parts }));
                }
                _ => {
                    let text = match content {
                        Value::String(s) => s,
                        Value::Null => String::new(),
                        other => other.to_string(),
                    };
                    contents.push(serde_json::json!({
                        "role": "user",
                        "parts": [{ "text": text }]
                    }));
                }
            }
        }

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };
        (system, contents)
    }

    fn build_request_body(&self, messages: &[LLMMessage], tools: Option<&[Value]>) -> Value {
        let (system, contents) = self.format_messages(messages);

        let mut body = serde_json::json!({
            "contents": contents,
            "generationConfig": self.generation_config(),
        });

        if let Some(system_text) = system {
            body["systemInstruction"] = serde_json::json!({
                "parts": [{ "text": system_text }]
            });
        }

        if let Some(tools) = tools.filter(|t| !t.is_empty()) {
            let declarations: Vec<Value> = tools.iter().map(function_declaration).collect();
            body["tools"] = serde_json::json!([{ "functionDeclarations": declarations }]);
        }

        body
    }

    fn parse_response(&self, response: &Value) -> Result<LlmResponse, LlmError> {
        let candidate = response
            .get("candidates")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .ok_or_else(|| LlmError::InvalidResponse("no candidates in Gemini response".into()))?;

        let parts = candidate
            .pointer("/content/parts")
            .and_then(|p| p.as_array())
            .ok_or_else(|| {
                let reason = candidate
                    .get("finishReason")
                    .and_then(|r| r.as_str())
                    .unwrap_or("unknown");
                LlmError::InvalidResponse(format!("no content parts (finishReason: {})", reason))
            })?;

        let mut text_parts: Vec<&str> = Vec::new();
        let mut calls: Vec<ToolCall> = Vec::new();

        for part in parts {
            if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
                text_parts.push(text);
            }
            if let Some(fc) = part.get("functionCall") {
                let name = fc.get("name").and_then(|n| n.as_str()).unwrap_or("");
                let args = match fc.get("args") {
                    Some(Value::Object(map)) => Value::Object(map.clone()),
                    _ => serde_json::json!({}),
                };
                calls.push(ToolCall::new(name, args));
            }
        }

        let combined = text_parts.concat();
        if !calls.is_empty() {
            return Ok(LlmResponse::ToolCalls {
                content: (!combined.is_empty()).then_some(combined),
                calls,
            });
        }
        Ok(LlmResponse::Text(self.state.apply_stop_words(&combined)))
    }

    fn extract_token_usage(response: &Value) -> HashMap<String, Value> {
        let mut usage = HashMap::new();
        if let Some(usage_obj) = response.get("usageMetadata") {
            let count = |key: &str| usage_obj.get(key).and_then(|v| v.as_i64()).unwrap_or(0);
            let prompt = count("promptTokenCount");
            let completion = count("candidatesTokenCount");
            usage.insert("prompt_tokens".to_string(), serde_json::json!(prompt));
            usage.insert("completion_tokens".to_string(), serde_json::json!(completion));
            usage.insert("total_tokens".to_string(), serde_json::json!(prompt + completion));
            usage.insert(
                "cached_tokens".to_string(),
                serde_json::json!(count("cachedContentTokenCount")),
            );
        }
        usage
    }

    async fn authorize(&self, request: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder, LlmError> {
        match &self.auth {
            GeminiAuth::ApiKey(key) => Ok(request.query(&[("key", key.as_str())])),
            GeminiAuth::Vertex { tokens, .. } => {
                let token = tokens.access_token().await.ok_or_else(|| {
                    LlmError::MissingCredentials("no access token for Vertex AI".into())
                })?;
                Ok(request.bearer_auth(token))
            }
        }
    }
}

/// Unwrap an OpenAI-style tool into a Gemini function declaration.
///
/// Gemini rejects object schemas without properties, so those lose their
/// `parameters` entirely.
fn function_declaration(tool: &Value) -> Value {
    let mut decl = tool.get("function").unwrap_or(tool).clone();
    let empty_params = decl
        .pointer("/parameters/properties")
        .and_then(|p| p.as_object())
        .map_or(true, |p| p.is_empty());
    if empty_params {
        if let Some(obj) = decl.as_object_mut() {
            obj.remove("parameters");
        }
    } else if let Some(params) = decl.get_mut("parameters").and_then(|p| p.as_object_mut()) {
        let no_required = params
            .get("required")
            .and_then(|r| r.as_array())
            .map_or(false, |r| r.is_empty());
        if no_required {
            params.remove("required");
        }
    }
    decl
}

#[async_trait]
impl BaseLLM for GeminiCompletion {
    fn model(&self) -> &str {
        &self.state.model
    }

    fn provider(&self) -> &str {
        "gemini"
    }

    async fn acall(
        &self,
        messages: Vec<LLMMessage>,
        tools: Option<Vec<Value>>,
    ) -> Result<LlmResponse, LlmError> {
        tracing::debug!(
            model = %self.state.model,
            messages = messages.len(),
            tools = tools.as_ref().map_or(0, |t| t.len()),
            "GeminiCompletion.acall"
        );

        let body = self.build_request_body(&messages, tools.as_deref());
        let endpoint = self.api_endpoint();

        let mut last_error = String::from("no attempt made");
        let mut retry_delay = self.initial_backoff;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tracing::warn!("Gemini API retry attempt {} after {:?}", attempt, retry_delay);
                tokio::time::sleep(retry_delay).await;
                retry_delay *= 2;
            }

            let request = self.authorize(self.http.post(&endpoint)).await?;
            let response = match request.json(&body).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = e.to_string();
                    continue;
                }
            };

            let status = response.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                last_error = "rate limited by Gemini API (429)".to_string();
                continue;
            }
            if status.is_server_error() {
                last_error = format!("Gemini API server error: {}", status);
                continue;
            }

            let response_text = response.text().await?;
            if !status.is_success() {
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    body: response_text,
                });
            }

            let response_json: Value = serde_json::from_str(&response_text).map_err(|e| {
                LlmError::InvalidResponse(format!(
                    "{} - Body: {}",
                    e,
                    response_text.chars().take(500).collect::<String>()
                ))
            })?;

            if let Some(error) = response_json.get("error") {
                let msg = error
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("Unknown Gemini API error");
                return Err(LlmError::InvalidResponse(msg.to_string()));
            }

            let usage = Self::extract_token_usage(&response_json);
            if !usage.is_empty() {
                tracing::debug!("Gemini usage: {:?}", usage);
                self.state.track_token_usage(&usage);
            }

            return self.parse_response(&response_json);
        }

        Err(LlmError::RetriesExhausted {
            attempts: self.max_retries + 1,
            last: last_error,
        })
    }

    fn get_token_usage_summary(&self) -> TokenUsage {
        self.state.token_usage()
    }
}
