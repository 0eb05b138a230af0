//! Model-backed executor: one function-calling turn per request.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::capabilities::OperationDescriptor;
use crate::llms::base_llm::message;
use crate::llms::{BaseLLM, LlmResponse};

use super::executor::{CapabilityExecutor, ExecutorError, OperationCall, Selection};

/// Lets the model choose among the bound operations through native
/// function calling.
#[derive(Debug, Clone)]
pub struct LlmExecutor {
    llm: Arc<dyn BaseLLM>,
}

impl LlmExecutor {
    pub fn new(llm: Arc<dyn BaseLLM>) -> Self {
        Self { llm }
    }
}

fn tool_declaration(op: &OperationDescriptor) -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": op.name,
            "description": op.description,
            "parameters": op.parameters,
        }
    })
}

#[async_trait]
impl CapabilityExecutor for LlmExecutor {
    async fn select(
        &self,
        request: &str,
        operations: &[OperationDescriptor],
        instruction: &str,
    ) -> Result<Selection, ExecutorError> {
        let messages = vec![message("system", instruction), message("user", request)];
        let tools = operations.iter().map(tool_declaration).collect();

        match self.llm.acall(messages, Some(tools)).await? {
            LlmResponse::ToolCalls { calls, .. } => {
                if calls.len() > 1 {
                    tracing::warn!(
                        count = calls.len(),
                        "Model requested several operations, using the first"
                    );
                }
                let call = calls
                    .into_iter()
                    .next()
                    .ok_or_else(|| ExecutorError::Invalid("empty tool call list".into()))?;
                Ok(Selection::Invoke(OperationCall::new(call.name, call.arguments)))
            }
            LlmResponse::Text(text) => Ok(Selection::Reply(text)),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::llms::{LLMMessage, LlmError, TokenUsage, ToolCall};
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Replays canned responses and records what it was sent.
    #[derive(Debug, Default)]
    pub(crate) struct ScriptedLlm {
        responses: Mutex<VecDeque<LlmResponse>>,
        pub(crate) seen: Mutex<Vec<(Vec<LLMMessage>, usize)>>,
    }

    impl ScriptedLlm {
        pub(crate) fn new(responses: Vec<LlmResponse>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl BaseLLM for ScriptedLlm {
        fn model(&self) -> &str {
            "scripted"
        }

        fn provider(&self) -> &str {
            "test"
        }

        async fn acall(
            &self,
            messages: Vec<LLMMessage>,
            tools: Option<Vec<Value>>,
        ) -> Result<LlmResponse, LlmError> {
            self.seen
                .lock()
                .push((messages, tools.map_or(0, |t| t.len())));
            self.responses
                .lock()
                .pop_front()
                .ok_or_else(|| LlmError::InvalidResponse("script exhausted".into()))
        }

        fn get_token_usage_summary(&self) -> TokenUsage {
            TokenUsage::default()
        }
    }

    fn ops() -> Vec<OperationDescriptor> {
        vec![OperationDescriptor {
            name: "get_customer_by_id".into(),
            description: "Get a customer by ID".into(),
            parameters: serde_json::json!({"type": "object", "properties": {"id": {"type": "string"}}}),
        }]
    }

    #[tokio::test]
    async fn test_function_call_becomes_invoke() {
        let llm = Arc::new(ScriptedLlm::new(vec![LlmResponse::ToolCalls {
            content: None,
            calls: vec![ToolCall::new("get_customer_by_id", serde_json::json!({"id": "123"}))],
        }]));
        let executor = LlmExecutor::new(llm.clone());

        let selection = executor
            .select("get customer 123", &ops(), "You have ONLY these tools")
            .await
            .unwrap();
        assert_eq!(
            selection,
            Selection::Invoke(OperationCall::new("get_customer_by_id", serde_json::json!({"id": "123"})))
        );

        let seen = llm.seen.lock();
        let (messages, tool_count) = &seen[0];
        assert_eq!(*tool_count, 1);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], "You have ONLY these tools");
        assert_eq!(messages[1]["content"], "get customer 123");
    }

    #[tokio::test]
    async fn test_text_becomes_reply() {
        let llm = Arc::new(ScriptedLlm::new(vec![LlmResponse::Text(
            "TOOL_NOT_FOUND: need an orders API".into(),
        )]));
        let selection = LlmExecutor::new(llm)
            .select("get order 456", &ops(), "")
            .await
            .unwrap();
        assert_eq!(selection, Selection::Reply("TOOL_NOT_FOUND: need an orders API".into()));
    }

    #[tokio::test]
    async fn test_llm_failure_propagates() {
        let llm = Arc::new(ScriptedLlm::new(vec![]));
        let err = LlmExecutor::new(llm).select("x", &ops(), "").await.unwrap_err();
        assert!(matches!(err, ExecutorError::Llm(_)));
    }
}
