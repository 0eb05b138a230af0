//! # Root assistant
//!
//! The conversational front end. A native function-calling loop over a
//! [`BaseLLM`] whose only tools are the three router entry points. The
//! not-found retry policy lives in the instruction; the loop only enforces
//! a bound on tool rounds.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llms::base_llm::{assistant_tool_calls_message, message, tool_result_message};
use crate::llms::{BaseLLM, LLMMessage, LlmError, LlmResponse};
use crate::router::RequestRouter;
use crate::tools::{dispatch, router_tool_declarations};

pub const ASSISTANT_NAME: &str = "enterprise_assistant";

pub const ROOT_INSTRUCTION: &str = r#"You are an Enterprise Assistant that discovers and executes APIs dynamically.

## YOUR TOOLS

1. **discover_and_create_agent(query)**: Search API Hub and create an execution agent
   - Call this FIRST to find APIs matching your needs
   - This REPLACES any existing execution agent
   - Use descriptive queries like "customer management", "inventory", "orders"

2. **call_execution_agent(request)**: Execute an API call
   - Call this AFTER discover_and_create_agent
   - Describe what you want in natural language

3. **reset_execution_agent()**: Destroy the current execution agent
   - Use when you need to search for completely different APIs

## WORKFLOW

1. User asks for something (e.g., "get customer 123")
2. Call discover_and_create_agent("customer management")
3. Call call_execution_agent("get customer with ID 123")
4. If the result has "tool_not_found": true, call discover_and_create_agent with a DIFFERENT query
5. Return the result to the user

## HANDLING TOOL NOT FOUND

If call_execution_agent returns {"tool_not_found": true}:
- The current execution agent doesn't have the needed capability
- Call discover_and_create_agent with a DIFFERENT, more specific query
- Try queries like: "order management", "inventory", "payments", "suppliers", "products"

## IMPORTANT

- Always call discover_and_create_agent FIRST before call_execution_agent
- If a tool isn't found, try a DIFFERENT search query
- Just describe what you want in natural language
"#;

/// One router tool call made while answering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: Value,
    pub result: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantReply {
    pub text: String,
    pub tool_calls: Vec<ToolInvocation>,
    /// True when the round bound was hit before the model answered.
    pub exhausted: bool,
}

pub struct Assistant {
    llm: Arc<dyn BaseLLM>,
    router: Arc<RequestRouter>,
    max_tool_rounds: usize,
}

impl std::fmt::Debug for Assistant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assistant")
            .field("model", &self.llm.model())
            .field("max_tool_rounds", &self.max_tool_rounds)
            .finish()
    }
}

impl Assistant {
    pub fn new(llm: Arc<dyn BaseLLM>, router: Arc<RequestRouter>, max_tool_rounds: usize) -> Self {
        Self {
            llm,
            router,
            max_tool_rounds,
        }
    }

    pub fn router(&self) -> &Arc<RequestRouter> {
        &self.router
    }

    /// Answer one user message, calling router tools as the model asks.
    pub async fn respond(&self, user_message: &str) -> Result<AssistantReply, LlmError> {
        let mut messages: Vec<LLMMessage> = vec![
            message("system", ROOT_INSTRUCTION),
            message("user", user_message),
        ];
        let tools = router_tool_declarations();
        let mut invocations = Vec::new();
        let mut rounds = 0;

        loop {
            match self.llm.acall(messages.clone(), Some(tools.clone())).await? {
                LlmResponse::Text(text) => {
                    return Ok(AssistantReply {
                        text,
                        tool_calls: invocations,
                        exhausted: false,
                    });
                }
                LlmResponse::ToolCalls { content, calls } => {
                    if rounds >= self.max_tool_rounds {
                        tracing::warn!(
                            rounds,
                            "Assistant exceeded maximum tool rounds, stopping"
                        );
                        return Ok(AssistantReply {
                            text: content.unwrap_or_else(|| {
                                format!(
                                    "Stopped after {} tool rounds without a final answer.",
                                    self.max_tool_rounds
                                )
                            }),
                            tool_calls: invocations,
                            exhausted: true,
                        });
                    }
                    rounds += 1;

                    messages.push(assistant_tool_calls_message(content.as_deref(), &calls));
                    for call in &calls {
                        let result = dispatch(&self.router, call).await;
                        tracing::debug!(tool = %call.name, %result, "Router tool result");
                        messages.push(tool_result_message(call, &result));
                        invocations.push(ToolInvocation {
                            name: call.name.clone(),
                            arguments: call.arguments.clone(),
                            result,
                        });
                    }
                }
            }
        }
    }
}
