//! The three router entry points exposed as model-callable tools.
//!
//! The assistant sees only these declarations. A tool call is dispatched to
//! the matching [`RequestRouter`] method and the JSON response shape is
//! handed back to the model unchanged.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llms::ToolCall;
use crate::router::RequestRouter;

pub const DISCOVER_TOOL: &str = "discover_and_create_agent";
pub const EXECUTE_TOOL: &str = "call_execution_agent";
pub const RESET_TOOL: &str = "reset_execution_agent";

/// Arguments for `discover_and_create_agent`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverToolSchema {
    /// Natural-language description of the API capability needed.
    pub query: String,
}

impl DiscoverToolSchema {
    pub fn args_schema() -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Natural language description of the API capability needed, e.g. 'customer management'"
                }
            },
            "required": ["query"]
        })
    }
}

/// Arguments for `call_execution_agent`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteToolSchema {
    /// The user's request, forwarded verbatim.
    pub request: String,
}

impl ExecuteToolSchema {
    pub fn args_schema() -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "request": {
                    "type": "string",
                    "description": "The request to run against the discovered API, e.g. 'get customer 123'"
                }
            },
            "required": ["request"]
        })
    }
}

fn declaration(name: &str, description: &str, parameters: Value) -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": name,
            "description": description,
            "parameters": parameters,
        }
    })
}

/// Function declarations for the three router tools.
pub fn router_tool_declarations() -> Vec<Value> {
    vec![
        declaration(
            DISCOVER_TOOL,
            "Search the API Hub for an API matching the query and create an execution agent \
             bound to its operations. Any previous execution agent is destroyed first.",
            DiscoverToolSchema::args_schema(),
        ),
        declaration(
            EXECUTE_TOOL,
            "Forward a request to the current execution agent, which calls the discovered API.",
            ExecuteToolSchema::args_schema(),
        ),
        declaration(
            RESET_TOOL,
            "Destroy the current execution agent without creating a new one.",
            serde_json::json!({"type": "object", "properties": {}}),
        ),
    ]
}

fn argument<'a>(call: &'a ToolCall, name: &str) -> Result<&'a str, Value> {
    call.arguments
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| {
            serde_json::json!({
                "error": format!("Tool '{}' requires a string argument '{}'", call.name, name)
            })
        })
}

fn to_value<T: Serialize>(response: &T) -> Value {
    serde_json::to_value(response).unwrap_or_else(|e| serde_json::json!({"error": e.to_string()}))
}

/// Run one tool call against the router and return its JSON result.
///
/// Unknown tools and missing arguments come back as `{"error": ...}` so the
/// model can correct itself.
pub async fn dispatch(router: &RequestRouter, call: &ToolCall) -> Value {
    tracing::debug!(tool = %call.name, args = %call.arguments, "Dispatching router tool");
    match call.name.as_str() {
        DISCOVER_TOOL => match argument(call, "query") {
            Ok(query) => to_value(&router.discover_and_create_agent(query).await),
            Err(e) => e,
        },
        EXECUTE_TOOL => match argument(call, "request") {
            Ok(request) => to_value(&router.call_execution_agent(request).await),
            Err(e) => e,
        },
        RESET_TOOL => to_value(&router.reset_execution_agent().await),
        other => {
            tracing::warn!(tool = other, "Model called an unknown tool");
            serde_json::json!({ "error": format!("Unknown tool: {}", other) })
        }
    }
}
