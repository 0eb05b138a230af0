//! JSON shapes returned by the router entry points.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const NO_AGENT_MESSAGE: &str = "No execution agent created. Call discover_and_create_agent first.";
pub const NEXT_STEP_INSTRUCTION: &str = "Now use 'call_execution_agent' to execute API calls";
pub const RETRY_INSTRUCTION: &str = "Call discover_and_create_agent with a DIFFERENT query.";
pub const RESET_MESSAGE: &str =
    "Execution agent destroyed. Call discover_and_create_agent with a new query.";

/// Result of `discover_and_create_agent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoverResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
}

impl DiscoverResponse {
    pub fn created(tools: Vec<String>) -> Self {
        Self {
            success: true,
            message: format!("Created execution agent with {} tools", tools.len()),
            tools: Some(tools),
            spec: None,
            instruction: Some(NEXT_STEP_INSTRUCTION.to_string()),
        }
    }

    pub fn no_match(query: &str) -> Self {
        Self {
            success: false,
            message: format!("No API found matching: {}", query),
            tools: None,
            spec: None,
            instruction: None,
        }
    }

    pub fn malformed(query: &str, spec: impl Into<String>) -> Self {
        Self {
            success: false,
            message: format!(
                "Failed to parse API spec for: {}. The spec may be malformed.",
                query
            ),
            tools: None,
            spec: Some(spec.into()),
            instruction: None,
        }
    }
}

/// Result of `call_execution_agent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExecuteResponse {
    Success {
        success: bool,
        result: Value,
    },
    ToolNotFound {
        success: bool,
        tool_not_found: bool,
        message: String,
        current_tools: Vec<String>,
        instruction: String,
    },
    Error {
        error: String,
    },
}

impl ExecuteResponse {
    pub fn success(result: Value) -> Self {
        Self::Success {
            success: true,
            result,
        }
    }

    pub fn tool_not_found(message: impl Into<String>, current_tools: Vec<String>) -> Self {
        Self::ToolNotFound {
            success: false,
            tool_not_found: true,
            message: message.into(),
            current_tools,
            instruction: RETRY_INSTRUCTION.to_string(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    pub fn is_tool_not_found(&self) -> bool {
        matches!(self, Self::ToolNotFound { .. })
    }
}

/// Result of `reset_execution_agent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetResponse {
    pub success: bool,
    pub message: String,
    pub previous_tools: Vec<String>,
}

impl ResetResponse {
    pub fn new(previous_tools: Vec<String>) -> Self {
        Self {
            success: true,
            message: RESET_MESSAGE.to_string(),
            previous_tools,
        }
    }
}
