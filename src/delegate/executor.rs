//! Operation selection strategies.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::capabilities::OperationDescriptor;
use crate::llms::LlmError;

/// A concrete invocation chosen by an executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl OperationCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// What an executor decided to do with a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// Invoke one operation.
    Invoke(OperationCall),
    /// Answer with free text instead of calling anything. The text may carry
    /// the not-found sentinel.
    Reply(String),
    /// No operation fits the request.
    NotFound { reason: String },
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("Executor produced no usable selection: {0}")]
    Invalid(String),
}

/// Chooses at most one operation for a natural-language request.
///
/// `instruction` is the delegate's instruction text; strategies that do not
/// talk to a model may ignore it.
#[async_trait]
pub trait CapabilityExecutor: Send + Sync + std::fmt::Debug {
    async fn select(
        &self,
        request: &str,
        operations: &[OperationDescriptor],
        instruction: &str,
    ) -> Result<Selection, ExecutorError>;
}
