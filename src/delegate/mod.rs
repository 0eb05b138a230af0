//! # Execution delegate
//!
//! A transient worker bound to exactly one [`CapabilitySet`]. Given a
//! request it asks its [`CapabilityExecutor`] for a selection, invokes at
//! most one operation from its own set and reports a tagged
//! [`DelegateOutcome`].
//!
//! Model text enters the system only through [`classify_reply`]; that is the
//! single place the `TOOL_NOT_FOUND` sentinel is recognised.

pub mod executor;
pub mod keyword;
pub mod llm_executor;

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::capabilities::{CapabilitySet, OperationError};

pub use executor::{CapabilityExecutor, ExecutorError, OperationCall, Selection};
pub use keyword::KeywordExecutor;
pub use llm_executor::LlmExecutor;

/// Marker a delegate uses when no bound operation can satisfy a request.
pub const SENTINEL: &str = "TOOL_NOT_FOUND";

/// Result of one delegate turn.
#[derive(Debug, Clone, PartialEq)]
pub enum DelegateOutcome {
    /// The payload: an API response body, or the model's answer text.
    Found(Value),
    /// No bound operation fits; carries the reason text.
    NotFound(String),
}

#[derive(Debug, Error)]
pub enum DelegateError {
    #[error(transparent)]
    Selection(#[from] ExecutorError),

    #[error("Operation '{name}' failed: {source}")]
    Operation {
        name: String,
        #[source]
        source: OperationError,
    },
}

/// Build the delegate instruction for a set of operation names.
pub fn build_instruction(operation_names: &[String]) -> String {
    let tools = operation_names
        .iter()
        .map(|name| format!("- {}", name))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "You are an API Execution Agent with access to real API tools.\n\
         \n\
         You have ONLY these tools available:\n\
         {tools}\n\
         \n\
         IMPORTANT: If you cannot fulfill the request with your available tools, \n\
         respond with EXACTLY: \"{sentinel}: <description of what tool is needed>\"\n\
         \n\
         When you CAN fulfill the request:\n\
         1. Identify which tool to use\n\
         2. Call the tool with the correct parameters\n\
         3. Return the result\n\
         \n\
         Be precise with parameter names - use exactly what the tool expects.\n",
        tools = tools,
        sentinel = SENTINEL,
    )
}

/// Classify free model text. Any occurrence of the sentinel is negative,
/// whatever surrounds it.
pub fn classify_reply(text: String) -> DelegateOutcome {
    if text.contains(SENTINEL) {
        DelegateOutcome::NotFound(text)
    } else {
        DelegateOutcome::Found(Value::String(text))
    }
}

/// A worker bound 1:1 to a capability set.
#[derive(Debug)]
pub struct ExecutionDelegate {
    id: Uuid,
    capabilities: CapabilitySet,
    instruction: String,
    executor: Arc<dyn CapabilityExecutor>,
    http: reqwest::Client,
}

impl ExecutionDelegate {
    pub fn new(
        capabilities: CapabilitySet,
        executor: Arc<dyn CapabilityExecutor>,
        http: reqwest::Client,
    ) -> Self {
        let instruction = build_instruction(&capabilities.operation_names());
        Self {
            id: Uuid::new_v4(),
            capabilities,
            instruction,
            executor,
            http,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    pub fn operation_names(&self) -> Vec<String> {
        self.capabilities.operation_names()
    }

    /// Run a single turn: select, then invoke at most one bound operation.
    pub async fn execute(&self, request: &str) -> Result<DelegateOutcome, DelegateError> {
        tracing::info!(delegate = %self.id, request, "Calling execution delegate");

        let descriptors = self.capabilities.descriptors();
        let selection = self
            .executor
            .select(request, &descriptors, &self.instruction)
            .await?;

        let outcome = match selection {
            Selection::Invoke(call) => {
                let Some(operation) = self.capabilities.get(&call.name) else {
                    tracing::warn!(operation = %call.name, "Selected operation is not bound to this delegate");
                    return Ok(DelegateOutcome::NotFound(format!(
                        "{}: no operation named '{}' is available",
                        SENTINEL, call.name
                    )));
                };
                tracing::debug!(operation = %call.name, args = %call.arguments, "Invoking operation");
                let body = operation
                    .invoke(&self.http, &call.arguments)
                    .await
                    .map_err(|source| DelegateError::Operation {
                        name: call.name.clone(),
                        source,
                    })?;
                DelegateOutcome::Found(body)
            }
            Selection::Reply(text) => classify_reply(text),
            Selection::NotFound { reason } => {
                DelegateOutcome::NotFound(format!("{}: {}", SENTINEL, reason))
            }
        };

        match &outcome {
            DelegateOutcome::Found(result) => tracing::info!(%result, "Delegate result"),
            DelegateOutcome::NotFound(reason) => tracing::info!(reason = %reason, "Delegate found no matching operation"),
        }
        Ok(outcome)
    }
}

/// Shared handle the router calls the delegate through.
///
/// Cloning is cheap; every clone refers to the same delegate.
#[derive(Debug, Clone)]
pub struct DelegateHandle {
    inner: Arc<ExecutionDelegate>,
}

impl DelegateHandle {
    pub fn new(delegate: ExecutionDelegate) -> Self {
        Self {
            inner: Arc::new(delegate),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id()
    }

    pub fn tools(&self) -> Vec<String> {
        self.inner.operation_names()
    }

    pub fn instruction(&self) -> &str {
        self.inner.instruction()
    }

    pub fn query(&self) -> &str {
        self.inner.capabilities().query()
    }

    pub async fn call(&self, request: &str) -> Result<DelegateOutcome, DelegateError> {
        self.inner.execute(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{CapabilityLocator, Operation, OperationParameter, ParameterLocation};
    use async_trait::async_trait;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug)]
    struct Fixed(Selection);

    #[async_trait]
    impl CapabilityExecutor for Fixed {
        async fn select(
            &self,
            _request: &str,
            _operations: &[crate::capabilities::OperationDescriptor],
            _instruction: &str,
        ) -> Result<Selection, ExecutorError> {
            Ok(self.0.clone())
        }
    }

    fn customers(base_url: &str) -> CapabilitySet {
        let get = Operation::new("get_customer_by_id", "GET", "/customers/{id}")
            .with_base_url(base_url)
            .with_parameter(OperationParameter {
                name: "id".into(),
                location: ParameterLocation::Path,
                required: true,
                description: None,
                schema: serde_json::json!({"type": "string"}),
            });
        let list = Operation::new("list_customers", "GET", "/customers").with_base_url(base_url);
        CapabilitySet::new(
            CapabilityLocator::new("specs/customers"),
            "discovered-api",
            "API discovered for: customers",
            vec![get, list],
        )
    }

    fn delegate(selection: Selection, base_url: &str) -> ExecutionDelegate {
        ExecutionDelegate::new(customers(base_url), Arc::new(Fixed(selection)), reqwest::Client::new())
    }

    #[test]
    fn test_instruction_lists_exactly_the_bound_operations() {
        let instruction = build_instruction(&["get_customer_by_id".into(), "list_customers".into()]);
        assert!(instruction.contains("- get_customer_by_id\n- list_customers\n"));
        assert!(instruction.contains("TOOL_NOT_FOUND: <description of what tool is needed>"));
    }

    #[test]
    fn test_sentinel_anywhere_is_not_found() {
        assert_eq!(
            classify_reply("Sorry, TOOL_NOT_FOUND: need a shipping API".into()),
            DelegateOutcome::NotFound("Sorry, TOOL_NOT_FOUND: need a shipping API".into())
        );
        assert_eq!(
            classify_reply("Customer 123 is John".into()),
            DelegateOutcome::Found(Value::String("Customer 123 is John".into()))
        );
    }

    #[tokio::test]
    async fn test_invoke_returns_api_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/customers/123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"name": "John"})))
            .expect(1)
            .mount(&server)
            .await;

        let d = delegate(
            Selection::Invoke(OperationCall::new("get_customer_by_id", serde_json::json!({"id": "123"}))),
            &server.uri(),
        );
        let outcome = d.execute("get customer 123").await.unwrap();
        assert_eq!(outcome, DelegateOutcome::Found(serde_json::json!({"name": "John"})));
    }

    #[tokio::test]
    async fn test_unbound_operation_is_not_found_without_network() {
        let d = delegate(
            Selection::Invoke(OperationCall::new("get_order_by_id", serde_json::json!({}))),
            "http://127.0.0.1:9",
        );
        let outcome = d.execute("get order 1").await.unwrap();
        assert!(matches!(outcome, DelegateOutcome::NotFound(ref r) if r.contains("get_order_by_id")));
    }

    #[tokio::test]
    async fn test_executor_not_found_carries_sentinel() {
        let d = delegate(
            Selection::NotFound {
                reason: "no orders API".into(),
            },
            "http://127.0.0.1:9",
        );
        let outcome = d.execute("get order 1").await.unwrap();
        assert_eq!(outcome, DelegateOutcome::NotFound("TOOL_NOT_FOUND: no orders API".into()));
    }

    #[tokio::test]
    async fn test_operation_failure_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let d = delegate(
            Selection::Invoke(OperationCall::new("list_customers", serde_json::json!({}))),
            &server.uri(),
        );
        let err = d.execute("list customers").await.unwrap_err();
        assert!(matches!(err, DelegateError::Operation { ref name, .. } if name == "list_customers"));
    }

    #[tokio::test]
    async fn test_handle_clones_share_the_delegate() {
        let handle = DelegateHandle::new(delegate(Selection::Reply("hi".into()), "http://127.0.0.1:9"));
        let other = handle.clone();
        assert_eq!(handle.id(), other.id());
        assert_eq!(other.tools(), vec!["get_customer_by_id", "list_customers"]);
        assert_eq!(
            other.call("hello").await.unwrap(),
            DelegateOutcome::Found(Value::String("hi".into()))
        );
    }
}
