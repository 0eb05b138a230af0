//! # Request router
//!
//! The three entry points the assistant (and the HTTP layer) use:
//! `discover_and_create_agent`, `call_execution_agent` and
//! `reset_execution_agent`.
//!
//! Each entry point holds the slot mutex for its whole duration, so
//! discoveries are serialized and a slow materialization can never land
//! after a later one. `state()` and `current_tools()` read copies kept
//! outside the mutex, so they answer while an execution is in flight.
//! Every failure below this layer is turned into one of the response
//! shapes in [`responses`].

pub mod responses;
#[cfg(test)]
pub(crate) mod testing;

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::capabilities::{CapabilitySearch, Materializer};
use crate::delegate::DelegateOutcome;
use crate::lifecycle::DelegateSlot;

pub use responses::{DiscoverResponse, ExecuteResponse, ResetResponse, NO_AGENT_MESSAGE};

/// Display name given to every materialized capability set.
pub const DISPLAY_NAME: &str = "discovered-api";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RouterState {
    NoCapability,
    CapabilityReady,
    AwaitingResult,
}

pub struct RequestRouter {
    search: Arc<dyn CapabilitySearch>,
    materializer: Arc<dyn Materializer>,
    slot: Mutex<DelegateSlot>,
    state: RwLock<RouterState>,
    /// Tool names of the installed delegate; written only under the slot lock.
    tools: RwLock<Vec<String>>,
}

impl fmt::Debug for RequestRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestRouter")
            .field("state", &*self.state.read())
            .finish_non_exhaustive()
    }
}

/// Restores `CAPABILITY_READY` when an execution finishes or is dropped.
struct AwaitingResult<'a>(&'a RwLock<RouterState>);

impl<'a> AwaitingResult<'a> {
    fn enter(state: &'a RwLock<RouterState>) -> Self {
        *state.write() = RouterState::AwaitingResult;
        Self(state)
    }
}

impl Drop for AwaitingResult<'_> {
    fn drop(&mut self) {
        *self.0.write() = RouterState::CapabilityReady;
    }
}

impl RequestRouter {
    pub fn new(
        search: Arc<dyn CapabilitySearch>,
        materializer: Arc<dyn Materializer>,
        slot: DelegateSlot,
    ) -> Self {
        Self {
            search,
            materializer,
            slot: Mutex::new(slot),
            state: RwLock::new(RouterState::NoCapability),
            tools: RwLock::new(Vec::new()),
        }
    }

    pub fn state(&self) -> RouterState {
        *self.state.read()
    }

    fn set_state(&self, state: RouterState) {
        *self.state.write() = state;
    }

    /// Operation names of the current delegate, if any.
    pub fn current_tools(&self) -> Vec<String> {
        self.tools.read().clone()
    }

    fn clear(&self, slot: &mut DelegateSlot) -> Vec<String> {
        let previous = slot.reset();
        self.tools.write().clear();
        self.set_state(RouterState::NoCapability);
        previous
    }

    /// Search for `query`, materialize the match and install a new delegate.
    ///
    /// The old delegate is torn down first, so a failed discovery always
    /// leaves the router without a capability.
    pub async fn discover_and_create_agent(&self, query: &str) -> DiscoverResponse {
        let mut slot = self.slot.lock().await;
        let previous = self.clear(&mut slot);
        if !previous.is_empty() {
            tracing::info!(previous_tools = ?previous, "Discarded delegate before discovery");
        }

        let Some(locator) = self.search.search(query).await else {
            return DiscoverResponse::no_match(query);
        };

        let description = format!("API discovered for: {}", query);
        let capabilities = match self
            .materializer
            .materialize(&locator, DISPLAY_NAME, &description)
            .await
        {
            Ok(set) => set.with_query(query),
            Err(e) => {
                tracing::error!(locator = %e.locator(), error = %e, "Failed to create capability set");
                return DiscoverResponse::malformed(query, e.locator().as_str());
            }
        };

        let tools = slot.replace(capabilities).tools();
        *self.tools.write() = tools.clone();
        self.set_state(RouterState::CapabilityReady);
        DiscoverResponse::created(tools)
    }

    /// Forward `request` to the current delegate.
    pub async fn call_execution_agent(&self, request: &str) -> ExecuteResponse {
        let slot = self.slot.lock().await;
        let Some(handle) = slot.current().cloned() else {
            return ExecuteResponse::error(NO_AGENT_MESSAGE);
        };

        let outcome = {
            let _awaiting = AwaitingResult::enter(&self.state);
            handle.call(request).await
        };

        match outcome {
            Ok(DelegateOutcome::Found(result)) => ExecuteResponse::success(result),
            Ok(DelegateOutcome::NotFound(message)) => {
                ExecuteResponse::tool_not_found(message, handle.tools())
            }
            Err(e) => {
                tracing::error!(error = %e, "Execution agent failed");
                ExecuteResponse::error(format!("Execution agent failed: {}", e))
            }
        }
    }

    /// Destroy the current delegate without replacing it.
    pub async fn reset_execution_agent(&self) -> ResetResponse {
        let mut slot = self.slot.lock().await;
        ResetResponse::new(self.clear(&mut slot))
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{
        customer_router, StaticMaterializer, StaticSearch, CUSTOMER_SPEC, ORDER_SPEC,
    };
    use super::*;
    use crate::delegate::KeywordExecutor;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_execute_before_discovery_makes_no_call() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (router, search, _) = customer_router(&server.uri());
        let response = router.call_execution_agent("get customer 123").await;
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            serde_json::json!({"error": "No execution agent created. Call discover_and_create_agent first."})
        );
        assert_eq!(search.calls(), 0);
        assert_eq!(router.state(), RouterState::NoCapability);
    }

    #[tokio::test]
    async fn test_discover_then_execute_customer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/customers/123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"name": "John"})))
            .expect(1)
            .mount(&server)
            .await;

        let (router, _, _) = customer_router(&server.uri());
        let discovered = router.discover_and_create_agent("customer management").await;
        assert!(discovered.success);
        assert_eq!(
            discovered.tools,
            Some(vec!["get_customer_by_id".to_string(), "list_customers".to_string()])
        );
        assert_eq!(router.state(), RouterState::CapabilityReady);

        let response = router.call_execution_agent("get customer 123").await;
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            serde_json::json!({"success": true, "result": {"name": "John"}})
        );
        assert_eq!(router.state(), RouterState::CapabilityReady);
    }

    #[tokio::test]
    async fn test_unmatched_request_is_tool_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (router, _, _) = customer_router(&server.uri());
        router.discover_and_create_agent("customer management").await;

        let response = router.call_execution_agent("get order 456").await;
        match response {
            ExecuteResponse::ToolNotFound {
                success,
                tool_not_found,
                current_tools,
                message,
                ..
            } => {
                assert!(!success);
                assert!(tool_not_found);
                assert!(message.contains("TOOL_NOT_FOUND"));
                assert_eq!(current_tools, vec!["get_customer_by_id", "list_customers"]);
            }
            other => panic!("expected tool_not_found, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_model_reply_with_sentinel_is_tool_not_found() {
        use crate::delegate::llm_executor::tests::ScriptedLlm;
        use crate::delegate::LlmExecutor;
        use crate::llms::LlmResponse;

        let llm = Arc::new(ScriptedLlm::new(vec![LlmResponse::Text(
            "Sorry, TOOL_NOT_FOUND: need a shipping API".into(),
        )]));
        let search = Arc::new(StaticSearch::new().with("customer management", "specs/customers"));
        let materializer = Arc::new(
            StaticMaterializer::new("http://127.0.0.1:9").with_spec("specs/customers", CUSTOMER_SPEC),
        );
        let router = RequestRouter::new(
            search,
            materializer,
            DelegateSlot::new(Arc::new(LlmExecutor::new(llm)), reqwest::Client::new()),
        );
        router.discover_and_create_agent("customer management").await;

        let response = router.call_execution_agent("ship package 9").await;
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["tool_not_found"], true);
        assert_eq!(value["message"], "Sorry, TOOL_NOT_FOUND: need a shipping API");
    }

    #[tokio::test]
    async fn test_failed_discovery_empties_the_slot() {
        let (router, _, _) = customer_router("http://127.0.0.1:9");
        assert!(router.discover_and_create_agent("customer management").await.success);

        let response = router.discover_and_create_agent("payroll").await;
        assert_eq!(response, DiscoverResponse::no_match("payroll"));
        assert_eq!(router.state(), RouterState::NoCapability);
        assert!(router.current_tools().is_empty());

        let response = router.call_execution_agent("get customer 1").await;
        assert_eq!(response, ExecuteResponse::error(NO_AGENT_MESSAGE));
    }

    #[tokio::test]
    async fn test_malformed_spec_reports_locator() {
        let (router, _, _) = customer_router("http://127.0.0.1:9");
        assert!(router.discover_and_create_agent("customer management").await.success);

        let response = router.discover_and_create_agent("broken").await;
        assert!(!response.success);
        assert_eq!(
            response.message,
            "Failed to parse API spec for: broken. The spec may be malformed."
        );
        assert_eq!(response.spec.as_deref(), Some("specs/broken"));
        assert_eq!(router.state(), RouterState::NoCapability);
        assert!(router.current_tools().is_empty());
    }

    #[tokio::test]
    async fn test_second_discovery_replaces_first() {
        let (router, _, _) = customer_router("http://127.0.0.1:9");
        router.discover_and_create_agent("customer management").await;
        let response = router.discover_and_create_agent("orders").await;

        assert_eq!(response.tools, Some(vec!["get_order_by_id".to_string()]));
        assert_eq!(router.current_tools(), vec!["get_order_by_id"]);

        let response = router.call_execution_agent("list customers").await;
        assert!(response.is_tool_not_found());
    }

    #[tokio::test]
    async fn test_reset_twice() {
        let (router, _, _) = customer_router("http://127.0.0.1:9");
        router.discover_and_create_agent("customer management").await;

        let first = router.reset_execution_agent().await;
        assert_eq!(first.previous_tools, vec!["get_customer_by_id", "list_customers"]);

        let second = router.reset_execution_agent().await;
        assert_eq!(
            serde_json::to_value(&second).unwrap(),
            serde_json::json!({
                "success": true,
                "message": "Execution agent destroyed. Call discover_and_create_agent with a new query.",
                "previous_tools": []
            })
        );
        assert_eq!(router.state(), RouterState::NoCapability);
    }

    #[tokio::test]
    async fn test_execution_failure_becomes_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("down"))
            .mount(&server)
            .await;

        let (router, _, _) = customer_router(&server.uri());
        router.discover_and_create_agent("customer management").await;
        match router.call_execution_agent("list customers").await {
            ExecuteResponse::Error { error } => {
                assert!(error.starts_with("Execution agent failed: "));
                assert!(error.contains("500"));
            }
            other => panic!("expected error, got {other:?}"),
        }
        assert_eq!(router.state(), RouterState::CapabilityReady);
    }

    #[tokio::test]
    async fn test_discoveries_are_serialized() {
        let search = Arc::new(
            StaticSearch::new()
                .with("slow", "specs/customers")
                .with("fast", "specs/orders"),
        );
        let materializer = Arc::new(
            StaticMaterializer::new("http://127.0.0.1:9")
                .with_spec("specs/customers", CUSTOMER_SPEC)
                .with_spec("specs/orders", ORDER_SPEC)
                .with_delay("specs/customers", Duration::from_millis(200)),
        );
        let router = Arc::new(RequestRouter::new(
            search,
            materializer,
            DelegateSlot::new(Arc::new(KeywordExecutor::new()), reqwest::Client::new()),
        ));

        let slow = tokio::spawn({
            let router = router.clone();
            async move { router.discover_and_create_agent("slow").await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        let fast = router.discover_and_create_agent("fast").await;

        assert!(slow.await.unwrap().success);
        assert!(fast.success);
        assert_eq!(router.current_tools(), vec!["get_order_by_id"]);
    }

    #[tokio::test]
    async fn test_state_is_readable_during_execution() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/customers/123"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"name": "John"}))
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;

        let (router, _, _) = customer_router(&server.uri());
        router.discover_and_create_agent("customer management").await;

        let (response, (during, tools)) = tokio::join!(
            router.call_execution_agent("get customer 123"),
            async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                (router.state(), router.current_tools())
            }
        );

        assert_eq!(during, RouterState::AwaitingResult);
        assert_eq!(tools, vec!["get_customer_by_id", "list_customers"]);
        assert!(matches!(response, ExecuteResponse::Success { .. }));
        assert_eq!(router.state(), RouterState::CapabilityReady);
    }
}
