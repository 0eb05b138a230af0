//! In-memory search and materializer doubles shared by router, tool,
//! assistant and server tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::capabilities::{
    parse_openapi_spec, CapabilityLocator, CapabilitySearch, CapabilitySet, MaterializeError,
    Materializer, SpecError,
};
use crate::delegate::KeywordExecutor;
use crate::lifecycle::DelegateSlot;

use super::RequestRouter;

pub(crate) const CUSTOMER_SPEC: &str = r##"
openapi: "3.0.0"
info:
  title: Customers
  version: "1.0"
paths:
  /customers/{id}:
    get:
      operationId: getCustomerById
      summary: Get a customer by ID
      parameters:
        - name: id
          in: path
          required: true
          schema:
            type: string
  /customers:
    get:
      operationId: listCustomers
      summary: List customers
      parameters:
        - name: limit
          in: query
          schema:
            type: integer
"##;

pub(crate) const ORDER_SPEC: &str = r##"
openapi: "3.0.0"
info:
  title: Orders
  version: "1.0"
paths:
  /orders/{id}:
    get:
      operationId: getOrderById
      summary: Get an order by ID
      parameters:
        - name: id
          in: path
          required: true
          schema:
            type: string
"##;

/// Maps fixed queries to locators and counts lookups.
#[derive(Debug, Default)]
pub(crate) struct StaticSearch {
    entries: HashMap<String, CapabilityLocator>,
    calls: AtomicUsize,
}

impl StaticSearch {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(mut self, query: &str, locator: &str) -> Self {
        self.entries
            .insert(query.to_string(), CapabilityLocator::new(locator));
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CapabilitySearch for StaticSearch {
    async fn search(&self, query: &str) -> Option<CapabilityLocator> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entries.get(query).cloned()
    }
}

/// Parses in-memory spec text and points every operation at `base_url`.
#[derive(Debug)]
pub(crate) struct StaticMaterializer {
    base_url: String,
    specs: HashMap<String, String>,
    delays: HashMap<String, Duration>,
}

impl StaticMaterializer {
    pub(crate) fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            specs: HashMap::new(),
            delays: HashMap::new(),
        }
    }

    pub(crate) fn with_spec(mut self, locator: &str, content: &str) -> Self {
        self.specs.insert(locator.to_string(), content.to_string());
        self
    }

    pub(crate) fn with_delay(mut self, locator: &str, delay: Duration) -> Self {
        self.delays.insert(locator.to_string(), delay);
        self
    }
}

#[async_trait]
impl Materializer for StaticMaterializer {
    async fn materialize(
        &self,
        locator: &CapabilityLocator,
        display_name: &str,
        description: &str,
    ) -> Result<CapabilitySet, MaterializeError> {
        if let Some(delay) = self.delays.get(locator.as_str()) {
            tokio::time::sleep(*delay).await;
        }
        let malformed = |source: SpecError| MaterializeError::Malformed {
            locator: locator.clone(),
            source,
        };
        let content = self.specs.get(locator.as_str()).map(String::as_str).unwrap_or("");
        let mut operations = parse_openapi_spec(content).map_err(malformed)?;
        if operations.is_empty() {
            return Err(malformed(SpecError::NoOperations));
        }
        for op in &mut operations {
            op.base_url = Some(self.base_url.clone());
        }
        Ok(CapabilitySet::new(
            locator.clone(),
            display_name,
            description,
            operations,
        ))
    }
}

/// Router over the customer and order specs, using the keyword executor.
///
/// Known queries: "customer management", "orders" and "broken" (an empty
/// spec). Anything else has no match.
pub(crate) fn customer_router(
    base_url: &str,
) -> (RequestRouter, Arc<StaticSearch>, Arc<StaticMaterializer>) {
    let search = Arc::new(
        StaticSearch::new()
            .with("customer management", "specs/customers")
            .with("orders", "specs/orders")
            .with("broken", "specs/broken"),
    );
    let materializer = Arc::new(
        StaticMaterializer::new(base_url)
            .with_spec("specs/customers", CUSTOMER_SPEC)
            .with_spec("specs/orders", ORDER_SPEC)
            .with_spec("specs/broken", "openapi: \"3.0.0\"\npaths: {}\n"),
    );
    let router = RequestRouter::new(
        search.clone(),
        materializer.clone(),
        DelegateSlot::new(Arc::new(KeywordExecutor::new()), reqwest::Client::new()),
    );
    (router, search, materializer)
}
