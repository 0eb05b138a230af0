//! Turns a capability locator into a [`CapabilitySet`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::apihub::ApiHubClient;
use crate::auth::static_credential;
use crate::config::ConfigSource;

use super::capability::{CapabilityLocator, CapabilitySet};
use super::error::{MaterializeError, SpecError};
use super::openapi_parser::parse_openapi_spec;

#[async_trait]
pub trait Materializer: Send + Sync {
    /// Fetch, parse and prepare the operations behind `locator`.
    ///
    /// Never returns an empty set: a spec with no operations is malformed.
    async fn materialize(
        &self,
        locator: &CapabilityLocator,
        display_name: &str,
        description: &str,
    ) -> Result<CapabilitySet, MaterializeError>;
}

/// Materializes API Hub specs and attaches the static API-key credential.
#[derive(Debug, Clone)]
pub struct ApiHubMaterializer {
    client: ApiHubClient,
    config: Arc<dyn ConfigSource>,
}

impl ApiHubMaterializer {
    pub fn new(client: ApiHubClient, config: Arc<dyn ConfigSource>) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl Materializer for ApiHubMaterializer {
    async fn materialize(
        &self,
        locator: &CapabilityLocator,
        display_name: &str,
        description: &str,
    ) -> Result<CapabilitySet, MaterializeError> {
        tracing::info!(locator = %locator, name = display_name, "Creating capability set");

        let content = self
            .client
            .fetch_spec_content(locator)
            .await
            .map_err(|source| {
                tracing::error!(locator = %locator, error = %source, "Failed to fetch spec");
                MaterializeError::Fetch {
                    locator: locator.clone(),
                    source,
                }
            })?;

        let malformed = |source: SpecError| {
            tracing::error!(locator = %locator, error = %source, "Spec is malformed");
            MaterializeError::Malformed {
                locator: locator.clone(),
                source,
            }
        };

        let mut operations = parse_openapi_spec(&content).map_err(malformed)?;
        if operations.is_empty() {
            return Err(malformed(SpecError::NoOperations));
        }

        // Credentials are bound now, never at call time.
        if let Some(credential) = static_credential(self.config.as_ref()) {
            for op in operations.iter_mut().filter(|op| op.requires_auth()) {
                op.configure_auth_credential(credential.clone());
            }
        }

        let set = CapabilitySet::new(locator.clone(), display_name, description, operations);
        tracing::info!(
            count = set.len(),
            tools = ?set.operation_names(),
            "Discovered operations"
        );
        Ok(set)
    }
}
