//! Google Cloud API Hub client.
//!
//! Two calls are needed: semantic search over operation resources, and
//! fetching the contents of the spec an operation belongs to. Configuration
//! and tokens are looked up on every call.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::auth::TokenProvider;
use crate::capabilities::{CapabilityLocator, CapabilitySearch};
use crate::config::{ConfigSource, APIHUB_API_BASE, APIHUB_SEARCH_URL, DEFAULT_APIHUB_API_BASE};

/// Resource filter sent with every search.
pub const OPERATION_FILTER: &str = "resource_type = ApiOperation";

#[derive(Debug, Error)]
pub enum ApiHubError {
    #[error("APIHUB_SEARCH_URL is not configured")]
    MissingSearchUrl,

    #[error("Could not obtain an access token")]
    MissingToken,

    #[error("API Hub request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API Hub returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected API Hub response: {0}")]
    Decode(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    search_results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    resource: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpecContents {
    #[serde(default)]
    contents: String,
    #[serde(default)]
    mime_type: Option<String>,
}

/// Thin async client over the API Hub REST surface.
#[derive(Debug, Clone)]
pub struct ApiHubClient {
    http: reqwest::Client,
    config: Arc<dyn ConfigSource>,
    tokens: Arc<dyn TokenProvider>,
}

impl ApiHubClient {
    pub fn new(config: Arc<dyn ConfigSource>, tokens: Arc<dyn TokenProvider>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            http,
            config,
            tokens,
        }
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Run one semantic search and return the first result's spec reference.
    ///
    /// `Ok(None)` means the search ran and matched nothing usable.
    pub async fn search_spec(&self, query: &str) -> Result<Option<CapabilityLocator>, ApiHubError> {
        let search_url = self
            .config
            .get(APIHUB_SEARCH_URL)
            .ok_or(ApiHubError::MissingSearchUrl)?;
        let token = self
            .tokens
            .access_token()
            .await
            .ok_or(ApiHubError::MissingToken)?;

        tracing::info!(query, "Searching API Hub");

        let response = self
            .http
            .post(&search_url)
            .bearer_auth(token)
            .json(&serde_json::json!({
                "query": query,
                "filter": OPERATION_FILTER,
                "pageSize": 1,
            }))
            .send()
            .await?;
        let data: SearchResponse = read_json(response).await?;

        let Some(first) = data.search_results.first() else {
            tracing::info!(query, "No API Hub results");
            return Ok(None);
        };

        match first
            .resource
            .pointer("/operation/spec")
            .and_then(|s| s.as_str())
            .filter(|s| !s.is_empty())
        {
            Some(spec) => {
                tracing::info!(spec, "Found spec");
                Ok(Some(CapabilityLocator::new(spec)))
            }
            None => {
                tracing::warn!(result = %first.resource, "Search result carries no spec");
                Ok(None)
            }
        }
    }

    /// Download and decode the spec document behind `locator`.
    ///
    /// Version and API locators resolve to their first spec.
    pub async fn fetch_spec_content(&self, locator: &CapabilityLocator) -> Result<String, ApiHubError> {
        let token = self
            .tokens
            .access_token()
            .await
            .ok_or(ApiHubError::MissingToken)?;
        let base = self
            .config
            .get_or(APIHUB_API_BASE, DEFAULT_APIHUB_API_BASE);
        let base = base.trim_end_matches('/');

        let spec_name = self.resolve_spec_name(base, &token, locator.as_str()).await?;
        let url = format!("{}/v1/{}:contents", base, spec_name);
        let response = self.http.get(&url).bearer_auth(&token).send().await?;
        let contents: SpecContents = read_json(response).await?;

        tracing::debug!(
            spec = %spec_name,
            mime_type = contents.mime_type.as_deref().unwrap_or("unknown"),
            "Fetched spec contents"
        );

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(contents.contents.trim())
            .map_err(|e| ApiHubError::Decode(format!("spec contents are not base64: {}", e)))?;
        String::from_utf8(bytes)
            .map_err(|e| ApiHubError::Decode(format!("spec contents are not UTF-8: {}", e)))
    }

    async fn resolve_spec_name(
        &self,
        base: &str,
        token: &str,
        name: &str,
    ) -> Result<String, ApiHubError> {
        let name = name.trim_matches('/');
        if name.contains("/specs/") {
            return Ok(name.to_string());
        }
        if name.contains("/versions/") {
            return self.first_child(base, token, name, "specs").await;
        }
        if name.contains("/apis/") {
            let version = self.first_child(base, token, name, "versions").await?;
            return self.first_child(base, token, &version, "specs").await;
        }
        Err(ApiHubError::Decode(format!(
            "'{}' is not an API, version or spec resource",
            name
        )))
    }

    async fn first_child(
        &self,
        base: &str,
        token: &str,
        parent: &str,
        field: &str,
    ) -> Result<String, ApiHubError> {
        let url = format!("{}/v1/{}", base, parent);
        let response = self.http.get(&url).bearer_auth(token).send().await?;
        let resource: Value = read_json(response).await?;
        resource
            .get(field)
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first())
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| ApiHubError::Decode(format!("{} has no {}", parent, field)))
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ApiHubError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ApiHubError::Status {
            status: status.as_u16(),
            body,
        });
    }
    response
        .json::<T>()
        .await
        .map_err(|e| ApiHubError::Decode(e.to_string()))
}

#[async_trait]
impl CapabilitySearch for ApiHubClient {
    async fn search(&self, query: &str) -> Option<CapabilityLocator> {
        match self.search_spec(query).await {
            Ok(found) => found,
            Err(ApiHubError::MissingSearchUrl) => {
                tracing::error!("{} not configured", APIHUB_SEARCH_URL);
                None
            }
            Err(ApiHubError::MissingToken) => {
                tracing::error!(
                    "Could not obtain access token (check ADC / GOOGLE_APPLICATION_CREDENTIALS)"
                );
                None
            }
            Err(e) => {
                tracing::error!(error = %e, "API Hub search failed");
                None
            }
        }
    }
}
