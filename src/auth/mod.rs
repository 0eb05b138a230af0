//! Credential provider.
//!
//! Resolves the bearer token used against API Hub and the optional static
//! API key attached to discovered operations. The token chain mirrors the
//! usual Google order: an inline service-account key, then Application
//! Default Credentials (key file, gcloud well-known file, metadata server).
//! When the chain fails the pre-obtained `APIHUB_ACCESS_TOKEN` is used.

pub mod credential;
pub mod service_account;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::config::{
    ConfigSource, APIHUB_ACCESS_TOKEN, APIHUB_SA_KEY_JSON, APIKEY_CREDENTIAL,
    GOOGLE_APPLICATION_CREDENTIALS,
};

pub use credential::{ApiKeyLocation, AuthCredential, AuthScheme, RequestParts};
pub use service_account::ServiceAccountKey;

pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

const DEFAULT_OAUTH_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Errors raised inside the credential chain. They never leave
/// [`GoogleCredentialChain::access_token`]; the chain falls back instead.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid service account key: {0}")]
    InvalidKey(String),

    #[error("Unsupported credentials file type: {0}")]
    UnsupportedCredentials(String),

    #[error("Failed to read credentials file {path}: {source}")]
    CredentialsFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Token request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Token endpoint returned {status}: {body}")]
    TokenEndpoint { status: u16, body: String },
}

/// The token endpoint's success payload.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    access_token: String,
}

impl TokenResponse {
    pub(crate) async fn read(response: reqwest::Response) -> Result<String, AuthError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::TokenEndpoint {
                status: status.as_u16(),
                body,
            });
        }
        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }
}

/// Supplies bearer tokens for API Hub calls.
#[async_trait]
pub trait TokenProvider: Send + Sync + std::fmt::Debug {
    /// A usable access token, or `None` when every source failed.
    async fn access_token(&self) -> Option<String>;
}

/// Always returns the same token. Useful for tests and for pre-minted tokens.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: Option<String>,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        Self {
            token: (!token.is_empty()).then_some(token),
        }
    }

    pub fn empty() -> Self {
        Self { token: None }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Option<String> {
        self.token.clone()
    }
}

/// Read the static API-key credential, if one is configured.
pub fn static_credential(config: &dyn ConfigSource) -> Option<AuthCredential> {
    config.get(APIKEY_CREDENTIAL).map(AuthCredential::ApiKey)
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CredentialsFile {
    ServiceAccount(ServiceAccountKey),
    AuthorizedUser {
        client_id: String,
        client_secret: String,
        refresh_token: String,
    },
}

/// Google credential chain with a static-token fallback.
#[derive(Debug, Clone)]
pub struct GoogleCredentialChain {
    config: Arc<dyn ConfigSource>,
    http: reqwest::Client,
    oauth_token_url: String,
    metadata_token_url: String,
    well_known_file: Option<PathBuf>,
}

impl GoogleCredentialChain {
    pub fn new(config: Arc<dyn ConfigSource>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        let well_known_file = std::env::var("HOME").ok().map(|home| {
            PathBuf::from(home).join(".config/gcloud/application_default_credentials.json")
        });
        Self {
            config,
            http,
            oauth_token_url: DEFAULT_OAUTH_TOKEN_URL.to_string(),
            metadata_token_url: DEFAULT_METADATA_TOKEN_URL.to_string(),
            well_known_file,
        }
    }

    pub fn with_oauth_token_url(mut self, url: impl Into<String>) -> Self {
        self.oauth_token_url = url.into();
        self
    }

    pub fn with_metadata_token_url(mut self, url: impl Into<String>) -> Self {
        self.metadata_token_url = url.into();
        self
    }

    pub fn with_well_known_file(mut self, path: Option<PathBuf>) -> Self {
        self.well_known_file = path;
        self
    }

    async fn refresh(&self) -> Result<String, AuthError> {
        if let Some(raw) = self.config.get(APIHUB_SA_KEY_JSON) {
            let key = ServiceAccountKey::from_json(&raw)?;
            return key.fetch_token(&self.http).await;
        }
        self.application_default().await
    }

    async fn application_default(&self) -> Result<String, AuthError> {
        let explicit = self
            .config
            .get(GOOGLE_APPLICATION_CREDENTIALS)
            .map(PathBuf::from);
        let well_known = self.well_known_file.clone().filter(|p| p.exists());

        match explicit.or(well_known) {
            Some(path) => {
                let raw = tokio::fs::read_to_string(&path).await.map_err(|source| {
                    AuthError::CredentialsFile {
                        path: path.display().to_string(),
                        source,
                    }
                })?;
                self.from_credentials_file(&raw).await
            }
            None => self.metadata_token().await,
        }
    }

    async fn from_credentials_file(&self, raw: &str) -> Result<String, AuthError> {
        let file: CredentialsFile = serde_json::from_str(raw)
            .map_err(|e| AuthError::UnsupportedCredentials(e.to_string()))?;
        match file {
            CredentialsFile::ServiceAccount(key) => key.fetch_token(&self.http).await,
            CredentialsFile::AuthorizedUser {
                client_id,
                client_secret,
                refresh_token,
            } => {
                let response = self
                    .http
                    .post(&self.oauth_token_url)
                    .form(&[
                        ("grant_type", "refresh_token"),
                        ("client_id", client_id.as_str()),
                        ("client_secret", client_secret.as_str()),
                        ("refresh_token", refresh_token.as_str()),
                    ])
                    .send()
                    .await?;
                TokenResponse::read(response).await
            }
        }
    }

    async fn metadata_token(&self) -> Result<String, AuthError> {
        let response = self
            .http
            .get(&self.metadata_token_url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await?;
        TokenResponse::read(response).await
    }
}

#[async_trait]
impl TokenProvider for GoogleCredentialChain {
    async fn access_token(&self) -> Option<String> {
        match self.refresh().await {
            Ok(token) if !token.is_empty() => Some(token),
            Ok(_) => {
                tracing::warn!("Credential chain returned an empty token, falling back to {}", APIHUB_ACCESS_TOKEN);
                self.config.get(APIHUB_ACCESS_TOKEN)
            }
            Err(e) => {
                tracing::warn!("Auth failed ({}), falling back to {}", e, APIHUB_ACCESS_TOKEN);
                self.config.get(APIHUB_ACCESS_TOKEN)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapSource;
    use std::io::Write;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TEST_PEM: &str = include_str!("testdata/test_service_account.pem");

    fn token_body(token: &str) -> serde_json::Value {
        serde_json::json!({"access_token": token, "expires_in": 3600, "token_type": "Bearer"})
    }

    fn chain(config: MapSource, server: &MockServer) -> GoogleCredentialChain {
        GoogleCredentialChain::new(Arc::new(config))
            .with_oauth_token_url(format!("{}/oauth/token", server.uri()))
            .with_metadata_token_url(format!("{}/metadata/token", server.uri()))
            .with_well_known_file(None)
    }

    #[tokio::test]
    async fn test_inline_service_account_key_is_preferred() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sa/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("from-sa")))
            .mount(&server)
            .await;

        let sa = serde_json::json!({
            "type": "service_account",
            "client_email": "svc@example.iam.gserviceaccount.com",
            "private_key": TEST_PEM,
            "token_uri": format!("{}/sa/token", server.uri()),
        });
        let config = MapSource::new()
            .with(APIHUB_SA_KEY_JSON, sa.to_string())
            .with(APIHUB_ACCESS_TOKEN, "static");

        let token = chain(config, &server).access_token().await;
        assert_eq!(token.as_deref(), Some("from-sa"));
    }

    #[tokio::test]
    async fn test_malformed_key_falls_back_to_static_token() {
        let server = MockServer::start().await;
        let config = MapSource::new()
            .with(APIHUB_SA_KEY_JSON, "{not json")
            .with(APIHUB_ACCESS_TOKEN, "static-token");

        let token = chain(config, &server).access_token().await;
        assert_eq!(token.as_deref(), Some("static-token"));
    }

    #[tokio::test]
    async fn test_no_sources_and_no_fallback_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metadata/token"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let token = chain(MapSource::new(), &server).access_token().await;
        assert!(token.is_none());
    }

    #[tokio::test]
    async fn test_metadata_server_is_last_adc_source() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metadata/token"))
            .and(header("Metadata-Flavor", "Google"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("from-gce")))
            .mount(&server)
            .await;

        let token = chain(MapSource::new(), &server).access_token().await;
        assert_eq!(token.as_deref(), Some("from-gce"));
    }

    #[tokio::test]
    async fn test_authorized_user_file_uses_refresh_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("from-user")))
            .mount(&server)
            .await;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "{}",
            serde_json::json!({
                "type": "authorized_user",
                "client_id": "cid",
                "client_secret": "csecret",
                "refresh_token": "rt",
            })
        )
        .unwrap();

        let config = MapSource::new().with(
            GOOGLE_APPLICATION_CREDENTIALS,
            file.path().display().to_string(),
        );
        let token = chain(config, &server).access_token().await;
        assert_eq!(token.as_deref(), Some("from-user"));
    }

    #[tokio::test]
    async fn test_static_provider() {
        assert_eq!(
            StaticTokenProvider::new("t").access_token().await.as_deref(),
            Some("t")
        );
        assert!(StaticTokenProvider::new("").access_token().await.is_none());
        assert!(StaticTokenProvider::empty().access_token().await.is_none());
    }

    #[test]
    fn test_static_credential_reads_config_lazily() {
        let config = MapSource::new();
        assert!(static_credential(&config).is_none());
        config.set(APIKEY_CREDENTIAL, "abc");
        assert_eq!(
            static_credential(&config),
            Some(AuthCredential::ApiKey("abc".to_string()))
        );
    }
}
