//! talk2api HTTP server binary.
//!
//! Wires the API Hub search, the materializer, the delegate slot and the
//! optional assistant together and serves them over HTTP.
//!
//! # Environment Variables
//!
//! - `PORT` - HTTP port (default: 8080)
//! - `APIHUB_SEARCH_URL`, `APIHUB_ACCESS_TOKEN`, `APIHUB_SA_KEY_JSON` - API Hub access
//! - `APIKEY_CREDENTIAL` - API key attached to operations that require auth
//! - `TALK2API_EXECUTOR` - `llm` (default) or `keyword`
//! - `TALK2API_MODEL`, `GOOGLE_API_KEY` or `GOOGLE_GENAI_USE_VERTEXAI` - model access
//! - `RUST_LOG` - Tracing filter (default: "info,talk2api=debug")
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin talk2api-server
//! ```

use std::sync::Arc;

use anyhow::Context;
use talk2api::apihub::ApiHubClient;
use talk2api::assistant::Assistant;
use talk2api::auth::{GoogleCredentialChain, TokenProvider};
use talk2api::capabilities::ApiHubMaterializer;
use talk2api::config::{ConfigSource, EnvSource, ExecutorKind, ServerSettings};
use talk2api::delegate::{CapabilityExecutor, KeywordExecutor, LlmExecutor};
use talk2api::lifecycle::DelegateSlot;
use talk2api::llms::{BaseLLM, GeminiCompletion};
use talk2api::router::RequestRouter;
use talk2api::server::{app_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Ok(path) = dotenvy::dotenv() {
        eprintln!("Loaded environment from {}", path.display());
    }

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,talk2api=debug".into()),
        )
        .init();

    let config: Arc<dyn ConfigSource> = Arc::new(EnvSource);
    let settings = ServerSettings::load(config.as_ref()).context("Invalid configuration")?;

    let tokens: Arc<dyn TokenProvider> = Arc::new(GoogleCredentialChain::new(config.clone()));
    let http = reqwest::Client::new();

    let apihub = ApiHubClient::new(config.clone(), tokens.clone()).with_http_client(http.clone());
    let search = Arc::new(apihub.clone());
    let materializer = Arc::new(ApiHubMaterializer::new(apihub, config.clone()));

    let llm: Option<Arc<dyn BaseLLM>> =
        match GeminiCompletion::from_config(settings.model.clone(), config.as_ref(), tokens.clone()) {
            Ok(llm) => Some(Arc::new(llm) as Arc<dyn BaseLLM>),
            Err(e) => {
                tracing::warn!(error = %e, "No model configured; /chat is disabled");
                None
            }
        };

    let executor: Arc<dyn CapabilityExecutor> = match (settings.executor, &llm) {
        (ExecutorKind::Llm, Some(llm)) => Arc::new(LlmExecutor::new(llm.clone())),
        (ExecutorKind::Llm, None) => {
            anyhow::bail!("TALK2API_EXECUTOR=llm needs model credentials; set one or use keyword")
        }
        (ExecutorKind::Keyword, _) => Arc::new(KeywordExecutor::new()),
    };

    let router = Arc::new(RequestRouter::new(
        search,
        materializer,
        DelegateSlot::new(executor, http),
    ));

    let mut state = AppState::new(router.clone());
    if let Some(llm) = llm {
        state = state.with_assistant(Arc::new(Assistant::new(
            llm,
            router,
            settings.max_tool_rounds,
        )));
    }

    let app = app_router(state);
    let bind_addr = format!("0.0.0.0:{}", settings.port);

    tracing::info!(
        model = %settings.model,
        executor = ?settings.executor,
        "talk2api server starting on {}",
        bind_addr
    );
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health   - liveness probe");
    tracing::info!("  GET  /state    - router state");
    tracing::info!("  POST /discover - discover_and_create_agent");
    tracing::info!("  POST /execute  - call_execution_agent");
    tracing::info!("  POST /reset    - reset_execution_agent");
    tracing::info!("  POST /chat     - assistant");

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;

    axum::serve(listener, app).await.context("Server failed")?;
    Ok(())
}
