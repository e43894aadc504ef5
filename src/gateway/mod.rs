//! Axum HTTP gateway: NDJSON generation streams plus conversation
//! maintenance endpoints, behind bearer-token auth, body limits and
//! request timeouts.

mod handlers;

use handlers::{
    handle_cleanup, handle_generate, handle_health, handle_stats, handle_summarize,
};

use crate::app::services::Services;
use crate::auth::ActorDirectory;
use crate::config::{Config, GatewayConfig};
use crate::conversation::{ConversationStore, SummarizationService};
use crate::generation::GenerationOrchestrator;
use anyhow::{Context, Result};
use axum::{
    Router,
    http::StatusCode,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<GenerationOrchestrator>,
    pub summarizer: Arc<SummarizationService>,
    pub conversations: Arc<dyn ConversationStore>,
    pub directory: Arc<ActorDirectory>,
}

impl AppState {
    pub fn from_services(services: &Services) -> Self {
        Self {
            orchestrator: Arc::clone(&services.orchestrator),
            summarizer: Arc::clone(&services.summarizer),
            conversations: services.conversations.clone(),
            directory: Arc::clone(&services.directory),
        }
    }
}

/// `POST /api/summarize` body
#[derive(Debug, serde::Deserialize)]
pub struct SummarizeBody {
    pub song_id: i64,
    pub purpose: String,
}

pub fn router(state: AppState, gateway: &GatewayConfig) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/api/generate/{kind}", get(handle_generate))
        .route("/api/summarize", post(handle_summarize))
        .route(
            "/api/songs/{song_id}/conversations/{purpose}/stats",
            get(handle_stats),
        )
        .route(
            "/api/songs/{song_id}/conversations/{purpose}/cleanup",
            post(handle_cleanup),
        )
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(gateway.max_body_bytes))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(gateway.request_timeout_secs),
        ))
}

/// Bind `host:port` and serve until the process is stopped.
pub async fn run_gateway(host: &str, port: u16, config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid gateway address {host}:{port}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;

    run_gateway_with_listener(listener, config).await
}

/// Run the HTTP gateway from a pre-bound listener.
pub async fn run_gateway_with_listener(
    listener: tokio::net::TcpListener,
    config: Config,
) -> Result<()> {
    let local = listener.local_addr()?;
    let services = Services::open(&config).await?;
    let refresher = services.start_flag_refresher();

    if services.directory.is_empty() {
        tracing::warn!("no [[users]] configured; every API request will be rejected");
    }

    let app = router(AppState::from_services(&services), &config.gateway);
    tracing::info!(addr = %local, users = services.directory.len(), "gateway listening");
    println!("◆ songsmith gateway on http://{local}");
    println!("  GET  /health");
    println!("  GET  /api/generate/{{names,styles,hooks,words,lyrics,lyrics_section}}");
    println!("  POST /api/summarize");

    let served = axum::serve(listener, app).await;
    if let Some(handle) = refresher {
        handle.abort();
    }
    served?;
    Ok(())
}
