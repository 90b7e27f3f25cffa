use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::adapters::{
    anthropic::claude_registry, openai::codex_registry, AdapterRegistry,
};
use crate::config::Settings;
use crate::error::{AppError, AppResult};
use crate::forward::{self, client::UpstreamPool, relay::StreamingRelay};
use crate::logger;
use crate::session::{ClaudeSessionCache, CodexSessionCache};

const SERVICE_NAME: &str = "ccx-gateway";

/// Everything a request needs, built once at startup.
pub struct AppState {
    pub settings: Settings,
    pub claude_adapters: AdapterRegistry,
    pub codex_adapters: AdapterRegistry,
    pub relay: StreamingRelay,
}

impl AppState {
    pub fn build(settings: Settings) -> AppResult<Self> {
        let pool = UpstreamPool::new(&settings.http)
            .map_err(|e| AppError::Internal(format!("HTTP client: {}", e)))?;

        let claude_sessions = Arc::new(ClaudeSessionCache::claude(
            settings.session.claude_window_secs,
        ));
        let codex_sessions = Arc::new(CodexSessionCache::codex(
            settings.session.codex_window_secs,
        ));

        let claude_adapters = claude_registry(claude_sessions)
            .map_err(|e| AppError::Internal(format!("claude adapters: {}", e)))?;
        let codex_adapters = codex_registry(codex_sessions, settings.codex_env.clone())
            .map_err(|e| AppError::Internal(format!("codex adapters: {}", e)))?;

        Ok(Self {
            settings,
            claude_adapters,
            codex_adapters,
            relay: StreamingRelay::new(Arc::new(pool)),
        })
    }
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ["/v1/messages", "/v1/responses", "/adapters", "/health"]
    }))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn list_adapters(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "adapters": {
            "claude": state.claude_adapters.list(),
            "openai": state.codex_adapters.list(),
        }
    }))
}

// ============================================
// Global Logs API Handlers
// ============================================

#[derive(Deserialize)]
struct GlobalLogsQuery {
    limit: Option<usize>,
    offset: Option<usize>,
    level: Option<String>,
    source: Option<String>,
}

async fn get_global_logs(Query(q): Query<GlobalLogsQuery>) -> Json<Value> {
    let query = logger::LogQuery {
        limit: q.limit,
        offset: q.offset,
        level: q.level.as_deref().and_then(logger::LogLevel::from_str),
        source: q.source,
    };
    let logs = logger::query_logs(&query);
    let total = logger::logs_count(&query);
    Json(json!({
        "logs": logs,
        "total": total,
        "limit": q.limit.unwrap_or(100),
        "offset": q.offset.unwrap_or(0)
    }))
}

async fn clear_global_logs() -> Json<Value> {
    Json(json!({ "deleted": logger::clear_all_logs() }))
}

pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::permissive();
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        // ============================================
        // Client-facing API
        // ============================================
        .route("/v1", get(forward::api_info))
        .route("/v1/messages", post(forward::messages))
        .route("/v1/responses", post(forward::responses))
        .route("/adapters", get(list_adapters))
        // ============================================
        // Global Logs API
        // ============================================
        .route("/api/logs", get(get_global_logs).delete(clear_global_logs))
        .with_state(state)
        .layer(cors)
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        logger::warn("server", "Ctrl-C handler unavailable, running until killed");
        std::future::pending::<()>().await;
    }
    logger::info("server", "Shutdown signal received");
}

pub async fn serve(settings: Settings) -> AppResult<()> {
    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let socket: SocketAddr = addr
        .parse()
        .map_err(|e| AppError::Config(format!("Invalid listen address {}: {}", addr, e)))?;

    let state = Arc::new(AppState::build(settings)?);
    for adapter in state.claude_adapters.list() {
        logger::info("server", &format!("claude adapter: {} v{} (priority {})", adapter.name, adapter.version, adapter.priority));
    }
    for adapter in state.codex_adapters.list() {
        logger::info("server", &format!("openai adapter: {} v{} (priority {})", adapter.name, adapter.version, adapter.priority));
    }

    let listener = tokio::net::TcpListener::bind(socket)
        .await
        .map_err(|source| AppError::Bind {
            addr: addr.clone(),
            source,
        })?;
    logger::info("server", &format!("Listening on http://{}", addr));

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    logger::info("server", "Server stopped");
    Ok(())
}
