use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::server::handlers::{
    config, documents, health, orchestrate, rag, sessions, transactions,
};
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let cors_layer = build_cors_layer(&state);
    Router::new()
        .route("/health", get(health::health))
        .route("/api/status", get(health::api_status))
        .route("/api/orchestrate", post(orchestrate::orchestrate))
        .route("/api/rag/agentic", post(rag::agentic))
        .route("/api/rag/retrieve", post(rag::retrieve))
        .route("/api/documents", post(documents::ingest))
        .route("/api/transactions/query", post(transactions::query))
        .route("/api/transactions/chart", post(transactions::chart))
        .route("/api/transactions/email", post(transactions::email))
        .route(
            "/api/sessions",
            get(sessions::list_sessions).post(sessions::create_session),
        )
        .route(
            "/api/sessions/:session_id/messages",
            get(sessions::session_messages),
        )
        .route(
            "/api/config",
            get(config::get_config).post(config::update_config),
        )
        .with_state(state)
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
}

fn build_cors_layer(state: &Arc<AppState>) -> CorsLayer {
    let allowed_origins = state
        .config
        .server
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE, header::AUTHORIZATION])
}
