//! Binds and serves the HTTP gateway on a single listener (no
//! port-fallback retry — the kernel is a single long-lived process, not a
//! desktop app racing other local instances) and with no auth middleware:
//! every operational endpoint is gated purely by `require_setup_complete`,
//! and setup endpoints themselves are always reachable.

use std::net::SocketAddr;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::config::schema::ServerConfig;

use super::routes;
use super::state::GatewayState;
use super::ws::ws_handler;

pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/api/think", post(routes::think))
        .route("/api/memory/store", post(routes::memory_store))
        .route("/api/memory/search", post(routes::memory_search))
        .route("/api/budget", get(routes::budget))
        .route("/api/budget/breakdown", get(routes::budget_breakdown))
        .route("/api/status", get(routes::status))
        .route("/api/restart", post(routes::restart))
        .route("/api/rollback", post(routes::rollback))
        .route("/api/commit", post(routes::commit))
        .route("/api/log", post(routes::agent_log))
        .route("/api/chat", get(routes::chat_list).post(routes::chat_post))
        .route("/api/chat/:id/ack", post(routes::chat_ack))
        .route("/api/inbox", get(routes::inbox_list).post(routes::inbox_post))
        .route("/api/library", get(routes::library_list).post(routes::library_create))
        .route("/api/library/:id", put(routes::library_update).patch(routes::library_update).delete(routes::library_delete))
        .route("/api/library/:id/comment", post(routes::library_comment))
        .route("/api/library/:id/comments", get(routes::library_comments_list))
        .route("/api/heartbeat", post(routes::heartbeat))
        .route("/api/galla", get(routes::galla_list).post(routes::galla_post))
        .route("/api/llm-calls", get(routes::llm_calls_list))
        .route("/api/ws", get(ws_handler))
        .route("/jodo/*rest", axum::routing::any(routes::jodo_proxy))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds and serves forever. Returns only on a fatal listener error —
/// the kernel process exits if its own HTTP surface cannot come up.
pub async fn start_gateway(server: &ServerConfig, state: GatewayState) -> std::io::Result<()> {
    let addr: SocketAddr = format!("{}:{}", server.bind_addr, server.port)
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("bad bind address: {e}")))?;

    tracing::info!(%addr, "kernel gateway listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let router = build_router(state);
    axum::serve(listener, router).await
}
