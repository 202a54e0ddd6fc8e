//! HTTP server implementation using Axum.

use crate::handlers::{
    handle_create_contact, handle_delete_contact, handle_get_contact, handle_health,
    handle_invalidate_contact, handle_list_contacts, handle_reset_circuits, handle_status,
    handle_update_contact,
};
use agenda_core::AgendaApi;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Application state shared across handlers.
pub struct AppState {
    pub api: AgendaApi,
}

/// Build the router with all routes and middleware.
pub fn build_router(api: AgendaApi) -> Router {
    let state = Arc::new(AppState { api });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/status", get(handle_status))
        .route("/status/reset", post(handle_reset_circuits))
        .route(
            "/contacts",
            get(handle_list_contacts).post(handle_create_contact),
        )
        .route(
            "/contacts/:id",
            get(handle_get_contact)
                .put(handle_update_contact)
                .delete(handle_delete_contact),
        )
        .route("/contacts/:id/invalidate", post(handle_invalidate_contact))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Start the HTTP server.
///
/// Returns the actual address the server is bound to (useful when port=0).
pub async fn start_server(api: AgendaApi, host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    let app = build_router(api);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Server listening on {}", actual_addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Server error: {}", e);
        }
    });

    Ok(actual_addr)
}
