//! HTTP surface of Chat Recall.
//!
//! Conversations, their messages, ending with a summary and questions
//! across past summaries, all served as JSON.

pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;

/// Error type returned while binding or serving.
pub type ServeError = Box<dyn std::error::Error + Send + Sync>;

/// The API router with CORS and request tracing applied.
#[must_use]
pub fn build_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Serve the API on all interfaces until `shutdown` resolves.
///
/// In-flight requests finish before this returns.
///
/// # Errors
/// Returns an error if the port cannot be bound or the server fails.
pub async fn serve<F>(
    state: Arc<AppState>,
    config: &ServerConfig,
    shutdown: F,
) -> Result<(), ServeError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Chat Recall listening on http://{addr}");

    axum::serve(listener, build_app(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("Chat Recall stopped");
    Ok(())
}

/// Resolves on Ctrl+C. If the handler cannot be installed the server runs
/// until killed.
pub async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Cannot listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::ai::gateway::AiGateway;
    use crate::conversations::{ConversationService, SqliteConversationStore};

    #[tokio::test]
    async fn test_app_answers_cors_preflight() {
        let store = SqliteConversationStore::open_in_memory().await.unwrap();
        let service = ConversationService::new(Arc::new(store), Arc::new(AiGateway::simulated()));
        let app = build_app(AppState::new(service));

        let request = Request::builder()
            .method("OPTIONS")
            .uri("/api/query/")
            .header("origin", "http://localhost:3000")
            .header("access-control-request-method", "POST")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
    }
}
