//! HTTP front-end server
//!
//! Builds the axum router over a [`Dispatcher`] and serves it. The AMQP
//! dispatcher opens a fresh broker connection per call, so concurrent
//! requests never share a blocking reply wait.

use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::domain::ports::Dispatcher;
use crate::infrastructure::amqp::AmqpDispatcher;
use crate::infrastructure::config::Config;
use crate::infrastructure::http::handlers;

/// Shared state for all route handlers.
#[derive(Clone)]
pub struct AppState {
    /// Command dispatcher; one queue call per request.
    pub dispatcher: Arc<dyn Dispatcher>,
}

/// Builds the application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ping", get(handlers::ping))
        .route("/models/{model}/add", post(handlers::add))
        .route("/models/{model}/search_add", post(handlers::search_add))
        .route("/models/{model}/add_bulk", post(handlers::add_bulk))
        .route("/models/{model}/restore", post(handlers::restore))
        .route("/models/{model}/search", post(handlers::search))
        .route("/models/{model}/compare", post(handlers::compare))
        .route("/models/{model}/urls", post(handlers::urls))
        .route("/models/{model}/dump", post(handlers::dump))
        .route("/models/{model}/count", get(handlers::count))
        .route("/models/{model}/remove", post(handlers::remove))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Runs the front-end until the listener fails.
pub async fn serve(config: &Config) -> anyhow::Result<()> {
    let state = AppState {
        dispatcher: Arc::new(AmqpDispatcher::new(config.amqp.clone())),
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.http.listen_addr).await?;
    info!("HTTP front-end listening on {}", config.http.listen_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
