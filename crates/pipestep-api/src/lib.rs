pub mod handlers;

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use pipestep_core::config::ServerConfig;
use tower_http::cors::{Any, CorsLayer};

pub use handlers::ApiState;

/// All routes, nested under `/api`.
pub fn router(state: ApiState, max_body_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/status", get(handlers::handle_status))
        .route("/tasks", get(handlers::handle_task_types))
        .route("/var-helper", post(handlers::handle_var_helper))
        .route("/task", post(handlers::handle_task))
        .route("/graph", post(handlers::handle_graph))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(cors)
}

pub async fn serve(state: ApiState, config: &ServerConfig) -> anyhow::Result<()> {
    let app = router(state, config.max_body_bytes);

    let addr = format!("{}:{}", config.bind, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    let local = listener.local_addr()?;
    tracing::info!(addr = %local, "API listening");
    axum::serve(listener, app).await?;
    Ok(())
}
