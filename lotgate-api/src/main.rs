//! Lotgate API Server Entry Point
//!
//! Bootstraps tracing, configuration, the connection pool, and the Axum
//! HTTP server, with graceful shutdown on ctrl-c.

use std::sync::Arc;

use axum::{routing::get, Json, Router};
use lotgate_api::{
    create_api_router, ApiConfig, ApiError, ApiResult, AppState, AuthConfig, DbAccessChecker,
    DbClient, DbConfig, TracingNotifier, WorkflowConfig,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use utoipa::OpenApi;

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracing();

    let db_config = DbConfig::from_env();
    let db = DbClient::from_config(&db_config)?;

    let api_config = ApiConfig::from_env();
    let workflow_config = WorkflowConfig::from_env();
    let auth_config = Arc::new(AuthConfig::from_env()?);
    if auth_config.is_empty() {
        tracing::warn!("LOTGATE_API_KEYS is not set; all authenticated routes will reject");
    }

    let state = Arc::new(AppState::new(
        db.clone(),
        Arc::new(TracingNotifier),
        Arc::new(DbAccessChecker::new(db)),
        workflow_config,
    ));

    let app: Router = create_api_router(state, auth_config, &api_config).route(
        "/api-docs/openapi.json",
        get(|| async { Json(lotgate_api::openapi::ApiDoc::openapi()) }),
    );

    let addr = api_config.bind_addr();
    tracing::info!(%addr, "Starting Lotgate API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    let json_logs = std::env::var("LOTGATE_LOG_JSON")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
