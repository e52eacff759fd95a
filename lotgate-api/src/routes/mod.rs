//! REST API Routes
//!
//! Router assembly. Everything under /api/v1 sits behind the API key
//! middleware; the health probes and the external release gateway do not.
//! The gateway's bearer secret IS its credential, so wrapping it in the
//! staff auth layer would defeat its purpose.

pub mod checkpoint;
pub mod external;
pub mod health;
pub mod instance;
pub mod issue;
pub mod lot;
pub mod template;

use crate::auth::AuthConfig;
use crate::config::ApiConfig;
use crate::middleware::auth_middleware;
use crate::state::AppState;
use axum::http::HeaderValue;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the CORS layer from configured origins; an empty list is the
/// permissive development default.
fn cors_layer(config: &ApiConfig) -> CorsLayer {
    if config.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Assemble the full application router.
pub fn create_api_router(
    state: Arc<AppState>,
    auth_config: Arc<AuthConfig>,
    api_config: &ApiConfig,
) -> Router {
    let authenticated = Router::new()
        .merge(template::create_router(state.clone()))
        .merge(lot::create_router(state.clone()))
        .merge(instance::create_router(state.clone()))
        .merge(checkpoint::create_router(state.clone()))
        .merge(issue::create_router(state.clone()))
        .layer(axum::middleware::from_fn_with_state(
            auth_config,
            auth_middleware,
        ));

    Router::new()
        .merge(health::create_router(state.clone()))
        .merge(external::create_router(state))
        .merge(authenticated)
        .layer(cors_layer(api_config))
        .layer(TraceLayer::new_for_http())
}
