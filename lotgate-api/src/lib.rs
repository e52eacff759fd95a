//! LOTGATE API - REST layer for the quality workflow engine
//!
//! Axum handlers, PostgreSQL persistence, API key auth, and the
//! unauthenticated external release gateway, over the pure state machines
//! in lotgate-core.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod services;
pub mod state;
pub mod types;

pub use auth::{AccessChecker, AuthConfig, AuthContext, DbAccessChecker};
pub use config::{ApiConfig, WorkflowConfig};
pub use db::{DbClient, DbConfig};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use events::{NotificationEvent, NotificationService, Notifier, TracingNotifier};
pub use routes::create_api_router;
pub use state::AppState;
