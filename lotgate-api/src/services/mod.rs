//! Service Layer
//!
//! Business logic between the route handlers and the database client:
//! snapshot freezing, completion handling with hold-point spawning, issue
//! transitions, and the release-token gateway. Routes stay thin; services
//! apply the core guards and decide which database write to issue.

mod instance_service;
mod issue_service;
mod token_service;

pub use instance_service::*;
pub use issue_service::*;
pub use token_service::*;
