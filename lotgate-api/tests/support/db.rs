//! Shared database test infrastructure.
//!
//! Tests gated behind the `db-tests` feature expect a PostgreSQL instance
//! with schema.sql applied, reachable via the LOTGATE_DB_* environment
//! variables (defaulting to localhost/lotgate).

use lotgate_api::{DbClient, DbConfig};

pub fn test_db_client() -> DbClient {
    DbClient::from_config(&DbConfig::from_env()).expect("test database client")
}
