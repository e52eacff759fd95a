//! Authentication Module
//!
//! API key authentication (via X-API-Key header) plus project-scoped
//! authorization. Keys map to named principals; a principal may act on a
//! lot only if the project_members table says they belong to its project.

use crate::db::DbClient;
use crate::error::{ApiError, ApiResult};
use async_trait::async_trait;
use lotgate_core::EntityId;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::sync::Arc;

// ============================================================================
// API KEYS
// ============================================================================

/// Type-safe API key that prevents accidental logging.
#[derive(Clone)]
pub struct ApiKey(SecretString);

impl ApiKey {
    pub fn new(key: String) -> ApiResult<Self> {
        if key.len() < 16 {
            return Err(ApiError::invalid_input(
                "API keys must be at least 16 characters",
            ));
        }
        Ok(Self(SecretString::new(key.into())))
    }

    /// Constant-shape comparison: both sides are hashed before comparing so
    /// the match never short-circuits on a shared prefix of the raw key.
    pub fn matches(&self, candidate: &str) -> bool {
        let ours = Sha256::digest(self.0.expose_secret().as_bytes());
        let theirs = Sha256::digest(candidate.as_bytes());
        ours == theirs
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ApiKey([REDACTED])")
    }
}

/// Authentication configuration: the principal-to-key table.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    keys: Vec<(String, ApiKey)>,
}

impl AuthConfig {
    /// Parse `LOTGATE_API_KEYS` in the form
    /// `principal=key,principal2=key2`. An unset variable yields an empty
    /// table, which rejects every request; the server logs a warning at
    /// startup rather than refusing to boot.
    pub fn from_env() -> ApiResult<Self> {
        let raw = match std::env::var("LOTGATE_API_KEYS") {
            Ok(v) => v,
            Err(_) => return Ok(Self::default()),
        };

        let mut keys = Vec::new();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (principal, key) = entry.split_once('=').ok_or_else(|| {
                ApiError::invalid_input("LOTGATE_API_KEYS entries must be principal=key")
            })?;
            if principal.trim().is_empty() {
                return Err(ApiError::invalid_input(
                    "LOTGATE_API_KEYS entry has an empty principal",
                ));
            }
            keys.push((principal.trim().to_string(), ApiKey::new(key.trim().to_string())?));
        }
        Ok(Self { keys })
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Resolve a presented key to its principal, if any key matches.
    pub fn authenticate(&self, presented: &str) -> Option<&str> {
        self.keys
            .iter()
            .find(|(_, key)| key.matches(presented))
            .map(|(principal, _)| principal.as_str())
    }

    #[cfg(test)]
    pub fn with_key(principal: &str, key: &str) -> Self {
        Self {
            keys: vec![(
                principal.to_string(),
                ApiKey::new(key.to_string()).expect("test key"),
            )],
        }
    }
}

// ============================================================================
// AUTH CONTEXT
// ============================================================================

/// Authenticated request context, attached by the auth middleware.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// The principal name the presented API key resolved to.
    pub principal: String,
}

// ============================================================================
// PROJECT ACCESS
// ============================================================================

/// Authorization seam: may this principal act within this project?
///
/// The database-backed implementation consults project_members; tests swap
/// in an allow-all or deny-all checker.
#[async_trait]
pub trait AccessChecker: Send + Sync {
    async fn is_member(&self, principal: &str, project_id: EntityId) -> ApiResult<bool>;
}

/// Shared handle used by route state.
pub type Access = Arc<dyn AccessChecker>;

/// Membership check backed by the project_members table.
pub struct DbAccessChecker {
    db: DbClient,
}

impl DbAccessChecker {
    pub fn new(db: DbClient) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AccessChecker for DbAccessChecker {
    async fn is_member(&self, principal: &str, project_id: EntityId) -> ApiResult<bool> {
        self.db.is_project_member(principal, project_id).await
    }
}

/// Enforce project membership for an operation on a lot. The error does
/// not reveal whether the project exists.
pub async fn validate_project_access(
    access: &Access,
    auth: &AuthContext,
    project_id: EntityId,
) -> ApiResult<()> {
    if access.is_member(&auth.principal, project_id).await? {
        Ok(())
    } else {
        Err(ApiError::forbidden(
            "principal is not a member of this project",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Allow-all checker for route tests.
    pub struct AllowAll;

    #[async_trait]
    impl AccessChecker for AllowAll {
        async fn is_member(&self, _principal: &str, _project_id: EntityId) -> ApiResult<bool> {
            Ok(true)
        }
    }

    #[test]
    fn test_api_key_rejects_short_keys() {
        assert!(ApiKey::new("short".to_string()).is_err());
        assert!(ApiKey::new("long-enough-api-key-0001".to_string()).is_ok());
    }

    #[test]
    fn test_api_key_matches_exact_only() {
        let key = ApiKey::new("long-enough-api-key-0001".to_string()).unwrap();
        assert!(key.matches("long-enough-api-key-0001"));
        assert!(!key.matches("long-enough-api-key-0002"));
        assert!(!key.matches("long-enough-api-key"));
    }

    #[test]
    fn test_api_key_debug_redacts() {
        let key = ApiKey::new("long-enough-api-key-0001".to_string()).unwrap();
        let debug = format!("{:?}", key);
        assert!(!debug.contains("0001"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_auth_config_resolves_principal() {
        let config = AuthConfig::with_key("site-engineer", "long-enough-api-key-0001");
        assert_eq!(
            config.authenticate("long-enough-api-key-0001"),
            Some("site-engineer")
        );
        assert_eq!(config.authenticate("wrong-key-wrong-key-1"), None);
    }

    #[tokio::test]
    async fn test_validate_project_access_allows_members() {
        let access: Access = Arc::new(AllowAll);
        let auth = AuthContext {
            principal: "site-engineer".to_string(),
        };
        let result = validate_project_access(&access, &auth, lotgate_core::new_entity_id()).await;
        assert!(result.is_ok());
    }
}
