//! API Server Configuration
//!
//! Environment-driven configuration for the HTTP server and the workflow
//! policy knobs. Everything has a sane default so a bare `lotgate-api`
//! starts against localhost.

use chrono::Duration;
use lotgate_core::ReviewPolicy;

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Allowed CORS origins (empty = allow any, for development)
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_origins: Vec::new(),
        }
    }
}

impl ApiConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("LOTGATE_API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("LOTGATE_API_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8080),
            cors_origins: std::env::var("LOTGATE_CORS_ORIGINS")
                .map(|s| {
                    s.split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    /// Socket address string for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Workflow policy knobs: review shortcuts, token lifetime, staleness
/// thresholds for the escalation scan.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Review policy applied to issue transitions.
    pub review: ReviewPolicy,
    /// Lifetime of an external release token.
    pub token_ttl: Duration,
    /// A notified checkpoint with no contact for this long is chase-due.
    pub chase_after: Duration,
    /// A notified checkpoint with no contact for this long is escalation-due.
    pub escalate_after: Duration,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            review: ReviewPolicy::default(),
            token_ttl: Duration::hours(72),
            chase_after: Duration::hours(24),
            escalate_after: Duration::hours(48),
        }
    }
}

impl WorkflowConfig {
    /// Load workflow policy from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            review: ReviewPolicy {
                auto_accept_minor: env_bool("LOTGATE_AUTO_ACCEPT_MINOR", false),
                allow_minor_escalation: env_bool("LOTGATE_ALLOW_MINOR_ESCALATION", false),
            },
            token_ttl: env_hours("LOTGATE_TOKEN_TTL_HOURS").unwrap_or(defaults.token_ttl),
            chase_after: env_hours("LOTGATE_CHASE_AFTER_HOURS").unwrap_or(defaults.chase_after),
            escalate_after: env_hours("LOTGATE_ESCALATE_AFTER_HOURS")
                .unwrap_or(defaults.escalate_after),
        }
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .map(|s| matches!(s.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

fn env_hours(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .filter(|h| *h > 0)
        .map(Duration::hours)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_config_defaults() {
        let config = ApiConfig::default();
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
        assert!(config.cors_origins.is_empty());
    }

    #[test]
    fn test_workflow_config_defaults() {
        let config = WorkflowConfig::default();
        assert!(!config.review.auto_accept_minor);
        assert!(!config.review.allow_minor_escalation);
        assert_eq!(config.token_ttl, Duration::hours(72));
        assert!(config.chase_after < config.escalate_after);
    }
}
