//! # Application State
//!
//! Shared state available to all HTTP request handlers. It is created once at
//! server startup and shared via `Arc` across concurrent requests.
//!
//! ## Components
//!
//! - **Rule Registry**: the storage pushdown rules. Shared, never cloned per request;
//!   rules hold no per-query state.
//! - **Server Config**: listen address and per-pass limits, read from the
//!   environment at startup.

use fluxopt_core::rule::RuleRegistry;
use std::sync::Arc;

pub const LISTEN_ADDR_VAR: &str = "FLUXOPT_LISTEN_ADDR";
pub const MAX_REWRITES_VAR: &str = "FLUXOPT_MAX_REWRITES";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be a positive integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },
}

/// Server-level optimizer configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    pub listen_addr: String,
    /// Rewrite budget for each optimization request.
    pub max_rewrites: usize,
    /// Record rule applications when a request does not say otherwise.
    pub trace_by_default: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3000".to_string(),
            max_rewrites: 10_000,
            trace_by_default: false,
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `FLUXOPT_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(addr) = lookup(LISTEN_ADDR_VAR) {
            config.listen_addr = addr;
        }
        if let Some(value) = lookup(MAX_REWRITES_VAR) {
            config.max_rewrites = match value.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::InvalidNumber {
                        var: MAX_REWRITES_VAR,
                        value,
                    })
                }
            };
        }
        Ok(config)
    }
}

/// Shared application state, accessible by all request handlers via Axum's State extractor.
pub struct AppState {
    pub rule_registry: Arc<RuleRegistry>,
    pub config: ServerConfig,
}

impl AppState {
    /// State with the storage rule set and the given configuration.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            rule_registry: Arc::new(fluxopt_rules::storage_rule_registry()),
            config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var: &str| vars.get(var).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            (LISTEN_ADDR_VAR, "127.0.0.1:8086"),
            (MAX_REWRITES_VAR, " 250 "),
        ]))
        .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:8086");
        assert_eq!(config.max_rewrites, 250);
    }

    #[test]
    fn test_invalid_budget() {
        for bad in ["0", "-1", "many"] {
            let err = ServerConfig::from_lookup(lookup(&[(MAX_REWRITES_VAR, bad)])).unwrap_err();
            assert!(err.to_string().contains(MAX_REWRITES_VAR));
        }
    }
}
