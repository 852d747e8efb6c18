//! Network-target resolution
//!
//! Endpoints may point at a referenced service instead of a literal URI.
//! The reference is resolved at convergence time, never stored: the
//! resolved address is pushed to the gateway as the backend target and
//! re-resolved on every pass.

use async_trait::async_trait;
use gantry_types::ServiceRef;
use std::collections::HashMap;
use thiserror::Error;

/// Resolution failures
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The referenced service does not exist; the endpoint pass aborts
    /// before touching the gateway
    #[error("target service {0} not found")]
    NotFound(String),

    /// The resolver backend itself failed
    #[error("resolver error: {0}")]
    Backend(String),
}

/// A resolved service address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTarget {
    pub protocol: String,
    pub host: String,
    pub port: u16,
}

impl ServiceTarget {
    /// Compose the backend URI with an optional path suffix
    pub fn join(&self, suffix: &str) -> String {
        let base = format!("{}://{}:{}", self.protocol, self.host, self.port);
        let suffix = suffix.trim_start_matches('/');
        if suffix.is_empty() {
            base
        } else {
            format!("{base}/{suffix}")
        }
    }
}

/// Resolves service references to network addresses
#[async_trait]
pub trait TargetResolver: Send + Sync {
    async fn resolve(&self, service: &ServiceRef) -> Result<ServiceTarget, ResolveError>;
}

/// Config-driven resolver over a fixed service table
///
/// Entries are keyed `namespace/name`, or bare `name` for services without
/// a namespace.
#[derive(Debug, Default)]
pub struct StaticResolver {
    entries: HashMap<String, ServiceTarget>,
}

impl StaticResolver {
    pub fn new(entries: HashMap<String, ServiceTarget>) -> Self {
        Self { entries }
    }

    pub fn insert(&mut self, key: impl Into<String>, target: ServiceTarget) {
        self.entries.insert(key.into(), target);
    }
}

#[async_trait]
impl TargetResolver for StaticResolver {
    async fn resolve(&self, service: &ServiceRef) -> Result<ServiceTarget, ResolveError> {
        self.entries
            .get(&service.to_string())
            .cloned()
            .ok_or_else(|| ResolveError::NotFound(service.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> ServiceTarget {
        ServiceTarget {
            protocol: "http".into(),
            host: "orders.internal".into(),
            port: 8080,
        }
    }

    #[test]
    fn test_join_with_suffix() {
        assert_eq!(target().join("/v1/orders"), "http://orders.internal:8080/v1/orders");
        assert_eq!(target().join("v1"), "http://orders.internal:8080/v1");
        assert_eq!(target().join(""), "http://orders.internal:8080");
    }

    #[tokio::test]
    async fn test_static_resolver_lookup() {
        let mut resolver = StaticResolver::default();
        resolver.insert("prod/orders", target());

        let found = resolver
            .resolve(&ServiceRef {
                name: "orders".into(),
                namespace: Some("prod".into()),
            })
            .await
            .unwrap();
        assert_eq!(found, target());

        let missing = resolver
            .resolve(&ServiceRef {
                name: "nope".into(),
                namespace: None,
            })
            .await;
        assert!(matches!(missing, Err(ResolveError::NotFound(_))));
    }
}
