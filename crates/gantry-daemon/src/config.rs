//! Configuration for gantry-daemon

use crate::error::DaemonError;
use gantry_core::{PropagationSettings, ServiceTarget, StaticResolver};
use gantry_gateway::{Gateway, GatewayAuth, HttpGateway, HttpGatewayConfig, MemoryGateway};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Gateway backend configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Target service resolution table
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Controller configuration
    #[serde(default)]
    pub controller: ControllerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    pub listen_addr: SocketAddr,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8084".parse().unwrap(),
            enable_cors: true,
        }
    }
}

/// Gateway backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GatewayConfig {
    /// In-memory gateway (for development/testing)
    Memory,

    /// Real management API over HTTP
    Http {
        /// Management API base URL
        base_url: String,

        /// Routing coordinates scoping every call
        #[serde(default = "default_org")]
        organization: String,
        #[serde(default = "default_org")]
        environment: String,

        /// Basic-auth credentials; used when both are set
        #[serde(default)]
        user: Option<String>,
        #[serde(default)]
        password: Option<String>,

        /// Bearer token; used when basic auth is not configured
        #[serde(default)]
        token: Option<String>,

        /// Per-call timeout in seconds
        #[serde(default = "default_call_timeout")]
        call_timeout_secs: u64,
    },
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig::Memory
    }
}

impl GatewayConfig {
    /// Build the configured gateway backend
    pub fn build(&self) -> Result<Arc<dyn Gateway>, DaemonError> {
        match self {
            GatewayConfig::Memory => Ok(Arc::new(MemoryGateway::new())),
            GatewayConfig::Http {
                base_url,
                organization,
                environment,
                user,
                password,
                token,
                call_timeout_secs,
            } => {
                let auth = match (user, password, token) {
                    (Some(user), Some(password), _) if !user.is_empty() => GatewayAuth::Basic {
                        user: user.clone(),
                        password: password.clone(),
                    },
                    (_, _, Some(token)) if !token.is_empty() => {
                        GatewayAuth::Bearer(token.clone())
                    }
                    _ => GatewayAuth::None,
                };
                let gateway = HttpGateway::new(HttpGatewayConfig {
                    base_url: base_url.clone(),
                    organization: organization.clone(),
                    environment: environment.clone(),
                    auth,
                    timeout: Duration::from_secs(*call_timeout_secs),
                })
                .map_err(|e| DaemonError::Config(e.to_string()))?;
                Ok(Arc::new(gateway))
            }
        }
    }
}

/// One resolvable service address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEntry {
    #[serde(default = "default_protocol")]
    pub protocol: String,
    pub host: String,
    pub port: u16,
}

/// Target service resolution table, keyed `namespace/name` (or bare name)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolverConfig {
    #[serde(default)]
    pub services: HashMap<String, ServiceEntry>,
}

impl ResolverConfig {
    pub fn build(&self) -> StaticResolver {
        let entries = self
            .services
            .iter()
            .map(|(key, entry)| {
                (
                    key.clone(),
                    ServiceTarget {
                        protocol: entry.protocol.clone(),
                        host: entry.host.clone(),
                        port: entry.port,
                    },
                )
            })
            .collect();
        StaticResolver::new(entries)
    }
}

/// Controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Periodic drift check interval in seconds
    #[serde(default = "default_resync_interval")]
    pub resync_interval_secs: u64,

    /// Delay before retrying a failed pass, in seconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    /// Maximum concurrent reconcile passes across all resources
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_reconciles: usize,

    /// Delay between context-path search attempts after an API create
    #[serde(default = "default_propagation_delay")]
    pub propagation_delay_secs: u64,

    /// Number of search attempts before giving up on the pass
    #[serde(default = "default_propagation_attempts")]
    pub propagation_attempts: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            resync_interval_secs: 300,
            retry_delay_secs: 15,
            max_concurrent_reconciles: 8,
            propagation_delay_secs: 2,
            propagation_attempts: 3,
        }
    }
}

impl ControllerConfig {
    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn propagation(&self) -> PropagationSettings {
        PropagationSettings {
            delay: Duration::from_secs(self.propagation_delay_secs),
            attempts: self.propagation_attempts,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_org() -> String {
    "DEFAULT".to_string()
}

fn default_call_timeout() -> u64 {
    10
}

fn default_protocol() -> String {
    "http".to_string()
}

fn default_resync_interval() -> u64 {
    300
}

fn default_retry_delay() -> u64 {
    15
}

fn default_max_concurrent() -> usize {
    8
}

fn default_propagation_delay() -> u64 {
    2
}

fn default_propagation_attempts() -> u32 {
    3
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration from file and environment
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // Add environment variables with GANTRY_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("GANTRY")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.server.listen_addr.port(), 8084);
        assert!(matches!(config.gateway, GatewayConfig::Memory));
        assert!(config.resolver.services.is_empty());
    }

    #[test]
    fn test_controller_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.resync_interval_secs, 300);
        assert_eq!(config.propagation_attempts, 3);
        assert_eq!(config.propagation().delay, Duration::from_secs(2));
    }

    #[test]
    fn test_memory_gateway_builds() {
        assert!(GatewayConfig::Memory.build().is_ok());
    }

    #[test]
    fn test_http_gateway_auth_selection() {
        let config = GatewayConfig::Http {
            base_url: "http://gw.local/management".into(),
            organization: "DEFAULT".into(),
            environment: "DEFAULT".into(),
            user: Some("admin".into()),
            password: Some("secret".into()),
            token: Some("ignored-when-basic-set".into()),
            call_timeout_secs: 10,
        };
        assert!(config.build().is_ok());
    }

    #[tokio::test]
    async fn test_resolver_table_resolves() {
        use gantry_core::TargetResolver;

        let mut services = HashMap::new();
        services.insert(
            "prod/orders".to_string(),
            ServiceEntry {
                protocol: "http".into(),
                host: "orders.prod".into(),
                port: 8080,
            },
        );
        let resolver = ResolverConfig { services }.build();

        let target = resolver
            .resolve(&gantry_types::ServiceRef {
                name: "orders".into(),
                namespace: Some("prod".into()),
            })
            .await
            .unwrap();
        assert_eq!(target.host, "orders.prod");
        assert_eq!(target.port, 8080);
    }
}
