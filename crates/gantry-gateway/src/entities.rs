//! Remote entity models and call payloads
//!
//! Remote entities carry the gateway-assigned ID and the last-modified
//! timestamp (epoch millis). Matching against desired state always goes
//! through business keys (names, context paths); the IDs here are only
//! used to address subsequent calls.

use gantry_types::CorsConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Minimal handle returned by create/update calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRef {
    pub id: String,
    /// Last-modified timestamp, epoch millis
    pub updated_at: i64,
}

/// A client application as stored on the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteApplication {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub app_type: String,
    #[serde(default)]
    pub client_id: String,
    pub updated_at: i64,
}

/// Gateway-side lifecycle state of an API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiState {
    Initialized,
    Stopped,
    Started,
    Closed,
}

/// An API as stored on the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteApi {
    pub id: String,
    pub name: String,
    pub context_path: String,
    #[serde(default)]
    pub version: String,
    pub state: ApiState,
    pub updated_at: i64,
}

/// An access plan as stored on the gateway, keyed by `name` for matching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemotePlan {
    pub id: String,
    pub api_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub security: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub order: i32,
    #[serde(default)]
    pub validation: String,
}

/// A subscription as stored on the gateway
///
/// The desired-side business key (context path + plan name) is recovered
/// by joining through the plan and its owning API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSubscription {
    pub id: String,
    pub application_id: String,
    pub plan_id: String,
    pub api_id: String,
}

/// Fields sent when creating an application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewApplication {
    pub name: String,
    pub description: String,
    pub app_type: String,
    pub client_id: String,
}

/// Fields sent when updating an application; resending identical fields
/// yields no semantic change on the gateway side
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationUpdate {
    pub name: String,
    pub description: String,
    pub app_type: String,
    pub client_id: String,
}

/// Fields sent when creating an API; the fuller configuration (proxy,
/// CORS, tags) is pushed by the follow-up update call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewApi {
    pub name: String,
    pub version: String,
    pub context_path: String,
    pub description: String,
    pub target: String,
}

/// Full API update: replaces the remote proxy configuration with a single
/// default endpoint group pointing at `target`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiUpdate {
    pub name: String,
    pub version: String,
    pub description: String,
    pub context_path: String,
    pub target: String,
    pub tags: Vec<String>,
    /// Always sent as "PRIVATE"; endpoints are not exposed on the portal
    pub visibility: String,
    pub cors: Option<CorsConfig>,
}

/// Fields sent when creating a plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPlan {
    pub name: String,
    pub description: String,
    pub security: String,
    /// JSON-encoded security definition, forwarded verbatim
    pub security_definition: String,
    /// HTTP methods the plan admits; empty means all
    #[serde(default)]
    pub allowed_methods: Vec<String>,
    /// Policy applied on matching requests, by gateway policy name
    #[serde(default)]
    pub policy: Option<String>,
}

/// Fields sent when updating a plan; tags, order and validation are
/// carried over from the remote plan being overwritten
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanUpdate {
    pub name: String,
    pub description: String,
    pub security_definition: String,
    pub tags: Vec<String>,
    pub order: i32,
    pub validation: String,
}

/// Lifecycle action on an API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    Start,
    Stop,
}

impl LifecycleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleAction::Start => "START",
            LifecycleAction::Stop => "STOP",
        }
    }
}

/// Response-time statistics for an API over a sampling window
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiMetrics {
    /// Stat name (min, max, avg, count, ...) to value
    pub stats: HashMap<String, f64>,
}
