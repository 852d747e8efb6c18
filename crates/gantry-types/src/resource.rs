//! Declared resources and their observed status
//!
//! A resource pairs a caller-owned desired spec with the status the
//! convergence engine has observed on the gateway side. The spec is
//! read-only to the engine; status is written back exclusively through
//! [`StatusPatch`] values produced at successful step boundaries, so a
//! failed pass can never leave a half-written status behind.

use crate::ids::ResourceName;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The two resource kinds Gantry manages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// A client application registered on the gateway
    Application,
    /// An API endpoint exposed through the gateway
    Endpoint,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Application => write!(f, "application"),
            ResourceKind::Endpoint => write!(f, "endpoint"),
        }
    }
}

/// Identity and lifecycle markers of a declared resource
///
/// `generation` is bumped by the store on every spec edit and never by the
/// convergence engine. `deletion_requested` and `finalizer_present` drive
/// the deletion protocol: remote cleanup must complete while the finalizer
/// is still present, and only then may the object disappear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceMeta {
    pub name: ResourceName,

    /// Monotonically increasing counter, bumped on every spec change
    pub generation: i64,

    /// Set when the caller has asked for this resource to go away
    #[serde(default)]
    pub deletion_requested: bool,

    /// Deletion guard: remote cleanup has to finish before removal
    #[serde(default)]
    pub finalizer_present: bool,

    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl ResourceMeta {
    /// Fresh metadata for a newly declared resource (generation 1)
    pub fn new(name: ResourceName) -> Self {
        let now = chrono::Utc::now();
        Self {
            name,
            generation: 1,
            deletion_requested: false,
            finalizer_present: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// What is known about the remote counterpart of a resource
///
/// A resource has a remote counterpart iff `remote_id` is set; before that
/// only create is legal. `remote_updated_at` is the gateway-reported
/// last-modified timestamp in epoch milliseconds, used to detect drift
/// introduced directly on the remote side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservedStatus {
    /// Remote-assigned ID, opaque to Gantry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,

    /// Gateway last-modified timestamp (epoch millis) at last sync
    #[serde(default)]
    pub remote_updated_at: i64,

    /// The generation this resource was last fully converged at
    #[serde(default)]
    pub synced_generation: i64,
}

impl ObservedStatus {
    pub fn has_remote(&self) -> bool {
        self.remote_id.is_some()
    }
}

/// Explicit status delta produced by a completed convergence step
///
/// Steps return (or sink) patches instead of mutating the resource, which
/// keeps partial-failure behavior testable: whatever was patched before a
/// failure stays, everything after is untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusPatch {
    /// Record a newly discovered or confirmed remote ID
    pub remote_id: Option<String>,

    /// Drop the recorded remote ID (counterpart vanished remotely)
    pub clear_remote_id: bool,

    /// Freshest gateway-reported last-modified timestamp
    pub remote_updated_at: Option<i64>,

    /// Mark the given generation as fully converged
    pub synced_generation: Option<i64>,
}

impl StatusPatch {
    pub fn remote_id(id: impl Into<String>) -> Self {
        Self {
            remote_id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn remote_updated_at(ts: i64) -> Self {
        Self {
            remote_updated_at: Some(ts),
            ..Self::default()
        }
    }

    pub fn synced_generation(generation: i64) -> Self {
        Self {
            synced_generation: Some(generation),
            ..Self::default()
        }
    }

    pub fn clear_remote() -> Self {
        Self {
            clear_remote_id: true,
            ..Self::default()
        }
    }

    pub fn with_updated_at(mut self, ts: i64) -> Self {
        self.remote_updated_at = Some(ts);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply this delta onto an observed status
    pub fn apply(&self, status: &mut ObservedStatus) {
        if self.clear_remote_id {
            status.remote_id = None;
        }
        if let Some(id) = &self.remote_id {
            status.remote_id = Some(id.clone());
        }
        if let Some(ts) = self.remote_updated_at {
            status.remote_updated_at = ts;
        }
        if let Some(generation) = self.synced_generation {
            status.synced_generation = generation;
        }
    }
}

/// Where a resource currently sits in its reconciliation lifecycle
///
/// The phase is derived from meta and status, never persisted; the only
/// durable state the engine owns is [`ObservedStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourcePhase {
    /// Seen by the store, deletion guard not installed yet
    New,
    /// Guard installed, no converged generation recorded yet
    GuardInstalled,
    /// Desired state ahead of the last converged generation
    Converging,
    /// Fully converged at the current generation
    Synced,
    /// Deletion requested, remote cleanup in progress
    Cleaning,
    /// Remote cleanup done, guard released, caller may remove the object
    Finalized,
}

impl ResourcePhase {
    pub fn derive(meta: &ResourceMeta, status: &ObservedStatus) -> Self {
        if meta.deletion_requested {
            if meta.finalizer_present {
                return ResourcePhase::Cleaning;
            }
            return ResourcePhase::Finalized;
        }
        if !meta.finalizer_present {
            return ResourcePhase::New;
        }
        if status.synced_generation == 0 && !status.has_remote() {
            return ResourcePhase::GuardInstalled;
        }
        if status.synced_generation < meta.generation {
            return ResourcePhase::Converging;
        }
        ResourcePhase::Synced
    }
}

// ---------------------------------------------------------------------------
// Application resources
// ---------------------------------------------------------------------------

/// One desired subscription of an application to an endpoint plan
///
/// Subscriptions are identified by business key, not by remote ID: the
/// context path of the plan's owning API plus the plan name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionSpec {
    pub api_context_path: String,
    pub plan_name: String,
}

impl SubscriptionSpec {
    /// Business key used to match desired against remote subscriptions
    pub fn key(&self) -> String {
        format!("{}-{}", self.api_context_path, self.plan_name)
    }
}

/// Desired state of a client application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSpec {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Application type as understood by the gateway (e.g. "SIMPLE")
    #[serde(default)]
    pub app_type: String,

    /// OAuth client ID carried into the gateway application settings
    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub subscriptions: Vec<SubscriptionSpec>,
}

/// A declared client application with its observed status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppResource {
    pub meta: ResourceMeta,
    pub spec: AppSpec,
    #[serde(default)]
    pub status: ObservedStatus,
}

impl AppResource {
    pub fn new(name: ResourceName, spec: AppSpec) -> Self {
        Self {
            meta: ResourceMeta::new(name),
            spec,
            status: ObservedStatus::default(),
        }
    }

    pub fn phase(&self) -> ResourcePhase {
        ResourcePhase::derive(&self.meta, &self.status)
    }
}

// ---------------------------------------------------------------------------
// Endpoint resources
// ---------------------------------------------------------------------------

/// Reference to a network service resolved at convergence time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl fmt::Display for ServiceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Cross-origin configuration pushed to the gateway proxy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub allow_credentials: bool,
    #[serde(default)]
    pub allow_origin: Vec<String>,
    #[serde(default)]
    pub allow_origin_regex: Vec<String>,
    #[serde(default)]
    pub allow_headers: Vec<String>,
    #[serde(default)]
    pub allow_methods: Vec<String>,
    #[serde(default)]
    pub expose_headers: Vec<String>,
    #[serde(default)]
    pub max_age: i32,
    #[serde(default)]
    pub error_status_code: i32,
    #[serde(default)]
    pub run_policies: bool,
}

/// Security mode of an access plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanSecurity {
    KeyLess,
    ApiKey,
    #[serde(rename = "OAUTH2")]
    OAuth2,
    Jwt,
}

impl fmt::Display for PlanSecurity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanSecurity::KeyLess => write!(f, "KEY_LESS"),
            PlanSecurity::ApiKey => write!(f, "API_KEY"),
            PlanSecurity::OAuth2 => write!(f, "OAUTH2"),
            PlanSecurity::Jwt => write!(f, "JWT"),
        }
    }
}

/// Desired access plan on an endpoint
///
/// `name` is the business key: plan matching against the remote side never
/// uses remote-assigned IDs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSpec {
    pub name: String,

    #[serde(default)]
    pub description: String,

    pub security: PlanSecurity,

    /// Security definition forwarded verbatim (JSON-encoded on the wire)
    #[serde(default)]
    pub security_definition: std::collections::BTreeMap<String, String>,

    /// HTTP methods the plan admits; empty means all
    #[serde(default)]
    pub allowed_methods: Vec<String>,

    /// Policy applied on matching requests, by gateway policy name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
}

/// Portal visibility of an endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Visibility {
    Public,
    #[default]
    Private,
}

/// Desired state of an API endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointSpec {
    pub name: String,

    #[serde(default)]
    pub version: String,

    /// Context path the gateway serves this endpoint under
    pub context_path: String,

    #[serde(default)]
    pub description: String,

    /// Literal backend target URI, or the path suffix appended to a
    /// resolved `target_service` when one is set
    #[serde(default)]
    pub target: String,

    /// When set, wins over `target`: the backend URI is built from the
    /// resolved service address with `target` as path suffix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_service: Option<ServiceRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cors: Option<CorsConfig>,

    #[serde(default)]
    pub plans: Vec<PlanSpec>,

    /// Sharding tags forwarded to the gateway
    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub visibility: Visibility,
}

/// A declared API endpoint with its observed status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointResource {
    pub meta: ResourceMeta,
    pub spec: EndpointSpec,
    #[serde(default)]
    pub status: ObservedStatus,
}

impl EndpointResource {
    pub fn new(name: ResourceName, spec: EndpointSpec) -> Self {
        Self {
            meta: ResourceMeta::new(name),
            spec,
            status: ObservedStatus::default(),
        }
    }

    pub fn phase(&self) -> ResourcePhase {
        ResourcePhase::derive(&self.meta, &self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> ResourceMeta {
        ResourceMeta::new(ResourceName::new("test"))
    }

    #[test]
    fn test_status_patch_apply() {
        let mut status = ObservedStatus::default();

        StatusPatch::remote_id("abc").with_updated_at(42).apply(&mut status);
        assert_eq!(status.remote_id.as_deref(), Some("abc"));
        assert_eq!(status.remote_updated_at, 42);
        assert_eq!(status.synced_generation, 0);

        StatusPatch::synced_generation(3).apply(&mut status);
        assert_eq!(status.synced_generation, 3);
        assert_eq!(status.remote_id.as_deref(), Some("abc"));

        StatusPatch::clear_remote().apply(&mut status);
        assert!(status.remote_id.is_none());
    }

    #[test]
    fn test_empty_patch_is_noop() {
        let mut status = ObservedStatus {
            remote_id: Some("id".into()),
            remote_updated_at: 7,
            synced_generation: 2,
        };
        let before = status.clone();
        let patch = StatusPatch::default();
        assert!(patch.is_empty());
        patch.apply(&mut status);
        assert_eq!(status, before);
    }

    #[test]
    fn test_phase_derivation() {
        let mut m = meta();
        let mut status = ObservedStatus::default();
        assert_eq!(ResourcePhase::derive(&m, &status), ResourcePhase::New);

        m.finalizer_present = true;
        assert_eq!(ResourcePhase::derive(&m, &status), ResourcePhase::GuardInstalled);

        status.synced_generation = 1;
        assert_eq!(ResourcePhase::derive(&m, &status), ResourcePhase::Synced);

        m.generation = 2;
        assert_eq!(ResourcePhase::derive(&m, &status), ResourcePhase::Converging);

        m.deletion_requested = true;
        assert_eq!(ResourcePhase::derive(&m, &status), ResourcePhase::Cleaning);

        m.finalizer_present = false;
        assert_eq!(ResourcePhase::derive(&m, &status), ResourcePhase::Finalized);
    }

    #[test]
    fn test_subscription_key_joins_context_path_and_plan() {
        let sub = SubscriptionSpec {
            api_context_path: "/orders".into(),
            plan_name: "gold".into(),
        };
        assert_eq!(sub.key(), "/orders-gold");
    }

    #[test]
    fn test_plan_security_wire_format() {
        assert_eq!(
            serde_json::to_string(&PlanSecurity::KeyLess).unwrap(),
            "\"KEY_LESS\""
        );
        assert_eq!(
            serde_json::to_string(&PlanSecurity::OAuth2).unwrap(),
            "\"OAUTH2\""
        );
    }
}
