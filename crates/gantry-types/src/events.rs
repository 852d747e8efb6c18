//! Event types for Gantry observability
//!
//! Events provide a unified stream of reconciliation activity. Every pass
//! outcome, sub-resource change and deletion step is reported here; no
//! failure is ever dropped without at least one event.

use crate::ids::ResourceName;
use crate::resource::ResourceKind;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping all Gantry events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GantryEventEnvelope {
    /// Unique event ID
    pub id: Uuid,

    /// Event timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Event source
    pub source: EventSource,

    /// Event severity
    pub severity: EventSeverity,

    /// The actual event
    pub event: GantryEvent,
}

/// Event sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSource {
    /// Reconciliation loop
    Controller,
    /// Sub-resource set synchronizer
    SetSync,
    /// Deletion protocol
    Deletion,
    /// Admin API
    Api,
}

/// Event severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// The kind of sub-resource a set-sync event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubresourceKind {
    Plan,
    Subscription,
}

impl std::fmt::Display for SubresourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubresourceKind::Plan => write!(f, "plan"),
            SubresourceKind::Subscription => write!(f, "subscription"),
        }
    }
}

/// Gantry events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GantryEvent {
    /// Deletion guard installed on first sight of a resource
    GuardInstalled {
        kind: ResourceKind,
        name: ResourceName,
    },

    /// A pass converged the resource at the given generation
    ResourceSynced {
        kind: ResourceKind,
        name: ResourceName,
        generation: i64,
    },

    /// A pass failed; desired state stays stale and will be retried
    ResourceSyncFailed {
        kind: ResourceKind,
        name: ResourceName,
        reason: String,
    },

    /// Remote last-modified moved without a local spec change
    DriftDetected {
        kind: ResourceKind,
        name: ResourceName,
    },

    /// The remote counterpart vanished; it will be re-created
    RemoteMissing {
        kind: ResourceKind,
        name: ResourceName,
    },

    /// Sub-resource set changes applied during a pass
    SubresourcesApplied {
        kind: SubresourceKind,
        parent: ResourceName,
        created: usize,
        updated: usize,
        retired: usize,
    },

    /// Endpoint deployed (and started) on the gateway
    EndpointDeployed {
        name: ResourceName,
        api_id: String,
    },

    /// Remote cleanup started for a resource under deletion
    CleanupStarted {
        kind: ResourceKind,
        name: ResourceName,
    },

    /// Remote cleanup finished; the deletion guard was released
    CleanupCompleted {
        kind: ResourceKind,
        name: ResourceName,
    },

    /// Remote cleanup failed and will be retried
    CleanupFailed {
        kind: ResourceKind,
        name: ResourceName,
        reason: String,
    },
}

impl GantryEventEnvelope {
    /// Create a new event envelope
    pub fn new(event: GantryEvent, source: EventSource) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            source,
            severity: Self::infer_severity(&event),
            event,
        }
    }

    /// Infer severity from event type
    fn infer_severity(event: &GantryEvent) -> EventSeverity {
        match event {
            GantryEvent::ResourceSyncFailed { .. } | GantryEvent::CleanupFailed { .. } => {
                EventSeverity::Error
            }
            GantryEvent::DriftDetected { .. } | GantryEvent::RemoteMissing { .. } => {
                EventSeverity::Warning
            }
            _ => EventSeverity::Info,
        }
    }
}
