//! Gantry Types - core resource model for gateway convergence
//!
//! Gantry keeps two kinds of declaratively-described resources converged
//! against an API gateway control plane: client applications and API
//! endpoints. This crate holds the caller-facing model shared by the
//! convergence engine and the daemon:
//!
//! - **Specs**: the user-declared target configuration of a resource
//! - **Meta**: identity, generation counter and deletion markers
//! - **ObservedStatus**: what is known about the remote counterpart
//! - **StatusPatch**: the explicit delta a completed convergence step
//!   writes back (steps never mutate shared resource structs directly)
//! - **Events**: the unified observability stream emitted by the
//!   reconciliation loop

#![deny(unsafe_code)]

pub mod events;
pub mod ids;
pub mod resource;

// Re-export main types
pub use events::{EventSeverity, EventSource, GantryEvent, GantryEventEnvelope, SubresourceKind};
pub use ids::ResourceName;
pub use resource::{
    AppResource, AppSpec, CorsConfig, EndpointResource, EndpointSpec, ObservedStatus, PlanSecurity,
    PlanSpec, ResourceKind, ResourceMeta, ResourcePhase, ServiceRef, StatusPatch,
    SubscriptionSpec, Visibility,
};
