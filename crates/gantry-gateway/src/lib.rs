//! Gantry Gateway - adapter for the gateway management API
//!
//! The convergence engine talks to the gateway control plane exclusively
//! through the [`Gateway`] trait defined here. Two backends ship in-tree:
//!
//! - [`HttpGateway`]: the real management API over HTTP (basic auth or
//!   bearer token), every call scoped by organization and environment and
//!   bounded by a configured timeout
//! - [`MemoryGateway`]: an in-memory twin for development and testing that
//!   journals every call, so tests can assert call counts and ordering
//!
//! The adapter performs no retries of its own: every error is surfaced to
//! the caller, which decides whether the pass is retried.

#![deny(unsafe_code)]

pub mod entities;
pub mod error;
pub mod http;
pub mod memory;
pub mod traits;

pub use entities::{
    ApiMetrics, ApiState, ApplicationUpdate, ApiUpdate, LifecycleAction, NewApi, NewApplication,
    NewPlan, PlanUpdate, RemoteApi, RemoteApplication, RemotePlan, RemoteRef, RemoteSubscription,
};
pub use error::{GatewayError, GatewayResult};
pub use http::{GatewayAuth, HttpGateway, HttpGatewayConfig};
pub use memory::MemoryGateway;
pub use traits::Gateway;
