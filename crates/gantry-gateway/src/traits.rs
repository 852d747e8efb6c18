//! The gateway adapter contract
//!
//! One trait per the full management surface Gantry consumes. All calls
//! are scoped by the backend's configured organization and environment and
//! bounded by its per-call timeout; none of them retry internally.

use crate::entities::*;
use crate::error::GatewayResult;
use async_trait::async_trait;
use std::time::Duration;

/// Remote gateway management operations
#[async_trait]
pub trait Gateway: Send + Sync {
    // ---- applications ----

    async fn create_application(&self, app: &NewApplication) -> GatewayResult<RemoteApplication>;

    async fn update_application(
        &self,
        id: &str,
        app: &ApplicationUpdate,
    ) -> GatewayResult<RemoteApplication>;

    /// Fails with `NotFound` when the ID is unknown
    async fn get_application(&self, id: &str) -> GatewayResult<RemoteApplication>;

    async fn delete_application(&self, id: &str) -> GatewayResult<()>;

    // ---- subscriptions ----

    async fn list_subscriptions(
        &self,
        application_id: &str,
    ) -> GatewayResult<Vec<RemoteSubscription>>;

    async fn create_subscription(
        &self,
        application_id: &str,
        plan_id: &str,
    ) -> GatewayResult<RemoteSubscription>;

    async fn close_subscription(
        &self,
        application_id: &str,
        subscription_id: &str,
    ) -> GatewayResult<()>;

    async fn delete_subscription(
        &self,
        application_id: &str,
        subscription_id: &str,
    ) -> GatewayResult<()>;

    // ---- apis ----

    /// The returned ID may not be addressable through other read paths
    /// right away; callers discover the entity via [`Gateway::search_api`]
    async fn create_api(&self, api: &NewApi) -> GatewayResult<RemoteRef>;

    async fn update_api(&self, id: &str, api: &ApiUpdate) -> GatewayResult<RemoteApi>;

    /// Fails with `NotFound` when the ID is unknown
    async fn get_api(&self, id: &str) -> GatewayResult<RemoteApi>;

    /// Zero-or-one lookup by context path; more than one match is an
    /// `Ambiguous` error
    async fn search_api(&self, context_path: &str) -> GatewayResult<Option<RemoteApi>>;

    async fn delete_api(&self, id: &str) -> GatewayResult<()>;

    /// Push the current API configuration to the gateways
    async fn deploy_api(&self, id: &str) -> GatewayResult<()>;

    /// Start or stop an API; "already started/stopped" surfaces as an
    /// error the caller is expected to tolerate
    async fn lifecycle_api(&self, id: &str, action: LifecycleAction) -> GatewayResult<()>;

    // ---- plans ----

    async fn list_plans(&self, api_id: &str) -> GatewayResult<Vec<RemotePlan>>;

    async fn get_plan(&self, api_id: &str, plan_id: &str) -> GatewayResult<RemotePlan>;

    async fn create_plan(&self, api_id: &str, plan: &NewPlan) -> GatewayResult<RemotePlan>;

    async fn update_plan(
        &self,
        api_id: &str,
        plan_id: &str,
        plan: &PlanUpdate,
    ) -> GatewayResult<RemotePlan>;

    async fn close_plan(&self, api_id: &str, plan_id: &str) -> GatewayResult<()>;

    async fn delete_plan(&self, api_id: &str, plan_id: &str) -> GatewayResult<()>;

    // ---- analytics ----

    /// Response-time stats for an API over the given window
    async fn api_metrics(&self, api_id: &str, window: Duration) -> GatewayResult<ApiMetrics>;
}
