//! Deletion protocol
//!
//! Destructive remote cleanup runs only once the caller has requested
//! deletion, and the deletion guard stays in place until every cleanup
//! call has succeeded. Dependent sub-resources are always retired before
//! the parent entity is deleted. Every step tolerates a partially-cleaned
//! remote state: "already stopped", "already closed" and "already gone"
//! are not errors, so a failed attempt can simply be re-run.

use crate::error::SyncResult;
use gantry_gateway::{Gateway, GatewayResult, LifecycleAction};
use gantry_types::ObservedStatus;

/// Remote cleanup for resources under deletion
pub struct Cleanup<'a> {
    gateway: &'a dyn Gateway,
}

impl<'a> Cleanup<'a> {
    pub fn new(gateway: &'a dyn Gateway) -> Self {
        Self { gateway }
    }

    /// Retire an endpoint: stop the API, close and delete every plan,
    /// then delete the API itself
    pub async fn endpoint(&self, status: &ObservedStatus) -> SyncResult<()> {
        let Some(api_id) = &status.remote_id else {
            // never made it to the gateway; nothing to clean
            return Ok(());
        };

        tolerate_done(self.gateway.lifecycle_api(api_id, LifecycleAction::Stop).await)?;

        let plans = match self.gateway.list_plans(api_id).await {
            Ok(plans) => plans,
            Err(e) if e.is_not_found() => {
                // the API is already gone, and its plans with it
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        for plan in &plans {
            tolerate_done(self.gateway.close_plan(api_id, &plan.id).await)?;
            tolerate_done(self.gateway.delete_plan(api_id, &plan.id).await)?;
        }

        tolerate_done(self.gateway.delete_api(api_id).await)?;

        tracing::info!(api_id = %api_id, plans = plans.len(), "endpoint cleanup finished");
        Ok(())
    }

    /// Retire an application: close and delete every subscription, then
    /// delete the application itself
    pub async fn application(&self, status: &ObservedStatus) -> SyncResult<()> {
        let Some(app_id) = &status.remote_id else {
            return Ok(());
        };

        let subscriptions = match self.gateway.list_subscriptions(app_id).await {
            Ok(subscriptions) => subscriptions,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        for subscription in &subscriptions {
            tolerate_done(self.gateway.close_subscription(app_id, &subscription.id).await)?;
            tolerate_done(self.gateway.delete_subscription(app_id, &subscription.id).await)?;
        }

        tolerate_done(self.gateway.delete_application(app_id).await)?;

        tracing::info!(
            application_id = %app_id,
            subscriptions = subscriptions.len(),
            "application cleanup finished"
        );
        Ok(())
    }
}

/// Uniform lifecycle policy: already-done outcomes are fine, everything
/// else stops the cleanup attempt (it will be retried)
fn tolerate_done(result: GatewayResult<()>) -> SyncResult<()> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.is_already_done() => Ok(()),
        Err(e) => Err(e.into()),
    }
}
