//! Reconciliation loop
//!
//! Drives one resource through its lifecycle per pass:
//!
//! ```text
//! New -> GuardInstalled -> { Converging <-> Synced } -> Cleaning -> Finalized
//! ```
//!
//! A pass installs the deletion guard on first sight, asks the staleness
//! detector whether convergence work is needed, runs the per-kind
//! convergence when it is, and records the converged generation on
//! success. A requested deletion takes precedence at any point: cleanup
//! runs while the guard is held, and only a fully cleaned resource
//! releases the guard and disappears. Failures leave the recorded status
//! exactly where the last successful step put it and the pass is retried.

mod dispatch;

pub use dispatch::Dispatcher;

use crate::config::ControllerConfig;
use crate::error::{DaemonError, DaemonResult};
use crate::events::EventBus;
use crate::store::{ApplicationStore, EndpointStore, Store};
use async_trait::async_trait;
use gantry_core::{
    AppSync, Cleanup, EndpointSync, RemoteState, StatusSink, SyncCheck, SyncError, SyncResult,
    TargetResolver,
};
use gantry_gateway::Gateway;
use gantry_types::{
    AppResource, EndpointResource, EventSource, GantryEvent, ResourceKind, ResourceName,
    StatusPatch, SubresourceKind,
};
use std::sync::Arc;
use std::time::Duration;

/// Reconciles declared resources against the gateway
pub struct Controller {
    store: Arc<dyn Store>,
    gateway: Arc<dyn Gateway>,
    resolver: Arc<dyn TargetResolver>,
    events: Arc<EventBus>,
    config: ControllerConfig,
}

impl Controller {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn Gateway>,
        resolver: Arc<dyn TargetResolver>,
        events: Arc<EventBus>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            resolver,
            events,
            config,
        }
    }

    /// Run one pass for an application; returns when to check again, or
    /// `None` once the resource is gone
    pub async fn reconcile_application(
        &self,
        name: &ResourceName,
    ) -> DaemonResult<Option<Duration>> {
        let Some(mut resource) = self.store.get_application(name).await? else {
            return Ok(None);
        };

        if resource.meta.deletion_requested {
            return self.finalize_application(name, &resource).await;
        }

        if !resource.meta.finalizer_present {
            self.store.set_application_finalizer(name, true).await?;
            resource.meta.finalizer_present = true;
            self.emit(GantryEvent::GuardInstalled {
                kind: ResourceKind::Application,
                name: name.clone(),
            })
            .await;
        }

        let remote = self.observe_application(&resource).await?;
        match SyncCheck::evaluate(&resource.meta, &resource.status, remote) {
            SyncCheck::UpToDate => {
                tracing::debug!(name = %name, "application up to date");
                return Ok(Some(self.config.resync_interval()));
            }
            SyncCheck::RemoteDrift => {
                tracing::info!(name = %name, "remote application drifted");
                self.emit(GantryEvent::DriftDetected {
                    kind: ResourceKind::Application,
                    name: name.clone(),
                })
                .await;
            }
            SyncCheck::RemoteMissing => {
                tracing::warn!(name = %name, "remote application vanished, re-creating");
                let patch = StatusPatch::clear_remote();
                self.store
                    .patch_application_status(name, patch.clone())
                    .await?;
                patch.apply(&mut resource.status);
                self.emit(GantryEvent::RemoteMissing {
                    kind: ResourceKind::Application,
                    name: name.clone(),
                })
                .await;
            }
            SyncCheck::SpecChanged => {}
        }

        let sink = AppStatusSink {
            store: self.store.clone(),
            name: name.clone(),
        };
        match AppSync::new(self.gateway.as_ref())
            .converge(&resource, &sink)
            .await
        {
            Ok(outcome) => {
                self.store
                    .patch_application_status(
                        name,
                        StatusPatch::synced_generation(resource.meta.generation),
                    )
                    .await?;
                if !outcome.is_noop() {
                    self.emit_subresources(SubresourceKind::Subscription, name, outcome)
                        .await;
                }
                self.emit(GantryEvent::ResourceSynced {
                    kind: ResourceKind::Application,
                    name: name.clone(),
                    generation: resource.meta.generation,
                })
                .await;
                tracing::info!(
                    name = %name,
                    generation = resource.meta.generation,
                    "application synced"
                );
                Ok(Some(self.config.resync_interval()))
            }
            Err(e) => {
                // a NotFound mid-pass may mean our own counterpart was
                // deleted out-of-band; confirm and reset so the next pass
                // re-creates instead of failing forever
                if e.is_not_found() && self.application_vanished(&resource).await {
                    self.store
                        .patch_application_status(name, StatusPatch::clear_remote())
                        .await?;
                    self.emit(GantryEvent::RemoteMissing {
                        kind: ResourceKind::Application,
                        name: name.clone(),
                    })
                    .await;
                }
                self.emit(GantryEvent::ResourceSyncFailed {
                    kind: ResourceKind::Application,
                    name: name.clone(),
                    reason: e.to_string(),
                })
                .await;
                tracing::warn!(name = %name, error = %e, "application sync failed");
                Err(e.into())
            }
        }
    }

    /// Run one pass for an endpoint
    pub async fn reconcile_endpoint(&self, name: &ResourceName) -> DaemonResult<Option<Duration>> {
        let Some(mut resource) = self.store.get_endpoint(name).await? else {
            return Ok(None);
        };

        if resource.meta.deletion_requested {
            return self.finalize_endpoint(name, &resource).await;
        }

        if !resource.meta.finalizer_present {
            self.store.set_endpoint_finalizer(name, true).await?;
            resource.meta.finalizer_present = true;
            self.emit(GantryEvent::GuardInstalled {
                kind: ResourceKind::Endpoint,
                name: name.clone(),
            })
            .await;
        }

        let remote = self.observe_endpoint(&resource).await?;
        match SyncCheck::evaluate(&resource.meta, &resource.status, remote) {
            SyncCheck::UpToDate => {
                tracing::debug!(name = %name, "endpoint up to date");
                return Ok(Some(self.config.resync_interval()));
            }
            SyncCheck::RemoteDrift => {
                tracing::info!(name = %name, "remote API drifted");
                self.emit(GantryEvent::DriftDetected {
                    kind: ResourceKind::Endpoint,
                    name: name.clone(),
                })
                .await;
            }
            SyncCheck::RemoteMissing => {
                tracing::warn!(name = %name, "remote API vanished, re-creating");
                let patch = StatusPatch::clear_remote();
                self.store.patch_endpoint_status(name, patch.clone()).await?;
                patch.apply(&mut resource.status);
                self.emit(GantryEvent::RemoteMissing {
                    kind: ResourceKind::Endpoint,
                    name: name.clone(),
                })
                .await;
            }
            SyncCheck::SpecChanged => {}
        }

        let sink = EndpointStatusSink {
            store: self.store.clone(),
            name: name.clone(),
        };
        let sync = EndpointSync::new(
            self.gateway.as_ref(),
            self.resolver.as_ref(),
            self.config.propagation(),
        );
        match sync.converge(&resource, &sink).await {
            Ok(outcome) => {
                self.store
                    .patch_endpoint_status(
                        name,
                        StatusPatch::synced_generation(resource.meta.generation),
                    )
                    .await?;
                if !outcome.plans.is_noop() {
                    self.emit_subresources(SubresourceKind::Plan, name, outcome.plans)
                        .await;
                }
                self.emit(GantryEvent::EndpointDeployed {
                    name: name.clone(),
                    api_id: outcome.api_id.clone(),
                })
                .await;
                self.emit(GantryEvent::ResourceSynced {
                    kind: ResourceKind::Endpoint,
                    name: name.clone(),
                    generation: resource.meta.generation,
                })
                .await;
                tracing::info!(
                    name = %name,
                    api_id = %outcome.api_id,
                    generation = resource.meta.generation,
                    "endpoint synced"
                );
                Ok(Some(self.config.resync_interval()))
            }
            Err(e) => {
                if e.is_not_found() && self.endpoint_vanished(&resource).await {
                    self.store
                        .patch_endpoint_status(name, StatusPatch::clear_remote())
                        .await?;
                    self.emit(GantryEvent::RemoteMissing {
                        kind: ResourceKind::Endpoint,
                        name: name.clone(),
                    })
                    .await;
                }
                self.emit(GantryEvent::ResourceSyncFailed {
                    kind: ResourceKind::Endpoint,
                    name: name.clone(),
                    reason: e.to_string(),
                })
                .await;
                tracing::warn!(name = %name, error = %e, "endpoint sync failed");
                Err(e.into())
            }
        }
    }

    /// Consult the gateway only when generation counters cannot decide
    async fn observe_application(&self, resource: &AppResource) -> DaemonResult<RemoteState> {
        if resource.status.synced_generation < resource.meta.generation {
            return Ok(RemoteState::NotFetched);
        }
        let Some(id) = &resource.status.remote_id else {
            return Ok(RemoteState::NotFetched);
        };
        match self.gateway.get_application(id).await {
            Ok(app) => Ok(RemoteState::Present {
                updated_at: app.updated_at,
            }),
            Err(e) if e.is_not_found() => Ok(RemoteState::Missing),
            Err(e) => Err(DaemonError::Sync(SyncError::from(e))),
        }
    }

    async fn observe_endpoint(&self, resource: &EndpointResource) -> DaemonResult<RemoteState> {
        if resource.status.synced_generation < resource.meta.generation {
            return Ok(RemoteState::NotFetched);
        }
        let Some(id) = &resource.status.remote_id else {
            return Ok(RemoteState::NotFetched);
        };
        match self.gateway.get_api(id).await {
            Ok(api) => Ok(RemoteState::Present {
                updated_at: api.updated_at,
            }),
            Err(e) if e.is_not_found() => Ok(RemoteState::Missing),
            Err(e) => Err(DaemonError::Sync(SyncError::from(e))),
        }
    }

    /// Confirm that the recorded application counterpart is really gone
    async fn application_vanished(&self, resource: &AppResource) -> bool {
        match &resource.status.remote_id {
            Some(id) => matches!(
                self.gateway.get_application(id).await,
                Err(e) if e.is_not_found()
            ),
            None => false,
        }
    }

    /// Confirm that the recorded API counterpart is really gone
    async fn endpoint_vanished(&self, resource: &EndpointResource) -> bool {
        match &resource.status.remote_id {
            Some(id) => matches!(
                self.gateway.get_api(id).await,
                Err(e) if e.is_not_found()
            ),
            None => false,
        }
    }

    async fn finalize_application(
        &self,
        name: &ResourceName,
        resource: &AppResource,
    ) -> DaemonResult<Option<Duration>> {
        if !resource.meta.finalizer_present {
            // guard never installed: nothing remote can exist
            self.store.remove_application(name).await?;
            return Ok(None);
        }

        self.emit(GantryEvent::CleanupStarted {
            kind: ResourceKind::Application,
            name: name.clone(),
        })
        .await;

        match Cleanup::new(self.gateway.as_ref())
            .application(&resource.status)
            .await
        {
            Ok(()) => {
                self.store.set_application_finalizer(name, false).await?;
                self.store.remove_application(name).await?;
                self.emit(GantryEvent::CleanupCompleted {
                    kind: ResourceKind::Application,
                    name: name.clone(),
                })
                .await;
                tracing::info!(name = %name, "application finalized");
                Ok(None)
            }
            Err(e) => {
                self.emit(GantryEvent::CleanupFailed {
                    kind: ResourceKind::Application,
                    name: name.clone(),
                    reason: e.to_string(),
                })
                .await;
                tracing::warn!(name = %name, error = %e, "application cleanup failed");
                Err(e.into())
            }
        }
    }

    async fn finalize_endpoint(
        &self,
        name: &ResourceName,
        resource: &EndpointResource,
    ) -> DaemonResult<Option<Duration>> {
        if !resource.meta.finalizer_present {
            self.store.remove_endpoint(name).await?;
            return Ok(None);
        }

        self.emit(GantryEvent::CleanupStarted {
            kind: ResourceKind::Endpoint,
            name: name.clone(),
        })
        .await;

        match Cleanup::new(self.gateway.as_ref())
            .endpoint(&resource.status)
            .await
        {
            Ok(()) => {
                self.store.set_endpoint_finalizer(name, false).await?;
                self.store.remove_endpoint(name).await?;
                self.emit(GantryEvent::CleanupCompleted {
                    kind: ResourceKind::Endpoint,
                    name: name.clone(),
                })
                .await;
                tracing::info!(name = %name, "endpoint finalized");
                Ok(None)
            }
            Err(e) => {
                self.emit(GantryEvent::CleanupFailed {
                    kind: ResourceKind::Endpoint,
                    name: name.clone(),
                    reason: e.to_string(),
                })
                .await;
                tracing::warn!(name = %name, error = %e, "endpoint cleanup failed");
                Err(e.into())
            }
        }
    }

    async fn emit(&self, event: GantryEvent) {
        self.events.emit(event, EventSource::Controller).await;
    }

    async fn emit_subresources(
        &self,
        kind: SubresourceKind,
        parent: &ResourceName,
        outcome: gantry_core::SyncOutcome,
    ) {
        self.events
            .emit(
                GantryEvent::SubresourcesApplied {
                    kind,
                    parent: parent.clone(),
                    created: outcome.created,
                    updated: outcome.updated,
                    retired: outcome.retired,
                },
                EventSource::SetSync,
            )
            .await;
    }
}

/// Writes application status patches through the store
struct AppStatusSink {
    store: Arc<dyn Store>,
    name: ResourceName,
}

#[async_trait]
impl StatusSink for AppStatusSink {
    async fn apply(&self, patch: StatusPatch) -> SyncResult<()> {
        self.store
            .patch_application_status(&self.name, patch)
            .await
            .map_err(|e| SyncError::StatusWrite(e.to_string()))
    }
}

/// Writes endpoint status patches through the store
struct EndpointStatusSink {
    store: Arc<dyn Store>,
    name: ResourceName,
}

#[async_trait]
impl StatusSink for EndpointStatusSink {
    async fn apply(&self, patch: StatusPatch) -> SyncResult<()> {
        self.store
            .patch_endpoint_status(&self.name, patch)
            .await
            .map_err(|e| SyncError::StatusWrite(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ApplicationStore, EndpointStore, MemoryStore};
    use gantry_core::StaticResolver;
    use gantry_gateway::MemoryGateway;
    use gantry_types::{
        AppSpec, EndpointSpec, PlanSecurity, PlanSpec, ResourcePhase, SubscriptionSpec,
    };

    struct Fixture {
        store: Arc<MemoryStore>,
        gateway: Arc<MemoryGateway>,
        controller: Controller,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(MemoryGateway::new());
        let resolver: Arc<dyn TargetResolver> = Arc::new(StaticResolver::default());
        let events = Arc::new(EventBus::new(64));
        let config = ControllerConfig {
            propagation_delay_secs: 0,
            propagation_attempts: 1,
            ..ControllerConfig::default()
        };
        let controller = Controller::new(
            store.clone(),
            gateway.clone(),
            resolver,
            events,
            config,
        );
        Fixture {
            store,
            gateway,
            controller,
        }
    }

    fn endpoint_spec(description: &str) -> EndpointSpec {
        EndpointSpec {
            name: "orders-api".into(),
            version: "1.0".into(),
            context_path: "/orders".into(),
            description: description.into(),
            target: "http://orders.internal:8080".into(),
            target_service: None,
            cors: None,
            plans: vec![PlanSpec {
                name: "gold".into(),
                description: String::new(),
                security: PlanSecurity::ApiKey,
                security_definition: Default::default(),
                allowed_methods: vec![],
                policy: None,
            }],
            tags: vec![],
            visibility: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_endpoint_lifecycle_to_synced() {
        let f = fixture();
        let name = ResourceName::new("orders");
        f.store
            .upsert_endpoint(&name, endpoint_spec("v1"))
            .await
            .unwrap();

        let requeue = f.controller.reconcile_endpoint(&name).await.unwrap();
        assert!(requeue.is_some());

        let resource = f.store.get_endpoint(&name).await.unwrap().unwrap();
        assert_eq!(resource.phase(), ResourcePhase::Synced);
        assert!(resource.meta.finalizer_present);
        assert_eq!(resource.status.synced_generation, 1);
        assert!(resource.status.has_remote());

        let api_id = resource.status.remote_id.unwrap();
        assert_eq!(f.gateway.list_plans(&api_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_steady_state_pass_makes_no_mutating_calls() {
        let f = fixture();
        let name = ResourceName::new("orders");
        f.store
            .upsert_endpoint(&name, endpoint_spec("v1"))
            .await
            .unwrap();
        f.controller.reconcile_endpoint(&name).await.unwrap();

        f.gateway.clear_call_log();
        f.controller.reconcile_endpoint(&name).await.unwrap();

        // exactly one read to compare timestamps, nothing else
        assert_eq!(f.gateway.call_log().len(), 1);
        assert!(f.gateway.call_log()[0].starts_with("get_api"));
    }

    #[tokio::test]
    async fn test_spec_edit_reconverges() {
        let f = fixture();
        let name = ResourceName::new("orders");
        f.store
            .upsert_endpoint(&name, endpoint_spec("v1"))
            .await
            .unwrap();
        f.controller.reconcile_endpoint(&name).await.unwrap();

        f.store
            .upsert_endpoint(&name, endpoint_spec("v2"))
            .await
            .unwrap();
        let converging = f.store.get_endpoint(&name).await.unwrap().unwrap();
        assert_eq!(converging.phase(), ResourcePhase::Converging);

        f.controller.reconcile_endpoint(&name).await.unwrap();
        let resource = f.store.get_endpoint(&name).await.unwrap().unwrap();
        assert_eq!(resource.status.synced_generation, 2);
        assert_eq!(resource.phase(), ResourcePhase::Synced);
    }

    #[tokio::test]
    async fn test_remote_drift_triggers_update() {
        let f = fixture();
        let name = ResourceName::new("orders");
        f.store
            .upsert_endpoint(&name, endpoint_spec("v1"))
            .await
            .unwrap();
        f.controller.reconcile_endpoint(&name).await.unwrap();

        let api_id = f
            .store
            .get_endpoint(&name)
            .await
            .unwrap()
            .unwrap()
            .status
            .remote_id
            .unwrap();
        f.gateway.touch_api(&api_id).await;

        f.gateway.clear_call_log();
        f.controller.reconcile_endpoint(&name).await.unwrap();
        assert!(f
            .gateway
            .call_log()
            .iter()
            .any(|c| c.starts_with("update_api")));
    }

    #[tokio::test]
    async fn test_vanished_remote_is_recreated() {
        let f = fixture();
        let name = ResourceName::new("orders");
        f.store
            .upsert_endpoint(&name, endpoint_spec("v1"))
            .await
            .unwrap();
        f.controller.reconcile_endpoint(&name).await.unwrap();

        let old_id = f
            .store
            .get_endpoint(&name)
            .await
            .unwrap()
            .unwrap()
            .status
            .remote_id
            .unwrap();
        // delete behind the controller's back
        f.gateway.delete_api(&old_id).await.unwrap();

        f.controller.reconcile_endpoint(&name).await.unwrap();
        let resource = f.store.get_endpoint(&name).await.unwrap().unwrap();
        let new_id = resource.status.remote_id.unwrap();
        assert_ne!(new_id, old_id);
        assert!(f.gateway.get_api(&new_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_pass_keeps_generation_stale() {
        let f = fixture();
        let name = ResourceName::new("orders");
        f.store
            .upsert_endpoint(&name, endpoint_spec("v1"))
            .await
            .unwrap();

        f.gateway.fail_on("deploy_api", "");
        assert!(f.controller.reconcile_endpoint(&name).await.is_err());

        let resource = f.store.get_endpoint(&name).await.unwrap().unwrap();
        // remote ID was recorded by the completed ensure step, but the
        // generation stays unsynced so the next pass retries
        assert!(resource.status.has_remote());
        assert_eq!(resource.status.synced_generation, 0);
        assert_eq!(resource.phase(), ResourcePhase::Converging);

        f.gateway.clear_failures();
        f.gateway.clear_call_log();
        f.controller.reconcile_endpoint(&name).await.unwrap();
        assert!(f
            .gateway
            .call_log()
            .iter()
            .all(|c| !c.starts_with("create_api")));
    }

    #[tokio::test]
    async fn test_deletion_cleans_remote_and_removes_resource() {
        let f = fixture();
        let name = ResourceName::new("orders");
        f.store
            .upsert_endpoint(&name, endpoint_spec("v1"))
            .await
            .unwrap();
        f.controller.reconcile_endpoint(&name).await.unwrap();
        let api_id = f
            .store
            .get_endpoint(&name)
            .await
            .unwrap()
            .unwrap()
            .status
            .remote_id
            .unwrap();

        f.store.request_endpoint_deletion(&name).await.unwrap();
        let requeue = f.controller.reconcile_endpoint(&name).await.unwrap();
        assert!(requeue.is_none());

        assert!(f.store.get_endpoint(&name).await.unwrap().is_none());
        assert!(f.gateway.get_api(&api_id).await.is_err());
    }

    #[tokio::test]
    async fn test_failed_cleanup_keeps_resource_cleaning() {
        let f = fixture();
        let name = ResourceName::new("orders");
        f.store
            .upsert_endpoint(&name, endpoint_spec("v1"))
            .await
            .unwrap();
        f.controller.reconcile_endpoint(&name).await.unwrap();
        f.store.request_endpoint_deletion(&name).await.unwrap();

        f.gateway.fail_on("delete_api", "");
        assert!(f.controller.reconcile_endpoint(&name).await.is_err());

        let resource = f.store.get_endpoint(&name).await.unwrap().unwrap();
        assert_eq!(resource.phase(), ResourcePhase::Cleaning);

        f.gateway.clear_failures();
        f.controller.reconcile_endpoint(&name).await.unwrap();
        assert!(f.store.get_endpoint(&name).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_application_with_subscription_syncs() {
        let f = fixture();

        // the endpoint the application subscribes to
        let endpoint_name = ResourceName::new("orders");
        f.store
            .upsert_endpoint(&endpoint_name, endpoint_spec("v1"))
            .await
            .unwrap();
        f.controller.reconcile_endpoint(&endpoint_name).await.unwrap();

        let app_name = ResourceName::new("mobile");
        f.store
            .upsert_application(
                &app_name,
                AppSpec {
                    name: "mobile-app".into(),
                    description: String::new(),
                    app_type: "SIMPLE".into(),
                    client_id: "mobile".into(),
                    subscriptions: vec![SubscriptionSpec {
                        api_context_path: "/orders".into(),
                        plan_name: "gold".into(),
                    }],
                },
            )
            .await
            .unwrap();

        f.controller.reconcile_application(&app_name).await.unwrap();

        let resource = f.store.get_application(&app_name).await.unwrap().unwrap();
        assert_eq!(resource.phase(), ResourcePhase::Synced);
        let app_id = resource.status.remote_id.unwrap();
        assert_eq!(f.gateway.list_subscriptions(&app_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_resource_is_ignored() {
        let f = fixture();
        let requeue = f
            .controller
            .reconcile_application(&ResourceName::new("ghost"))
            .await
            .unwrap();
        assert!(requeue.is_none());
        assert!(f.gateway.call_log().is_empty());
    }
}
