//! Client application convergence
//!
//! Ensures the remote application exists and carries the declared fields,
//! then synchronizes its subscriptions. Subscription sync runs on every
//! pass, even when no application field changed: desired subscriptions can
//! change independently of the parent fields.

use crate::error::{SyncError, SyncResult};
use crate::status::StatusSink;
use crate::sync_set::{synchronize, SubresourceAdapter, SyncOutcome};
use async_trait::async_trait;
use gantry_gateway::{
    ApplicationUpdate, Gateway, NewApplication, RemoteApplication, RemoteSubscription,
};
use gantry_types::{AppResource, StatusPatch, SubresourceKind, SubscriptionSpec};

/// Convergence for one application resource
pub struct AppSync<'a> {
    gateway: &'a dyn Gateway,
}

impl<'a> AppSync<'a> {
    pub fn new(gateway: &'a dyn Gateway) -> Self {
        Self { gateway }
    }

    /// Run one convergence pass; returns what the subscription
    /// synchronizer changed
    pub async fn converge(
        &self,
        resource: &AppResource,
        sink: &dyn StatusSink,
    ) -> SyncResult<SyncOutcome> {
        let application = self.ensure(resource, sink).await?;

        let adapter = SubscriptionAdapter {
            gateway: self.gateway,
            application_id: &application.id,
        };
        synchronize(&adapter, &resource.spec.subscriptions).await
    }

    /// Create the remote application or overwrite its fields; both are
    /// idempotent in effect, so re-running with an unchanged spec leaves
    /// remote values as they are
    async fn ensure(
        &self,
        resource: &AppResource,
        sink: &dyn StatusSink,
    ) -> SyncResult<RemoteApplication> {
        let spec = &resource.spec;
        match &resource.status.remote_id {
            Some(id) => {
                let updated = self
                    .gateway
                    .update_application(
                        id,
                        &ApplicationUpdate {
                            name: spec.name.clone(),
                            description: spec.description.clone(),
                            app_type: spec.app_type.clone(),
                            client_id: spec.client_id.clone(),
                        },
                    )
                    .await?;
                sink.apply(StatusPatch::remote_updated_at(updated.updated_at))
                    .await?;
                Ok(updated)
            }
            None => {
                let created = self
                    .gateway
                    .create_application(&NewApplication {
                        name: spec.name.clone(),
                        description: spec.description.clone(),
                        app_type: spec.app_type.clone(),
                        client_id: spec.client_id.clone(),
                    })
                    .await?;
                sink.apply(
                    StatusPatch::remote_id(&created.id).with_updated_at(created.updated_at),
                )
                .await?;
                tracing::info!(
                    name = %resource.meta.name,
                    application_id = %created.id,
                    "created remote application"
                );
                Ok(created)
            }
        }
    }
}

/// Binds the set synchronizer to application subscriptions
///
/// The remote business key is recovered by joining each subscription
/// through its plan to the owning API's context path. Subscriptions carry
/// no mutable fields, so a matched pair needs no remote call.
struct SubscriptionAdapter<'a> {
    gateway: &'a dyn Gateway,
    application_id: &'a str,
}

#[async_trait]
impl SubresourceAdapter for SubscriptionAdapter<'_> {
    type Desired = SubscriptionSpec;
    type Remote = RemoteSubscription;

    fn kind(&self) -> SubresourceKind {
        SubresourceKind::Subscription
    }

    fn desired_key(&self, desired: &SubscriptionSpec) -> String {
        desired.key()
    }

    async fn list_remote(&self) -> SyncResult<Vec<(String, RemoteSubscription)>> {
        let subscriptions = self.gateway.list_subscriptions(self.application_id).await?;
        let mut keyed = Vec::with_capacity(subscriptions.len());
        for subscription in subscriptions {
            let api = self.gateway.get_api(&subscription.api_id).await?;
            let plan = self
                .gateway
                .get_plan(&subscription.api_id, &subscription.plan_id)
                .await?;
            keyed.push((format!("{}-{}", api.context_path, plan.name), subscription));
        }
        Ok(keyed)
    }

    async fn create(&self, desired: &SubscriptionSpec) -> SyncResult<()> {
        let api = self
            .gateway
            .search_api(&desired.api_context_path)
            .await?
            .ok_or_else(|| {
                SyncError::Validation(format!(
                    "no API at context path {}",
                    desired.api_context_path
                ))
            })?;
        let plans = self.gateway.list_plans(&api.id).await?;
        let plan = plans
            .iter()
            .find(|p| p.name == desired.plan_name)
            .ok_or_else(|| {
                SyncError::Validation(format!(
                    "API {} has no plan named {}",
                    desired.api_context_path, desired.plan_name
                ))
            })?;
        self.gateway
            .create_subscription(self.application_id, &plan.id)
            .await?;
        Ok(())
    }

    async fn update(&self, _remote: &RemoteSubscription, _desired: &SubscriptionSpec) -> SyncResult<()> {
        // subscriptions have no mutable fields; a matched pair is final
        Ok(())
    }

    async fn close(&self, remote: &RemoteSubscription) -> SyncResult<()> {
        self.gateway
            .close_subscription(self.application_id, &remote.id)
            .await?;
        Ok(())
    }

    async fn delete(&self, remote: &RemoteSubscription) -> SyncResult<()> {
        self.gateway
            .delete_subscription(self.application_id, &remote.id)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::RecordingSink;
    use gantry_gateway::{MemoryGateway, NewApi, NewPlan};
    use gantry_types::{AppSpec, ObservedStatus, ResourceName};

    fn app_resource(subscriptions: Vec<SubscriptionSpec>) -> AppResource {
        AppResource::new(
            ResourceName::new("mobile"),
            AppSpec {
                name: "mobile-app".into(),
                description: "mobile clients".into(),
                app_type: "SIMPLE".into(),
                client_id: "mobile-client".into(),
                subscriptions,
            },
        )
    }

    async fn seed_api_with_plan(gateway: &MemoryGateway, context_path: &str, plan: &str) -> String {
        let api = gateway
            .create_api(&NewApi {
                name: context_path.trim_start_matches('/').into(),
                version: "1.0".into(),
                context_path: context_path.into(),
                description: String::new(),
                target: "http://backend:8080".into(),
            })
            .await
            .unwrap();
        gateway
            .create_plan(&api.id, &NewPlan {
                name: plan.into(),
                description: String::new(),
                security: "API_KEY".into(),
                security_definition: "{}".into(),
                allowed_methods: vec![],
                policy: None,
            })
            .await
            .unwrap();
        api.id
    }

    #[tokio::test]
    async fn test_first_pass_creates_application() {
        let gateway = MemoryGateway::new();
        let sink = RecordingSink::new(ObservedStatus::default());
        let resource = app_resource(vec![]);

        AppSync::new(&gateway).converge(&resource, &sink).await.unwrap();

        let status = sink.status();
        assert!(status.has_remote());
        assert!(status.remote_updated_at > 0);

        let log = gateway.call_log();
        assert_eq!(log[0], "create_application:mobile-app");
    }

    #[tokio::test]
    async fn test_second_pass_is_noop_update() {
        let gateway = MemoryGateway::new();
        let sink = RecordingSink::new(ObservedStatus::default());
        let mut resource = app_resource(vec![]);

        AppSync::new(&gateway).converge(&resource, &sink).await.unwrap();
        resource.status = sink.status();
        let id = resource.status.remote_id.clone().unwrap();
        let before = gateway.get_application(&id).await.unwrap();

        gateway.clear_call_log();
        AppSync::new(&gateway).converge(&resource, &sink).await.unwrap();

        // the second pass updates in place; no second create, fields
        // unchanged
        let log = gateway.call_log();
        assert!(log.iter().all(|c| !c.starts_with("create_application")));
        assert!(log.iter().any(|c| c.starts_with("update_application")));

        let after = gateway.get_application(&id).await.unwrap();
        assert_eq!(after.name, before.name);
        assert_eq!(after.client_id, before.client_id);
    }

    #[tokio::test]
    async fn test_subscriptions_converge_to_desired_set() {
        let gateway = MemoryGateway::new();
        seed_api_with_plan(&gateway, "/orders", "gold").await;
        seed_api_with_plan(&gateway, "/billing", "basic").await;

        let sink = RecordingSink::new(ObservedStatus::default());
        let mut resource = app_resource(vec![SubscriptionSpec {
            api_context_path: "/orders".into(),
            plan_name: "gold".into(),
        }]);

        AppSync::new(&gateway).converge(&resource, &sink).await.unwrap();
        resource.status = sink.status();
        let app_id = resource.status.remote_id.clone().unwrap();
        assert_eq!(gateway.list_subscriptions(&app_id).await.unwrap().len(), 1);

        // swap the desired subscription: old one is closed and deleted,
        // new one created
        resource.spec.subscriptions = vec![SubscriptionSpec {
            api_context_path: "/billing".into(),
            plan_name: "basic".into(),
        }];
        gateway.clear_call_log();
        let outcome = AppSync::new(&gateway)
            .converge(&resource, &sink)
            .await
            .unwrap();

        assert_eq!(outcome.created, 1);
        assert_eq!(outcome.retired, 1);
        let log = gateway.call_log();
        let close_pos = log.iter().position(|c| c.starts_with("close_subscription"));
        let delete_pos = log.iter().position(|c| c.starts_with("delete_subscription"));
        assert!(close_pos.unwrap() < delete_pos.unwrap());

        let remaining = gateway.list_subscriptions(&app_id).await.unwrap();
        assert_eq!(remaining.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_plan_is_validation_error() {
        let gateway = MemoryGateway::new();
        seed_api_with_plan(&gateway, "/orders", "gold").await;

        let sink = RecordingSink::new(ObservedStatus::default());
        let resource = app_resource(vec![SubscriptionSpec {
            api_context_path: "/orders".into(),
            plan_name: "platinum".into(),
        }]);

        let err = AppSync::new(&gateway)
            .converge(&resource, &sink)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));

        // the application itself was still created and its ID recorded
        assert!(sink.status().has_remote());
    }
}
