//! API endpoint convergence
//!
//! Resolves the backend target, ensures the remote API exists and carries
//! the full declared configuration, synchronizes its access plans, then
//! deploys and starts it. Step order matters: each step depends on IDs or
//! state produced by the one before, and each records its status delta
//! before the next runs, so an aborted pass resumes instead of repeating
//! remote-side work.

use crate::error::{SyncError, SyncResult};
use crate::resolve::TargetResolver;
use crate::status::StatusSink;
use crate::sync_set::{synchronize, SubresourceAdapter, SyncOutcome};
use async_trait::async_trait;
use gantry_gateway::{
    ApiUpdate, Gateway, LifecycleAction, NewApi, NewPlan, PlanUpdate, RemotePlan,
};
use gantry_types::{EndpointResource, EndpointSpec, PlanSpec, StatusPatch, SubresourceKind};
use std::time::Duration;

/// How long to wait for a freshly created API to become searchable
///
/// The gateway's create call may not make the object addressable through
/// other read paths immediately; discovery polls the context-path search
/// until it shows up.
#[derive(Debug, Clone)]
pub struct PropagationSettings {
    pub delay: Duration,
    pub attempts: u32,
}

impl Default for PropagationSettings {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(2),
            attempts: 3,
        }
    }
}

/// What an endpoint pass produced
#[derive(Debug, Clone)]
pub struct EndpointOutcome {
    pub api_id: String,
    pub plans: SyncOutcome,
}

/// Convergence for one endpoint resource
pub struct EndpointSync<'a> {
    gateway: &'a dyn Gateway,
    resolver: &'a dyn TargetResolver,
    propagation: PropagationSettings,
}

impl<'a> EndpointSync<'a> {
    pub fn new(
        gateway: &'a dyn Gateway,
        resolver: &'a dyn TargetResolver,
        propagation: PropagationSettings,
    ) -> Self {
        Self {
            gateway,
            resolver,
            propagation,
        }
    }

    /// Run one convergence pass
    pub async fn converge(
        &self,
        resource: &EndpointResource,
        sink: &dyn StatusSink,
    ) -> SyncResult<EndpointOutcome> {
        // Target resolution comes first: an unresolvable reference aborts
        // the pass before any create or update reaches the gateway
        let target = self.resolve_target(&resource.spec).await?;

        let api_id = match &resource.status.remote_id {
            Some(id) => id.clone(),
            None => self.adopt_or_create(resource, &target, sink).await?,
        };

        // Full configuration push: the remote proxy setup is replaced
        // wholesale with one default group pointing at the target
        let updated = self
            .gateway
            .update_api(&api_id, &api_update(&resource.spec, &target))
            .await?;
        sink.apply(StatusPatch::remote_updated_at(updated.updated_at))
            .await?;

        let adapter = PlanAdapter {
            gateway: self.gateway,
            api_id: &api_id,
        };
        let plans = synchronize(&adapter, &resource.spec.plans).await?;

        self.deploy(&api_id).await?;

        Ok(EndpointOutcome { api_id, plans })
    }

    /// The resolved service reference wins over the literal target
    async fn resolve_target(&self, spec: &EndpointSpec) -> SyncResult<String> {
        match &spec.target_service {
            Some(service) => {
                let resolved = self.resolver.resolve(service).await?;
                Ok(resolved.join(&spec.target))
            }
            None if !spec.target.is_empty() => Ok(spec.target.clone()),
            None => Err(SyncError::Validation(format!(
                "endpoint {} declares neither target nor target_service",
                spec.name
            ))),
        }
    }

    /// Find the API by context path, creating it first when nothing is
    /// there yet
    ///
    /// Searching before creating makes the step safe to re-run: a pass
    /// that created the API but aborted before recording its ID will
    /// adopt it here instead of colliding on the context path.
    async fn adopt_or_create(
        &self,
        resource: &EndpointResource,
        target: &str,
        sink: &dyn StatusSink,
    ) -> SyncResult<String> {
        let spec = &resource.spec;

        if let Some(existing) = self.gateway.search_api(&spec.context_path).await? {
            tracing::info!(
                name = %resource.meta.name,
                api_id = %existing.id,
                context_path = %spec.context_path,
                "adopted existing remote API"
            );
            sink.apply(
                StatusPatch::remote_id(&existing.id).with_updated_at(existing.updated_at),
            )
            .await?;
            return Ok(existing.id);
        }

        self.gateway
            .create_api(&NewApi {
                name: spec.name.clone(),
                version: spec.version.clone(),
                context_path: spec.context_path.clone(),
                description: spec.description.clone(),
                target: target.to_string(),
            })
            .await?;

        for attempt in 1..=self.propagation.attempts {
            tokio::time::sleep(self.propagation.delay).await;
            if let Some(api) = self.gateway.search_api(&spec.context_path).await? {
                sink.apply(StatusPatch::remote_id(&api.id).with_updated_at(api.updated_at))
                    .await?;
                tracing::info!(
                    name = %resource.meta.name,
                    api_id = %api.id,
                    "created remote API"
                );
                return Ok(api.id);
            }
            tracing::debug!(
                context_path = %spec.context_path,
                attempt,
                "created API not searchable yet"
            );
        }

        Err(SyncError::PropagationTimeout(spec.context_path.clone()))
    }

    /// Push the configuration to the gateways and make sure the API runs;
    /// "already started" is not an error
    async fn deploy(&self, api_id: &str) -> SyncResult<()> {
        self.gateway.deploy_api(api_id).await?;
        match self.gateway.lifecycle_api(api_id, LifecycleAction::Start).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_already_done() => {
                tracing::debug!(api_id, "API already started");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Full update payload for an endpoint; visibility is pinned private
fn api_update(spec: &EndpointSpec, target: &str) -> ApiUpdate {
    ApiUpdate {
        name: spec.name.clone(),
        version: spec.version.clone(),
        description: spec.description.clone(),
        context_path: spec.context_path.clone(),
        target: target.to_string(),
        tags: spec.tags.clone(),
        visibility: "PRIVATE".to_string(),
        cors: spec.cors.clone(),
    }
}

/// Binds the set synchronizer to endpoint plans, keyed by plan name
struct PlanAdapter<'a> {
    gateway: &'a dyn Gateway,
    api_id: &'a str,
}

impl PlanAdapter<'_> {
    fn security_definition(plan: &PlanSpec) -> SyncResult<String> {
        serde_json::to_string(&plan.security_definition)
            .map_err(|e| SyncError::Gateway(gantry_gateway::GatewayError::Payload(e)))
    }
}

#[async_trait]
impl SubresourceAdapter for PlanAdapter<'_> {
    type Desired = PlanSpec;
    type Remote = RemotePlan;

    fn kind(&self) -> SubresourceKind {
        SubresourceKind::Plan
    }

    fn desired_key(&self, desired: &PlanSpec) -> String {
        desired.name.clone()
    }

    async fn list_remote(&self) -> SyncResult<Vec<(String, RemotePlan)>> {
        let plans = self.gateway.list_plans(self.api_id).await?;
        Ok(plans.into_iter().map(|p| (p.name.clone(), p)).collect())
    }

    async fn create(&self, desired: &PlanSpec) -> SyncResult<()> {
        self.gateway
            .create_plan(
                self.api_id,
                &NewPlan {
                    name: desired.name.clone(),
                    description: desired.description.clone(),
                    security: desired.security.to_string(),
                    security_definition: Self::security_definition(desired)?,
                    allowed_methods: desired.allowed_methods.clone(),
                    policy: desired.policy.clone(),
                },
            )
            .await?;
        Ok(())
    }

    async fn update(&self, remote: &RemotePlan, desired: &PlanSpec) -> SyncResult<()> {
        // tags, order and validation are remote-managed; carry them over
        self.gateway
            .update_plan(
                self.api_id,
                &remote.id,
                &PlanUpdate {
                    name: desired.name.clone(),
                    description: desired.description.clone(),
                    security_definition: Self::security_definition(desired)?,
                    tags: remote.tags.clone(),
                    order: remote.order,
                    validation: remote.validation.clone(),
                },
            )
            .await?;
        Ok(())
    }

    async fn close(&self, remote: &RemotePlan) -> SyncResult<()> {
        self.gateway.close_plan(self.api_id, &remote.id).await?;
        Ok(())
    }

    async fn delete(&self, remote: &RemotePlan) -> SyncResult<()> {
        self.gateway.delete_plan(self.api_id, &remote.id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::{ServiceTarget, StaticResolver};
    use crate::status::RecordingSink;
    use gantry_gateway::MemoryGateway;
    use gantry_types::{ObservedStatus, PlanSecurity, ResourceName, ServiceRef};

    fn settings() -> PropagationSettings {
        PropagationSettings {
            delay: Duration::ZERO,
            attempts: 2,
        }
    }

    fn plan(name: &str) -> PlanSpec {
        PlanSpec {
            name: name.into(),
            description: format!("{name} plan"),
            security: PlanSecurity::ApiKey,
            security_definition: Default::default(),
            allowed_methods: vec![],
            policy: None,
        }
    }

    fn endpoint(plans: Vec<PlanSpec>) -> EndpointResource {
        EndpointResource::new(
            ResourceName::new("orders"),
            EndpointSpec {
                name: "orders-api".into(),
                version: "1.0".into(),
                context_path: "/orders".into(),
                description: String::new(),
                target: "http://orders.internal:8080/v1".into(),
                target_service: None,
                cors: None,
                plans,
                tags: vec![],
                visibility: Default::default(),
            },
        )
    }

    fn sync<'a>(
        gateway: &'a MemoryGateway,
        resolver: &'a StaticResolver,
    ) -> EndpointSync<'a> {
        EndpointSync::new(gateway, resolver, settings())
    }

    #[tokio::test]
    async fn test_first_pass_creates_and_deploys() {
        let gateway = MemoryGateway::new();
        let resolver = StaticResolver::default();
        let sink = RecordingSink::new(ObservedStatus::default());
        let resource = endpoint(vec![plan("gold")]);

        let outcome = sync(&gateway, &resolver)
            .converge(&resource, &sink)
            .await
            .unwrap();

        assert!(sink.status().has_remote());
        assert_eq!(outcome.plans.created, 1);

        let log = gateway.call_log();
        let create = log.iter().position(|c| c.starts_with("create_api")).unwrap();
        let update = log.iter().position(|c| c.starts_with("update_api")).unwrap();
        let deploy = log.iter().position(|c| c.starts_with("deploy_api")).unwrap();
        let start = log.iter().position(|c| c.starts_with("start_api")).unwrap();
        assert!(create < update && update < deploy && deploy < start);

        assert_eq!(
            gateway.api_target(&outcome.api_id).await.as_deref(),
            Some("http://orders.internal:8080/v1")
        );
    }

    #[tokio::test]
    async fn test_second_pass_updates_in_place() {
        let gateway = MemoryGateway::new();
        let resolver = StaticResolver::default();
        let sink = RecordingSink::new(ObservedStatus::default());
        let mut resource = endpoint(vec![plan("gold")]);

        sync(&gateway, &resolver).converge(&resource, &sink).await.unwrap();
        resource.status = sink.status();

        gateway.clear_call_log();
        let outcome = sync(&gateway, &resolver)
            .converge(&resource, &sink)
            .await
            .unwrap();

        let log = gateway.call_log();
        assert!(log.iter().all(|c| !c.starts_with("create_api")));
        assert!(log.iter().all(|c| !c.starts_with("create_plan")));
        // matched plan is updated, not recreated
        assert_eq!(outcome.plans.updated, 1);
        // already-started is swallowed
        assert!(log.iter().any(|c| c.starts_with("start_api")));
    }

    #[tokio::test]
    async fn test_plan_set_converges() {
        let gateway = MemoryGateway::new();
        let resolver = StaticResolver::default();
        let sink = RecordingSink::new(ObservedStatus::default());
        let mut resource = endpoint(vec![plan("gold"), plan("legacy")]);

        sync(&gateway, &resolver).converge(&resource, &sink).await.unwrap();
        resource.status = sink.status();
        let api_id = resource.status.remote_id.clone().unwrap();

        let before: Vec<RemotePlan> = gateway.list_plans(&api_id).await.unwrap();
        let gold_id = before.iter().find(|p| p.name == "gold").unwrap().id.clone();

        resource.spec.plans = vec![plan("gold"), plan("silver")];
        gateway.clear_call_log();
        let outcome = sync(&gateway, &resolver)
            .converge(&resource, &sink)
            .await
            .unwrap();

        assert_eq!(outcome.plans.updated, 1);
        assert_eq!(outcome.plans.created, 1);
        assert_eq!(outcome.plans.retired, 1);

        let log = gateway.call_log();
        let close = log.iter().position(|c| c == "close_plan:legacy").unwrap();
        let delete = log.iter().position(|c| c == "delete_plan:legacy").unwrap();
        assert!(close < delete);

        let after = gateway.list_plans(&api_id).await.unwrap();
        let mut names: Vec<&str> = after.iter().map(|p| p.name.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["gold", "silver"]);
        // gold kept its remote identity
        assert_eq!(
            after.iter().find(|p| p.name == "gold").unwrap().id,
            gold_id
        );
    }

    #[tokio::test]
    async fn test_service_reference_wins_over_literal_target() {
        let gateway = MemoryGateway::new();
        let mut resolver = StaticResolver::default();
        resolver.insert(
            "prod/orders-svc",
            ServiceTarget {
                protocol: "http".into(),
                host: "orders-svc.prod".into(),
                port: 9090,
            },
        );

        let sink = RecordingSink::new(ObservedStatus::default());
        let mut resource = endpoint(vec![]);
        resource.spec.target = "v2".into();
        resource.spec.target_service = Some(ServiceRef {
            name: "orders-svc".into(),
            namespace: Some("prod".into()),
        });

        let outcome = sync(&gateway, &resolver)
            .converge(&resource, &sink)
            .await
            .unwrap();

        assert_eq!(
            gateway.api_target(&outcome.api_id).await.as_deref(),
            Some("http://orders-svc.prod:9090/v2")
        );
    }

    #[tokio::test]
    async fn test_unresolvable_service_aborts_before_any_write() {
        let gateway = MemoryGateway::new();
        let resolver = StaticResolver::default();
        let sink = RecordingSink::new(ObservedStatus::default());
        let mut resource = endpoint(vec![]);
        resource.spec.target_service = Some(ServiceRef {
            name: "missing".into(),
            namespace: None,
        });

        let err = sync(&gateway, &resolver)
            .converge(&resource, &sink)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Resolve(_)));
        assert!(gateway.call_log().is_empty());
        assert!(sink.patches().is_empty());
    }

    #[tokio::test]
    async fn test_adopts_existing_api_instead_of_creating() {
        let gateway = MemoryGateway::new();
        let resolver = StaticResolver::default();

        // an earlier pass created the API but never recorded its ID
        gateway
            .create_api(&gantry_gateway::NewApi {
                name: "orders-api".into(),
                version: "1.0".into(),
                context_path: "/orders".into(),
                description: String::new(),
                target: "http://old:1".into(),
            })
            .await
            .unwrap();
        gateway.clear_call_log();

        let sink = RecordingSink::new(ObservedStatus::default());
        let resource = endpoint(vec![]);
        sync(&gateway, &resolver).converge(&resource, &sink).await.unwrap();

        assert!(sink.status().has_remote());
        assert!(gateway
            .call_log()
            .iter()
            .all(|c| !c.starts_with("create_api")));
    }

    #[tokio::test]
    async fn test_failed_deploy_does_not_recreate_on_retry() {
        let gateway = MemoryGateway::new();
        let resolver = StaticResolver::default();
        let sink = RecordingSink::new(ObservedStatus::default());
        let mut resource = endpoint(vec![]);

        gateway.fail_on("deploy_api", "");
        let err = sync(&gateway, &resolver)
            .converge(&resource, &sink)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Gateway(_)));

        // ensure already recorded the remote ID before deploy failed
        resource.status = sink.status();
        assert!(resource.status.has_remote());

        gateway.clear_failures();
        gateway.clear_call_log();
        sync(&gateway, &resolver).converge(&resource, &sink).await.unwrap();

        let log = gateway.call_log();
        assert!(log.iter().all(|c| !c.starts_with("create_api")));
        assert!(log.iter().any(|c| c.starts_with("deploy_api")));
    }
}
