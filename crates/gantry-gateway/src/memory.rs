//! In-memory gateway backend for development and testing
//!
//! Behaves like the real management API for the operations Gantry uses,
//! including the error shapes that matter to callers: `NotFound` for
//! unknown IDs, "already ..." conflicts on lifecycle and close calls, and
//! `Ambiguous` on multi-match searches. Every call is journaled so tests
//! can assert call counts and ordering, and individual operations can be
//! made to fail on demand to exercise error paths.

use crate::entities::*;
use crate::error::{GatewayError, GatewayResult};
use crate::traits::Gateway;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct StoredPlan {
    plan: RemotePlan,
    closed: bool,
}

#[derive(Debug, Clone)]
struct StoredSubscription {
    subscription: RemoteSubscription,
    closed: bool,
}

#[derive(Debug, Clone)]
struct FailRule {
    op: String,
    needle: String,
}

/// In-memory stand-in for the gateway management API
pub struct MemoryGateway {
    applications: RwLock<HashMap<String, RemoteApplication>>,
    apis: RwLock<HashMap<String, RemoteApi>>,
    api_targets: RwLock<HashMap<String, String>>,
    plans: RwLock<HashMap<String, StoredPlan>>,
    subscriptions: RwLock<HashMap<String, StoredSubscription>>,
    journal: Mutex<Vec<String>>,
    fail_rules: Mutex<Vec<FailRule>>,
    clock: AtomicI64,
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self {
            applications: RwLock::new(HashMap::new()),
            apis: RwLock::new(HashMap::new()),
            api_targets: RwLock::new(HashMap::new()),
            plans: RwLock::new(HashMap::new()),
            subscriptions: RwLock::new(HashMap::new()),
            journal: Mutex::new(Vec::new()),
            fail_rules: Mutex::new(Vec::new()),
            clock: AtomicI64::new(0),
        }
    }

    /// Make every `op` call whose target contains `needle` fail until
    /// [`MemoryGateway::clear_failures`] is called. An empty needle
    /// matches every target.
    pub fn fail_on(&self, op: &str, needle: &str) {
        self.fail_rules
            .lock()
            .expect("fail rules lock")
            .push(FailRule {
                op: op.to_string(),
                needle: needle.to_string(),
            });
    }

    pub fn clear_failures(&self) {
        self.fail_rules.lock().expect("fail rules lock").clear();
    }

    /// Journal of every call made so far, as `op:target` entries
    pub fn call_log(&self) -> Vec<String> {
        self.journal.lock().expect("journal lock").clone()
    }

    pub fn clear_call_log(&self) {
        self.journal.lock().expect("journal lock").clear();
    }

    /// The backend target last pushed for an API via update
    pub async fn api_target(&self, id: &str) -> Option<String> {
        self.api_targets.read().await.get(id).cloned()
    }

    /// Simulate an out-of-band edit: bump an API's last-modified timestamp
    pub async fn touch_api(&self, id: &str) {
        if let Some(api) = self.apis.write().await.get_mut(id) {
            api.updated_at = self.next_ts();
        }
    }

    /// Simulate an out-of-band edit on an application
    pub async fn touch_application(&self, id: &str) {
        if let Some(app) = self.applications.write().await.get_mut(id) {
            app.updated_at = self.next_ts();
        }
    }

    fn record(&self, op: &str, target: &str) -> GatewayResult<()> {
        self.journal
            .lock()
            .expect("journal lock")
            .push(format!("{op}:{target}"));

        let rules = self.fail_rules.lock().expect("fail rules lock");
        for rule in rules.iter() {
            if rule.op == op && (rule.needle.is_empty() || target.contains(&rule.needle)) {
                return Err(GatewayError::Api {
                    status: 500,
                    message: format!("injected failure for {op}:{target}"),
                });
            }
        }
        Ok(())
    }

    /// Strictly monotonic epoch-millis clock, so consecutive updates are
    /// always distinguishable by timestamp
    fn next_ts(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        self.clock
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |prev| {
                Some(now.max(prev + 1))
            })
            .map(|prev| now.max(prev + 1))
            .unwrap_or(now)
    }

    fn new_id() -> String {
        Uuid::new_v4().to_string()
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn create_application(&self, app: &NewApplication) -> GatewayResult<RemoteApplication> {
        self.record("create_application", &app.name)?;
        let application = RemoteApplication {
            id: Self::new_id(),
            name: app.name.clone(),
            description: app.description.clone(),
            app_type: app.app_type.clone(),
            client_id: app.client_id.clone(),
            updated_at: self.next_ts(),
        };
        self.applications
            .write()
            .await
            .insert(application.id.clone(), application.clone());
        Ok(application)
    }

    async fn update_application(
        &self,
        id: &str,
        app: &ApplicationUpdate,
    ) -> GatewayResult<RemoteApplication> {
        self.record("update_application", id)?;
        let mut applications = self.applications.write().await;
        let existing = applications
            .get_mut(id)
            .ok_or_else(|| GatewayError::NotFound(format!("application {id}")))?;
        existing.name = app.name.clone();
        existing.description = app.description.clone();
        existing.app_type = app.app_type.clone();
        existing.client_id = app.client_id.clone();
        existing.updated_at = self.next_ts();
        Ok(existing.clone())
    }

    async fn get_application(&self, id: &str) -> GatewayResult<RemoteApplication> {
        self.record("get_application", id)?;
        self.applications
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("application {id}")))
    }

    async fn delete_application(&self, id: &str) -> GatewayResult<()> {
        self.record("delete_application", id)?;
        self.applications
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| GatewayError::NotFound(format!("application {id}")))
    }

    async fn list_subscriptions(
        &self,
        application_id: &str,
    ) -> GatewayResult<Vec<RemoteSubscription>> {
        self.record("list_subscriptions", application_id)?;
        Ok(self
            .subscriptions
            .read()
            .await
            .values()
            .filter(|s| s.subscription.application_id == application_id && !s.closed)
            .map(|s| s.subscription.clone())
            .collect())
    }

    async fn create_subscription(
        &self,
        application_id: &str,
        plan_id: &str,
    ) -> GatewayResult<RemoteSubscription> {
        self.record("create_subscription", plan_id)?;
        let api_id = self
            .plans
            .read()
            .await
            .get(plan_id)
            .map(|p| p.plan.api_id.clone())
            .ok_or_else(|| GatewayError::NotFound(format!("plan {plan_id}")))?;
        let subscription = RemoteSubscription {
            id: Self::new_id(),
            application_id: application_id.to_string(),
            plan_id: plan_id.to_string(),
            api_id,
        };
        self.subscriptions
            .write()
            .await
            .insert(subscription.id.clone(), StoredSubscription {
                subscription: subscription.clone(),
                closed: false,
            });
        Ok(subscription)
    }

    async fn close_subscription(
        &self,
        application_id: &str,
        subscription_id: &str,
    ) -> GatewayResult<()> {
        self.record("close_subscription", subscription_id)?;
        let mut subscriptions = self.subscriptions.write().await;
        let stored = subscriptions
            .get_mut(subscription_id)
            .filter(|s| s.subscription.application_id == application_id)
            .ok_or_else(|| GatewayError::NotFound(format!("subscription {subscription_id}")))?;
        if stored.closed {
            return Err(GatewayError::Api {
                status: 400,
                message: format!("subscription {subscription_id} is already closed"),
            });
        }
        stored.closed = true;
        Ok(())
    }

    async fn delete_subscription(
        &self,
        application_id: &str,
        subscription_id: &str,
    ) -> GatewayResult<()> {
        self.record("delete_subscription", subscription_id)?;
        let mut subscriptions = self.subscriptions.write().await;
        match subscriptions.get(subscription_id) {
            Some(s) if s.subscription.application_id == application_id => {
                subscriptions.remove(subscription_id);
                Ok(())
            }
            _ => Err(GatewayError::NotFound(format!(
                "subscription {subscription_id}"
            ))),
        }
    }

    async fn create_api(&self, api: &NewApi) -> GatewayResult<RemoteRef> {
        self.record("create_api", &api.context_path)?;
        let mut apis = self.apis.write().await;
        if apis.values().any(|a| a.context_path == api.context_path) {
            return Err(GatewayError::Api {
                status: 400,
                message: format!("context path {} already exists", api.context_path),
            });
        }
        let remote = RemoteApi {
            id: Self::new_id(),
            name: api.name.clone(),
            context_path: api.context_path.clone(),
            version: api.version.clone(),
            state: ApiState::Stopped,
            updated_at: self.next_ts(),
        };
        let reference = RemoteRef {
            id: remote.id.clone(),
            updated_at: remote.updated_at,
        };
        apis.insert(remote.id.clone(), remote);
        Ok(reference)
    }

    async fn update_api(&self, id: &str, api: &ApiUpdate) -> GatewayResult<RemoteApi> {
        self.record("update_api", id)?;
        let mut apis = self.apis.write().await;
        let existing = apis
            .get_mut(id)
            .ok_or_else(|| GatewayError::NotFound(format!("api {id}")))?;
        existing.name = api.name.clone();
        existing.version = api.version.clone();
        existing.context_path = api.context_path.clone();
        existing.updated_at = self.next_ts();
        let updated = existing.clone();
        drop(apis);
        self.api_targets
            .write()
            .await
            .insert(id.to_string(), api.target.clone());
        Ok(updated)
    }

    async fn get_api(&self, id: &str) -> GatewayResult<RemoteApi> {
        self.record("get_api", id)?;
        self.apis
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("api {id}")))
    }

    async fn search_api(&self, context_path: &str) -> GatewayResult<Option<RemoteApi>> {
        self.record("search_api", context_path)?;
        let apis = self.apis.read().await;
        let matches: Vec<&RemoteApi> = apis
            .values()
            .filter(|a| a.context_path == context_path)
            .collect();
        match matches.len() {
            0 => Ok(None),
            1 => Ok(Some(matches[0].clone())),
            n => Err(GatewayError::Ambiguous(format!(
                "{n} APIs match context path {context_path}"
            ))),
        }
    }

    async fn delete_api(&self, id: &str) -> GatewayResult<()> {
        self.record("delete_api", id)?;
        self.apis
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| GatewayError::NotFound(format!("api {id}")))
    }

    async fn deploy_api(&self, id: &str) -> GatewayResult<()> {
        self.record("deploy_api", id)?;
        if !self.apis.read().await.contains_key(id) {
            return Err(GatewayError::NotFound(format!("api {id}")));
        }
        Ok(())
    }

    async fn lifecycle_api(&self, id: &str, action: LifecycleAction) -> GatewayResult<()> {
        self.record(
            match action {
                LifecycleAction::Start => "start_api",
                LifecycleAction::Stop => "stop_api",
            },
            id,
        )?;
        let mut apis = self.apis.write().await;
        let api = apis
            .get_mut(id)
            .ok_or_else(|| GatewayError::NotFound(format!("api {id}")))?;
        match (action, api.state) {
            (LifecycleAction::Start, ApiState::Started) => Err(GatewayError::Api {
                status: 400,
                message: format!("API {id} is already started"),
            }),
            (LifecycleAction::Stop, ApiState::Stopped) => Err(GatewayError::Api {
                status: 400,
                message: format!("API {id} is already stopped"),
            }),
            (LifecycleAction::Start, _) => {
                api.state = ApiState::Started;
                Ok(())
            }
            (LifecycleAction::Stop, _) => {
                api.state = ApiState::Stopped;
                Ok(())
            }
        }
    }

    async fn list_plans(&self, api_id: &str) -> GatewayResult<Vec<RemotePlan>> {
        self.record("list_plans", api_id)?;
        Ok(self
            .plans
            .read()
            .await
            .values()
            .filter(|p| p.plan.api_id == api_id && !p.closed)
            .map(|p| p.plan.clone())
            .collect())
    }

    async fn get_plan(&self, api_id: &str, plan_id: &str) -> GatewayResult<RemotePlan> {
        self.record("get_plan", plan_id)?;
        self.plans
            .read()
            .await
            .get(plan_id)
            .filter(|p| p.plan.api_id == api_id)
            .map(|p| p.plan.clone())
            .ok_or_else(|| GatewayError::NotFound(format!("plan {plan_id}")))
    }

    async fn create_plan(&self, api_id: &str, plan: &NewPlan) -> GatewayResult<RemotePlan> {
        self.record("create_plan", &plan.name)?;
        if !self.apis.read().await.contains_key(api_id) {
            return Err(GatewayError::NotFound(format!("api {api_id}")));
        }
        let remote = RemotePlan {
            id: Self::new_id(),
            api_id: api_id.to_string(),
            name: plan.name.clone(),
            description: plan.description.clone(),
            security: plan.security.clone(),
            tags: Vec::new(),
            order: 0,
            validation: "AUTO".to_string(),
        };
        self.plans.write().await.insert(remote.id.clone(), StoredPlan {
            plan: remote.clone(),
            closed: false,
        });
        Ok(remote)
    }

    async fn update_plan(
        &self,
        api_id: &str,
        plan_id: &str,
        plan: &PlanUpdate,
    ) -> GatewayResult<RemotePlan> {
        self.record("update_plan", &plan.name)?;
        let mut plans = self.plans.write().await;
        let stored = plans
            .get_mut(plan_id)
            .filter(|p| p.plan.api_id == api_id)
            .ok_or_else(|| GatewayError::NotFound(format!("plan {plan_id}")))?;
        stored.plan.name = plan.name.clone();
        stored.plan.description = plan.description.clone();
        stored.plan.tags = plan.tags.clone();
        stored.plan.order = plan.order;
        stored.plan.validation = plan.validation.clone();
        Ok(stored.plan.clone())
    }

    async fn close_plan(&self, api_id: &str, plan_id: &str) -> GatewayResult<()> {
        let name = self
            .plans
            .read()
            .await
            .get(plan_id)
            .map(|p| p.plan.name.clone())
            .unwrap_or_else(|| plan_id.to_string());
        self.record("close_plan", &name)?;
        let mut plans = self.plans.write().await;
        let stored = plans
            .get_mut(plan_id)
            .filter(|p| p.plan.api_id == api_id)
            .ok_or_else(|| GatewayError::NotFound(format!("plan {plan_id}")))?;
        if stored.closed {
            return Err(GatewayError::Api {
                status: 400,
                message: format!("plan {plan_id} is already closed"),
            });
        }
        stored.closed = true;
        Ok(())
    }

    async fn delete_plan(&self, api_id: &str, plan_id: &str) -> GatewayResult<()> {
        let name = self
            .plans
            .read()
            .await
            .get(plan_id)
            .map(|p| p.plan.name.clone())
            .unwrap_or_else(|| plan_id.to_string());
        self.record("delete_plan", &name)?;
        let mut plans = self.plans.write().await;
        match plans.get(plan_id) {
            Some(p) if p.plan.api_id == api_id => {
                plans.remove(plan_id);
                Ok(())
            }
            _ => Err(GatewayError::NotFound(format!("plan {plan_id}"))),
        }
    }

    async fn api_metrics(&self, api_id: &str, window: Duration) -> GatewayResult<ApiMetrics> {
        self.record("api_metrics", api_id)?;
        if !self.apis.read().await.contains_key(api_id) {
            return Err(GatewayError::NotFound(format!("api {api_id}")));
        }
        let mut stats = HashMap::new();
        stats.insert("count".to_string(), 0.0);
        stats.insert("interval".to_string(), window.as_millis() as f64);
        Ok(ApiMetrics { stats })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_search_api() {
        let gateway = MemoryGateway::new();
        let created = gateway
            .create_api(&NewApi {
                name: "orders".into(),
                version: "1.0".into(),
                context_path: "/orders".into(),
                description: String::new(),
                target: "http://backend:8080".into(),
            })
            .await
            .unwrap();

        let found = gateway.search_api("/orders").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(gateway.search_api("/nothing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_duplicate_context_path_rejected() {
        let gateway = MemoryGateway::new();
        let api = NewApi {
            name: "orders".into(),
            version: "1.0".into(),
            context_path: "/orders".into(),
            description: String::new(),
            target: "http://backend:8080".into(),
        };
        gateway.create_api(&api).await.unwrap();
        let err = gateway.create_api(&api).await.unwrap_err();
        assert!(matches!(err, GatewayError::Api { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_lifecycle_conflicts_are_already_done() {
        let gateway = MemoryGateway::new();
        let api = gateway
            .create_api(&NewApi {
                name: "a".into(),
                version: "1".into(),
                context_path: "/a".into(),
                description: String::new(),
                target: "t".into(),
            })
            .await
            .unwrap();

        gateway
            .lifecycle_api(&api.id, LifecycleAction::Start)
            .await
            .unwrap();
        let err = gateway
            .lifecycle_api(&api.id, LifecycleAction::Start)
            .await
            .unwrap_err();
        assert!(err.is_already_done());
    }

    #[tokio::test]
    async fn test_double_close_plan_is_already_done() {
        let gateway = MemoryGateway::new();
        let api = gateway
            .create_api(&NewApi {
                name: "a".into(),
                version: "1".into(),
                context_path: "/a".into(),
                description: String::new(),
                target: "t".into(),
            })
            .await
            .unwrap();
        let plan = gateway
            .create_plan(&api.id, &NewPlan {
                name: "gold".into(),
                description: String::new(),
                security: "API_KEY".into(),
                security_definition: "{}".into(),
                allowed_methods: vec![],
                policy: None,
            })
            .await
            .unwrap();

        gateway.close_plan(&api.id, &plan.id).await.unwrap();
        let err = gateway.close_plan(&api.id, &plan.id).await.unwrap_err();
        assert!(err.is_already_done());
    }

    #[tokio::test]
    async fn test_failure_injection_and_journal() {
        let gateway = MemoryGateway::new();
        gateway.fail_on("create_application", "mobile");

        let err = gateway
            .create_application(&NewApplication {
                name: "mobile-app".into(),
                description: String::new(),
                app_type: String::new(),
                client_id: String::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Api { status: 500, .. }));
        assert_eq!(gateway.call_log(), vec!["create_application:mobile-app"]);

        gateway.clear_failures();
        gateway
            .create_application(&NewApplication {
                name: "mobile-app".into(),
                description: String::new(),
                app_type: String::new(),
                client_id: String::new(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_touch_api_moves_timestamp_forward() {
        let gateway = MemoryGateway::new();
        let api = gateway
            .create_api(&NewApi {
                name: "a".into(),
                version: "1".into(),
                context_path: "/a".into(),
                description: String::new(),
                target: "t".into(),
            })
            .await
            .unwrap();

        gateway.touch_api(&api.id).await;
        let after = gateway.get_api(&api.id).await.unwrap();
        assert!(after.updated_at > api.updated_at);
    }
}
