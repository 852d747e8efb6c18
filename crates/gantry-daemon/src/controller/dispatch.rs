//! Per-resource workers and the periodic resync sweep
//!
//! One worker task per resource identity guarantees that passes for the
//! same resource never overlap, while different resources reconcile
//! concurrently up to the configured limit. Pending triggers for a
//! resource coalesce: a worker that is mid-pass picks up at most one
//! queued follow-up, no matter how many triggers arrived meanwhile.

use super::Controller;
use crate::config::ControllerConfig;
use crate::error::DaemonResult;
use crate::store::{ApplicationStore, EndpointStore, Store};
use gantry_types::{ResourceKind, ResourceName};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, Semaphore};

type WorkerKey = (ResourceKind, ResourceName);

/// Routes reconcile triggers to per-resource workers
pub struct Dispatcher {
    controller: Arc<Controller>,
    store: Arc<dyn Store>,
    config: ControllerConfig,
    workers: Mutex<HashMap<WorkerKey, mpsc::Sender<()>>>,
    semaphore: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(
        controller: Arc<Controller>,
        store: Arc<dyn Store>,
        config: ControllerConfig,
    ) -> Arc<Self> {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_reconciles));
        Arc::new(Self {
            controller,
            store,
            config,
            workers: Mutex::new(HashMap::new()),
            semaphore,
        })
    }

    /// Enqueue a pass for one resource, spawning its worker on first use
    pub async fn trigger(self: Arc<Self>, kind: ResourceKind, name: ResourceName) {
        let mut workers = self.workers.lock().await;
        let key = (kind, name.clone());

        if let Some(tx) = workers.get(&key) {
            match tx.try_send(()) {
                // delivered, or a pass is already queued: nothing to do
                Ok(()) | Err(mpsc::error::TrySendError::Full(())) => return,
                Err(mpsc::error::TrySendError::Closed(())) => {
                    workers.remove(&key);
                }
            }
        }

        let (tx, rx) = mpsc::channel(1);
        let _ = tx.try_send(());
        workers.insert(key, tx);
        drop(workers);

        let dispatcher = self.clone();
        tokio::spawn(async move {
            dispatcher.run_worker(kind, name, rx).await;
        });
    }

    /// Sequential pass loop for one resource
    async fn run_worker(
        self: Arc<Self>,
        kind: ResourceKind,
        name: ResourceName,
        mut rx: mpsc::Receiver<()>,
    ) {
        while rx.recv().await.is_some() {
            let Ok(permit) = self.semaphore.acquire().await else {
                break;
            };

            let result = match kind {
                ResourceKind::Application => {
                    self.controller.reconcile_application(&name).await
                }
                ResourceKind::Endpoint => self.controller.reconcile_endpoint(&name).await,
            };
            drop(permit);

            match result {
                Ok(Some(after)) => self.clone().schedule(kind, name.clone(), after),
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(
                        kind = %kind,
                        name = %name,
                        error = %e,
                        "reconcile failed, retrying later"
                    );
                    self.clone()
                        .schedule(kind, name.clone(), self.config.retry_delay());
                }
            }
        }

        self.workers.lock().await.remove(&(kind, name));
    }

    /// Re-trigger after a delay (next periodic check or failure backoff)
    fn schedule(self: Arc<Self>, kind: ResourceKind, name: ResourceName, after: Duration) {
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            self.trigger(kind, name).await;
        });
    }

    /// Periodic sweep enqueueing every known resource, catching drift on
    /// resources whose workers have wound down
    pub async fn run_resync(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.resync_interval());
        // the first tick fires immediately; resources are triggered on
        // declaration already
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(e) = self.clone().resync_all().await {
                tracing::error!(error = %e, "resync sweep failed");
            }
        }
    }

    /// Enqueue every known resource once
    pub async fn resync_all(self: Arc<Self>) -> DaemonResult<()> {
        for application in self.store.list_applications().await? {
            self.clone()
                .trigger(ResourceKind::Application, application.meta.name)
                .await;
        }
        for endpoint in self.store.list_endpoints().await? {
            self.clone()
                .trigger(ResourceKind::Endpoint, endpoint.meta.name)
                .await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::store::MemoryStore;
    use gantry_core::{StaticResolver, TargetResolver};
    use gantry_gateway::{Gateway, MemoryGateway};
    use gantry_types::{EndpointSpec, ResourcePhase};

    fn dispatcher() -> (Arc<Dispatcher>, Arc<MemoryStore>, Arc<MemoryGateway>) {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(MemoryGateway::new());
        let resolver: Arc<dyn TargetResolver> = Arc::new(StaticResolver::default());
        let events = Arc::new(EventBus::new(64));
        let config = ControllerConfig {
            propagation_delay_secs: 0,
            propagation_attempts: 1,
            ..ControllerConfig::default()
        };
        let controller = Arc::new(Controller::new(
            store.clone() as Arc<dyn Store>,
            gateway.clone() as Arc<dyn Gateway>,
            resolver,
            events,
            config.clone(),
        ));
        let dispatcher = Dispatcher::new(controller, store.clone(), config);
        (dispatcher, store, gateway)
    }

    fn spec() -> EndpointSpec {
        EndpointSpec {
            name: "orders-api".into(),
            version: "1.0".into(),
            context_path: "/orders".into(),
            description: String::new(),
            target: "http://orders.internal:8080".into(),
            target_service: None,
            cors: None,
            plans: vec![],
            tags: vec![],
            visibility: Default::default(),
        }
    }

    async fn wait_for_phase(
        store: &MemoryStore,
        name: &ResourceName,
        phase: ResourcePhase,
    ) -> bool {
        for _ in 0..100 {
            if let Some(resource) = store.get_endpoint(name).await.unwrap() {
                if resource.phase() == phase {
                    return true;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_trigger_converges_resource_in_background() {
        let (dispatcher, store, _gateway) = dispatcher();
        let name = ResourceName::new("orders");
        store.upsert_endpoint(&name, spec()).await.unwrap();

        dispatcher
            .clone()
            .trigger(ResourceKind::Endpoint, name.clone())
            .await;
        assert!(wait_for_phase(&store, &name, ResourcePhase::Synced).await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_resync_sweep_triggers_all_resources() {
        let (dispatcher, store, _gateway) = dispatcher();
        let a = ResourceName::new("a");
        let b = ResourceName::new("b");
        let mut spec_b = spec();
        spec_b.context_path = "/b".into();
        store.upsert_endpoint(&a, spec()).await.unwrap();
        store.upsert_endpoint(&b, spec_b).await.unwrap();

        dispatcher.clone().resync_all().await.unwrap();
        assert!(wait_for_phase(&store, &a, ResourcePhase::Synced).await);
        assert!(wait_for_phase(&store, &b, ResourcePhase::Synced).await);
    }
}
