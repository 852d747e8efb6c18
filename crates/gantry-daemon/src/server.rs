//! Server setup and lifecycle management

use crate::api::rest::state::AppState;
use crate::api::rest::router::create_router;
use crate::config::DaemonConfig;
use crate::controller::{Controller, Dispatcher};
use crate::error::{DaemonError, DaemonResult};
use crate::events::EventBus;
use crate::store::{MemoryStore, Store};
use gantry_core::TargetResolver;
use std::sync::Arc;
use tokio::net::TcpListener;

const EVENT_BUFFER: usize = 256;

/// Gantry daemon server
pub struct Server {
    config: DaemonConfig,
    state: AppState,
    dispatcher: Arc<Dispatcher>,
}

impl Server {
    /// Create a new server with the given configuration
    pub fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let gateway = config.gateway.build()?;
        let resolver: Arc<dyn TargetResolver> = Arc::new(config.resolver.build());
        let events = Arc::new(EventBus::new(EVENT_BUFFER));

        let controller = Arc::new(Controller::new(
            store.clone(),
            gateway.clone(),
            resolver,
            events.clone(),
            config.controller.clone(),
        ));
        let dispatcher = Dispatcher::new(controller, store.clone(), config.controller.clone());

        let state = AppState::new(store, gateway, dispatcher.clone(), events);

        Ok(Self {
            config,
            state,
            dispatcher,
        })
    }

    /// Run the server until shutdown
    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;
        let app = create_router(self.state.clone(), self.config.server.enable_cors);

        let listener = TcpListener::bind(addr).await?;
        tracing::info!("gantry daemon listening on {}", addr);

        // periodic drift catch-up runs alongside the API
        let resync = tokio::spawn(self.dispatcher.clone().run_resync());

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| DaemonError::Server(e.to_string()))?;

        resync.abort();
        tracing::info!("gantry daemon shutting down");

        Ok(())
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("received terminate signal, initiating graceful shutdown");
        }
    }
}
