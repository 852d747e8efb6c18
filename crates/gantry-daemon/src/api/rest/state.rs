//! Application state for API handlers

use crate::controller::Dispatcher;
use crate::events::EventBus;
use crate::store::Store;
use gantry_gateway::Gateway;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Resource store
    pub store: Arc<dyn Store>,

    /// Gateway backend (read paths only; writes go through the controller)
    pub gateway: Arc<dyn Gateway>,

    /// Reconcile trigger routing
    pub dispatcher: Arc<Dispatcher>,

    /// Event bus
    pub events: Arc<EventBus>,

    /// Daemon version
    pub version: String,

    /// Daemon start time
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn Gateway>,
        dispatcher: Arc<Dispatcher>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            store,
            gateway,
            dispatcher,
            events,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: chrono::Utc::now(),
        }
    }

    /// Get uptime as a human-readable string
    pub fn uptime(&self) -> String {
        let duration = chrono::Utc::now() - self.started_at;
        let secs = duration.num_seconds();

        if secs < 60 {
            format!("{}s", secs)
        } else if secs < 3600 {
            format!("{}m {}s", secs / 60, secs % 60)
        } else if secs < 86400 {
            format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
        } else {
            format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
        }
    }
}
