//! Status write-back seam
//!
//! Convergence steps never mutate the caller-owned resource directly.
//! Each completed step hands an explicit [`StatusPatch`] to a sink, which
//! the daemon wires to its store. Patches applied before a failure stay
//! applied; nothing after the failure is written. That is what makes a
//! half-finished pass resumable: the next pass picks up exactly where the
//! status says it left off.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use gantry_types::{ObservedStatus, StatusPatch};
use std::sync::Mutex;

/// Receives status deltas at successful step boundaries
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn apply(&self, patch: StatusPatch) -> SyncResult<()>;
}

/// Sink that applies patches to a local status copy and keeps the patch
/// sequence around for inspection; the test fixture of choice
pub struct RecordingSink {
    state: Mutex<ObservedStatus>,
    patches: Mutex<Vec<StatusPatch>>,
}

impl RecordingSink {
    pub fn new(initial: ObservedStatus) -> Self {
        Self {
            state: Mutex::new(initial),
            patches: Mutex::new(Vec::new()),
        }
    }

    /// Current status after all patches so far
    pub fn status(&self) -> ObservedStatus {
        self.state.lock().expect("status lock").clone()
    }

    /// Every patch applied, in order
    pub fn patches(&self) -> Vec<StatusPatch> {
        self.patches.lock().expect("patch lock").clone()
    }
}

#[async_trait]
impl StatusSink for RecordingSink {
    async fn apply(&self, patch: StatusPatch) -> SyncResult<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| SyncError::StatusWrite("status lock poisoned".into()))?;
        patch.apply(&mut state);
        self.patches
            .lock()
            .map_err(|_| SyncError::StatusWrite("patch lock poisoned".into()))?
            .push(patch);
        Ok(())
    }
}
