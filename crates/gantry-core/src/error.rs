//! Convergence error types

use gantry_gateway::GatewayError;
use thiserror::Error;

/// Errors a convergence pass can end with
///
/// The first error encountered aborts the remaining steps of the pass and
/// is surfaced; already-completed remote calls are not rolled back. Every
/// variant leaves the resource retryable: nothing here is fatal to the
/// process.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A gateway call failed
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The referenced target service could not be resolved
    #[error(transparent)]
    Resolve(#[from] crate::resolve::ResolveError),

    /// Desired state refers to something that does not exist or is not
    /// unique; held until the declaration or the referenced object is fixed
    #[error("validation error: {0}")]
    Validation(String),

    /// A freshly created API never became visible through search
    #[error("api at context path {0} not visible after create")]
    PropagationTimeout(String),

    /// Writing a status patch back through the caller failed
    #[error("status write-back failed: {0}")]
    StatusWrite(String),
}

impl SyncError {
    /// Whether the underlying gateway error means "already in the
    /// requested state" (close/stop/start on an object that is already
    /// there); lifecycle and cleanup paths tolerate these
    pub fn is_already_done(&self) -> bool {
        matches!(self, SyncError::Gateway(e) if e.is_already_done())
    }

    /// Whether the remote counterpart is missing entirely
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::Gateway(e) if e.is_not_found())
    }
}

/// Result type for convergence operations
pub type SyncResult<T> = Result<T, SyncError>;
