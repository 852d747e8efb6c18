//! Store trait definitions

use crate::error::StoreResult;
use async_trait::async_trait;
use gantry_types::{AppResource, AppSpec, EndpointResource, EndpointSpec, ResourceName, StatusPatch};

/// Storage for declared applications
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    async fn get_application(&self, name: &ResourceName) -> StoreResult<Option<AppResource>>;

    async fn list_applications(&self) -> StoreResult<Vec<AppResource>>;

    /// Create or update the spec; an actual change bumps the generation,
    /// re-applying an identical spec does not
    async fn upsert_application(
        &self,
        name: &ResourceName,
        spec: AppSpec,
    ) -> StoreResult<AppResource>;

    /// Write back a status delta from a completed convergence step
    async fn patch_application_status(
        &self,
        name: &ResourceName,
        patch: StatusPatch,
    ) -> StoreResult<()>;

    /// Install or release the deletion guard
    async fn set_application_finalizer(
        &self,
        name: &ResourceName,
        present: bool,
    ) -> StoreResult<()>;

    /// Mark the resource for deletion; returns false when unknown
    async fn request_application_deletion(&self, name: &ResourceName) -> StoreResult<bool>;

    /// Remove the resource object; refused while the deletion guard is
    /// still present
    async fn remove_application(&self, name: &ResourceName) -> StoreResult<bool>;
}

/// Storage for declared endpoints
#[async_trait]
pub trait EndpointStore: Send + Sync {
    async fn get_endpoint(&self, name: &ResourceName) -> StoreResult<Option<EndpointResource>>;

    async fn list_endpoints(&self) -> StoreResult<Vec<EndpointResource>>;

    async fn upsert_endpoint(
        &self,
        name: &ResourceName,
        spec: EndpointSpec,
    ) -> StoreResult<EndpointResource>;

    async fn patch_endpoint_status(
        &self,
        name: &ResourceName,
        patch: StatusPatch,
    ) -> StoreResult<()>;

    async fn set_endpoint_finalizer(&self, name: &ResourceName, present: bool) -> StoreResult<()>;

    async fn request_endpoint_deletion(&self, name: &ResourceName) -> StoreResult<bool>;

    async fn remove_endpoint(&self, name: &ResourceName) -> StoreResult<bool>;
}

/// Combined store trait
pub trait Store: ApplicationStore + EndpointStore {}

impl<T: ApplicationStore + EndpointStore> Store for T {}
