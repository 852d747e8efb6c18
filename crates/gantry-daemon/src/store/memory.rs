//! In-memory store implementation

use super::traits::*;
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use gantry_types::{
    AppResource, AppSpec, EndpointResource, EndpointSpec, ResourceName, StatusPatch,
};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory resource store
#[derive(Debug, Default)]
pub struct MemoryStore {
    applications: RwLock<HashMap<ResourceName, AppResource>>,
    endpoints: RwLock<HashMap<ResourceName, EndpointResource>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ApplicationStore for MemoryStore {
    async fn get_application(&self, name: &ResourceName) -> StoreResult<Option<AppResource>> {
        Ok(self.applications.read().await.get(name).cloned())
    }

    async fn list_applications(&self) -> StoreResult<Vec<AppResource>> {
        Ok(self.applications.read().await.values().cloned().collect())
    }

    async fn upsert_application(
        &self,
        name: &ResourceName,
        spec: AppSpec,
    ) -> StoreResult<AppResource> {
        let mut applications = self.applications.write().await;
        match applications.get_mut(name) {
            Some(existing) => {
                if existing.meta.deletion_requested {
                    return Err(StoreError::Conflict(format!(
                        "application {name} is being deleted"
                    )));
                }
                if existing.spec != spec {
                    existing.spec = spec;
                    existing.meta.generation += 1;
                    existing.meta.updated_at = chrono::Utc::now();
                }
                Ok(existing.clone())
            }
            None => {
                let resource = AppResource::new(name.clone(), spec);
                applications.insert(name.clone(), resource.clone());
                Ok(resource)
            }
        }
    }

    async fn patch_application_status(
        &self,
        name: &ResourceName,
        patch: StatusPatch,
    ) -> StoreResult<()> {
        let mut applications = self.applications.write().await;
        let resource = applications
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(format!("application {name}")))?;
        patch.apply(&mut resource.status);
        Ok(())
    }

    async fn set_application_finalizer(
        &self,
        name: &ResourceName,
        present: bool,
    ) -> StoreResult<()> {
        let mut applications = self.applications.write().await;
        let resource = applications
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(format!("application {name}")))?;
        resource.meta.finalizer_present = present;
        Ok(())
    }

    async fn request_application_deletion(&self, name: &ResourceName) -> StoreResult<bool> {
        let mut applications = self.applications.write().await;
        match applications.get_mut(name) {
            Some(resource) => {
                resource.meta.deletion_requested = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove_application(&self, name: &ResourceName) -> StoreResult<bool> {
        let mut applications = self.applications.write().await;
        if let Some(resource) = applications.get(name) {
            if resource.meta.finalizer_present {
                return Err(StoreError::Conflict(format!(
                    "application {name} still carries the deletion guard"
                )));
            }
        }
        Ok(applications.remove(name).is_some())
    }
}

#[async_trait]
impl EndpointStore for MemoryStore {
    async fn get_endpoint(&self, name: &ResourceName) -> StoreResult<Option<EndpointResource>> {
        Ok(self.endpoints.read().await.get(name).cloned())
    }

    async fn list_endpoints(&self) -> StoreResult<Vec<EndpointResource>> {
        Ok(self.endpoints.read().await.values().cloned().collect())
    }

    async fn upsert_endpoint(
        &self,
        name: &ResourceName,
        spec: EndpointSpec,
    ) -> StoreResult<EndpointResource> {
        let mut endpoints = self.endpoints.write().await;
        match endpoints.get_mut(name) {
            Some(existing) => {
                if existing.meta.deletion_requested {
                    return Err(StoreError::Conflict(format!(
                        "endpoint {name} is being deleted"
                    )));
                }
                if existing.spec != spec {
                    existing.spec = spec;
                    existing.meta.generation += 1;
                    existing.meta.updated_at = chrono::Utc::now();
                }
                Ok(existing.clone())
            }
            None => {
                let resource = EndpointResource::new(name.clone(), spec);
                endpoints.insert(name.clone(), resource.clone());
                Ok(resource)
            }
        }
    }

    async fn patch_endpoint_status(
        &self,
        name: &ResourceName,
        patch: StatusPatch,
    ) -> StoreResult<()> {
        let mut endpoints = self.endpoints.write().await;
        let resource = endpoints
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(format!("endpoint {name}")))?;
        patch.apply(&mut resource.status);
        Ok(())
    }

    async fn set_endpoint_finalizer(&self, name: &ResourceName, present: bool) -> StoreResult<()> {
        let mut endpoints = self.endpoints.write().await;
        let resource = endpoints
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(format!("endpoint {name}")))?;
        resource.meta.finalizer_present = present;
        Ok(())
    }

    async fn request_endpoint_deletion(&self, name: &ResourceName) -> StoreResult<bool> {
        let mut endpoints = self.endpoints.write().await;
        match endpoints.get_mut(name) {
            Some(resource) => {
                resource.meta.deletion_requested = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove_endpoint(&self, name: &ResourceName) -> StoreResult<bool> {
        let mut endpoints = self.endpoints.write().await;
        if let Some(resource) = endpoints.get(name) {
            if resource.meta.finalizer_present {
                return Err(StoreError::Conflict(format!(
                    "endpoint {name} still carries the deletion guard"
                )));
            }
        }
        Ok(endpoints.remove(name).is_some())
    }
}
