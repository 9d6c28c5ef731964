//! Metadata facade consumed by the counting engine
//!
//! The full service CRUD surface lives elsewhere; the engine only needs a
//! point lookup of a service record, abstracted by [`MetadataManager`].

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use cassava_common::Result;

use crate::model::{MicroService, ServiceKey};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetServiceRequest {
    pub tenant: String,
    pub service_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetServiceResponse {
    pub service: Option<MicroService>,
}

/// Service metadata lookup
#[async_trait]
pub trait MetadataManager: Send + Sync {
    /// Get a service record by id
    ///
    /// A missing service is `Ok` with `service: None`.
    async fn get_service(&self, request: GetServiceRequest) -> Result<GetServiceResponse>;
}

/// In-memory metadata store
#[derive(Debug, Default)]
pub struct MemoryMetadataManager {
    /// Key: `tenant/service_id`
    services: DashMap<String, MicroService>,
}

impl MemoryMetadataManager {
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
        }
    }

    /// Register or replace a service record under `tenant`
    pub fn register_service(&self, tenant: &str, service: MicroService) {
        let key = ServiceKey::new(tenant, service.service_id.clone()).to_string();
        self.services.insert(key, service);
    }

    pub fn unregister_service(&self, tenant: &str, service_id: &str) -> bool {
        let key = ServiceKey::new(tenant, service_id).to_string();
        self.services.remove(&key).is_some()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[async_trait]
impl MetadataManager for MemoryMetadataManager {
    async fn get_service(&self, request: GetServiceRequest) -> Result<GetServiceResponse> {
        let key = ServiceKey::new(request.tenant, request.service_id).to_string();
        Ok(GetServiceResponse {
            service: self.services.get(&key).map(|s| s.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(id: &str) -> MicroService {
        MicroService {
            service_id: id.to_string(),
            app_id: "default".to_string(),
            service_name: "svc".to_string(),
            version: "1.0.0".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_register_and_get() {
        let manager = MemoryMetadataManager::new();
        manager.register_service("t1/p1", service("s1"));

        let resp = manager
            .get_service(GetServiceRequest {
                tenant: "t1/p1".to_string(),
                service_id: "s1".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(resp.service.unwrap().service_id, "s1");

        // Same id under another tenant is a different service
        let resp = manager
            .get_service(GetServiceRequest {
                tenant: "t2/p1".to_string(),
                service_id: "s1".to_string(),
            })
            .await
            .unwrap();
        assert!(resp.service.is_none());
    }

    #[tokio::test]
    async fn test_unregister() {
        let manager = MemoryMetadataManager::new();
        manager.register_service("t1/p1", service("s1"));
        assert_eq!(manager.len(), 1);
        assert!(manager.unregister_service("t1/p1", "s1"));
        assert!(!manager.unregister_service("t1/p1", "s1"));
        assert!(manager.is_empty());
    }
}
