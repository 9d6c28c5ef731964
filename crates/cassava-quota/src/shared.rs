//! Shared-service classification
//!
//! A shared service is registered once under the registry tenant and is
//! visible to every tenant, so its instances must not count against any of
//! them. [`SharedServicePolicy`] decides from a service identity alone;
//! [`SharedServiceClassifier`] remembers which `tenant/service_id` pairs have
//! been classified shared. Classification is never revoked.

use std::collections::HashSet;
use std::time::Duration;

use dashmap::DashSet;
use tracing::{debug, info};

use cassava_common::{
    CassavaError, DEFAULT_LOOKUP_TIMEOUT_MS, REGISTRY_APP_ID, REGISTRY_DOMAIN_PROJECT,
    REGISTRY_SERVICE_NAME, Result,
};

use crate::metadata::{GetServiceRequest, MetadataManager};
use crate::model::{MicroServiceKey, ServiceKey};

/// Which service identities are shared
#[derive(Debug, Clone)]
pub struct SharedServicePolicy {
    names: HashSet<String>,
}

impl SharedServicePolicy {
    /// Build a policy from extra shared service names; the registry's own
    /// name is always included
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: HashSet<String> = names
            .into_iter()
            .map(Into::into)
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect();
        names.insert(REGISTRY_SERVICE_NAME.to_string());
        Self { names }
    }

    /// Parse a comma separated list of names
    pub fn from_csv(csv: &str) -> Self {
        Self::new(csv.split(','))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Registered under the registry tenant
    pub fn is_global(&self, key: &MicroServiceKey) -> bool {
        key.tenant == REGISTRY_DOMAIN_PROJECT
    }

    pub fn is_shared(&self, key: &MicroServiceKey) -> bool {
        if !self.is_global(key) || key.app_id != REGISTRY_APP_ID {
            return false;
        }
        self.names.contains(&key.service_name)
            || (!key.alias.is_empty() && self.names.contains(&key.alias))
    }
}

impl Default for SharedServicePolicy {
    fn default() -> Self {
        Self::new(std::iter::empty::<String>())
    }
}

/// Concurrency-safe record of shared `tenant/service_id` pairs
pub struct SharedServiceClassifier {
    shared_ids: DashSet<String>,
    policy: SharedServicePolicy,
    lookup_timeout: Duration,
}

impl SharedServiceClassifier {
    pub fn new(policy: SharedServicePolicy) -> Self {
        Self {
            shared_ids: DashSet::new(),
            policy,
            lookup_timeout: Duration::from_millis(DEFAULT_LOOKUP_TIMEOUT_MS),
        }
    }

    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    pub fn policy(&self) -> &SharedServicePolicy {
        &self.policy
    }

    pub fn is_shared(&self, tenant: &str, service_id: &str) -> bool {
        self.is_shared_key(&ServiceKey::new(tenant, service_id))
    }

    pub fn is_shared_key(&self, key: &ServiceKey) -> bool {
        self.shared_ids.contains(&key.to_string())
    }

    /// Record a pair as shared, returns true when it was not known before
    pub fn mark_shared(&self, tenant: &str, service_id: &str) -> bool {
        let key = ServiceKey::new(tenant, service_id).to_string();
        let inserted = self.shared_ids.insert(key);
        if inserted {
            info!(tenant, service_id, "Classified service as shared");
        }
        inserted
    }

    pub fn len(&self) -> usize {
        self.shared_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared_ids.is_empty()
    }

    /// Classify a service by looking up its record through `metadata`
    ///
    /// Marks the pair shared when the record says so. Errors, a missing
    /// record, and timeouts leave the pair unclassified.
    pub async fn classify_via_lookup(
        &self,
        metadata: &dyn MetadataManager,
        key: &ServiceKey,
    ) -> Result<bool> {
        let request = GetServiceRequest {
            tenant: key.tenant.clone(),
            service_id: key.service_id.clone(),
        };
        let response = tokio::time::timeout(self.lookup_timeout, metadata.get_service(request))
            .await
            .map_err(|_| CassavaError::LookupTimeout(key.to_string()))?
            .map_err(|e| CassavaError::lookup_failed(key.to_string(), e.to_string()))?;

        let service = response
            .service
            .ok_or_else(|| CassavaError::ServiceNotExist(key.to_string()))?;

        let shared = self.policy.is_shared(&service.to_key(&key.tenant));
        debug!(service = %key, shared, "Classified service via metadata lookup");
        if shared {
            self.mark_shared(&key.tenant, &key.service_id);
        }
        Ok(shared)
    }
}

impl Default for SharedServiceClassifier {
    fn default() -> Self {
        Self::new(SharedServicePolicy::default())
    }
}
