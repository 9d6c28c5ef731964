//! Watch event handlers that turn registry changes into counting decisions
//!
//! Handlers hold no state of their own; the shared classifier and the
//! counter group are injected. A handler never fails the feed: malformed
//! keys and lookup failures are logged and the single event is dropped.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, trace, warn};

use cassava_common::REGISTRY_DOMAIN_PROJECT;

use crate::counter::CounterGroup;
use crate::key::{parse_instance_key, parse_service_index_key};
use crate::metadata::MetadataManager;
use crate::model::{EventType, KvEvent, ResourceKind};
use crate::shared::SharedServiceClassifier;

/// Consumer of watch events of one resource kind
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn kind(&self) -> ResourceKind;

    async fn on_event(&self, event: &KvEvent);
}

/// Counts services per tenant from service index events
pub struct ServiceIndexEventHandler {
    classifier: Arc<SharedServiceClassifier>,
    counters: Arc<CounterGroup>,
}

impl ServiceIndexEventHandler {
    pub fn new(classifier: Arc<SharedServiceClassifier>, counters: Arc<CounterGroup>) -> Self {
        Self {
            classifier,
            counters,
        }
    }
}

#[async_trait]
impl EventHandler for ServiceIndexEventHandler {
    fn kind(&self) -> ResourceKind {
        ResourceKind::ServiceIndex
    }

    async fn on_event(&self, event: &KvEvent) {
        let key = match parse_service_index_key(&event.key) {
            Ok(key) => key,
            Err(e) => {
                warn!(
                    code = e.code().code,
                    error = %e,
                    revision = event.revision,
                    "Dropping service index event"
                );
                return;
            }
        };

        // Shared services are never counted; their index value names the
        // service id to remember instead.
        if self.classifier.policy().is_shared(&key) {
            if event.event_type == EventType::Delete {
                return;
            }
            match event.value_str() {
                Some(service_id) if !service_id.is_empty() => {
                    self.classifier.mark_shared(&key.tenant, service_id);
                }
                _ => warn!(
                    key = %event.key,
                    "Shared service index without a service id"
                ),
            }
            return;
        }

        match event.event_type {
            t if t.is_existence() => self.counters.on_create(self.kind(), &key.tenant),
            EventType::Delete => self.counters.on_delete(self.kind(), &key.tenant),
            _ => {}
        }
    }
}

/// Counts instances per tenant, skipping instances of shared services
pub struct InstanceEventHandler {
    classifier: Arc<SharedServiceClassifier>,
    counters: Arc<CounterGroup>,
    metadata: Arc<dyn MetadataManager>,
}

impl InstanceEventHandler {
    pub fn new(
        classifier: Arc<SharedServiceClassifier>,
        counters: Arc<CounterGroup>,
        metadata: Arc<dyn MetadataManager>,
    ) -> Self {
        Self {
            classifier,
            counters,
            metadata,
        }
    }
}

#[async_trait]
impl EventHandler for InstanceEventHandler {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Instance
    }

    async fn on_event(&self, event: &KvEvent) {
        let key = match parse_instance_key(&event.key) {
            Ok(key) => key,
            Err(e) => {
                warn!(
                    code = e.code().code,
                    error = %e,
                    revision = event.revision,
                    "Dropping instance event"
                );
                return;
            }
        };
        let service_key = key.service_key();

        if self.classifier.is_shared_key(&service_key) {
            trace!(service = %service_key, "Instance of shared service, not counted");
            return;
        }

        match event.event_type {
            t if t.is_existence() => {
                // Only the registry tenant can host shared services
                if key.tenant == REGISTRY_DOMAIN_PROJECT {
                    match self
                        .classifier
                        .classify_via_lookup(self.metadata.as_ref(), &service_key)
                        .await
                    {
                        Ok(true) => {
                            debug!(service = %service_key, "Instance of shared service, not counted");
                            return;
                        }
                        Ok(false) => {}
                        Err(e) => {
                            error!(
                                code = e.code().code,
                                error = %e,
                                revision = event.revision,
                                instance = %key.instance_id,
                                "GetService[{}] failed, instance event dropped",
                                service_key
                            );
                            return;
                        }
                    }
                }
                self.counters.on_create(self.kind(), &key.tenant);
            }
            EventType::Delete => {
                self.counters.on_delete(self.kind(), &key.tenant);
            }
            _ => {}
        }
    }
}
