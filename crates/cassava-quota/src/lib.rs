//! Cassava Quota - Watch-driven resource counting
//!
//! This crate provides:
//! - Registry key codec
//! - Shared-service classification
//! - Per-tenant resource counters and the counter group
//! - Event handlers for service index and instance watch events
//! - Event feed dispatch table
//! - Registration gate and built-in quota checking

pub mod counter;
pub mod engine;
pub mod feed;
pub mod handler;
pub mod key;
pub mod listener;
pub mod metadata;
pub mod model;
pub mod quota;
pub mod shared;

// Re-export commonly used types
pub use counter::{BuildinCounter, Counter, CounterEntry, CounterGroup, MetricsCounter};
pub use engine::{QuotaEngine, QuotaEngineConfig};
pub use feed::EventFeed;
pub use handler::{EventHandler, InstanceEventHandler, ServiceIndexEventHandler};
pub use listener::{CounterListenerDeps, register_counter_listener};
pub use metadata::{
    GetServiceRequest, GetServiceResponse, MemoryMetadataManager, MetadataManager,
};
pub use model::{
    EventType, InstanceKey, KvEvent, MicroService, MicroServiceKey, ResourceKind, ServiceKey,
};
pub use quota::{QuotaChecker, QuotaLimits, QuotaUsage};
pub use shared::{SharedServiceClassifier, SharedServicePolicy};
