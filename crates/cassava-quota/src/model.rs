//! Data model for the counting engine
//!
//! Typed identifiers decoded from registry keys, the change events delivered
//! by the watch feed, and the service record returned by metadata lookups.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use cassava_common::SPLIT;

/// Class of registry entity a counter or event pertains to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceKind {
    /// Service record (`/cse-sr/ms/files/...`), not counted
    ServiceRecord,
    ServiceIndex,
    Instance,
    Schema,
    Tag,
    Rule,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::ServiceRecord => "SERVICE_RECORD",
            ResourceKind::ServiceIndex => "SERVICE_INDEX",
            ResourceKind::Instance => "INSTANCE",
            ResourceKind::Schema => "SCHEMA",
            ResourceKind::Tag => "TAG",
            ResourceKind::Rule => "RULE",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SERVICE_RECORD" => Ok(ResourceKind::ServiceRecord),
            "SERVICE_INDEX" => Ok(ResourceKind::ServiceIndex),
            "INSTANCE" => Ok(ResourceKind::Instance),
            "SCHEMA" => Ok(ResourceKind::Schema),
            "TAG" => Ok(ResourceKind::Tag),
            "RULE" => Ok(ResourceKind::Rule),
            _ => Err(format!("Invalid resource kind: {}", s)),
        }
    }
}

/// Kind of change carried by a watch event
///
/// `Init` is the replay of already existing state when a watch starts.
/// Anything the feed sends that is not known here decodes as `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Init,
    Create,
    Update,
    Delete,
    #[serde(other)]
    Unknown,
}

impl EventType {
    /// Whether the event means "this entity now exists"
    pub fn is_existence(&self) -> bool {
        matches!(self, EventType::Init | EventType::Create)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventType::Init => "INIT",
            EventType::Create => "CREATE",
            EventType::Update => "UPDATE",
            EventType::Delete => "DELETE",
            EventType::Unknown => "UNKNOWN",
        };
        write!(f, "{}", s)
    }
}

/// A single change notification from the watch feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEvent {
    pub event_type: EventType,
    pub kind: ResourceKind,
    pub key: String,
    pub value: Bytes,
    /// Store revision of the change, 0 when unknown
    pub revision: i64,
}

impl KvEvent {
    pub fn new(
        event_type: EventType,
        kind: ResourceKind,
        key: impl Into<String>,
        value: impl Into<Bytes>,
    ) -> Self {
        Self {
            event_type,
            kind,
            key: key.into(),
            value: value.into(),
            revision: 0,
        }
    }

    pub fn with_revision(mut self, revision: i64) -> Self {
        self.revision = revision;
        self
    }

    /// Value decoded as UTF-8, `None` when it is not valid text
    pub fn value_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }
}

/// A service identified within a tenant
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceKey {
    pub tenant: String,
    pub service_id: String,
}

impl ServiceKey {
    pub fn new(tenant: impl Into<String>, service_id: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            service_id: service_id.into(),
        }
    }
}

/// Renders as `tenant/service_id`, the shared membership key
impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.tenant, SPLIT, self.service_id)
    }
}

/// A runtime instance of a service
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceKey {
    pub tenant: String,
    pub service_id: String,
    pub instance_id: String,
}

impl InstanceKey {
    pub fn service_key(&self) -> ServiceKey {
        ServiceKey::new(self.tenant.clone(), self.service_id.clone())
    }
}

/// Identity of a service registration as encoded in its index key
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct MicroServiceKey {
    pub tenant: String,
    pub environment: String,
    pub app_id: String,
    pub service_name: String,
    pub alias: String,
    pub version: String,
}

/// Service record as stored by the registry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MicroService {
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub environment: String,
    pub app_id: String,
    pub service_name: String,
    #[serde(default)]
    pub alias: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: String,
}

impl MicroService {
    /// Identity of this record when registered under `tenant`
    pub fn to_key(&self, tenant: &str) -> MicroServiceKey {
        MicroServiceKey {
            tenant: tenant.to_string(),
            environment: self.environment.clone(),
            app_id: self.app_id.clone(),
            service_name: self.service_name.clone(),
            alias: self.alias.clone(),
            version: self.version.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_kind_str() {
        assert_eq!(ResourceKind::ServiceIndex.as_str(), "SERVICE_INDEX");
        assert_eq!(
            "INSTANCE".parse::<ResourceKind>().unwrap(),
            ResourceKind::Instance
        );
        assert!("FOO".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn test_event_type_unknown_variant() {
        let t: EventType = serde_json::from_str("\"COMPACT\"").unwrap();
        assert_eq!(t, EventType::Unknown);
        let t: EventType = serde_json::from_str("\"INIT\"").unwrap();
        assert!(t.is_existence());
        assert!(!EventType::Update.is_existence());
        assert!(!EventType::Delete.is_existence());
    }

    #[test]
    fn test_service_key_display() {
        let key = ServiceKey::new("default/default", "svc-1");
        assert_eq!(key.to_string(), "default/default/svc-1");
    }

    #[test]
    fn test_event_value_str() {
        let evt = KvEvent::new(EventType::Create, ResourceKind::ServiceIndex, "k", "svc-1");
        assert_eq!(evt.value_str(), Some("svc-1"));
        let evt = KvEvent::new(
            EventType::Create,
            ResourceKind::ServiceIndex,
            "k",
            vec![0xff, 0xfe],
        );
        assert_eq!(evt.value_str(), None);
    }

    #[test]
    fn test_micro_service_json() {
        let svc: MicroService = serde_json::from_str(
            r#"{"serviceId":"s1","appId":"default","serviceName":"SERVICECENTER","version":"1.0.0"}"#,
        )
        .unwrap();
        let key = svc.to_key("default/default");
        assert_eq!(key.tenant, "default/default");
        assert_eq!(key.service_name, "SERVICECENTER");
        assert!(key.environment.is_empty());
    }
}
