//! Registry key codec
//!
//! Parses raw watch keys into typed identifiers, and builds keys back from
//! them. Parsing is pure; a key with the wrong prefix, the wrong number of
//! segments, or an empty id segment is reported as
//! [`CassavaError::MalformedKey`]. Segment contents are not restricted.

use cassava_common::{
    CassavaError, INSTANCE_FILE_PREFIX, Result, SERVICE_FILE_PREFIX, SERVICE_INDEX_PREFIX,
    SPLIT, join_tenant,
};

use crate::model::{InstanceKey, MicroServiceKey, ServiceKey};

/// Strip `prefix` and split the remainder into exactly `count` segments
fn segments<'a>(key: &'a str, prefix: &str, count: usize) -> Result<Vec<&'a str>> {
    let rest = key
        .strip_prefix(prefix)
        .ok_or_else(|| CassavaError::malformed_key(key, format!("expected prefix {}", prefix)))?;
    let parts: Vec<&str> = rest.split(SPLIT).collect();
    if parts.len() != count {
        return Err(CassavaError::malformed_key(
            key,
            format!("expected {} segments, found {}", count, parts.len()),
        ));
    }
    Ok(parts)
}

fn require_non_empty<'a>(key: &str, name: &str, value: &'a str) -> Result<&'a str> {
    if value.is_empty() {
        Err(CassavaError::malformed_key(key, format!("empty {} segment", name)))
    } else {
        Ok(value)
    }
}

/// Parse `/cse-sr/ms/indexes/{domain}/{project}/{env}/{appId}/{serviceName}/{version}`
///
/// The environment segment may be empty.
pub fn parse_service_index_key(key: &str) -> Result<MicroServiceKey> {
    let parts = segments(key, SERVICE_INDEX_PREFIX, 6)?;
    let domain = require_non_empty(key, "domain", parts[0])?;
    let project = require_non_empty(key, "project", parts[1])?;
    Ok(MicroServiceKey {
        tenant: join_tenant(domain, project),
        environment: parts[2].to_string(),
        app_id: require_non_empty(key, "app id", parts[3])?.to_string(),
        service_name: require_non_empty(key, "service name", parts[4])?.to_string(),
        alias: String::new(),
        version: require_non_empty(key, "version", parts[5])?.to_string(),
    })
}

/// Parse `/cse-sr/inst/files/{domain}/{project}/{serviceId}/{instanceId}`
pub fn parse_instance_key(key: &str) -> Result<InstanceKey> {
    let parts = segments(key, INSTANCE_FILE_PREFIX, 4)?;
    let domain = require_non_empty(key, "domain", parts[0])?;
    let project = require_non_empty(key, "project", parts[1])?;
    Ok(InstanceKey {
        tenant: join_tenant(domain, project),
        service_id: require_non_empty(key, "service id", parts[2])?.to_string(),
        instance_id: require_non_empty(key, "instance id", parts[3])?.to_string(),
    })
}

/// Parse `/cse-sr/ms/files/{domain}/{project}/{serviceId}`
pub fn parse_service_key(key: &str) -> Result<ServiceKey> {
    let parts = segments(key, SERVICE_FILE_PREFIX, 3)?;
    let domain = require_non_empty(key, "domain", parts[0])?;
    let project = require_non_empty(key, "project", parts[1])?;
    Ok(ServiceKey::new(
        join_tenant(domain, project),
        require_non_empty(key, "service id", parts[2])?,
    ))
}

pub fn generate_service_index_key(key: &MicroServiceKey) -> String {
    format!(
        "{}{}/{}/{}/{}/{}",
        SERVICE_INDEX_PREFIX,
        key.tenant,
        key.environment,
        key.app_id,
        key.service_name,
        key.version
    )
}

pub fn generate_instance_key(tenant: &str, service_id: &str, instance_id: &str) -> String {
    format!(
        "{}{}/{}/{}",
        INSTANCE_FILE_PREFIX, tenant, service_id, instance_id
    )
}
