//! Replay of registry change events from a JSON lines stream
//!
//! Stands in for the store's watch feed: each line is one change, e.g.
//!
//! ```text
//! {"type":"INIT","key":"/cse-sr/ms/files/default/default/sc-1","value":{"serviceId":"sc-1","appId":"default","serviceName":"SERVICECENTER","version":"1.0.0"}}
//! {"type":"CREATE","key":"/cse-sr/inst/files/default/default/sc-1/inst-1","value":{}}
//! ```
//!
//! Every line, service records included, goes through the event feed in file
//! order. [`ServiceRecordHandler`] applies service records to the in-memory
//! metadata store. Blank lines and lines starting with `#` are skipped.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use cassava_common::{
    CassavaError, INSTANCE_FILE_PREFIX, Result, SERVICE_FILE_PREFIX, SERVICE_INDEX_PREFIX,
};
use cassava_quota::key::parse_service_key;
use cassava_quota::{
    EventHandler, EventType, KvEvent, MemoryMetadataManager, MicroService, ResourceKind,
};

use super::ShutdownSignal;

#[derive(Debug, Deserialize)]
struct ReplayRecord {
    #[serde(rename = "type")]
    event_type: EventType,
    #[serde(default)]
    kind: Option<ResourceKind>,
    key: String,
    #[serde(default)]
    value: serde_json::Value,
    #[serde(default)]
    revision: i64,
}

fn infer_kind(key: &str) -> Option<ResourceKind> {
    if key.starts_with(SERVICE_FILE_PREFIX) {
        Some(ResourceKind::ServiceRecord)
    } else if key.starts_with(SERVICE_INDEX_PREFIX) {
        Some(ResourceKind::ServiceIndex)
    } else if key.starts_with(INSTANCE_FILE_PREFIX) {
        Some(ResourceKind::Instance)
    } else {
        None
    }
}

/// Decode one line into an event
///
/// Returns `Ok(None)` for blank and comment lines.
pub fn decode_line(line: &str) -> Result<Option<KvEvent>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let record: ReplayRecord = serde_json::from_str(line)
        .map_err(|e| CassavaError::IllegalArgument(format!("invalid replay record: {}", e)))?;

    let kind = match record.kind.or_else(|| infer_kind(&record.key)) {
        Some(kind) => kind,
        None => {
            return Err(CassavaError::malformed_key(
                record.key,
                "cannot infer resource kind",
            ));
        }
    };

    let value = match record.value {
        serde_json::Value::Null => Vec::new(),
        serde_json::Value::String(s) => s.into_bytes(),
        other => {
            serde_json::to_vec(&other).map_err(|e| CassavaError::InternalError(e.to_string()))?
        }
    };

    Ok(Some(
        KvEvent::new(record.event_type, kind, record.key, value).with_revision(record.revision),
    ))
}

/// Counters of one replay run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub lines: u64,
    pub events: u64,
    pub services: u64,
    pub skipped: u64,
}

/// Read lines from `reader` and send their events to `tx`
///
/// Bad lines are logged and skipped. Stops early on shutdown or when the
/// receiving side is gone.
pub async fn replay_events<R>(
    reader: R,
    tx: &mpsc::Sender<KvEvent>,
    shutdown: &ShutdownSignal,
) -> Result<ReplayStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut stats = ReplayStats::default();
    let mut lines = reader.lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| CassavaError::InternalError(format!("read replay input: {}", e)))?
    {
        if shutdown.is_shutdown() {
            warn!(lines = stats.lines, "Replay interrupted by shutdown");
            break;
        }
        stats.lines += 1;

        match decode_line(&line) {
            Ok(Some(event)) => {
                let is_service = event.kind == ResourceKind::ServiceRecord;
                if tx.send(event).await.is_err() {
                    warn!("Event feed closed, replay stopped");
                    break;
                }
                stats.events += 1;
                if is_service {
                    stats.services += 1;
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(line = stats.lines, code = e.code().code, error = %e, "Skipping replay line");
                stats.skipped += 1;
            }
        }
    }

    info!(
        lines = stats.lines,
        events = stats.events,
        services = stats.services,
        skipped = stats.skipped,
        "Replay finished"
    );
    Ok(stats)
}

/// Applies service record events to the in-memory metadata store
pub struct ServiceRecordHandler {
    metadata: Arc<MemoryMetadataManager>,
}

impl ServiceRecordHandler {
    pub fn new(metadata: Arc<MemoryMetadataManager>) -> Self {
        Self { metadata }
    }

    fn apply(&self, event: &KvEvent) -> Result<()> {
        let key = parse_service_key(&event.key)?;
        match event.event_type {
            EventType::Delete => {
                self.metadata.unregister_service(&key.tenant, &key.service_id);
                debug!(service = %key, "Service record removed");
            }
            EventType::Unknown => {}
            _ => {
                let mut service: MicroService =
                    serde_json::from_slice(&event.value).map_err(|e| {
                        CassavaError::IllegalArgument(format!(
                            "invalid service record {}: {}",
                            key, e
                        ))
                    })?;
                if service.service_id.is_empty() {
                    service.service_id = key.service_id.clone();
                }
                self.metadata.register_service(&key.tenant, service);
                debug!(service = %key, "Service record registered");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl EventHandler for ServiceRecordHandler {
    fn kind(&self) -> ResourceKind {
        ResourceKind::ServiceRecord
    }

    async fn on_event(&self, event: &KvEvent) {
        if let Err(e) = self.apply(event) {
            warn!(
                code = e.code().code,
                error = %e,
                revision = event.revision,
                "Dropping service record event"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cassava_quota::{GetServiceRequest, MetadataManager};

    #[test]
    fn test_decode_instance_event() {
        let event = decode_line(
            r#"{"type":"CREATE","key":"/cse-sr/inst/files/t1/p1/s1/i1","value":{"a":1},"revision":7}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(event.event_type, EventType::Create);
        assert_eq!(event.kind, ResourceKind::Instance);
        assert_eq!(event.revision, 7);
        assert_eq!(event.value_str(), Some(r#"{"a":1}"#));
    }

    #[test]
    fn test_decode_service_index_string_value() {
        let event = decode_line(
            r#"{"type":"INIT","key":"/cse-sr/ms/indexes/t1/p1//app/svc/1.0","value":"s1"}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(event.kind, ResourceKind::ServiceIndex);
        assert_eq!(event.value_str(), Some("s1"));
    }

    #[test]
    fn test_decode_service_record() {
        let event = decode_line(
            r#"{"type":"CREATE","key":"/cse-sr/ms/files/default/default/sc-1","value":{"appId":"default"}}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(event.kind, ResourceKind::ServiceRecord);
    }

    #[test]
    fn test_decode_skips_comments_and_rejects_garbage() {
        assert!(decode_line("").unwrap().is_none());
        assert!(decode_line("# see /cse-sr/ms/files/default/default/sc-1").unwrap().is_none());
        assert!(decode_line("not json").is_err());
        assert!(matches!(
            decode_line(r#"{"type":"CREATE","key":"/other/key"}"#),
            Err(CassavaError::MalformedKey { .. })
        ));
    }

    #[tokio::test]
    async fn test_service_record_handler_updates_metadata() {
        let metadata = Arc::new(MemoryMetadataManager::new());
        let handler = ServiceRecordHandler::new(metadata.clone());

        let create = decode_line(
            r#"{"type":"CREATE","key":"/cse-sr/ms/files/default/default/sc-1","value":{"appId":"default","serviceName":"SERVICECENTER","version":"1.0"}}"#,
        )
        .unwrap()
        .unwrap();
        handler.on_event(&create).await;

        let resp = metadata
            .get_service(GetServiceRequest {
                tenant: "default/default".to_string(),
                service_id: "sc-1".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(resp.service.unwrap().service_id, "sc-1");

        // an undecodable record leaves the store as it was
        handler
            .on_event(&KvEvent::new(
                EventType::Update,
                ResourceKind::ServiceRecord,
                "/cse-sr/ms/files/default/default/sc-1",
                "not json",
            ))
            .await;
        assert_eq!(metadata.len(), 1);

        let delete = decode_line(r#"{"type":"DELETE","key":"/cse-sr/ms/files/default/default/sc-1"}"#)
            .unwrap()
            .unwrap();
        handler.on_event(&delete).await;
        assert!(metadata.is_empty());
    }

    #[tokio::test]
    async fn test_replay_stream() {
        let input = concat!(
            "{\"type\":\"INIT\",\"key\":\"/cse-sr/ms/files/t1/p1/s1\",\"value\":{\"appId\":\"a\",\"serviceName\":\"n\",\"version\":\"1\"}}\n",
            "# mentions /cse-sr/ms/files/t1/p1/s2 but is a comment\n",
            "{\"type\":\"INIT\",\"key\":\"/cse-sr/inst/files/t1/p1/s1/i1\",\"value\":{\"note\":\"/cse-sr/ms/files/x\"}}\n",
            "broken\n",
            "\n",
            "{\"type\":\"DELETE\",\"key\":\"/cse-sr/inst/files/t1/p1/s1/i1\"}\n",
        );
        let (tx, mut rx) = mpsc::channel(8);
        let stats = replay_events(input.as_bytes(), &tx, &ShutdownSignal::new())
            .await
            .unwrap();
        assert_eq!(
            stats,
            ReplayStats {
                lines: 6,
                events: 3,
                services: 1,
                skipped: 1,
            }
        );
        assert_eq!(rx.recv().await.unwrap().kind, ResourceKind::ServiceRecord);
        assert_eq!(rx.recv().await.unwrap().event_type, EventType::Init);
        assert_eq!(rx.recv().await.unwrap().event_type, EventType::Delete);
    }
}
