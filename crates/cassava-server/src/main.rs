use std::sync::Arc;

use tokio::io::{AsyncBufRead, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use cassava_quota::{MemoryMetadataManager, QuotaEngine};
use cassava_server::config::Configuration;
use cassava_server::metrics;
use cassava_server::startup::{
    ServiceRecordHandler, ShutdownSignal, init_logging, replay_events, spawn_signal_listener,
};

const EVENT_CHANNEL_SIZE: usize = 4096;

async fn open_replay(path: &str) -> anyhow::Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    if path == "-" {
        return Ok(Box::new(BufReader::new(tokio::io::stdin())));
    }
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| anyhow::anyhow!("open replay file {}: {}", path, e))?;
    Ok(Box::new(BufReader::new(file)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let configuration = Configuration::new()?;

    let _log_guard = init_logging(&configuration.logging_config())
        .map_err(|e| anyhow::anyhow!("init logging: {}", e))?;

    let engine_config = configuration.quota_engine_config();
    let prometheus = if engine_config.metrics_enabled {
        let handle = metrics::install_recorder()?;
        metrics::init_metrics();
        Some(handle)
    } else {
        None
    };

    let metadata = Arc::new(MemoryMetadataManager::new());
    let mut engine = QuotaEngine::new(&engine_config, metadata.clone());
    engine.add_event_handler(Arc::new(ServiceRecordHandler::new(metadata)))?;
    if engine.is_active() {
        info!(
            plugin = %engine_config.plugin,
            shared = ?engine.classifier().policy().names().collect::<Vec<_>>(),
            workers = engine_config.workers,
            "Quota engine started"
        );
    } else {
        warn!(
            plugin = %engine_config.plugin,
            "Quota plugin is not buildin, events will not be counted"
        );
    }

    let shutdown = ShutdownSignal::new();
    spawn_signal_listener(shutdown.clone());

    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
    let feed = engine.spawn(rx, shutdown.subscribe());

    let replay_file = configuration.replay_file();
    let reader = open_replay(&replay_file).await?;
    let stats = replay_events(reader, &tx, &shutdown).await?;
    drop(tx);

    let processed = feed.await?;
    info!(processed, source = %replay_file, "Event feed drained");

    metrics::record_replay(&stats);
    metrics::set_shared_services(engine.classifier().len());

    let usage = engine.checker().usage();
    for entry in &usage {
        info!(
            kind = %entry.kind,
            tenant = %entry.tenant,
            used = entry.used,
            limit = entry.limit,
            remaining = entry.remaining,
            "Usage"
        );
    }
    println!("{}", serde_json::to_string_pretty(&usage)?);

    if let Some(handle) = prometheus {
        tracing::debug!("Metrics:\n{}", handle.render());
    }

    Ok(())
}
