//! Event feed dispatch
//!
//! [`EventFeed`] is the dispatch table from resource kind to the handlers
//! registered for it. Handlers are added once at startup; afterwards the feed
//! is shared behind an `Arc` and driven by [`EventFeed::run`].

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace};

use cassava_common::{INSTANCE_FILE_PREFIX, SERVICE_FILE_PREFIX, SPLIT};

use crate::handler::EventHandler;
use crate::model::{KvEvent, ResourceKind};

const WORKER_QUEUE_SIZE: usize = 1024;

#[derive(Default)]
pub struct EventFeed {
    handlers: HashMap<ResourceKind, Vec<Arc<dyn EventHandler>>>,
}

impl EventFeed {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for the kind it declares
    pub fn add_event_handler(&mut self, handler: Arc<dyn EventHandler>) {
        let kind = handler.kind();
        let handlers = self.handlers.entry(kind).or_default();
        handlers.push(handler);
        info!(%kind, total = handlers.len(), "Registered event handler");
    }

    pub fn handler_count(&self, kind: ResourceKind) -> usize {
        self.handlers.get(&kind).map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Deliver one event to every handler of its kind
    ///
    /// Returns the number of handlers invoked.
    pub async fn dispatch(&self, event: &KvEvent) -> usize {
        let Some(handlers) = self.handlers.get(&event.kind) else {
            trace!(
                kind = %event.kind,
                key = %event.key,
                revision = event.revision,
                "No handler for event"
            );
            return 0;
        };
        for handler in handlers {
            handler.on_event(event).await;
        }
        handlers.len()
    }

    /// Consume events until the channel closes or shutdown is signalled
    ///
    /// Dropping the shutdown sender counts as a shutdown signal.
    ///
    /// With `workers > 1` events are spread over worker tasks by a hash of
    /// the service they belong to, so a service record and the instances of
    /// that service keep their relative order while different services run
    /// in parallel. Returns the number of events consumed.
    pub async fn run(
        self: Arc<Self>,
        mut rx: mpsc::Receiver<KvEvent>,
        mut shutdown: watch::Receiver<bool>,
        workers: usize,
    ) -> u64 {
        if *shutdown.borrow() {
            info!("Event feed not started, shutdown already signalled");
            return 0;
        }

        if workers <= 1 {
            let mut processed = 0u64;
            loop {
                tokio::select! {
                    event = rx.recv() => match event {
                        Some(event) => {
                            self.dispatch(&event).await;
                            processed += 1;
                        }
                        None => break,
                    },
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!(processed, "Event feed stopped");
            return processed;
        }

        let mut senders = Vec::with_capacity(workers);
        let mut tasks = Vec::with_capacity(workers);
        for id in 0..workers {
            let (tx, mut worker_rx) = mpsc::channel::<KvEvent>(WORKER_QUEUE_SIZE);
            let feed = self.clone();
            senders.push(tx);
            tasks.push(tokio::spawn(async move {
                while let Some(event) = worker_rx.recv().await {
                    feed.dispatch(&event).await;
                }
                debug!(worker = id, "Event worker stopped");
            }));
        }

        let mut processed = 0u64;
        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => {
                        let slot = worker_slot(&event, workers);
                        if senders[slot].send(event).await.is_err() {
                            break;
                        }
                        processed += 1;
                    }
                    None => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        // Closing the worker channels lets workers drain what they hold.
        drop(senders);
        for task in tasks {
            let _ = task.await;
        }
        info!(processed, workers, "Event feed stopped");
        processed
    }
}

/// Part of the key that decides the worker: `{domain}/{project}/{serviceId}`
/// for service records and instances, the whole key otherwise
fn routing_key(event: &KvEvent) -> &str {
    let key = event.key.as_str();
    match event.kind {
        ResourceKind::ServiceRecord => key.strip_prefix(SERVICE_FILE_PREFIX).unwrap_or(key),
        ResourceKind::Instance => key
            .strip_prefix(INSTANCE_FILE_PREFIX)
            .and_then(|rest| rest.rsplit_once(SPLIT))
            .map(|(service, _)| service)
            .unwrap_or(key),
        _ => key,
    }
}

fn worker_slot(event: &KvEvent, workers: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    routing_key(event).hash(&mut hasher);
    (hasher.finish() % workers as u64) as usize
}
