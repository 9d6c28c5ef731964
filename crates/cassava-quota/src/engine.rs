//! Assembly of the counting engine
//!
//! Owns one classifier, one counter group and one event feed per engine, so
//! separate engines (and separate tests) never share counting state.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use cassava_common::{BUILDIN_QUOTA_PLUGIN, CassavaError, DEFAULT_LOOKUP_TIMEOUT_MS, Result};

use crate::counter::{BuildinCounter, CounterGroup, MetricsCounter};
use crate::feed::EventFeed;
use crate::handler::EventHandler;
use crate::listener::{CounterListenerDeps, register_counter_listener};
use crate::metadata::MetadataManager;
use crate::model::KvEvent;
use crate::quota::{QuotaChecker, QuotaLimits};
use crate::shared::{SharedServiceClassifier, SharedServicePolicy};

#[derive(Debug, Clone)]
pub struct QuotaEngineConfig {
    /// Configured quota plugin; the engine counts only for `buildin`
    pub plugin: String,
    /// Shared service names
    pub shared_services: SharedServicePolicy,
    pub lookup_timeout: Duration,
    pub limits: QuotaLimits,
    /// Publish counts as metrics gauges
    pub metrics_enabled: bool,
    /// Dispatch workers for [`EventFeed::run`]
    pub workers: usize,
}

impl Default for QuotaEngineConfig {
    fn default() -> Self {
        Self {
            plugin: BUILDIN_QUOTA_PLUGIN.to_string(),
            shared_services: SharedServicePolicy::default(),
            lookup_timeout: Duration::from_millis(DEFAULT_LOOKUP_TIMEOUT_MS),
            limits: QuotaLimits::default(),
            metrics_enabled: true,
            workers: 1,
        }
    }
}

pub struct QuotaEngine {
    classifier: Arc<SharedServiceClassifier>,
    counter: Arc<BuildinCounter>,
    counters: Arc<CounterGroup>,
    checker: QuotaChecker,
    feed: Arc<EventFeed>,
    workers: usize,
    active: bool,
}

impl QuotaEngine {
    pub fn new(config: &QuotaEngineConfig, metadata: Arc<dyn MetadataManager>) -> Self {
        let classifier = Arc::new(
            SharedServiceClassifier::new(config.shared_services.clone())
                .with_lookup_timeout(config.lookup_timeout),
        );

        let counter = if config.metrics_enabled {
            Arc::new(BuildinCounter::new().with_usage_gauge())
        } else {
            Arc::new(BuildinCounter::new())
        };
        let mut group = CounterGroup::new();
        group.register(counter.clone());
        if config.metrics_enabled {
            group.register(Arc::new(MetricsCounter::new()));
        }
        let counters = Arc::new(group);

        let deps = CounterListenerDeps {
            classifier: classifier.clone(),
            counters: counters.clone(),
            metadata,
        };
        let mut feed = EventFeed::new();
        let active =
            register_counter_listener(BUILDIN_QUOTA_PLUGIN, &config.plugin, &mut feed, &deps);

        Self {
            checker: QuotaChecker::new(counter.clone(), config.limits.clone()),
            classifier,
            counter,
            counters,
            feed: Arc::new(feed),
            workers: config.workers.max(1),
            active,
        }
    }

    /// Whether the counting handlers are registered
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn classifier(&self) -> &Arc<SharedServiceClassifier> {
        &self.classifier
    }

    pub fn counter(&self) -> &Arc<BuildinCounter> {
        &self.counter
    }

    pub fn counters(&self) -> &Arc<CounterGroup> {
        &self.counters
    }

    pub fn checker(&self) -> &QuotaChecker {
        &self.checker
    }

    pub fn feed(&self) -> &Arc<EventFeed> {
        &self.feed
    }

    /// Register an extra handler on the feed
    ///
    /// Only possible before the feed is spawned.
    pub fn add_event_handler(&mut self, handler: Arc<dyn EventHandler>) -> Result<()> {
        let feed = Arc::get_mut(&mut self.feed).ok_or_else(|| {
            CassavaError::InternalError("event feed already running".to_string())
        })?;
        feed.add_event_handler(handler);
        Ok(())
    }

    /// Deliver a single event synchronously
    pub async fn dispatch(&self, event: &KvEvent) -> usize {
        self.feed.dispatch(event).await
    }

    /// Spawn the feed loop on the current runtime
    pub fn spawn(
        &self,
        rx: mpsc::Receiver<KvEvent>,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<u64> {
        tokio::spawn(self.feed.clone().run(rx, shutdown, self.workers))
    }
}
