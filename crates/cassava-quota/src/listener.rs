//! Startup registration of the counting handlers
//!
//! The handlers are only wired into the feed when the configured quota
//! plugin is the one asking for them; any other plugin counts elsewhere.

use std::sync::Arc;

use tracing::info;

use crate::counter::CounterGroup;
use crate::feed::EventFeed;
use crate::handler::{InstanceEventHandler, ServiceIndexEventHandler};
use crate::metadata::MetadataManager;
use crate::shared::SharedServiceClassifier;

/// Collaborators injected into the counting handlers
#[derive(Clone)]
pub struct CounterListenerDeps {
    pub classifier: Arc<SharedServiceClassifier>,
    pub counters: Arc<CounterGroup>,
    pub metadata: Arc<dyn MetadataManager>,
}

/// Register the service index and instance handlers for `plugin_name`
///
/// Returns whether the handlers were registered.
pub fn register_counter_listener(
    plugin_name: &str,
    configured_plugin: &str,
    feed: &mut EventFeed,
    deps: &CounterListenerDeps,
) -> bool {
    if plugin_name != configured_plugin {
        info!(
            plugin = plugin_name,
            configured = configured_plugin,
            "Quota plugin not selected, counter listener not registered"
        );
        return false;
    }

    feed.add_event_handler(Arc::new(ServiceIndexEventHandler::new(
        deps.classifier.clone(),
        deps.counters.clone(),
    )));
    feed.add_event_handler(Arc::new(InstanceEventHandler::new(
        deps.classifier.clone(),
        deps.counters.clone(),
        deps.metadata.clone(),
    )));
    info!(plugin = plugin_name, "Counter listener registered");
    true
}
