use std::sync::Arc;

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::observability::Metrics;
use crate::registry::Registry;
use crate::relay::RelayStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<Registry>,
    pub dispatcher: Arc<Dispatcher>,
    pub relay: Arc<RelayStore>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(config: Config, relay: RelayStore) -> Self {
        let registry = Registry::new(config.coordinator.cooldown());
        let dispatcher = Dispatcher::new(config.coordinator.dispatch_retry.clone());

        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            dispatcher: Arc::new(dispatcher),
            relay: Arc::new(relay),
            metrics: Arc::new(Metrics::new()),
        }
    }
}
