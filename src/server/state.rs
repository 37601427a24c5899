use std::sync::Arc;

use crate::config::Settings;
use crate::queue::QueueManager;
use crate::registry::SubscriberRegistry;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub manager: Arc<QueueManager>,
    pub registry: Arc<SubscriberRegistry>,
}

impl AppState {
    pub fn new(settings: Settings, store: Arc<dyn Store>) -> Self {
        Self {
            settings: Arc::new(settings),
            manager: Arc::new(QueueManager::new(store)),
            registry: Arc::new(SubscriberRegistry::new()),
        }
    }
}
