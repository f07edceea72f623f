use std::sync::Arc;

use crate::ledger::FjallStore;
use crate::observability::Metrics;
use crate::replication::Manager;

#[derive(Clone)]
pub struct AppState {
    pub manager: Manager,
    pub store: FjallStore,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(manager: Manager, store: FjallStore) -> Self {
        let metrics = manager.metrics();
        Self {
            manager,
            store,
            metrics,
        }
    }
}
