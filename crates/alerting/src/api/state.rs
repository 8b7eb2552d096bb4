use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::datasource::MemoryDataSource;
use crate::metrics::AlertingMetrics;
use crate::notify::NotificationService;

#[derive(Clone)]
pub struct ApiState {
    pub metrics: Arc<AlertingMetrics>,
    pub sources: Arc<BTreeMap<String, Arc<MemoryDataSource>>>,
    pub notifications: Arc<NotificationService>,
    ready: Arc<AtomicBool>,
}

impl ApiState {
    pub fn new(
        metrics: Arc<AlertingMetrics>,
        sources: BTreeMap<String, Arc<MemoryDataSource>>,
        notifications: Arc<NotificationService>,
        ready: Arc<AtomicBool>,
    ) -> Self {
        Self {
            metrics,
            sources: Arc::new(sources),
            notifications,
            ready,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}
