// src/state.rs
use std::sync::Arc;

use crate::services::query::QueryService;
use crate::services::scheduler::RefreshScheduler;
use crate::services::store::OfferingStore;
use crate::services::suitability::SuitabilityAnalyzer;

/// Everything the request handlers share. Built once in `main`.
pub struct AppState {
    pub store: Arc<OfferingStore>,
    pub query: QueryService,
    pub analyzer: SuitabilityAnalyzer,
    pub scheduler: Option<Arc<RefreshScheduler>>,
}

impl AppState {
    pub fn new(store: Arc<OfferingStore>, query: QueryService) -> Self {
        AppState {
            store,
            query,
            analyzer: SuitabilityAnalyzer::default(),
            scheduler: None,
        }
    }

    pub fn with_scheduler(mut self, scheduler: Arc<RefreshScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }
}
