use std::sync::Arc;

use communities::{CommunityDetector, CommunitySummarizer};
use extract::ExtractionCapability;
use index::{CommunityPartitioner, GraphBuilder, PageStore};
use pipeline::ExtractionService;
use query::RelationshipDiscovery;

use crate::config::AppConfig;
use crate::metrics::Metrics;

pub struct AppState {
    pub service: ExtractionService,
    pub store: Arc<dyn PageStore>,
    pub graph: GraphBuilder,
    pub discovery: RelationshipDiscovery,
    pub summarizer: CommunitySummarizer,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(config: &AppConfig, capability: Arc<dyn ExtractionCapability>, store: Arc<dyn PageStore>) -> Arc<Self> {
        let detector: Arc<dyn CommunityPartitioner> = Arc::new(CommunityDetector::new(config.graph.algorithm));

        Arc::new(Self {
            service: ExtractionService::new(capability, store.clone(), config.pipeline.clone()),
            graph: GraphBuilder::new(Some(detector), config.graph.build_config()),
            discovery: RelationshipDiscovery::new(store.clone(), config.discovery.clone()),
            summarizer: CommunitySummarizer::default(),
            metrics: Metrics::new(),
            store,
        })
    }
}
