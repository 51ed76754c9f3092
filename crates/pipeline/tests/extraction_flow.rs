mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use common::{MockCapability, long_fragment, short_fragment};
use extract::{ExtractionMode, Phase};
use index::{InMemoryPageStore, IndexUpdateReport, PageRecord, PageStore};
use pipeline::{
    ExtractionOutcome, ExtractionRequest, ExtractionService, NO_CONTENT_MESSAGE, PersistenceStatus, PipelineConfig,
    PipelineError,
};

fn service(capability: Arc<MockCapability>, store: Arc<dyn PageStore>) -> ExtractionService {
    ExtractionService::new(capability, store, PipelineConfig::default())
}

fn request(url: &str, mode: ExtractionMode, fragments: Vec<String>) -> ExtractionRequest {
    ExtractionRequest::new(url, "Test Page", mode, fragments)
}

#[tokio::test(start_paused = true)]
async fn concurrent_requests_for_same_page_share_one_run() {
    let capability = Arc::new(MockCapability::new().with_delay(Duration::from_millis(200)));
    let store = Arc::new(InMemoryPageStore::new());
    let service = service(capability.clone(), store);

    let first = service
        .start_extraction(request(
            "https://x.com/page?q=1#frag1",
            ExtractionMode::Basic,
            vec![long_fragment("Shared page content")],
        ))
        .unwrap();
    let second = service
        .start_extraction(request(
            "https://x.com/page?q=1#frag2",
            ExtractionMode::Basic,
            vec![long_fragment("Shared page content")],
        ))
        .unwrap();

    assert!(!first.joined);
    assert!(second.joined);
    assert_eq!(first.extraction_id, second.extraction_id);

    let (a, b) = tokio::join!(first.wait(), second.wait());
    let a = a.unwrap();
    let b = b.unwrap();

    assert_eq!(capability.calls(), 1);
    assert_eq!(a.knowledge(), b.knowledge());
}

#[tokio::test]
async fn basic_mode_end_to_end() {
    let capability = Arc::new(MockCapability::new());
    let store = Arc::new(InMemoryPageStore::new());
    let service = service(capability.clone(), store.clone());

    let handle = service
        .start_extraction(request(
            "https://x.com/article",
            ExtractionMode::Basic,
            vec![long_fragment("Alpha fragment about graphs"), short_fragment()],
        ))
        .unwrap();
    let extraction_id = handle.extraction_id.clone();

    let outcome = handle.wait().await.unwrap();
    let ExtractionOutcome::Completed(done) = outcome else {
        panic!("expected a completed extraction");
    };

    assert_eq!(capability.calls(), 1);
    assert_eq!(capability.phases_seen(), vec![Phase::Basic]);
    assert!(done.knowledge.summary.contains("Alpha fragment about graphs"));
    assert_eq!(done.knowledge.entities[0].name, "Alpha");
    assert!(matches!(done.persistence, PersistenceStatus::Saved { is_new: true, .. }));

    let stored = store.get_page("https://x.com/article").await.unwrap().unwrap();
    assert_eq!(stored.knowledge, done.knowledge);

    let job = service.jobs().get(&extraction_id).unwrap();
    assert_eq!(job.phase, Phase::Complete);
    assert_eq!(job.processed_items, 1);
    assert_eq!(job.total_items, 1);
    assert!(job.errors.is_empty());
}

#[tokio::test]
async fn all_fragments_filtered_ends_in_error_without_calls() {
    let capability = Arc::new(MockCapability::new());
    let service = service(capability.clone(), Arc::new(InMemoryPageStore::new()));

    let handle = service
        .start_extraction(request("https://x.com/empty", ExtractionMode::Full, vec![short_fragment()]))
        .unwrap();
    let extraction_id = handle.extraction_id.clone();

    assert!(matches!(handle.wait().await, Ok(ExtractionOutcome::NoContent)));
    assert_eq!(capability.calls(), 0);

    let job = service.jobs().get(&extraction_id).unwrap();
    assert_eq!(job.phase, Phase::Error);
    assert_eq!(job.errors[0].message, NO_CONTENT_MESSAGE);
}

#[tokio::test]
async fn capability_failure_surfaces_once_and_skips_persistence() {
    let capability = Arc::new(MockCapability::new().failing_on(Phase::Summary));
    let store = Arc::new(InMemoryPageStore::new());
    let service = service(capability.clone(), store.clone());

    let handle = service
        .start_extraction(request(
            "https://x.com/broken",
            ExtractionMode::Summary,
            vec![long_fragment("Beta content")],
        ))
        .unwrap();
    let extraction_id = handle.extraction_id.clone();

    match handle.wait().await {
        Err(PipelineError::Capability { phase, message }) => {
            assert_eq!(phase, Phase::Summary);
            assert!(message.contains("model unavailable"));
        }
        other => panic!("expected capability failure, got {:?}", other),
    }

    let job = service.jobs().get(&extraction_id).unwrap();
    assert_eq!(job.phase, Phase::Error);
    assert_eq!(job.errors.len(), 1);
    assert!(store.is_empty());
}

#[tokio::test]
async fn full_mode_runs_every_phase_with_monotonic_progress() {
    let capability = Arc::new(MockCapability::new());
    let service = service(capability.clone(), Arc::new(InMemoryPageStore::new()));
    let mut events = service.jobs().subscribe();

    let fragments = (0..4).map(|i| long_fragment(&format!("Fragment{} text", i))).collect();
    let handle = service
        .start_extraction(request("https://x.com/long", ExtractionMode::Full, fragments))
        .unwrap();
    handle.wait().await.unwrap();

    assert_eq!(
        capability.phases_seen(),
        vec![Phase::Basic, Phase::Summary, Phase::Analyzing, Phase::Extracting]
    );
    assert_eq!(capability.calls(), 16);
    assert!(capability.max_in_flight() <= 3);

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push((event.phase, event.processed_items, event.total_items));
    }

    assert!(seen.windows(2).all(|w| w[0].0 <= w[1].0 && w[0].1 <= w[1].1));
    assert_eq!(seen.last(), Some(&(Phase::Complete, 16, 16)));
}

#[tokio::test]
async fn save_to_index_false_skips_persistence() {
    let store = Arc::new(InMemoryPageStore::new());
    let service = service(Arc::new(MockCapability::new()), store.clone());

    let mut req = request("https://x.com/private", ExtractionMode::Basic, vec![long_fragment("Gamma")]);
    req.save_to_index = Some(false);

    let outcome = service.start_extraction(req).unwrap().wait().await.unwrap();
    let ExtractionOutcome::Completed(done) = outcome else {
        panic!("expected a completed extraction");
    };

    assert!(matches!(done.persistence, PersistenceStatus::Skipped));
    assert!(store.is_empty());
}

struct BrokenStore;

#[async_trait]
impl PageStore for BrokenStore {
    async fn get_page(&self, _url: &str) -> Result<Option<PageRecord>> {
        Ok(None)
    }

    async fn list_pages(&self) -> Result<Vec<PageRecord>> {
        Ok(Vec::new())
    }

    async fn update_incremental(&self, _page: &PageRecord, _is_new: bool) -> Result<IndexUpdateReport> {
        Ok(IndexUpdateReport {
            errors: vec!["segment locked".into()],
        })
    }

    async fn rebuild_collection(&self, _page: &PageRecord) -> Result<()> {
        bail!("disk full")
    }
}

#[tokio::test]
async fn persistence_failure_still_returns_knowledge() {
    let service = service(Arc::new(MockCapability::new()), Arc::new(BrokenStore));

    let handle = service
        .start_extraction(request("https://x.com/page", ExtractionMode::Basic, vec![long_fragment("Delta")]))
        .unwrap();
    let extraction_id = handle.extraction_id.clone();

    let ExtractionOutcome::Completed(done) = handle.wait().await.unwrap() else {
        panic!("expected a completed extraction");
    };

    assert!(matches!(done.persistence, PersistenceStatus::Failed { .. }));
    assert_eq!(done.knowledge.entities[0].name, "Delta");

    let job = service.jobs().get(&extraction_id).unwrap();
    assert_eq!(job.phase, Phase::Complete);
    assert_eq!(job.errors.len(), 1);
}
