use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use extract::{AggregatedKnowledge, Relationship, normalize_url};
use index::{PageRecord, PageStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::strategies::{
    AnalysisType, CurrentPage, DiscoveryStrategy, DomainStrategy, EntityStrategy, RelatedPage, TechnicalStrategy,
    TemporalStrategy, TopicStrategy,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryRequest {
    pub current_url: String,
    pub current_knowledge: AggregatedKnowledge,
    #[serde(default)]
    pub max_results: Option<usize>,
    /// Overrides the stored page's code flag for the technical strategy.
    #[serde(default)]
    pub has_code: Option<bool>,
}

/// One bucket of related pages found by a single strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipResult {
    pub related_pages: Vec<RelatedPage>,
    pub relationships: Vec<Relationship>,
    pub confidence: f64,
    pub analysis_type: AnalysisType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryConfig {
    pub default_max_results: usize,
    pub temporal_window_days: f64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            default_max_results: 10,
            temporal_window_days: crate::strategies::TEMPORAL_WINDOW_DAYS,
        }
    }
}

pub struct RelationshipDiscovery {
    store: Arc<dyn PageStore>,
    strategies: Vec<Box<dyn DiscoveryStrategy>>,
    config: DiscoveryConfig,
}

impl RelationshipDiscovery {
    pub fn new(store: Arc<dyn PageStore>, config: DiscoveryConfig) -> Self {
        let strategies: Vec<Box<dyn DiscoveryStrategy>> = vec![
            Box::new(DomainStrategy),
            Box::new(TopicStrategy),
            Box::new(EntityStrategy),
            Box::new(TechnicalStrategy),
            Box::new(TemporalStrategy {
                window_days: config.temporal_window_days,
            }),
        ];
        Self::with_strategies(store, strategies, config)
    }

    pub fn with_strategies(
        store: Arc<dyn PageStore>,
        strategies: Vec<Box<dyn DiscoveryStrategy>>,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            store,
            strategies,
            config,
        }
    }

    /// Run every applicable strategy against the stored collection.
    ///
    /// Never fails: a strategy that errors is logged and contributes no
    /// bucket, and an unreadable store yields no buckets at all.
    pub async fn discover(&self, request: &DiscoveryRequest) -> Vec<RelationshipResult> {
        let max_results = request.max_results.unwrap_or(self.config.default_max_results);
        if max_results == 0 {
            return Vec::new();
        }

        let pages = match self.store.list_pages().await {
            Ok(pages) => pages,
            Err(e) => {
                warn!("Relationship discovery could not load pages: {:#}", e);
                return Vec::new();
            }
        };

        let current_key = normalize_url(&request.current_url);
        let has_code = request.has_code.unwrap_or_else(|| {
            pages
                .iter()
                .find(|p| normalize_url(&p.url) == current_key)
                .is_some_and(|p| p.has_code)
        });

        let current = CurrentPage {
            url: &request.current_url,
            knowledge: &request.current_knowledge,
            has_code,
            now: Utc::now(),
        };
        let candidates: Vec<&PageRecord> = pages.iter().filter(|p| normalize_url(&p.url) != current_key).collect();

        let mut results: Vec<RelationshipResult> = self
            .strategies
            .iter()
            .filter(|s| s.applies(&current))
            .filter_map(|strategy| self.run_strategy(strategy.as_ref(), &current, &candidates, max_results))
            .collect();

        results.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        debug!(
            url = %request.current_url,
            candidates = candidates.len(),
            buckets = results.len(),
            "Relationship discovery complete"
        );
        results
    }

    fn run_strategy(
        &self,
        strategy: &dyn DiscoveryStrategy,
        current: &CurrentPage<'_>,
        candidates: &[&PageRecord],
        max_results: usize,
    ) -> Option<RelationshipResult> {
        let analysis_type = strategy.analysis_type();

        let scored = match strategy.score(current, candidates) {
            Ok(scored) => scored,
            Err(e) => {
                warn!(strategy = analysis_type.as_str(), "Discovery strategy failed: {:#}", e);
                return None;
            }
        };

        let mut ranked = dedupe_by_url(scored);
        if ranked.is_empty() {
            return None;
        }
        ranked.sort_by(|a, b| b.similarity.total_cmp(&a.similarity).then_with(|| a.url.cmp(&b.url)));
        ranked.truncate(max_results);

        let relationships = ranked
            .iter()
            .map(|page| {
                Relationship::new(
                    current.url,
                    analysis_type.relationship_label(),
                    page.url.as_str(),
                    page.similarity,
                )
            })
            .collect();

        Some(RelationshipResult {
            confidence: strategy.confidence(&ranked),
            related_pages: ranked,
            relationships,
            analysis_type,
        })
    }
}

/// Keep the best-scoring entry per normalized URL.
fn dedupe_by_url(pages: Vec<RelatedPage>) -> Vec<RelatedPage> {
    let mut best: HashMap<String, RelatedPage> = HashMap::new();
    for page in pages {
        let key = normalize_url(&page.url);
        match best.get(&key) {
            Some(existing) if existing.similarity >= page.similarity => {}
            _ => {
                best.insert(key, page);
            }
        }
    }
    best.into_values().collect()
}

#[cfg(test)]
mod tests {
    use anyhow::{Result, bail};
    use chrono::{DateTime, Duration};
    use extract::Entity;
    use index::{InMemoryPageStore, PageUpsert, persist_page};

    use super::*;

    async fn store_with(pages: &[(&str, &[&str], &[&str], DateTime<Utc>)]) -> Arc<InMemoryPageStore> {
        let store = Arc::new(InMemoryPageStore::new());
        for (url, topics, entities, visited_at) in pages {
            let knowledge = AggregatedKnowledge {
                topics: topics.iter().map(|t| t.to_string()).collect(),
                entities: entities.iter().map(|e| Entity::new(*e, "CONCEPT", 0.8)).collect(),
                summary: "summary".into(),
                ..Default::default()
            };
            let upsert = PageUpsert {
                url: url.to_string(),
                title: url.to_string(),
                knowledge,
                parts: Vec::new(),
                has_code: false,
                visited_at: *visited_at,
            };
            persist_page(store.as_ref(), upsert).await.unwrap();
        }
        store
    }

    fn request(url: &str, topics: &[&str], entities: &[&str]) -> DiscoveryRequest {
        DiscoveryRequest {
            current_url: url.to_string(),
            current_knowledge: AggregatedKnowledge {
                topics: topics.iter().map(|t| t.to_string()).collect(),
                entities: entities.iter().map(|e| Entity::new(*e, "CONCEPT", 0.8)).collect(),
                ..Default::default()
            },
            max_results: None,
            has_code: Some(false),
        }
    }

    #[tokio::test]
    async fn test_current_page_is_excluded() {
        let now = Utc::now();
        let store = store_with(&[
            ("https://a.com/page", &["rust"], &["Tokio"], now),
            ("https://a.com/other", &["rust"], &["Tokio"], now),
        ])
        .await;
        let engine = RelationshipDiscovery::new(store, DiscoveryConfig::default());

        let results = engine
            .discover(&request("https://a.com/page#section", &["rust"], &["tokio"]))
            .await;

        for bucket in &results {
            assert!(bucket.related_pages.iter().all(|p| p.url == "https://a.com/other"));
        }
        let types: Vec<_> = results.iter().map(|r| r.analysis_type).collect();
        assert!(types.contains(&AnalysisType::Domain));
        assert!(types.contains(&AnalysisType::Topic));
        assert!(types.contains(&AnalysisType::Entity));
        assert!(types.contains(&AnalysisType::Temporal));
        assert!(!types.contains(&AnalysisType::Technical));
    }

    #[tokio::test]
    async fn test_buckets_sorted_and_empty_omitted() {
        let old = Utc::now() - Duration::days(10);
        let store = store_with(&[("https://b.com/x", &["cooking"], &["Basil"], old)]).await;
        let engine = RelationshipDiscovery::new(store, DiscoveryConfig::default());

        let results = engine.discover(&request("https://a.com/page", &["cooking"], &["basil"])).await;

        let types: Vec<_> = results.iter().map(|r| r.analysis_type).collect();
        assert_eq!(types, vec![AnalysisType::Topic, AnalysisType::Entity]);
        assert!(results.windows(2).all(|w| w[0].confidence >= w[1].confidence));
        assert_eq!(results[0].relationships[0].relationship, "shares_topics");
    }

    #[tokio::test]
    async fn test_max_results_truncates() {
        let now = Utc::now();
        let store = store_with(&[
            ("https://a.com/1", &[], &[], now),
            ("https://a.com/2", &[], &[], now),
            ("https://a.com/3", &[], &[], now),
        ])
        .await;
        let engine = RelationshipDiscovery::new(store, DiscoveryConfig::default());
        let mut req = request("https://a.com/page", &[], &[]);
        req.max_results = Some(2);

        let results = engine.discover(&req).await;
        assert!(results.iter().all(|r| r.related_pages.len() == 2));
    }

    struct Exploding;

    impl DiscoveryStrategy for Exploding {
        fn analysis_type(&self) -> AnalysisType {
            AnalysisType::Technical
        }

        fn applies(&self, _current: &CurrentPage<'_>) -> bool {
            true
        }

        fn score(&self, _current: &CurrentPage<'_>, _candidates: &[&PageRecord]) -> Result<Vec<RelatedPage>> {
            bail!("scoring exploded")
        }
    }

    #[tokio::test]
    async fn test_failing_strategy_does_not_abort_others() {
        let store = store_with(&[("https://a.com/other", &[], &[], Utc::now())]).await;
        let engine = RelationshipDiscovery::with_strategies(
            store,
            vec![Box::new(Exploding), Box::new(DomainStrategy)],
            DiscoveryConfig::default(),
        );

        let results = engine.discover(&request("https://a.com/page", &[], &[])).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].analysis_type, AnalysisType::Domain);
        assert_eq!(results[0].confidence, 0.8);
    }
}
