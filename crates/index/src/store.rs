//! Persistence collaborator contract for the page collection, plus an
//! in-memory implementation with an entity-term index.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use extract::{AggregatedKnowledge, entity_key, hostname, normalize_url};
use ingest::DocumentPart;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Canonical stored representation of a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRecord {
    pub url: String,
    pub title: String,
    pub domain: Option<String>,
    pub knowledge: AggregatedKnowledge,
    pub chunks: Vec<DocumentPart>,
    pub has_code: bool,
    pub visited_at: DateTime<Utc>,
    pub indexed_at: DateTime<Utc>,
}

/// What the extraction pipeline hands over for saving.
#[derive(Debug, Clone)]
pub struct PageUpsert {
    pub url: String,
    pub title: String,
    pub knowledge: AggregatedKnowledge,
    pub parts: Vec<DocumentPart>,
    pub has_code: bool,
    pub visited_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexUpdateReport {
    pub errors: Vec<String>,
}

impl IndexUpdateReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistMode {
    Incremental,
    FullRebuild,
}

#[derive(Debug, Clone, Serialize)]
pub struct PersistReport {
    pub url: String,
    pub is_new: bool,
    pub mode: PersistMode,
}

#[async_trait]
pub trait PageStore: Send + Sync {
    async fn get_page(&self, url: &str) -> Result<Option<PageRecord>>;

    async fn list_pages(&self) -> Result<Vec<PageRecord>>;

    /// Apply one page to the search index without touching other pages.
    async fn update_incremental(&self, page: &PageRecord, is_new: bool) -> Result<IndexUpdateReport>;

    /// Store `page` and rebuild the whole index from the collection.
    async fn rebuild_collection(&self, page: &PageRecord) -> Result<()>;
}

/// Save a page: check existence, build the canonical record (keeping any
/// chunk boundaries the stored page already has), update incrementally and
/// fall back to a full rebuild only when the incremental update reports errors.
pub async fn persist_page(store: &dyn PageStore, upsert: PageUpsert) -> Result<PersistReport> {
    let url = normalize_url(&upsert.url);
    let existing = store
        .get_page(&url)
        .await
        .with_context(|| format!("Failed to look up {}", url))?;
    let is_new = existing.is_none();

    let chunks = match existing.as_ref().map(|p| &p.chunks) {
        Some(chunks) if !chunks.is_empty() => chunks.clone(),
        _ if !upsert.parts.is_empty() => upsert.parts,
        _ => vec![DocumentPart::new(
            &url,
            upsert.knowledge.summary.clone(),
            (0, upsert.knowledge.summary.len()),
        )],
    };

    let record = PageRecord {
        domain: hostname(&url),
        url: url.clone(),
        title: upsert.title,
        knowledge: upsert.knowledge,
        chunks,
        has_code: upsert.has_code,
        visited_at: upsert.visited_at,
        indexed_at: Utc::now(),
    };

    let incremental_errors = match store.update_incremental(&record, is_new).await {
        Ok(report) if report.is_ok() => {
            info!(url = %url, is_new, "Page indexed incrementally");
            return Ok(PersistReport {
                url,
                is_new,
                mode: PersistMode::Incremental,
            });
        }
        Ok(report) => report.errors.join("; "),
        Err(e) => format!("{:#}", e),
    };

    warn!(url = %url, errors = %incremental_errors, "Incremental index update failed, rebuilding collection");

    store
        .rebuild_collection(&record)
        .await
        .with_context(|| format!("Full rebuild after incremental failure ({}) also failed", incremental_errors))?;

    Ok(PersistReport {
        url,
        is_new,
        mode: PersistMode::FullRebuild,
    })
}

/// Process-local page store. Keeps an entity-name → page-URL term index.
#[derive(Default)]
pub struct InMemoryPageStore {
    pages: DashMap<String, PageRecord>,
    terms: DashMap<String, BTreeSet<String>>,
}

impl InMemoryPageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// URLs of pages mentioning an entity (case-insensitive).
    pub fn pages_mentioning(&self, entity: &str) -> Vec<String> {
        self.terms
            .get(&entity_key(entity))
            .map(|urls| urls.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn index_terms(&self, page: &PageRecord) {
        for entity in &page.knowledge.entities {
            self.terms
                .entry(entity.key())
                .or_default()
                .insert(page.url.clone());
        }
    }

    fn unindex_terms(&self, url: &str) {
        self.terms.retain(|_, urls| {
            urls.remove(url);
            !urls.is_empty()
        });
    }
}

#[async_trait]
impl PageStore for InMemoryPageStore {
    async fn get_page(&self, url: &str) -> Result<Option<PageRecord>> {
        Ok(self.pages.get(url).map(|p| p.value().clone()))
    }

    async fn list_pages(&self) -> Result<Vec<PageRecord>> {
        let mut pages: Vec<PageRecord> = self.pages.iter().map(|p| p.value().clone()).collect();
        pages.sort_by(|a, b| a.url.cmp(&b.url));
        Ok(pages)
    }

    async fn update_incremental(&self, page: &PageRecord, is_new: bool) -> Result<IndexUpdateReport> {
        let mut report = IndexUpdateReport::default();
        if page.url.is_empty() {
            report.errors.push("page has no url".to_string());
            return Ok(report);
        }

        if !is_new {
            self.unindex_terms(&page.url);
        }
        self.index_terms(page);
        self.pages.insert(page.url.clone(), page.clone());
        Ok(report)
    }

    async fn rebuild_collection(&self, page: &PageRecord) -> Result<()> {
        if page.url.is_empty() {
            anyhow::bail!("cannot store a page without a url");
        }
        self.pages.insert(page.url.clone(), page.clone());

        self.terms.clear();
        for entry in self.pages.iter() {
            self.index_terms(entry.value());
        }
        info!(pages = self.pages.len(), "Rebuilt page collection index");
        Ok(())
    }
}
