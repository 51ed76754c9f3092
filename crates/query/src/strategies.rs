//! The five scoring strategies behind relationship discovery.

use std::collections::HashSet;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use extract::{AggregatedKnowledge, hostname};
use index::PageRecord;
use serde::{Deserialize, Serialize};

use crate::keywords::{is_technical_domain, is_technical_entity_type, is_technical_topic};

pub const TEMPORAL_WINDOW_DAYS: f64 = 7.0;
pub const DOMAIN_SIMILARITY: f64 = 0.9;
pub const DOMAIN_CONFIDENCE: f64 = 0.8;

const TECHNICAL_TOPIC_WEIGHT: f64 = 0.4;
const TECHNICAL_ENTITY_WEIGHT: f64 = 0.3;
const TECHNICAL_DOMAIN_WEIGHT: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisType {
    Domain,
    Topic,
    Entity,
    Technical,
    Temporal,
}

impl AnalysisType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisType::Domain => "domain",
            AnalysisType::Topic => "topic",
            AnalysisType::Entity => "entity",
            AnalysisType::Technical => "technical",
            AnalysisType::Temporal => "temporal",
        }
    }

    /// Relationship label used when linking the current page to a candidate.
    pub fn relationship_label(&self) -> &'static str {
        match self {
            AnalysisType::Domain => "same_domain",
            AnalysisType::Topic => "shares_topics",
            AnalysisType::Entity => "shares_entities",
            AnalysisType::Technical => "technically_related",
            AnalysisType::Temporal => "visited_around",
        }
    }
}

/// A scored candidate page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedPage {
    pub url: String,
    pub title: String,
    pub similarity: f64,
    pub reason: String,
}

/// The page relationships are being discovered for.
pub struct CurrentPage<'a> {
    pub url: &'a str,
    pub knowledge: &'a AggregatedKnowledge,
    pub has_code: bool,
    pub now: DateTime<Utc>,
}

pub trait DiscoveryStrategy: Send + Sync {
    fn analysis_type(&self) -> AnalysisType;

    /// Whether this strategy applies to the current page at all.
    fn applies(&self, current: &CurrentPage<'_>) -> bool;

    /// Score every candidate. Candidates scoring zero are left out.
    fn score(&self, current: &CurrentPage<'_>, candidates: &[&PageRecord]) -> Result<Vec<RelatedPage>>;

    /// Bucket confidence given the ranked candidates (never empty).
    fn confidence(&self, ranked: &[RelatedPage]) -> f64 {
        ranked.iter().map(|p| p.similarity).fold(0.0, f64::max)
    }
}

fn related(page: &PageRecord, similarity: f64, reason: String) -> RelatedPage {
    RelatedPage {
        url: page.url.clone(),
        title: page.title.clone(),
        similarity: similarity.clamp(0.0, 1.0),
        reason,
    }
}

pub struct DomainStrategy;

impl DiscoveryStrategy for DomainStrategy {
    fn analysis_type(&self) -> AnalysisType {
        AnalysisType::Domain
    }

    fn applies(&self, _current: &CurrentPage<'_>) -> bool {
        true
    }

    fn score(&self, current: &CurrentPage<'_>, candidates: &[&PageRecord]) -> Result<Vec<RelatedPage>> {
        let host = hostname(current.url).with_context(|| format!("No hostname in {}", current.url))?;

        Ok(candidates
            .iter()
            .filter(|page| page_host(page).as_deref() == Some(host.as_str()))
            .map(|page| related(page, DOMAIN_SIMILARITY, format!("Same domain: {}", host)))
            .collect())
    }

    fn confidence(&self, _ranked: &[RelatedPage]) -> f64 {
        DOMAIN_CONFIDENCE
    }
}

pub struct TopicStrategy;

impl DiscoveryStrategy for TopicStrategy {
    fn analysis_type(&self) -> AnalysisType {
        AnalysisType::Topic
    }

    fn applies(&self, current: &CurrentPage<'_>) -> bool {
        !current.knowledge.topics.is_empty()
    }

    fn score(&self, current: &CurrentPage<'_>, candidates: &[&PageRecord]) -> Result<Vec<RelatedPage>> {
        let ours: Vec<String> = current.knowledge.topics.iter().map(|t| t.to_lowercase()).collect();

        Ok(candidates
            .iter()
            .filter_map(|page| {
                let theirs: Vec<String> = page.knowledge.topics.iter().map(|t| t.to_lowercase()).collect();
                if theirs.is_empty() {
                    return None;
                }
                let shared: Vec<&String> = ours
                    .iter()
                    .filter(|t| theirs.iter().any(|c| c.contains(t.as_str()) || t.contains(c.as_str())))
                    .collect();
                if shared.is_empty() {
                    return None;
                }
                let similarity = shared.len() as f64 / ours.len().min(theirs.len()) as f64;
                let names: Vec<&str> = shared.iter().map(|s| s.as_str()).collect();
                Some(related(page, similarity, format!("Shared topics: {}", names.join(", "))))
            })
            .collect())
    }
}

pub struct EntityStrategy;

impl DiscoveryStrategy for EntityStrategy {
    fn analysis_type(&self) -> AnalysisType {
        AnalysisType::Entity
    }

    fn applies(&self, current: &CurrentPage<'_>) -> bool {
        !current.knowledge.entities.is_empty()
    }

    fn score(&self, current: &CurrentPage<'_>, candidates: &[&PageRecord]) -> Result<Vec<RelatedPage>> {
        let ours: HashSet<String> = current.knowledge.entities.iter().map(|e| e.key()).collect();

        Ok(candidates
            .iter()
            .filter_map(|page| {
                let theirs: HashSet<String> = page.knowledge.entities.iter().map(|e| e.key()).collect();
                let mut shared: Vec<&String> = ours.intersection(&theirs).collect();
                if shared.is_empty() {
                    return None;
                }
                shared.sort();
                let similarity = shared.len() as f64 / ours.len().min(theirs.len()) as f64;
                let names: Vec<&str> = shared.iter().map(|s| s.as_str()).collect();
                Some(related(page, similarity, format!("Shared entities: {}", names.join(", "))))
            })
            .collect())
    }
}

pub struct TechnicalStrategy;

impl TechnicalStrategy {
    /// Weighted technical indicators for a page, capped at 1.0.
    pub fn technical_score(page: &PageRecord) -> (f64, Vec<&'static str>) {
        let mut score = 0.0;
        let mut indicators = Vec::new();

        if page.knowledge.topics.iter().any(|t| is_technical_topic(t)) {
            score += TECHNICAL_TOPIC_WEIGHT;
            indicators.push("technical topics");
        }
        if page
            .knowledge
            .entities
            .iter()
            .flat_map(|e| e.types.iter())
            .any(|t| is_technical_entity_type(t))
        {
            score += TECHNICAL_ENTITY_WEIGHT;
            indicators.push("technical entities");
        }
        if page_host(page).is_some_and(|h| is_technical_domain(&h)) {
            score += TECHNICAL_DOMAIN_WEIGHT;
            indicators.push("technical domain");
        }

        (f64::min(score, 1.0), indicators)
    }
}

impl DiscoveryStrategy for TechnicalStrategy {
    fn analysis_type(&self) -> AnalysisType {
        AnalysisType::Technical
    }

    fn applies(&self, current: &CurrentPage<'_>) -> bool {
        current.has_code
    }

    fn score(&self, _current: &CurrentPage<'_>, candidates: &[&PageRecord]) -> Result<Vec<RelatedPage>> {
        Ok(candidates
            .iter()
            .filter_map(|page| {
                let (score, indicators) = Self::technical_score(page);
                (score > 0.0).then(|| related(page, score, format!("Technical content: {}", indicators.join(", "))))
            })
            .collect())
    }
}

pub struct TemporalStrategy {
    pub window_days: f64,
}

impl Default for TemporalStrategy {
    fn default() -> Self {
        Self {
            window_days: TEMPORAL_WINDOW_DAYS,
        }
    }
}

/// Linear decay from 1 at `now` to 0 at seven days.
pub fn temporal_score(visited_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    decay(visited_at, now, TEMPORAL_WINDOW_DAYS)
}

fn decay(visited_at: DateTime<Utc>, now: DateTime<Utc>, window_days: f64) -> f64 {
    let days = (now - visited_at).num_seconds().max(0) as f64 / 86_400.0;
    (1.0 - days / window_days).max(0.0)
}

impl DiscoveryStrategy for TemporalStrategy {
    fn analysis_type(&self) -> AnalysisType {
        AnalysisType::Temporal
    }

    fn applies(&self, _current: &CurrentPage<'_>) -> bool {
        true
    }

    fn score(&self, current: &CurrentPage<'_>, candidates: &[&PageRecord]) -> Result<Vec<RelatedPage>> {
        Ok(candidates
            .iter()
            .filter_map(|page| {
                let score = decay(page.visited_at, current.now, self.window_days);
                let days = (current.now - page.visited_at).num_days();
                (score > 0.0).then(|| related(page, score, format!("Visited {} day(s) apart", days)))
            })
            .collect())
    }
}

fn page_host(page: &PageRecord) -> Option<String> {
    page.domain.clone().or_else(|| hostname(&page.url))
}
