use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Bumped whenever the shape of [`AggregatedKnowledge`] changes.
pub const KNOWLEDGE_SCHEMA_VERSION: u32 = 1;

/// Confidence assigned to relationships synthesized from content actions
/// that did not carry their own.
pub const DEFAULT_ACTION_CONFIDENCE: f64 = 0.8;

fn default_confidence() -> f64 {
    0.5
}

fn default_version() -> u32 {
    KNOWLEDGE_SCHEMA_VERSION
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    #[serde(rename = "type", alias = "types", default, deserialize_with = "one_or_many")]
    pub types: Vec<String>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, serde_json::Value>,
}

impl Entity {
    pub fn new(name: impl Into<String>, entity_type: impl Into<String>, confidence: f64) -> Self {
        Self {
            name: name.into(),
            types: vec![entity_type.into()],
            confidence,
            description: None,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Identity key: entities are the same iff their lowercase names match.
    pub fn key(&self) -> String {
        crate::normalizer::entity_key(&self.name)
    }

    pub fn has_description(&self) -> bool {
        self.description.as_deref().is_some_and(|d| !d.trim().is_empty())
    }

    pub fn property_count(&self) -> usize {
        self.types.len() + self.properties.len()
    }

    /// How much this mention tells us; the richer mention wins a merge.
    pub fn comprehensiveness(&self) -> f64 {
        let description = if self.has_description() { 2.0 } else { 0.0 };
        description + self.confidence + 0.1 * self.property_count() as f64
    }

    pub fn primary_type(&self) -> &str {
        self.types.first().map(String::as_str).unwrap_or("entity")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub from: String,
    pub relationship: String,
    pub to: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

impl Relationship {
    pub fn new(from: impl Into<String>, relationship: impl Into<String>, to: impl Into<String>, confidence: f64) -> Self {
        Self {
            from: from.into(),
            relationship: relationship.into(),
            to: to.into(),
            confidence,
        }
    }

    pub fn triple(&self) -> (&str, &str, &str) {
        (&self.from, &self.relationship, &self.to)
    }
}

/// A subject–verb–object statement found in the content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentAction {
    #[serde(alias = "actor")]
    pub subject: String,
    #[serde(alias = "action")]
    pub verb: String,
    #[serde(alias = "target")]
    pub object: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl ContentAction {
    pub fn to_relationship(&self) -> Relationship {
        Relationship::new(
            self.subject.clone(),
            self.verb.clone(),
            self.object.clone(),
            self.confidence.unwrap_or(DEFAULT_ACTION_CONFIDENCE),
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentMetrics {
    #[serde(default)]
    pub word_count: usize,
    #[serde(default)]
    pub reading_time_minutes: f64,
}

impl ContentMetrics {
    /// Roughly 200 words per minute.
    pub fn from_word_count(word_count: usize) -> Self {
        Self {
            word_count,
            reading_time_minutes: word_count as f64 / 200.0,
        }
    }

    pub fn absorb(&mut self, other: &ContentMetrics) {
        self.word_count += other.word_count;
        self.reading_time_minutes += other.reading_time_minutes;
    }
}

/// Raw capability output for one extraction input. Every field is optional
/// because each phase only computes part of the picture.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialKnowledge {
    #[serde(default)]
    pub entities: Option<Vec<Entity>>,
    #[serde(default, alias = "relations")]
    pub relationships: Option<Vec<Relationship>>,
    #[serde(default)]
    pub topics: Option<Vec<String>>,
    #[serde(default, alias = "questions")]
    pub suggested_questions: Option<Vec<String>>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default, alias = "actions")]
    pub content_actions: Option<Vec<ContentAction>>,
    #[serde(default)]
    pub content_metrics: Option<ContentMetrics>,
}

/// Canonical merged knowledge for one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedKnowledge {
    #[serde(default = "default_version")]
    pub version: u32,
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    pub topics: Vec<String>,
    pub questions: Vec<String>,
    pub summary: String,
    pub content_metrics: ContentMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_actions: Option<Vec<ContentAction>>,
    /// Number of partial records merged into this one.
    #[serde(default)]
    pub source_count: usize,
}

impl Default for AggregatedKnowledge {
    fn default() -> Self {
        Self {
            version: KNOWLEDGE_SCHEMA_VERSION,
            entities: Vec::new(),
            relationships: Vec::new(),
            topics: Vec::new(),
            questions: Vec::new(),
            summary: String::new(),
            content_metrics: ContentMetrics::default(),
            content_actions: None,
            source_count: 0,
        }
    }
}

impl AggregatedKnowledge {
    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entities.iter().map(|e| e.name.as_str())
    }
}

impl From<AggregatedKnowledge> for PartialKnowledge {
    fn from(knowledge: AggregatedKnowledge) -> Self {
        Self {
            entities: Some(knowledge.entities),
            relationships: Some(knowledge.relationships),
            topics: Some(knowledge.topics),
            suggested_questions: Some(knowledge.questions),
            summary: Some(knowledge.summary),
            content_actions: knowledge.content_actions,
            content_metrics: Some(knowledge.content_metrics),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(value)) => vec![value],
        Some(OneOrMany::Many(values)) => values,
        None => Vec::new(),
    })
}
