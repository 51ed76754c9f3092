//! Merges per-fragment partial knowledge into one canonical record.

use std::collections::{HashMap, HashSet};

use crate::schema::{
    AggregatedKnowledge, ContentAction, ContentMetrics, Entity, KNOWLEDGE_SCHEMA_VERSION, PartialKnowledge,
    Relationship,
};

pub const NO_SUMMARY: &str = "No content summary available.";

const SUMMARY_TOPIC_LIMIT: usize = 5;
const SUMMARY_ENTITY_LIMIT: usize = 5;

/// Merge partial records into one aggregated record.
///
/// Entity identity is the lowercase name. Relationships are keyed by their
/// exact (from, relationship, to) triple; topics and questions by exact text.
pub fn aggregate(partials: &[PartialKnowledge]) -> AggregatedKnowledge {
    merge(partials.iter().enumerate().collect())
}

/// Like [`aggregate`] over a partially filled slot table. Empty slots are
/// skipped; "Frame N" labels keep the slot's position.
pub fn aggregate_slots(slots: &[Option<PartialKnowledge>]) -> AggregatedKnowledge {
    merge(
        slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|p| (i, p)))
            .collect(),
    )
}

fn merge(partials: Vec<(usize, &PartialKnowledge)>) -> AggregatedKnowledge {
    let mut entities = EntityMerger::default();
    let mut relationships = Vec::new();
    let mut seen_triples: HashSet<(String, String, String)> = HashSet::new();
    let mut topics = Vec::new();
    let mut questions = Vec::new();
    let mut actions: Option<Vec<ContentAction>> = None;
    let mut metrics = ContentMetrics::default();

    let mut push_relationship = |rel: Relationship, out: &mut Vec<Relationship>| {
        let key = (rel.from.clone(), rel.relationship.clone(), rel.to.clone());
        if seen_triples.insert(key) {
            out.push(rel);
        }
    };

    for (_, partial) in &partials {
        for entity in partial.entities.iter().flatten() {
            entities.insert(entity.clone());
        }
        for rel in partial.relationships.iter().flatten() {
            push_relationship(rel.clone(), &mut relationships);
        }
        if let Some(partial_actions) = &partial.content_actions {
            let collected = actions.get_or_insert_with(Vec::new);
            for action in partial_actions {
                push_relationship(action.to_relationship(), &mut relationships);
                if !collected.contains(action) {
                    collected.push(action.clone());
                }
            }
        }
        extend_unique(&mut topics, partial.topics.iter().flatten());
        extend_unique(&mut questions, partial.suggested_questions.iter().flatten());
        if let Some(partial_metrics) = &partial.content_metrics {
            metrics.absorb(partial_metrics);
        }
    }

    let entities = entities.into_entities();
    let summary = synthesize_summary(&partials, &topics, &entities);

    AggregatedKnowledge {
        version: KNOWLEDGE_SCHEMA_VERSION,
        entities,
        relationships,
        topics,
        questions,
        summary,
        content_metrics: metrics,
        content_actions: actions,
        source_count: partials.len(),
    }
}

/// Fold a later phase's aggregate into the knowledge accumulated so far.
///
/// Entities, relationships, topics, actions and metrics are replaced wholesale
/// when the later phase produced any; an empty result never erases earlier
/// data. The summary is replaced unless the later phase had nothing to say.
/// Questions accumulate.
pub fn escalate(current: &mut AggregatedKnowledge, later: AggregatedKnowledge) {
    if !later.entities.is_empty() {
        current.entities = later.entities;
    }
    if !later.relationships.is_empty() {
        current.relationships = later.relationships;
    }
    if !later.topics.is_empty() {
        current.topics = later.topics;
    }
    if later.summary != NO_SUMMARY {
        current.summary = later.summary;
    }
    if later.content_actions.as_ref().is_some_and(|a| !a.is_empty()) {
        current.content_actions = later.content_actions;
    }
    if later.content_metrics.word_count > 0 {
        current.content_metrics = later.content_metrics;
    }
    extend_unique(&mut current.questions, later.questions.iter());
    current.source_count = current.source_count.max(later.source_count);
    current.version = KNOWLEDGE_SCHEMA_VERSION;
}

#[derive(Default)]
struct EntityMerger {
    order: Vec<Entity>,
    index: HashMap<String, usize>,
}

impl EntityMerger {
    fn insert(&mut self, entity: Entity) {
        let key = entity.key();
        match self.index.get(&key) {
            Some(&idx) => {
                let stored = &mut self.order[idx];
                let confidence = stored.confidence.max(entity.confidence);
                if entity.comprehensiveness() > stored.comprehensiveness() {
                    *stored = entity;
                }
                stored.confidence = confidence;
            }
            None => {
                self.index.insert(key, self.order.len());
                self.order.push(entity);
            }
        }
    }

    fn into_entities(self) -> Vec<Entity> {
        self.order
    }
}

fn extend_unique<'a>(target: &mut Vec<String>, items: impl Iterator<Item = &'a String>) {
    for item in items {
        if !target.contains(item) {
            target.push(item.clone());
        }
    }
}

fn synthesize_summary(partials: &[(usize, &PartialKnowledge)], topics: &[String], entities: &[Entity]) -> String {
    let summaries: Vec<(usize, &str)> = partials
        .iter()
        .filter_map(|&(i, p)| {
            p.summary
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| (i + 1, s))
        })
        .collect();

    match summaries.as_slice() {
        [(_, only)] => return (*only).to_string(),
        [] => {}
        many => {
            return many
                .iter()
                .map(|(frame, s)| format!("Frame {}: {}", frame, s))
                .collect::<Vec<_>>()
                .join("\n\n");
        }
    }

    fallback_summary(topics, entities)
}

fn fallback_summary(topics: &[String], entities: &[Entity]) -> String {
    let top_topics: Vec<&str> = topics.iter().take(SUMMARY_TOPIC_LIMIT).map(String::as_str).collect();

    let mut ranked: Vec<&Entity> = entities.iter().collect();
    ranked.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let top_entities: Vec<&str> = ranked
        .into_iter()
        .take(SUMMARY_ENTITY_LIMIT)
        .map(|e| e.name.as_str())
        .collect();

    let mut sentences = Vec::new();
    if !top_topics.is_empty() {
        sentences.push(format!("This content covers {}.", top_topics.join(", ")));
    }
    if !top_entities.is_empty() {
        sentences.push(format!("Key entities include {}.", top_entities.join(", ")));
    }

    if sentences.is_empty() {
        NO_SUMMARY.to_string()
    } else {
        sentences.join(" ")
    }
}
