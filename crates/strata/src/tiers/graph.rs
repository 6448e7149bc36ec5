//! In-memory topic graph
//!
//! Per user: a weighted user→topic edge per topic and an undirected
//! topic↔topic edge per co-occurring pair. Weights only ever grow; queries age
//! them by how long ago the topic was last seen.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::GraphTier;
use crate::error::Result;
use crate::memory::types::{Metadata, RelationshipEdge, TopicWeight, effective_created_at};

/// Conversation references returned with each topic
const MAX_TOPIC_REFERENCES: usize = 3;

/// Conversation references kept per topic; older ones are dropped
const RETAINED_TOPIC_REFERENCES: usize = MAX_TOPIC_REFERENCES * 10;

/// Days after which a topic's query weight is halved
const RECENCY_HALF_LIFE_DAYS: f32 = 30.0;

#[derive(Debug, Clone)]
struct TopicNode {
    weight: f32,
    count: u32,
    last_seen: DateTime<Utc>,
    /// (conversation_id, seen_at), oldest first
    conversations: Vec<(String, DateTime<Utc>)>,
}

#[derive(Debug, Clone)]
struct PairStats {
    weight: f32,
    count: u32,
    last_seen: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct UserGraph {
    topics: HashMap<String, TopicNode>,
    pairs: HashMap<(String, String), PairStats>,
}

fn pair_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

fn recency_factor(last_seen: DateTime<Utc>, now: DateTime<Utc>) -> f32 {
    let age_days = (now - last_seen).num_seconds().max(0) as f32 / 86_400.0;
    0.5f32.powf(age_days / RECENCY_HALF_LIFE_DAYS)
}

/// Graph tier backed by a concurrent map keyed by user id
#[derive(Debug, Default)]
pub struct InMemoryGraph {
    users: DashMap<String, UserGraph>,
}

impl InMemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulated topic↔topic edge for a user, if the pair ever co-occurred
    pub fn edge(&self, user_id: &str, a: &str, b: &str) -> Option<RelationshipEdge> {
        let graph = self.users.get(user_id)?;
        let (from, to) = pair_key(&a.to_lowercase(), &b.to_lowercase());
        let stats = graph.pairs.get(&(from.clone(), to.clone()))?;
        Some(RelationshipEdge {
            from_topic: from,
            to_topic: to,
            weight: stats.weight,
            co_occurrence_count: stats.count,
            last_seen: stats.last_seen,
        })
    }

    /// Accumulated user→topic weight
    pub fn topic_weight(&self, user_id: &str, topic: &str) -> Option<f32> {
        let graph = self.users.get(user_id)?;
        graph.topics.get(&topic.to_lowercase()).map(|n| n.weight)
    }

    /// Conversation ids still referenced by a topic, oldest first
    pub fn topic_references(&self, user_id: &str, topic: &str) -> Vec<String> {
        self.users
            .get(user_id)
            .and_then(|g| {
                g.topics
                    .get(&topic.to_lowercase())
                    .map(|n| n.conversations.iter().map(|(id, _)| id.clone()).collect())
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl GraphTier for InMemoryGraph {
    async fn record_edges(
        &self,
        conversation_id: &str,
        user_id: &str,
        topics: &[String],
        metadata: Metadata,
    ) -> Result<()> {
        let mut normalized: Vec<String> = Vec::with_capacity(topics.len());
        for topic in topics {
            let topic = topic.trim().to_lowercase();
            if !topic.is_empty() && !normalized.contains(&topic) {
                normalized.push(topic);
            }
        }
        if normalized.is_empty() {
            return Ok(());
        }

        let seen = effective_created_at(&metadata, Utc::now());
        let mut graph = self.users.entry(user_id.to_string()).or_default();

        for topic in &normalized {
            let node = graph.topics.entry(topic.clone()).or_insert_with(|| TopicNode {
                weight: 0.0,
                count: 0,
                last_seen: seen,
                conversations: Vec::new(),
            });
            node.weight += 1.0;
            node.count += 1;
            node.last_seen = node.last_seen.max(seen);

            let at = node.conversations.partition_point(|(_, ts)| *ts <= seen);
            node.conversations.insert(at, (conversation_id.to_string(), seen));
            if node.conversations.len() > RETAINED_TOPIC_REFERENCES {
                let excess = node.conversations.len() - RETAINED_TOPIC_REFERENCES;
                node.conversations.drain(..excess);
            }
        }

        for (i, a) in normalized.iter().enumerate() {
            for b in &normalized[i + 1..] {
                let stats = graph.pairs.entry(pair_key(a, b)).or_insert(PairStats {
                    weight: 0.0,
                    count: 0,
                    last_seen: seen,
                });
                stats.weight += 1.0;
                stats.count += 1;
                stats.last_seen = stats.last_seen.max(seen);
            }
        }

        tracing::debug!(
            user_id,
            conversation_id,
            topics = normalized.len(),
            "Recorded topic edges"
        );
        Ok(())
    }

    async fn related_topics(
        &self,
        user_id: &str,
        seeds: &[String],
        limit: usize,
    ) -> Result<Vec<TopicWeight>> {
        let Some(graph) = self.users.get(user_id) else {
            return Ok(Vec::new());
        };
        if limit == 0 {
            return Ok(Vec::new());
        }

        let seeds: Vec<String> = seeds.iter().map(|s| s.trim().to_lowercase()).collect();
        let mut raw: HashMap<&str, f32> = HashMap::new();

        for seed in &seeds {
            if let Some(node) = graph.topics.get(seed) {
                *raw.entry(seed.as_str()).or_default() += node.weight;
            }
        }
        for ((a, b), stats) in &graph.pairs {
            if seeds.contains(a) {
                *raw.entry(b.as_str()).or_default() += stats.weight;
            }
            if seeds.contains(b) {
                *raw.entry(a.as_str()).or_default() += stats.weight;
            }
        }

        let now = Utc::now();
        let mut scored: Vec<(&str, f32, &TopicNode)> = raw
            .into_iter()
            .filter_map(|(topic, weight)| {
                let node = graph.topics.get(topic)?;
                Some((topic, weight * recency_factor(node.last_seen, now), node))
            })
            .collect();

        let max = scored.iter().map(|(_, w, _)| *w).fold(0.0f32, f32::max);
        if max <= 0.0 {
            return Ok(Vec::new());
        }

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        scored.truncate(limit);

        Ok(scored
            .into_iter()
            .map(|(topic, weight, node)| TopicWeight {
                topic: topic.to_string(),
                weight: (weight / max).clamp(0.0, 1.0),
                co_occurrence_count: node.count,
                last_seen: Some(node.last_seen),
                conversation_ids: node
                    .conversations
                    .iter()
                    .rev()
                    .take(MAX_TOPIC_REFERENCES)
                    .map(|(id, _)| id.clone())
                    .collect(),
            })
            .collect())
    }

    async fn delete(&self, conversation_id: &str) -> Result<bool> {
        let mut removed = false;
        for mut graph in self.users.iter_mut() {
            for node in graph.topics.values_mut() {
                let before = node.conversations.len();
                node.conversations.retain(|(id, _)| id != conversation_id);
                removed |= node.conversations.len() != before;
            }
        }
        Ok(removed)
    }

    async fn ping(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "in-memory-graph"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topics(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    #[tokio::test]
    async fn test_edges_accumulate() {
        let graph = InMemoryGraph::new();
        graph
            .record_edges("c1", "u1", &topics(&["pizza", "italy"]), Metadata::new())
            .await
            .unwrap();
        graph
            .record_edges("c2", "u1", &topics(&["Italy", "pizza"]), Metadata::new())
            .await
            .unwrap();

        let edge = graph.edge("u1", "pizza", "italy").unwrap();
        assert_eq!(edge.co_occurrence_count, 2);
        assert!((edge.weight - 2.0).abs() < 1e-6);
        assert_eq!(graph.topic_weight("u1", "pizza"), Some(2.0));
    }

    #[tokio::test]
    async fn test_related_topics_normalised_and_ranked() {
        let graph = InMemoryGraph::new();
        graph
            .record_edges("c1", "u1", &topics(&["pizza", "italy"]), Metadata::new())
            .await
            .unwrap();
        graph
            .record_edges("c2", "u1", &topics(&["pizza", "italy", "wine"]), Metadata::new())
            .await
            .unwrap();
        graph
            .record_edges("c3", "u1", &topics(&["weather"]), Metadata::new())
            .await
            .unwrap();

        let related = graph
            .related_topics("u1", &topics(&["pizza"]), 10)
            .await
            .unwrap();
        let names: Vec<_> = related.iter().map(|t| t.topic.as_str()).collect();
        assert_eq!(names, vec!["italy", "pizza", "wine"]);
        assert!((related[0].weight - 1.0).abs() < 1e-6);
        assert!(related.iter().all(|t| (0.0..=1.0).contains(&t.weight)));
        assert_eq!(related[0].conversation_ids, vec!["c2", "c1"]);
    }

    #[tokio::test]
    async fn test_unknown_user_or_seed_yields_nothing() {
        let graph = InMemoryGraph::new();
        assert!(graph
            .related_topics("nobody", &topics(&["pizza"]), 5)
            .await
            .unwrap()
            .is_empty());

        graph
            .record_edges("c1", "u1", &topics(&["pizza"]), Metadata::new())
            .await
            .unwrap();
        assert!(graph
            .related_topics("u1", &topics(&["cars"]), 5)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_delete_drops_references_but_keeps_weights() {
        let graph = InMemoryGraph::new();
        graph
            .record_edges("c1", "u1", &topics(&["pizza", "italy"]), Metadata::new())
            .await
            .unwrap();

        assert!(graph.delete("c1").await.unwrap());
        assert!(!graph.delete("c1").await.unwrap());
        assert!(graph.topic_references("u1", "pizza").is_empty());
        assert_eq!(graph.edge("u1", "italy", "pizza").unwrap().co_occurrence_count, 1);
        assert_eq!(graph.topic_weight("u1", "pizza"), Some(1.0));
    }

    #[tokio::test]
    async fn test_topic_references_are_bounded() {
        let graph = InMemoryGraph::new();
        for i in 0..(RETAINED_TOPIC_REFERENCES + 15) {
            graph
                .record_edges(&format!("c{i}"), "u1", &topics(&["pizza"]), Metadata::new())
                .await
                .unwrap();
        }

        let refs = graph.topic_references("u1", "pizza");
        assert_eq!(refs.len(), RETAINED_TOPIC_REFERENCES);
        assert_eq!(refs.first().map(String::as_str), Some("c15"));
        assert_eq!(
            refs.last().cloned(),
            Some(format!("c{}", RETAINED_TOPIC_REFERENCES + 14))
        );
        assert_eq!(graph.topic_weight("u1", "pizza"), Some((RETAINED_TOPIC_REFERENCES + 15) as f32));
    }

    #[tokio::test]
    async fn test_replayed_turns_keep_original_time() {
        let graph = InMemoryGraph::new();
        let mut old = Metadata::new();
        old.insert(
            crate::memory::types::ORIGINAL_CREATED_AT_KEY.into(),
            serde_json::Value::String("2023-01-01T00:00:00Z".into()),
        );
        graph
            .record_edges("recent", "u1", &topics(&["pizza"]), Metadata::new())
            .await
            .unwrap();
        graph
            .record_edges("replayed", "u1", &topics(&["pizza", "italy"]), old)
            .await
            .unwrap();

        assert_eq!(graph.topic_references("u1", "pizza"), vec!["replayed", "recent"]);

        let related = graph
            .related_topics("u1", &topics(&["italy"]), 5)
            .await
            .unwrap();
        let italy = related.iter().find(|t| t.topic == "italy").unwrap();
        assert_eq!(
            italy.last_seen.map(|ts| ts.to_rfc3339()),
            Some("2023-01-01T00:00:00+00:00".to_string())
        );
        let pizza = related.iter().find(|t| t.topic == "pizza").unwrap();
        assert!(pizza.last_seen.unwrap() > italy.last_seen.unwrap());
    }
}
