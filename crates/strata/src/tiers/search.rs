//! In-memory summary index
//!
//! Similarity is the cosine of the binary token vectors of the query and the
//! summary (summary text plus topics). With time decay enabled the score is
//! halved every `DECAY_HALF_LIFE_DAYS`.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use super::SearchTier;
use crate::error::Result;
use crate::memory::text::token_set;
use crate::memory::types::{SearchHit, SummaryRecord};

const DECAY_HALF_LIFE_DAYS: f32 = 30.0;

#[derive(Debug, Clone)]
struct Indexed {
    summary: SummaryRecord,
    tokens: HashSet<String>,
}

/// Search tier backed by a concurrent map keyed by conversation id
#[derive(Debug, Default)]
pub struct InMemorySearch {
    entries: DashMap<String, Indexed>,
}

impl InMemorySearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, conversation_id: &str) -> bool {
        self.entries.contains_key(conversation_id)
    }

    fn cosine(query: &HashSet<String>, doc: &HashSet<String>) -> f32 {
        if query.is_empty() || doc.is_empty() {
            return 0.0;
        }
        let shared = query.intersection(doc).count() as f32;
        shared / ((query.len() * doc.len()) as f32).sqrt()
    }

    fn to_hit(summary: &SummaryRecord, similarity: f32) -> SearchHit {
        SearchHit {
            conversation_id: summary.conversation_id.clone(),
            user_id: summary.user_id.clone(),
            summary_text: summary.summary_text.clone(),
            topics: summary.topics.clone(),
            similarity: similarity.clamp(0.0, 1.0),
            created_at: Some(summary.created_at),
            metadata: summary.metadata.clone(),
        }
    }

    fn rank(mut hits: Vec<SearchHit>, limit: usize) -> Vec<SearchHit> {
        hits.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| a.conversation_id.cmp(&b.conversation_id))
        });
        hits.truncate(limit);
        hits
    }
}

#[async_trait]
impl SearchTier for InMemorySearch {
    async fn index(&self, summary: SummaryRecord) -> Result<()> {
        let mut tokens = token_set(&summary.summary_text);
        for topic in &summary.topics {
            tokens.extend(token_set(topic));
        }
        self.entries
            .insert(summary.conversation_id.clone(), Indexed { summary, tokens });
        Ok(())
    }

    async fn query(
        &self,
        user_id: &str,
        text: &str,
        limit: usize,
        time_decay: bool,
    ) -> Result<Vec<SearchHit>> {
        let query = token_set(text);
        if query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let hits = self
            .entries
            .iter()
            .filter(|e| e.summary.user_id == user_id)
            .filter_map(|e| {
                let mut similarity = Self::cosine(&query, &e.tokens);
                if similarity <= 0.0 {
                    return None;
                }
                if time_decay {
                    let age_days =
                        (now - e.summary.created_at).num_seconds().max(0) as f32 / 86_400.0;
                    similarity *= 0.5f32.powf(age_days / DECAY_HALF_LIFE_DAYS);
                }
                Some(Self::to_hit(&e.summary, similarity))
            })
            .collect();

        Ok(Self::rank(hits, limit))
    }

    async fn query_by_topics(
        &self,
        user_id: &str,
        topics: &[String],
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let wanted: HashSet<String> = topics.iter().map(|t| t.to_lowercase()).collect();
        if wanted.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let hits = self
            .entries
            .iter()
            .filter(|e| e.summary.user_id == user_id)
            .filter_map(|e| {
                let matched = e
                    .summary
                    .topics
                    .iter()
                    .filter(|t| wanted.contains(&t.to_lowercase()))
                    .count();
                (matched > 0)
                    .then(|| Self::to_hit(&e.summary, matched as f32 / wanted.len() as f32))
            })
            .collect();

        Ok(Self::rank(hits, limit))
    }

    async fn delete(&self, conversation_id: &str) -> Result<bool> {
        Ok(self.entries.remove(conversation_id).is_some())
    }

    async fn ping(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "in-memory-search"
    }
}
