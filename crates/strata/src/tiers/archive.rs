//! In-memory conversation archive

use std::cmp::Ordering;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use super::ArchiveTier;
use crate::error::Result;
use crate::memory::text::{shared_token_count, token_set};
use crate::memory::types::{ConversationRecord, Metadata};

/// Archive tier backed by a concurrent map keyed by conversation id
#[derive(Debug, Default)]
pub struct InMemoryArchive {
    records: DashMap<String, ConversationRecord>,
}

impl InMemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records of one user, oldest first
    pub fn records_for(&self, user_id: &str) -> Vec<ConversationRecord> {
        let mut records: Vec<ConversationRecord> = self
            .records
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.value().clone())
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        records
    }
}

#[async_trait]
impl ArchiveTier for InMemoryArchive {
    async fn store(
        &self,
        user_id: &str,
        user_message: &str,
        bot_response: &str,
        metadata: Metadata,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let record = ConversationRecord {
            id: id.clone(),
            user_id: user_id.to_string(),
            user_message: user_message.to_string(),
            bot_response: bot_response.to_string(),
            created_at: Utc::now(),
            metadata,
        };
        self.records.insert(id.clone(), record);
        Ok(id)
    }

    async fn fetch(&self, ids: &[String]) -> Result<Vec<ConversationRecord>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.records.get(id).map(|r| r.value().clone()))
            .collect())
    }

    async fn search_text(
        &self,
        user_id: &str,
        query: &str,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<ConversationRecord>> {
        let query_tokens = token_set(query);
        if query_tokens.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, ConversationRecord)> = self
            .records
            .iter()
            .filter(|r| r.user_id == user_id)
            .filter(|r| since.is_none_or(|since| r.created_at >= since))
            .filter_map(|r| {
                let text = format!("{} {}", r.user_message, r.bot_response);
                let shared = shared_token_count(&query_tokens, &text);
                (shared > 0).then(|| (shared, r.value().clone()))
            })
            .collect();

        scored.sort_by(|a, b| match b.0.cmp(&a.0) {
            Ordering::Equal => b.1.created_at.cmp(&a.1.created_at),
            other => other,
        });
        scored.truncate(limit);

        Ok(scored.into_iter().map(|(_, record)| record).collect())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.records.remove(id).is_some())
    }

    async fn ping(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "in-memory-archive"
    }
}
