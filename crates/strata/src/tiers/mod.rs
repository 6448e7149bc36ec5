//! Tier contracts and in-memory reference adapters
//!
//! Each tier is an independently owned backing store behind one of the four
//! traits below. The orchestrator only relies on these operations; real
//! deployments put thin adapters over their databases behind the same traits.
//!
//! - Tier 1 `cache`: ephemeral recent turns per user, most-recent-first, capped, TTL
//! - Tier 2 `archive`: durable full-fidelity turns, source of truth for ids
//! - Tier 3 `search`: similarity index over short summaries
//! - Tier 4 `graph`: accumulative topic relationships

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::memory::types::{
    CacheEntry, ConversationRecord, Metadata, SearchHit, SummaryRecord, TopicWeight,
};

pub mod archive;
pub mod cache;
pub mod graph;
pub mod search;

pub use archive::InMemoryArchive;
pub use cache::InMemoryCache;
pub use graph::InMemoryGraph;
pub use search::InMemorySearch;

/// Identifies one of the four tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierKind {
    Cache,
    Archive,
    Search,
    Graph,
}

impl TierKind {
    pub const ALL: [TierKind; 4] = [
        TierKind::Cache,
        TierKind::Archive,
        TierKind::Search,
        TierKind::Graph,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TierKind::Cache => "cache",
            TierKind::Archive => "archive",
            TierKind::Search => "search",
            TierKind::Graph => "graph",
        }
    }
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tier 1: per-user recent-turn cache
#[async_trait]
pub trait CacheTier: Send + Sync {
    /// Prepend a turn, then trim the user's list to the configured cap
    async fn append(&self, entry: CacheEntry) -> Result<()>;

    /// Up to `limit` unexpired turns, most recent first
    async fn recent(&self, user_id: &str, limit: usize) -> Result<Vec<CacheEntry>>;

    /// Number of unexpired turns held for the user
    async fn count(&self, user_id: &str) -> Result<usize>;

    /// Drop everything held for the user
    async fn clear(&self, user_id: &str) -> Result<()>;

    /// Drop one turn wherever it is cached; true if something was removed
    async fn remove(&self, conversation_id: &str) -> Result<bool>;

    async fn ping(&self) -> bool;

    fn name(&self) -> &'static str;
}

/// Tier 2: durable conversation archive
#[async_trait]
pub trait ArchiveTier: Send + Sync {
    /// Persist a turn and return its newly issued id
    async fn store(
        &self,
        user_id: &str,
        user_message: &str,
        bot_response: &str,
        metadata: Metadata,
    ) -> Result<String>;

    /// Records for the ids that exist, in the order requested
    async fn fetch(&self, ids: &[String]) -> Result<Vec<ConversationRecord>>;

    /// Text search over one user's turns newer than `since`, best match first
    async fn search_text(
        &self,
        user_id: &str,
        query: &str,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<ConversationRecord>>;

    async fn delete(&self, id: &str) -> Result<bool>;

    async fn ping(&self) -> bool;

    fn name(&self) -> &'static str;
}

/// Tier 3: similarity index over summaries
#[async_trait]
pub trait SearchTier: Send + Sync {
    async fn index(&self, summary: SummaryRecord) -> Result<()>;

    /// Ranked hits with similarity in [0, 1]. With `time_decay` the adapter
    /// folds recency into the similarity itself.
    async fn query(
        &self,
        user_id: &str,
        text: &str,
        limit: usize,
        time_decay: bool,
    ) -> Result<Vec<SearchHit>>;

    async fn query_by_topics(
        &self,
        user_id: &str,
        topics: &[String],
        limit: usize,
    ) -> Result<Vec<SearchHit>>;

    async fn delete(&self, conversation_id: &str) -> Result<bool>;

    async fn ping(&self) -> bool;

    fn name(&self) -> &'static str;
}

/// Tier 4: topic relationship graph
#[async_trait]
pub trait GraphTier: Send + Sync {
    /// Add user→topic and topic↔topic co-occurrence for one conversation
    async fn record_edges(
        &self,
        conversation_id: &str,
        user_id: &str,
        topics: &[String],
        metadata: Metadata,
    ) -> Result<()>;

    /// Topics related to `seeds`, strongest first, weights normalised to [0, 1]
    async fn related_topics(
        &self,
        user_id: &str,
        seeds: &[String],
        limit: usize,
    ) -> Result<Vec<TopicWeight>>;

    /// Forget a conversation's references. Topic nodes and accumulated edge
    /// weights are kept.
    async fn delete(&self, conversation_id: &str) -> Result<bool>;

    async fn ping(&self) -> bool;

    fn name(&self) -> &'static str;
}
