//! Record types shared by the tiers and the orchestrator
//!
//! A conversation turn lives in full in the archive; every other record is
//! derived from it and points back through `conversation_id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Open key/value metadata attached to a turn
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Metadata key holding when a replayed turn originally happened (RFC 3339)
pub const ORIGINAL_CREATED_AT_KEY: &str = "legacy_created_at";

/// When the turn originally happened, if it was replayed from elsewhere.
/// Unparseable values are ignored.
pub fn original_created_at(metadata: &Metadata) -> Option<DateTime<Utc>> {
    metadata
        .get(ORIGINAL_CREATED_AT_KEY)
        .and_then(serde_json::Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|ts| ts.with_timezone(&Utc))
}

/// Time a turn is scored and ordered by: its original time when replayed,
/// otherwise when the tier stored it
pub fn effective_created_at(metadata: &Metadata, stored_at: DateTime<Utc>) -> DateTime<Utc> {
    original_created_at(metadata).unwrap_or(stored_at)
}

/// One archived conversation turn. The archive owns it and assigns `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    /// Opaque archive-assigned identifier, the only cross-tier join key
    pub id: String,
    pub user_id: String,
    pub user_message: String,
    pub bot_response: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// A recent turn held by the cache tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub conversation_id: String,
    pub user_id: String,
    pub user_message: String,
    pub bot_response: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(
        conversation_id: impl Into<String>,
        user_id: impl Into<String>,
        user_message: impl Into<String>,
        bot_response: impl Into<String>,
        metadata: Metadata,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            user_id: user_id.into(),
            user_message: user_message.into(),
            bot_response: bot_response.into(),
            metadata,
            created_at: Utc::now(),
        }
    }
}

/// Short derived summary indexed by the search tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub conversation_id: String,
    pub user_id: String,
    pub summary_text: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub intent: String,
    #[serde(default)]
    pub emotional_tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// A ranked result from the search tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub conversation_id: String,
    pub user_id: String,
    pub summary_text: String,
    #[serde(default)]
    pub topics: Vec<String>,
    /// Similarity to the query in [0, 1]
    pub similarity: f32,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Weighted edge between two topics (or user and topic) in the graph tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipEdge {
    pub from_topic: String,
    pub to_topic: String,
    pub weight: f32,
    pub co_occurrence_count: u32,
    pub last_seen: DateTime<Utc>,
}

/// A topic returned by a graph query, weighted relative to the other results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicWeight {
    pub topic: String,
    /// Normalised weight in [0, 1]
    pub weight: f32,
    pub co_occurrence_count: u32,
    pub last_seen: Option<DateTime<Utc>>,
    /// Most recent conversations that mention this topic, newest first
    #[serde(default)]
    pub conversation_ids: Vec<String>,
}
