//! Normalised context candidates

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::memory::types::Metadata;
use crate::tiers::TierKind;

/// How much a candidate's source matters when ranking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
    Background,
}

impl Priority {
    pub fn weight(&self) -> f32 {
        match self {
            Priority::Critical => 1.0,
            Priority::High => 0.8,
            Priority::Medium => 0.6,
            Priority::Low => 0.4,
            Priority::Background => 0.2,
        }
    }

    /// Fixed source priority: recent turns beat search hits beat topics beat
    /// raw history
    pub fn for_source(source: TierKind) -> Self {
        match source {
            TierKind::Cache => Priority::Critical,
            TierKind::Search => Priority::High,
            TierKind::Graph => Priority::Medium,
            TierKind::Archive => Priority::Low,
        }
    }
}

/// Position of a source in rendering and tie-break order
pub fn source_order(source: TierKind) -> u8 {
    match source {
        TierKind::Cache => 0,
        TierKind::Search => 1,
        TierKind::Graph => 2,
        TierKind::Archive => 3,
    }
}

/// One piece of history competing for space in the assembled context
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextCandidate {
    pub source: TierKind,
    /// Single-line rendered text
    pub text: String,
    pub raw_metadata: Metadata,
    pub priority: Priority,
    /// Score as reported by the source (similarity, recency bucket, weight)
    pub native_score: f32,
    /// Final relevance in [0, 1]
    pub relevance_score: f32,
    pub timestamp: Option<DateTime<Utc>>,
    pub conversation_id: Option<String>,
}

impl ContextCandidate {
    pub fn new(source: TierKind, text: impl Into<String>, native_score: f32) -> Self {
        Self {
            source,
            text: text.into(),
            raw_metadata: Metadata::new(),
            priority: Priority::for_source(source),
            native_score,
            relevance_score: 0.0,
            timestamp: None,
            conversation_id: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: Option<DateTime<Utc>>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_conversation_id(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.raw_metadata = metadata;
        self
    }

    /// Ranking key: relevance weighted by source priority
    pub fn rank_score(&self) -> f32 {
        self.relevance_score * self.priority.weight()
    }
}
