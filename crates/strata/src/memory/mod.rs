//! Memory records and text helpers
//!
//! Defines the records exchanged between the orchestrator and the tiers,
//! plus the keyword utilities shared by summarization and scoring.

pub mod text;
pub mod types;

pub use types::{
    CacheEntry, ConversationRecord, Metadata, RelationshipEdge, SearchHit, SummaryRecord,
    TopicWeight,
};
