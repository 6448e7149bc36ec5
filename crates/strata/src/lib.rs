//! Strata - tiered conversational memory
//!
//! This crate persists conversation history across four independently owned
//! tiers (recent-turn cache, durable archive, summary search index, topic
//! graph) and assembles bounded, relevance-ranked context for a response
//! generator. It also migrates a legacy single-tier store into the tiers.

pub mod config;
pub mod context;
pub mod error;
pub mod manager;
pub mod memory;
pub mod migration;
pub mod summarize;
pub mod testing;
pub mod tiers;

pub use config::Config;
pub use context::{AssembledContext, ContextAssembler, ContextCandidate, ContextSources};
pub use error::{Result, StrataError};
pub use manager::{
    DeleteOutcome, DeleteReport, HealthReport, MemoryManager, MemoryManagerBuilder, StoreOptions,
    StoreReceipt, TierOutcome,
};
pub use migration::{
    IntegrityReport, MigrationManager, MigrationReport, MigrationStats, RollbackOptions,
    RollbackReport,
};
pub use summarize::{KeywordSummarizer, Summarizer, Summary};
pub use tiers::TierKind;
