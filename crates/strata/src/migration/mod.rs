//! Legacy store migration
//!
//! Reads the legacy single-tier store page by page, replays each record
//! through the tiered write path, and keeps an auditable report of what
//! happened so a run can be verified or rolled back.

pub mod legacy;
pub mod report;
pub mod runner;
pub mod stats;

pub use legacy::{
    InMemoryLegacySource, JsonlLegacySource, LegacyDocument, LegacyPage, LegacySource,
    ParsedLegacy, parse_legacy,
};
pub use report::{
    IntegrityReport, MigratedRecord, MigrationReport, RollbackOptions, RollbackReport,
    VerificationSummary,
};
pub use runner::MigrationManager;
pub use stats::MigrationStats;
