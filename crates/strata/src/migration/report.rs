//! Persisted migration report and rollback/integrity results

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::stats::MigrationStats;
use crate::config::MigrationConfig;
use crate::error::Result;
use crate::tiers::TierKind;

/// A legacy record that made it into the new tiers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigratedRecord {
    pub legacy_id: String,
    pub conversation_id: String,
    pub user_id: String,
}

/// Outcome of sampled read-back verification
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationSummary {
    pub sampled: usize,
    pub passed: usize,
    pub failed: usize,
    /// One line per mismatch
    #[serde(default)]
    pub mismatches: Vec<String>,
}

/// Audit record of one migration run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationReport {
    pub run_id: String,
    pub source: String,
    pub dry_run: bool,
    pub verify: bool,
    /// Users the run was limited to, if any
    #[serde(default)]
    pub user_filter: Option<Vec<String>>,
    pub stats: MigrationStats,
    pub config: MigrationConfig,
    #[serde(default)]
    pub migrated: Vec<MigratedRecord>,
    #[serde(default)]
    pub failed_ids: Vec<String>,
    #[serde(default)]
    pub skipped_ids: Vec<String>,
    #[serde(default)]
    pub verification: VerificationSummary,
    #[serde(default)]
    pub abort_reason: Option<String>,
    pub generated_at: DateTime<Utc>,
}

impl MigrationReport {
    pub fn new(source: &str, dry_run: bool, verify: bool, config: MigrationConfig) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            source: source.to_string(),
            dry_run,
            verify,
            user_filter: None,
            stats: MigrationStats::default(),
            config,
            migrated: Vec::new(),
            failed_ids: Vec::new(),
            skipped_ids: Vec::new(),
            verification: VerificationSummary::default(),
            abort_reason: None,
            generated_at: Utc::now(),
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.abort_reason.is_some()
    }

    /// Conversation ids written by the run
    pub fn conversation_ids(&self) -> Vec<String> {
        self.migrated
            .iter()
            .map(|m| m.conversation_id.clone())
            .collect()
    }

    /// File name the report is saved under
    pub fn file_name(&self) -> String {
        format!(
            "migration-report-{}.json",
            self.generated_at.format("%Y%m%dT%H%M%S%.3fZ")
        )
    }

    /// Write the report as pretty JSON into `dir`, creating it if needed.
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name());
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Options for rollback
#[derive(Debug, Clone, Copy, Default)]
pub struct RollbackOptions {
    /// Also delete the archived records, not just derived data
    pub include_archive: bool,
}

/// Result of rolling back a set of conversation ids
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RollbackReport {
    pub requested: usize,
    /// Ids removed from every targeted tier without error
    pub rolled_back: usize,
    pub deleted: HashMap<TierKind, usize>,
    pub errors: HashMap<TierKind, usize>,
}

impl RollbackReport {
    pub fn deleted_from(&self, tier: TierKind) -> usize {
        self.deleted.get(&tier).copied().unwrap_or(0)
    }

    pub fn errors_in(&self, tier: TierKind) -> usize {
        self.errors.get(&tier).copied().unwrap_or(0)
    }
}

/// Result of sampled integrity validation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub sampled: usize,
    pub valid: usize,
    pub invalid: usize,
    /// valid / sampled, 0.0 when nothing was sampled
    pub score: f64,
    #[serde(default)]
    pub invalid_ids: Vec<String>,
}
