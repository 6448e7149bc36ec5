//! Migration Manager
//!
//! Replays a legacy single-tier store through the [`MemoryManager`] write
//! path, page by page, with a bounded number of replays in flight.
//!
//! Record-level problems (malformed input, a failed replay) are counted and
//! never stop the run. The run aborts only when the source cannot be read or
//! when `abort_after_consecutive_failures` replays fail in a row, which is
//! taken as lost connectivity to the archive. Either way the stats are
//! finalized and the report saved before the error is returned.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use futures::stream;
use serde_json::Value;

use super::legacy::{LegacySource, ParsedLegacy, legacy_user_id, parse_legacy};
use super::report::{
    IntegrityReport, MigratedRecord, MigrationReport, RollbackOptions, RollbackReport,
};
use super::stats::MigrationStats;
use crate::config::MigrationConfig;
use crate::error::{Result, StrataError};
use crate::manager::{DeleteOutcome, MemoryManager, StoreOptions, StoreReceipt};

/// Every how many successful replays one is read back, or `None` for never
fn verify_interval(rate: f64) -> Option<usize> {
    if rate.is_nan() || rate <= 0.0 {
        None
    } else if rate >= 1.0 {
        Some(1)
    } else {
        Some((1.0 / rate).ceil() as usize)
    }
}

/// Evenly spaced indices into a list of `len` items, at most `n` of them
fn spaced_indices(len: usize, n: usize) -> Vec<usize> {
    let n = n.min(len);
    (0..n).map(|i| i * len / n).collect()
}

/// Drives legacy → tiered migration runs
pub struct MigrationManager {
    manager: MemoryManager,
    source: Arc<dyn LegacySource>,
    config: MigrationConfig,
    last_report: Option<MigrationReport>,
}

impl MigrationManager {
    pub fn new(manager: MemoryManager, source: Arc<dyn LegacySource>, config: MigrationConfig) -> Self {
        Self {
            manager,
            source,
            config,
            last_report: None,
        }
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Report of the most recent run, aborted runs included
    pub fn last_report(&self) -> Option<&MigrationReport> {
        self.last_report.as_ref()
    }

    /// Migrate every record in the source.
    pub async fn migrate_all(&mut self, dry_run: bool, verify: bool) -> Result<MigrationStats> {
        self.run(None, dry_run, verify).await
    }

    /// Migrate only the records of the given users. Records of other users
    /// do not count toward `total`.
    pub async fn migrate_users(&mut self, user_ids: &[String], dry_run: bool) -> Result<MigrationStats> {
        let filter: HashSet<String> = user_ids.iter().cloned().collect();
        self.run(Some(filter), dry_run, false).await
    }

    async fn run(
        &mut self,
        filter: Option<HashSet<String>>,
        dry_run: bool,
        verify: bool,
    ) -> Result<MigrationStats> {
        let mut report = MigrationReport::new(self.source.name(), dry_run, verify, self.config.clone());
        if let Some(filter) = &filter {
            let mut users: Vec<String> = filter.iter().cloned().collect();
            users.sort();
            report.user_filter = Some(users);
        }

        tracing::info!(
            run_id = %report.run_id,
            source = self.source.name(),
            dry_run,
            verify,
            "Starting migration"
        );

        let counted = match self.source.count().await {
            Ok(n) => n,
            Err(e) => {
                let reason = format!("cannot count legacy records: {e}");
                return Err(self.abort(report, MigrationStats::start(0), reason));
            }
        };

        let mut stats = MigrationStats::start(if filter.is_some() { 0 } else { counted });
        let batch_size = self.config.batch_size.max(1);
        let concurrency = self.config.max_concurrent_batches.max(1);
        let verify_every = if verify && !dry_run {
            verify_interval(self.config.verify_sample_rate)
        } else {
            None
        };

        let mut offset = 0usize;
        let mut consecutive_failures = 0usize;
        let mut successes = 0usize;

        loop {
            let page = match self.source.get(batch_size, offset).await {
                Ok(page) => page,
                Err(e) => {
                    let reason = format!("cannot read legacy page at offset {offset}: {e}");
                    return Err(self.abort(report, stats, reason));
                }
            };
            if page.is_empty() {
                break;
            }
            offset += page.len();

            let mut replays: Vec<ParsedLegacy> = Vec::with_capacity(page.len());
            for (id, document, metadata) in page.records() {
                if let Some(filter) = &filter {
                    match legacy_user_id(metadata) {
                        Some(user) if filter.contains(user) => stats.total += 1,
                        _ => continue,
                    }
                }
                match parse_legacy(id, document, metadata) {
                    Ok(parsed) => replays.push(parsed),
                    Err(e) => {
                        tracing::debug!(legacy_id = id, error = %e, "Skipping malformed legacy record");
                        stats.record_skipped();
                        report.skipped_ids.push(id.to_string());
                    }
                }
            }

            if dry_run {
                for _ in &replays {
                    stats.record_ok();
                }
            } else {
                let migrated_at = Utc::now();
                let outcomes: Vec<(ParsedLegacy, Result<StoreReceipt>)> = stream::iter(replays)
                    .map(|parsed| {
                        let manager = self.manager.clone();
                        async move {
                            let result = manager
                                .store_with_options(
                                    &parsed.user_id,
                                    &parsed.user_message,
                                    &parsed.bot_response,
                                    Some(parsed.replay_metadata(migrated_at)),
                                    StoreOptions {
                                        require_archive: true,
                                    },
                                )
                                .await;
                            (parsed, result)
                        }
                    })
                    .buffered(concurrency)
                    .collect()
                    .await;

                for (parsed, result) in outcomes {
                    match result {
                        Ok(receipt) => {
                            consecutive_failures = 0;
                            successes += 1;
                            stats.record_ok();
                            if let Err(e) = receipt.ensure_complete() {
                                tracing::debug!(legacy_id = %parsed.legacy_id, error = %e, "Derived tiers incomplete");
                            }
                            if verify_every.is_some_and(|every| successes % every == 0) {
                                self.verify_replay(&mut report, &receipt.conversation_id, &parsed)
                                    .await;
                            }
                            report.migrated.push(MigratedRecord {
                                legacy_id: parsed.legacy_id,
                                conversation_id: receipt.conversation_id,
                                user_id: parsed.user_id,
                            });
                        }
                        Err(e) => {
                            consecutive_failures += 1;
                            stats.record_failed();
                            tracing::warn!(legacy_id = %parsed.legacy_id, error = %e, "Replay failed");
                            report.failed_ids.push(parsed.legacy_id);
                        }
                    }
                }

                let limit = self.config.abort_after_consecutive_failures;
                if limit > 0 && consecutive_failures >= limit {
                    let reason = format!(
                        "{consecutive_failures} consecutive replay failures, archive presumed unreachable"
                    );
                    return Err(self.abort(report, stats, reason));
                }
            }

            tracing::info!(
                processed = stats.processed(),
                total = stats.total,
                migrated_ok = stats.migrated_ok,
                failed = stats.failed,
                skipped = stats.skipped,
                "Migration progress"
            );

            if page.len() < batch_size {
                break;
            }
            if !self.config.batch_pause().is_zero() {
                tokio::time::sleep(self.config.batch_pause()).await;
            }
        }

        stats.finalize(true);
        tracing::info!(
            total = stats.total,
            migrated_ok = stats.migrated_ok,
            failed = stats.failed,
            skipped = stats.skipped,
            success_rate = stats.success_rate(),
            throughput = stats.throughput(),
            "Migration complete"
        );

        report.stats = stats.clone();
        self.persist(report);
        Ok(stats)
    }

    /// Finalize, save and remember an aborted run.
    fn abort(&mut self, mut report: MigrationReport, mut stats: MigrationStats, reason: String) -> StrataError {
        stats.finalize(false);
        tracing::error!(
            run_id = %report.run_id,
            processed = stats.processed(),
            reason = %reason,
            "Migration aborted"
        );
        report.stats = stats;
        report.abort_reason = Some(reason.clone());
        self.persist(report);
        StrataError::Systemic(reason)
    }

    fn persist(&mut self, mut report: MigrationReport) {
        report.generated_at = Utc::now();
        if let Some(dir) = &self.config.report_dir {
            match report.save(dir) {
                Ok(path) => tracing::info!(path = %path.display(), "Saved migration report"),
                Err(e) => tracing::warn!(error = %e, "Failed to save migration report"),
            }
        }
        self.last_report = Some(report);
    }

    async fn verify_replay(&self, report: &mut MigrationReport, conversation_id: &str, parsed: &ParsedLegacy) {
        report.verification.sampled += 1;

        let mismatch = match self
            .manager
            .fetch_conversations(&[conversation_id.to_string()])
            .await
        {
            Ok(records) => match records.first() {
                Some(r)
                    if r.user_id == parsed.user_id
                        && r.user_message == parsed.user_message
                        && r.bot_response == parsed.bot_response =>
                {
                    None
                }
                Some(_) => Some("archived content differs from legacy record".to_string()),
                None => Some("record not found in archive".to_string()),
            },
            Err(e) => Some(format!("read-back failed: {e}")),
        };

        match mismatch {
            None => report.verification.passed += 1,
            Some(message) => {
                let err = StrataError::Verification {
                    id: conversation_id.to_string(),
                    message,
                };
                tracing::warn!(legacy_id = %parsed.legacy_id, error = %err, "Verification mismatch");
                report.verification.failed += 1;
                report.verification.mismatches.push(err.to_string());
            }
        }
    }

    /// Remove derived data for `ids`, or for everything the last run wrote.
    pub async fn rollback(&self, ids: Option<Vec<String>>) -> Result<RollbackReport> {
        self.rollback_with(ids, RollbackOptions::default()).await
    }

    pub async fn rollback_with(
        &self,
        ids: Option<Vec<String>>,
        options: RollbackOptions,
    ) -> Result<RollbackReport> {
        let ids = match ids {
            Some(ids) => ids,
            None => self
                .last_report
                .as_ref()
                .map(MigrationReport::conversation_ids)
                .ok_or_else(|| StrataError::InvalidInput("no migration run to roll back".into()))?,
        };

        tracing::info!(
            requested = ids.len(),
            include_archive = options.include_archive,
            "Rolling back migrated conversations"
        );

        let concurrency = self.config.max_concurrent_batches.max(1);
        let deletes: Vec<_> = stream::iter(ids.iter())
            .map(|id| self.manager.delete_derived(id, options.include_archive))
            .buffered(concurrency)
            .collect()
            .await;

        let mut report = RollbackReport {
            requested: ids.len(),
            ..Default::default()
        };
        for delete in deletes {
            if !delete.has_failures() {
                report.rolled_back += 1;
            }
            for (tier, outcome) in delete.outcomes {
                match outcome {
                    DeleteOutcome::Deleted => *report.deleted.entry(tier).or_insert(0) += 1,
                    DeleteOutcome::Failed(e) => {
                        tracing::warn!(tier = %tier, conversation_id = %delete.conversation_id, error = %e, "Rollback delete failed");
                        *report.errors.entry(tier).or_insert(0) += 1;
                    }
                    DeleteOutcome::NotFound | DeleteOutcome::Skipped => {}
                }
            }
        }

        tracing::info!(
            requested = report.requested,
            rolled_back = report.rolled_back,
            "Rollback complete"
        );
        Ok(report)
    }

    /// Read back an evenly spaced sample of the last run's records.
    pub async fn validate_integrity(&self, sample_size: usize) -> Result<IntegrityReport> {
        let migrated = self
            .last_report
            .as_ref()
            .map(|r| r.migrated.as_slice())
            .unwrap_or_default();

        let sample: Vec<&MigratedRecord> = spaced_indices(migrated.len(), sample_size)
            .into_iter()
            .map(|i| &migrated[i])
            .collect();
        if sample.is_empty() {
            return Ok(IntegrityReport::default());
        }

        let ids: Vec<String> = sample.iter().map(|m| m.conversation_id.clone()).collect();
        let records = self.manager.fetch_conversations(&ids).await?;

        let mut report = IntegrityReport {
            sampled: sample.len(),
            ..Default::default()
        };
        for expected in sample {
            let valid = records.iter().any(|r| {
                r.id == expected.conversation_id
                    && !r.user_id.is_empty()
                    && !r.user_message.is_empty()
                    && !r.bot_response.is_empty()
                    && r.metadata.get("legacy_id") == Some(&Value::String(expected.legacy_id.clone()))
            });
            if valid {
                report.valid += 1;
            } else {
                report.invalid += 1;
                report.invalid_ids.push(expected.conversation_id.clone());
            }
        }
        report.score = report.valid as f64 / report.sampled as f64;

        tracing::info!(
            sampled = report.sampled,
            valid = report.valid,
            score = report.score,
            "Integrity validation complete"
        );
        Ok(report)
    }
}
