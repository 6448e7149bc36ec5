//! Integration tests for legacy migration
//!
//! Tests dry runs, live replays against flaky archives, abort handling,
//! verification, rollback, integrity validation and report persistence.

use std::sync::Arc;

use serde_json::Value;
use strata::config::{Config, MigrationConfig};
use strata::memory::types::Metadata;
use strata::migration::{
    InMemoryLegacySource, JsonlLegacySource, LegacyDocument, LegacySource, MigrationManager,
    MigrationReport, RollbackOptions,
};
use strata::testing::{FailingLegacySource, FlakyArchive, ReferenceTiers, legacy_turns, malformed_legacy};
use strata::tiers::{ArchiveTier, InMemoryCache, InMemoryGraph, InMemorySearch};
use strata::{MemoryManager, StrataError, TierKind};
use tempfile::TempDir;

fn migration_config() -> MigrationConfig {
    MigrationConfig {
        batch_size: 10,
        max_concurrent_batches: 3,
        batch_pause_ms: 0,
        verify_sample_rate: 0.1,
        abort_after_consecutive_failures: 20,
        report_dir: None,
    }
}

/// `n` turns spread over ten users, ids `L0..`
fn spread_turns(n: usize) -> Vec<LegacyDocument> {
    (0..n)
        .map(|i| {
            LegacyDocument::turn(
                format!("L{i}"),
                &format!("user-{}", i % 10),
                &format!("question number {i} about pizza"),
                &format!("answer number {i} about dough"),
            )
        })
        .collect()
}

fn reference() -> (ReferenceTiers, MemoryManager) {
    let config = Config::default();
    let tiers = ReferenceTiers::new(&config);
    let manager = tiers.manager(config);
    (tiers, manager)
}

fn migrator(
    manager: MemoryManager,
    documents: Vec<LegacyDocument>,
    config: MigrationConfig,
) -> MigrationManager {
    MigrationManager::new(manager, Arc::new(InMemoryLegacySource::new(documents)), config)
}

struct FlakyTiers {
    archive: Arc<FlakyArchive>,
    search: Arc<InMemorySearch>,
    manager: MemoryManager,
}

fn flaky(archive: FlakyArchive) -> FlakyTiers {
    let config = Config::default();
    let archive = Arc::new(archive);
    let search = Arc::new(InMemorySearch::new());
    let manager = MemoryManager::builder(config.clone())
        .cache(Arc::new(InMemoryCache::new(&config.cache)))
        .archive(archive.clone())
        .search(search.clone())
        .graph(Arc::new(InMemoryGraph::new()))
        .build();
    FlakyTiers {
        archive,
        search,
        manager,
    }
}

fn saved_reports(dir: &TempDir) -> Vec<std::path::PathBuf> {
    let mut paths: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    paths.sort();
    paths
}

// =============================================================================
// Dry run
// =============================================================================

mod dry_run_tests {
    use super::*;

    #[tokio::test]
    async fn test_dry_run_counts_without_writing() {
        let (tiers, manager) = reference();
        let documents: Vec<LegacyDocument> = spread_turns(100)
            .into_iter()
            .enumerate()
            .map(|(i, doc)| {
                if i % 10 == 9 {
                    malformed_legacy(&doc.id)
                } else {
                    doc
                }
            })
            .collect();
        let mut migration = migrator(manager, documents, migration_config());

        let stats = migration.migrate_all(true, false).await.unwrap();

        assert_eq!(stats.total, 100);
        assert_eq!(stats.migrated_ok, 90);
        assert_eq!(stats.skipped, 10);
        assert_eq!(stats.failed, 0);
        assert!(tiers.archive.is_empty());
        assert!(tiers.search.is_empty());

        let report = migration.last_report().unwrap();
        assert!(report.dry_run);
        assert!(report.migrated.is_empty());
        assert_eq!(report.skipped_ids.len(), 10);
        assert!(report.skipped_ids.contains(&"L9".to_string()));
    }

    #[tokio::test]
    async fn test_empty_source() {
        let (_, manager) = reference();
        let mut migration = migrator(manager, vec![], migration_config());
        let stats = migration.migrate_all(false, false).await.unwrap();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.processed(), 0);
        assert!(stats.end_time.is_some());
    }
}

// =============================================================================
// Live runs
// =============================================================================

mod live_run_tests {
    use super::*;

    #[tokio::test]
    async fn test_full_migration_populates_tiers() {
        let (tiers, manager) = reference();
        let mut migration = migrator(manager, spread_turns(35), migration_config());

        let stats = migration.migrate_all(false, false).await.unwrap();

        assert_eq!(stats.total, 35);
        assert_eq!(stats.migrated_ok, 35);
        assert_eq!(tiers.archive.len(), 35);
        assert_eq!(tiers.search.len(), 35);

        let report = migration.last_report().unwrap();
        assert_eq!(report.migrated.len(), 35);
        assert!(!report.is_aborted());
        assert_eq!(report.source, "in-memory");
    }

    #[tokio::test]
    async fn test_replayed_records_carry_legacy_marker() {
        let (tiers, manager) = reference();
        let mut migration = migrator(manager, legacy_turns("alice", 3), migration_config());
        migration.migrate_all(false, false).await.unwrap();

        let records = tiers.archive.records_for("alice");
        assert_eq!(records.len(), 3);
        for record in records {
            assert!(record.metadata.contains_key("legacy_id"));
            assert!(record.metadata.contains_key("migrated_at"));
            assert!(!record.metadata.contains_key("user_message"));
        }
    }

    #[tokio::test]
    async fn test_partial_failure_then_rollback() {
        let documents: Vec<LegacyDocument> = spread_turns(100)
            .into_iter()
            .enumerate()
            .map(|(i, doc)| {
                if i % 10 == 3 {
                    let user = format!("user-{}", i % 10);
                    LegacyDocument::turn(doc.id, &user, &format!("[fail] question {i}"), "never stored")
                } else {
                    doc
                }
            })
            .collect();
        let tiers = flaky(FlakyArchive::failing_on("[fail]"));
        let mut migration = migrator(tiers.manager.clone(), documents, migration_config());

        let stats = migration.migrate_all(false, false).await.unwrap();

        assert_eq!(stats.total, 100);
        assert_eq!(stats.migrated_ok, 90);
        assert_eq!(stats.failed, 10);
        assert_eq!(stats.skipped, 0);
        assert_eq!(tiers.archive.failures(), 10);
        assert_eq!(tiers.archive.inner().len(), 90);
        assert_eq!(tiers.search.len(), 90);

        let report = migration.last_report().unwrap();
        assert_eq!(report.failed_ids.len(), 10);
        assert!(report.failed_ids.contains(&"L3".to_string()));

        let rollback = migration.rollback(None).await.unwrap();
        assert_eq!(rollback.requested, 90);
        assert_eq!(rollback.rolled_back, 90);
        assert_eq!(rollback.deleted_from(TierKind::Search), 90);
        assert_eq!(rollback.deleted_from(TierKind::Archive), 0);
        assert!(tiers.search.is_empty());
        assert_eq!(tiers.archive.inner().len(), 90);
    }

    #[tokio::test]
    async fn test_counts_always_sum_to_total() {
        let mut documents = spread_turns(47);
        documents.push(malformed_legacy("bad-1"));
        documents.push(malformed_legacy("bad-2"));
        for i in 0..3 {
            documents.push(LegacyDocument::turn(
                format!("F{i}"),
                "user-1",
                "[fail] please",
                "never",
            ));
        }
        let tiers = flaky(FlakyArchive::failing_on("[fail]"));
        let mut migration = migrator(tiers.manager.clone(), documents, migration_config());

        let stats = migration.migrate_all(false, false).await.unwrap();

        assert_eq!(stats.total, 52);
        assert_eq!(stats.migrated_ok, 47);
        assert_eq!(stats.skipped, 2);
        assert_eq!(stats.failed, 3);
        assert_eq!(stats.migrated_ok + stats.failed + stats.skipped, stats.total);
        assert!(stats.success_rate() > 0.9);
    }

    #[tokio::test]
    async fn test_single_replay_in_flight() {
        let (tiers, manager) = reference();
        let config = MigrationConfig {
            max_concurrent_batches: 1,
            ..migration_config()
        };
        let mut migration = migrator(manager, spread_turns(25), config);

        let stats = migration.migrate_all(false, false).await.unwrap();

        assert_eq!(stats.migrated_ok, 25);
        assert_eq!(tiers.archive.len(), 25);
        let legacy_ids: Vec<&str> = migration
            .last_report()
            .unwrap()
            .migrated
            .iter()
            .map(|m| m.legacy_id.as_str())
            .collect();
        let expected: Vec<String> = (0..25).map(|i| format!("L{i}")).collect();
        assert_eq!(legacy_ids, expected);
    }

    #[tokio::test]
    async fn test_verification_reads_back_every_record() {
        let (_, manager) = reference();
        let config = MigrationConfig {
            verify_sample_rate: 1.0,
            ..migration_config()
        };
        let mut migration = migrator(manager, spread_turns(12), config);

        migration.migrate_all(false, true).await.unwrap();

        let verification = &migration.last_report().unwrap().verification;
        assert_eq!(verification.sampled, 12);
        assert_eq!(verification.passed, 12);
        assert_eq!(verification.failed, 0);
    }

    #[tokio::test]
    async fn test_verification_samples_at_rate() {
        let (_, manager) = reference();
        let config = MigrationConfig {
            verify_sample_rate: 0.25,
            ..migration_config()
        };
        let mut migration = migrator(manager, spread_turns(20), config);

        migration.migrate_all(false, true).await.unwrap();

        assert_eq!(migration.last_report().unwrap().verification.sampled, 5);
    }

    #[tokio::test]
    async fn test_migrate_selected_users() {
        let (tiers, manager) = reference();
        let mut documents = legacy_turns("alice", 5);
        documents.extend((0..5).map(|i| {
            LegacyDocument::turn(format!("B{i}"), "bob", "bob question", "bob answer")
        }));
        documents.extend((0..5).map(|i| {
            LegacyDocument::turn(format!("C{i}"), "carol", "carol question", "carol answer")
        }));
        let mut migration = migrator(manager, documents, migration_config());

        let users = vec!["carol".to_string(), "alice".to_string()];
        let stats = migration.migrate_users(&users, false).await.unwrap();

        assert_eq!(stats.total, 10);
        assert_eq!(stats.migrated_ok, 10);
        assert_eq!(tiers.archive.len(), 10);
        assert!(tiers.archive.records_for("bob").is_empty());

        let report = migration.last_report().unwrap();
        assert_eq!(
            report.user_filter,
            Some(vec!["alice".to_string(), "carol".to_string()])
        );
    }

    #[tokio::test]
    async fn test_document_form_records() {
        let (tiers, manager) = reference();
        let mut metadata = Metadata::new();
        metadata.insert("user_id".into(), Value::String("dana".into()));
        metadata.insert("timestamp".into(), Value::String("2024-01-15T10:30:00Z".into()));
        let documents = vec![LegacyDocument::new(
            "D1",
            "User: what goes on a margherita?\nBot: tomato, mozzarella and basil",
            metadata,
        )];
        let mut migration = migrator(manager, documents, migration_config());

        migration.migrate_all(false, false).await.unwrap();

        let records = tiers.archive.records_for("dana");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].user_message, "what goes on a margherita?");
        assert_eq!(records[0].bot_response, "tomato, mozzarella and basil");
        assert!(records[0].metadata.contains_key("legacy_created_at"));
    }

    #[tokio::test]
    async fn test_message_whitespace_survives_replay() {
        let (tiers, manager) = reference();
        let documents = vec![LegacyDocument::turn(
            "W1",
            "u1",
            "  indented code:\n    fn main() {}\n",
            "ok  ",
        )];
        let config = MigrationConfig {
            verify_sample_rate: 1.0,
            ..migration_config()
        };
        let mut migration = migrator(manager, documents, config);

        migration.migrate_all(false, true).await.unwrap();

        let records = tiers.archive.records_for("u1");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].user_message, "  indented code:\n    fn main() {}\n");
        assert_eq!(records[0].bot_response, "ok  ");
        let verification = &migration.last_report().unwrap().verification;
        assert_eq!(verification.sampled, 1);
        assert_eq!(verification.passed, 1);
    }

    #[tokio::test]
    async fn test_replayed_turns_scored_by_original_time() {
        let (_, manager) = reference();
        let mut document = LegacyDocument::turn("T1", "erin", "Hi there", "Hello!");
        document
            .metadata
            .insert("timestamp".into(), Value::String("2023-01-01T00:00:00Z".into()));
        let mut migration = migrator(manager.clone(), vec![document], migration_config());
        migration.migrate_all(false, false).await.unwrap();

        let ctx = manager.get_context("erin", "weather forecast", None).await;

        let cached = ctx
            .selected
            .iter()
            .find(|c| c.source == TierKind::Cache)
            .unwrap();
        assert_eq!(
            cached.timestamp.map(|ts| ts.to_rfc3339()),
            Some("2023-01-01T00:00:00+00:00".to_string())
        );
        assert!((cached.relevance_score - 0.4).abs() < 1e-6);
    }
}

// =============================================================================
// Aborts
// =============================================================================

mod abort_tests {
    use super::*;

    #[tokio::test]
    async fn test_abort_after_consecutive_failures() {
        let dir = TempDir::new().unwrap();
        let tiers = flaky(FlakyArchive::new());
        tiers.archive.set_down(true);
        let config = MigrationConfig {
            abort_after_consecutive_failures: 5,
            report_dir: Some(dir.path().to_path_buf()),
            ..migration_config()
        };
        let mut migration = migrator(tiers.manager.clone(), spread_turns(30), config);

        let err = migration.migrate_all(false, false).await.unwrap_err();
        assert!(matches!(err, StrataError::Systemic(_)));

        let report = migration.last_report().unwrap();
        assert!(report.is_aborted());
        assert_eq!(report.stats.failed, 10);
        assert_eq!(report.stats.total, 30);
        assert!(report.stats.end_time.is_some());
        assert_eq!(saved_reports(&dir).len(), 1);
    }

    #[tokio::test]
    async fn test_abort_when_source_cannot_be_counted() {
        let (_, manager) = reference();
        let mut migration = MigrationManager::new(
            manager,
            Arc::new(FailingLegacySource::unopenable()),
            migration_config(),
        );

        let err = migration.migrate_all(false, false).await.unwrap_err();
        assert!(matches!(err, StrataError::Systemic(_)));
        let report = migration.last_report().unwrap();
        assert!(report.is_aborted());
        assert_eq!(report.stats.processed(), 0);
    }

    #[tokio::test]
    async fn test_abort_when_page_read_fails() {
        let (tiers, manager) = reference();
        let source = FailingLegacySource::failing_from(spread_turns(30), 20);
        let mut migration = MigrationManager::new(manager, Arc::new(source), migration_config());

        let err = migration.migrate_all(false, false).await.unwrap_err();
        assert!(matches!(err, StrataError::Systemic(_)));

        let report = migration.last_report().unwrap();
        assert!(report.is_aborted());
        assert_eq!(report.stats.migrated_ok, 20);
        assert_eq!(report.stats.total, 30);
        assert_eq!(tiers.archive.len(), 20);
    }
}

// =============================================================================
// Rollback and integrity
// =============================================================================

mod rollback_tests {
    use super::*;

    #[tokio::test]
    async fn test_rollback_without_run_is_rejected() {
        let (_, manager) = reference();
        let migration = migrator(manager, vec![], migration_config());
        let err = migration.rollback(None).await.unwrap_err();
        assert!(matches!(err, StrataError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_rollback_including_archive() {
        let (tiers, manager) = reference();
        let mut migration = migrator(manager, spread_turns(15), migration_config());
        migration.migrate_all(false, false).await.unwrap();

        let report = migration
            .rollback_with(None, RollbackOptions { include_archive: true })
            .await
            .unwrap();

        assert_eq!(report.rolled_back, 15);
        assert_eq!(report.deleted_from(TierKind::Archive), 15);
        assert_eq!(report.deleted_from(TierKind::Cache), 15);
        assert!(tiers.archive.is_empty());
        assert!(tiers.search.is_empty());
    }

    #[tokio::test]
    async fn test_rollback_explicit_ids() {
        let (tiers, manager) = reference();
        let mut migration = migrator(manager, spread_turns(10), migration_config());
        migration.migrate_all(false, false).await.unwrap();

        let ids: Vec<String> = migration
            .last_report()
            .unwrap()
            .conversation_ids()
            .into_iter()
            .take(4)
            .collect();
        let report = migration.rollback(Some(ids.clone())).await.unwrap();

        assert_eq!(report.requested, 4);
        assert_eq!(tiers.search.len(), 6);
        assert!(ids.iter().all(|id| !tiers.search.contains(id)));
    }

    #[tokio::test]
    async fn test_rollback_of_unknown_ids_is_not_an_error() {
        let (_, manager) = reference();
        let migration = migrator(manager, vec![], migration_config());
        let report = migration
            .rollback(Some(vec!["nope".to_string()]))
            .await
            .unwrap();
        assert_eq!(report.requested, 1);
        assert_eq!(report.rolled_back, 1);
        assert_eq!(report.deleted_from(TierKind::Search), 0);
    }

    #[tokio::test]
    async fn test_rollback_keeps_run_stats() {
        let (_, manager) = reference();
        let mut migration = migrator(manager, spread_turns(10), migration_config());
        migration.migrate_all(false, false).await.unwrap();
        let before = migration.last_report().unwrap().stats.clone();

        migration.rollback(None).await.unwrap();

        assert_eq!(migration.last_report().unwrap().stats, before);
    }

    #[tokio::test]
    async fn test_integrity_of_clean_run() {
        let (_, manager) = reference();
        let mut migration = migrator(manager, spread_turns(20), migration_config());
        migration.migrate_all(false, false).await.unwrap();

        let integrity = migration.validate_integrity(5).await.unwrap();
        assert_eq!(integrity.sampled, 5);
        assert_eq!(integrity.valid, 5);
        assert_eq!(integrity.score, 1.0);
        assert!(integrity.invalid_ids.is_empty());
    }

    #[tokio::test]
    async fn test_integrity_detects_missing_records() {
        let (tiers, manager) = reference();
        let mut migration = migrator(manager, spread_turns(10), migration_config());
        migration.migrate_all(false, false).await.unwrap();

        let ids = migration.last_report().unwrap().conversation_ids();
        for id in &ids[..5] {
            tiers.archive.delete(id).await.unwrap();
        }

        let integrity = migration.validate_integrity(10).await.unwrap();
        assert_eq!(integrity.sampled, 10);
        assert_eq!(integrity.invalid, 5);
        assert_eq!(integrity.score, 0.5);
    }

    #[tokio::test]
    async fn test_integrity_without_migrated_records() {
        let (_, manager) = reference();
        let migration = migrator(manager, vec![], migration_config());
        let integrity = migration.validate_integrity(10).await.unwrap();
        assert_eq!(integrity.sampled, 0);
        assert_eq!(integrity.score, 0.0);
    }
}

// =============================================================================
// Reports and sources
// =============================================================================

mod report_tests {
    use super::*;

    #[tokio::test]
    async fn test_report_saved_and_loaded() {
        let dir = TempDir::new().unwrap();
        let (_, manager) = reference();
        let config = MigrationConfig {
            report_dir: Some(dir.path().to_path_buf()),
            ..migration_config()
        };
        let mut migration = migrator(manager, spread_turns(12), config);
        migration.migrate_all(false, false).await.unwrap();

        let paths = saved_reports(&dir);
        assert_eq!(paths.len(), 1);
        let file_name = paths[0].file_name().unwrap().to_string_lossy().to_string();
        assert!(file_name.starts_with("migration-report-"));
        assert!(file_name.ends_with(".json"));

        let loaded = MigrationReport::load(&paths[0]).unwrap();
        let last = migration.last_report().unwrap();
        assert_eq!(loaded.run_id, last.run_id);
        assert_eq!(loaded.stats, last.stats);
        assert_eq!(loaded.migrated, last.migrated);
        assert_eq!(loaded.config, last.config);
    }

    #[tokio::test]
    async fn test_jsonl_source() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("legacy.jsonl");
        let lines = [
            r#"{"id":"J1","document":"","metadata":{"user_id":"erin","user_message":"hello","bot_response":"hi erin"}}"#,
            r#"{"id":"J2","document":"User: any pizza tips?\nAssistant: preheat the stone","metadata":{"user_id":"erin"}}"#,
            "this is not json",
            "",
            r#"{"id":"J3","document":"orphan text","metadata":{}}"#,
        ];
        std::fs::write(&path, lines.join("\n")).unwrap();

        let source = JsonlLegacySource::open(&path).await.unwrap();
        assert_eq!(source.count().await.unwrap(), 4);

        let (tiers, manager) = reference();
        let mut migration = MigrationManager::new(manager, Arc::new(source), migration_config());
        let stats = migration.migrate_all(false, false).await.unwrap();

        assert_eq!(stats.total, 4);
        assert_eq!(stats.migrated_ok, 2);
        assert_eq!(stats.skipped, 2);
        assert_eq!(tiers.archive.records_for("erin").len(), 2);
        assert_eq!(migration.last_report().unwrap().source, "jsonl");
    }

    #[tokio::test]
    async fn test_jsonl_missing_file() {
        let err = JsonlLegacySource::open("/nonexistent/legacy.jsonl")
            .await
            .unwrap_err();
        assert!(matches!(err, StrataError::Systemic(_)));
    }
}
