use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use strata::migration::{IntegrityReport, JsonlLegacySource, MigrationManager, MigrationReport, RollbackReport};
use strata::testing::ReferenceTiers;
use strata::{Config, TierKind};

use crate::error::CliResult;
use crate::output::{OutputFormat, format_timestamp, new_table, print_json, truncate_string};

#[derive(Parser)]
pub struct MigrateCommand {
    #[clap(long, short, help = "Legacy export to migrate (JSON lines)")]
    pub source: PathBuf,

    #[clap(long, help = "Parse and count records without writing anything")]
    pub dry_run: bool,

    #[clap(long, help = "Read back a sample of replayed records")]
    pub verify: bool,

    #[clap(long, value_name = "N", help = "Validate integrity of N migrated records afterwards")]
    pub validate: Option<usize>,

    #[clap(long, help = "Roll back derived data written by this run afterwards")]
    pub rollback: bool,

    #[clap(long, value_delimiter = ',', help = "Only migrate these users (comma separated)")]
    pub users: Vec<String>,

    #[clap(long, help = "Directory for the run report (overrides config)")]
    pub report_dir: Option<PathBuf>,
}

#[derive(serde::Serialize)]
struct MigrateOutput<'a> {
    report: &'a MigrationReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    integrity: Option<&'a IntegrityReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rollback: Option<&'a RollbackReport>,
}

impl MigrateCommand {
    pub async fn execute(&self, mut config: Config, format: OutputFormat) -> CliResult<()> {
        if self.report_dir.is_some() {
            config.migration.report_dir = self.report_dir.clone();
        }

        let tiers = ReferenceTiers::new(&config);
        let manager = tiers.manager(config.clone());
        let source = JsonlLegacySource::open(&self.source).await?;
        let mut migration = MigrationManager::new(manager, Arc::new(source), config.migration.clone());

        let spinner = spinner(format, &format!("Migrating {}", self.source.display()))?;
        let result = if self.users.is_empty() {
            migration.migrate_all(self.dry_run, self.verify).await
        } else {
            migration.migrate_users(&self.users, self.dry_run).await
        };
        if let Some(pb) = &spinner {
            pb.finish_and_clear();
        }

        if let Err(e) = result {
            if let Some(report) = migration.last_report() {
                self.print(report, None, None, format)?;
            }
            return Err(e.into());
        }

        let integrity = match self.validate {
            Some(n) => Some(migration.validate_integrity(n).await?),
            None => None,
        };
        let rollback = if self.rollback {
            Some(migration.rollback(None).await?)
        } else {
            None
        };

        let report = migration
            .last_report()
            .ok_or("migration finished without a report")?;
        self.print(report, integrity.as_ref(), rollback.as_ref(), format)?;

        if let Some(dir) = &config.migration.report_dir {
            if format.is_table() {
                println!("\nReport written to {}", dir.join(report.file_name()).display());
            }
        }
        Ok(())
    }

    fn print(
        &self,
        report: &MigrationReport,
        integrity: Option<&IntegrityReport>,
        rollback: Option<&RollbackReport>,
        format: OutputFormat,
    ) -> CliResult<()> {
        match format {
            OutputFormat::Json => print_json(&MigrateOutput {
                report,
                integrity,
                rollback,
            }),
            OutputFormat::Table => {
                let stats = &report.stats;
                let title = if report.dry_run {
                    "Migration (dry run)"
                } else {
                    "Migration"
                };
                println!("{title}");
                println!("{}\n", "=".repeat(title.len()));

                let mut table = new_table(&["Field", "Value"]);
                table.add_row(["Run", report.run_id.as_str()]);
                table.add_row(["Source", report.source.as_str()]);
                table.add_row(["Total", &stats.total.to_string()]);
                table.add_row(["Migrated", &stats.migrated_ok.to_string()]);
                table.add_row(["Failed", &stats.failed.to_string()]);
                table.add_row(["Skipped", &stats.skipped.to_string()]);
                table.add_row(["Success rate", &format!("{:.1}%", stats.success_rate() * 100.0)]);
                table.add_row(["Throughput", &format!("{:.1} records/s", stats.throughput())]);
                if let Some(start) = &stats.start_time {
                    table.add_row(["Started", &format_timestamp(start)]);
                }
                if let Some(end) = &stats.end_time {
                    table.add_row(["Finished", &format_timestamp(end)]);
                }
                if let Some(users) = &report.user_filter {
                    table.add_row(["Users", &users.join(", ")]);
                }
                if let Some(reason) = &report.abort_reason {
                    table.add_row(["Aborted", &truncate_string(reason, 80)]);
                }
                println!("{table}");

                if report.verify && !report.dry_run {
                    let v = &report.verification;
                    println!(
                        "\nVerification: {} sampled, {} passed, {} failed",
                        v.sampled, v.passed, v.failed
                    );
                    for mismatch in &v.mismatches {
                        println!("  {}", truncate_string(mismatch, 100));
                    }
                }

                if let Some(integrity) = integrity {
                    println!(
                        "\nIntegrity: {}/{} valid (score {:.2})",
                        integrity.valid, integrity.sampled, integrity.score
                    );
                }

                if let Some(rollback) = rollback {
                    println!(
                        "\nRollback: {}/{} conversations rolled back",
                        rollback.rolled_back, rollback.requested
                    );
                    let mut table = new_table(&["Tier", "Deleted", "Errors"]);
                    for tier in TierKind::ALL {
                        table.add_row([
                            tier.as_str(),
                            &rollback.deleted_from(tier).to_string(),
                            &rollback.errors_in(tier).to_string(),
                        ]);
                    }
                    println!("{table}");
                }
                Ok(())
            }
        }
    }
}

/// Spinner for long runs; none in JSON mode so stdout stays parseable
pub(crate) fn spinner(format: OutputFormat, message: &str) -> CliResult<Option<ProgressBar>> {
    if !format.is_table() {
        return Ok(None);
    }
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed_precise}] {msg}")
        .map_err(|e| format!("Progress bar error: {e}"))?;
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(Some(pb))
}
