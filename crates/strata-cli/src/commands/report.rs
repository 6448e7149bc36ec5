use std::path::PathBuf;

use clap::Parser;
use strata::MigrationReport;

use crate::error::CliResult;
use crate::output::{OutputFormat, format_timestamp, new_table, print_json, truncate_string};

#[derive(Parser)]
pub struct ReportCommand {
    #[clap(help = "Path to a saved migration report")]
    pub path: PathBuf,

    #[clap(long, default_value = "10", help = "Maximum failed/skipped ids to list")]
    pub limit: usize,
}

impl ReportCommand {
    pub async fn execute(&self, format: OutputFormat) -> CliResult<()> {
        let report = MigrationReport::load(&self.path)?;

        match format {
            OutputFormat::Json => print_json(&report)?,
            OutputFormat::Table => {
                println!("Migration Report");
                println!("================\n");

                let stats = &report.stats;
                let status = match &report.abort_reason {
                    Some(reason) => format!("aborted: {}", truncate_string(reason, 60)),
                    None if report.dry_run => "completed (dry run)".to_string(),
                    None => "completed".to_string(),
                };

                let mut table = new_table(&["Field", "Value"]);
                table.add_row(["Run", report.run_id.as_str()]);
                table.add_row(["Source", report.source.as_str()]);
                table.add_row(["Status", &status]);
                table.add_row(["Generated", &format_timestamp(&report.generated_at)]);
                table.add_row(["Total", &stats.total.to_string()]);
                table.add_row(["Migrated", &stats.migrated_ok.to_string()]);
                table.add_row(["Failed", &stats.failed.to_string()]);
                table.add_row(["Skipped", &stats.skipped.to_string()]);
                table.add_row(["Duration", &format!("{:.1?}", stats.duration())]);
                table.add_row(["Batch size", &report.config.batch_size.to_string()]);
                table.add_row([
                    "Concurrency",
                    &report.config.max_concurrent_batches.to_string(),
                ]);
                if report.verify {
                    let v = &report.verification;
                    table.add_row([
                        "Verification",
                        &format!("{}/{} passed", v.passed, v.sampled),
                    ]);
                }
                println!("{table}");

                print_ids("Failed", &report.failed_ids, self.limit);
                print_ids("Skipped", &report.skipped_ids, self.limit);
            }
        }

        Ok(())
    }
}

fn print_ids(label: &str, ids: &[String], limit: usize) {
    if ids.is_empty() {
        return;
    }
    println!("\n{label} ({}):", ids.len());
    for id in ids.iter().take(limit) {
        println!("  {id}");
    }
    if ids.len() > limit {
        println!("  ... and {} more", ids.len() - limit);
    }
}
