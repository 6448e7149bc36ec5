use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use strata::migration::{JsonlLegacySource, MigrationManager};
use strata::testing::ReferenceTiers;
use strata::{AssembledContext, Config, HealthReport, MemoryManager, TierKind};

use crate::commands::migrate::spinner;
use crate::error::CliResult;
use crate::output::{OutputFormat, new_table, print_json, truncate_string};

#[derive(Parser)]
pub struct ContextCommand {
    #[clap(long, short, help = "Legacy export to load as conversation history (JSON lines)")]
    pub source: Option<PathBuf>,

    #[clap(long, short, help = "User whose history is searched")]
    pub user: String,

    #[clap(long, short, help = "Query to assemble context for")]
    pub query: String,

    #[clap(long, help = "Maximum context length in characters (overrides config)")]
    pub max_length: Option<usize>,

    #[clap(long, help = "Also print tier health")]
    pub health: bool,
}

#[derive(serde::Serialize)]
struct ContextOutput<'a> {
    context: &'a AssembledContext,
    #[serde(skip_serializing_if = "Option::is_none")]
    health: Option<&'a HealthReport>,
}

impl ContextCommand {
    pub async fn execute(&self, config: Config, format: OutputFormat) -> CliResult<()> {
        let tiers = ReferenceTiers::new(&config);
        let manager = tiers.manager(config.clone());

        if let Some(path) = &self.source {
            self.load_history(&manager, &config, path, format).await?;
        }

        let context = manager
            .get_context(&self.user, &self.query, self.max_length)
            .await;
        let health = if self.health {
            Some(manager.health_check().await)
        } else {
            None
        };

        match format {
            OutputFormat::Json => print_json(&ContextOutput {
                context: &context,
                health: health.as_ref(),
            })?,
            OutputFormat::Table => {
                println!("{}\n", context.text);

                let mut table = new_table(&["Source", "Selected", "Top item"]);
                for tier in TierKind::ALL {
                    let top = context
                        .selected
                        .iter()
                        .find(|c| c.source == tier)
                        .map(|c| truncate_string(&c.text, 60))
                        .unwrap_or_default();
                    table.add_row([tier.as_str(), &context.count_for(tier).to_string(), &top]);
                }
                println!("{table}");
                println!(
                    "{} of {} candidates, {} chars in {:.1?}{}",
                    context.selected.len(),
                    context.candidates_considered,
                    context.total_chars,
                    context.assembly_duration,
                    if context.truncated { " (truncated)" } else { "" }
                );

                if let Some(health) = &health {
                    println!();
                    let mut table = new_table(&["Tier", "Reachable"]);
                    for tier in TierKind::ALL {
                        table.add_row([tier.as_str(), if health.tier(tier) { "yes" } else { "no" }]);
                    }
                    println!("{table}");
                    println!(
                        "Overall: {} ({} of 4 tiers healthy)",
                        if health.overall { "healthy" } else { "degraded" },
                        health.healthy
                    );
                }
            }
        }

        Ok(())
    }

    /// Replay the user's legacy history through the write path.
    async fn load_history(
        &self,
        manager: &MemoryManager,
        config: &Config,
        path: &Path,
        format: OutputFormat,
    ) -> CliResult<()> {
        let source = JsonlLegacySource::open(path).await?;
        let mut migration_config = config.migration.clone();
        migration_config.report_dir = None;
        migration_config.batch_pause_ms = 0;

        let mut migration = MigrationManager::new(manager.clone(), Arc::new(source), migration_config);
        let pb = spinner(format, &format!("Loading history for {}", self.user))?;
        let result = migration
            .migrate_users(std::slice::from_ref(&self.user), false)
            .await;
        if let Some(pb) = &pb {
            pb.finish_and_clear();
        }

        let stats = result?;
        tracing::info!(
            user = %self.user,
            loaded = stats.migrated_ok,
            skipped = stats.skipped,
            failed = stats.failed,
            "Loaded conversation history"
        );
        Ok(())
    }
}
