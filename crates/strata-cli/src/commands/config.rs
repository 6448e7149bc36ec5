use clap::Parser;
use strata::Config;

use crate::error::CliResult;
use crate::output::{OutputFormat, print_json};

#[derive(Parser)]
pub struct ConfigCommand {}

impl ConfigCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> CliResult<()> {
        match format {
            OutputFormat::Json => print_json(config)?,
            OutputFormat::Table => print!("{}", toml::to_string_pretty(config)?),
        }
        Ok(())
    }
}
