pub mod commands;
pub mod error;
pub mod output;

pub use commands::{ConfigCommand, ContextCommand, MigrateCommand, ReportCommand};
pub use error::{CliError, CliResult};
pub use output::{OutputFormat, format_timestamp, truncate_string};
