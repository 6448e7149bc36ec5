pub mod config;
pub mod context;
pub mod migrate;
pub mod report;

pub use config::ConfigCommand;
pub use context::ContextCommand;
pub use migrate::MigrateCommand;
pub use report::ReportCommand;
