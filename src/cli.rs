use std::path::PathBuf;

use clap::Parser;

use crate::config::LogLevel;

#[derive(Parser, Debug)]
#[command(name = "orchestrator", version, about = "Service process orchestrator")]
pub struct Cli {
    /// Path to the orchestrator configuration file.
    #[arg(short, long)]
    pub config: PathBuf,

    /// Overrides the configured log level.
    #[arg(long)]
    pub log_level: Option<LogLevel>,
}
