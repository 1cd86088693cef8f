use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use orchestrator::cli::Cli;
use orchestrator::logging::Logging;
use orchestrator::{
    ConfigSource, FileConfigSource, Orchestrator, OrchestratorError, OrchestratorOptions,
};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let source = Arc::new(FileConfigSource::new(&cli.config));
    let config = match source.current() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let level = cli.log_level.unwrap_or(config.orchestrator.log_level);
    if let Err(err) = Logging::try_init(level) {
        eprintln!("{err}");
        return ExitCode::FAILURE;
    }

    match run(source) {
        Ok(()) => {
            info!("orchestrator exited cleanly");
            ExitCode::SUCCESS
        }
        Err(err @ OrchestratorError::ShutdownInterrupted { .. }) => {
            error!("{err}");
            ExitCode::from(2)
        }
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(source: Arc<FileConfigSource>) -> Result<(), OrchestratorError> {
    let orchestrator = Orchestrator::new(source, OrchestratorOptions::default())?;
    orchestrator.register_signal_handler()?;

    let configured = orchestrator.all_services();
    for name in orchestrator.discover_services()? {
        if !configured.contains_key(&name) {
            info!(service = %name, "discovered service binary with no configuration entry");
        }
    }

    orchestrator.run()
}
