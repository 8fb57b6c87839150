use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use study_scheduler::{
    cli::{execute_command, Cli},
    completion::CompletionTracker,
    config::{Config, LogFormat},
    schedule::CycleCalculator,
    storage::SqliteStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        max_cycle_days = config.scheduling.max_cycle_days,
        "Study scheduler starting..."
    );

    // Initialize storage
    let store = match SqliteStore::new(&config.database).await {
        Ok(s) => {
            info!(path = %config.database.path.display(), "Database initialized");
            s
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize database");
            return Err(e.into());
        }
    };

    let tracker = CompletionTracker::new(Arc::new(store));
    let calculator = CycleCalculator::from_config(&config.scheduling);

    let result = execute_command(cli.command, &calculator, &tracker).await;
    if result.exit_code == 0 {
        print!("{}", result.message);
    } else {
        eprint!("{}", result.message);
        if !result.message.ends_with('\n') {
            eprintln!();
        }
    }

    std::process::exit(result.exit_code);
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
