// Vigil meta-cognitive safety monitor
// Main entry point for the vigil binary

use clap::Parser;
use std::sync::Arc;
use vigil_engine::cli::{Cli, Command, ConfigAction};
use vigil_engine::config::Config;
use vigil_engine::handlers::{
    handle_config_init, handle_config_show, handle_config_validate, handle_demo, handle_replay,
    OutputFormat,
};
use vigil_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // `config validate` and `config init` must work without a valid config
    if let Command::Config { action } = &cli.command {
        match action {
            ConfigAction::Validate { path } => {
                return handle_config_validate(cli.validate_target(path.as_ref()), format)
            }
            ConfigAction::Init { force } => return handle_config_init(*force, format),
            ConfigAction::Show => {}
        }
    }

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_default()?
    };

    // --log overrides the configured level; RUST_LOG overrides both
    init_telemetry_with_level(cli.log.as_deref().unwrap_or(&config.core.log_level));

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    tracing::info!("Vigil v{} ({} - {})", version, commit, timestamp);

    let config = Arc::new(config);

    // Handle commands
    match cli.command {
        Command::Replay {
            path,
            max_steps,
            token_budget,
        } => {
            tracing::info!("Replaying trace: {}", path.display());
            handle_replay(&path, max_steps, token_budget, config, format).await
        }

        Command::Demo { scenario } => {
            tracing::info!("Running demo scenario: {}", scenario.name());
            handle_demo(scenario, config, format).await
        }

        Command::Config { .. } => handle_config_show(&config, format),
    }
}
