use anyhow::Result;
use clap::Parser;
use sof_stats::config::{self, Settings};
use sof_stats::handlers::AppState;
use sof_stats::logging::init_logging;
use sof_stats::server::Server;
use sof_stats::upstream::StackExchangeClient;
use std::path::PathBuf;
use std::sync::Arc;

/// Aggregated StackOverflow tag statistics over HTTP
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to the TOML configuration file (overrides SOF_STATS_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the file holding the service version
    #[arg(long, default_value = config::DEFAULT_VERSION_PATH)]
    version_file: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let args = Args::parse();
    let config_path = config::resolve_config_path(args.config);

    let settings = Settings::load(&config_path, &args.version_file).map_err(|e| {
        anyhow::anyhow!("Failed to load configuration from {}: {}", config_path.display(), e)
    })?;

    let _log_guard = init_logging(&settings.logger, settings.app.env_mode)?;

    tracing::info!(
        "Starting {} {} in {} mode",
        settings.app.service_name,
        settings.version,
        settings.app.env_mode
    );
    tracing::debug!(?settings, "Settings parsed");

    let proxy = std::env::var("HTTP_PROXY").ok().filter(|p| !p.is_empty());
    if proxy.is_none() {
        tracing::info!("Running without proxy");
    }

    let client = StackExchangeClient::new(
        &settings.network,
        settings.stackoverflow.clone(),
        proxy.as_deref(),
    )
    .map_err(|e| anyhow::anyhow!("Failed to build upstream client: {}", e))?;

    let state = Arc::new(AppState::new(settings, Arc::new(client)));

    Server::new(state)
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
