pub mod cli;
pub mod core;
pub mod providers;
pub mod server;

use crate::core::config::AppConfig;
use crate::core::{RateProvider, SystemClock};
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info};

pub enum AppCommand {
    Rate,
    Serve,
}

/// Builds the process-wide provider backed by the configured upstream.
pub fn build_provider(config: &AppConfig) -> Result<Arc<RateProvider>> {
    let source = providers::BcvRateSource::new(&config.upstream)?;
    Ok(Arc::new(RateProvider::new(
        Arc::new(source),
        Arc::new(SystemClock),
        config.provider_options(),
    )))
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("ratekeeper starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let provider = build_provider(&config)?;

    match command {
        AppCommand::Rate => {
            cli::rate::show_rate(&provider, &config.currency).await;
            Ok(())
        }
        AppCommand::Serve => server::serve(&config, provider).await,
    }
}
