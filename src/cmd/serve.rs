//! `sportshub serve`: run the store API.

use std::path::Path;

use anyhow::Result;
use sportshub::config::CliOverrides;
use sportshub::logging;
use sportshub::shop::server;

use super::resolve_config;

pub async fn cmd_serve(config_path: Option<&Path>, cli: CliOverrides) -> Result<()> {
    let config = resolve_config(config_path, cli)?;
    let _log_guard = logging::init_logging(&config.logging)?;

    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }

    server::start_server(config.server_config()).await
}
