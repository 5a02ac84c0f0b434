use anyhow::Result;
use std::path::Path;

use tariff_engine::config::load_config;
use tariff_engine::server::start_server;

pub async fn execute(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    start_server(config).await
}
