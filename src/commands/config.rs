use anyhow::Result;
use std::path::Path;

use tariff_engine::config::load_config;

/// Display the effective configuration (after file + env overlay)
pub fn show(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Validate the configuration file
pub fn validate(config_path: &Path) -> Result<()> {
    match load_config(config_path) {
        Ok(_) => {
            println!("Configuration is valid: {}", config_path.display());
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration is invalid: {}", e);
            Err(e)
        }
    }
}
