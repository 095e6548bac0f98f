//! Cross-field validation for [`RuntimeConfig`], beyond what serde's
//! per-field defaults already guarantee.

use anyhow::{anyhow, bail, Result};

use crate::RuntimeConfig;

pub fn validate_config(config: &RuntimeConfig) -> Result<()> {
    config
        .analyzer
        .validate()
        .map_err(|msg| anyhow!("invalid analyzer config: {msg}"))?;
    validate_server_config(config)?;
    Ok(())
}

fn validate_server_config(config: &RuntimeConfig) -> Result<()> {
    let addr = &config.server.listen_addr;
    if addr.is_empty() {
        bail!("server.listen_addr must not be empty");
    }
    if addr.parse::<std::net::SocketAddr>().is_err() {
        bail!("server.listen_addr must be a valid host:port address, got {addr}");
    }

    let level = config.server.log_level.to_lowercase();
    let known_levels = ["trace", "debug", "info", "warn", "error"];
    if !known_levels.contains(&level.as_str()) {
        bail!(
            "server.log_level must be one of {known_levels:?}, got {}",
            config.server.log_level
        );
    }

    Ok(())
}
