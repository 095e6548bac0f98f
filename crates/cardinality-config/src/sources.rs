//! Configuration source loading, highest priority first: environment
//! variables, then a config file, then built-in defaults.

use std::env;
use std::path::Path;

use anyhow::{Context, Result};

use crate::{LogFormat, RuntimeConfig};

const ENV_PREFIX: &str = "CARDINALITY_";

pub fn load_config() -> Result<RuntimeConfig> {
    let mut config = RuntimeConfig::default();

    if let Some(file_config) = load_from_file()? {
        config = file_config;
    }

    apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

pub fn load_config_from_path(path: &Path) -> Result<RuntimeConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    let mut config: RuntimeConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;

    apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

fn load_from_file() -> Result<Option<RuntimeConfig>> {
    if let Ok(path) = env::var("CARDINALITY_CONFIG") {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file: {path}"))?;
        let config: RuntimeConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {path}"))?;
        return Ok(Some(config));
    }

    if let Ok(content) = env::var("CARDINALITY_CONFIG_CONTENT") {
        let config: RuntimeConfig = toml::from_str(&content)
            .context("failed to parse inline config from CARDINALITY_CONFIG_CONTENT")?;
        return Ok(Some(config));
    }

    for path in ["./config.toml", "./.cardinality.toml"] {
        if Path::new(path).exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file: {path}"))?;
            let config: RuntimeConfig = toml::from_str(&content)
                .with_context(|| format!("failed to parse config file: {path}"))?;
            return Ok(Some(config));
        }
    }

    Ok(None)
}

fn apply_env_overrides(config: &mut RuntimeConfig) -> Result<()> {
    if let Some(val) = get_env_bool("AUTO_TEMPLATE")? {
        config.analyzer.auto_template = val;
    }
    if let Some(val) = get_env_usize("SHARDS")? {
        config.analyzer.shards = val;
    }
    if let Some(val) = get_env_f64("SIM_THRESHOLD")? {
        config.analyzer.sim_threshold = val;
    }
    if let Some(val) = get_env_usize("MAX_DEPTH")? {
        config.analyzer.max_depth = val;
    }
    if let Some(val) = get_env_usize("MAX_CLUSTERS")? {
        config.analyzer.max_clusters = val;
    }
    if let Some(val) = get_env_usize("HLL_PRECISION")? {
        config.analyzer.hll_precision = val as u8;
    }
    if let Some(val) = get_env_usize("VALUE_SAMPLE_CAP")? {
        config.analyzer.value_sample_cap = val;
    }

    if let Some(addr) = get_env_string("LISTEN_ADDR")? {
        config.server.listen_addr = addr;
    }
    if let Some(level) = get_env_string("LOG_LEVEL")? {
        config.server.log_level = level;
    }
    if let Some(format) = get_env_string("LOG_FORMAT")? {
        config.server.log_format = match format.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };
    }

    Ok(())
}

fn get_env_string(key: &str) -> Result<Option<String>> {
    let full_key = format!("{ENV_PREFIX}{key}");
    match env::var(&full_key) {
        Ok(val) if !val.is_empty() => Ok(Some(val)),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(e).with_context(|| format!("failed to read env var {full_key}")),
    }
}

fn get_env_usize(key: &str) -> Result<Option<usize>> {
    let full_key = format!("{ENV_PREFIX}{key}");
    match get_env_string(key)? {
        Some(val) => Ok(Some(
            val.parse::<usize>()
                .with_context(|| format!("{full_key} must be a valid number"))?,
        )),
        None => Ok(None),
    }
}

fn get_env_f64(key: &str) -> Result<Option<f64>> {
    let full_key = format!("{ENV_PREFIX}{key}");
    match get_env_string(key)? {
        Some(val) => Ok(Some(
            val.parse::<f64>()
                .with_context(|| format!("{full_key} must be a valid number"))?,
        )),
        None => Ok(None),
    }
}

fn get_env_bool(key: &str) -> Result<Option<bool>> {
    let full_key = format!("{ENV_PREFIX}{key}");
    match get_env_string(key)? {
        Some(val) => {
            let parsed = match val.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => true,
                "false" | "0" | "no" | "off" => false,
                _ => anyhow::bail!("{full_key} must be true or false"),
            };
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_env_string_treats_empty_as_absent() {
        std::env::set_var("CARDINALITY_TEST_EMPTY_KEY", "");
        assert_eq!(get_env_string("TEST_EMPTY_KEY").unwrap(), None);
        std::env::remove_var("CARDINALITY_TEST_EMPTY_KEY");
    }

    #[test]
    fn get_env_bool_accepts_common_truthy_values() {
        std::env::set_var("CARDINALITY_TEST_BOOL_KEY", "yes");
        assert_eq!(get_env_bool("TEST_BOOL_KEY").unwrap(), Some(true));
        std::env::remove_var("CARDINALITY_TEST_BOOL_KEY");
    }
}
