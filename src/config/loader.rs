/// Configuration loading: optional TOML file overlaid by QUOTEFLOW_* environment variables
use std::path::Path;

use ::config::{Environment, File};

use crate::error::{PipelineError, Result};
use crate::types::{Config, DataSource};

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "QUOTEFLOW_CONFIG";

const ENV_PREFIX: &str = "QUOTEFLOW";
const DEFAULT_CONFIG_PATH: &str = "quoteflow.toml";

/// Load using the path from `QUOTEFLOW_CONFIG`, falling back to `quoteflow.toml`
pub fn load_config_from_env() -> Result<Config> {
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    load_config(path)
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    load_layered(path.as_ref(), ENV_PREFIX)
}

fn load_layered(path: &Path, env_prefix: &str) -> Result<Config> {
    let layered = ::config::Config::builder()
        .add_source(File::from(path).required(false))
        .add_source(
            Environment::with_prefix(env_prefix)
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("symbols"),
        )
        .build()?;

    let mut config: Config = layered
        .try_deserialize()
        .map_err(|e| PipelineError::ConfigError(format!("Failed to parse config: {}", e)))?;

    config.symbols = config
        .symbols
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    validate_config(&config)?;

    Ok(config)
}

pub fn validate_config(config: &Config) -> Result<()> {
    if config.symbols.is_empty() {
        return Err(PipelineError::ConfigError("symbols is empty".to_string()));
    }

    if config.quote_endpoint.trim().is_empty() {
        return Err(PipelineError::ConfigError("quote_endpoint is empty".to_string()));
    }

    if config.poll_interval_sec == 0 || config.archive_flush_interval_sec == 0 {
        return Err(PipelineError::ConfigError(
            "poll_interval_sec and archive_flush_interval_sec must be > 0".to_string(),
        ));
    }

    if config.intraday_ttl_days <= 0 {
        return Err(PipelineError::ConfigError(format!(
            "Invalid intraday_ttl_days: {}",
            config.intraday_ttl_days
        )));
    }

    if config.hot_store_page_size == 0 {
        return Err(PipelineError::ConfigError("hot_store_page_size must be > 0".to_string()));
    }

    if config.hot_store_maintenance_interval_sec == 0 {
        return Err(PipelineError::ConfigError(
            "hot_store_maintenance_interval_sec must be > 0".to_string(),
        ));
    }

    if config.query_source.parse::<DataSource>().is_err() {
        return Err(PipelineError::ConfigError(format!(
            "Invalid query_source: {} (expected hot or archive)",
            config.query_source
        )));
    }

    if !matches!(config.log_format.as_str(), "pretty" | "json") {
        return Err(PipelineError::ConfigError(format!(
            "Invalid log_format: {} (expected pretty or json)",
            config.log_format
        )));
    }

    Ok(())
}
