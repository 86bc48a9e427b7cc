//! TOML configuration parsing and validation.
//!
//! A single file drives the database location, the scoring oracle backend,
//! the HTTP bind address, and autocomplete limits. Only `[db]` and
//! `[server]` are required; everything else has defaults.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub suggest: SuggestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

/// Scoring oracle backend settings.
#[derive(Debug, Deserialize, Clone)]
pub struct OracleConfig {
    /// `"disabled"`, `"heuristic"`, or `"openai"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Upper bound on a single oracle call, retries included.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl OracleConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SuggestConfig {
    #[serde(default = "default_suggest_limit")]
    pub limit: i64,
    #[serde(default = "default_min_query_len")]
    pub min_query_len: usize,
}

impl Default for SuggestConfig {
    fn default() -> Self {
        Self {
            limit: default_suggest_limit(),
            min_query_len: default_min_query_len(),
        }
    }
}

fn default_suggest_limit() -> i64 {
    5
}
fn default_min_query_len() -> usize {
    2
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.db.max_connections == 0 {
        anyhow::bail!("db.max_connections must be > 0");
    }

    if config.oracle.timeout_secs == 0 {
        anyhow::bail!("oracle.timeout_secs must be > 0");
    }

    if config.suggest.limit < 1 {
        anyhow::bail!("suggest.limit must be >= 1");
    }

    match config.oracle.provider.as_str() {
        "disabled" | "heuristic" => {}
        "openai" => {
            if config.oracle.model.is_none() {
                anyhow::bail!("oracle.model must be specified when provider is 'openai'");
            }
        }
        other => anyhow::bail!(
            "Unknown oracle provider: '{}'. Must be disabled, heuristic, or openai.",
            other
        ),
    }

    Ok(())
}
