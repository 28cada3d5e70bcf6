use crate::error::{EngineError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
}

#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// School the CLI operates on when none is given explicitly.
    pub default_school: Option<String>,
}

fn default_timeout() -> u64 {
    30
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from("config.toml")
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config_content = fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;

        let config: Config = toml::from_str(&config_content)?;
        Ok(config)
    }

    /// Config file first, `RESERVA_API_BASE_URL` as fallback for ad-hoc runs.
    pub fn load_or_env() -> Result<Self> {
        match Self::load() {
            Ok(c) => Ok(c),
            Err(_) => {
                let base_url = std::env::var("RESERVA_API_BASE_URL").map_err(|_| {
                    EngineError::Config(
                        "No config.toml and RESERVA_API_BASE_URL is not set".to_string(),
                    )
                })?;
                Ok(Config {
                    api: ApiConfig {
                        base_url,
                        timeout_seconds: default_timeout(),
                        default_school: None,
                    },
                })
            }
        }
    }
}
