use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::client::normalize_base_url;
use crate::error::KiraError;

pub const DEFAULT_CONFIG_FILE: &str = "kira-gs.json";
pub const DEFAULT_OUTPUT_DIR: &str = "./downloads";
pub const BASE_URL_ENV: &str = "KIRA_GS_BASE_URL";
pub const TOKEN_ENV: &str = "KIRA_GS_TOKEN";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub base_url: Option<String>,
    pub auth_token: Option<String>,
    pub output_dir: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub base_url: String,
    pub auth_token: Option<String>,
    pub output_dir: Utf8PathBuf,
    pub timeout: Option<Duration>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(
        path: Option<&str>,
        overrides: ConfigOverrides,
    ) -> Result<ResolvedConfig, KiraError> {
        let config = Self::load(path)?;
        let env = ConfigOverrides {
            base_url: read_env(BASE_URL_ENV),
            auth_token: read_env(TOKEN_ENV),
            output_dir: None,
        };
        Self::resolve_config(config, env, overrides)
    }

    pub fn load(path: Option<&str>) -> Result<Config, KiraError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| KiraError::ConfigRead(config_path.clone()))?;
        serde_json::from_str(&content).map_err(|err| KiraError::ConfigParse(err.to_string()))
    }

    pub fn resolve_config(
        config: Config,
        env: ConfigOverrides,
        overrides: ConfigOverrides,
    ) -> Result<ResolvedConfig, KiraError> {
        let base_url = overrides
            .base_url
            .or(env.base_url)
            .or(config.base_url)
            .ok_or(KiraError::MissingBaseUrl)?;
        let base_url = normalize_base_url(&base_url)?;

        let auth_token = overrides
            .auth_token
            .or(env.auth_token)
            .or(config.auth_token)
            .filter(|token| !token.trim().is_empty());

        let output_dir = overrides
            .output_dir
            .or(env.output_dir)
            .or(config.output_dir)
            .unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string());

        Ok(ResolvedConfig {
            base_url,
            auth_token,
            output_dir: Utf8PathBuf::from(output_dir),
            timeout: config.timeout_secs.map(Duration::from_secs),
        })
    }
}

fn read_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
