use std::path::Path;

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use producer::{ProducerError, RetryPolicy, SourceConfig, default_key_field};

use crate::error::ServerError;

#[derive(Parser)]
#[command(name = "telemetry-relay", about = "Relay телеметрии: последний пакет по каждой машине через HTTP")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Запустить relay
    Serve(ServeArgs),
}

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    /// Путь к TOML конфиг файлу (по умолчанию relay.toml, если существует)
    #[arg(long, env = "CONFIG_PATH")]
    pub config: Option<String>,

    /// Порт HTTP API (перекрывает api_port из конфига)
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,
}

pub const DEFAULT_CONFIG_PATH: &str = "relay.toml";

// ---- TOML Config ----

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_api_host")]
    pub api_host: String,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    /// Период push'а snapshot'ов в /ws.
    #[serde(default = "default_ws_interval_ms")]
    pub ws_interval_ms: u64,
    /// Сколько ждать задачи при shutdown перед abort.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    /// Путь к индексу машины внутри пакета.
    #[serde(default = "default_key_field")]
    pub key_field: String,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_api_host() -> String {
    "0.0.0.0".into()
}
fn default_api_port() -> u16 {
    5000
}
fn default_ws_interval_ms() -> u64 {
    100
}
fn default_shutdown_grace_ms() -> u64 {
    5000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_host: default_api_host(),
            api_port: default_api_port(),
            ws_interval_ms: default_ws_interval_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            key_field: default_key_field(),
            source: SourceConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: &str) -> Result<Self, ServerError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config { context: "read", detail: format!("'{path}': {e}") })?;
        Self::parse(&content)
            .map_err(|e| ServerError::Config { context: "parse", detail: format!("'{path}': {e}") })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Explicit path must load; without one, `relay.toml` is used if present,
    /// otherwise defaults.
    pub fn resolve(path: Option<&str>) -> Result<Self, ServerError> {
        match path {
            Some(path) => Self::load(path),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::load(DEFAULT_CONFIG_PATH),
            None => {
                tracing::info!("no config file, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        if self.ws_interval_ms == 0 {
            return Err(ProducerError::InvalidConfig {
                field: "ws_interval_ms",
                detail: "must be > 0".into(),
            }
            .into());
        }
        if self.key_field.trim().is_empty() {
            return Err(ProducerError::InvalidConfig {
                field: "key_field",
                detail: "must not be empty".into(),
            }
            .into());
        }
        self.source.validate()?;
        self.retry.validate()?;
        Ok(())
    }
}
