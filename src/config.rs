use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// CLI argument structure. Flags override the config file, which overrides
// the built-in defaults; PORT from the environment sits between the two.
#[derive(Parser, Debug, Clone)]
#[command(name = "throttle-gateway")]
#[command(about = "Token-throttled gateway in front of the users API")]
pub struct Args {
    // JSON config file to load
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    // Write a default configuration to this location, then exit
    #[arg(long)]
    pub write_default_config: Option<PathBuf>,

    // Port to run the server on
    #[arg(short, long)]
    pub port: Option<u16>,

    // Requests admitted per caller per window
    #[arg(long)]
    pub rate_limit: Option<u32>,

    // Window length in milliseconds
    #[arg(long)]
    pub rate_window_ms: Option<u64>,

    // Environment tag attached to request logs
    #[arg(long)]
    pub environment: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("could not parse config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("could not write config file {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
    #[error("could not serialize default config: {0}")]
    Serialize(serde_json::Error),
    #[error("PORT must be a number between 1 and 65535, got {0:?}")]
    InvalidPort(String),
    #[error("throttling window must be at least 1ms")]
    ZeroWindow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub throttling: ThrottlingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
}

// n requests admitted per m milliseconds, per caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottlingConfig {
    #[serde(default = "default_limit")]
    pub n: u32,
    #[serde(default = "default_window_ms")]
    pub m: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            http: HttpConfig::default(),
            throttling: ThrottlingConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen_port: default_listen_port(),
        }
    }
}

impl Default for ThrottlingConfig {
    fn default() -> Self {
        Self {
            n: default_limit(),
            m: default_window_ms(),
        }
    }
}

fn default_environment() -> String {
    "local".to_owned()
}

fn default_listen_port() -> u16 {
    8080
}

fn default_limit() -> u32 {
    10
}

fn default_window_ms() -> u64 {
    1000
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn write_default(path: &Path) -> Result<(), ConfigError> {
        let data = serde_json::to_string_pretty(&Config::default())
            .map_err(ConfigError::Serialize)?;
        std::fs::write(path, data).map_err(|source| ConfigError::Write {
            path: path.display().to_string(),
            source,
        })
    }

    /// Effective configuration: defaults, then config file, then PORT from
    /// the environment, then CLI flags.
    pub fn resolve(args: &Args) -> Result<Self, ConfigError> {
        Self::resolve_with_env(args, std::env::var("PORT").ok())
    }

    fn resolve_with_env(args: &Args, port_env: Option<String>) -> Result<Self, ConfigError> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if args.port.is_none() {
            if let Some(port) = port_env.filter(|p| !p.is_empty()) {
                config.http.listen_port =
                    port.parse().map_err(|_| ConfigError::InvalidPort(port))?;
            }
        }

        if let Some(port) = args.port {
            config.http.listen_port = port;
        }
        if let Some(n) = args.rate_limit {
            config.throttling.n = n;
        }
        if let Some(m) = args.rate_window_ms {
            config.throttling.m = m;
        }
        if let Some(environment) = &args.environment {
            config.environment = environment.clone();
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.throttling.m == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        Ok(())
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.throttling.m)
    }
}
