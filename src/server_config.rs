//! Configuration for the tail server

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::tail_scanner::{TailParams, DEFAULT_BLOCK_SIZE};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Directory the served file paths are resolved under.
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    #[serde(default = "default_listen_addr")]
    pub listen_addr: IpAddr,

    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Lines returned when the request has no `n` parameter.
    #[serde(default = "default_lines")]
    pub default_lines: usize,

    /// Hard ceiling on the `n` parameter; larger requests are rejected.
    #[serde(default = "default_max_request_lines")]
    pub max_request_lines: usize,

    /// Read buffer size for the reverse scan. Any single log line must fit
    /// in one block.
    #[serde(default = "default_block_size")]
    pub block_size: usize,

    /// Idle connection timeout in seconds.
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            listen_addr: default_listen_addr(),
            listen_port: default_listen_port(),
            default_lines: default_lines(),
            max_request_lines: default_max_request_lines(),
            block_size: default_block_size(),
            read_timeout_secs: default_read_timeout_secs(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .context("Failed to read configuration file")?;
        let config: ServerConfig =
            toml::from_str(&contents).context("Failed to parse configuration file")?;
        Ok(config)
    }

    /// Load configuration from environment variables or use defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(root) = std::env::var("LOGTAIL_ROOT") {
            config.root_dir = PathBuf::from(root);
        }

        if let Ok(addr) = std::env::var("LOGTAIL_ADDR") {
            if let Ok(ip) = addr.parse() {
                config.listen_addr = ip;
            }
        }

        if let Ok(port) = std::env::var("LOGTAIL_PORT") {
            if let Ok(p) = port.parse() {
                config.listen_port = p;
            }
        }

        config
    }

    /// Save configuration to a TOML file
    #[allow(dead_code)]
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        std::fs::write(path.as_ref(), contents).context("Failed to write configuration file")?;
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn tail_params(&self) -> TailParams {
        TailParams {
            block_size: self.block_size,
        }
    }
}

fn default_root_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_listen_addr() -> IpAddr {
    "127.0.0.1".parse().unwrap()
}

fn default_listen_port() -> u16 {
    8080
}

fn default_lines() -> usize {
    10
}

fn default_max_request_lines() -> usize {
    1_000_000
}

fn default_block_size() -> usize {
    DEFAULT_BLOCK_SIZE
}

fn default_read_timeout_secs() -> u64 {
    30
}
