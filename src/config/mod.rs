//! Configuration module for Sockslink
//!
//! This module provides configuration types and parsing for the client
//! and the server.

mod client;
mod server;
mod transport;

pub use client::{ClientConfig, TlsConfig};
pub use server::ServerConfig;
pub use transport::TcpConfig;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// Client side, used by `sockslink connect`
    #[serde(default)]
    pub client: Option<ClientConfig>,

    /// Server side, used by `sockslink serve`
    #[serde(default)]
    pub server: Option<ServerConfig>,
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

    parse_config(&content)
}

/// Parse configuration from a TOML string
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse configuration")?;

    if let Some(ref client) = config.client {
        client
            .validate()
            .with_context(|| "Invalid [client] configuration")?;
    }
    if let Some(ref server) = config.server {
        server
            .validate()
            .with_context(|| "Invalid [server] configuration")?;
    }

    Ok(config)
}
